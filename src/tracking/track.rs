//! Track records and feature identity.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use nalgebra::{Point2, Vector2};

/// Identifier of a tracked feature.
///
/// A track carries [`FeatureId::UNCONFIRMED`] until the caller confirms it;
/// confirmed ids are non-negative and never reused by the same allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub i64);

impl FeatureId {
    pub const UNCONFIRMED: FeatureId = FeatureId(-1);

    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn is_confirmed(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_confirmed() {
            write!(f, "F{}", self.0)
        } else {
            f.write_str("F?")
        }
    }
}

/// One tracked feature. All per-feature attributes live in this record so
/// that removals and reorderings can never desynchronize them.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: FeatureId,
    /// Pixel position in the current frame.
    pub pixel: Point2<f32>,
    /// Pixel position in the previous frame (equal to `pixel` on creation).
    pub prev_pixel: Point2<f32>,
    /// Undistorted normalized-plane position in the current frame.
    pub normalized: Point2<f64>,
    /// Frames survived, including the one the track was created in.
    pub age: u32,
    /// Normalized-plane velocity (units per second).
    pub velocity: Vector2<f64>,
}

impl Track {
    /// Fresh, unconfirmed track for a newly detected corner.
    pub fn new(pixel: Point2<f32>) -> Self {
        Self {
            id: FeatureId::UNCONFIRMED,
            pixel,
            prev_pixel: pixel,
            normalized: Point2::origin(),
            age: 1,
            velocity: Vector2::zeros(),
        }
    }
}

/// Issues feature ids.
///
/// Each tracker owns a private counter by default. Trackers that must share
/// one id space (e.g. several cameras feeding one estimator) can be given
/// clones of the same [`IdAllocator::shared`] handle.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: Arc<AtomicI64>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Allocator whose clones all draw from one counter.
    pub fn shared() -> Self {
        Self::new()
    }

    /// Separate counter starting at `first`.
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: Arc::new(AtomicI64::new(first.max(0))),
        }
    }

    /// Value the next confirmation will receive.
    pub fn peek(&self) -> i64 {
        self.next.load(Ordering::SeqCst)
    }

    fn allocate(&self) -> FeatureId {
        FeatureId(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Assign an id to `track` if it has none. Idempotent.
    ///
    /// Returns `true` when a new id was issued.
    pub fn confirm(&self, track: &mut Track) -> bool {
        if track.id.is_confirmed() {
            return false;
        }
        track.id = self.allocate();
        true
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_track_is_unconfirmed_with_age_one() {
        let track = Track::new(Point2::new(10.0, 20.0));

        assert_eq!(track.id, FeatureId::UNCONFIRMED);
        assert_eq!(track.age, 1);
        assert_eq!(track.prev_pixel, track.pixel);
        assert_eq!(track.velocity, Vector2::zeros());
    }

    #[test]
    fn test_confirm_is_idempotent() {
        let ids = IdAllocator::new();
        let mut track = Track::new(Point2::new(1.0, 1.0));

        assert!(ids.confirm(&mut track));
        let first = track.id;
        let counter = ids.peek();

        assert!(!ids.confirm(&mut track));
        assert_eq!(track.id, first);
        assert_eq!(ids.peek(), counter);
    }

    #[test]
    fn test_ids_are_sequential_and_unique() {
        let ids = IdAllocator::new();
        let mut tracks: Vec<Track> = (0..5)
            .map(|i| Track::new(Point2::new(i as f32, 0.0)))
            .collect();

        for track in &mut tracks {
            ids.confirm(track);
        }

        let issued: Vec<i64> = tracks.iter().map(|t| t.id.0).collect();
        assert_eq!(issued, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_independent_allocators_do_not_share_counters() {
        let a = IdAllocator::new();
        let b = IdAllocator::new();
        let mut ta = Track::new(Point2::new(0.0, 0.0));
        let mut tb = Track::new(Point2::new(0.0, 0.0));

        a.confirm(&mut ta);
        b.confirm(&mut tb);

        assert_eq!(ta.id, FeatureId(0));
        assert_eq!(tb.id, FeatureId(0));
    }

    #[test]
    fn test_shared_allocator_clones_share_one_space() {
        let shared = IdAllocator::shared();
        let other = shared.clone();
        let mut t1 = Track::new(Point2::new(0.0, 0.0));
        let mut t2 = Track::new(Point2::new(0.0, 0.0));

        shared.confirm(&mut t1);
        other.confirm(&mut t2);

        assert_ne!(t1.id, t2.id);
        assert_eq!(shared.peek(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(FeatureId(7).to_string(), "F7");
        assert_eq!(FeatureId::UNCONFIRMED.to_string(), "F?");
    }
}
