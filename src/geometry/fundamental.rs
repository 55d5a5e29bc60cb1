//! Fundamental matrix estimation with RANSAC.
//!
//! Minimal samples are fit with the normalized eight-point algorithm
//! (Hartley), rank 2 is enforced through SVD, and correspondences are scored
//! by the larger of the two squared point-to-epipolar-line distances.

use nalgebra::{Matrix3, Point2, SMatrix, SVector, SymmetricEigen, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;

/// Minimal sample size of the eight-point algorithm.
pub const MIN_CORRESPONDENCES: usize = 8;

#[derive(Debug, Clone)]
pub struct FundamentalRansacConfig {
    /// Maximum point-to-epipolar-line distance (pixels) for an inlier.
    pub threshold: f64,
    /// Desired probability of drawing at least one outlier-free sample.
    pub confidence: f64,
    pub max_iterations: usize,
    /// Seed for the sample generator; fixed so results are reproducible.
    pub seed: u64,
}

impl Default for FundamentalRansacConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            confidence: 0.99,
            max_iterations: 1000,
            seed: 0,
        }
    }
}

/// Result of a RANSAC fundamental matrix fit.
#[derive(Debug, Clone)]
pub struct FundamentalResult {
    /// F such that `x2ᵀ · F · x1 = 0` for inlier pairs.
    pub matrix: Matrix3<f64>,
    /// Inlier flag per correspondence (same order as the input).
    pub inlier_mask: Vec<bool>,
    pub num_inliers: usize,
    pub iterations: usize,
}

/// Similarity transform moving the centroid to the origin with mean distance √2.
fn normalizing_transform(points: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    if mean_dist < 1e-12 {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

/// Normalized eight-point algorithm over the given correspondences.
///
/// Returns `None` if the configuration is degenerate.
pub fn eight_point(points1: &[Point2<f64>], points2: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    if points1.len() < MIN_CORRESPONDENCES || points1.len() != points2.len() {
        return None;
    }

    let t1 = normalizing_transform(points1)?;
    let t2 = normalizing_transform(points2)?;

    let mut ata = SMatrix::<f64, 9, 9>::zeros();
    for (p1, p2) in points1.iter().zip(points2) {
        let a = t1 * Vector3::new(p1.x, p1.y, 1.0);
        let b = t2 * Vector3::new(p2.x, p2.y, 1.0);
        let row = SVector::<f64, 9>::from_column_slice(&[
            b.x * a.x,
            b.x * a.y,
            b.x,
            b.y * a.x,
            b.y * a.y,
            b.y,
            a.x,
            a.y,
            1.0,
        ]);
        ata += row * row.transpose();
    }

    // Null vector of A = eigenvector of AᵀA with the smallest eigenvalue.
    let eigen = SymmetricEigen::new(ata);
    let (min_idx, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let f = eigen.eigenvectors.column(min_idx);
    let f_norm = Matrix3::new(f[0], f[1], f[2], f[3], f[4], f[5], f[6], f[7], f[8]);

    let f_rank2 = enforce_rank_two(&f_norm)?;
    let f = t2.transpose() * f_rank2 * t1;

    let norm = f.norm();
    if norm < 1e-15 || !norm.is_finite() {
        return None;
    }
    Some(f / norm)
}

fn enforce_rank_two(f: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = f.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut s = svd.singular_values;
    let (min_idx, _) = s.iter().enumerate().min_by(|a, b| a.1.total_cmp(b.1))?;
    s[min_idx] = 0.0;
    Some(u * Matrix3::from_diagonal(&s) * v_t)
}

/// Larger of the two squared distances from each point to the epipolar line
/// induced by the other.
pub fn epipolar_error(f: &Matrix3<f64>, p1: &Point2<f64>, p2: &Point2<f64>) -> f64 {
    let x1 = Vector3::new(p1.x, p1.y, 1.0);
    let x2 = Vector3::new(p2.x, p2.y, 1.0);

    let l2 = f * x1;
    let l1 = f.transpose() * x2;
    let d = x2.dot(&l2);

    let s2 = d * d / (l2.x * l2.x + l2.y * l2.y).max(1e-12);
    let s1 = d * d / (l1.x * l1.x + l1.y * l1.y).max(1e-12);
    s1.max(s2)
}

fn adaptive_iterations(confidence: f64, inlier_ratio: f64, current_max: usize) -> usize {
    if inlier_ratio >= 1.0 {
        return 0;
    }
    let denom = (1.0 - inlier_ratio.powi(MIN_CORRESPONDENCES as i32))
        .max(f64::MIN_POSITIVE)
        .ln();
    if denom >= 0.0 {
        return current_max;
    }
    let num = (1.0 - confidence).max(f64::MIN_POSITIVE).ln();
    let needed = (num / denom).ceil();
    if needed.is_finite() && needed >= 0.0 {
        (needed as usize).min(current_max)
    } else {
        current_max
    }
}

/// Robustly estimate F from pixel correspondences.
///
/// Returns `None` when fewer than eight correspondences are given or no
/// sample produced a usable model.
pub fn find_fundamental_ransac(
    points1: &[Point2<f64>],
    points2: &[Point2<f64>],
    config: &FundamentalRansacConfig,
) -> Option<FundamentalResult> {
    let n = points1.len();
    if n < MIN_CORRESPONDENCES || n != points2.len() {
        return None;
    }

    let threshold_sq = config.threshold * config.threshold;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut best: Option<(Matrix3<f64>, Vec<bool>, usize)> = None;
    let mut max_iter = config.max_iterations.max(1);
    let mut iteration = 0;

    let mut sample1 = Vec::with_capacity(MIN_CORRESPONDENCES);
    let mut sample2 = Vec::with_capacity(MIN_CORRESPONDENCES);

    while iteration < max_iter {
        iteration += 1;

        sample1.clear();
        sample2.clear();
        for idx in index::sample(&mut rng, n, MIN_CORRESPONDENCES) {
            sample1.push(points1[idx]);
            sample2.push(points2[idx]);
        }

        let Some(f) = eight_point(&sample1, &sample2) else {
            continue;
        };

        let mask: Vec<bool> = points1
            .iter()
            .zip(points2)
            .map(|(p1, p2)| epipolar_error(&f, p1, p2) <= threshold_sq)
            .collect();
        let count = mask.iter().filter(|&&m| m).count();

        let improved = best.as_ref().is_none_or(|(_, _, c)| count > *c);
        if improved {
            let ratio = count as f64 / n as f64;
            best = Some((f, mask, count));
            max_iter = max_iter.min(iteration + adaptive_iterations(config.confidence, ratio, max_iter));
        }
    }

    best.map(|(matrix, inlier_mask, num_inliers)| FundamentalResult {
        matrix,
        inlier_mask,
        num_inliers,
        iterations: iteration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};
    use rand::Rng;

    const FOCAL: f64 = 460.0;

    fn project(p: &Vector3<f64>) -> Point2<f64> {
        Point2::new(FOCAL * p.x / p.z + 376.0, FOCAL * p.y / p.z + 240.0)
    }

    /// Two views of a random point cloud; the second camera is rotated and
    /// translated with respect to the first.
    fn two_view(n: usize, seed: u64) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let rot = Rotation3::from_euler_angles(0.02, -0.05, 0.01);
        let t = Vector3::new(0.3, 0.05, 0.02);

        let mut pts1 = Vec::with_capacity(n);
        let mut pts2 = Vec::with_capacity(n);
        for _ in 0..n {
            let p = Vector3::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-1.5..1.5),
                rng.gen_range(3.0..8.0),
            );
            pts1.push(project(&p));
            pts2.push(project(&(rot * p + t)));
        }
        (pts1, pts2)
    }

    #[test]
    fn test_eight_point_satisfies_epipolar_constraint() {
        let (pts1, pts2) = two_view(30, 7);
        let f = eight_point(&pts1, &pts2).unwrap();

        for (p1, p2) in pts1.iter().zip(&pts2) {
            assert!(epipolar_error(&f, p1, p2) < 1e-6);
        }
    }

    #[test]
    fn test_eight_point_result_has_rank_two() {
        let (pts1, pts2) = two_view(20, 3);
        let f = eight_point(&pts1, &pts2).unwrap();

        assert_relative_eq!(f.determinant(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(f.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ransac_flags_corrupted_correspondences() {
        let (pts1, mut pts2) = two_view(60, 11);
        let corrupted = [3usize, 17, 29, 41, 55];
        for &i in &corrupted {
            pts2[i].x += 35.0;
            pts2[i].y -= 28.0;
        }

        let result = find_fundamental_ransac(&pts1, &pts2, &FundamentalRansacConfig::default())
            .unwrap();

        for (i, &inlier) in result.inlier_mask.iter().enumerate() {
            assert_eq!(inlier, !corrupted.contains(&i), "correspondence {i}");
        }
        assert_eq!(result.num_inliers, 55);
    }

    #[test]
    fn test_ransac_needs_eight_correspondences() {
        let (pts1, pts2) = two_view(7, 5);
        assert!(find_fundamental_ransac(&pts1, &pts2, &FundamentalRansacConfig::default()).is_none());
    }

    #[test]
    fn test_ransac_is_reproducible_for_a_seed() {
        let (pts1, mut pts2) = two_view(40, 21);
        pts2[0].x += 50.0;
        let config = FundamentalRansacConfig {
            seed: 42,
            ..Default::default()
        };

        let a = find_fundamental_ransac(&pts1, &pts2, &config).unwrap();
        let b = find_fundamental_ransac(&pts1, &pts2, &config).unwrap();

        assert_eq!(a.inlier_mask, b.inlier_mask);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn test_static_scene_keeps_every_point() {
        let (pts1, _) = two_view(25, 9);
        let result =
            find_fundamental_ransac(&pts1, &pts1, &FundamentalRansacConfig::default()).unwrap();

        assert!(result.inlier_mask.iter().all(|&m| m));
    }
}
