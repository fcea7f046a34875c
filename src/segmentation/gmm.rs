//! Full-covariance RGB Gaussian mixture used as a colour model by the interactive cut

#![allow(clippy::indexing_slicing)]

use crate::error::{RemoveBgError, Result};

/// An RGB sample in 0-255 space
pub type Color = [f64; 3];

const K_MEANS_ITERATIONS: usize = 10;

/// Variance added to the diagonal of a singular covariance
const SINGULAR_VARIANCE: f64 = 0.01;

#[derive(Debug, Clone, Default)]
struct Component {
    weight: f64,
    mean: Color,
    inverse: [[f64; 3]; 3],
    determinant: f64,
}

impl Component {
    /// Unnormalised density (the constant `(2π)^-3/2` is dropped)
    fn density(&self, color: Color) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = [
            color[0] - self.mean[0],
            color[1] - self.mean[1],
            color[2] - self.mean[2],
        ];
        let mut mahalanobis = 0.0;
        for (i, di) in d.iter().enumerate() {
            for (j, dj) in d.iter().enumerate() {
                mahalanobis += di * self.inverse[i][j] * dj;
            }
        }
        (-0.5 * mahalanobis).exp() / self.determinant.sqrt()
    }
}

/// Gaussian mixture model over RGB colours
#[derive(Debug, Clone)]
pub struct Gmm {
    components: Vec<Component>,
}

impl Gmm {
    /// Number of mixture components
    pub const COMPONENTS: usize = 5;

    /// Fit a mixture to `samples` with a deterministic k-means initialisation
    ///
    /// # Errors
    /// - `samples` is empty
    pub fn fit(samples: &[Color]) -> Result<Self> {
        let labels = kmeans(samples, Self::COMPONENTS, K_MEANS_ITERATIONS);
        Self::learn(samples, &labels)
    }

    /// Estimate weights, means and covariances from labelled samples
    ///
    /// # Errors
    /// - `samples` is empty or `labels` has a different length
    pub fn learn(samples: &[Color], labels: &[usize]) -> Result<Self> {
        if samples.is_empty() {
            return Err(RemoveBgError::segmentation("cannot learn a colour model from zero samples"));
        }
        if samples.len() != labels.len() {
            return Err(RemoveBgError::segmentation("sample and label counts differ"));
        }

        let mut sums = [[0.0f64; 3]; Self::COMPONENTS];
        let mut products = [[[0.0f64; 3]; 3]; Self::COMPONENTS];
        let mut counts = [0usize; Self::COMPONENTS];

        for (color, &label) in samples.iter().zip(labels) {
            let ci = label.min(Self::COMPONENTS - 1);
            counts[ci] += 1;
            for i in 0..3 {
                sums[ci][i] += color[i];
                for j in 0..3 {
                    products[ci][i][j] += color[i] * color[j];
                }
            }
        }

        let total = samples.len() as f64;
        let components = (0..Self::COMPONENTS)
            .map(|ci| {
                if counts[ci] == 0 {
                    return Component::default();
                }
                let n = counts[ci] as f64;
                let mean = [sums[ci][0] / n, sums[ci][1] / n, sums[ci][2] / n];
                let mut cov = [[0.0f64; 3]; 3];
                for i in 0..3 {
                    for j in 0..3 {
                        cov[i][j] = products[ci][i][j] / n - mean[i] * mean[j];
                    }
                }
                let mut det = determinant(&cov);
                if det <= f64::EPSILON {
                    for (i, row) in cov.iter_mut().enumerate() {
                        row[i] += SINGULAR_VARIANCE;
                    }
                    det = determinant(&cov);
                }
                Component {
                    weight: n / total,
                    mean,
                    inverse: inverse(&cov, det),
                    determinant: det,
                }
            })
            .collect();

        Ok(Self { components })
    }

    /// Mixture density at `color`
    #[must_use]
    pub fn probability(&self, color: Color) -> f64 {
        self.components
            .iter()
            .map(|c| c.weight * c.density(color))
            .sum()
    }

    /// Component that best explains `color`
    #[must_use]
    pub fn which_component(&self, color: Color) -> usize {
        let mut best = 0;
        let mut best_density = 0.0;
        for (ci, component) in self.components.iter().enumerate() {
            let density = component.density(color);
            if density > best_density {
                best = ci;
                best_density = density;
            }
        }
        best
    }

    /// Weights of all components, summing to one
    #[must_use]
    pub fn weights(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.weight).collect()
    }
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn inverse(m: &[[f64; 3]; 3], det: f64) -> [[f64; 3]; 3] {
    let inv_det = 1.0 / det;
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ]
}

fn distance_sq(a: Color, b: Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn nearest(centers: &[Color], color: Color) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let d = distance_sq(*center, color);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

/// Lloyd k-means with farthest-point seeding; returns one label per sample
///
/// Seeding starts from the first sample and repeatedly adds the sample
/// farthest from every chosen centre, so results are reproducible.
#[must_use]
pub fn kmeans(samples: &[Color], k: usize, iterations: usize) -> Vec<usize> {
    if samples.is_empty() || k == 0 {
        return vec![0; samples.len()];
    }

    let mut centers = vec![samples[0]];
    let mut min_distance: Vec<f64> = samples.iter().map(|s| distance_sq(*s, samples[0])).collect();
    while centers.len() < k {
        let (index, _) = min_distance
            .iter()
            .enumerate()
            .fold((0, -1.0), |best, (i, &d)| if d > best.1 { (i, d) } else { best });
        let center = samples[index];
        centers.push(center);
        for (d, s) in min_distance.iter_mut().zip(samples) {
            *d = d.min(distance_sq(*s, center));
        }
    }

    let mut labels: Vec<usize> = samples.iter().map(|s| nearest(&centers, *s)).collect();
    for _ in 0..iterations {
        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (s, &label) in samples.iter().zip(&labels) {
            counts[label] += 1;
            for c in 0..3 {
                sums[label][c] += s[c];
            }
        }
        for ((center, sum), &count) in centers.iter_mut().zip(&sums).zip(&counts) {
            if count > 0 {
                let n = count as f64;
                *center = [sum[0] / n, sum[1] / n, sum[2] / n];
            }
        }

        let next: Vec<usize> = samples.iter().map(|s| nearest(&centers, *s)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmeans_separates_clusters() {
        let mut samples = vec![[10.0, 10.0, 10.0]; 20];
        samples.extend(vec![[240.0, 20.0, 20.0]; 10]);
        let labels = kmeans(&samples, 2, 10);
        assert!(labels[..20].iter().all(|&l| l == labels[0]));
        assert!(labels[20..].iter().all(|&l| l == labels[20]));
        assert_ne!(labels[0], labels[20]);
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        let samples: Vec<Color> = (0..50)
            .map(|i| [f64::from(i * 5 % 255), f64::from(i * 11 % 255), f64::from(i * 3)])
            .collect();
        assert_eq!(kmeans(&samples, 5, 10), kmeans(&samples, 5, 10));
    }

    #[test]
    fn test_learn_weights_sum_to_one() {
        let mut samples = vec![[50.0, 60.0, 70.0]; 30];
        samples.extend(vec![[200.0, 10.0, 10.0]; 10]);
        let gmm = Gmm::fit(&samples).unwrap();
        let total: f64 = gmm.weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_probability_prefers_training_colors() {
        let samples = vec![[30.0, 30.0, 200.0]; 25];
        let gmm = Gmm::fit(&samples).unwrap();
        assert!(gmm.probability([30.0, 30.0, 200.0]) > gmm.probability([200.0, 30.0, 30.0]));
        assert!(gmm.probability([30.0, 30.0, 200.0]).is_finite());
    }

    #[test]
    fn test_which_component_matches_cluster() {
        let mut samples = vec![[0.0, 0.0, 0.0]; 10];
        samples.extend(vec![[255.0, 255.0, 255.0]; 10]);
        let gmm = Gmm::fit(&samples).unwrap();
        assert_ne!(
            gmm.which_component([0.0, 0.0, 0.0]),
            gmm.which_component([255.0, 255.0, 255.0])
        );
    }

    #[test]
    fn test_learn_rejects_empty() {
        assert!(Gmm::fit(&[]).is_err());
        assert!(Gmm::learn(&[[0.0; 3]], &[]).is_err());
    }

    #[test]
    fn test_inverse_of_diagonal() {
        let m = [[2.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 5.0]];
        let det = determinant(&m);
        assert_eq!(det, 40.0);
        let inv = inverse(&m, det);
        assert!((inv[0][0] - 0.5).abs() < 1e-12);
        assert!((inv[1][1] - 0.25).abs() < 1e-12);
        assert!((inv[2][2] - 0.2).abs() < 1e-12);
    }
}
