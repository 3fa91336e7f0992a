//! Lloyd's k-means over 3-channel samples.

use rand::Rng;

/// Termination and restart policy.
#[derive(Clone, Debug, PartialEq)]
pub struct KmeansCriteria {
    /// Hard cap on refinement iterations per attempt.
    pub max_iter: usize,
    /// Stop once no center moves farther than this.
    pub epsilon: f32,
    /// Independent random initializations; the most compact one wins.
    pub attempts: usize,
}

impl Default for KmeansCriteria {
    fn default() -> Self {
        Self {
            max_iter: 20,
            epsilon: 1.0,
            attempts: 10,
        }
    }
}

#[derive(Clone, Debug)]
pub struct KmeansResult {
    /// Cluster index per input sample.
    pub labels: Vec<usize>,
    pub centers: Vec<[f32; 3]>,
    /// Sum of squared distances from each sample to its center.
    pub compactness: f64,
}

fn dist2(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0 * d0 + d1 * d1 + d2 * d2
}

fn nearest(sample: &[f32; 3], centers: &[[f32; 3]]) -> (usize, f32) {
    let mut best = (0, f32::MAX);
    for (i, c) in centers.iter().enumerate() {
        let d = dist2(sample, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// Cluster `samples` into at most `k` groups.
///
/// `k` is clamped to the number of samples. Returns `None` for an empty
/// sample set or `k == 0`.
pub fn kmeans<R: Rng + ?Sized>(
    samples: &[[f32; 3]],
    k: usize,
    criteria: &KmeansCriteria,
    rng: &mut R,
) -> Option<KmeansResult> {
    let k = k.min(samples.len());
    if k == 0 {
        return None;
    }

    let mut lo = [f32::MAX; 3];
    let mut hi = [f32::MIN; 3];
    for s in samples {
        for c in 0..3 {
            lo[c] = lo[c].min(s[c]);
            hi[c] = hi[c].max(s[c]);
        }
    }

    let mut best: Option<KmeansResult> = None;
    for _ in 0..criteria.attempts.max(1) {
        let result = attempt(samples, k, criteria, lo, hi, rng);
        let better = best
            .as_ref()
            .map_or(true, |b| result.compactness < b.compactness);
        if better {
            best = Some(result);
        }
    }
    best
}

fn attempt<R: Rng + ?Sized>(
    samples: &[[f32; 3]],
    k: usize,
    criteria: &KmeansCriteria,
    lo: [f32; 3],
    hi: [f32; 3],
    rng: &mut R,
) -> KmeansResult {
    let mut centers: Vec<[f32; 3]> = (0..k)
        .map(|_| {
            let mut c = [0f32; 3];
            for i in 0..3 {
                c[i] = if hi[i] > lo[i] {
                    rng.gen_range(lo[i]..hi[i])
                } else {
                    lo[i]
                };
            }
            c
        })
        .collect();
    let mut labels = vec![0usize; samples.len()];
    let eps2 = criteria.epsilon * criteria.epsilon;

    for _ in 0..criteria.max_iter.max(1) {
        for (label, s) in labels.iter_mut().zip(samples) {
            *label = nearest(s, &centers).0;
        }

        let mut sums = vec![[0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (&label, s) in labels.iter().zip(samples) {
            counts[label] += 1;
            for c in 0..3 {
                sums[label][c] += s[c] as f64;
            }
        }

        let mut next: Vec<[f32; 3]> = sums
            .iter()
            .zip(&counts)
            .zip(&centers)
            .map(|((sum, &n), old)| {
                if n == 0 {
                    *old
                } else {
                    [
                        (sum[0] / n as f64) as f32,
                        (sum[1] / n as f64) as f32,
                        (sum[2] / n as f64) as f32,
                    ]
                }
            })
            .collect();

        // Empty clusters take over the sample farthest from its own center.
        let empty: Vec<usize> = (0..k).filter(|&i| counts[i] == 0).collect();
        for cluster in empty {
            let mut far: Option<(usize, f32)> = None;
            for (i, s) in samples.iter().enumerate() {
                if counts[labels[i]] <= 1 {
                    continue;
                }
                let d = dist2(s, &next[labels[i]]);
                if far.map_or(true, |(_, best)| d >= best) {
                    far = Some((i, d));
                }
            }
            if let Some((i, _)) = far {
                counts[labels[i]] -= 1;
                labels[i] = cluster;
                counts[cluster] = 1;
                next[cluster] = samples[i];
            }
        }

        let shift = centers
            .iter()
            .zip(&next)
            .map(|(a, b)| dist2(a, b))
            .fold(0f32, f32::max);
        centers = next;
        if shift <= eps2 {
            break;
        }
    }

    let mut compactness = 0f64;
    for (label, s) in labels.iter_mut().zip(samples) {
        let (i, d) = nearest(s, &centers);
        *label = i;
        compactness += d as f64;
    }

    KmeansResult {
        labels,
        centers,
        compactness,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn separates_two_obvious_groups() {
        let mut samples = vec![[10.0, 10.0, 10.0]; 20];
        samples.extend(vec![[240.0, 200.0, 5.0]; 20]);
        let mut rng = StdRng::seed_from_u64(7);
        let result = kmeans(&samples, 2, &KmeansCriteria::default(), &mut rng).unwrap();

        assert!(result.compactness < 1e-3);
        assert_ne!(result.labels[0], result.labels[39]);
        assert!(result.labels[..20].iter().all(|&l| l == result.labels[0]));
        assert!(result.labels[20..].iter().all(|&l| l == result.labels[39]));
    }

    #[test]
    fn clamps_cluster_count_to_samples() {
        let samples = [[1.0, 2.0, 3.0], [100.0, 100.0, 100.0]];
        let mut rng = StdRng::seed_from_u64(1);
        let result = kmeans(&samples, 16, &KmeansCriteria::default(), &mut rng).unwrap();
        assert_eq!(result.centers.len(), 2);
        assert_ne!(result.labels[0], result.labels[1]);
    }

    #[test]
    fn identical_samples_collapse_to_one_color() {
        let samples = vec![[50.0, 60.0, 70.0]; 9];
        let mut rng = StdRng::seed_from_u64(3);
        let result = kmeans(&samples, 4, &KmeansCriteria::default(), &mut rng).unwrap();
        for &l in &result.labels {
            assert_eq!(result.centers[l], [50.0, 60.0, 70.0]);
        }
    }

    #[test]
    fn empty_input_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(kmeans(&[], 3, &KmeansCriteria::default(), &mut rng).is_none());
        assert!(kmeans(&[[0.0; 3]], 0, &KmeansCriteria::default(), &mut rng).is_none());
    }

    #[test]
    fn same_seed_same_clusters() {
        let samples: Vec<[f32; 3]> = (0..50)
            .map(|i| [(i * 5) as f32, (i * 3 % 255) as f32, (255 - i * 4) as f32])
            .collect();
        let a = kmeans(&samples, 4, &KmeansCriteria::default(), &mut StdRng::seed_from_u64(9)).unwrap();
        let b = kmeans(&samples, 4, &KmeansCriteria::default(), &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.centers, b.centers);
    }
}
