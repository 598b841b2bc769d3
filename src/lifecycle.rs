// 🔄 Lifecycle Clusterer - Standardize features, k-means into 4 groups, label by revenue rank
//
// 1. z-score each feature across the population (population std, zero variance → 0)
// 2. k-means (k = 4), k-means++ seeding from a seeded RNG, best of n_init runs
// 3. mean revenue_avg_6m per cluster, ascending
// 4. labels in that order: Início, Declínio, Crescimento, Maturidade
//
// The revenue-rank labeling is a heuristic: it assumes cluster revenue order maps
// onto the lifecycle stages. Same input + same seed → same assignment.

use crate::error::{AnalyticsError, Result};
use crate::features::CompanyFeatures;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

pub const CLUSTER_COUNT: usize = 4;

// ============================================================================
// LIFECYCLE MOMENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecycleMoment {
    #[serde(rename = "Início")]
    Inicio,
    #[serde(rename = "Declínio")]
    Declinio,
    #[serde(rename = "Crescimento")]
    Crescimento,
    #[serde(rename = "Maturidade")]
    Maturidade,
}

impl LifecycleMoment {
    /// Lowest → highest mean revenue
    pub const ORDERED: [LifecycleMoment; CLUSTER_COUNT] = [
        LifecycleMoment::Inicio,
        LifecycleMoment::Declinio,
        LifecycleMoment::Crescimento,
        LifecycleMoment::Maturidade,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LifecycleMoment::Inicio => "Início",
            LifecycleMoment::Declinio => "Declínio",
            LifecycleMoment::Crescimento => "Crescimento",
            LifecycleMoment::Maturidade => "Maturidade",
        }
    }
}

impl fmt::Display for LifecycleMoment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// PROFILE
// ============================================================================

/// Company features + lifecycle classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    #[serde(flatten)]
    pub features: CompanyFeatures,
    pub cluster_id: usize,
    pub lifecycle_moment: LifecycleMoment,
}

impl CompanyProfile {
    pub fn company_id(&self) -> &str {
        &self.features.company_id
    }

    pub fn sector(&self) -> &str {
        &self.features.sector
    }
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    pub seed: u64,
    pub n_init: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig {
            seed: 42,
            n_init: 10,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

// ============================================================================
// STANDARDIZATION
// ============================================================================

/// Z-score each column (population std). Constant columns become all zeros.
pub fn standardize(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = rows.len();
    if n == 0 {
        return Vec::new();
    }
    let dims = rows[0].len();

    let mut means = vec![0.0; dims];
    for row in rows {
        for (d, value) in row.iter().enumerate() {
            means[d] += value;
        }
    }
    for m in means.iter_mut() {
        *m /= n as f64;
    }

    let mut stds = vec![0.0; dims];
    for row in rows {
        for (d, value) in row.iter().enumerate() {
            stds[d] += (value - means[d]).powi(2);
        }
    }
    for s in stds.iter_mut() {
        *s = (*s / n as f64).sqrt();
        if *s == 0.0 || !s.is_finite() {
            *s = 1.0;
        }
    }

    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(d, value)| (value - means[d]) / stds[d])
                .collect()
        })
        .collect()
}

// ============================================================================
// K-MEANS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
    pub iterations: usize,
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// k-means++ seeding: first centroid uniform, then proportional to D²
fn seed_centroids(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())].clone()];

    while centroids.len() < k {
        let distances: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = distances.iter().sum();

        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = distances.len() - 1;
            for (i, d) in distances.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };

        centroids.push(points[next].clone());
    }

    centroids
}

fn lloyd(points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, config: &ClusteringConfig) -> KMeansFit {
    let k = centroids.len();
    let dims = points[0].len();
    let mut assignments = vec![0; points.len()];
    let mut iterations = 0;

    for iteration in 0..config.max_iterations {
        iterations = iteration + 1;

        for (i, point) in points.iter().enumerate() {
            assignments[i] = nearest(point, &centroids).0;
        }

        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (point, &cluster) in points.iter().zip(&assignments) {
            counts[cluster] += 1;
            for (d, value) in point.iter().enumerate() {
                sums[cluster][d] += value;
            }
        }

        let mut updated: Vec<Vec<f64>> = sums
            .into_iter()
            .zip(&counts)
            .map(|(sum, &count)| {
                if count == 0 {
                    sum
                } else {
                    sum.into_iter().map(|s| s / count as f64).collect()
                }
            })
            .collect();

        // Empty cluster: move it onto the point farthest from its own centroid
        let mut taken = HashSet::new();
        for cluster in 0..k {
            if counts[cluster] != 0 {
                continue;
            }
            let farthest = points
                .iter()
                .enumerate()
                .filter(|(i, _)| !taken.contains(i))
                .map(|(i, p)| (i, squared_distance(p, &updated[assignments[i]])))
                .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
                .map(|(i, _)| i);
            if let Some(i) = farthest {
                taken.insert(i);
                updated[cluster] = points[i].clone();
            }
        }

        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(old, new)| squared_distance(old, new))
            .sum();
        centroids = updated;

        if shift <= config.tolerance {
            break;
        }
    }

    let mut inertia = 0.0;
    for (i, point) in points.iter().enumerate() {
        let (cluster, distance) = nearest(point, &centroids);
        assignments[i] = cluster;
        inertia += distance;
    }

    KMeansFit {
        assignments,
        centroids,
        inertia,
        iterations,
    }
}

/// Best-of-n_init k-means. Requires at least `k` distinct points.
pub fn kmeans(points: &[Vec<f64>], k: usize, config: &ClusteringConfig) -> Result<KMeansFit> {
    let distinct: HashSet<Vec<u64>> = points
        .iter()
        .map(|p| p.iter().map(|v| v.to_bits()).collect())
        .collect();
    if distinct.len() < k {
        return Err(AnalyticsError::configuration(format!(
            "clustering needs at least {} distinct companies, found {}",
            k,
            distinct.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<KMeansFit> = None;

    for run in 0..config.n_init.max(1) {
        let centroids = seed_centroids(points, k, &mut rng);
        let fit = lloyd(points, centroids, config);
        debug!(run, inertia = fit.inertia, iterations = fit.iterations, "k-means run finished");

        if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }

    best.ok_or_else(|| AnalyticsError::configuration("k-means produced no result"))
}

// ============================================================================
// LABELING
// ============================================================================

/// Cluster a feature table and attach lifecycle labels
pub fn classify(features: Vec<CompanyFeatures>, config: &ClusteringConfig) -> Result<Vec<CompanyProfile>> {
    if features.len() < CLUSTER_COUNT {
        return Err(AnalyticsError::configuration(format!(
            "clustering needs at least {} companies, found {}",
            CLUSTER_COUNT,
            features.len()
        )));
    }

    let raw: Vec<Vec<f64>> = features.iter().map(|f| f.vector().to_vec()).collect();
    let points = standardize(&raw);
    let fit = kmeans(&points, CLUSTER_COUNT, config)?;

    // Mean revenue per cluster; an empty cluster cannot be ranked
    let mut totals = [0.0; CLUSTER_COUNT];
    let mut counts = [0usize; CLUSTER_COUNT];
    for (f, &cluster) in features.iter().zip(&fit.assignments) {
        totals[cluster] += f.revenue_avg_6m;
        counts[cluster] += 1;
    }
    if let Some(empty) = counts.iter().position(|&c| c == 0) {
        return Err(AnalyticsError::configuration(format!(
            "cluster {} is empty, cannot assign lifecycle labels",
            empty
        )));
    }

    let mut ranked: Vec<(usize, f64)> = (0..CLUSTER_COUNT)
        .map(|c| (c, totals[c] / counts[c] as f64))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut moment_of = [LifecycleMoment::Inicio; CLUSTER_COUNT];
    for (rank, (cluster, mean_revenue)) in ranked.iter().enumerate() {
        moment_of[*cluster] = LifecycleMoment::ORDERED[rank];
        info!(
            cluster,
            moment = %LifecycleMoment::ORDERED[rank],
            mean_revenue,
            companies = counts[*cluster],
            "Lifecycle cluster labeled"
        );
    }

    Ok(features
        .into_iter()
        .zip(fit.assignments)
        .map(|(features, cluster_id)| CompanyProfile {
            features,
            cluster_id,
            lifecycle_moment: moment_of[cluster_id],
        })
        .collect())
}
