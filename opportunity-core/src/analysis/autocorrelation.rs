//! Global and local Moran's I with permutation inference.

use std::fmt;

use rand::{Rng, seq::SliceRandom, seq::index::sample};
use serde::Serialize;

use super::weights::SpatialWeights;
use crate::Error;

/// Global Moran's I result
#[derive(Debug, Clone, Serialize)]
pub struct GlobalMoran {
    pub i: f64,
    /// Expected value under spatial randomness, -1/(n-1)
    pub expected: f64,
    /// Folded pseudo p-value from permutations
    pub p_sim: f64,
    /// Standardised deviation of `i` from the permutation distribution
    pub z_sim: Option<f64>,
    pub permutations: usize,
}

/// Scatterplot quadrant of a ward's value against its spatial lag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quadrant {
    HighHigh = 1,
    LowHigh = 2,
    LowLow = 3,
    HighLow = 4,
}

impl Quadrant {
    fn from_signs(z: f64, lag: f64) -> Self {
        match (z > 0.0, lag > 0.0) {
            (true, true) => Self::HighHigh,
            (false, true) => Self::LowHigh,
            (false, false) => Self::LowLow,
            (true, false) => Self::HighLow,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::HighHigh => "High-High (Opportunity Hub)",
            Self::LowHigh => "Low-High (Outlier)",
            Self::LowLow => "Low-Low (Service Desert)",
            Self::HighLow => "High-Low (Outlier)",
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub const NOT_SIGNIFICANT: &str = "Not Significant";

/// Local Moran's I for one ward
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalMoran {
    pub i: f64,
    pub quadrant: Quadrant,
    pub p_sim: f64,
}

impl LocalMoran {
    /// Quadrant label when `p_sim` is below `threshold`, else "Not Significant"
    pub fn label(&self, threshold: f64) -> &'static str {
        if self.p_sim < threshold {
            self.quadrant.label()
        } else {
            NOT_SIGNIFICANT
        }
    }
}

fn deviations(values: &[f64]) -> Result<Vec<f64>, Error> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let z: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let variance = z.iter().map(|d| d * d).sum::<f64>() / n;
    if !(variance > f64::EPSILON * mean.abs().max(1.0)) {
        return Err(Error::StatisticsError(
            "Values have zero variance; spatial autocorrelation is undefined".to_string(),
        ));
    }
    Ok(z)
}

fn check_sizes(values: &[f64], weights: &SpatialWeights) -> Result<(), Error> {
    if values.len() != weights.len() || values.len() < 2 {
        return Err(Error::StatisticsError(format!(
            "{} values do not match {} weight rows",
            values.len(),
            weights.len()
        )));
    }
    Ok(())
}

fn moran_statistic(z: &[f64], weights: &SpatialWeights, s0: f64, denominator: f64) -> f64 {
    let numerator: f64 = z.iter().zip(weights.lag(z)).map(|(zi, lag)| zi * lag).sum();
    z.len() as f64 / s0 * numerator / denominator
}

/// Folded pseudo p-value: the smaller tail count, plus one, over
/// `permutations + 1`
fn folded_p_value(larger: usize, permutations: usize) -> f64 {
    let tail = larger.min(permutations - larger);
    (tail + 1) as f64 / (permutations + 1) as f64
}

/// Global Moran's I with a permutation test.
///
/// # Errors
///
/// Returns [`Error::StatisticsError`] for mismatched sizes or constant values.
pub fn global_moran<R: Rng + ?Sized>(
    values: &[f64],
    weights: &SpatialWeights,
    permutations: usize,
    rng: &mut R,
) -> Result<GlobalMoran, Error> {
    check_sizes(values, weights)?;
    let z = deviations(values)?;
    let s0 = weights.total_weight();
    let denominator: f64 = z.iter().map(|d| d * d).sum();
    let i = moran_statistic(&z, weights, s0, denominator);

    let mut shuffled = z.clone();
    let simulated: Vec<f64> = (0..permutations)
        .map(|_| {
            shuffled.shuffle(rng);
            moran_statistic(&shuffled, weights, s0, denominator)
        })
        .collect();

    let larger = simulated.iter().filter(|&&sim| sim >= i).count();
    let mean = simulated.iter().sum::<f64>() / permutations as f64;
    let std = (simulated.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / permutations as f64)
        .sqrt();

    Ok(GlobalMoran {
        i,
        expected: -1.0 / (values.len() as f64 - 1.0),
        p_sim: folded_p_value(larger, permutations),
        z_sim: (std > 0.0).then(|| (i - mean) / std),
        permutations,
    })
}

/// Local Moran's I with conditional permutation p-values.
///
/// For each ward, neighbour values are redrawn without replacement from the
/// other `n - 1` wards while the ward's own value stays fixed.
///
/// # Errors
///
/// Returns [`Error::StatisticsError`] for mismatched sizes or constant values.
pub fn local_moran<R: Rng + ?Sized>(
    values: &[f64],
    weights: &SpatialWeights,
    permutations: usize,
    rng: &mut R,
) -> Result<Vec<LocalMoran>, Error> {
    check_sizes(values, weights)?;
    let n = values.len();
    let deviations = deviations(values)?;
    let std = (deviations.iter().map(|d| d * d).sum::<f64>() / n as f64).sqrt();
    let z: Vec<f64> = deviations.iter().map(|d| d / std).collect();
    let denominator: f64 = z.iter().map(|v| v * v).sum();
    let scale = (n as f64 - 1.0) / denominator;
    let lag = weights.lag(&z);

    let results = (0..n)
        .map(|i| {
            let observed = scale * z[i] * lag[i];
            let row = weights.weights(i);

            let mut larger = 0;
            for _ in 0..permutations {
                let simulated_lag: f64 = sample(rng, n - 1, row.len())
                    .iter()
                    .map(|j| if j >= i { j + 1 } else { j })
                    .zip(row)
                    .map(|(j, w)| w * z[j])
                    .sum();
                if scale * z[i] * simulated_lag >= observed {
                    larger += 1;
                }
            }

            LocalMoran {
                i: observed,
                quadrant: Quadrant::from_signs(z[i], lag[i]),
                p_sim: folded_p_value(larger, permutations),
            }
        })
        .collect();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use geo::Point;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    /// 6 x 4 grid; the west half scores high, the east half low
    fn clustered() -> (Vec<f64>, SpatialWeights) {
        let mut points = Vec::new();
        let mut values = Vec::new();
        for row in 0..4 {
            for col in 0..6 {
                points.push(Point::new(f64::from(col), f64::from(row)));
                let base = if col < 3 { 80.0 } else { 20.0 };
                values.push(base + f64::from(row + col % 3));
            }
        }
        let weights = SpatialWeights::knn(&points, 4).unwrap().row_standardized();
        (values, weights)
    }

    #[test]
    fn detects_global_clustering() {
        let (values, weights) = clustered();
        let mut rng = StdRng::seed_from_u64(12345);
        let result = global_moran(&values, &weights, 999, &mut rng).unwrap();
        assert!(result.i > 0.5, "{}", result.i);
        assert!((result.expected + 1.0 / 23.0).abs() < 1e-12);
        assert!(result.p_sim < 0.01);
        assert!(result.z_sim.unwrap() > 2.0);
    }

    #[test]
    fn results_repeat_with_the_same_seed() {
        let (values, weights) = clustered();
        let first = local_moran(&values, &weights, 199, &mut StdRng::seed_from_u64(7)).unwrap();
        let second = local_moran(&values, &weights, 199, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn local_quadrants_match_sides() {
        let (values, weights) = clustered();
        let mut rng = StdRng::seed_from_u64(12345);
        let local = local_moran(&values, &weights, 999, &mut rng).unwrap();

        // West interior is a hub, east interior a desert
        assert_eq!(local[6].quadrant, Quadrant::HighHigh);
        assert_eq!(local[10].quadrant, Quadrant::LowLow);
        assert!(local[6].i > 0.0);
        assert!(local.iter().all(|result| result.p_sim > 0.0 && result.p_sim <= 0.5 + 1e-12));
        let significant = local.iter().filter(|r| r.label(0.05) != NOT_SIGNIFICANT).count();
        assert!(significant > 0);
    }

    #[test]
    fn labels_respect_threshold() {
        let result = LocalMoran {
            i: 1.2,
            quadrant: Quadrant::LowLow,
            p_sim: 0.05,
        };
        assert_eq!(result.label(0.05), NOT_SIGNIFICANT);
        assert_eq!(result.label(0.1), "Low-Low (Service Desert)");
        assert_eq!(Quadrant::HighLow.code(), 4);
    }

    #[test]
    fn constant_values_are_rejected() {
        let (_, weights) = clustered();
        let values = vec![50.0; weights.len()];
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            global_moran(&values, &weights, 99, &mut rng),
            Err(Error::StatisticsError(_))
        ));
        assert!(local_moran(&values, &weights, 99, &mut rng).is_err());
    }

    #[test]
    fn folded_p_uses_smaller_tail() {
        assert!((folded_p_value(990, 999) - 10.0 / 1000.0).abs() < 1e-12);
        assert!((folded_p_value(0, 999) - 1.0 / 1000.0).abs() < 1e-12);
    }
}
