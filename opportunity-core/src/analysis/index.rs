//! Composite opportunity index: first principal component of inverted
//! travel times, rescaled to 0-100.

use itertools::Itertools;
use log::{info, warn};
use ndarray::{Array1, Array2, Axis};

use crate::{Error, config::IndexConfig};

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOLERANCE: f64 = 1e-12;

/// Indicator column of per-ward values; `None` marks an unreachable ward
#[derive(Debug, Clone)]
pub struct Indicator {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Result of [`composite_index`], one entry per ward in input order
#[derive(Debug, Clone)]
pub struct CompositeIndex {
    /// Imputed indicator matrix (wards x indicators), before inversion
    pub filled: Array2<f64>,
    /// Value substituted for missing entries, per indicator
    pub fill_values: Vec<f64>,
    /// Projection of each ward on the first component
    pub raw: Vec<f64>,
    /// `raw` rescaled to 0-100
    pub scores: Vec<f64>,
    /// 1 = best score; ties keep input order
    pub ranks: Vec<usize>,
    pub loadings: Vec<f64>,
    pub explained_variance_ratio: f64,
}

/// Builds the composite index from indicator columns of equal length.
///
/// # Errors
///
/// Returns [`Error::StatisticsError`] with fewer than two wards, when an
/// indicator has no observed value, or when no indicator varies.
pub fn composite_index(
    indicators: &[Indicator],
    config: &IndexConfig,
) -> Result<CompositeIndex, Error> {
    let n = indicators.first().map_or(0, |column| column.values.len());
    if indicators.is_empty() || n < 2 {
        return Err(Error::StatisticsError(format!(
            "Composite index needs at least 2 wards and 1 indicator, got {n} wards"
        )));
    }
    if let Some(column) = indicators.iter().find(|column| column.values.len() != n) {
        return Err(Error::StatisticsError(format!(
            "Indicator '{}' has {} values, expected {n}",
            column.name,
            column.values.len()
        )));
    }

    let mut filled = Array2::zeros((n, indicators.len()));
    let mut fill_values = Vec::with_capacity(indicators.len());
    for (col, indicator) in indicators.iter().enumerate() {
        let (values, fill) = impute(indicator, config.missing_penalty)?;
        filled.column_mut(col).assign(&Array1::from(values));
        fill_values.push(fill);
    }

    let inverted = filled.mapv(|value| -value);
    let (loadings, explained_variance_ratio) = principal_component(&inverted)?;
    let raw = center(&inverted).dot(&loadings).to_vec();
    let scores = min_max_scale(&raw, 100.0);
    let ranks = rank_descending(&scores);

    info!(
        "First component explains {:.1}% of variance, loadings [{}]",
        explained_variance_ratio * 100.0,
        loadings.iter().map(|l| format!("{l:.3}")).join(", ")
    );

    Ok(CompositeIndex {
        filled,
        fill_values,
        raw,
        scores,
        ranks,
        loadings: loadings.to_vec(),
        explained_variance_ratio,
    })
}

/// Replaces missing values with `max * penalty`, or `max + 1` when that
/// would not exceed the maximum.
fn impute(indicator: &Indicator, penalty: f64) -> Result<(Vec<f64>, f64), Error> {
    let max = indicator
        .values
        .iter()
        .flatten()
        .copied()
        .filter(|value| value.is_finite())
        .reduce(f64::max)
        .ok_or_else(|| {
            Error::StatisticsError(format!(
                "Indicator '{}' has no observed values to impute from",
                indicator.name
            ))
        })?;
    let scaled = max * penalty;
    let fill = if scaled > max { scaled } else { max + 1.0 };

    let mut missing = 0;
    let values = indicator
        .values
        .iter()
        .map(|value| match value {
            Some(value) if value.is_finite() => *value,
            _ => {
                missing += 1;
                fill
            }
        })
        .collect();
    if missing > 0 {
        warn!(
            "Imputed {missing} missing '{}' values with {fill:.3}",
            indicator.name
        );
    }
    Ok((values, fill))
}

fn center(data: &Array2<f64>) -> Array2<f64> {
    match data.mean_axis(Axis(0)) {
        Some(mean) => data - &mean,
        None => data.clone(),
    }
}

/// Loadings of the first principal component and its share of variance.
///
/// The sign is fixed so that the largest absolute loading is positive.
pub fn principal_component(data: &Array2<f64>) -> Result<(Array1<f64>, f64), Error> {
    let n = data.nrows();
    if n < 2 {
        return Err(Error::StatisticsError(
            "Principal components need at least 2 observations".to_string(),
        ));
    }
    let centered = center(data);
    let covariance = centered.t().dot(&centered) / (n as f64 - 1.0);

    let (eigenvalues, eigenvectors) = jacobi_eigen(covariance);
    let total: f64 = eigenvalues.iter().map(|value| value.max(0.0)).sum();
    if total <= f64::EPSILON {
        return Err(Error::StatisticsError(
            "Indicators have zero variance; no component to extract".to_string(),
        ));
    }

    let first = eigenvalues
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(idx, _)| idx);
    let mut loadings = eigenvectors.column(first).to_owned();

    let dominant = loadings
        .iter()
        .copied()
        .reduce(|best, value| if value.abs() > best.abs() { value } else { best })
        .unwrap_or(0.0);
    if dominant < 0.0 {
        loadings.mapv_inplace(|value| -value);
    }

    Ok((loadings, eigenvalues[first].max(0.0) / total))
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns eigenvalues and a matrix whose columns are the eigenvectors.
fn jacobi_eigen(mut a: Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let size = a.nrows();
    let mut v = Array2::<f64>::eye(size);
    let scale = a.iter().map(|x| x * x).sum::<f64>().max(f64::MIN_POSITIVE);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off_diagonal: f64 = (0..size)
            .flat_map(|p| ((p + 1)..size).map(move |q| (p, q)))
            .map(|(p, q)| a[[p, q]] * a[[p, q]])
            .sum();
        if off_diagonal <= JACOBI_TOLERANCE * scale {
            break;
        }

        for p in 0..size {
            for q in (p + 1)..size {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + theta.mul_add(theta, 1.0).sqrt());
                let c = 1.0 / t.mul_add(t, 1.0).sqrt();
                let s = t * c;

                for k in 0..size {
                    let (akp, akq) = (a[[k, p]], a[[k, q]]);
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..size {
                    let (apk, aqk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..size {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    ((0..size).map(|i| a[[i, i]]).collect(), v)
}

/// Rescales values linearly onto `[0, upper]`.
///
/// A constant input has no spread to rescale and maps to all zeros.
pub fn min_max_scale(values: &[f64], upper: f64) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range <= f64::EPSILON * max.abs().max(1.0) {
        warn!("Scores have no spread; every ward gets 0");
        return vec![0.0; values.len()];
    }
    values
        .iter()
        .map(|value| (value - min) / range * upper)
        .collect()
}

/// 1-based ranks, highest value first; ties keep input order
pub fn rank_descending(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    let mut ranks = vec![0; values.len()];
    for (position, idx) in order.into_iter().enumerate() {
        ranks[idx] = position + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn indicator(name: &str, values: &[Option<f64>]) -> Indicator {
        Indicator {
            name: name.to_string(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn jacobi_recovers_known_eigenpairs() {
        let matrix = array![[2.0, 1.0], [1.0, 2.0]];
        let (values, vectors) = jacobi_eigen(matrix.clone());
        let mut sorted = values.clone();
        sorted.sort_by(f64::total_cmp);
        assert!((sorted[0] - 1.0).abs() < 1e-10);
        assert!((sorted[1] - 3.0).abs() < 1e-10);
        for (i, value) in values.iter().enumerate() {
            let vector = vectors.column(i);
            let product = matrix.dot(&vector);
            for k in 0..2 {
                assert!((product[k] - value * vector[k]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn component_follows_dominant_direction() {
        // Points along y = 2x with small noise
        let data = array![[0.0, 0.1], [1.0, 1.9], [2.0, 4.1], [3.0, 5.9], [4.0, 8.0]];
        let (loadings, ratio) = principal_component(&data).unwrap();
        assert!(ratio > 0.99);
        assert!(loadings[1] > 0.0);
        assert!((loadings[1] / loadings[0] - 2.0).abs() < 0.05);
        assert!((loadings.dot(&loadings) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn largest_loading_is_positive() {
        let data = array![[0.0, 10.0], [1.0, 8.0], [2.0, 6.0], [3.0, 4.0]];
        let (loadings, _) = principal_component(&data).unwrap();
        assert!(loadings[1].abs() > loadings[0].abs());
        assert!(loadings[1] > 0.0);
        assert!(loadings[0] < 0.0);
    }

    #[test]
    fn imputes_above_column_maximum() {
        let column = indicator("hospital", &[Some(10.0), None, Some(20.0)]);
        let (values, fill) = impute(&column, 1.1).unwrap();
        assert!((fill - 22.0).abs() < 1e-12);
        assert_eq!(values, vec![10.0, 22.0, 20.0]);

        let zeros = indicator("school", &[Some(0.0), None]);
        let (values, fill) = impute(&zeros, 1.1).unwrap();
        assert_eq!(fill, 1.0);
        assert_eq!(values, vec![0.0, 1.0]);

        let empty = indicator("transport", &[None, None]);
        assert!(matches!(impute(&empty, 1.1), Err(Error::StatisticsError(_))));
    }

    #[test]
    fn scores_span_zero_to_hundred() {
        let indicators = vec![
            indicator("hospital", &[Some(5.0), Some(12.0), Some(30.0), None, Some(8.0)]),
            indicator("school", &[Some(3.0), Some(10.0), Some(25.0), Some(40.0), Some(6.0)]),
            indicator("transport", &[Some(2.0), Some(6.0), Some(18.0), Some(22.0), Some(4.0)]),
        ];
        let index = composite_index(&indicators, &IndexConfig::default()).unwrap();

        let min = index.scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = index.scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(min.abs() < 1e-9);
        assert!((max - 100.0).abs() < 1e-9);

        // Shortest times everywhere -> best ward; the unreachable one -> worst
        assert_eq!(index.ranks[0], 1);
        assert_eq!(index.ranks[3], 5);
        assert!((index.fill_values[0] - 33.0).abs() < 1e-9);
        assert!(index.filled[[3, 0]] > 30.0);

        let mut ranks = index.ranks.clone();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn ranks_are_stable_for_ties() {
        assert_eq!(rank_descending(&[50.0, 100.0, 50.0, 0.0]), vec![2, 1, 3, 4]);
    }

    #[test]
    fn constant_scores_are_zero() {
        assert_eq!(min_max_scale(&[3.0, 3.0, 3.0], 100.0), vec![0.0; 3]);
    }

    #[test]
    fn zero_variance_is_an_error() {
        let indicators = vec![indicator("hospital", &[Some(4.0), Some(4.0), Some(4.0)])];
        assert!(matches!(
            composite_index(&indicators, &IndexConfig::default()),
            Err(Error::StatisticsError(_))
        ));
    }

    #[test]
    fn needs_two_wards() {
        let indicators = vec![indicator("hospital", &[Some(4.0)])];
        assert!(composite_index(&indicators, &IndexConfig::default()).is_err());
    }
}
