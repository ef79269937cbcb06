use geo::Point;
use ndarray::Array2;

use crate::Error;

/// Sparse spatial weights: for every ward, its neighbours and their weights
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialWeights {
    neighbors: Vec<Vec<usize>>,
    weights: Vec<Vec<f64>>,
}

impl SpatialWeights {
    /// Binary k-nearest-neighbour weights over planar points.
    ///
    /// Neighbours are the `k` closest other points; equal distances go to
    /// the lower index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatisticsError`] when `k` is zero or there are not
    /// more than `k` points.
    pub fn knn(points: &[Point<f64>], k: usize) -> Result<Self, Error> {
        let n = points.len();
        if k == 0 || n <= k {
            return Err(Error::StatisticsError(format!(
                "KNN weights with k = {k} need more than {k} wards, got {n}"
            )));
        }

        let neighbors: Vec<Vec<usize>> = points
            .iter()
            .enumerate()
            .map(|(i, origin)| {
                let mut others: Vec<(usize, f64)> = points
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(j, point)| {
                        let dx = point.x() - origin.x();
                        let dy = point.y() - origin.y();
                        (j, dx.mul_add(dx, dy * dy))
                    })
                    .collect();
                others.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                others.into_iter().take(k).map(|(j, _)| j).collect()
            })
            .collect();
        let weights = neighbors.iter().map(|row| vec![1.0; row.len()]).collect();

        Ok(Self { neighbors, weights })
    }

    /// Scales every row to sum to 1
    pub fn row_standardized(mut self) -> Self {
        for row in &mut self.weights {
            let total: f64 = row.iter().sum();
            if total > 0.0 {
                row.iter_mut().for_each(|w| *w /= total);
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    pub fn weights(&self, i: usize) -> &[f64] {
        &self.weights[i]
    }

    /// Sum of all weights (S0)
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().flatten().sum()
    }

    /// Weighted sum of neighbour values for every ward
    pub fn lag(&self, values: &[f64]) -> Vec<f64> {
        self.neighbors
            .iter()
            .zip(&self.weights)
            .map(|(row, weights)| {
                row.iter()
                    .zip(weights)
                    .map(|(&j, w)| w * values[j])
                    .sum()
            })
            .collect()
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let n = self.len();
        let mut dense = Array2::zeros((n, n));
        for (i, (row, weights)) in self.neighbors.iter().zip(&self.weights).enumerate() {
            for (&j, &w) in row.iter().zip(weights) {
                dense[[i, j]] = w;
            }
        }
        dense
    }
}
