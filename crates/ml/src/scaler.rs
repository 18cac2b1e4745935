// Standardization over a matchup's own feature matrix

use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_preprocessing::linear_scaling::LinearScaler;
use linfa_preprocessing::PreprocessingError;
use matchup_models::{FeatureScaler, FeatureVector, FEATURE_COUNT};
use ndarray::{Array2, Axis};

/// Stacks feature vectors row-wise into an `n x 16` matrix.
pub fn to_matrix(vectors: &[FeatureVector]) -> Array2<f64> {
    let mut matrix = Array2::zeros((vectors.len(), FEATURE_COUNT));
    for (mut row, vector) in matrix.axis_iter_mut(Axis(0)).zip(vectors) {
        for (cell, value) in row.iter_mut().zip(vector.as_slice()) {
            *cell = *value;
        }
    }
    matrix
}

/// Fits a standard scaler on `matrix` and returns it with the scaled matrix.
///
/// Constant columns keep a scale of 1 so they map to zero instead of NaN.
pub fn standardize(matrix: &Array2<f64>) -> Result<(FeatureScaler, Array2<f64>), PreprocessingError> {
    let dataset = DatasetBase::from(matrix.clone());
    let fitted = LinearScaler::standard().fit(&dataset)?;

    let mut mean = [0.0; FEATURE_COUNT];
    let mut scale = [1.0; FEATURE_COUNT];
    for (slot, offset) in mean.iter_mut().zip(fitted.offsets()) {
        *slot = *offset;
    }
    for (slot, factor) in scale.iter_mut().zip(fitted.scales()) {
        *slot = *factor;
    }

    let scaled = fitted.transform(matrix.clone());
    Ok((FeatureScaler { mean, scale }, scaled))
}

/// Total sum of squares around the column means.
pub fn total_sum_of_squares(matrix: &Array2<f64>) -> f64 {
    if matrix.nrows() == 0 {
        return 0.0;
    }
    matrix
        .axis_iter(Axis(1))
        .map(|column| {
            let m = column.mean().unwrap_or(0.0);
            column.iter().map(|v| (v - m) * (v - m)).sum::<f64>()
        })
        .sum()
}
