use ndarray::{ArrayView2, Axis};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Mean of each row.
    pub fn row_means(matrix: ArrayView2<f32>) -> Vec<f32> {
        if matrix.ncols() == 0 {
            return vec![0.0; matrix.nrows()];
        }
        matrix
            .mean_axis(Axis(1))
            .map(|means| means.to_vec())
            .unwrap_or_default()
    }

    /// Mean of each column.
    pub fn column_means(matrix: ArrayView2<f32>) -> Vec<f32> {
        if matrix.nrows() == 0 {
            return vec![0.0; matrix.ncols()];
        }
        matrix
            .mean_axis(Axis(0))
            .map(|means| means.to_vec())
            .unwrap_or_default()
    }
}
