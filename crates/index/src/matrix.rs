use log::info;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::persist::{read_blob, write_blob, BlobKind};
use crate::IndexError;

/// Dense `rows x dimension` matrix of raw embeddings, one row per document.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    data: Array2<f32>,
}

#[derive(Serialize, Deserialize)]
struct StoredMatrix {
    rows: usize,
    dimension: usize,
    values: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Stack equally sized rows. Ragged input is a dimension mismatch.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let dimension = rows.first().map(Vec::len).unwrap_or(0);
        let mut values = Vec::with_capacity(rows.len() * dimension);
        let n = rows.len();
        for row in rows {
            if row.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    found: row.len(),
                });
            }
            values.extend(row);
        }
        let data = Array2::from_shape_vec((n, dimension), values)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        Ok(Self { data })
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn dimension(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    pub fn into_inner(self) -> Array2<f32> {
        self.data
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let stored = StoredMatrix {
            rows: self.rows(),
            dimension: self.dimension(),
            values: self.data.iter().copied().collect(),
        };
        write_blob(path, BlobKind::EmbeddingMatrix, &stored)?;
        info!(
            "embedding matrix saved to {} ({}x{})",
            path.display(),
            stored.rows,
            stored.dimension
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let stored: StoredMatrix = read_blob(path, BlobKind::EmbeddingMatrix)?;
        let data = Array2::from_shape_vec((stored.rows, stored.dimension), stored.values)
            .map_err(|e| IndexError::Corrupt(format!("{}: {e}", path.display())))?;
        info!(
            "embedding matrix loaded from {} ({}x{})",
            path.display(),
            data.nrows(),
            data.ncols()
        );
        Ok(Self { data })
    }
}

/// Scale each row of `rows` to unit L2 norm. All-zero rows are left as is.
pub fn normalize_l2(rows: &mut Array2<f32>) {
    for mut row in rows.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|x| x / norm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn from_rows_rejects_ragged_input() {
        let err = EmbeddingMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn save_and_load_preserve_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("embeddings.bin");
        let matrix =
            EmbeddingMatrix::from_rows(vec![vec![0.5, -1.25, 3.0], vec![7.0, 0.0, 1e-6]]).unwrap();
        matrix.save(&path).unwrap();
        let loaded = EmbeddingMatrix::load(&path).unwrap();
        assert_eq!(loaded, matrix);
        assert_eq!(loaded.rows(), 2);
        assert_eq!(loaded.dimension(), 3);
    }

    #[test]
    fn normalize_rows_to_unit_length() {
        let mut rows = array![[3.0f32, 4.0], [0.0, 0.0], [0.0, 2.0]];
        normalize_l2(&mut rows);
        assert!((rows[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((rows[[0, 1]] - 0.8).abs() < 1e-6);
        assert_eq!(rows.row(1).to_vec(), vec![0.0, 0.0]);
        assert_eq!(rows.row(2).to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn matrix_file_is_not_an_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("embeddings.bin");
        EmbeddingMatrix::from_rows(vec![vec![1.0]]).unwrap().save(&path).unwrap();
        let err = crate::FlatIpIndex::read_from_path(&path).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
    }
}
