use log::{debug, info};
use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use std::time::Instant;

use crate::persist::{read_blob, write_blob, BlobKind};
use crate::IndexError;

/// Slot id used to pad results when fewer than `k` vectors exist.
pub const EMPTY_SLOT: i64 = -1;

/// Exact (brute-force) inner-product index.
///
/// Vectors are stored row-major in insertion order; slot `i` is the `i`-th
/// vector ever added. With unit-length inputs the scores are cosine
/// similarities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatIpIndex {
    dimension: usize,
    vectors: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn ntotal(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ntotal() == 0
    }

    /// Append `rows` after the existing vectors.
    pub fn add(&mut self, rows: ArrayView2<'_, f32>) -> Result<(), IndexError> {
        if rows.ncols() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                found: rows.ncols(),
            });
        }
        self.vectors.reserve(rows.len());
        self.vectors.extend(rows.iter().copied());
        debug!("added {} vectors (ntotal={})", rows.nrows(), self.ntotal());
        Ok(())
    }

    /// Top-`k` slots by inner product with `query`.
    ///
    /// Returns `(scores, ids)`, both exactly `k` long. Results are ordered by
    /// descending score with ties broken by ascending slot. When fewer than
    /// `k` vectors exist the tail is padded with `f32::NEG_INFINITY` and
    /// [`EMPTY_SLOT`].
    pub fn search(&self, query: &[f32], k: usize) -> Result<(Vec<f32>, Vec<i64>), IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }
        if k == 0 || self.dimension == 0 {
            return Ok((vec![f32::NEG_INFINITY; k], vec![EMPTY_SLOT; k]));
        }

        let start = Instant::now();
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .par_chunks(self.dimension)
            .enumerate()
            .map(|(slot, row)| (slot, dot(row, query)))
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(rank);

        let mut scores = Vec::with_capacity(k);
        let mut ids = Vec::with_capacity(k);
        for (slot, score) in scored {
            scores.push(score);
            ids.push(slot as i64);
        }
        scores.resize(k, f32::NEG_INFINITY);
        ids.resize(k, EMPTY_SLOT);

        debug!(
            "flat search k={} ntotal={} took {}us",
            k,
            self.ntotal(),
            start.elapsed().as_micros()
        );
        Ok((scores, ids))
    }

    pub fn write_to_path(&self, path: &Path) -> Result<(), IndexError> {
        write_blob(path, BlobKind::FlatIndex, self)?;
        info!(
            "index saved to {} ({} vectors, dim {})",
            path.display(),
            self.ntotal(),
            self.dimension
        );
        Ok(())
    }

    pub fn read_from_path(path: &Path) -> Result<Self, IndexError> {
        let index: Self = read_blob(path, BlobKind::FlatIndex)?;
        let ragged = match index.dimension {
            0 => !index.vectors.is_empty(),
            d => index.vectors.len() % d != 0,
        };
        if ragged {
            return Err(IndexError::Corrupt(format!(
                "{}: {} floats do not divide into {}-d rows",
                path.display(),
                index.vectors.len(),
                index.dimension
            )));
        }
        info!(
            "index loaded from {} ({} vectors, dim {})",
            path.display(),
            index.ntotal(),
            index.dimension
        );
        Ok(index)
    }
}

fn rank(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    fn sample() -> FlatIpIndex {
        let mut index = FlatIpIndex::new(2);
        index
            .add(array![[1.0, 0.0], [0.0, 1.0], [0.6, 0.8], [1.0, 0.0]].view())
            .unwrap();
        index
    }

    #[test]
    fn search_orders_by_score() {
        let (scores, ids) = sample().search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!((scores[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn ties_break_by_ascending_slot() {
        let (_, ids) = sample().search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(ids, vec![0, 3]);
        let (_, all) = sample().search(&[1.0, 0.0], 4).unwrap();
        assert_eq!(all, vec![0, 3, 2, 1]);
    }

    #[test]
    fn pads_when_k_exceeds_ntotal() {
        let (scores, ids) = sample().search(&[1.0, 0.0], 6).unwrap();
        assert_eq!(ids.len(), 6);
        assert_eq!(&ids[4..], &[EMPTY_SLOT, EMPTY_SLOT]);
        assert!(scores[5].is_infinite() && scores[5] < 0.0);
    }

    #[test]
    fn zero_k_is_empty() {
        let (scores, ids) = sample().search(&[1.0, 0.0], 0).unwrap();
        assert!(scores.is_empty() && ids.is_empty());
    }

    #[test]
    fn empty_index_returns_only_sentinels() {
        let index = FlatIpIndex::new(3);
        let (_, ids) = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(ids, vec![EMPTY_SLOT, EMPTY_SLOT]);
    }

    #[test]
    fn query_dimension_checked() {
        let err = sample().search(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                found: 3
            }
        ));
    }

    #[test]
    fn add_dimension_checked() {
        let mut index = FlatIpIndex::new(3);
        assert!(index.add(array![[1.0, 2.0]].view()).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn persisted_index_answers_identically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.index");
        let index = sample();
        index.write_to_path(&path).unwrap();
        let loaded = FlatIpIndex::read_from_path(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(
            loaded.search(&[0.6, 0.8], 3).unwrap(),
            index.search(&[0.6, 0.8], 3).unwrap()
        );
    }
}
