//! # Vector index
//!
//! Exact inner-product search over dense embeddings, plus the on-disk cache
//! for the raw embedding matrix it is built from.
//!
//! The index is deliberately flat: every query scans every vector. For the
//! corpus sizes this is used with (a few thousand abstracts) that is both
//! fast and exact, and it makes result order fully deterministic: descending
//! score, then ascending slot.
//!
//! Both [`FlatIpIndex`] and [`EmbeddingMatrix`] persist as zstd-compressed
//! bincode blobs behind a small header carrying [`INDEX_SCHEMA_VERSION`].
//!
//! ## Example Usage
//!
//! ```
//! use index::{normalize_l2, EmbeddingMatrix, FlatIpIndex};
//!
//! let matrix = EmbeddingMatrix::from_rows(vec![vec![3.0, 4.0], vec![0.0, 2.0]]).unwrap();
//! let mut rows = matrix.into_inner();
//! normalize_l2(&mut rows);
//!
//! let mut index = FlatIpIndex::new(2);
//! index.add(rows.view()).unwrap();
//!
//! let (scores, ids) = index.search(&[0.0, 1.0], 3).unwrap();
//! assert_eq!(ids, vec![1, 0, -1]);
//! assert!((scores[0] - 1.0).abs() < 1e-6);
//! ```

mod error;
mod flat;
mod matrix;
mod persist;

pub use error::IndexError;
pub use flat::{FlatIpIndex, EMPTY_SLOT};
pub use matrix::{normalize_l2, EmbeddingMatrix};
pub use persist::INDEX_SCHEMA_VERSION;
