//! On-disk blob format shared by the index and the matrix cache.
//!
//! Layout: `zstd( bincode(BlobHeader) ++ bincode(body) )`. The header is
//! decoded first so a file written by another build, or a matrix file passed
//! where an index is expected, is rejected before the body is touched.

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use zstd::{decode_all, encode_all};

use crate::IndexError;

/// Bump this value whenever the on-disk layout of any blob changes.
pub const INDEX_SCHEMA_VERSION: u16 = 1;

const MAGIC: [u8; 4] = *b"ASIX";
const ZSTD_LEVEL: i32 = 3;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlobKind {
    FlatIndex,
    EmbeddingMatrix,
}

#[derive(Serialize, Deserialize, Debug)]
struct BlobHeader {
    magic: [u8; 4],
    schema_version: u16,
    kind: BlobKind,
}

pub(crate) fn write_blob<T: Serialize>(
    path: &Path,
    kind: BlobKind,
    body: &T,
) -> Result<(), IndexError> {
    let header = BlobHeader {
        magic: MAGIC,
        schema_version: INDEX_SCHEMA_VERSION,
        kind,
    };
    let mut encoded = encode_to_vec(&header, standard())?;
    encoded.extend(encode_to_vec(body, standard())?);
    let compressed = encode_all(encoded.as_slice(), ZSTD_LEVEL)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    // Replace atomically; readers never see a half-written file.
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &compressed)?;
    fs::rename(&tmp, path)?;
    debug!(
        "wrote {:?} blob to {} ({} bytes)",
        kind,
        path.display(),
        compressed.len()
    );
    Ok(())
}

pub(crate) fn read_blob<T: DeserializeOwned>(path: &Path, kind: BlobKind) -> Result<T, IndexError> {
    let raw = fs::read(path)?;
    let decompressed = decode_all(raw.as_slice())
        .map_err(|e| IndexError::Corrupt(format!("{}: {e}", path.display())))?;
    let (header, read): (BlobHeader, usize) = decode_from_slice(&decompressed, standard())
        .map_err(|e| IndexError::Corrupt(format!("{}: bad header: {e}", path.display())))?;

    if header.magic != MAGIC {
        return Err(IndexError::Corrupt(format!(
            "{}: not an index file",
            path.display()
        )));
    }
    if header.schema_version != INDEX_SCHEMA_VERSION {
        return Err(IndexError::Corrupt(format!(
            "{}: schema version {} (expected {INDEX_SCHEMA_VERSION})",
            path.display(),
            header.schema_version
        )));
    }
    if header.kind != kind {
        return Err(IndexError::Corrupt(format!(
            "{}: holds {:?}, expected {:?}",
            path.display(),
            header.kind,
            kind
        )));
    }

    let (body, _) = decode_from_slice(&decompressed[read..], standard())?;
    Ok(body)
}
