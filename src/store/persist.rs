use std::fs;
use std::io::BufReader;
use std::path::Path;

use super::{StateDocument, StoreError};

pub(super) fn read_document(path: &Path) -> Result<StateDocument, StoreError> {
    let file = fs::File::open(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize to a temp sibling and atomically rename over the canonical
/// path. Partial writes are never observable at `path`.
pub(super) fn write_document(path: &Path, doc: &StateDocument) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("tmp");
    let io_err = |source| StoreError::Io {
        path: tmp_path.clone(),
        source,
    };

    let file = fs::File::create(&tmp_path).map_err(io_err)?;
    serde_json::to_writer_pretty(&file, doc).map_err(|source| {
        if source.is_io() {
            StoreError::Io {
                path: tmp_path.clone(),
                source: source.into(),
            }
        } else {
            StoreError::Corrupt {
                path: tmp_path.clone(),
                source,
            }
        }
    })?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
