//! Tensor bundle files exchanged with external runtimes:
//! `{"tensors":[{"shape":[..],"data":[..]}]}`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::eval::{OutputSet, TensorValue};
use crate::runtime::RuntimeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorBundle {
    pub tensors: Vec<TensorValue>,
}

pub fn write_bundle(path: &Path, tensors: &[TensorValue]) -> Result<(), RuntimeError> {
    let bundle = TensorBundle {
        tensors: tensors.to_vec(),
    };
    let text = serde_json::to_string(&bundle).map_err(|source| RuntimeError::Bundle {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(|source| RuntimeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a bundle; element counts are validated against each shape.
pub fn read_bundle(path: &Path) -> Result<OutputSet, RuntimeError> {
    if !path.is_file() {
        return Err(RuntimeError::MissingOutputs(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|source| RuntimeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bundle: TensorBundle = serde_json::from_str(&text).map_err(|source| RuntimeError::Bundle {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(OutputSet::new(bundle.tensors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        let t = TensorValue::new(vec![2, 2], vec![0.1, -0.25, 3.0, 1e-7]).unwrap();
        write_bundle(&path, std::slice::from_ref(&t)).unwrap();
        let back = read_bundle(&path).unwrap();
        assert!(back.bit_identical(&OutputSet::single(t)));
    }

    #[test]
    fn element_count_is_checked_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"tensors":[{"shape":[2,3],"data":[1.0]}]}"#).unwrap();
        assert!(matches!(read_bundle(&path), Err(RuntimeError::Bundle { .. })));
    }
}
