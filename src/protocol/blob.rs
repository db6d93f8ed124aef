// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Deep-copy blobs: a self-contained serialized value that can be loaded into
//! any session, on any server.
//!
//! Layout: `DPFB` magic, little-endian `u16` blob format version, then the
//! `bincode` encoding of the value. The blob version moves independently of
//! [`super::PROTOCOL_VERSION`]; readers refuse versions newer than their own.

use crate::data::Value;
use crate::errors::{DpfError, Result};

pub const BLOB_MAGIC: &[u8; 4] = b"DPFB";
pub const BLOB_FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 6;

pub fn encode_blob(value: &Value) -> Result<Vec<u8>> {
    if value.has_object_refs() {
        return Err(DpfError::invalid_argument(format!(
            "{} refers to session objects and cannot be deep-copied",
            value.value_type()
        )));
    }
    let mut blob = Vec::with_capacity(HEADER_LEN + 64);
    blob.extend_from_slice(BLOB_MAGIC);
    blob.extend_from_slice(&BLOB_FORMAT_VERSION.to_le_bytes());
    bincode::serialize_into(&mut blob, value)?;
    Ok(blob)
}

pub fn decode_blob(blob: &[u8]) -> Result<Value> {
    if blob.len() < HEADER_LEN || &blob[..4] != BLOB_MAGIC {
        return Err(DpfError::invalid_argument("not a deep-copy blob"));
    }
    let version = u16::from_le_bytes([blob[4], blob[5]]);
    if version > BLOB_FORMAT_VERSION {
        return Err(DpfError::version_mismatch(
            "deep-copy blob",
            format!("blob format {version}"),
            format!("blob format {BLOB_FORMAT_VERSION}"),
        ));
    }
    bincode::deserialize(&blob[HEADER_LEN..])
        .map_err(|e| DpfError::invalid_argument(format!("corrupt deep-copy blob: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dimensionality, Field, ObjectId, Scoping, ValueType};
    use crate::errors::ErrorKind;

    #[test]
    fn test_blob_preserves_type_and_value() {
        let field = Field::new(
            Dimensionality::vector_3d(),
            Scoping::nodal(vec![4]),
            vec![1.0, 2.0, 3.0],
        )
        .unwrap()
        .with_unit("Pa");
        let value = Value::Field(field);
        let blob = encode_blob(&value).unwrap();
        assert_eq!(&blob[..4], BLOB_MAGIC);
        let back = decode_blob(&blob).unwrap();
        assert_eq!(back.value_type(), value.value_type());
        assert_eq!(back, value);
    }

    #[test]
    fn test_operator_refs_cannot_be_copied() {
        let err = encode_blob(&Value::Operator(ObjectId(1))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    /// Same layout as `Field`, minus the size check.
    #[derive(serde::Serialize)]
    struct UncheckedField {
        name: String,
        unit: String,
        dimensionality: Dimensionality,
        scoping: Scoping,
        data: Vec<f64>,
        time_freq_support: Option<()>,
    }

    fn field_blob(data: Vec<f64>) -> Vec<u8> {
        let field_variant: u32 = 8;
        let mut blob = BLOB_MAGIC.to_vec();
        blob.extend_from_slice(&BLOB_FORMAT_VERSION.to_le_bytes());
        blob.extend_from_slice(&field_variant.to_le_bytes());
        let field = UncheckedField {
            name: String::new(),
            unit: String::new(),
            dimensionality: Dimensionality::scalar(),
            scoping: Scoping::nodal(vec![1, 2]),
            data,
            time_freq_support: None,
        };
        bincode::serialize_into(&mut blob, &field).unwrap();
        blob
    }

    #[test]
    fn test_field_with_wrong_buffer_size_is_refused() {
        let good = decode_blob(&field_blob(vec![1.0, 2.0])).unwrap();
        assert_eq!(good.value_type(), ValueType::Field);

        let err = decode_blob(&field_blob(vec![1.0])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_newer_blob_version_is_refused() {
        let mut blob = encode_blob(&Value::Int(5)).unwrap();
        blob[4..6].copy_from_slice(&(BLOB_FORMAT_VERSION + 1).to_le_bytes());
        assert_eq!(decode_blob(&blob).unwrap_err().kind, ErrorKind::VersionMismatch);
        assert!(decode_blob(b"XXXX\x01\x00").is_err());
    }
}
