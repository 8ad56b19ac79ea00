//! Serializable matrix identity

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{MatrixError, Result};
use crate::source::{hash_matrix, DataSource};

use super::consistency::AttachedArrays;
use super::options::MatrixOptions;

/// BLAKE3 digest of a matrix's source, options and attached arrays
///
/// Two matrices built from the same configuration have the same fingerprint
/// in every process, so it can stand in for the matrix when deduplicating
/// work across actors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixFingerprint([u8; 32]);

impl MatrixFingerprint {
    pub fn compute(
        source: &DataSource,
        options: &MatrixOptions,
        attached: &AttachedArrays,
    ) -> Result<Self> {
        let mut hasher = blake3::Hasher::new();
        source.update_fingerprint(&mut hasher);

        let options_json =
            serde_json::to_vec(options).map_err(|e| MatrixError::Serialization(e.to_string()))?;
        hasher.update(b"options");
        hasher.update(&options_json);

        if let Some(label) = &attached.label {
            hasher.update(b"label");
            hash_matrix(&mut hasher, label);
        }
        for (field, values) in &attached.aux {
            hasher.update(field.name().as_bytes());
            for v in values {
                hasher.update(&v.to_le_bytes());
            }
        }
        if let Some(weights) = &attached.feature_weights {
            hasher.update(b"feature_weights");
            for v in weights {
                hasher.update(&v.to_le_bytes());
            }
        }

        Ok(Self(*hasher.finalize().as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Serialize to CBOR bytes
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| MatrixError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| MatrixError::Serialization(e.to_string()))
    }
}

impl fmt::Display for MatrixFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
