//! Embedding validation shared by every write path.

use crate::error::{KnowledgeError, Result};

/// Specific validation failures for embeddings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Embedding dimension mismatch.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding contains invalid values (NaN or Inf).
    #[error("embedding contains {count} invalid values (NaN or Inf)")]
    InvalidEmbeddingValues { count: usize },
}

impl From<ValidationError> for KnowledgeError {
    fn from(err: ValidationError) -> Self {
        KnowledgeError::InvalidData(err.to_string())
    }
}

/// Check that `embedding` has `expected_dim` finite components.
pub fn validate_embedding(
    embedding: &[f32],
    expected_dim: usize,
) -> std::result::Result<(), ValidationError> {
    if embedding.len() != expected_dim {
        return Err(ValidationError::DimensionMismatch {
            expected: expected_dim,
            actual: embedding.len(),
        });
    }

    let invalid_count = embedding.iter().filter(|v| !v.is_finite()).count();
    if invalid_count > 0 {
        return Err(ValidationError::InvalidEmbeddingValues {
            count: invalid_count,
        });
    }

    Ok(())
}

/// [`validate_embedding`] converted to the crate error.
pub fn validate_embedding_result(embedding: &[f32], expected_dim: usize) -> Result<()> {
    validate_embedding(embedding, expected_dim).map_err(KnowledgeError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_embedding() {
        assert!(validate_embedding(&[0.1, 0.2, 0.3], 3).is_ok());
    }

    #[test]
    fn test_dimension_mismatch() {
        assert_eq!(
            validate_embedding(&[0.1, 0.2], 3),
            Err(ValidationError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_non_finite_values() {
        let err = validate_embedding(&[f32::NAN, f32::INFINITY, 0.0], 3).unwrap_err();
        assert_eq!(err, ValidationError::InvalidEmbeddingValues { count: 2 });
        assert!(matches!(
            validate_embedding_result(&[f32::NAN], 1),
            Err(KnowledgeError::InvalidData(_))
        ));
    }
}
