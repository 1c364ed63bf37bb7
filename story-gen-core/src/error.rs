use thiserror::Error;

use crate::tokenizer::vocab::SymbolId;

/// Errors surfaced by training, artifact handling and generation.
///
/// Load-time variants (`VocabularyLoad`, `MalformedMergeFile`, `ModelLoad`)
/// are fatal to service startup: a service must refuse to serve with a
/// partial model. `InvalidId` is a programming error, impossible for ids
/// produced by this crate's own encoder.
#[derive(Debug, Error)]
pub enum CoreError {
	/// The training corpus is empty or contains no usable words.
	#[error("corpus is empty or contains no usable words")]
	InsufficientCorpus,

	/// The persisted vocabulary is missing or corrupt.
	#[error("vocabulary artifact is invalid: {0}")]
	VocabularyLoad(String),

	/// The persisted merge rules are missing, corrupt, or inconsistent
	/// with the vocabulary.
	#[error("merge rules artifact is invalid: {0}")]
	MalformedMergeFile(String),

	/// The persisted model counts are missing, corrupt, or inconsistent
	/// with the vocabulary.
	#[error("model artifact is invalid: {0}")]
	ModelLoad(String),

	/// A token id outside the vocabulary was passed to the decoder.
	#[error("token id {0} is not in the vocabulary")]
	InvalidId(SymbolId),

	/// Interpolation weights must each lie in [0, 1] and sum to 1.
	#[error("interpolation weights must be in [0, 1] and sum to 1, got ({0}, {1}, {2})")]
	InvalidWeights(f64, f64, f64),

	/// Filesystem failure while writing artifacts.
	#[error(transparent)]
	Io(#[from] std::io::Error),

	/// Serialization failure while writing artifacts.
	#[error("artifact serialization failed: {0}")]
	Codec(#[from] postcard::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;
