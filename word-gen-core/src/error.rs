use thiserror::Error;

/// Errors produced while building, persisting or loading a model.
///
/// An unknown context on the query API is NOT an error: queries return
/// `None` for it, since arbitrary user-supplied prefixes are expected
/// to miss the table.
#[derive(Debug, Error)]
pub enum ModelError {
	/// The requested context length was zero.
	#[error("order must be at least 1")]
	InvalidOrder,

	/// Corpus or model file access failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),

	/// Model encoding or decoding failed (e.g. truncated or corrupt bytes).
	#[error("model codec error: {0}")]
	Codec(#[from] postcard::Error),

	/// Partial models built from the same corpus disagree on their parameters.
	#[error("cannot merge models: {0}")]
	Merge(String),
}
