//! Server-level error kinds. Each library error from
//! `substrata-common` is wrapped rather than re-thrown, so call sites can
//! tell a per-message recoverable error apart from a fatal startup one.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
	#[error(transparent)]
	Domain(#[from] substrata_common::error::DomainError),

	#[error(transparent)]
	Store(#[from] substrata_common::error::StoreError),

	#[error("client protocol error: {0}")]
	Protocol(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl ServerError {
	/// Does this error terminate the connection, or is it reported back to
	/// the client as an `Error` frame while the connection stays open?
	pub fn is_fatal_to_connection(&self) -> bool {
		matches!(self, ServerError::Protocol(_) | ServerError::Io(_))
	}
}
