//! Error types surfaced by the public API.
//!
//! Most protocol-level failures (a non-OK instrument status, a timeout, a
//! truncated decode) are never turned into a [`Result`] error: they are
//! delivered through the normal response channel as a `status` field or a
//! [`crate::status::TIMEOUT_ANSWER`] entry, exactly like the instrument would
//! report them. Only failures that have no sensible in-band representation
//! use `Result`.

use std::fmt;

/// The catalogue has no entry for the requested DDE number.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct UnknownDdeNumber {
	/// The DDE number that was looked up.
	pub dde_nr: u32,
}

impl fmt::Display for UnknownDdeNumber {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "no parameter with DDE number {} in the catalogue", self.dde_nr)
	}
}

impl std::error::Error for UnknownDdeNumber {}

/// Failed to load a parameter catalogue from a JSON document.
#[derive(Debug)]
pub enum CatalogueLoadError {
	/// Reading the catalogue file failed.
	Io(std::io::Error),
	/// The catalogue file was not valid JSON, or did not match the expected schema.
	Json(serde_json::Error),
}

impl fmt::Display for CatalogueLoadError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Io(e) => write!(f, "failed to read catalogue: {e}"),
			Self::Json(e) => write!(f, "failed to parse catalogue: {e}"),
		}
	}
}

impl std::error::Error for CatalogueLoadError {}

impl From<std::io::Error> for CatalogueLoadError {
	fn from(other: std::io::Error) -> Self {
		Self::Io(other)
	}
}

impl From<serde_json::Error> for CatalogueLoadError {
	fn from(other: serde_json::Error) -> Self {
		Self::Json(other)
	}
}

/// A parameter buffer could not hold an encoded or decoded message.
///
/// The wire format caps requests and responses at 255 payload bytes (the
/// transport's single length byte), so this only occurs for pathologically
/// large parameter lists.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BufferTooSmallError {
	pub needed: usize,
	pub available: usize,
}

impl fmt::Display for BufferTooSmallError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "buffer too small: need at least {} bytes, have {}", self.needed, self.available)
	}
}

impl std::error::Error for BufferTooSmallError {}

impl BufferTooSmallError {
	pub(crate) fn check(needed: usize, available: usize) -> Result<(), Self> {
		if needed <= available {
			Ok(())
		} else {
			Err(Self { needed, available })
		}
	}
}
