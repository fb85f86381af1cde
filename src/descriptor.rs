//! The parameter descriptor: the lingua franca of the public API.

use crate::status::Status;
use crate::types::{ParmType, Value};

/// A reference to a single wire-level parameter, together with either the
/// value to write or the value/status received on a response.
///
/// This is a closed record rather than the open, mutation-friendly dict the
/// original implementation passes around: chaining-only scratch state
/// (`proc_chained`, `parm_chained`) lives in the codec as encoder-local
/// variables and never appears here.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
	/// Instrument address, 0-127; `0x80` denotes the directly attached local
	/// instrument. Only meaningful on the first descriptor of a request — the
	/// frame's `node` is taken from it.
	pub node: u8,
	/// Process number, 0-127.
	pub proc_nr: u8,
	/// Parameter number within the process, 0-31.
	pub parm_nr: u8,
	/// The requested or reported semantic type.
	pub parm_type: ParmType,
	/// Declared byte length. Only meaningful for `ParmType::String`: `0` means
	/// "zero-terminated, sender decides the length"; non-zero caps a read.
	pub parm_size: u8,
	/// The value to write, or the value received on a response.
	pub data: Option<Value>,
	/// Per-parameter status, set on response; absent on a request.
	pub status: Option<Status>,
	/// Catalogue DDE number, if this descriptor was built from one.
	pub dde_nr: Option<u32>,
	/// Catalogue parameter name, if known.
	pub parm_name: Option<String>,
}

impl Descriptor {
	/// Build a bare request descriptor (no catalogue annotations, no data).
	pub fn request(node: u8, proc_nr: u8, parm_nr: u8, parm_type: ParmType) -> Self {
		Self {
			node,
			proc_nr,
			parm_nr,
			parm_type,
			parm_size: parm_type.fixed_size().unwrap_or(0) as u8,
			data: None,
			status: None,
			dde_nr: None,
			parm_name: None,
		}
	}

	/// Build a write descriptor carrying `value`.
	pub fn write(node: u8, proc_nr: u8, parm_nr: u8, value: Value) -> Self {
		let parm_type = value.parm_type();
		let parm_size = match &value {
			Value::String(bytes) => bytes.len() as u8,
			_ => parm_type.fixed_size().unwrap_or(0) as u8,
		};
		Self {
			node,
			proc_nr,
			parm_nr,
			parm_type,
			parm_size,
			data: Some(value),
			status: None,
			dde_nr: None,
			parm_name: None,
		}
	}

	/// A single-element status-only descriptor, used to report a bare error
	/// code or a protocol-level decode failure (spec §4.4, §7).
	pub fn status_only(status: Status) -> Self {
		Self {
			node: 0,
			proc_nr: 0,
			parm_nr: 0,
			parm_type: ParmType::Int8,
			parm_size: 0,
			data: None,
			status: Some(status),
			dde_nr: None,
			parm_name: None,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	#[test]
	fn request_derives_fixed_size() {
		let descriptor = Descriptor::request(0x80, 1, 0, ParmType::Int16);
		assert!(descriptor.parm_size == 2);
	}

	#[test]
	fn write_string_uses_value_length() {
		let descriptor = Descriptor::write(0x80, 1, 0, Value::String(b"abc".to_vec()));
		assert!(descriptor.parm_size == 3);
	}
}
