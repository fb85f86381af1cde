//! The propar status code table.
//!
//! Status codes travel in-band: a non-`OK` status is never turned into a
//! `Result` error, it is delivered in a [`crate::descriptor::Descriptor`]'s
//! `status` field or as the return value of an ACKed write, exactly as the
//! instrument reports it.

use std::fmt;

/// A propar status code, as reported by an instrument or synthesized by the
/// multiplexer (e.g. [`TIMEOUT_ANSWER`]).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Status(pub u8);

impl Status {
	/// True if this is [`OK`].
	pub fn is_ok(self) -> bool {
		self == OK
	}

	/// The human-readable name for this code, or `None` for an unrecognized
	/// or error-nibble-tagged code.
	pub fn name(self) -> Option<&'static str> {
		STATUS_NAMES.iter().find(|(code, _)| *code == self.0).map(|(_, name)| *name)
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.name() {
			Some(name) => write!(f, "{} ({})", name, self.0),
			None => write!(f, "unknown status ({})", self.0),
		}
	}
}

macro_rules! status_table {
	($($name:ident = $value:expr, $text:expr;)*) => {
		$(
			#[doc = $text]
			pub const $name: Status = Status($value);
		)*

		const STATUS_NAMES: &[(u8, &str)] = &[
			$(($value, stringify!($name)),)*
		];
	};
}

status_table! {
	OK = 0, "status ok";
	PROCESS_CLAIMED = 1, "process is claimed";
	COMMAND = 2, "unknown propar command";
	PROC_NUMBER = 3, "unknown process number";
	PARM_NUMBER = 4, "unknown parameter number";
	PARM_TYPE = 5, "invalid parameter type";
	PARM_VALUE = 6, "invalid parameter value";
	NETWORK_NOT_ACTIVE = 7, "network not active";
	TIMEOUT_START_CHAR = 8, "timeout in start character";
	TIMEOUT_SERIAL_LINE = 9, "timeout on serial line";
	HARDWARE_MEMORY = 10, "hardware memory error";
	NODE_NUMBER = 11, "node number error";
	GENERAL_COMMUNICATION = 12, "general communication error";
	READONLY = 13, "parameter is read-only";
	PC_COMMUNICATION = 14, "pc communication error";
	NO_RS232_CONNECTION = 15, "no rs232 connection";
	PC_OUT_OF_MEMORY = 16, "pc out of memory";
	WRITEONLY = 17, "parameter is write-only";
	UNKNOWN_CONFIGURATION = 18, "unknown configuration";
	NO_FREE_NODE_ADDRESS = 19, "no free node address";
	WRONG_INTERFACE = 20, "wrong interface";
	ERROR_SERIAL_PORT = 21, "serial port connection error";
	OPENING_COMMUNICATION = 22, "error opening communication";
	COMMUNICATION_ERROR = 23, "communication error";
	INTERFACE_BUS_MASTER = 24, "interface bus master error";
	TIMEOUT_ANSWER = 25, "timeout waiting for answer";
	NO_START_CHARACTER = 26, "no start character found";
	ERROR_FIRST_DIGIT = 27, "error in first digit";
	HOST_BUFFER_OVERFLOW = 28, "host buffer overflow";
	BUFFER_OVERFLOW = 29, "buffer overflow";
	NO_ANSWER_FOUND = 30, "no answer found";
	ERROR_CLOSE_COMM = 31, "error closing communication";
	SYNC_ERROR = 32, "synchronization error";
	SEND_ERROR = 33, "send error";
	PROTOCOL_ERROR = 34, "protocol error";
	MODULE_BUFFER_OVERFLOW = 35, "module buffer overflow";
}

/// Wrap a bare error code received in a single-byte response frame.
///
/// The multiplexer sets the upper nibble (`0x80`) to distinguish these from
/// ordinary status codes (spec §6).
pub fn from_bare_error_code(code: u8) -> Status {
	Status(0x80 | code)
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	#[test]
	fn ok_is_zero() {
		assert!(OK.0 == 0);
		assert!(OK.is_ok());
		assert!(!PROTOCOL_ERROR.is_ok());
	}

	#[test]
	fn names_resolve() {
		assert!(TIMEOUT_ANSWER.name() == Some("TIMEOUT_ANSWER"));
		assert!(Status(200).name() == None);
	}

	#[test]
	fn bare_error_sets_high_nibble() {
		let status = from_bare_error_code(0x03);
		assert!(status.0 == 0x83);
	}
}
