//! The [`Transport`] trait abstracts over the byte pipe a [`crate::master::Master`]
//! talks through: a serial line in practice, an in-memory queue in tests.

use std::time::Duration;

/// A byte transport carrying framed Propar traffic.
///
/// Implementors configure the underlying line themselves (8 data bits, no
/// parity, 1 stop bit, matching the instrument's fixed serial format); the
/// trait only covers the operations the mux's reader loop and writer need.
pub trait Transport {
	/// The error type returned by this transport's fallible operations.
	type Error: std::error::Error + Send + Sync + 'static;

	/// Write the whole buffer, blocking until it is sent.
	fn write(&self, data: &[u8]) -> Result<(), Self::Error>;

	/// Read at least one byte into `buffer`, blocking up to `timeout`.
	/// Returns `0` on timeout with nothing read.
	fn read(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize, Self::Error>;

	/// Bytes currently buffered and ready to read without blocking.
	fn in_waiting(&self) -> Result<u32, Self::Error>;

	/// Change the line's baud rate without closing the port.
	fn set_baudrate(&self, baudrate: u32) -> Result<(), Self::Error>;
}

/// Failure opening a concrete transport.
#[derive(Debug)]
pub struct TransportOpenError(std::io::Error);

impl std::fmt::Display for TransportOpenError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "failed to open transport: {}", self.0)
	}
}

impl std::error::Error for TransportOpenError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		Some(&self.0)
	}
}

impl From<std::io::Error> for TransportOpenError {
	fn from(other: std::io::Error) -> Self {
		Self(other)
	}
}

/// A [`Transport`] backed by the `serial2` crate.
#[cfg(feature = "serial2")]
pub struct Serial2Transport {
	port: serial2::SerialPort,
}

#[cfg(feature = "serial2")]
impl Serial2Transport {
	/// Open `path` at `baudrate`, configured 8N1 as Propar's instruments expect.
	pub fn open(path: impl AsRef<std::path::Path>, baudrate: u32) -> Result<Self, TransportOpenError> {
		let port = serial2::SerialPort::open(path, baudrate)?;
		Ok(Self { port })
	}
}

#[cfg(feature = "serial2")]
impl Transport for Serial2Transport {
	type Error = std::io::Error;

	fn write(&self, data: &[u8]) -> Result<(), Self::Error> {
		self.port.write_all(data)
	}

	fn read(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize, Self::Error> {
		self.port.set_read_timeout(timeout)?;
		match self.port.read(buffer) {
			Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
			other => other,
		}
	}

	fn in_waiting(&self) -> Result<u32, Self::Error> {
		self.port.available_to_read().map(|n| n as u32)
	}

	fn set_baudrate(&self, baudrate: u32) -> Result<(), Self::Error> {
		let mut settings = self.port.get_configuration()?;
		settings.set_baud_rate(baudrate)?;
		self.port.set_configuration(&settings)
	}
}
