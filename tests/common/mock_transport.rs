use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use propar::Transport;

/// An in-memory [`Transport`], with paired read/write buffers so a test can
/// inject "instrument" bytes and inspect what the driver sent.
#[derive(Clone, Default)]
pub struct MockTransport {
	read_buffer: Arc<Mutex<VecDeque<u8>>>,
	write_buffer: Arc<Mutex<VecDeque<u8>>>,
	baudrate: Arc<Mutex<u32>>,
}

impl MockTransport {
	pub fn new() -> Self {
		Self { read_buffer: Arc::new(Mutex::new(VecDeque::new())), write_buffer: Arc::new(Mutex::new(VecDeque::new())), baudrate: Arc::new(Mutex::new(38400)) }
	}

	/// The other end of the wire: bytes this side writes arrive as reads on
	/// `self`, mirroring a `device_port` split used by other mock serial-port
	/// test harnesses.
	pub fn device_port(&self) -> Self {
		Self { read_buffer: self.write_buffer.clone(), write_buffer: self.read_buffer.clone(), baudrate: self.baudrate.clone() }
	}

	pub fn push_incoming(&self, bytes: &[u8]) {
		self.read_buffer.lock().unwrap().extend(bytes);
	}

	pub fn take_written(&self) -> Vec<u8> {
		self.write_buffer.lock().unwrap().drain(..).collect()
	}

	/// Block (bounded by `timeout`) until at least `len` bytes have been
	/// written, then return them. Tests use this instead of a fixed sleep to
	/// observe the driver's outgoing frame regardless of scheduling.
	pub fn wait_for_written(&self, len: usize, timeout: Duration) -> Vec<u8> {
		let deadline = Instant::now() + timeout;
		loop {
			if self.write_buffer.lock().unwrap().len() >= len {
				return self.take_written();
			}
			if Instant::now() >= deadline {
				return self.take_written();
			}
			std::thread::sleep(Duration::from_millis(1));
		}
	}
}

impl Transport for MockTransport {
	type Error = Infallible;

	fn write(&self, data: &[u8]) -> Result<(), Self::Error> {
		self.write_buffer.lock().unwrap().extend(data);
		Ok(())
	}

	fn read(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize, Self::Error> {
		let deadline = Instant::now() + timeout;
		loop {
			{
				let mut data = self.read_buffer.lock().unwrap();
				if !data.is_empty() {
					let len = buffer.len().min(data.len());
					for slot in buffer[..len].iter_mut() {
						*slot = data.pop_front().unwrap();
					}
					return Ok(len);
				}
			}
			if Instant::now() >= deadline {
				return Ok(0);
			}
			std::thread::sleep(Duration::from_millis(1));
		}
	}

	fn in_waiting(&self) -> Result<u32, Self::Error> {
		Ok(self.read_buffer.lock().unwrap().len() as u32)
	}

	fn set_baudrate(&self, baudrate: u32) -> Result<(), Self::Error> {
		*self.baudrate.lock().unwrap() = baudrate;
		Ok(())
	}
}
