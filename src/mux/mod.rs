//! The request multiplexer: sequence allocation, the pending-request table,
//! response matching, timeout handling, and broadcast dispatch (spec §4.4).

pub mod pending;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::codec::{self, RawParameter};
use crate::descriptor::Descriptor;
use crate::framer::{FeedEvent, Frame, Framer};
use crate::status::{self, Status};
use crate::transport::Transport;

pub use pending::{PendingEntry, PendingTable, RequestKind};

/// The result delivered to a pending request's waiter or callback.
#[derive(Debug, Clone)]
pub enum Outcome {
	/// A single wire status code — the outcome of an ACKed write.
	Status(Status),
	/// A decoded, type-repaired parameter list — the outcome of a read.
	Parameters(Vec<Descriptor>),
	/// No response arrived within `response_timeout`.
	Timeout,
}

/// A one-shot delivery slot shared between a synchronous caller and the
/// reader thread.
pub struct Slot {
	outcome: Mutex<Option<Outcome>>,
	ready: Condvar,
}

impl Slot {
	pub fn new() -> Self {
		Self { outcome: Mutex::new(None), ready: Condvar::new() }
	}

	fn post(&self, outcome: Outcome) {
		*self.outcome.lock().unwrap() = Some(outcome);
		self.ready.notify_one();
	}

	/// Block until an outcome is posted or `deadline` passes.
	pub fn wait(&self, deadline: Instant) -> Outcome {
		let mut guard = self.outcome.lock().unwrap();
		loop {
			if let Some(outcome) = guard.take() {
				return outcome;
			}
			let now = Instant::now();
			if now >= deadline {
				return Outcome::Timeout;
			}
			let (next, result) = self.ready.wait_timeout(guard, deadline - now).unwrap();
			guard = next;
			if guard.is_none() && result.timed_out() {
				return Outcome::Timeout;
			}
		}
	}
}

impl Default for Slot {
	fn default() -> Self {
		Self::new()
	}
}

/// How a pending entry's outcome reaches its owner.
pub enum Delivery {
	/// The registering thread is blocked on `Slot::wait`.
	Sync(Arc<Slot>),
	/// Invoke the boxed callback directly from the reader thread.
	Callback(Box<dyn FnMut(Outcome) + Send>),
}

fn deliver(delivery: Delivery, outcome: Outcome) {
	match delivery {
		Delivery::Sync(slot) => slot.post(outcome),
		Delivery::Callback(mut callback) => callback(outcome),
	}
}

/// Classify a response payload against the request it answers (spec §4.4's
/// "Response classification" table).
fn classify_response(payload: &[u8], kind: RequestKind, requested: &[Descriptor]) -> Option<Outcome> {
	if payload.len() == 1 {
		let bare = status::from_bare_error_code(payload[0]);
		return Some(wrap_status(kind, bare));
	}
	match payload.first() {
		Some(&codec::COMMAND_STATUS) => {
			let status = Status(payload.get(1).copied().unwrap_or(0));
			Some(wrap_status(kind, status))
		}
		Some(&codec::COMMAND_SEND_PARM) if kind == RequestKind::Request => {
			let decoded = codec::decode_send_parameter(payload);
			Some(Outcome::Parameters(codec::repair_parameters(requested, &decoded)))
		}
		_ => None,
	}
}

fn wrap_status(kind: RequestKind, status: Status) -> Outcome {
	match kind {
		RequestKind::WriteAck => Outcome::Status(status),
		RequestKind::Request => Outcome::Parameters(vec![Descriptor::status_only(status)]),
	}
}

struct Inner<T: Transport> {
	transport: T,
	write_lock: Mutex<()>,
	framer: Mutex<Box<dyn Framer + Send>>,
	table: Mutex<PendingTable>,
	response_timeout: Mutex<Duration>,
	running: AtomicBool,
	dump_level: AtomicU8,
	broadcast_sink: Mutex<Option<Box<dyn FnMut(Vec<RawParameter>) + Send>>>,
}

/// Owns the transport, the framer, and the pending table; runs the reader
/// thread that drives both (spec §4.4, §5).
pub struct Mux<T: Transport + Send + Sync + 'static> {
	inner: Arc<Inner<T>>,
	reader: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<T: Transport + Send + Sync + 'static> Mux<T> {
	pub fn new(transport: T, framer: Box<dyn Framer + Send>, response_timeout: Duration) -> Self {
		let inner = Arc::new(Inner {
			transport,
			write_lock: Mutex::new(()),
			framer: Mutex::new(framer),
			table: Mutex::new(PendingTable::new()),
			response_timeout: Mutex::new(response_timeout),
			running: AtomicBool::new(true),
			dump_level: AtomicU8::new(0),
			broadcast_sink: Mutex::new(None),
		});
		let reader = {
			let inner = Arc::clone(&inner);
			thread::spawn(move || reader_loop(inner))
		};
		Self { inner, reader: Mutex::new(Some(reader)) }
	}

	/// Send a request payload and block until a response, timeout, or — if
	/// `deadline` is already past by the time the reader thread races us —
	/// immediate timeout.
	pub fn call_sync(&self, node: u8, kind: RequestKind, requested: Vec<Descriptor>, payload: &[u8]) -> Outcome {
		let slot = Arc::new(Slot::new());
		let timeout = *self.inner.response_timeout.lock().unwrap();
		let seq = self.register_and_send(node, kind, requested, payload, Delivery::Sync(Arc::clone(&slot)));
		let Some(seq) = seq else { return Outcome::Timeout };

		let outcome = slot.wait(Instant::now() + timeout);
		if matches!(outcome, Outcome::Timeout) {
			// Clear a possibly still-registered entry; if the reader thread's
			// sweep already removed it, this is a harmless no-op.
			self.inner.table.lock().unwrap().match_and_remove(seq);
		}
		outcome
	}

	/// Send a request payload and invoke `callback` from the reader thread
	/// once a response (or timeout) arrives; returns immediately.
	pub fn call_async(&self, node: u8, kind: RequestKind, requested: Vec<Descriptor>, payload: &[u8], callback: Box<dyn FnMut(Outcome) + Send>) {
		self.register_and_send(node, kind, requested, payload, Delivery::Callback(callback));
	}

	fn register_and_send(&self, node: u8, kind: RequestKind, requested: Vec<Descriptor>, payload: &[u8], delivery: Delivery) -> Option<u8> {
		let entry = PendingEntry { node, kind, requested, sent_at: Instant::now(), delivery };
		let seq = self.inner.table.lock().unwrap().register(entry)?;

		let frame = Frame { seq, node, payload: payload.to_vec() };
		let mut encoded = Vec::new();
		self.inner.framer.lock().unwrap().encode(&frame, &mut encoded);

		if self.inner.dump_level.load(Ordering::Relaxed) >= 2 {
			trace!("write: {:02X?}", encoded);
		}

		let _guard = self.inner.write_lock.lock().unwrap();
		if let Err(error) = self.inner.transport.write(&encoded) {
			warn!("transport write failed: {error}");
		}
		Some(seq)
	}

	/// Send a frame with no pending-table registration: used for `SEND_PARM`/
	/// `SEND_PARM_BROADCAST`, which expect no reply (spec §4.5 "no-ACK mode").
	/// The wire still carries a `seq`; since nothing waits on it, `0` is used
	/// unconditionally rather than consuming a table slot for no reason.
	pub fn send_unacked(&self, node: u8, payload: &[u8]) {
		let frame = Frame { seq: 0, node, payload: payload.to_vec() };
		let mut encoded = Vec::new();
		self.inner.framer.lock().unwrap().encode(&frame, &mut encoded);

		if self.inner.dump_level.load(Ordering::Relaxed) >= 2 {
			trace!("write (unacked): {:02X?}", encoded);
		}

		let _guard = self.inner.write_lock.lock().unwrap();
		if let Err(error) = self.inner.transport.write(&encoded) {
			warn!("transport write failed: {error}");
		}
	}

	pub fn set_broadcast_callback(&self, callback: Option<Box<dyn FnMut(Vec<RawParameter>) + Send>>) {
		*self.inner.broadcast_sink.lock().unwrap() = callback;
	}

	pub fn set_response_timeout(&self, timeout: Duration) {
		*self.inner.response_timeout.lock().unwrap() = timeout;
	}

	pub fn response_timeout(&self) -> Duration {
		*self.inner.response_timeout.lock().unwrap()
	}

	pub fn set_dump_level(&self, level: u8) {
		self.inner.dump_level.store(level, Ordering::Relaxed);
	}

	pub fn set_baudrate(&self, baudrate: u32) -> Result<(), T::Error> {
		self.inner.transport.set_baudrate(baudrate)
	}

	/// Stop the reader thread's active polling; the transport stays open but
	/// is no longer read from until [`Self::start`] (spec §5 "Stopping the
	/// transport").
	pub fn stop(&self) {
		self.inner.running.store(false, Ordering::Release);
	}

	pub fn start(&self) {
		self.inner.running.store(true, Ordering::Release);
	}
}

impl<T: Transport + Send + Sync + 'static> Drop for Mux<T> {
	fn drop(&mut self) {
		self.inner.running.store(false, Ordering::Release);
	}
}

fn reader_loop<T: Transport + Send + Sync + 'static>(inner: Arc<Inner<T>>) {
	let mut buffer = [0u8; 256];
	loop {
		if !inner.running.load(Ordering::Acquire) {
			thread::sleep(Duration::from_millis(1));
			continue;
		}

		match inner.transport.read(&mut buffer, Duration::from_millis(10)) {
			Ok(0) => {}
			Ok(n) => handle_bytes(&inner, &buffer[..n]),
			Err(error) => {
				warn!("transport read error: {error}");
				thread::sleep(Duration::from_millis(1));
			}
		}

		let timeout = *inner.response_timeout.lock().unwrap();
		let expired = inner.table.lock().unwrap().sweep(Instant::now(), timeout);
		for (_, entry) in expired {
			deliver(entry.delivery, Outcome::Timeout);
		}
	}
}

fn handle_bytes<T: Transport + Send + Sync + 'static>(inner: &Arc<Inner<T>>, bytes: &[u8]) {
	let events: Vec<FeedEvent> = {
		let mut framer = inner.framer.lock().unwrap();
		bytes.iter().filter_map(|&byte| framer.feed(byte)).collect()
	};

	for event in events {
		match event {
			FeedEvent::Frame(frame) => dispatch_frame(inner, frame),
			FeedEvent::StrayByte(byte) => {
				if inner.dump_level.load(Ordering::Relaxed) >= 1 {
					debug!("non-propar byte: {byte:#04x}");
				}
			}
		}
	}
}

fn dispatch_frame<T: Transport + Send + Sync + 'static>(inner: &Arc<Inner<T>>, frame: Frame) {
	if inner.dump_level.load(Ordering::Relaxed) >= 2 {
		trace!("read: {:02X?}", frame.payload);
	}

	// Classify before removing: an unrecognized leading byte must leave the
	// slot pending for its own timeout/sweep rather than be finalized here
	// with a synthesized outcome.
	let classified = {
		let table = inner.table.lock().unwrap();
		table.peek(frame.seq).and_then(|entry| classify_response(&frame.payload, entry.kind, &entry.requested))
	};

	match classified {
		Some(outcome) => {
			// The caller may have already given up and removed this entry
			// itself (its own wait timed out) between the peek above and here;
			// if so there's nothing left to deliver to.
			if let Some(entry) = inner.table.lock().unwrap().match_and_remove(frame.seq) {
				deliver(entry.delivery, outcome);
			}
		}
		None => {
			if frame.payload.first() == Some(&codec::COMMAND_SEND_PARM_BROADCAST) {
				let decoded = codec::decode_send_parameter(&frame.payload);
				if let Some(callback) = inner.broadcast_sink.lock().unwrap().as_mut() {
					callback(decoded);
				}
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::types::ParmType;
	use assert2::assert;

	#[test]
	fn bare_error_wraps_per_kind() {
		let write_outcome = classify_response(&[0x83], RequestKind::WriteAck, &[]).unwrap();
		assert!(matches!(write_outcome, Outcome::Status(Status(0x83))));

		let request_outcome = classify_response(&[0x83], RequestKind::Request, &[]).unwrap();
		match request_outcome {
			Outcome::Parameters(list) => assert!(list[0].status == Some(Status(0x83))),
			_ => panic!("expected a parameter list"),
		}
	}

	#[test]
	fn status_frame_delivers_status_for_write_ack() {
		let outcome = classify_response(&[codec::COMMAND_STATUS, 0], RequestKind::WriteAck, &[]).unwrap();
		assert!(matches!(outcome, Outcome::Status(s) if s.is_ok()));
	}

	#[test]
	fn send_parm_frame_decodes_and_repairs_for_request_kind() {
		let requested = vec![Descriptor::request(0x80, 33, 3, ParmType::Float)];
		let payload = vec![codec::COMMAND_SEND_PARM, 33, 0x41, 0x3F, 0x80, 0x00, 0x00];
		let outcome = classify_response(&payload, RequestKind::Request, &requested).unwrap();
		match outcome {
			Outcome::Parameters(list) => assert!(list[0].status.unwrap().is_ok()),
			_ => panic!("expected parameters"),
		}
	}

	#[test]
	fn unrecognized_leading_byte_is_discarded() {
		assert!(classify_response(&[0x02, 0x00, 0x00, 0x00], RequestKind::WriteAck, &[]).is_none());
	}
}
