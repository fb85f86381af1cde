//! Multiplexer-level properties that only show up under concurrency or
//! timing, driven through the public [`propar::Master`] facade (the
//! multiplexer's own types are crate-private — see spec §8 "Invariants").

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use assert2::assert;
use common::MockTransport;
use propar::framer::binary::BinaryFramer;
use propar::{FeedEvent, Master, ParmType, Value};

/// Run a background "instrument" that answers every request it sees with a
/// value derived from the requested process number, echoing the sequence
/// number back unchanged. If two concurrent requests were ever assigned the
/// same `seq`, one of them would receive the other's value.
fn spawn_echo_instrument(instrument: MockTransport, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
	thread::spawn(move || {
		let mut framer = BinaryFramer::new();
		while !stop.load(Ordering::Relaxed) {
			let bytes = instrument.wait_for_written(1, Duration::from_millis(20));
			for byte in bytes {
				if let Some(FeedEvent::Frame(frame)) = framer.feed(byte) {
					let proc_nr = frame.payload[1];
					let value = 1000u16 + proc_nr as u16;
					let mut response = vec![0x10, 0x02, frame.seq, 0x80];
					let inner = vec![0x02, proc_nr, 0x20, (value >> 8) as u8, (value & 0xFF) as u8];
					response.push(inner.len() as u8);
					response.extend(inner);
					response.extend([0x10, 0x03]);
					instrument.push_incoming(&response);
				}
			}
		}
	})
}

#[test]
fn concurrent_issuers_never_cross_wires_on_sequence_number() {
	let transport = MockTransport::new();
	let instrument = transport.device_port();
	let master = Arc::new(Master::new(transport, None));

	let stop = Arc::new(AtomicBool::new(false));
	let responder = spawn_echo_instrument(instrument, stop.clone());

	// Kept under 0x10 so the echoed `seq` byte never needs DLE-stuffing in
	// the hand-built response above.
	let handles: Vec<_> = (0..8u8)
		.map(|proc_nr| {
			let master = master.clone();
			thread::spawn(move || (proc_nr, master.read(0x80, proc_nr, 0, ParmType::Int16)))
		})
		.collect();

	for handle in handles {
		let (proc_nr, value) = handle.join().unwrap();
		assert!(value == Some(Value::Int16(1000 + proc_nr as i16)));
	}

	stop.store(true, Ordering::Relaxed);
	responder.join().unwrap();
}

#[test]
fn timeout_bound_respects_response_timeout_with_reader_poll_slack() {
	let transport = MockTransport::new();
	let master = Master::new(transport, None);
	master.set_response_timeout(Duration::from_millis(80));

	let start = std::time::Instant::now();
	let value = master.read(0x80, 1, 0, ParmType::Int16);
	let elapsed = start.elapsed();

	assert!(value.is_none());
	assert!(elapsed >= Duration::from_millis(80));
	assert!(elapsed <= Duration::from_millis(130));
}

#[test]
fn a_timed_out_slot_does_not_leak_into_a_later_requests_response() {
	let transport = MockTransport::new();
	let instrument = transport.device_port();
	let master = Master::new(transport, None);
	master.set_response_timeout(Duration::from_millis(50));

	// First request times out: nothing is ever injected for it.
	let timed_out = master.read(0x80, 1, 0, ParmType::Int16);
	assert!(timed_out.is_none());

	// A second, later request must not be satisfied by a stale delivery.
	std::thread::spawn({
		let instrument = instrument.clone();
		move || {
			let written = instrument.wait_for_written(12, Duration::from_secs(1));
			let seq = written[2];
			instrument.push_incoming(&[0x10, 0x02, seq, 0x80, 0x05, 0x02, 0x01, 0x20, 0x00, 0x2A, 0x10, 0x03]);
		}
	});
	let value = master.read(0x80, 1, 0, ParmType::Int16);
	assert!(value == Some(Value::Int16(42)));
}
