//! Binary framing: `DLE STX seq node len data[...] DLE ETX`, with byte
//! stuffing on any literal `DLE` in the body.

use super::{FeedEvent, Frame, Framer};

const DLE: u8 = 0x10;
const STX: u8 = 0x02;
const ETX: u8 = 0x03;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum State {
	/// Awaiting the start-of-frame `DLE`.
	S1,
	/// Saw `DLE`, awaiting `STX`.
	S2,
	/// Inside the frame body.
	Data,
	/// Saw a `DLE` inside the body: either a stuffed byte or end-of-frame.
	DataOrEnd,
	/// A framing error occurred; resyncing on the next byte.
	Err,
}

/// The default propar framer.
#[derive(Debug, Clone)]
pub struct BinaryFramer {
	state: State,
	buffer: Vec<u8>,
	error_count: u64,
}

impl Default for BinaryFramer {
	fn default() -> Self {
		Self::new()
	}
}

impl BinaryFramer {
	pub fn new() -> Self {
		Self { state: State::S1, buffer: Vec::new(), error_count: 0 }
	}

	/// Number of framing errors seen since construction (resync events).
	pub fn error_count(&self) -> u64 {
		self.error_count
	}
}

impl Framer for BinaryFramer {
	fn encode(&mut self, frame: &Frame, out: &mut Vec<u8>) {
		out.push(DLE);
		out.push(STX);

		let mut push_stuffed = |out: &mut Vec<u8>, byte: u8| {
			out.push(byte);
			if byte == DLE {
				out.push(DLE);
			}
		};

		push_stuffed(out, frame.seq);
		push_stuffed(out, frame.node);
		push_stuffed(out, frame.payload.len() as u8);
		for &byte in &frame.payload {
			push_stuffed(out, byte);
		}

		out.push(DLE);
		out.push(ETX);
	}

	fn feed(&mut self, byte: u8) -> Option<FeedEvent> {
		match self.state {
			State::S1 => {
				if byte == DLE {
					self.buffer.clear();
					self.state = State::S2;
					None
				} else {
					Some(FeedEvent::StrayByte(byte))
				}
			}
			State::S2 => {
				self.state = if byte == STX { State::Data } else { State::Err };
				None
			}
			State::Data => {
				if byte == DLE {
					self.state = State::DataOrEnd;
				} else {
					self.buffer.push(byte);
				}
				None
			}
			State::DataOrEnd => {
				if byte == DLE {
					self.buffer.push(DLE);
					self.state = State::Data;
					None
				} else if byte == ETX {
					self.state = State::S1;
					if self.buffer.len() > 3 {
						let frame = Frame {
							seq: self.buffer[0],
							node: self.buffer[1],
							payload: self.buffer[3..].to_vec(),
						};
						Some(FeedEvent::Frame(frame))
					} else {
						None
					}
				} else {
					self.state = State::Err;
					None
				}
			}
			State::Err => {
				self.state = State::S1;
				self.error_count += 1;
				None
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	fn decode_all(framer: &mut BinaryFramer, bytes: &[u8]) -> Vec<Frame> {
		bytes
			.iter()
			.filter_map(|&b| framer.feed(b))
			.filter_map(|event| match event {
				FeedEvent::Frame(frame) => Some(frame),
				FeedEvent::StrayByte(_) => None,
			})
			.collect()
	}

	#[test]
	fn roundtrip_simple_frame() {
		let frame = Frame { seq: 5, node: 0x80, payload: vec![0x04, 0x01, 0x20, 0x01, 0x20] };
		let mut encoded = Vec::new();
		BinaryFramer::new().encode(&frame, &mut encoded);

		let mut framer = BinaryFramer::new();
		let decoded = decode_all(&mut framer, &encoded);
		assert!(decoded == vec![frame]);
	}

	#[test]
	fn byte_stuffing_doubles_dle() {
		let frame = Frame { seq: 0x10, node: 0x80, payload: vec![0x10, 0x01] };
		let mut encoded = Vec::new();
		BinaryFramer::new().encode(&frame, &mut encoded);

		// DLE STX, seq=0x10 0x10 (stuffed), node=0x80, len=0x02,
		// payload 0x10 0x10 (stuffed), 0x01, DLE ETX
		assert!(encoded == vec![0x10, 0x02, 0x10, 0x10, 0x80, 0x02, 0x10, 0x10, 0x01, 0x10, 0x03]);

		let mut framer = BinaryFramer::new();
		let decoded = decode_all(&mut framer, &encoded);
		assert!(decoded == vec![frame]);
	}

	#[test]
	fn scenario_single_int16_read() {
		let frame = Frame { seq: 0x42, node: 0x80, payload: vec![0x04, 0x01, 0x20, 0x01, 0x20] };
		let mut encoded = Vec::new();
		BinaryFramer::new().encode(&frame, &mut encoded);
		assert!(encoded == vec![0x10, 0x02, 0x42, 0x80, 0x05, 0x04, 0x01, 0x20, 0x01, 0x20, 0x10, 0x03]);
	}

	#[test]
	fn error_resyncs_to_s1() {
		let mut framer = BinaryFramer::new();
		// DLE, then a non-STX byte enters Err; a following byte resyncs.
		assert!(framer.feed(DLE).is_none());
		assert!(framer.feed(0x55).is_none());
		assert!(framer.error_count() == 0);
		assert!(framer.feed(0xFF).is_none());
		assert!(framer.error_count() == 1);

		// The framer should now decode a fresh frame correctly.
		let frame = Frame { seq: 1, node: 2, payload: vec![9, 9] };
		let mut encoded = Vec::new();
		BinaryFramer::new().encode(&frame, &mut encoded);
		let decoded = decode_all(&mut framer, &encoded);
		assert!(decoded == vec![frame]);
	}

	#[test]
	fn stray_byte_reported_outside_frame() {
		let mut framer = BinaryFramer::new();
		assert!(framer.feed(0xAB) == Some(FeedEvent::StrayByte(0xAB)));
	}
}
