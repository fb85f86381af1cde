//! The fixed 256-slot pending-request table (spec §9 "Pending table").

use std::time::{Duration, Instant};

use super::Delivery;
use crate::descriptor::Descriptor;

/// What kind of request a pending entry was registered for; drives response
/// classification in [`super::classify_response`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RequestKind {
	Request,
	WriteAck,
}

/// A single outstanding request, keyed by its `seq` in the owning [`PendingTable`].
pub struct PendingEntry {
	pub node: u8,
	pub kind: RequestKind,
	pub requested: Vec<Descriptor>,
	pub sent_at: Instant,
	pub delivery: Delivery,
}

/// A fixed-size table indexed by `seq`, replacing a linear-scan pending list.
///
/// Allocation refuses a `seq` whose slot is still occupied, making the
/// "unique among pending requests" invariant (spec §3) statically checked
/// rather than merely assumed.
pub struct PendingTable {
	slots: Vec<Option<PendingEntry>>,
	next_seq: u8,
}

impl PendingTable {
	pub fn new() -> Self {
		Self { slots: (0..256).map(|_| None).collect(), next_seq: 0 }
	}

	/// Allocate the next free `seq` and register `entry` under it.
	///
	/// Returns `None` only if all 256 slots are occupied — 256 concurrently
	/// outstanding requests on one link, which `response_timeout` makes
	/// practically unreachable.
	pub fn register(&mut self, entry: PendingEntry) -> Option<u8> {
		for _ in 0..256 {
			let seq = self.next_seq;
			self.next_seq = self.next_seq.wrapping_add(1);
			if self.slots[seq as usize].is_none() {
				self.slots[seq as usize] = Some(entry);
				return Some(seq);
			}
		}
		None
	}

	/// Borrow the entry pending for `seq`, if any, without removing it.
	///
	/// Used to classify an incoming frame before deciding whether it actually
	/// answers the pending request; an unrecognized frame must leave the slot
	/// in place for its own timeout/sweep to resolve.
	pub fn peek(&self, seq: u8) -> Option<&PendingEntry> {
		self.slots[seq as usize].as_ref()
	}

	/// Remove and return the entry pending for `seq`, if any.
	pub fn match_and_remove(&mut self, seq: u8) -> Option<PendingEntry> {
		self.slots[seq as usize].take()
	}

	/// Remove every entry older than `timeout` as of `now`.
	pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<(u8, PendingEntry)> {
		let mut expired = Vec::new();
		for (seq, slot) in self.slots.iter_mut().enumerate() {
			let expired_here = matches!(slot, Some(entry) if now.duration_since(entry.sent_at) >= timeout);
			if expired_here {
				expired.push((seq as u8, slot.take().unwrap()));
			}
		}
		expired
	}
}

impl Default for PendingTable {
	fn default() -> Self {
		Self::new()
	}
}
