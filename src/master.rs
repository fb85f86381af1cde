//! The public facade: synchronous and callback-based read/write, broadcast
//! dispatch, and the `get_nodes` network walk (spec §4.5).

use std::collections::HashSet;
use std::time::Duration;

use crate::catalogue::Catalogue;
use crate::codec::{self, RawParameter};
use crate::descriptor::Descriptor;
use crate::error::UnknownDdeNumber;
use crate::framer::ascii::AsciiFramer;
use crate::framer::binary::BinaryFramer;
use crate::mux::{Mux, Outcome, RequestKind};
use crate::status::{self, Status};
use crate::transport::Transport;
use crate::types::{self, ParmType, Value, WireType};

/// One entry of a `get_nodes` network walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
	pub address: u8,
	pub device_type: String,
	pub serial: String,
	pub id: String,
}

/// The driver's public entry point: owns a transport and an optional
/// parameter catalogue, and exposes the read/write/scan API.
pub struct Master<T: Transport + Send + Sync + 'static> {
	mux: Mux<T>,
	catalogue: Option<Catalogue>,
}

impl<T: Transport + Send + Sync + 'static> Master<T> {
	/// Construct a master using binary framing (the default mode).
	pub fn new(transport: T, catalogue: Option<Catalogue>) -> Self {
		let mux = Mux::new(transport, Box::new(BinaryFramer::new()), Duration::from_millis(500));
		Self { mux, catalogue }
	}

	/// Construct a master using ASCII framing, for links that don't pass
	/// `DLE`-stuffed binary cleanly (spec §4.1, §9 item 3).
	pub fn with_ascii_framing(transport: T, catalogue: Option<Catalogue>) -> Self {
		let mux = Mux::new(transport, Box::new(AsciiFramer::new()), Duration::from_millis(500));
		Self { mux, catalogue }
	}

	/// Read a single parameter; `None` on any non-`OK` status or timeout.
	pub fn read(&self, node: u8, proc_nr: u8, parm_nr: u8, parm_type: ParmType) -> Option<Value> {
		let descriptor = self.read_parameters(vec![Descriptor::request(node, proc_nr, parm_nr, parm_type)]).into_iter().next()?;
		if descriptor.status?.is_ok() {
			descriptor.data
		} else {
			None
		}
	}

	/// ACKed write of a single parameter; `true` iff the wire status is `OK`.
	pub fn write(&self, node: u8, proc_nr: u8, parm_nr: u8, value: Value) -> bool {
		self.write_parameters(vec![Descriptor::write(node, proc_nr, parm_nr, value)], codec::COMMAND_SEND_PARM_WITH_ACK).is_ok()
	}

	/// Read by catalogue DDE number.
	pub fn read_dde(&self, dde_nr: u32) -> Result<Option<Value>, UnknownDdeNumber> {
		let schema = self.catalogue.as_ref().ok_or(UnknownDdeNumber { dde_nr })?.get_parameter(dde_nr)?;
		Ok(self.read(schema.node, schema.proc_nr, schema.parm_nr, schema.parm_type))
	}

	/// Write by catalogue DDE number.
	pub fn write_dde(&self, dde_nr: u32, value: Value) -> Result<bool, UnknownDdeNumber> {
		let schema = self.catalogue.as_ref().ok_or(UnknownDdeNumber { dde_nr })?.get_parameter(dde_nr)?;
		Ok(self.write(schema.node, schema.proc_nr, schema.parm_nr, value))
	}

	/// Read a (possibly chained) list of parameters, blocking for the reply.
	pub fn read_parameters(&self, descriptors: Vec<Descriptor>) -> Vec<Descriptor> {
		let node = descriptors.first().map(|d| d.node).unwrap_or(0x80);
		let mut payload = Vec::new();
		codec::encode_request(&descriptors, &mut payload);
		outcome_to_descriptors(self.mux.call_sync(node, RequestKind::Request, descriptors, &payload))
	}

	/// Read a (possibly chained) list of parameters, delivering the result to
	/// `callback` from the reader thread instead of blocking.
	pub fn read_parameters_async(&self, descriptors: Vec<Descriptor>, mut callback: Box<dyn FnMut(Vec<Descriptor>) + Send>) {
		let node = descriptors.first().map(|d| d.node).unwrap_or(0x80);
		let mut payload = Vec::new();
		codec::encode_request(&descriptors, &mut payload);
		self.mux.call_async(node, RequestKind::Request, descriptors, &payload, Box::new(move |outcome| callback(outcome_to_descriptors(outcome))));
	}

	/// Write a (possibly chained) list of parameters. With `command ==
	/// SEND_PARM_WITH_ACK` this blocks for the wire status; otherwise the
	/// frame is fire-and-forget and `OK` is returned immediately.
	pub fn write_parameters(&self, descriptors: Vec<Descriptor>, command: u8) -> Status {
		let node = descriptors.first().map(|d| d.node).unwrap_or(0x80);
		let mut payload = Vec::new();
		codec::encode_send_parameter(&descriptors, command, &mut payload);
		if command == codec::COMMAND_SEND_PARM_WITH_ACK {
			outcome_to_status(self.mux.call_sync(node, RequestKind::WriteAck, Vec::new(), &payload))
		} else {
			self.mux.send_unacked(node, &payload);
			status::OK
		}
	}

	/// Callback-based counterpart to [`Self::write_parameters`].
	pub fn write_parameters_async(&self, descriptors: Vec<Descriptor>, command: u8, mut callback: Box<dyn FnMut(Status) + Send>) {
		let node = descriptors.first().map(|d| d.node).unwrap_or(0x80);
		let mut payload = Vec::new();
		codec::encode_send_parameter(&descriptors, command, &mut payload);
		if command == codec::COMMAND_SEND_PARM_WITH_ACK {
			self.mux.call_async(node, RequestKind::WriteAck, Vec::new(), &payload, Box::new(move |outcome| callback(outcome_to_status(outcome))));
		} else {
			self.mux.send_unacked(node, &payload);
			callback(status::OK);
		}
	}

	/// Register the sink for unsolicited `SEND_PARM_BROADCAST` frames.
	/// Values are type-repaired against the catalogue when one is loaded
	/// (spec §4.4's broadcast row: "schema from catalogue").
	pub fn set_broadcast_callback(&self, callback: Option<Box<dyn FnMut(Vec<Descriptor>) + Send>>) {
		match callback {
			None => self.mux.set_broadcast_callback(None),
			Some(mut callback) => {
				let catalogue = self.catalogue.clone();
				let wrapped: Box<dyn FnMut(Vec<RawParameter>) + Send> = Box::new(move |raw| {
					let descriptors = raw.into_iter().map(|parameter| repair_broadcast_parameter(&catalogue, parameter)).collect();
					callback(descriptors);
				});
				self.mux.set_broadcast_callback(Some(wrapped));
			}
		}
	}

	/// `0` silent, `1` print non-propar bytes, `2` print all bytes (spec §4.5).
	pub fn set_dump_level(&self, level: u8) {
		self.mux.set_dump_level(level);
	}

	pub fn set_response_timeout(&self, timeout: Duration) {
		self.mux.set_response_timeout(timeout);
	}

	pub fn set_baudrate(&self, baudrate: u32) -> Result<(), T::Error> {
		self.mux.set_baudrate(baudrate)
	}

	pub fn stop(&self) {
		self.mux.stop();
	}

	pub fn start(&self) {
		self.mux.start();
	}

	/// Walk the instrument network starting from the local node's "next
	/// address" chain, collecting address/type/serial/id per node.
	///
	/// Loop detection is fixed relative to the original source (see
	/// `SPEC_FULL.md` §9 item 1): a `HashSet` of visited addresses breaks the
	/// walk the moment an address repeats, instead of never firing.
	pub fn get_nodes(&self, find_first: bool) -> Vec<NodeInfo> {
		let mut scan_address = 0x80u8;

		if find_first {
			scan_address = self.find_first_node();
		}

		let mut visited = HashSet::new();
		let mut found = Vec::new();

		while scan_address != 0 {
			if !visited.insert(scan_address) {
				break;
			}

			let triple = match self.read_node_triple(scan_address) {
				Some(triple) => triple,
				None => break,
			};

			let address = match triple[0].data {
				Some(Value::Int8(v)) => v as u8,
				_ => break,
			};
			let id = match &triple[1].data {
				Some(Value::String(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
				_ => String::new(),
			};
			let next_address = match triple[2].data {
				Some(Value::Int8(v)) => v as u8,
				_ => 0,
			};

			let serial = id.get(3..).unwrap_or_default().to_string();
			let device_type = self.resolve_device_type(scan_address, &id);

			found.push(NodeInfo { address, device_type, serial, id });
			scan_address = next_address;
		}

		found
	}

	fn find_first_node(&self) -> u8 {
		let local_address = match self.read(0x80, 0, 1, ParmType::Int8) {
			Some(Value::Int8(v)) => v as u8,
			_ => 0x80,
		};

		let original_timeout = self.mux.response_timeout();
		self.mux.set_response_timeout(Duration::from_millis(50));

		let mut scan_address = 1u8;
		while scan_address != local_address {
			let ok = self.read_parameters(vec![Descriptor::request(scan_address, 0, 1, ParmType::Int8)])[0].status.map(Status::is_ok).unwrap_or(false);
			if ok {
				break;
			}
			let (next, wrapped) = scan_address.overflowing_add(1);
			scan_address = next;
			if wrapped {
				break;
			}
		}

		self.mux.set_response_timeout(original_timeout);
		scan_address
	}

	/// Read the three-parameter chained address/id/next-address block,
	/// degrading to three single reads if the chained read fails, mirroring
	/// the original source's fallback (spec §4.5 "Network walk").
	fn read_node_triple(&self, node: u8) -> Option<Vec<Descriptor>> {
		let parms = vec![
			Descriptor::request(node, 0, 1, ParmType::Int8),
			Descriptor::request(node, 0, 0, ParmType::String),
			Descriptor::request(node, 0, 3, ParmType::Int8),
		];

		// Only the first entry's status gates acceptance of the chained read,
		// matching the original driver: once the node answers OK for the first
		// parameter, the other two are trusted unconditionally.
		let combined = self.read_parameters(parms.clone());
		if combined.len() == 3 && combined[0].status.map(Status::is_ok).unwrap_or(false) {
			return Some(combined);
		}

		let mut fallback = Vec::with_capacity(3);
		for descriptor in parms {
			let result = self.read_parameters(vec![descriptor]).into_iter().next()?;
			if !result.status.map(Status::is_ok).unwrap_or(false) {
				return None;
			}
			fallback.push(result);
		}
		Some(fallback)
	}

	fn resolve_device_type(&self, node: u8, id: &str) -> String {
		if let Some(Value::String(bytes)) = self.read(node, 113, 1, ParmType::String) {
			return String::from_utf8_lossy(&bytes).into_owned();
		}

		let catalogue = match &self.catalogue {
			Some(catalogue) => catalogue,
			None => return String::new(),
		};
		let Some(&first_byte) = id.as_bytes().first() else { return String::new() };
		catalogue
			.get_parameter_values(175)
			.iter()
			.find(|entry| entry.value == first_byte as i64)
			.map(|entry| entry.description.split(':').next().unwrap_or(&entry.description).to_string())
			.unwrap_or_default()
	}
}

fn outcome_to_descriptors(outcome: Outcome) -> Vec<Descriptor> {
	match outcome {
		Outcome::Parameters(list) => list,
		Outcome::Status(status) => vec![Descriptor::status_only(status)],
		Outcome::Timeout => vec![Descriptor::status_only(status::TIMEOUT_ANSWER)],
	}
}

fn outcome_to_status(outcome: Outcome) -> Status {
	match outcome {
		Outcome::Status(status) => status,
		Outcome::Parameters(list) => list.first().and_then(|d| d.status).unwrap_or(status::PROTOCOL_ERROR),
		Outcome::Timeout => status::TIMEOUT_ANSWER,
	}
}

fn repair_broadcast_parameter(catalogue: &Option<Catalogue>, raw: RawParameter) -> Descriptor {
	let schema = catalogue
		.as_ref()
		.map(|catalogue| catalogue.get_parameters(raw.proc_nr, raw.parm_nr))
		.into_iter()
		.flatten()
		.find(|descriptor| descriptor.parm_type.wire_type() == raw.wire_type);

	let (parm_type, dde_nr, parm_name) = match schema {
		Some(descriptor) => (descriptor.parm_type, descriptor.dde_nr, descriptor.parm_name.clone()),
		None => (default_parm_type(raw.wire_type), None, None),
	};

	let mut descriptor = Descriptor::request(0x80, raw.proc_nr, raw.parm_nr, parm_type);
	descriptor.dde_nr = dde_nr;
	descriptor.parm_name = parm_name;
	descriptor.status = Some(raw.status);
	descriptor.data = if raw.status.is_ok() { raw.value.map(|wire| types::repair(parm_type, wire)) } else { None };
	descriptor
}

fn default_parm_type(wire_type: WireType) -> ParmType {
	match wire_type {
		WireType::Int8 => ParmType::Int8,
		WireType::Int16 => ParmType::Int16,
		WireType::Int32 => ParmType::Int32,
		WireType::String => ParmType::String,
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::types::WireType;
	use assert2::assert;

	#[test]
	fn outcome_status_maps_directly() {
		assert!(matches!(outcome_to_status(Outcome::Status(status::OK)), s if s.is_ok()));
		assert!(outcome_to_status(Outcome::Timeout) == status::TIMEOUT_ANSWER);
	}

	#[test]
	fn outcome_parameters_fall_back_to_protocol_error_without_status() {
		assert!(outcome_to_status(Outcome::Parameters(Vec::new())) == status::PROTOCOL_ERROR);
	}

	#[test]
	fn broadcast_repair_falls_back_to_wire_type_without_catalogue() {
		let raw = RawParameter { proc_nr: 1, parm_nr: 0, wire_type: WireType::Int16, value: Some(crate::types::WireValue::Int16(15000)), status: status::OK };
		let descriptor = repair_broadcast_parameter(&None, raw);
		assert!(descriptor.parm_type == ParmType::Int16);
		assert!(descriptor.data == Some(Value::Int16(15000)));
	}
}
