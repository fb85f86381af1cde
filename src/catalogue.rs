//! The parameter catalogue: a JSON lookup table mapping a "DDE number" (the
//! instrument-independent identifier printed in the instrument manuals) to
//! the `(proc_nr, parm_nr, type)` it actually lives at on the wire.
//!
//! Grounded in `original_source/propar/__init__.py`'s `database` class: this
//! crate carries no copy of Bronkhorst's own `parameters.json` (that file is
//! proprietary instrument data, not part of this driver), so callers load
//! their own catalogue file via [`Catalogue::from_path`]/[`Catalogue::from_reader`].

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::descriptor::Descriptor;
use crate::error::{CatalogueLoadError, UnknownDdeNumber};
use crate::types::ParmType;

/// One row of the `allparameters` table, as it appears in the catalogue JSON.
#[derive(Debug, Deserialize)]
struct ParameterRow {
	parameter: String,
	#[serde(default)]
	process: String,
	fbnr: String,
	vartype: String,
	#[serde(default)]
	varlength: String,
	#[serde(rename = "longname")]
	long_name: String,
	min: String,
}

/// One row of the `parvalue` table: an enumerated value for some parameter.
#[derive(Debug, Deserialize, Clone)]
struct ParameterValueRow {
	parameter: String,
	value: String,
	description: String,
}

#[derive(Debug, Deserialize)]
struct CatalogueDocument {
	#[serde(rename = "allparameters")]
	all_parameters: Vec<ParameterRow>,
	#[serde(rename = "parvalue")]
	parm_values: Vec<ParameterValueRow>,
}

/// A single `(value, description)` row for an enumerated parameter, scoped to
/// one DDE number (spec's "Catalogue enum value").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
	pub value: i64,
	pub description: String,
}

/// The loaded parameter catalogue.
///
/// Holds one request-shaped [`Descriptor`] per DDE number (no `data`, no
/// `status`), plus two indexes over them: by DDE number, and by the wire
/// address they sit at.
#[derive(Debug, Clone)]
pub struct Catalogue {
	by_dde: HashMap<u32, Descriptor>,
	by_address: HashMap<(u8, u8), Vec<u32>>,
	parm_values: HashMap<u32, Vec<EnumValue>>,
}

fn parm_type_from_row(row: &ParameterRow) -> ParmType {
	let mut parm_type = match row.vartype.as_str() {
		"c" => ParmType::Int8,
		"i" => ParmType::Int16,
		"l" => ParmType::Int32,
		"f" => ParmType::Float,
		other => {
			warn!("catalogue: unknown vartype {other:?} for parameter {}, defaulting to Int16", row.parameter);
			ParmType::Int16
		}
	};
	if parm_type == ParmType::Int16 {
		match row.min.parse::<i64>() {
			Ok(-32767) => parm_type = ParmType::SInt16,
			Ok(-23593) => parm_type = ParmType::BSInt16,
			_ => {}
		}
	}
	if !row.varlength.is_empty() {
		parm_type = ParmType::String;
	}
	parm_type
}

impl Catalogue {
	/// Build a catalogue from an already-parsed document. Used internally by
	/// [`Self::from_reader`]; exposed so callers embedding their own
	/// catalogue JSON at compile time (`include_str!`) can parse it with
	/// `serde_json::from_str` and hand the rows in directly.
	fn from_document(document: CatalogueDocument) -> Self {
		let mut by_dde = HashMap::new();
		let mut by_address: HashMap<(u8, u8), Vec<u32>> = HashMap::new();

		for row in &document.all_parameters {
			let dde_nr: u32 = match row.parameter.parse() {
				Ok(n) => n,
				Err(_) => continue,
			};
			let proc_nr: u8 = if row.process.is_empty() { 1 } else { row.process.parse().unwrap_or(1) };
			let parm_nr: u8 = row.fbnr.parse().unwrap_or(0);
			let parm_type = parm_type_from_row(row);

			let mut descriptor = Descriptor::request(0x80, proc_nr, parm_nr, parm_type);
			descriptor.dde_nr = Some(dde_nr);
			descriptor.parm_name = Some(row.long_name.clone());
			if parm_type == ParmType::String {
				descriptor.parm_size = row.varlength.parse().unwrap_or(0);
			}

			by_address.entry((proc_nr, parm_nr)).or_default().push(dde_nr);
			by_dde.insert(dde_nr, descriptor);
		}

		let mut parm_values: HashMap<u32, Vec<EnumValue>> = HashMap::new();
		for row in &document.parm_values {
			let Ok(dde_nr) = row.parameter.parse::<u32>() else { continue };
			let Ok(value) = row.value.parse::<i64>() else { continue };
			parm_values.entry(dde_nr).or_default().push(EnumValue { value, description: row.description.clone() });
		}

		Self { by_dde, by_address, parm_values }
	}

	/// Load a catalogue from any reader yielding the catalogue JSON document
	/// (`{"allparameters": [...], "parvalue": [...]}`).
	pub fn from_reader(reader: impl Read) -> Result<Self, CatalogueLoadError> {
		let document: CatalogueDocument = serde_json::from_reader(reader)?;
		Ok(Self::from_document(document))
	}

	/// Load a catalogue from a JSON file on disk.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogueLoadError> {
		Self::from_reader(File::open(path)?)
	}

	/// Direct lookup by DDE number.
	pub fn get_parameter(&self, dde_nr: u32) -> Result<&Descriptor, UnknownDdeNumber> {
		self.by_dde.get(&dde_nr).ok_or(UnknownDdeNumber { dde_nr })
	}

	/// All catalogue entries living at the given `(proc_nr, parm_nr)` wire
	/// address. More than one entry can share an address (for example, a
	/// signed and an unsigned view of the same register).
	pub fn get_parameters(&self, proc_nr: u8, parm_nr: u8) -> Vec<&Descriptor> {
		self.by_address
			.get(&(proc_nr, parm_nr))
			.into_iter()
			.flatten()
			.filter_map(|dde_nr| self.by_dde.get(dde_nr))
			.collect()
	}

	/// The enumerated `(value, description)` rows for a DDE number, if any.
	pub fn get_parameter_values(&self, dde_nr: u32) -> &[EnumValue] {
		self.parm_values.get(&dde_nr).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Substring search over parameter long names, case- and whitespace-
	/// insensitive, matching the original source's `get_parameters_like`.
	pub fn get_parameters_like(&self, needle: &str) -> Vec<&Descriptor> {
		let needle = normalize(needle);
		self.by_dde
			.values()
			.filter(|descriptor| descriptor.parm_name.as_deref().map(|name| normalize(name).contains(&needle)).unwrap_or(false))
			.collect()
	}

	/// Every catalogue entry, in no particular order.
	pub fn all_parameters(&self) -> impl Iterator<Item = &Descriptor> {
		self.by_dde.values()
	}
}

fn normalize(text: &str) -> String {
	text.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect()
}
