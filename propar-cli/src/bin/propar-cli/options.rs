use std::path::PathBuf;

use propar::ParmType;

/// Talk to Bronkhorst instruments over the propar protocol.
///
/// Most commands address a parameter directly by its `(process, parameter)`
/// pair and wire type; the `*-dde` variants instead look the parameter up by
/// its catalogue DDE number, which also supplies the type.
#[derive(clap::Parser)]
pub struct Options {
	/// Print more verbose messages. Can be used multiple times.
	#[clap(long, short)]
	#[clap(global = true)]
	#[clap(action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// The serial port to use.
	#[clap(long, short)]
	#[clap(global = true)]
	#[cfg_attr(target_os = "windows", clap(default_value = "COM1"))]
	#[cfg_attr(not(target_os = "windows"), clap(default_value = "/dev/ttyUSB0"))]
	pub serial_port: PathBuf,

	/// The baud rate for the serial port.
	#[clap(long, short)]
	#[clap(global = true)]
	#[clap(default_value = "38400")]
	pub baud_rate: u32,

	/// A catalogue JSON file, required by the `*-dde` and `scan` commands.
	#[clap(long)]
	#[clap(global = true)]
	pub catalogue: Option<PathBuf>,

	#[clap(subcommand)]
	pub command: Command,
}

#[derive(clap::Parser)]
pub enum Command {
	/// Read a single parameter by process/parameter number.
	Read {
		/// The node address, or 128 for the directly attached instrument.
		#[clap(value_name = "NODE")]
		node: u8,

		/// The process number.
		#[clap(value_name = "PROCESS")]
		proc_nr: u8,

		/// The parameter number within the process.
		#[clap(value_name = "PARAMETER")]
		parm_nr: u8,

		/// The parameter's wire type.
		#[clap(value_name = "TYPE")]
		#[clap(value_enum)]
		parm_type: CliParmType,
	},

	/// Read a single parameter by its catalogue DDE number, on the directly
	/// attached instrument.
	ReadDde {
		#[clap(value_name = "DDE")]
		dde_nr: u32,
	},

	/// Write a single parameter by process/parameter number, waiting for
	/// the instrument's acknowledgement.
	Write {
		#[clap(value_name = "NODE")]
		node: u8,

		#[clap(value_name = "PROCESS")]
		proc_nr: u8,

		#[clap(value_name = "PARAMETER")]
		parm_nr: u8,

		#[clap(value_name = "TYPE")]
		#[clap(value_enum)]
		parm_type: CliParmType,

		/// The value to write, formatted for the chosen type (a plain
		/// integer, a float, or a UTF-8 string).
		#[clap(value_name = "VALUE")]
		value: String,
	},

	/// Write a single parameter by its catalogue DDE number, on the directly
	/// attached instrument.
	WriteDde {
		#[clap(value_name = "DDE")]
		dde_nr: u32,

		#[clap(value_name = "VALUE")]
		value: String,
	},

	/// Walk the instrument network, printing the address/type/serial/id of
	/// every node found.
	Scan {
		/// Probe for the lowest free address before walking, instead of
		/// starting from the locally attached instrument.
		#[clap(long)]
		find_first: bool,
	},

	/// Write shell completions to standard output or a file.
	ShellCompletion {
		#[clap(long)]
		shell: clap_complete::Shell,

		#[clap(long, short)]
		output: Option<PathBuf>,
	},
}

/// A command-line-friendly mirror of [`propar::ParmType`]: `clap::ValueEnum`
/// can't be derived on the library's own type without pulling `clap` into
/// its dependency graph.
#[derive(Copy, Clone, Debug, clap::ValueEnum)]
pub enum CliParmType {
	Int8,
	Int16,
	SInt16,
	BSInt16,
	Int32,
	Float,
	String,
}

impl From<CliParmType> for ParmType {
	fn from(value: CliParmType) -> Self {
		match value {
			CliParmType::Int8 => ParmType::Int8,
			CliParmType::Int16 => ParmType::Int16,
			CliParmType::SInt16 => ParmType::SInt16,
			CliParmType::BSInt16 => ParmType::BSInt16,
			CliParmType::Int32 => ParmType::Int32,
			CliParmType::Float => ParmType::Float,
			CliParmType::String => ParmType::String,
		}
	}
}
