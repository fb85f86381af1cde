use std::path::Path;

use propar::{Catalogue, Master, ParmType, Serial2Transport, Value};

mod logging;
mod options;

use options::{Command, Options};

fn main() {
	let options = <Options as clap::Parser>::parse();
	logging::init(env!("CARGO_CRATE_NAME"), options.verbose);
	if let Err(()) = do_main(options) {
		std::process::exit(1);
	}
}

fn do_main(options: Options) -> Result<(), ()> {
	match &options.command {
		Command::Read { node, proc_nr, parm_nr, parm_type } => {
			let master = open_master(&options, false)?;
			log::debug!("Reading process {proc_nr} parameter {parm_nr} from node {node}");
			match master.read(*node, *proc_nr, *parm_nr, ParmType::from(*parm_type)) {
				Some(value) => log::info!("Ok: {}", format_value(&value)),
				None => {
					log::error!("Read failed");
					return Err(());
				},
			}
		},
		Command::ReadDde { dde_nr } => {
			let master = open_master(&options, true)?;
			log::debug!("Reading DDE {dde_nr}");
			match master.read_dde(*dde_nr) {
				Ok(Some(value)) => log::info!("Ok: {}", format_value(&value)),
				Ok(None) => {
					log::error!("Read failed");
					return Err(());
				},
				Err(e) => {
					log::error!("{e}");
					return Err(());
				},
			}
		},
		Command::Write { node, proc_nr, parm_nr, parm_type, value } => {
			let master = open_master(&options, false)?;
			let parm_type = ParmType::from(*parm_type);
			let value = parse_value(parm_type, value).map_err(|e| log::error!("{e}"))?;
			log::debug!("Writing process {proc_nr} parameter {parm_nr} on node {node}");
			if master.write(*node, *proc_nr, *parm_nr, value) {
				log::info!("Ok");
			} else {
				log::error!("Write failed");
				return Err(());
			}
		},
		Command::WriteDde { dde_nr, value } => {
			let master = open_master(&options, true)?;
			let schema_type = master.read_dde(*dde_nr).map_err(|e| log::error!("{e}"))?.map(|v| v.parm_type());
			let parm_type = schema_type.ok_or(()).map_err(|()| log::error!("Could not read DDE {dde_nr}'s current value to determine its type"))?;
			let value = parse_value(parm_type, value).map_err(|e| log::error!("{e}"))?;
			match master.write_dde(*dde_nr, value) {
				Ok(true) => log::info!("Ok"),
				Ok(false) => {
					log::error!("Write failed");
					return Err(());
				},
				Err(e) => {
					log::error!("{e}");
					return Err(());
				},
			}
		},
		Command::Scan { find_first } => {
			let master = open_master(&options, true)?;
			log::debug!("Scanning the instrument network");
			for node in master.get_nodes(*find_first) {
				log::info!("{:>3}  {:<24} {:<16} {}", node.address, node.device_type, node.serial, node.id);
			}
		},
		Command::ShellCompletion { shell, output } => {
			write_shell_completion(*shell, output.as_deref())?;
		},
	}

	Ok(())
}

fn open_master(options: &Options, require_catalogue: bool) -> Result<Master<Serial2Transport>, ()> {
	let transport = Serial2Transport::open(&options.serial_port, options.baud_rate)
		.map_err(|e| log::error!("Failed to open serial port {}: {e}", options.serial_port.display()))?;
	log::debug!("Using serial port {} at {} baud", options.serial_port.display(), options.baud_rate);

	let catalogue = match &options.catalogue {
		Some(path) => Some(Catalogue::from_path(path).map_err(|e| log::error!("Failed to load catalogue {}: {e}", path.display()))?),
		None if require_catalogue => {
			log::error!("This command requires --catalogue <FILE>");
			return Err(());
		},
		None => None,
	};

	Ok(Master::new(transport, catalogue))
}

fn parse_value(parm_type: ParmType, text: &str) -> Result<Value, String> {
	match parm_type {
		ParmType::Int8 => text.parse().map(Value::Int8).map_err(|_| format!("invalid Int8 value: {text}")),
		ParmType::Int16 => text.parse().map(Value::Int16).map_err(|_| format!("invalid Int16 value: {text}")),
		ParmType::SInt16 => text.parse().map(Value::SInt16).map_err(|_| format!("invalid SInt16 value: {text}")),
		ParmType::BSInt16 => text.parse().map(Value::BSInt16).map_err(|_| format!("invalid BSInt16 value: {text}")),
		ParmType::Int32 => text.parse().map(Value::Int32).map_err(|_| format!("invalid Int32 value: {text}")),
		ParmType::Float => text.parse().map(Value::Float).map_err(|_| format!("invalid Float value: {text}")),
		ParmType::String => Ok(Value::String(text.as_bytes().to_vec())),
	}
}

fn format_value(value: &Value) -> String {
	match value {
		Value::Int8(v) => v.to_string(),
		Value::Int16(v) => v.to_string(),
		Value::SInt16(v) => v.to_string(),
		Value::BSInt16(v) => v.to_string(),
		Value::Int32(v) => v.to_string(),
		Value::Float(v) => v.to_string(),
		Value::String(bytes) => String::from_utf8_lossy(bytes).into_owned(),
	}
}

fn write_shell_completion(shell: clap_complete::Shell, path: Option<&Path>) -> Result<(), ()> {
	use std::io::Write;
	let mut buffer = Vec::with_capacity(4 * 1024);

	clap_complete::generate(shell, &mut <Options as clap::CommandFactory>::command(), env!("CARGO_BIN_NAME"), &mut buffer);
	if !buffer.ends_with(b"\n") {
		buffer.push(b'\n');
	}

	let path = path.unwrap_or_else(|| Path::new("-"));
	if path == Path::new("-") {
		log::debug!("Writing shell completion for {shell} to stdout");
		let stdout = std::io::stdout();
		stdout.lock().write_all(&buffer).map_err(|e| log::error!("Failed to write to stdout: {e}"))?;
	} else {
		log::debug!("Writing shell completion for {shell} to {}", path.display());
		let mut output = std::fs::File::create(path).map_err(|e| log::error!("Failed to create {}: {e}", path.display()))?;
		output.write_all(&buffer).map_err(|e| log::error!("Failed to write to {}: {e}", path.display()))?;
	}

	Ok(())
}
