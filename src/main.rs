use clap::{value_parser, Arg, ArgMatches, Command};
use std::error::Error;
use std::path::{Path, PathBuf};

use cmdlink::communicator::Communicator;
use cmdlink::config::Config;
use cmdlink::files::Upload;
use cmdlink::logging::{self, LogBuffer, LogRecord};
use cmdlink::protocol::Answer;
use cmdlink::secret;
use cmdlink::server::{log_dispatcher, Server};
use cmdlink::signals;

///////////////////////
// Utility functions //
///////////////////////

/// Config file, then environment, then CLI flags
fn load_config(matches: &ArgMatches) -> Result<Config, Box<dyn Error>> {
	let mut config = Config::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
	if let Some(host) = matches.get_one::<String>("host") {
		config.host = host.clone();
	}
	if let Some(port) = matches.get_one::<u16>("port") {
		config.admin_port = *port;
	}
	if let Some(name) = matches.get_one::<String>("server-name") {
		config.server_name = name.clone();
	}
	config.validate()?;
	Ok(config)
}

fn domain_arg() -> Arg {
	Arg::new("domain").short('d').long("domain").value_name("DOMAIN").help("File domain")
}

/// Print the answer and turn failure answers into an error exit
fn report(answer: Answer) -> Result<(), Box<dyn Error>> {
	if answer.is_success() {
		println!("{}", answer.entity);
		Ok(())
	} else {
		let failure = answer.failure.map(|f| f.to_string()).unwrap_or_default();
		Err(format!("{} ({})", answer.entity, failure).into())
	}
}

async fn serve(config: Config) -> Result<(), Box<dyn Error>> {
	let buffer = LogBuffer::new(config.log_buffer_capacity);
	logging::init_tracing_with_buffer(buffer.clone());

	let server = Server::from_config(config, buffer)?;
	let running = server.bind().await?;
	signals::setup_signal_handlers(running.shutdown().clone());
	running.wait().await;
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = Command::new("cmdlink")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Command and file-transfer link between a web tier and a backend server")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.value_parser(value_parser!(PathBuf))
				.global(true)
				.help("Config file (.toml, .json or .json5)"),
		)
		.arg(Arg::new("host").long("host").value_name("HOST").global(true).help("Server host"))
		.arg(
			Arg::new("port")
				.short('p')
				.long("port")
				.value_name("PORT")
				.value_parser(value_parser!(u16))
				.global(true)
				.help("Admin socket port"),
		)
		.arg(
			Arg::new("server-name")
				.long("server-name")
				.value_name("NAME")
				.global(true)
				.help("Server name stamped on commands"),
		)
		.subcommand(Command::new("serve").about("Run the backend server"))
		.subcommand(
			Command::new("encrypt")
				.about("Encrypt a config value (e.g. the tunnel API key) with the configured secretKey")
				.arg(Arg::new("value").required(true)),
		)
		.subcommand(Command::new("stop").about("Ask the server to shut down"))
		.subcommand(Command::new("health").about("Check that the server is alive"))
		.subcommand(
			Command::new("upload")
				.about("Upload a file to the server's file storage")
				.arg(Arg::new("file").required(true).value_parser(value_parser!(PathBuf)))
				.arg(Arg::new("user").short('u').long("user").value_name("USER").help("Acting user"))
				.arg(domain_arg()),
		)
		.subcommand(
			Command::new("download")
				.about("Download a stored file")
				.arg(Arg::new("file-id").required(true))
				.arg(Arg::new("dest").required(true).value_parser(value_parser!(PathBuf)))
				.arg(domain_arg()),
		)
		.subcommand(
			Command::new("delete")
				.about("Delete a stored file")
				.arg(Arg::new("file-id").required(true))
				.arg(domain_arg()),
		)
		.subcommand(
			Command::new("log").about("Show the server's recent log records").arg(
				Arg::new("limit")
					.short('n')
					.long("limit")
					.value_name("N")
					.value_parser(value_parser!(usize))
					.help("Number of records"),
			),
		)
		.get_matches();

	let config = load_config(&matches)?;
	if matches.subcommand_matches("serve").is_some() {
		return serve(config).await;
	}
	if let Some(sub_matches) = matches.subcommand_matches("encrypt") {
		let value = sub_matches.get_one::<String>("value").ok_or("encrypt: value argument required")?;
		println!("{}", secret::encrypt_value(value, &config.secret_key)?);
		return Ok(());
	}

	logging::init_tracing();
	let communicator = Communicator::new(&config)?;

	if matches.subcommand_matches("stop").is_some() {
		report(communicator.stop().await?)?;
	} else if matches.subcommand_matches("health").is_some() {
		report(communicator.health().await?)?;
	} else if let Some(sub_matches) = matches.subcommand_matches("upload") {
		let file = sub_matches.get_one::<PathBuf>("file").ok_or("upload: file argument required")?;
		let user = sub_matches.get_one::<String>("user").cloned();
		let domain = sub_matches.get_one::<String>("domain").cloned();
		let upload = Upload::from_file(file, user, domain)
			.await
			.map_err(|e| format!("Cannot read {}: {}", file.display(), e))?;
		report(communicator.upload(&upload).await?)?;
	} else if let Some(sub_matches) = matches.subcommand_matches("download") {
		let file_id =
			sub_matches.get_one::<String>("file-id").ok_or("download: file id argument required")?;
		let dest: &Path =
			sub_matches.get_one::<PathBuf>("dest").ok_or("download: destination required")?;
		let domain = sub_matches.get_one::<String>("domain").cloned();
		let answer = communicator.download(file_id, domain, dest).await?;
		if answer.is_success() {
			eprintln!("{} -> {} ({} bytes)", file_id, dest.display(), answer.data_length);
		}
		report(answer)?;
	} else if let Some(sub_matches) = matches.subcommand_matches("delete") {
		let file_id =
			sub_matches.get_one::<String>("file-id").ok_or("delete: file id argument required")?;
		let domain = sub_matches.get_one::<String>("domain").cloned();
		report(communicator.delete(file_id, domain).await?)?;
	} else if let Some(sub_matches) = matches.subcommand_matches("log") {
		let verb = match sub_matches.get_one::<usize>("limit") {
			Some(limit) => format!("limit={}", limit),
			None => "LOG".to_string(),
		};
		let answer = communicator
			.send_command(&config.new_command(log_dispatcher::DISPATCHER_ID, &verb))
			.await?;
		if let Some(object) = answer.object.clone() {
			let records: Vec<LogRecord> = serde_json::from_value(object)?;
			for record in &records {
				println!("{}", record);
			}
		}
		report(answer)?;
	}

	Ok(())
}

// vim: ts=4
