//! Devnode daemon.
//!
//! Runs one supervised test chain and exchanges newline-delimited JSON commands and
//! events with a single consumer over stdio or a Unix domain socket.

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use devnode_engine::DevChainLauncher;
use devnode_proto::RawNodeConfig;
use devnode_supervisor::{EventBus, LogSink, NodeSupervisor, SupervisorSettings};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Daemon command line arguments.
#[derive(Parser, Debug)]
#[command(name = "devnode")]
#[command(about = "Supervisor for an embedded test blockchain node")]
struct Args {
	/// Serve on a Unix socket instead of stdio
	#[arg(short, long, value_name = "PATH")]
	socket: Option<PathBuf>,

	/// Supervisor settings file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Start the node with default settings on boot
	#[arg(long)]
	autostart: bool,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let settings = match &args.config {
		Some(path) => SupervisorSettings::load(path)?,
		None => SupervisorSettings::default(),
	};
	info!(?settings, "starting devnode");

	let events = EventBus::new(settings.event_buffer);
	// Subscribed before autostart so stdio consumers see `Started`.
	let stdio_events = events.subscribe();
	let handle = NodeSupervisor::start(Arc::new(DevChainLauncher::new()), events.clone(), settings);
	let log = LogSink::new(events.clone());

	if args.autostart {
		handle.start(RawNodeConfig::default()).await?;
	}

	let shutdown = CancellationToken::new();
	tokio::spawn({
		let shutdown = shutdown.clone();
		async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				info!("interrupt received");
			}
			shutdown.cancel();
		}
	});

	let served = match &args.socket {
		Some(path) => {
			drop(stdio_events);
			server::serve_socket(path, &handle, &events, &log, shutdown).await
		}
		None => server::serve_stdio(&handle, stdio_events, &log, shutdown).await,
	};

	handle.shutdown().await?;
	info!("devnode stopped");
	served?;

	Ok(())
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("devnode=trace,devnode_supervisor=trace,devnode_engine=debug,info")
			} else {
				EnvFilter::new("devnode=debug,devnode_supervisor=debug,info")
			}
		})
	};

	if let Some(log_dir) = std::env::var("DEVNODE_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("devnode.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_target(true);

			tracing_subscriber::registry().with(filter()).with(file_layer).init();

			tracing::info!(path = ?log_path, "tracing initialized");
			return;
		}
	}

	// stdout carries the wire protocol.
	tracing_subscriber::fmt()
		.with_env_filter(filter())
		.with_writer(std::io::stderr)
		.init();
}

#[cfg(test)]
mod tests {
	use clap::Parser;

	use super::Args;

	#[test]
	fn defaults_serve_stdio() {
		let args = Args::try_parse_from(["devnode"]).unwrap();
		assert!(args.socket.is_none());
		assert!(args.config.is_none());
		assert!(!args.autostart);
		assert!(!args.verbose);
	}

	#[test]
	fn flags_are_parsed() {
		let args =
			Args::try_parse_from(["devnode", "--socket", "/tmp/devnode.sock", "-c", "devnode.toml", "--autostart", "-v"])
				.unwrap();
		assert_eq!(args.socket.as_deref(), Some(std::path::Path::new("/tmp/devnode.sock")));
		assert_eq!(args.config.as_deref(), Some(std::path::Path::new("devnode.toml")));
		assert!(args.autostart);
		assert!(args.verbose);
	}
}
