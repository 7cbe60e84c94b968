//! Consumer transports for the daemon.

use std::path::Path;

use devnode_proto::Event;
use devnode_supervisor::{EventBus, LogSink, SupervisorHandle, serve_stream};
use tokio::io::BufReader;
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Serves the single consumer attached to stdin/stdout.
pub(crate) async fn serve_stdio(
	handle: &SupervisorHandle,
	events: broadcast::Receiver<Event>,
	log: &LogSink,
	shutdown: CancellationToken,
) -> std::io::Result<()> {
	let session = serve_stream(
		BufReader::new(tokio::io::stdin()),
		tokio::io::stdout(),
		handle.clone(),
		events,
		log.clone(),
	);
	tokio::select! {
		res = session => res,
		_ = shutdown.cancelled() => Ok(()),
	}
}

/// Serves consumers on a Unix domain socket, one connection at a time, until
/// `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound or a stale socket file cannot
/// be removed.
pub(crate) async fn serve_socket(
	path: &Path,
	handle: &SupervisorHandle,
	events: &EventBus,
	log: &LogSink,
	shutdown: CancellationToken,
) -> std::io::Result<()> {
	if let Some(parent) = path.parent()
		&& !parent.as_os_str().is_empty()
		&& !parent.exists()
	{
		tokio::fs::create_dir_all(parent).await?;
	}
	if path.exists() {
		tokio::fs::remove_file(path).await?;
	}

	let listener = UnixListener::bind(path)?;
	tracing::info!(path = %path.display(), "devnode socket listening");

	loop {
		let stream = tokio::select! {
			_ = shutdown.cancelled() => break,
			res = listener.accept() => match res {
				Ok((stream, _addr)) => stream,
				Err(err) => {
					tracing::error!(error = %err, "failed to accept connection");
					continue;
				}
			},
		};

		tracing::info!("consumer connected");
		let (reader, writer) = stream.into_split();
		let session = serve_stream(BufReader::new(reader), writer, handle.clone(), events.subscribe(), log.clone());
		tokio::select! {
			res = session => {
				if let Err(err) = res {
					tracing::warn!(error = %err, "consumer session failed");
				}
			}
			_ = shutdown.cancelled() => break,
		}
		tracing::info!("consumer disconnected");
	}

	if let Err(err) = tokio::fs::remove_file(path).await {
		tracing::debug!(error = %err, "socket cleanup skipped");
	}
	Ok(())
}
