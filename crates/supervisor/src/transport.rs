//! Command/event channel between the supervisor and its remote consumer.
//!
//! Outbound events fan out through an [`EventBus`]. [`serve_stream`] pumps one
//! consumer connection: inbound lines are decoded into commands and dispatched in
//! arrival order, and every bus event is written back as one JSON line.

use devnode_proto::{CodecError, Event, decode_command, encode_line};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::log_sink::LogSink;
use crate::supervisor::SupervisorHandle;

/// Fan-out sender for events addressed to the consumer.
///
/// Sending never fails. Events published while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
	tx: broadcast::Sender<Event>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity);
		Self { tx }
	}

	/// Publishes an event.
	pub fn send(&self, event: Event) {
		let _ = self.tx.send(event);
	}

	/// Subscribes to events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<Event> {
		self.tx.subscribe()
	}
}

/// Pumps commands from `reader` into the supervisor and events from `events` into
/// `writer` until the reader reaches EOF or the supervisor stops.
///
/// Blank lines are skipped. Lines that do not decode to a command are reported as
/// a warning on `log` and skipped.
///
/// # Errors
///
/// Returns any I/O error from reading or writing the stream.
pub async fn serve_stream<R, W>(
	reader: R,
	mut writer: W,
	handle: SupervisorHandle,
	mut events: broadcast::Receiver<Event>,
	log: LogSink,
) -> std::io::Result<()>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let mut lines = reader.lines();

	loop {
		tokio::select! {
			line = lines.next_line() => {
				let Some(line) = line? else {
					tracing::debug!("transport.eof");
					break;
				};
				match decode_command(&line) {
					Ok(command) => {
						tracing::trace!(command = command.name(), "transport.command");
						if handle.dispatch(command).await.is_err() {
							break;
						}
					}
					Err(CodecError::Empty) => {}
					Err(err) => log.warning(format!("ignoring malformed command: {err}")),
				}
			}
			event = events.recv() => match event {
				Ok(event) => write_event(&mut writer, &event).await?,
				Err(RecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "transport.lagged");
				}
				Err(RecvError::Closed) => break,
			},
		}
	}

	writer.flush().await
}

async fn write_event<W: AsyncWrite + Unpin>(writer: &mut W, event: &Event) -> std::io::Result<()> {
	let line = encode_line(event).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
	writer.write_all(line.as_bytes()).await?;
	writer.flush().await
}
