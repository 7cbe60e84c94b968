//! End-to-end exchange over an in-memory duplex stream.

use std::time::Duration;

use devnode_proto::{Event, LogLevel, decode_event};
use devnode_supervisor::testing::{FakeChain, FakeLauncher};
use devnode_supervisor::{EventBus, LogSink, NodeSupervisor, SupervisorSettings, serve_stream};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf};

type EventLines = Lines<BufReader<ReadHalf<DuplexStream>>>;

async fn next_line(lines: &mut EventLines) -> String {
	tokio::time::timeout(Duration::from_secs(5), lines.next_line())
		.await
		.expect("line within timeout")
		.expect("readable stream")
		.expect("stream still open")
}

/// Reads until an event matching `pred` arrives, returning its raw line.
async fn wait_for(lines: &mut EventLines, pred: impl Fn(&Event) -> bool) -> (String, Event) {
	loop {
		let line = next_line(lines).await;
		let event = decode_event(&line).expect("well-formed event line");
		if pred(&event) {
			return (line, event);
		}
	}
}

#[tokio::test]
async fn consumer_drives_node_over_json_lines() {
	let chain = FakeChain::default();
	let launcher = FakeLauncher::new(chain.clone());
	let bus = EventBus::new(256);
	let handle = NodeSupervisor::start(launcher.clone(), bus.clone(), SupervisorSettings::default());

	let (client, server) = tokio::io::duplex(64 * 1024);
	let (server_read, server_write) = tokio::io::split(server);
	let pump = tokio::spawn(serve_stream(
		BufReader::new(server_read),
		server_write,
		handle.clone(),
		bus.subscribe(),
		LogSink::new(bus.clone()),
	));

	let (client_read, mut client_write) = tokio::io::split(client);
	let mut lines = BufReader::new(client_read).lines();

	client_write
		.write_all(b"{\"type\":\"StartRpc\",\"payload\":{\"port\":\"8600\",\"totalAccounts\":\"\",\"mnemonic\":\"\"}}\n")
		.await
		.unwrap();
	let (raw, _) = wait_for(&mut lines, |e| matches!(e, Event::Started { .. })).await;
	assert!(raw.contains("\"isMiningOnInterval\":false"), "{raw}");
	assert!(raw.contains("\"hdPath\""), "{raw}");
	assert_eq!(launcher.configs()[0].port(), Some(8600));
	assert_eq!(launcher.configs()[0].total_accounts(), None);
	assert_eq!(chain.state().port, Some(8600));

	client_write.write_all(b"not json at all\n\n").await.unwrap();
	let (_, warning) = wait_for(&mut lines, |e| matches!(e, Event::Log { level: LogLevel::Warning, .. })).await;
	match warning {
		Event::Log { message, .. } => assert!(message.starts_with("ignoring malformed command"), "{message}"),
		other => panic!("unexpected {other:?}"),
	}

	client_write.write_all(b"{\"type\":\"ForceMine\"}\n").await.unwrap();
	let (_, state) = wait_for(&mut lines, |e| {
		matches!(e, Event::BlockchainState { snapshot } if snapshot.block_number == 1)
	})
	.await;
	assert!(matches!(state, Event::BlockchainState { .. }));
	assert_eq!(chain.state().blocks.len(), 2);

	client_write.shutdown().await.unwrap();
	drop(client_write);
	tokio::time::timeout(Duration::from_secs(5), pump)
		.await
		.expect("pump ends on EOF")
		.expect("pump task")
		.expect("pump I/O");

	handle.shutdown().await.unwrap();
	assert_eq!(chain.calls().last(), Some(&"shutdown"));
}
