use std::sync::Arc;
use std::time::Duration;

use devnode_engine::{ChainReader, EngineError};
use devnode_proto::{AccountOptions, ChainStateSnapshot, Command, Event, LogLevel, RawNodeConfig};
use tokio::sync::broadcast;

use super::*;
use crate::settings::SupervisorSettings;
use crate::testing::{FakeChain, FakeLauncher};
use crate::transport::EventBus;

struct Harness {
	handle: SupervisorHandle,
	events: broadcast::Receiver<Event>,
	chain: FakeChain,
	launcher: Arc<FakeLauncher>,
}

fn harness_with(launcher: Arc<FakeLauncher>, chain: FakeChain) -> Harness {
	let bus = EventBus::new(1024);
	let events = bus.subscribe();
	let handle = NodeSupervisor::start(launcher.clone(), bus, SupervisorSettings::default());
	Harness {
		handle,
		events,
		chain,
		launcher,
	}
}

fn harness() -> Harness {
	let chain = FakeChain::default();
	harness_with(FakeLauncher::new(chain.clone()), chain)
}

impl Harness {
	async fn next_event(&mut self) -> Event {
		tokio::time::timeout(Duration::from_secs(60), self.events.recv())
			.await
			.expect("event within timeout")
			.expect("event bus open")
	}

	/// Next event that is not a log record.
	async fn next_state_event(&mut self) -> Event {
		loop {
			match self.next_event().await {
				Event::Log { .. } => continue,
				event => return event,
			}
		}
	}

	async fn next_snapshot(&mut self) -> ChainStateSnapshot {
		match self.next_state_event().await {
			Event::Started { snapshot } | Event::BlockchainState { snapshot } => *snapshot,
			other => panic!("expected a snapshot, got {other:?}"),
		}
	}

	/// Next log record at `level`, skipping everything else.
	async fn next_log(&mut self, level: LogLevel) -> String {
		loop {
			if let Event::Log { message, level: got } = self.next_event().await
				&& got == level
			{
				return message;
			}
		}
	}

	async fn start(&mut self) -> ChainStateSnapshot {
		self.handle.start(RawNodeConfig::default()).await.unwrap();
		match self.next_state_event().await {
			Event::Started { snapshot } => *snapshot,
			other => panic!("expected Started, got {other:?}"),
		}
	}

	/// Events published so far, without waiting.
	fn drain(&mut self) -> Vec<Event> {
		std::iter::from_fn(|| self.events.try_recv().ok()).collect()
	}

	async fn state(&self) -> LifecycleState {
		self.handle.status().await.unwrap().state
	}
}

#[tokio::test(start_paused = true)]
async fn start_emits_started_and_listens_on_configured_port() {
	let mut h = harness();
	let snapshot = h.start().await;

	assert_eq!(snapshot.block_number, 0);
	assert_eq!(h.launcher.launches(), 1);
	assert_eq!(h.chain.state().port, Some(8545));
	let status = h.handle.status().await.unwrap();
	assert_eq!(status.state, LifecycleState::Running);
	assert_eq!(status.port, Some(8545));
	assert_eq!(h.next_log(LogLevel::Info).await, "node started");
}

#[tokio::test(start_paused = true)]
async fn duplicate_start_while_running_is_ignored() {
	let mut h = harness();
	h.start().await;
	h.handle.start(RawNodeConfig::default()).await.unwrap();

	let warning = h.next_log(LogLevel::Warning).await;
	assert!(warning.contains("already running"), "{warning}");
	h.handle.status().await.unwrap();
	assert!(!h.drain().iter().any(|e| matches!(e, Event::Started { .. })));
	assert_eq!(h.launcher.launches(), 1);
	assert_eq!(h.chain.calls(), vec!["listen"]);
}

#[tokio::test(start_paused = true)]
async fn duplicate_start_while_starting_is_ignored() {
	let chain = FakeChain::default();
	let mut h = harness_with(FakeLauncher::delayed(chain.clone(), Duration::from_secs(2)), chain);

	h.handle.start(RawNodeConfig::default()).await.unwrap();
	assert_eq!(h.state().await, LifecycleState::Starting);
	h.handle.start(RawNodeConfig::default()).await.unwrap();
	let warning = h.next_log(LogLevel::Warning).await;
	assert!(warning.contains("already starting"), "{warning}");

	assert!(matches!(h.next_state_event().await, Event::Started { .. }));
	assert_eq!(h.launcher.launches(), 1);
	assert_eq!(h.state().await, LifecycleState::Running);
}

#[tokio::test(start_paused = true)]
async fn failed_launch_returns_to_uninitialized_and_can_retry() {
	let chain = FakeChain::default();
	let launcher = FakeLauncher::failing_once(chain.clone(), EngineError::Start("disk full".into()));
	let mut h = harness_with(launcher, chain);

	h.handle.start(RawNodeConfig::default()).await.unwrap();
	match h.next_state_event().await {
		Event::FailedToStart { reason } => assert!(reason.contains("disk full"), "{reason}"),
		other => panic!("expected FailedToStart, got {other:?}"),
	}
	let status = h.handle.status().await.unwrap();
	assert_eq!(status.state, LifecycleState::Uninitialized);
	assert!(status.last_failure.unwrap().contains("disk full"));
	assert!(h.drain().iter().any(|e| matches!(e, Event::Log { level: LogLevel::Error, .. })));

	h.start().await;
	assert_eq!(h.launcher.launches(), 2);
	assert_eq!(h.handle.status().await.unwrap().last_failure, None);
}

#[tokio::test(start_paused = true)]
async fn invalid_config_fails_without_launching() {
	let mut h = harness();
	let raw = RawNodeConfig {
		mnemonic: Some("test test test".into()),
		seed: Some("abc".into()),
		..RawNodeConfig::default()
	};
	h.handle.start(raw).await.unwrap();

	match h.next_state_event().await {
		Event::FailedToStart { reason } => assert!(reason.starts_with("invalid configuration"), "{reason}"),
		other => panic!("expected FailedToStart, got {other:?}"),
	}
	assert_eq!(h.launcher.launches(), 0);
	assert_eq!(h.state().await, LifecycleState::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn oversized_account_count_fails_without_launching() {
	let mut h = harness();
	let raw = RawNodeConfig {
		total_accounts: 2_000_000,
		..RawNodeConfig::default()
	};
	h.handle.start(raw).await.unwrap();

	match h.next_state_event().await {
		Event::FailedToStart { reason } => assert!(reason.contains("2000000 accounts requested"), "{reason}"),
		other => panic!("expected FailedToStart, got {other:?}"),
	}
	assert_eq!(h.launcher.launches(), 0);
	assert_eq!(h.state().await, LifecycleState::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn launch_timeout_reports_failure() {
	let chain = FakeChain::default();
	let mut h = harness_with(FakeLauncher::delayed(chain.clone(), Duration::from_secs(60)), chain);

	h.handle.start(RawNodeConfig::default()).await.unwrap();
	match h.next_state_event().await {
		Event::FailedToStart { reason } => assert!(reason.contains("launch timed out"), "{reason}"),
		other => panic!("expected FailedToStart, got {other:?}"),
	}
	assert_eq!(h.state().await, LifecycleState::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn running_node_is_polled_every_interval() {
	let mut h = harness();
	h.start().await;
	h.drain();

	tokio::time::sleep(Duration::from_millis(3_500)).await;
	let pushes = h
		.drain()
		.into_iter()
		.filter(|e| matches!(e, Event::BlockchainState { .. }))
		.count();
	assert_eq!(pushes, 3);
}

#[tokio::test(start_paused = true)]
async fn nothing_is_polled_before_start() {
	let mut h = harness();
	tokio::time::sleep(Duration::from_secs(5)).await;
	assert!(h.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn mining_commands_push_state_immediately() {
	let mut h = harness();
	h.start().await;

	h.handle.dispatch(Command::StartMining).await.unwrap();
	assert!(h.next_snapshot().await.is_mining);

	h.handle.dispatch(Command::ForceMine).await.unwrap();
	let snapshot = h.next_snapshot().await;
	assert_eq!(snapshot.block_number, 1);
	assert_eq!(snapshot.blocks.len(), 2);

	h.handle.dispatch(Command::StopMining).await.unwrap();
	assert!(!h.next_snapshot().await.is_mining);

	assert_eq!(h.chain.calls(), vec!["listen", "start_mining", "process_blocks", "stop_mining"]);
}

#[tokio::test(start_paused = true)]
async fn force_mine_adds_one_block_when_mining_is_off() {
	let mut h = harness();
	h.start().await;
	h.handle.dispatch(Command::StopMining).await.unwrap();
	h.next_snapshot().await;

	h.handle.dispatch(Command::ForceMine).await.unwrap();
	h.next_snapshot().await;
	assert_eq!(h.chain.view().block_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn consecutive_reads_are_identical() {
	let mut h = harness();
	h.start().await;

	h.handle.dispatch(Command::GetBlockchainState).await.unwrap();
	let first = h.next_snapshot().await;
	h.handle.dispatch(Command::GetBlockchainState).await.unwrap();
	let second = h.next_snapshot().await;
	assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn commands_before_start_are_warned_and_dropped() {
	let mut h = harness();
	h.handle.dispatch(Command::StartMining).await.unwrap();
	h.handle.dispatch(Command::GetBlockchainState).await.unwrap();

	let first = h.next_log(LogLevel::Warning).await;
	assert!(first.contains("StartMining"), "{first}");
	let second = h.next_log(LogLevel::Warning).await;
	assert!(second.contains("GetBlockchainState"), "{second}");
	h.handle.status().await.unwrap();
	assert!(!h.drain().iter().any(|e| matches!(e, Event::BlockchainState { .. })));
	assert!(h.chain.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn engine_failures_are_logged_and_absorbed() {
	let mut h = harness();
	h.start().await;
	h.chain.set_failing(true);

	h.handle.dispatch(Command::StopMining).await.unwrap();
	let error = h.next_log(LogLevel::Error).await;
	assert!(error.contains("stop_mining failed"), "{error}");
	assert_eq!(h.state().await, LifecycleState::Running);

	h.chain.set_failing(false);
	h.handle.dispatch(Command::MakeSnapshot).await.unwrap();
	h.handle.status().await.unwrap();
	assert_eq!(h.chain.state().snapshots, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn snapshot_and_revert_are_forwarded() {
	let mut h = harness();
	h.start().await;

	h.handle.dispatch(Command::MakeSnapshot).await.unwrap();
	h.handle.dispatch(Command::RevertSnapshot).await.unwrap();
	h.handle.status().await.unwrap();
	assert!(h.chain.state().snapshots.is_empty());

	h.handle.dispatch(Command::RevertSnapshot).await.unwrap();
	assert_eq!(h.next_log(LogLevel::Info).await, "node started");
	assert_eq!(h.next_log(LogLevel::Info).await, "no snapshot to revert");
	assert_eq!(h.chain.calls(), vec!["listen", "snapshot", "revert", "revert"]);
}

#[tokio::test(start_paused = true)]
async fn added_accounts_follow_the_lock_flag() {
	for locked in [false, true] {
		let mut h = harness();
		let raw = RawNodeConfig {
			accounts_locked: locked,
			..RawNodeConfig::default()
		};
		h.handle.start(raw).await.unwrap();
		assert!(matches!(h.next_state_event().await, Event::Started { .. }));

		h.handle
			.dispatch(Command::AddAccount(AccountOptions {
				balance: Some("1000".into()),
				secret_key: None,
			}))
			.await
			.unwrap();
		h.handle.dispatch(Command::GetBlockchainState).await.unwrap();
		let snapshot = h.next_snapshot().await;

		assert_eq!(snapshot.accounts.len(), 1);
		let account = &snapshot.accounts[0];
		assert_eq!(account.index, 0);
		assert_eq!(account.balance, "1000");
		assert_eq!(account.is_unlocked, !locked, "accounts_locked = {locked}");
		assert_eq!(h.chain.state().unlocked.len(), usize::from(!locked));
	}
}

#[tokio::test(start_paused = true)]
async fn add_account_logs_its_address() {
	let mut h = harness();
	h.start().await;
	h.handle.dispatch(Command::AddAccount(AccountOptions::default())).await.unwrap();

	assert_eq!(h.next_log(LogLevel::Log).await, "adding account");
	assert_eq!(h.next_log(LogLevel::Log).await, format!("account added: 0x{}", "01".repeat(20)));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_polling_and_the_engine() {
	let mut h = harness();
	h.start().await;
	h.handle.shutdown().await.unwrap();

	assert_eq!(h.chain.calls().last(), Some(&"shutdown"));
	h.drain();
	tokio::time::sleep(Duration::from_secs(5)).await;
	assert!(!h.drain().iter().any(|e| matches!(e, Event::BlockchainState { .. })));
	assert_eq!(h.handle.status().await, Err(crate::SupervisorError::Closed));
}

#[tokio::test(start_paused = true)]
async fn shutdown_while_starting_abandons_the_launch() {
	let chain = FakeChain::default();
	let mut h = harness_with(FakeLauncher::delayed(chain.clone(), Duration::from_secs(2)), chain);
	h.handle.start(RawNodeConfig::default()).await.unwrap();
	assert_eq!(h.state().await, LifecycleState::Starting);

	h.handle.shutdown().await.unwrap();
	tokio::time::sleep(Duration::from_secs(5)).await;
	assert!(!h.drain().iter().any(|e| matches!(e, Event::Started { .. })));
	assert!(h.chain.calls().is_empty());
}
