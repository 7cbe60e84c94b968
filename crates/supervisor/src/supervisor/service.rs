use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use devnode_engine::{Address, Engine, EngineError, EngineLauncher, EngineLog};
use devnode_proto::{AccountOptions, Event, NodeConfig, RawNodeConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use super::commands::SupervisorCmd;
use super::handle::SupervisorHandle;
use super::{LifecycleState, SupervisorStatus};
use crate::error::SupervisorError;
use crate::log_sink::LogSink;
use crate::numeric::to_hex;
use crate::settings::SupervisorSettings;
use crate::sync::StateSynchronizer;
use crate::transport::EventBus;

type LaunchOutcome = devnode_engine::Result<Box<dyn Engine>>;

struct RunningNode {
	engine: Box<dyn Engine>,
	port: u16,
	/// Value of `accountsLocked` at start; decides whether added accounts are unlocked.
	accounts_locked: bool,
}

enum Lifecycle {
	Uninitialized,
	Starting { config: NodeConfig, task: JoinHandle<()> },
	Running(RunningNode),
}

impl Lifecycle {
	fn state(&self) -> LifecycleState {
		match self {
			Self::Uninitialized => LifecycleState::Uninitialized,
			Self::Starting { .. } => LifecycleState::Starting,
			Self::Running(_) => LifecycleState::Running,
		}
	}
}

/// Actor owning the engine and its lifecycle.
pub struct NodeSupervisor {
	rx: mpsc::Receiver<SupervisorCmd>,
	launch_tx: mpsc::Sender<LaunchOutcome>,
	launch_rx: mpsc::Receiver<LaunchOutcome>,
	launcher: Arc<dyn EngineLauncher>,
	lifecycle: Lifecycle,
	last_failure: Option<String>,
	sync: StateSynchronizer,
	events: EventBus,
	log: LogSink,
	settings: SupervisorSettings,
}

impl NodeSupervisor {
	/// Spawns the supervisor actor publishing on `events`.
	pub fn start(launcher: Arc<dyn EngineLauncher>, events: EventBus, settings: SupervisorSettings) -> SupervisorHandle {
		let (tx, rx) = mpsc::channel(settings.mailbox_capacity);
		let (launch_tx, launch_rx) = mpsc::channel(1);

		let service = Self {
			rx,
			launch_tx,
			launch_rx,
			launcher,
			lifecycle: Lifecycle::Uninitialized,
			last_failure: None,
			sync: StateSynchronizer::new(settings.recent_blocks, settings.recent_transactions),
			log: LogSink::new(events.clone()),
			events,
			settings,
		};

		tokio::spawn(service.run());

		SupervisorHandle::new(tx)
	}

	async fn run(mut self) {
		let mut poll: Option<Interval> = None;

		let shutdown_reply = loop {
			tokio::select! {
				cmd = self.rx.recv() => {
					let Some(cmd) = cmd else {
						break None;
					};
					match cmd {
						SupervisorCmd::Shutdown { reply } => break Some(reply),
						SupervisorCmd::Status { reply } => {
							let _ = reply.send(self.status());
						}
						SupervisorCmd::Start(raw) => self.handle_start(&raw),
						SupervisorCmd::PushState => self.push_state("GetBlockchainState"),
						SupervisorCmd::StartMining => self.handle_set_mining(true).await,
						SupervisorCmd::StopMining => self.handle_set_mining(false).await,
						SupervisorCmd::ForceMine => self.handle_force_mine().await,
						SupervisorCmd::MakeSnapshot => self.handle_snapshot().await,
						SupervisorCmd::RevertSnapshot => self.handle_revert().await,
						SupervisorCmd::AddAccount(options) => self.handle_add_account(&options).await,
					}
				}
				outcome = self.launch_rx.recv() => {
					if let Some(outcome) = outcome
						&& self.handle_launched(outcome).await
					{
						poll = Some(poll_timer(self.settings.poll_interval()));
					}
				}
				_ = next_tick(&mut poll) => {
					self.push_state("poll");
				}
			}
		};

		// The timer must not outlive the engine.
		drop(poll);
		self.teardown().await;
		tracing::debug!("supervisor.stopped");
		if let Some(reply) = shutdown_reply {
			let _ = reply.send(());
		}
	}

	fn status(&self) -> SupervisorStatus {
		SupervisorStatus {
			state: self.lifecycle.state(),
			port: match &self.lifecycle {
				Lifecycle::Running(node) => Some(node.port),
				_ => None,
			},
			last_failure: self.last_failure.clone(),
		}
	}

	/// Validates the raw configuration and launches the engine off the actor loop.
	fn handle_start(&mut self, raw: &RawNodeConfig) {
		if !matches!(self.lifecycle, Lifecycle::Uninitialized) {
			let err = SupervisorError::DuplicateStart(self.lifecycle.state());
			self.log.warning(format!("start request ignored: {err}"));
			return;
		}

		let config = match NodeConfig::from_raw(raw) {
			Ok(config) => config,
			Err(err) => {
				self.fail_start(format!("invalid configuration: {err}"));
				return;
			}
		};

		let port = config.port_or_default();
		self.log.log(format!("starting node on port {port}"));
		tracing::debug!(port, accounts_locked = config.accounts_locked(), "supervisor.launch");

		let launcher = Arc::clone(&self.launcher);
		let log: Arc<dyn EngineLog> = Arc::new(self.log.clone());
		let launch_tx = self.launch_tx.clone();
		let timeout = self.settings.engine_timeout();
		let task_config = config.clone();
		let task = tokio::spawn(async move {
			let outcome = launch_and_listen(launcher.as_ref(), &task_config, log, timeout).await;
			let _ = launch_tx.send(outcome).await;
		});

		self.lifecycle = Lifecycle::Starting { config, task };
	}

	/// Applies a launch result. Returns `true` if the node is now running.
	async fn handle_launched(&mut self, outcome: LaunchOutcome) -> bool {
		let Lifecycle::Starting { config, .. } = std::mem::replace(&mut self.lifecycle, Lifecycle::Uninitialized) else {
			if let Ok(mut engine) = outcome {
				engine.shutdown().await;
			}
			return false;
		};

		match outcome {
			Ok(engine) => {
				let node = RunningNode {
					engine,
					port: config.port_or_default(),
					accounts_locked: config.accounts_locked(),
				};
				let snapshot = self.sync.extract(&*node.engine);
				self.lifecycle = Lifecycle::Running(node);
				self.last_failure = None;
				self.events.send(Event::Started {
					snapshot: Box::new(snapshot),
				});
				self.log.info("node started");
				true
			}
			Err(err) => {
				self.fail_start(err.to_string());
				false
			}
		}
	}

	fn fail_start(&mut self, reason: String) {
		self.last_failure = Some(reason.clone());
		self.events.send(Event::FailedToStart { reason: reason.clone() });
		self.log.error(format!("node failed to start: {reason}"));
	}

	fn push_state(&self, trigger: &'static str) {
		let Lifecycle::Running(node) = &self.lifecycle else {
			self.log.warning(SupervisorError::NotRunning(trigger).to_string());
			return;
		};
		let snapshot = self.sync.extract(&*node.engine);
		tracing::trace!(trigger, block_number = snapshot.block_number, "supervisor.push_state");
		self.events.send(Event::BlockchainState {
			snapshot: Box::new(snapshot),
		});
	}

	async fn handle_set_mining(&mut self, on: bool) {
		let (command, operation) = if on {
			("StartMining", "start_mining")
		} else {
			("StopMining", "stop_mining")
		};
		let timeout = self.settings.engine_timeout();
		let Some(node) = running_mut(&mut self.lifecycle, &self.log, command) else {
			return;
		};
		self.log.log(if on { "starting mining" } else { "stopping mining" });
		let result = if on {
			bounded(operation, timeout, node.engine.start_mining()).await
		} else {
			bounded(operation, timeout, node.engine.stop_mining()).await
		};
		self.absorb(operation, result);
		self.push_state(command);
	}

	async fn handle_force_mine(&mut self) {
		let timeout = self.settings.engine_timeout();
		let Some(node) = running_mut(&mut self.lifecycle, &self.log, "ForceMine") else {
			return;
		};
		self.log.log("forcing mine");
		let result = bounded("process_blocks", timeout, node.engine.process_blocks(1)).await;
		self.absorb("process_blocks", result);
		self.push_state("ForceMine");
	}

	async fn handle_snapshot(&mut self) {
		let timeout = self.settings.engine_timeout();
		let Some(node) = running_mut(&mut self.lifecycle, &self.log, "MakeSnapshot") else {
			return;
		};
		self.log.log("making snapshot");
		let result = bounded("snapshot", timeout, node.engine.snapshot()).await;
		if let Some(id) = self.absorb("snapshot", result) {
			tracing::debug!(id, "supervisor.snapshot");
		}
	}

	async fn handle_revert(&mut self) {
		let timeout = self.settings.engine_timeout();
		let Some(node) = running_mut(&mut self.lifecycle, &self.log, "RevertSnapshot") else {
			return;
		};
		self.log.log("reverting snapshot");
		let result = bounded("revert", timeout, node.engine.revert()).await;
		match self.absorb("revert", result) {
			Some(true) => tracing::debug!("supervisor.reverted"),
			Some(false) => self.log.info("no snapshot to revert"),
			None => {}
		}
	}

	async fn handle_add_account(&mut self, options: &AccountOptions) {
		let timeout = self.settings.engine_timeout();
		let Some(node) = running_mut(&mut self.lifecycle, &self.log, "AddAccount") else {
			return;
		};
		self.log.log("adding account");
		let unlocked = !node.accounts_locked;
		let result: devnode_engine::Result<Address> = async {
			let account = bounded("create_account", timeout, node.engine.create_account(options)).await?;
			let address = account.address;
			bounded("register_account", timeout, node.engine.register_account(account, unlocked)).await?;
			Ok(address)
		}
		.await;
		if let Some(address) = self.absorb("add_account", result) {
			self.log.log(format!("account added: {}", to_hex(&address)));
		}
	}

	/// Logs a failed engine call at error severity and drops it.
	fn absorb<T>(&self, operation: &'static str, result: devnode_engine::Result<T>) -> Option<T> {
		match result {
			Ok(value) => Some(value),
			Err(err) => {
				self.log.error(format!("{operation} failed: {err}"));
				None
			}
		}
	}

	async fn teardown(&mut self) {
		match std::mem::replace(&mut self.lifecycle, Lifecycle::Uninitialized) {
			Lifecycle::Running(mut node) => {
				if tokio::time::timeout(self.settings.engine_timeout(), node.engine.shutdown())
					.await
					.is_err()
				{
					tracing::warn!("supervisor.engine_shutdown_timeout");
				}
				tracing::info!(port = node.port, "supervisor.engine_stopped");
			}
			Lifecycle::Starting { task, .. } => task.abort(),
			Lifecycle::Uninitialized => {}
		}
	}
}

fn running_mut<'a>(lifecycle: &'a mut Lifecycle, log: &LogSink, command: &'static str) -> Option<&'a mut RunningNode> {
	match lifecycle {
		Lifecycle::Running(node) => Some(node),
		_ => {
			log.warning(SupervisorError::NotRunning(command).to_string());
			None
		}
	}
}

async fn launch_and_listen(
	launcher: &dyn EngineLauncher,
	config: &NodeConfig,
	log: Arc<dyn EngineLog>,
	timeout: Duration,
) -> devnode_engine::Result<Box<dyn Engine>> {
	let mut engine = bounded("launch", timeout, launcher.launch(config, log)).await?;
	if let Err(err) = bounded("listen", timeout, engine.listen(config.port_or_default())).await {
		engine.shutdown().await;
		return Err(err);
	}
	Ok(engine)
}

async fn bounded<T>(
	operation: &'static str,
	after: Duration,
	call: impl Future<Output = devnode_engine::Result<T>>,
) -> devnode_engine::Result<T> {
	tokio::time::timeout(after, call)
		.await
		.unwrap_or(Err(EngineError::Timeout { operation, after }))
}

/// First tick one period from now; the start itself already pushed a snapshot.
fn poll_timer(period: Duration) -> Interval {
	let mut timer = interval_at(Instant::now() + period, period);
	timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
	timer
}

async fn next_tick(timer: &mut Option<Interval>) {
	match timer {
		Some(timer) => {
			timer.tick().await;
		}
		None => std::future::pending().await,
	}
}
