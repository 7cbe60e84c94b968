//! Node supervisor for an embedded test chain.
//!
//! The supervisor owns one engine instance and keeps a remote consumer's view of
//! it current:
//! * [`NodeSupervisor`]: single-owner actor running the lifecycle state machine and
//!   every engine call, including the fixed-interval state poll
//! * [`StateSynchronizer`]: projects engine state into a [`ChainStateSnapshot`]
//! * [`EventBus`] and [`serve_stream`]: the command/event channel to the consumer
//! * [`LogSink`]: leveled log records mirrored to the consumer
//!
//! [`ChainStateSnapshot`]: devnode_proto::ChainStateSnapshot

#![warn(missing_docs)]

pub mod error;
pub mod log_sink;
pub mod numeric;
pub mod settings;
pub mod supervisor;
pub mod sync;
#[doc(hidden)]
pub mod testing;
pub mod transport;

pub use error::{Result, SupervisorError};
pub use log_sink::LogSink;
pub use settings::{SettingsError, SupervisorSettings};
pub use supervisor::{LifecycleState, NodeSupervisor, SupervisorHandle, SupervisorStatus};
pub use sync::StateSynchronizer;
pub use transport::{EventBus, serve_stream};
