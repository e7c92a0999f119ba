//! # minibot-app
//!
//! Application layer: the scheduler core and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceCapability`: screen capture, vision queries and input simulation
//!   - `Clock`: wall clock and sleeping, replaceable by a manual clock
//!   - `EventPublisher`: fan-out of scheduler events
//! - Define the **task contract** (check, execute, verify) and the tagged
//!   registry that builds task variants from validated parameters
//! - Run one activity **cycle** and map every step failure into the failure taxonomy
//! - Drive the **scheduler**: due-set selection, run-now queue, pause/halt
//!   handling, rescheduling and statistics, plus a spawned loop with a
//!   cloneable handle for hosts
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `minibot-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod event_bus;
pub mod ports;
pub mod runner;
pub mod scheduler;
pub mod settings;
pub mod task;
pub mod task_registry;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;
