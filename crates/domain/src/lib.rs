//! # minibot-domain
//!
//! Pure domain model for the minibot device automation scheduler.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Activities** (one automation task definition plus its runtime state)
//! - Define the **activity lifecycle** state machine and its legal transitions
//! - Define the **failure taxonomy** every cycle outcome is mapped into
//! - Define the **retry/backoff policy** (attempt number → delay)
//! - Define **statistics** (per-activity counters and success rates)
//! - Define **time windows** (daily local-time eligibility ranges)
//! - Define **status snapshots** handed to the host
//! - Define **scheduler events** and the value types exchanged with the
//!   device/vision capability (frames, locations, regions, colour bounds)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod activity;
pub mod event;
pub mod failure;
pub mod retry;
pub mod statistics;
pub mod status;
pub mod vision;
pub mod window;
