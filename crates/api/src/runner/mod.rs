//! Process supervision for the external sync tool.
//!
//! `command` builds argument vectors from profile data, `registry` owns the
//! live handles of spawned processes keyed by run id, `events` carries the
//! typed per-run event stream, and `supervisor` ties them together for the
//! unattended and interactive execution paths.

pub mod command;
pub mod events;
pub mod registry;
pub mod supervisor;

pub use events::{RunEvent, RunOutcome};
pub use supervisor::RunSupervisor;
