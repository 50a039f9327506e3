//! Session module
//!
//! The controller that owns a transfer's lifecycle, plus the settings,
//! seeding policy and status output it runs on.

pub mod config;
pub mod controller;
pub mod policy;
pub mod progress;

pub use config::{ListenConfig, SeedingPolicy, TransferConfig, TransferMode, DEFAULT_PORT_RANGE};
pub use controller::{ActivePhase, ControllerState, RunOutcome, SessionController};
pub use policy::{evaluate, SeedingDecision, StopReason};
pub use progress::{format_duration, progress_percent, outcome_line, status_line, ProgressDisplay};
