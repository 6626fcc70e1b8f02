//! Core of an automated visual quality-control station.
//!
//! A run triggers the camera for a fixed batch of part images, analyzes each
//! for shape conformance, reports the pass/fail verdict to the actuator board
//! over a serial link, and appends a record to the run history.

pub mod analyzer;
pub mod capture;
pub mod config;
pub mod error;
pub mod hardware;
pub mod history;
pub mod run;

pub use config::StationConfig;
pub use error::QcError;
pub use history::{ProcessingRun, RunHistory, Verdict};
pub use run::{Orchestrator, RunOutcome, RunSettings, StartOutcome, StationState};
