//! Shipwright - cross-platform release pipelines
//!
//! Runs one desktop application build per target platform, concurrently:
//! restore caches, provision the platform, invoke the bundler, save caches,
//! then collect and upload the platform's deliverables.

pub mod artifact;
pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod pipeline;
pub mod platform;
pub mod provision;
pub mod runlog;
pub mod trigger;
pub mod ui;

pub use error::{ShipwrightError, ShipwrightResult};
