//! Shared fixtures for the behavioural suites.

mod config_loader;
mod modules;
mod reporter;
mod world;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use modules::SwitchableModule;
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use world::{BootstrapWorld, SessionWorld};
