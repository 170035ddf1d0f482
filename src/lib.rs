pub mod browser;
pub mod config;
pub mod desktop;
pub mod error;
pub mod orchestrator;
pub mod runbook;
pub mod runs;
pub mod session;
pub mod steps;
pub mod vision;

pub use config::Config;
pub use error::{BotError, Result};
pub use orchestrator::{Orchestrator, RunReport, SessionOptions, StepFailure};
pub use session::SessionContext;
pub use steps::Step;
