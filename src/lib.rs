pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::Settings;

pub use adapters::{ComputeStudioProvider, OauthClient, PollingConfig};
pub use crate::core::StitchEngine;
pub use domain::model::{AppId, RawParamSet, StitchOutcome};
pub use utils::error::{Result, StitchError};
