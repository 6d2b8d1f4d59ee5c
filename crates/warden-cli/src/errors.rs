//! Error types for the CLI runtime.

use std::sync::Arc;

use thiserror::Error;

use crate::lifecycle::LifecycleError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to write usage output: {0}")]
    EmitUsage(std::io::Error),
    #[error("supervisor lifecycle command failed: {0}")]
    Lifecycle(#[from] LifecycleError),
}
