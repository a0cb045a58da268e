use std::process::ExitStatus;

use crate::config::ConfigFault;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("provisioning rejected by provider: {0}")]
    Provisioning(String),

    #[error("publish failed for component(s): {}", .failed.join(", "))]
    Publish { failed: Vec<String> },

    #[error("configuration propagation: {0}")]
    ConfigurationPropagation(#[from] ConfigFault),

    #[error(
        "no route covers externally callable prefix '{prefix}'; \
         requests to it would return an empty response"
    )]
    RoutingGap { prefix: String },

    #[error("route table has no catch-all entry for static content")]
    NoCatchAll,

    #[error(
        "artifact pair mismatch: api tagged '{api}', \
         proxy tagged '{proxy}'"
    )]
    PairMismatch { api: String, proxy: String },

    #[error("access denied: {0}")]
    Access(String),

    #[error("command failed: {command}: {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("SSH connection failed: {0}")]
    SshFailed(String),

    #[error("prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    #[error("host not found: {0}")]
    HostNotFound(String),

    #[error("environment variable missing: {0}")]
    EnvMissing(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error(
        "container '{0}' did not become healthy after {1} attempts"
    )]
    HealthcheckTimeout(String, u32),

    #[error("pipeline run lock held by {holder} since {since}")]
    LockHeld { holder: String, since: String },

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
