//! CLI error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use cornea_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Replay ───────────────────────────────────────────────────────

    #[error("Replay script not found: {path}")]
    #[diagnostic(
        code(cornea::script_not_found),
        help("Pass the path to a JSON replay script: cornea replay <SCRIPT>")
    )]
    ScriptNotFound { path: String },

    #[error("Invalid replay script {path}")]
    #[diagnostic(
        code(cornea::script_invalid),
        help("Check the script against the replay format: models, subsystems, commands, steps.")
    )]
    InvalidScript {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(cornea::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(cornea::config),
        help("Config file location: cornea config path")
    )]
    Config(#[from] ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(cornea::serialize))]
    Serialize(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ScriptNotFound { .. } => exit_code::NOT_FOUND,
            Self::InvalidScript { .. } | Self::Validation { .. } => exit_code::USAGE,
            Self::Config(_) => exit_code::CONFIG,
            Self::Io(_) | Self::Serialize(_) => exit_code::GENERAL,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}
