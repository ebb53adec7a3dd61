//! Typed error hierarchy for kubelab.
//!
//! `LabError` is the single library-level enum. Parameter and registry
//! variants are raised before any external side effect; the external
//! variants carry enough context (command text, captured output, failed
//! destroy step) for a user to intervene by hand.

use std::path::PathBuf;

use thiserror::Error;

use crate::orchestrator::DestroyStep;

pub type LabResult<T> = std::result::Result<T, LabError>;

#[derive(Debug, Error)]
pub enum LabError {
    #[error("Missing required parameter '{parameter}': {hint}")]
    MissingParameter { parameter: String, hint: String },

    #[error("Cluster '{name}' already exists in the registry")]
    DuplicateName { name: String },

    #[error("Cluster '{name}' is registered in {expected}, not {actual}")]
    LocationMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Command `{command}` failed with exit code {exit_code}")]
    ExternalCommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("Cluster '{name}' is not managed by kubelab")]
    NotManaged { name: String },

    #[error("Product '{product}' is already installed on cluster '{cluster}'")]
    ProductInstalled { product: String, cluster: String },

    #[error("Product '{product}' is not installed on cluster '{cluster}'")]
    ProductNotInstalled { product: String, cluster: String },

    #[error("Unknown product '{0}' (available: nginx)")]
    UnknownProduct(String),

    #[error("Timed out after {waited_secs}s waiting for {what}")]
    ConvergenceTimeout { what: String, waited_secs: u64 },

    #[error("Destroy step '{step}' failed")]
    DestroyStepFailed {
        step: DestroyStep,
        #[source]
        source: Box<LabError>,
    },

    #[error("Invalid cluster name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("{tool} is not usable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Unsupported provider '{0}'. Valid values: aws, azure, gcp")]
    UnsupportedProvider(String),

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Prompt failed: {0}")]
    Prompt(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LabError {
    pub fn missing(parameter: impl Into<String>, hint: impl Into<String>) -> Self {
        LabError::MissingParameter {
            parameter: parameter.into(),
            hint: hint.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LabError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap an error as the failure of one destroy step.
    pub fn at_step(self, step: DestroyStep) -> Self {
        LabError::DestroyStepFailed {
            step,
            source: Box::new(self),
        }
    }

    /// Message including the cause of a failed destroy step, for the action log.
    pub fn detail(&self) -> String {
        match self {
            LabError::DestroyStepFailed { source, .. } => format!("{}: {}", self, source.detail()),
            _ => self.to_string(),
        }
    }

    /// The captured output of a failed external command, if any.
    pub fn command_output(&self) -> Option<&str> {
        match self {
            LabError::ExternalCommandFailed { output, .. } => Some(output),
            LabError::DestroyStepFailed { source, .. } => source.command_output(),
            _ => None,
        }
    }
}
