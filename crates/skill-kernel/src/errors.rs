//! Error taxonomy for the kernel.
//!
//! `KernelError` enumerates *kinds*, not exhaustive causes: every public
//! operation maps its failures onto one of these variants so that callers
//! (Dispatch, the CLI, the Agent Loop) can match on `kind` rather than parse
//! error strings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Dispatch-specific `NotFound` (§4.F, §8): the skill isn't loaded, the
    /// command doesn't exist on it, or no direct handler is registered for
    /// it. Kept distinct from the general [`KernelError::NotFound`] because
    /// §4.F's `Result.kind` enumeration and §8's testable properties both
    /// name it `CommandNotFound` specifically.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("duplicate command {command:?} in skill {skill:?}")]
    Duplicate { skill: String, command: String },

    #[error("load failed for skill {skill:?}: {reason}")]
    LoadFailed { skill: String, reason: String },

    #[error("reload failed for skill {skill:?}, previous version retained: {reason}")]
    ReloadFailed { skill: String, reason: String },

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("subprocess failed (exit {exit_code:?}): {stderr}")]
    SubprocessFailure {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("inference call failed: {0}")]
    InferenceFailure(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KernelError {
    /// The stable `kind` tag used in result envelopes and CLI exit-code mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::NotFound(_) => "NotFound",
            KernelError::CommandNotFound(_) => "CommandNotFound",
            KernelError::Duplicate { .. } => "Duplicate",
            KernelError::LoadFailed { .. } => "LoadFailed",
            KernelError::ReloadFailed { .. } => "ReloadFailed",
            KernelError::InvalidArgs(_) => "InvalidArgs",
            KernelError::Timeout(_) => "Timeout",
            KernelError::SubprocessFailure { .. } => "SubprocessFailure",
            KernelError::IndexUnavailable(_) => "IndexUnavailable",
            KernelError::InferenceFailure(_) => "InferenceFailure",
            KernelError::Runtime(_) => "Runtime",
            KernelError::Io(_) => "Runtime",
            KernelError::Toml(_) => "Runtime",
            KernelError::Json(_) => "Runtime",
        }
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;
