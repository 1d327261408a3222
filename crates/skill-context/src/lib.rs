//! Execution environment configuration for subprocess-mode skills.
//!
//! This crate defines the two pieces of configuration the Subprocess
//! Isolator needs to build a child process's environment (§4.G):
//!
//! - [`EnvironmentConfig`]: static variables, `.env` files, and host
//!   passthrough (by exact name or prefix).
//! - [`SecretsConfig`]: secret *definitions* (provider, injection target) —
//!   never the secret value itself, which is resolved at dispatch time
//!   from the platform keychain or a materialized host env var.
//!
//! ```rust
//! use skill_context::{EnvironmentConfig, SecretsConfig};
//!
//! let env = EnvironmentConfig::new()
//!     .with_var("LOG_LEVEL", "info")
//!     .with_passthrough_prefix("AWS_")
//!     .with_passthrough_var("PATH");
//!
//! let secrets = SecretsConfig::new()
//!     .with_required_env_secret("api-key", "API_KEY", "API authentication key");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod environment;
pub mod secrets;

pub use environment::{EnvFileRef, EnvValue, EnvironmentConfig, GeneratedValue, SecretRef};
pub use secrets::{
    ExternalSecretProvider, SecretDefinition, SecretFileFormat, SecretInjectionTarget,
    SecretProviderConfig, SecretsConfig,
};

/// Error types for the skill-context crate.
pub mod error {
    use thiserror::Error;

    /// Errors that can occur resolving an environment or secrets configuration.
    #[derive(Debug, Error)]
    pub enum ContextError {
        /// Invalid environment or secrets configuration.
        #[error("invalid configuration: {0}")]
        InvalidConfig(String),

        /// Secret not found.
        #[error("secret not found: {0}")]
        SecretNotFound(String),

        /// Required secret not set.
        #[error("required secret not set: {0}")]
        RequiredSecretNotSet(String),

        /// IO error.
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        /// Serialization error.
        #[error("serialization error: {0}")]
        Serialization(String),
    }

    impl From<serde_json::Error> for ContextError {
        fn from(e: serde_json::Error) -> Self {
            Self::Serialization(e.to_string())
        }
    }
}

pub use error::ContextError;

/// Result type for skill-context operations.
pub type Result<T> = std::result::Result<T, ContextError>;
