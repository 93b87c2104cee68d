//! Interop configuration - set once at startup, read at construction and disposal
//!
//! Every `ForeignObject` captures a copy of the configuration when it is
//! created, so disposal never consults mutable global state.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

static GLOBAL: OnceCell<InteropConfig> = OnceCell::new();

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("interop configuration already installed")]
    AlreadyInstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteropConfig {
    /// Register every live `ForeignObject` in the object tracker
    #[serde(default = "default_false")]
    pub object_tracking: bool,

    /// Warn through the leak hook when a live object reaches the finalize path
    #[serde(default = "default_false")]
    pub leak_tracking_on_finalizer: bool,

    /// Release the foreign reference on the finalize path
    #[serde(default = "default_true")]
    pub release_on_finalizer: bool,

    /// Keep tracker entries per thread instead of process-wide
    #[serde(default = "default_false")]
    pub thread_local_tracking: bool,
}

impl Default for InteropConfig {
    fn default() -> Self {
        Self {
            object_tracking: false,
            leak_tracking_on_finalizer: false,
            release_on_finalizer: true,
            thread_local_tracking: false,
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }

impl InteropConfig {
    /// Leak-hunting preset: track everything, report instead of releasing on finalize
    pub fn diagnostics() -> Self {
        Self {
            object_tracking: true,
            leak_tracking_on_finalizer: true,
            release_on_finalizer: false,
            thread_local_tracking: false,
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // VTINTEROP_OBJECT_TRACKING: register live objects
        if let Some(value) = env_flag("VTINTEROP_OBJECT_TRACKING") {
            config.object_tracking = value;
        }

        // VTINTEROP_LEAK_TRACKING: warn on finalize
        if let Some(value) = env_flag("VTINTEROP_LEAK_TRACKING") {
            config.leak_tracking_on_finalizer = value;
        }

        // VTINTEROP_RELEASE_ON_FINALIZER: release on finalize
        if let Some(value) = env_flag("VTINTEROP_RELEASE_ON_FINALIZER") {
            config.release_on_finalizer = value;
        }

        // VTINTEROP_THREAD_LOCAL_TRACKING: per-thread tracker
        if let Some(value) = env_flag("VTINTEROP_THREAD_LOCAL_TRACKING") {
            config.thread_local_tracking = value;
        }

        config
    }

    pub fn with_object_tracking(mut self, enabled: bool) -> Self {
        self.object_tracking = enabled;
        self
    }

    pub fn with_leak_tracking(mut self, enabled: bool) -> Self {
        self.leak_tracking_on_finalizer = enabled;
        self
    }

    pub fn with_release_on_finalizer(mut self, enabled: bool) -> Self {
        self.release_on_finalizer = enabled;
        self
    }

    pub fn with_thread_local_tracking(mut self, enabled: bool) -> Self {
        self.thread_local_tracking = enabled;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    parse_flag(&value)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Install the process-wide configuration (once)
pub fn install(config: InteropConfig) -> Result<(), ConfigError> {
    GLOBAL.set(config).map_err(|_| ConfigError::AlreadyInstalled)
}

/// Process-wide configuration; environment defaults if none was installed
pub fn current() -> InteropConfig {
    *GLOBAL.get_or_init(InteropConfig::from_env)
}
