//! Daemon settings resolved from the environment at startup.
//!
//! These are the only process-wide knobs: the concurrency cap and the
//! storage root. Everything else lives on disk.

use std::path::PathBuf;

pub const DEFAULT_MAX_CONCURRENT: usize = 15;

#[derive(Debug, Clone)]
pub struct Settings {
    /// `SPINDLE_MAX_CONCURRENT`, default 15.
    pub max_concurrent: usize,

    /// `~/.spindle`: log, reload touchfile, spool directory.
    pub spindle_home: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        let max_concurrent = std::env::var("SPINDLE_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONCURRENT);

        let spindle_home = directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".spindle"))
            .unwrap_or_else(|| PathBuf::from(".spindle"));

        Self {
            max_concurrent,
            spindle_home,
        }
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.spindle_home.join("spools")
    }

    pub fn reload_signal_path(&self) -> PathBuf {
        self.spindle_home.join("reload_signal")
    }
}

/// Whether a gemini API key is present in the environment.
pub fn gemini_key_present() -> bool {
    std::env::var_os("GOOGLE_API_KEY").is_some() || std::env::var_os("GEMINI_API_KEY").is_some()
}
