//! Panic sentinel
//!
//! Process-wide kill-switch. When armed, every entry gate refuses new
//! positions; exits are never blocked. Armed by any of: the sentinel file
//! existing, the COPYTRADER_PANIC environment flag, or an in-process flag
//! flipped by the operator control plane.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use crate::error::{Error, Result};

pub const PANIC_ENV_VAR: &str = "COPYTRADER_PANIC";

pub struct PanicSentinel {
    sentinel_path: PathBuf,
    flag: AtomicBool,
}

impl PanicSentinel {
    pub fn new(sentinel_path: impl Into<PathBuf>) -> Self {
        Self {
            sentinel_path: sentinel_path.into(),
            flag: AtomicBool::new(false),
        }
    }

    /// Whether the kill-switch is currently armed.
    pub fn is_panic_active(&self) -> bool {
        if self.flag.load(Ordering::Relaxed) {
            return true;
        }
        if std::env::var(PANIC_ENV_VAR).map(|v| v == "1").unwrap_or(false) {
            return true;
        }
        self.sentinel_path.exists()
    }

    /// Entry-gate guard. Exits must never call this.
    pub fn require_no_panic(&self) -> Result<()> {
        if self.is_panic_active() {
            return Err(Error::PanicActive(
                self.sentinel_path.display().to_string(),
            ));
        }
        Ok(())
    }

    /// Arm the in-process flag and drop the sentinel file so the state
    /// survives a restart.
    pub fn arm(&self) -> Result<()> {
        self.flag.store(true, Ordering::Relaxed);
        std::fs::write(&self.sentinel_path, "panic\n")?;
        warn!(path = %self.sentinel_path.display(), "Panic sentinel armed");
        Ok(())
    }

    /// Disarm the flag and remove the sentinel file.
    pub fn disarm(&self) -> Result<()> {
        self.flag.store(false, Ordering::Relaxed);
        if self.sentinel_path.exists() {
            std::fs::remove_file(&self.sentinel_path)?;
        }
        warn!(path = %self.sentinel_path.display(), "Panic sentinel disarmed");
        Ok(())
    }
}
