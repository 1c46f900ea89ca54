//! Kill switch - graceful shutdown and the `enable_copy_trading` soft pause.
//!
//! ## Usage
//!
//! ```no_run
//! use copytrader_core::control::KillSwitch;
//!
//! let kill_switch = KillSwitch::install();
//!
//! while !kill_switch.should_stop() {
//!     // replicate...
//! }
//! ```
//!
//! ## Signals
//!
//! - **SIGINT** ("interrupt") and **SIGTERM** ("terminate") both trigger the
//!   same graceful shutdown; the operator interface names no other signal.
//!
//! ## Soft pause
//!
//! `pause()`/`resume()` implement the `ENABLE_COPY_TRADING` toggle: the
//! replicator checks `is_paused()` before acting on each event rather than
//! the process being stopped, so an operator can halt replication without
//! losing the stream connection or watermark position.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info};

/// Kill switch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KillSwitchState {
    /// Normal operation.
    Running = 0,
    /// Paused via `enable_copy_trading = false`; can resume.
    Paused = 1,
    /// Shutting down gracefully.
    ShuttingDown = 2,
}

impl From<u8> for KillSwitchState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Paused,
            2 => Self::ShuttingDown,
            _ => Self::Running,
        }
    }
}

/// Shutdown and pause coordination, shared across the orchestrator's tasks.
#[derive(Clone)]
pub struct KillSwitch {
    state: Arc<AtomicU8>,
    shutdown_reason: Arc<parking_lot::Mutex<Option<String>>>,
    shutdown_time: Arc<parking_lot::Mutex<Option<SystemTime>>>,
}

impl KillSwitch {
    /// Create a new kill switch in the `Running` state, with no signal handlers.
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(KillSwitchState::Running as u8)),
            shutdown_reason: Arc::new(parking_lot::Mutex::new(None)),
            shutdown_time: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Install SIGINT and SIGTERM handlers and return the kill switch.
    pub fn install() -> Self {
        let kill_switch = Self::new();

        #[cfg(unix)]
        {
            let ks_int = kill_switch.clone();
            let ks_term = kill_switch.clone();

            if let Err(e) =
                signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::new(AtomicBool::new(true)))
            {
                error!("failed to register SIGINT handler: {}", e);
            } else {
                std::thread::spawn(move || {
                    std::thread::park_timeout(std::time::Duration::from_secs(999_999_999));
                    ks_int.shutdown("interrupt");
                });
                info!("SIGINT handler installed (graceful shutdown)");
            }

            if let Err(e) =
                signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::new(AtomicBool::new(true)))
            {
                error!("failed to register SIGTERM handler: {}", e);
            } else {
                std::thread::spawn(move || {
                    std::thread::park_timeout(std::time::Duration::from_secs(999_999_999));
                    ks_term.shutdown("terminate");
                });
                info!("SIGTERM handler installed (graceful shutdown)");
            }
        }

        kill_switch
    }

    /// Whether the orchestrator should begin tearing down tasks.
    #[inline]
    pub fn should_stop(&self) -> bool {
        matches!(self.state(), KillSwitchState::ShuttingDown)
    }

    /// Whether copy trading is currently paused (`enable_copy_trading = false`).
    #[inline]
    pub fn is_paused(&self) -> bool {
        matches!(self.state(), KillSwitchState::Paused)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self.state(), KillSwitchState::Running)
    }

    /// Initiate graceful shutdown.
    pub fn shutdown(&self, reason: &str) {
        info!("shutdown requested: {}", reason);
        self.state.store(KillSwitchState::ShuttingDown as u8, Ordering::Release);
        *self.shutdown_reason.lock() = Some(reason.to_string());
        *self.shutdown_time.lock() = Some(SystemTime::now());
    }

    /// Pause copy trading (can resume). No-op if already shutting down.
    pub fn pause(&self) {
        if matches!(self.state(), KillSwitchState::Running) {
            info!("copy trading paused");
            self.state.store(KillSwitchState::Paused as u8, Ordering::Release);
        }
    }

    /// Resume copy trading from a paused state.
    pub fn resume(&self) {
        if matches!(self.state(), KillSwitchState::Paused) {
            info!("copy trading resumed");
            self.state.store(KillSwitchState::Running as u8, Ordering::Release);
        }
    }

    pub fn toggle_pause(&self) {
        if self.is_paused() {
            self.resume();
        } else if self.is_running() {
            self.pause();
        }
    }

    pub fn state(&self) -> KillSwitchState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn shutdown_reason(&self) -> Option<String> {
        self.shutdown_reason.lock().clone()
    }

    pub fn shutdown_time(&self) -> Option<SystemTime> {
        *self.shutdown_time.lock()
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let ks = KillSwitch::new();
        assert!(ks.is_running());
        assert!(!ks.should_stop());
        assert!(!ks.is_paused());
    }

    #[test]
    fn graceful_shutdown_sets_reason_and_time() {
        let ks = KillSwitch::new();
        ks.shutdown("test shutdown");
        assert!(ks.should_stop());
        assert_eq!(ks.state(), KillSwitchState::ShuttingDown);
        assert_eq!(ks.shutdown_reason(), Some("test shutdown".to_string()));
        assert!(ks.shutdown_time().is_some());
    }

    #[test]
    fn pause_and_resume() {
        let ks = KillSwitch::new();
        ks.pause();
        assert!(ks.is_paused());
        assert!(!ks.should_stop());
        ks.resume();
        assert!(ks.is_running());
        assert!(!ks.is_paused());
    }

    #[test]
    fn toggle_pause_flips_state() {
        let ks = KillSwitch::new();
        ks.toggle_pause();
        assert!(ks.is_paused());
        ks.toggle_pause();
        assert!(ks.is_running());
    }

    #[test]
    fn cannot_resume_after_shutdown() {
        let ks = KillSwitch::new();
        ks.shutdown("test");
        ks.resume();
        assert!(ks.should_stop());
    }

    #[test]
    fn shared_across_clones() {
        let ks = KillSwitch::new();
        let ks_clone = ks.clone();
        std::thread::spawn(move || ks_clone.pause()).join().unwrap();
        assert!(ks.is_paused());
    }
}
