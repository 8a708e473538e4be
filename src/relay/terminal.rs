//! Local terminal state: raw mode, size probing, TTY detection
//!
//! The local terminal's attributes are mutated by exactly one owner and must
//! be restored on every exit path. [`RawModeGuard`] enforces at-most-once
//! restoration, including through `Drop` when teardown never runs.

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::tty::IsTty;
use tracing::{debug, warn};

use crate::process::TerminalSize;

/// Whether to forward terminal I/O for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtyMode {
    /// Forward only if local stdin is an interactive terminal.
    #[default]
    Auto,
    /// Always forward.
    Force,
    /// Never forward; the caller drives the channels programmatically.
    Disabled,
}

impl TtyMode {
    /// Resolve the tri-state flag against the actual local stdin.
    pub fn should_forward(self) -> bool {
        match self {
            TtyMode::Auto => std::io::stdin().is_tty(),
            TtyMode::Force => true,
            TtyMode::Disabled => false,
        }
    }
}

/// Detect the local terminal dimensions, falling back to 80x24.
pub fn probe_size() -> TerminalSize {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => TerminalSize::new(cols, rows),
        Ok(_) => TerminalSize::default(),
        Err(e) => {
            debug!("could not probe terminal size, using default: {}", e);
            TerminalSize::default()
        }
    }
}

/// Captures the local terminal into raw mode and restores it exactly once.
///
/// Restoration failure is logged, never raised: cleanup must always run to
/// completion.
#[derive(Debug)]
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    /// Save current attributes and enter raw mode.
    pub fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        debug!("entered raw mode");
        Ok(Self { active: true })
    }

    /// A guard that owns nothing; restoring it is a no-op.
    pub fn inactive() -> Self {
        Self { active: false }
    }

    /// Whether this guard still holds mutated terminal attributes.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Restore the saved attributes. Subsequent calls are no-ops.
    pub fn restore(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = disable_raw_mode() {
            warn!("failed to restore terminal attributes: {}", e);
        } else {
            debug!("terminal attributes restored");
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_guard_restores_nothing() {
        let mut guard = RawModeGuard::inactive();
        assert!(!guard.is_active());
        guard.restore();
        guard.restore();
        assert!(!guard.is_active());
    }

    #[test]
    fn forced_and_disabled_modes_ignore_the_terminal() {
        assert!(TtyMode::Force.should_forward());
        assert!(!TtyMode::Disabled.should_forward());
    }

    #[test]
    fn probe_size_always_yields_dimensions() {
        let size = probe_size();
        assert!(size.cols > 0);
        assert!(size.rows > 0);
    }
}
