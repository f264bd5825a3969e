//! IF-010: Transport: bounded subprocess execution.

pub mod local;

use std::time::Duration;

/// Output from running one external command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// True when the deadline fired and the process was killed; output is
    /// whatever had been captured by then.
    pub timed_out: bool,
    pub duration: Duration,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}
