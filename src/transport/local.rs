//! IF-010: Local command execution with a hard deadline.
//!
//! stdout and stderr are drained on reader threads into shared buffers so
//! a killed process still yields everything it printed before the deadline.

use super::ExecOutput;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const DRAIN_GRACE: Duration = Duration::from_millis(250);

type SharedBuf = Arc<Mutex<Vec<u8>>>;

/// Run `program args..` in `cwd`, killing it once `timeout` elapses.
pub fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<ExecOutput, String> {
    debug!(program, ?args, cwd = %cwd.display(), timeout_secs = timeout.as_secs(), "spawning");
    let start = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env("TF_IN_AUTOMATION", "1")
        .env("TF_INPUT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn {}: {}", program, e))?;

    let stdout_buf: SharedBuf = Arc::default();
    let stderr_buf: SharedBuf = Arc::default();
    let readers = [
        child.stdout.take().map(|s| drain(s, Arc::clone(&stdout_buf))),
        child.stderr.take().map(|s| drain(s, Arc::clone(&stderr_buf))),
    ];

    let (exit_code, timed_out) = wait_with_deadline(&mut child, start, timeout)?;

    // A killed process may leave descendants holding the pipes open.
    let drain_deadline = Instant::now() + if timed_out { DRAIN_GRACE } else { timeout };
    for handle in readers.into_iter().flatten() {
        while !handle.is_finished() && Instant::now() < drain_deadline {
            std::thread::sleep(POLL_INTERVAL);
        }
        if handle.is_finished() {
            let _ = handle.join();
        }
    }

    let duration = start.elapsed();
    if timed_out {
        warn!(program, ?args, elapsed_ms = duration.as_millis() as u64, "command timed out");
    }
    Ok(ExecOutput {
        exit_code,
        stdout: snapshot(&stdout_buf),
        stderr: snapshot(&stderr_buf),
        timed_out,
        duration,
    })
}

fn wait_with_deadline(
    child: &mut Child,
    start: Instant,
    timeout: Duration,
) -> Result<(i32, bool), String> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok((status.code().unwrap_or(-1), false)),
            Ok(None) if start.elapsed() >= timeout => {
                let _ = child.kill();
                let code = child
                    .wait()
                    .ok()
                    .and_then(|s| s.code())
                    .unwrap_or(-1);
                return Ok((code, true));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(format!("wait error: {}", e)),
        }
    }
}

fn drain<R: Read + Send + 'static>(mut source: R, buf: SharedBuf) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match source.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => buf
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .extend_from_slice(&chunk[..n]),
            }
        }
    })
}

fn snapshot(buf: &SharedBuf) -> String {
    let bytes = buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    String::from_utf8_lossy(&bytes).to_string()
}
