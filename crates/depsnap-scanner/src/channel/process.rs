//! Subprocess execution with a deadline

use super::CommandOutput;
use crate::error::{ScanError, ScanResult};
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run a prepared command, killing it once `timeout` elapses
///
/// Output is drained on reader threads so large listings (thousands of
/// package metadata sections) never fill the pipe and stall the child.
/// The child leads its own process group, and a timeout kills the whole
/// group so pipelines started by a shell die with it.
pub(crate) fn run_with_timeout(
    mut cmd: Command,
    label: &str,
    timeout: Duration,
) -> ScanResult<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    let start = Instant::now();
    let mut child = cmd.spawn()?;
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(CommandOutput {
                stdout: collect(stdout_reader),
                stderr: collect(stderr_reader),
                exit_code: status.code().unwrap_or(-1),
            });
        }
        if start.elapsed() > timeout {
            kill(&mut child);
            // Readers are left detached: a descendant that escaped the group
            // may still hold the pipes open
            return Err(ScanError::CommandTimeout {
                command: label.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    let group = format!("-{}", child.id());
    let _ = Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    let _ = child.kill();
    let _ = child.wait();
}
