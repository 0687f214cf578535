//! Bounded external command execution.
//!
//! Every probe and every power-manager mutation goes through the host shell;
//! a hung `xfconf-query` or `pactl` must not freeze the control loop, so all
//! invocations carry a hard wall timeout and a timed-out child is killed.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use wait_timeout::ChildExt;

/// Wall timeout applied to every external command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra grace for collecting drained output after the child exits.
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Run a program with arguments and return trimmed stdout.
///
/// Fails on spawn error, non-zero exit, or timeout (the child is killed).
/// Stdout is drained on a separate thread while waiting so a chatty command
/// (`pactl list` can exceed the pipe buffer) cannot deadlock against us.
pub fn run_command(program: &str, args: &[&str]) -> Result<String> {
    run_command_with_timeout(program, args, COMMAND_TIMEOUT)
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to spawn: {program} {}", args.join(" ")))?;

    let (tx, rx) = mpsc::channel();
    if let Some(mut stdout) = child.stdout.take() {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            let _ = tx.send(buf);
        });
    } else {
        let _ = tx.send(String::new());
    }

    let status = child
        .wait_timeout(timeout)
        .with_context(|| format!("Failed to wait for: {program}"))?;

    match status {
        Some(status) => {
            let stdout = rx
                .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
                .unwrap_or_default();
            if !status.success() {
                bail!(
                    "{program} exited with {}",
                    status
                        .code()
                        .map_or_else(|| "signal".to_string(), |c| c.to_string())
                );
            }
            Ok(stdout.trim().to_string())
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            bail!("{program} timed out after {}s", timeout.as_secs());
        }
    }
}
