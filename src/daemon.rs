//! The daemon loop: a single thread ticking the controller at 1 Hz.
//!
//! An interrupt flips a flag instead of killing the process so the reset
//! procedure always runs; leaving the host with an agitated sleep timeout
//! after exit is the one failure mode this daemon must never have.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::controller::Controller;
use crate::host::Host;

const TICK_DURATION: Duration = Duration::from_secs(1);

/// Run the control loop until interrupted, then restore defaults.
pub fn run<H: Host>(mut controller: Controller<H>) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .context("Failed to install interrupt handler")?;

    controller.log_host_state();
    info!("entering main loop");
    while running.load(Ordering::SeqCst) {
        controller.update();
        thread::sleep(TICK_DURATION);
    }

    // A second interrupt only re-flips the flag; the restore below runs to
    // completion on this thread regardless.
    info!("interrupted, restoring defaults before exit");
    controller.reset();
    Ok(())
}
