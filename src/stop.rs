//! Cooperative cancellation.
//!
//! SIGINT sets a process-wide flag; workers poll it between files and tags.
//! In-flight work finishes and its partial results stay on disk, nothing is
//! restarted automatically.

use std::sync::atomic::{AtomicBool, Ordering};

static STOP: AtomicBool = AtomicBool::new(false);

/// Install the SIGINT handler. Call once at process start.
pub fn install_handler() {
    let result = ctrlc::set_handler(|| {
        if STOP.swap(true, Ordering::SeqCst) {
            // Second interrupt: the user means it.
            std::process::exit(130);
        }
        eprintln!("interrupt received, finishing in-flight work");
    });
    if let Err(err) = result {
        tracing::warn!("could not install interrupt handler: {err}");
    }
}

/// True once an interrupt was received; no new work should be submitted.
pub fn requested() -> bool {
    STOP.load(Ordering::SeqCst)
}

/// Test hook.
#[cfg(test)]
pub fn reset() {
    STOP.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_starts_clear() {
        reset();
        assert!(!requested());
        STOP.store(true, Ordering::SeqCst);
        assert!(requested());
        reset();
    }
}
