use std::sync::atomic::{AtomicUsize, Ordering};

use nix::sys::signal::Signal;

pub(super) static RECEIVED_SIGNAL: AtomicUsize = AtomicUsize::new(0);

/// Route SIGINT and SIGTERM into a flag polled by the watcher loop.
pub fn install_signal_handlers() -> anyhow::Result<()> {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet};
    extern "C" fn handler(sig: i32) {
        RECEIVED_SIGNAL.store(sig as usize, Ordering::SeqCst);
    }

    let action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        unsafe { signal::sigaction(sig, &action) }
            .map_err(|e| anyhow::anyhow!("Failed to register {sig} handler: {e}"))?;
    }
    Ok(())
}

/// Non‑blocking check – returns Some(signal) once.
pub(crate) fn check_signals() -> Option<Signal> {
    let val = RECEIVED_SIGNAL.swap(0, Ordering::AcqRel);
    if val == 0 {
        None
    } else {
        Signal::try_from(val as i32).ok()
    }
}

