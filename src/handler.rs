//! The `SIGTRAP` handler.
//!
//! Everything reachable from [`signal_handler`] runs on an application thread
//! that was stopped by one of our breakpoints. It must not allocate, lock,
//! log or block.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{bail, Result};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::config::ForeignSignals;
use crate::error::TracerError;
use crate::frame::{Frame, StackFrame};
use crate::recorder::{AllocEvent, Recorder};
use crate::registry::{TrapKind, TYPE_HANDLE_ARG};
use crate::trap::Trap;

/// The table the handler consults on every `SIGTRAP`. Immutable once built.
pub struct Dispatch {
    entries: [Option<usize>; 2],
    recorder: Arc<dyn Recorder>,
    foreign_signals: ForeignSignals,
}

impl Dispatch {
    pub fn new<I>(armed: I, recorder: Arc<dyn Recorder>, foreign_signals: ForeignSignals) -> Self
    where
        I: IntoIterator<Item = (TrapKind, usize)>,
    {
        let mut entries = [None; 2];
        for (kind, entry) in armed {
            entries[kind.index()] = Some(entry);
        }

        Self {
            entries,
            recorder,
            foreign_signals,
        }
    }

    /// Which armed trap stopped a thread at `pc`, if any.
    pub fn classify(&self, pc: usize) -> Option<TrapKind> {
        TrapKind::ALL
            .into_iter()
            .find(|&kind| self.entries[kind.index()].is_some_and(|entry| Trap::covers(entry, pc)))
    }

    /// Records the allocation and leaves the trapped function. Returns `false`
    /// without touching the frame when the trap is not ours.
    pub fn handle<F: Frame>(&self, frame: &mut F) -> bool {
        let Some(kind) = self.classify(frame.pc()) else {
            return false;
        };

        let event = AllocEvent {
            kind,
            type_handle: frame.arg(TYPE_HANDLE_ARG),
            size: frame.arg(kind.size_arg()) as u64,
        };
        self.recorder.record_sample(frame.context(), 1, &event);

        frame.ret();
        true
    }
}

static ACTIVE: AtomicPtr<Dispatch> = AtomicPtr::new(ptr::null_mut());
static PREVIOUS_ACTION: OnceLock<SigAction> = OnceLock::new();
static REGISTRATION: Mutex<()> = Mutex::new(());

/// Registers [`signal_handler`] for `SIGTRAP`. Only the first call per process
/// does anything; the disposition it replaces is kept for chaining.
pub fn install_signal_handler() -> Result<()> {
    let _guard = REGISTRATION.lock().unwrap_or_else(|e| e.into_inner());
    if PREVIOUS_ACTION.get().is_some() {
        return Ok(());
    }

    let action = SigAction::new(
        SigHandler::SigAction(signal_handler),
        SaFlags::SA_RESTART | SaFlags::SA_SIGINFO,
        SigSet::empty(),
    );
    let previous = unsafe { signal::sigaction(Signal::SIGTRAP, &action)? };
    log::debug!("installed SIGTRAP handler, previous {:?}", previous.handler());

    let _ = PREVIOUS_ACTION.set(previous);

    Ok(())
}

/// Makes `dispatch` visible to the handler. Fails if another tracer is active.
pub(crate) fn activate(dispatch: &Dispatch) -> Result<()> {
    let ptr = dispatch as *const Dispatch as *mut Dispatch;
    if ACTIVE
        .compare_exchange(ptr::null_mut(), ptr, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        bail!(TracerError::AlreadyActive);
    }

    Ok(())
}

/// Handlers that loaded `dispatch` before this call may still be reading it.
pub(crate) fn deactivate(dispatch: &Dispatch) {
    let ptr = dispatch as *const Dispatch as *mut Dispatch;
    let _ = ACTIVE.compare_exchange(ptr, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire);
}

pub fn is_active() -> bool {
    !ACTIVE.load(Ordering::Acquire).is_null()
}

extern "C" fn signal_handler(signo: libc::c_int, info: *mut libc::siginfo_t, ucontext: *mut libc::c_void) {
    let dispatch = unsafe { ACTIVE.load(Ordering::Acquire).as_ref() };

    if let Some(dispatch) = dispatch {
        if let Some(mut frame) = unsafe { StackFrame::from_raw(ucontext) } {
            if dispatch.handle(&mut frame) {
                return;
            }
        }

        if dispatch.foreign_signals == ForeignSignals::Ignore {
            return;
        }
    }

    if let Some(previous) = PREVIOUS_ACTION.get() {
        forward(previous, signo, info, ucontext);
    }
}

/// Delivers a signal that is not ours to the disposition we replaced.
fn forward(previous: &SigAction, signo: libc::c_int, info: *mut libc::siginfo_t, ucontext: *mut libc::c_void) {
    match previous.handler() {
        SigHandler::SigAction(handler) => handler(signo, info, ucontext),
        SigHandler::Handler(handler) => handler(signo),
        SigHandler::SigIgn => {}
        // the default action takes effect once this handler returns and unblocks the signal
        SigHandler::SigDfl => unsafe {
            libc::signal(signo, libc::SIG_DFL);
            libc::raise(signo);
        },
    }
}
