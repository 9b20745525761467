use std::sync::atomic::{AtomicU64, Ordering};

use crate::registry::TrapKind;

/// One intercepted allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocEvent {
    pub kind: TrapKind,
    /// The runtime's `Klass*` of the allocated object.
    pub type_handle: usize,
    pub size: u64,
}

/// Receives allocation samples from the trap handler.
///
/// `record_sample` runs inside a `SIGTRAP` handler on the allocating thread.
/// Implementations must be async-signal-safe: no allocation, no locks, no
/// blocking calls.
pub trait Recorder: Send + Sync {
    fn record_sample(&self, ucontext: *mut libc::c_void, weight: u64, event: &AllocEvent);
}

#[derive(Debug, Default)]
struct TrapCounters {
    samples: AtomicU64,
    weight: AtomicU64,
    bytes: AtomicU64,
    last_type_handle: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapStats {
    pub samples: u64,
    pub weight: u64,
    pub bytes: u64,
    pub last_type_handle: u64,
}

/// Lock-free per-trap counters.
#[derive(Debug, Default)]
pub struct CountingRecorder {
    counters: [TrapCounters; 2],
}

impl CountingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self, kind: TrapKind) -> TrapStats {
        let counters = &self.counters[kind.index()];
        TrapStats {
            samples: counters.samples.load(Ordering::Relaxed),
            weight: counters.weight.load(Ordering::Relaxed),
            bytes: counters.bytes.load(Ordering::Relaxed),
            last_type_handle: counters.last_type_handle.load(Ordering::Relaxed),
        }
    }

    pub fn total_samples(&self) -> u64 {
        TrapKind::ALL.into_iter().map(|kind| self.stats(kind).samples).sum()
    }
}

impl Recorder for CountingRecorder {
    fn record_sample(&self, _ucontext: *mut libc::c_void, weight: u64, event: &AllocEvent) {
        let counters = &self.counters[event.kind.index()];
        counters.samples.fetch_add(1, Ordering::Relaxed);
        counters.weight.fetch_add(weight, Ordering::Relaxed);
        counters.bytes.fetch_add(event.size, Ordering::Relaxed);
        counters.last_type_handle.store(event.type_handle as u64, Ordering::Relaxed);
    }
}
