//! Allocation sampling for HotSpot without JVMTI.
//!
//! HotSpot calls `AllocTracer::send_allocation_in_new_tlab_event` and
//! `AllocTracer::send_allocation_outside_tlab_event` on every slow-path
//! allocation. [`AllocTracer`] puts a breakpoint on their first instruction,
//! reads the class and size out of the argument registers when a thread
//! traps, hands them to a [`Recorder`] and returns to the caller without
//! running the function.

pub mod config;
pub mod consts;
pub mod error;
pub mod frame;
pub mod handler;
pub mod loader;
pub mod memory;
pub mod recorder;
pub mod registry;
pub mod runtime;
pub mod trap;
pub mod tracer;
mod utils;

#[cfg(test)]
mod test_utils;

pub use config::{ForeignSignals, TracerConfig};
pub use error::TracerError;
pub use loader::{ElfImage, JvmRuntime};
pub use recorder::{AllocEvent, CountingRecorder, Recorder};
pub use registry::TrapKind;
pub use runtime::{CodeImage, Runtime};
pub use tracer::AllocTracer;
