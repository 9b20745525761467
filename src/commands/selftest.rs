use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use alloc_trap::{AllocTracer, CodeImage, CountingRecorder, Runtime, TracerConfig, TrapKind};
use anyhow::Result;

static IN_NEW_TLAB_BODY: AtomicU64 = AtomicU64::new(0);
static OUTSIDE_TLAB_BODY: AtomicU64 = AtomicU64::new(0);

// same signatures as the HotSpot functions, with size_t arguments
#[inline(never)]
extern "C" fn in_new_tlab_event(klass: usize, tlab_size: usize, alloc_size: usize) {
    IN_NEW_TLAB_BODY.fetch_add(1, Ordering::Relaxed);
    black_box((klass, tlab_size, alloc_size));
}

#[inline(never)]
extern "C" fn outside_tlab_event(klass: usize, alloc_size: usize) {
    OUTSIDE_TLAB_BODY.fetch_add(1, Ordering::Relaxed);
    black_box((klass, alloc_size));
}

/// Resolves the HotSpot symbol names to the stand-ins above.
struct SelfImage;

impl CodeImage for SelfImage {
    fn find_symbol(&self, name: &str) -> Option<usize> {
        if name == TrapKind::InNewTlab.symbol() {
            Some(in_new_tlab_event as usize)
        } else if name == TrapKind::OutsideTlab.symbol() {
            Some(outside_tlab_event as usize)
        } else {
            None
        }
    }
}

struct SelfRuntime;

impl Runtime for SelfRuntime {
    fn introspection_available(&self) -> bool {
        true
    }

    fn code_image(&self) -> Option<&dyn CodeImage> {
        Some(&SelfImage)
    }
}

pub struct Options {
    pub threads: usize,
    pub allocations: u64,
    pub config: TracerConfig,
}

fn allocate(thread: usize, allocations: u64) {
    let in_new_tlab: extern "C" fn(usize, usize, usize) = black_box(in_new_tlab_event as extern "C" fn(usize, usize, usize));
    let outside_tlab: extern "C" fn(usize, usize) = black_box(outside_tlab_event as extern "C" fn(usize, usize));
    let klass = 0x1000 * (thread + 1);

    for i in 0..allocations as usize {
        if i % 10 == 9 {
            outside_tlab(klass, 1 << 20);
        } else {
            in_new_tlab(klass, 64 << 10, 16 + (i % 4) * 8);
        }
    }
}

pub fn run(options: Options) -> Result<()> {
    let recorder = Arc::new(CountingRecorder::new());
    let mut tracer = AllocTracer::new(options.config, recorder.clone());
    tracer.start(&SelfRuntime)?;

    thread::scope(|scope| {
        for thread in 0..options.threads {
            scope.spawn(move || allocate(thread, options.allocations));
        }
    });

    tracer.stop()?;

    println!("{:<14} {:>10} {:>14} {:>10}", "trap", "samples", "bytes", "body runs");
    for (kind, body) in [
        (TrapKind::InNewTlab, &IN_NEW_TLAB_BODY),
        (TrapKind::OutsideTlab, &OUTSIDE_TLAB_BODY),
    ] {
        let stats = recorder.stats(kind);
        println!(
            "{:<14} {:>10} {:>14} {:>10}",
            kind,
            stats.samples,
            stats.bytes,
            body.load(Ordering::Relaxed)
        );
    }

    Ok(())
}
