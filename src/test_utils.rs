use std::cell::{Cell, RefCell, UnsafeCell};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};

use crate::consts::{Instruction, IN_NEW_TLAB_SYMBOL, OUTSIDE_TLAB_SYMBOL, WORD_SIZE};
use crate::frame::{Frame, MAX_ARGS};
use crate::memory::CodeMemory;
use crate::recorder::{AllocEvent, Recorder};
use crate::runtime::{CodeImage, Runtime};

static SIGNAL_STATE: Mutex<()> = Mutex::new(());

/// Serializes tests that register the signal handler or publish a dispatch table.
pub fn lock_signal_state() -> MutexGuard<'static, ()> {
    SIGNAL_STATE.lock().unwrap_or_else(|e| e.into_inner())
}

/// A few instructions of fake code on the heap.
pub struct CodeBuffer {
    code: Box<UnsafeCell<[Instruction; 8]>>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        let mut code = [0; 8];
        for (i, insn) in code.iter_mut().enumerate() {
            *insn = 0x40 + i as Instruction;
        }
        Self {
            code: Box::new(UnsafeCell::new(code)),
        }
    }

    pub fn addr(&self, index: usize) -> usize {
        assert!(index < 8);
        self.code.get() as usize + index * std::mem::size_of::<Instruction>()
    }

    pub fn snapshot(&self) -> [Instruction; 8] {
        unsafe { std::ptr::read_volatile(self.code.get()) }
    }
}

#[derive(Debug, Default)]
pub struct RecordingMemory {
    protect_calls: RefCell<Vec<(usize, usize)>>,
    flushes: Cell<usize>,
}

impl RecordingMemory {
    pub fn protect_calls(&self) -> Vec<(usize, usize)> {
        self.protect_calls.borrow().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.get()
    }
}

impl CodeMemory for RecordingMemory {
    fn make_writable(&self, addr: usize, len: usize) -> Result<()> {
        self.protect_calls.borrow_mut().push((addr, len));
        Ok(())
    }

    fn flush(&self, _addr: usize, _len: usize) {
        self.flushes.set(self.flushes.get() + 1);
    }
}

/// Succeeds `successes` times, then refuses every protection change.
#[derive(Debug)]
pub struct FailingMemory {
    remaining: Cell<usize>,
}

impl FailingMemory {
    pub fn after(successes: usize) -> Self {
        Self {
            remaining: Cell::new(successes),
        }
    }
}

impl CodeMemory for FailingMemory {
    fn make_writable(&self, addr: usize, _len: usize) -> Result<()> {
        match self.remaining.get() {
            0 => bail!("mprotect {:#x}: permission denied", addr),
            n => {
                self.remaining.set(n - 1);
                Ok(())
            }
        }
    }

    fn flush(&self, _addr: usize, _len: usize) {}
}

pub struct MockImage {
    symbols: HashMap<&'static str, usize>,
    queries: Cell<usize>,
}

impl CodeImage for MockImage {
    fn find_symbol(&self, name: &str) -> Option<usize> {
        self.queries.set(self.queries.get() + 1);
        self.symbols.get(name).copied()
    }
}

pub struct MockRuntime {
    available: bool,
    image: Option<MockImage>,
    image_queries: Cell<usize>,
}

impl MockRuntime {
    fn new(available: bool, symbols: Option<HashMap<&'static str, usize>>) -> Self {
        Self {
            available,
            image: symbols.map(|symbols| MockImage {
                symbols,
                queries: Cell::new(0),
            }),
            image_queries: Cell::new(0),
        }
    }

    pub fn with_symbols(in_new_tlab: usize, outside_tlab: usize) -> Self {
        Self::new(
            true,
            Some(HashMap::from([(IN_NEW_TLAB_SYMBOL, in_new_tlab), (OUTSIDE_TLAB_SYMBOL, outside_tlab)])),
        )
    }

    pub fn with_symbol(name: &'static str, addr: usize) -> Self {
        Self::new(true, Some(HashMap::from([(name, addr)])))
    }

    pub fn without_image() -> Self {
        Self::new(true, None)
    }

    pub fn unavailable() -> Self {
        Self::new(false, Some(HashMap::new()))
    }

    pub fn image_queries(&self) -> usize {
        self.image_queries.get()
    }

    pub fn symbol_queries(&self) -> usize {
        self.image.as_ref().map_or(0, |image| image.queries.get())
    }
}

impl Runtime for MockRuntime {
    fn introspection_available(&self) -> bool {
        self.available
    }

    fn code_image(&self) -> Option<&dyn CodeImage> {
        self.image_queries.set(self.image_queries.get() + 1);
        self.image.as_ref().map(|image| image as &dyn CodeImage)
    }
}

#[derive(Debug, Default)]
pub struct CapturingRecorder {
    samples: Mutex<Vec<(u64, AllocEvent)>>,
}

impl CapturingRecorder {
    pub fn samples(&self) -> Vec<(u64, AllocEvent)> {
        self.samples.lock().unwrap().clone()
    }
}

impl Recorder for CapturingRecorder {
    fn record_sample(&self, _ucontext: *mut libc::c_void, weight: u64, event: &AllocEvent) {
        self.samples.lock().unwrap().push((weight, *event));
    }
}

const STACK_BASE: usize = 0x7fff_0000;

/// Registers plus a synthetic stack holding one return address.
pub struct MockFrame {
    pc: usize,
    sp: usize,
    args: [usize; MAX_ARGS],
    stack: Vec<usize>,
    returns: usize,
}

impl MockFrame {
    pub fn at(pc: usize, args: [usize; MAX_ARGS], return_address: usize) -> Self {
        Self {
            pc,
            sp: STACK_BASE,
            args,
            stack: vec![return_address, 0xdead_dead],
            returns: 0,
        }
    }

    pub fn returns(&self) -> usize {
        self.returns
    }
}

impl Frame for MockFrame {
    fn pc(&self) -> usize {
        self.pc
    }

    fn sp(&self) -> usize {
        self.sp
    }

    fn arg(&self, index: usize) -> usize {
        self.args.get(index).copied().unwrap_or(0)
    }

    fn context(&mut self) -> *mut libc::c_void {
        std::ptr::null_mut()
    }

    fn ret(&mut self) {
        self.pc = self.stack[(self.sp - STACK_BASE) / WORD_SIZE];
        self.sp += WORD_SIZE;
        self.returns += 1;
    }
}
