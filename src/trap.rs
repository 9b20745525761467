use std::ptr;

use anyhow::{bail, Result};

use crate::consts::{Instruction, BREAKPOINT, INSTRUCTION_SIZE};
use crate::error::TracerError;
use crate::memory::CodeMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapState {
    Uninstalled,
    Installed { saved: Instruction },
}

/// A breakpoint at the entry of one function.
#[derive(Debug)]
pub struct Trap {
    symbol: &'static str,
    entry: Option<usize>,
    state: TrapState,
}

impl Trap {
    pub fn new(symbol: &'static str) -> Self {
        Self {
            symbol,
            entry: None,
            state: TrapState::Uninstalled,
        }
    }

    pub fn symbol(&self) -> &'static str {
        self.symbol
    }

    pub fn entry(&self) -> Option<usize> {
        self.entry
    }

    pub fn is_resolved(&self) -> bool {
        self.entry.is_some()
    }

    pub fn state(&self) -> TrapState {
        self.state
    }

    pub fn is_installed(&self) -> bool {
        matches!(self.state, TrapState::Installed { .. })
    }

    /// Sets the entry address once. A resolved trap keeps its first address.
    pub(crate) fn resolve(&mut self, entry: Option<usize>) {
        if self.entry.is_none() {
            self.entry = entry.filter(|&addr| addr != 0);
        }
    }

    /// Whether `pc` was stopped by this trap's breakpoint: either the
    /// breakpoint itself or the instruction right after it.
    pub fn covers(entry: usize, pc: usize) -> bool {
        pc.wrapping_sub(entry) <= INSTRUCTION_SIZE
    }

    pub fn install<M: CodeMemory + ?Sized>(&mut self, memory: &M) -> Result<()> {
        let Some(entry) = self.entry else {
            bail!(TracerError::Unresolved(self.symbol));
        };
        if self.is_installed() {
            return Ok(());
        }

        memory.make_writable(entry, INSTRUCTION_SIZE)?;

        let insn = entry as *mut Instruction;
        let saved = unsafe { ptr::read_volatile(insn) };
        unsafe { ptr::write_volatile(insn, BREAKPOINT) };
        memory.flush(entry, INSTRUCTION_SIZE);

        log::trace!("replace {:#x} with {:#x} at {:#x}", saved, BREAKPOINT, entry);
        self.state = TrapState::Installed { saved };

        Ok(())
    }

    pub fn uninstall<M: CodeMemory + ?Sized>(&mut self, memory: &M) -> Result<()> {
        let (Some(entry), TrapState::Installed { saved }) = (self.entry, self.state) else {
            return Ok(());
        };

        unsafe { ptr::write_volatile(entry as *mut Instruction, saved) };
        memory.flush(entry, INSTRUCTION_SIZE);

        log::trace!("restored instruction at {:#x} to {:#x}", entry, saved);
        self.state = TrapState::Uninstalled;

        Ok(())
    }
}
