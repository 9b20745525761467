use std::fmt;

use anyhow::Result;

use crate::consts::{IN_NEW_TLAB_SYMBOL, OUTSIDE_TLAB_SYMBOL};
use crate::memory::CodeMemory;
use crate::runtime::Runtime;
use crate::trap::Trap;

/// Argument slot holding the `KlassHandle` in both traced functions.
pub const TYPE_HANDLE_ARG: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapKind {
    /// `send_allocation_in_new_tlab_event(KlassHandle klass, size_t tlab_size, size_t alloc_size)`
    InNewTlab,
    /// `send_allocation_outside_tlab_event(KlassHandle klass, size_t alloc_size)`
    OutsideTlab,
}

impl TrapKind {
    pub const ALL: [TrapKind; 2] = [TrapKind::InNewTlab, TrapKind::OutsideTlab];

    pub fn symbol(self) -> &'static str {
        match self {
            TrapKind::InNewTlab => IN_NEW_TLAB_SYMBOL,
            TrapKind::OutsideTlab => OUTSIDE_TLAB_SYMBOL,
        }
    }

    /// Argument slot holding the allocation size.
    pub fn size_arg(self) -> usize {
        match self {
            TrapKind::InNewTlab => 2,
            TrapKind::OutsideTlab => 1,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapKind::InNewTlab => f.pad("in-new-tlab"),
            TrapKind::OutsideTlab => f.pad("outside-tlab"),
        }
    }
}

/// The two allocation traps a tracer owns.
#[derive(Debug)]
pub struct TrapRegistry {
    traps: [Trap; 2],
}

impl TrapRegistry {
    pub fn new() -> Self {
        Self {
            traps: TrapKind::ALL.map(|kind| Trap::new(kind.symbol())),
        }
    }

    pub fn get(&self, kind: TrapKind) -> &Trap {
        &self.traps[kind.index()]
    }

    pub(crate) fn get_mut(&mut self, kind: TrapKind) -> &mut Trap {
        &mut self.traps[kind.index()]
    }

    pub fn is_resolved(&self) -> bool {
        self.traps.iter().all(Trap::is_resolved)
    }

    /// Resolves both trap entries through the runtime's code image.
    /// Once both are resolved the runtime is not consulted again.
    pub fn check_symbols(&mut self, runtime: &dyn Runtime) -> bool {
        if self.is_resolved() {
            return true;
        }

        if let Some(image) = runtime.code_image() {
            for trap in self.traps.iter_mut() {
                let entry = image.find_symbol(trap.symbol());
                log::debug!("resolved {} to {:x?}", trap.symbol(), entry);
                trap.resolve(entry);
            }
        }

        self.is_resolved()
    }

    pub fn installed(&self) -> impl Iterator<Item = TrapKind> + '_ {
        TrapKind::ALL.into_iter().filter(|&kind| self.get(kind).is_installed())
    }

    /// Uninstalls every installed trap, reporting the first failure after
    /// attempting all of them.
    pub fn uninstall_all<M: CodeMemory + ?Sized>(&mut self, memory: &M) -> Result<()> {
        let mut result = Ok(());
        for trap in self.traps.iter_mut() {
            if let Err(e) = trap.uninstall(memory) {
                log::error!("failed to uninstall {}: {e:#}", trap.symbol());
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

impl Default for TrapRegistry {
    fn default() -> Self {
        Self::new()
    }
}
