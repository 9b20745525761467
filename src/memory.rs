use anyhow::Result;

use crate::utils::{self, page};

/// Access to the pages holding the code we patch.
pub trait CodeMemory {
    /// Makes `len` bytes at `addr` readable, writable and executable.
    fn make_writable(&self, addr: usize, len: usize) -> Result<()>;

    /// Makes freshly written instructions visible to instruction fetch.
    fn flush(&self, addr: usize, len: usize);
}

/// The current process's own code.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemory;

impl CodeMemory for ProcessMemory {
    fn make_writable(&self, addr: usize, len: usize) -> Result<()> {
        let (start, len) = page::page_span(addr, len, page::page_size()?);
        log::trace!("mprotect rwx {:#x}..{:#x}", start, start + len);

        utils::check(unsafe {
            libc::mprotect(
                start as *mut libc::c_void,
                len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            )
        })?;

        Ok(())
    }

    fn flush(&self, addr: usize, len: usize) {
        flush_icache(addr, len);
    }
}

// x86 keeps the instruction cache coherent with stores
#[cfg(target_arch = "x86_64")]
fn flush_icache(_addr: usize, _len: usize) {}

#[cfg(target_arch = "aarch64")]
fn flush_icache(addr: usize, len: usize) {
    // patches are a single instruction, so stepping by instruction width touches every line
    const LINE: usize = 4;

    let mut line = addr & !(LINE - 1);
    while line < addr + len {
        unsafe {
            std::arch::asm!("dc cvau, {0}", in(reg) line, options(nostack, preserves_flags));
        }
        line += LINE;
    }
    unsafe {
        std::arch::asm!("dsb ish", options(nostack, preserves_flags));
    }

    let mut line = addr & !(LINE - 1);
    while line < addr + len {
        unsafe {
            std::arch::asm!("ic ivau, {0}", in(reg) line, options(nostack, preserves_flags));
        }
        line += LINE;
    }
    unsafe {
        std::arch::asm!("dsb ish", "isb", options(nostack, preserves_flags));
    }
}
