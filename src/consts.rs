use std::mem;

#[cfg(target_arch = "x86_64")]
pub type Instruction = u8;

/// int3
#[cfg(target_arch = "x86_64")]
pub const BREAKPOINT: Instruction = 0xcc;

#[cfg(target_arch = "aarch64")]
pub type Instruction = u32;

/// brk #0
#[cfg(target_arch = "aarch64")]
pub const BREAKPOINT: Instruction = 0xd420_0000;

pub const INSTRUCTION_SIZE: usize = mem::size_of::<Instruction>();

pub const WORD_SIZE: usize = mem::size_of::<usize>();

// size_t mangles as `m` on LP64 and `j` on ILP32
#[cfg(target_pointer_width = "64")]
macro_rules! size_t_mangling {
    () => {
        "m"
    };
}

#[cfg(target_pointer_width = "32")]
macro_rules! size_t_mangling {
    () => {
        "j"
    };
}

/// `AllocTracer::send_allocation_in_new_tlab_event(KlassHandle, size_t tlab_size, size_t alloc_size)`
pub const IN_NEW_TLAB_SYMBOL: &str = concat!(
    "_ZN11AllocTracer33send_allocation_in_new_tlab_eventE11KlassHandle",
    size_t_mangling!(),
    size_t_mangling!()
);

/// `AllocTracer::send_allocation_outside_tlab_event(KlassHandle, size_t alloc_size)`
pub const OUTSIDE_TLAB_SYMBOL: &str = concat!(
    "_ZN11AllocTracer34send_allocation_outside_tlab_eventE11KlassHandle",
    size_t_mangling!()
);

/// Exported by every libjvm that carries the VMStructs tables.
pub const VM_STRUCTS_SYMBOL: &str = "gHotSpotVMStructs";

pub const JVM_LIBRARY_NAME: &str = "libjvm.so";
