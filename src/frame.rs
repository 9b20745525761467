//! Register access for a thread interrupted by a signal.
//!
//! Only the six integer argument registers of the platform C calling
//! convention are exposed, which is all the traced functions take.

#[cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64"))))]
compile_error!("alloc-trap supports Linux on x86_64 and aarch64 only");

pub const MAX_ARGS: usize = 6;

pub trait Frame {
    fn pc(&self) -> usize;

    fn sp(&self) -> usize;

    /// Integer argument `index` (zero based) of the interrupted call, or 0
    /// past [`MAX_ARGS`].
    fn arg(&self, index: usize) -> usize;

    /// The raw context handed to recorders.
    fn context(&mut self) -> *mut libc::c_void;

    /// Rewrites the context so that, once the signal returns, execution
    /// resumes in the caller as if the interrupted function had returned
    /// immediately. Only valid while stopped at the function's first
    /// instruction.
    fn ret(&mut self);
}

/// A `ucontext_t` delivered to an `SA_SIGINFO` handler.
pub struct StackFrame<'a> {
    uc: &'a mut libc::ucontext_t,
}

impl StackFrame<'_> {
    /// # Safety
    ///
    /// `ucontext` must be null or point to a live `ucontext_t` whose stack
    /// pointer refers to readable memory, as is the case for the context
    /// argument of a signal handler.
    pub unsafe fn from_raw(ucontext: *mut libc::c_void) -> Option<Self> {
        (ucontext as *mut libc::ucontext_t).as_mut().map(|uc| Self { uc })
    }
}

#[cfg(target_arch = "x86_64")]
mod arch {
    use super::{Frame, StackFrame};
    use crate::consts::WORD_SIZE;

    const ARG_REGS: [libc::c_int; super::MAX_ARGS] = [
        libc::REG_RDI,
        libc::REG_RSI,
        libc::REG_RDX,
        libc::REG_RCX,
        libc::REG_R8,
        libc::REG_R9,
    ];

    impl StackFrame<'_> {
        fn reg(&self, reg: libc::c_int) -> usize {
            self.uc.uc_mcontext.gregs[reg as usize] as usize
        }

        fn set_reg(&mut self, reg: libc::c_int, value: usize) {
            self.uc.uc_mcontext.gregs[reg as usize] = value as libc::greg_t;
        }
    }

    impl Frame for StackFrame<'_> {
        fn pc(&self) -> usize {
            self.reg(libc::REG_RIP)
        }

        fn sp(&self) -> usize {
            self.reg(libc::REG_RSP)
        }

        fn arg(&self, index: usize) -> usize {
            ARG_REGS.get(index).map_or(0, |&reg| self.reg(reg))
        }

        fn context(&mut self) -> *mut libc::c_void {
            &mut *self.uc as *mut libc::ucontext_t as *mut libc::c_void
        }

        // emulate `ret`: pop the return address pushed by `call`
        fn ret(&mut self) {
            let sp = self.sp();
            let return_address = unsafe { std::ptr::read(sp as *const usize) };
            self.set_reg(libc::REG_RIP, return_address);
            self.set_reg(libc::REG_RSP, sp + WORD_SIZE);
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    use super::{Frame, StackFrame};

    const LR: usize = 30;

    impl Frame for StackFrame<'_> {
        fn pc(&self) -> usize {
            self.uc.uc_mcontext.pc as usize
        }

        fn sp(&self) -> usize {
            self.uc.uc_mcontext.sp as usize
        }

        fn arg(&self, index: usize) -> usize {
            if index < super::MAX_ARGS {
                self.uc.uc_mcontext.regs[index] as usize
            } else {
                0
            }
        }

        fn context(&mut self) -> *mut libc::c_void {
            &mut *self.uc as *mut libc::ucontext_t as *mut libc::c_void
        }

        // emulate `ret`: branch to the link register
        fn ret(&mut self) {
            self.uc.uc_mcontext.pc = self.uc.uc_mcontext.regs[LR];
        }
    }
}

#[cfg(test)]
mod tests {
    use std::mem;

    use super::*;

    fn zeroed_context() -> libc::ucontext_t {
        unsafe { mem::zeroed() }
    }

    #[test]
    fn test_from_null() {
        assert!(unsafe { StackFrame::from_raw(std::ptr::null_mut()) }.is_none());
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_arguments() {
        let mut uc = zeroed_context();
        let values = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60];
        for (reg, value) in [
            libc::REG_RDI,
            libc::REG_RSI,
            libc::REG_RDX,
            libc::REG_RCX,
            libc::REG_R8,
            libc::REG_R9,
        ]
        .into_iter()
        .zip(values)
        {
            uc.uc_mcontext.gregs[reg as usize] = value;
        }
        uc.uc_mcontext.gregs[libc::REG_RIP as usize] = 0x1001;

        let frame = unsafe { StackFrame::from_raw(&mut uc as *mut _ as *mut libc::c_void) }.unwrap();
        assert_eq!(frame.pc(), 0x1001);
        for (index, value) in values.into_iter().enumerate() {
            assert_eq!(frame.arg(index), value as usize);
        }
        assert_eq!(frame.arg(MAX_ARGS), 0);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_ret_pops_return_address() {
        use crate::consts::WORD_SIZE;

        let stack: [usize; 3] = [0xcafe_f00d, 0x1111, 0x2222];
        let sp = stack.as_ptr() as usize;

        let mut uc = zeroed_context();
        uc.uc_mcontext.gregs[libc::REG_RIP as usize] = 0x1001;
        uc.uc_mcontext.gregs[libc::REG_RSP as usize] = sp as libc::greg_t;
        uc.uc_mcontext.gregs[libc::REG_RBP as usize] = 0x7777;

        let mut frame = unsafe { StackFrame::from_raw(&mut uc as *mut _ as *mut libc::c_void) }.unwrap();
        frame.ret();

        assert_eq!(frame.pc(), 0xcafe_f00d);
        assert_eq!(frame.sp(), sp + WORD_SIZE);
        drop(frame);
        // callee-saved frame pointer is untouched
        assert_eq!(uc.uc_mcontext.gregs[libc::REG_RBP as usize], 0x7777);
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn test_arguments() {
        let mut uc = zeroed_context();
        for index in 0..MAX_ARGS {
            uc.uc_mcontext.regs[index] = (index as u64 + 1) * 0x10;
        }
        uc.uc_mcontext.pc = 0x1000;

        let frame = unsafe { StackFrame::from_raw(&mut uc as *mut _ as *mut libc::c_void) }.unwrap();
        assert_eq!(frame.pc(), 0x1000);
        for index in 0..MAX_ARGS {
            assert_eq!(frame.arg(index), (index + 1) * 0x10);
        }
        assert_eq!(frame.arg(MAX_ARGS), 0);
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn test_ret_branches_to_link_register() {
        let mut uc = zeroed_context();
        uc.uc_mcontext.pc = 0x1000;
        uc.uc_mcontext.sp = 0x8000;
        uc.uc_mcontext.regs[30] = 0xcafe_f00d;

        let mut frame = unsafe { StackFrame::from_raw(&mut uc as *mut _ as *mut libc::c_void) }.unwrap();
        frame.ret();

        assert_eq!(frame.pc(), 0xcafe_f00d);
        assert_eq!(frame.sp(), 0x8000);
    }
}
