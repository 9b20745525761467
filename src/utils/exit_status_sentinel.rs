pub(crate) trait ExitStatusSentinel: PartialEq {
    fn sentinel() -> Self;
}

impl ExitStatusSentinel for i32 {
    fn sentinel() -> Self {
        -1
    }
}

impl ExitStatusSentinel for i64 {
    fn sentinel() -> Self {
        -1
    }
}

/// Turns the `-1` returned by a failed libc call into the current `errno`.
pub(crate) fn check<T: ExitStatusSentinel>(value: T) -> Result<T, std::io::Error> {
    if value == T::sentinel() {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(value)
    }
}
