use std::io;
use std::sync::OnceLock;

use super::check;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

pub fn page_size() -> io::Result<usize> {
    if let Some(&size) = PAGE_SIZE.get() {
        return Ok(size);
    }

    let size = check(unsafe { libc::sysconf(libc::_SC_PAGESIZE) })? as usize;
    Ok(*PAGE_SIZE.get_or_init(|| size))
}

/// Page-aligned `(start, len)` covering `len` bytes at `addr`.
pub fn page_span(addr: usize, len: usize, page_size: usize) -> (usize, usize) {
    let start = addr & !(page_size - 1);
    let end = (addr + len).div_ceil(page_size) * page_size;
    (start, end - start)
}
