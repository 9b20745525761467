use std::path::Path;

use alloc_trap::consts::VM_STRUCTS_SYMBOL;
use alloc_trap::{CodeImage, ElfImage, TracerError, TrapKind};
use anyhow::{bail, Result};

pub fn run(library: &Path) -> Result<()> {
    let image = ElfImage::open(library)?;
    println!("{}", image.path().display());

    let vm_structs = image.contains(VM_STRUCTS_SYMBOL);
    println!("  {:<14} {}", "vmstructs", if vm_structs { "found" } else { "missing" });

    let mut resolved = true;
    for kind in TrapKind::ALL {
        match image.find_symbol(kind.symbol()) {
            Some(addr) => println!("  {:<14} {:#x}", kind, addr),
            None => {
                println!("  {:<14} missing", kind);
                resolved = false;
            }
        }
    }

    if !vm_structs {
        bail!(TracerError::IntrospectionUnavailable);
    }
    if !resolved {
        bail!(TracerError::SymbolsNotFound);
    }

    Ok(())
}
