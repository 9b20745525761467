use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use memmap2::Mmap;
use object::{Object, ObjectSegment, ObjectSymbol};

use crate::consts::{JVM_LIBRARY_NAME, VM_STRUCTS_SYMBOL};
use crate::error::TracerError;
use crate::runtime::{CodeImage, Runtime};
use crate::utils::page;

/// Symbol tables of an ELF file, relocated to where it is mapped.
#[derive(Debug)]
pub struct ElfImage {
    path: PathBuf,
    bias: usize,
    symbols: HashMap<String, u64>,
}

impl ElfImage {
    /// Reads the symbols of `path` at their link-time addresses.
    pub fn open(path: &Path) -> Result<Self> {
        Self::load(path, None)
    }

    /// Reads the symbols of `path`, which this process has mapped at
    /// `map_start` (the start of its offset-0 mapping).
    pub fn open_loaded(path: &Path, map_start: usize) -> Result<Self> {
        Self::load(path, Some(map_start))
    }

    fn load(path: &Path, map_start: Option<usize>) -> Result<Self> {
        let file = fs::File::open(path)?;
        let map = unsafe { Mmap::map(&file)? };
        let object = object::File::parse(&*map)?;

        let bias = match map_start {
            Some(map_start) => {
                let page_size = page::page_size()?;
                let first_vaddr = object.segments().map(|segment| segment.address()).min().unwrap_or(0) as usize;
                map_start.wrapping_sub(first_vaddr & !(page_size - 1))
            }
            None => 0,
        };

        let mut symbols = HashMap::new();
        for symbol in object.symbols().chain(object.dynamic_symbols()) {
            if symbol.address() == 0 || !symbol.is_definition() {
                continue;
            }
            if let Ok(name) = symbol.name() {
                symbols.entry(name.to_owned()).or_insert(symbol.address());
            }
        }
        log::debug!("loaded {} symbols from {}, bias {:#x}", symbols.len(), path.display(), bias);

        Ok(Self {
            path: path.to_path_buf(),
            bias,
            symbols,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bias(&self) -> usize {
        self.bias
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }
}

impl CodeImage for ElfImage {
    fn find_symbol(&self, name: &str) -> Option<usize> {
        self.symbols.get(name).map(|&addr| self.bias.wrapping_add(addr as usize))
    }
}

/// One line of `/proc/<pid>/maps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub start: usize,
    pub end: usize,
    pub offset: u64,
    pub path: Option<PathBuf>,
}

pub fn parse_maps(maps: &str) -> Result<Vec<Mapping>> {
    maps.lines().filter(|line| !line.trim().is_empty()).map(parse_mapping).collect()
}

fn parse_mapping(line: &str) -> Result<Mapping> {
    let mut fields = line.split_whitespace();
    let range = fields.next().ok_or(TracerError::InvalidProcMaps)?;
    let _perms = fields.next().ok_or(TracerError::InvalidProcMaps)?;
    let offset = fields.next().ok_or(TracerError::InvalidProcMaps)?;
    let _dev = fields.next().ok_or(TracerError::InvalidProcMaps)?;
    let _inode = fields.next().ok_or(TracerError::InvalidProcMaps)?;
    // paths may contain spaces
    let path = fields.collect::<Vec<_>>().join(" ");

    let (start, end) = range.split_once('-').ok_or(TracerError::InvalidProcMaps)?;

    Ok(Mapping {
        start: usize::from_str_radix(start, 16)?,
        end: usize::from_str_radix(end, 16)?,
        offset: u64::from_str_radix(offset, 16)?,
        path: path.starts_with('/').then(|| PathBuf::from(path)),
    })
}

/// The offset-0 mapping of the first file matching `matches`.
pub fn find_mapping<'a, F>(mappings: &'a [Mapping], matches: F) -> Option<&'a Mapping>
where
    F: Fn(&Path) -> bool,
{
    mappings
        .iter()
        .find(|mapping| mapping.offset == 0 && mapping.path.as_deref().is_some_and(&matches))
}

/// HotSpot as loaded into the current process.
#[derive(Debug)]
pub struct JvmRuntime {
    image: Option<ElfImage>,
}

impl JvmRuntime {
    /// Looks for `libjvm.so` among this process's mappings.
    pub fn discover() -> Result<Self> {
        let maps = fs::read_to_string("/proc/self/maps")?;
        let mappings = parse_maps(&maps)?;

        let image = match find_mapping(&mappings, |path| path.file_name().is_some_and(|name| name == JVM_LIBRARY_NAME)) {
            Some(mapping) => {
                let path = mapping.path.as_deref().ok_or(TracerError::InvalidProcMaps)?;
                log::debug!("found {} at {:#x}", path.display(), mapping.start);
                Some(ElfImage::open_loaded(path, mapping.start)?)
            }
            None => {
                log::debug!("{} is not loaded", JVM_LIBRARY_NAME);
                None
            }
        };

        Ok(Self { image })
    }

    pub fn from_image(image: ElfImage) -> Self {
        Self { image: Some(image) }
    }

    pub fn image(&self) -> Option<&ElfImage> {
        self.image.as_ref()
    }
}

impl Runtime for JvmRuntime {
    fn introspection_available(&self) -> bool {
        self.image.as_ref().is_some_and(|image| image.contains(VM_STRUCTS_SYMBOL))
    }

    fn code_image(&self) -> Option<&dyn CodeImage> {
        self.image.as_ref().map(|image| image as &dyn CodeImage)
    }
}
