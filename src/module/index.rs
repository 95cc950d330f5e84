//! The ahead-of-time module registry.
//!
//! The [`ModuleIndex`] fixes the static id of every declared module and the known-types index
//! derived from their enumerable match strategies. It is computed once, typically at build
//! time, and loaded at agent startup so the installer neither re-derives ids nor re-scans
//! every descriptor's strategy.
//!
//! # Binary Format
//!
//! All integers are little-endian; strings are `u32` length-prefixed UTF-8.
//!
//! | Field | Type |
//! |-------|------|
//! | magic | `b"CWIX"` |
//! | version | `u16` (currently `1`) |
//! | module count | `u32` |
//! | module names | `string` x count, in id order |
//! | known type count | `u32` |
//! | known types | `string` name, `u32` id count, `u32` ids |

use std::{collections::HashMap, path::Path};

use crate::{
    matcher::KnownTypesIndex,
    module::{ModuleDescriptor, ModuleId},
    utils::{read_le_at, read_str_at, write_le, write_str},
    Error, Result,
};

const MAGIC: &[u8; 4] = b"CWIX";
const VERSION: u16 = 1;

/// Static module ids and the known-types index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleIndex {
    names: Vec<String>,
    ids: HashMap<String, ModuleId>,
    known_types: KnownTypesIndex,
}

impl ModuleIndex {
    /// Compute the index for `modules`: module `i` receives static id `i` and its
    /// enumerable type names are added to the known-types index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModule`] if two modules share a name.
    pub fn build(modules: &[ModuleDescriptor]) -> Result<Self> {
        let mut index = ModuleIndex::default();
        for module in modules {
            let id = index.push_name(&module.name)?;
            for name in module.strategy.known_types() {
                index.known_types.insert(name.clone(), id);
            }
        }
        Ok(index)
    }

    fn push_name(&mut self, name: &str) -> Result<ModuleId> {
        let id = ModuleId::from_index(self.names.len());
        if self.ids.insert(name.to_string(), id).is_some() {
            return Err(Error::InvalidModule {
                module: name.to_string(),
                reason: "declared twice in the module index".to_string(),
            });
        }
        self.names.push(name.to_string());
        Ok(id)
    }

    /// Static id of the module named `name`.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<ModuleId> {
        self.ids.get(name).copied()
    }

    /// Name of the module with static id `id`.
    #[must_use]
    pub fn name_of(&self, id: ModuleId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    /// Number of static ids.
    #[must_use]
    pub fn static_len(&self) -> usize {
        self.names.len()
    }

    /// The known-types index.
    #[must_use]
    pub fn known_types(&self) -> &KnownTypesIndex {
        &self.known_types
    }

    /// Encode into the binary format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if a name or a count does not fit the format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        write_le(&mut out, VERSION);

        write_le(&mut out, count(self.names.len())?);
        for name in &self.names {
            write_str(&mut out, name)?;
        }

        let mut entries: Vec<_> = self.known_types.iter().collect();
        entries.sort_unstable_by_key(|(name, _)| *name);
        write_le(&mut out, count(entries.len())?);
        for (name, ids) in entries {
            write_str(&mut out, name)?;
            write_le(&mut out, count(ids.count())?);
            for id in ids {
                write_le(&mut out, id.raw());
            }
        }

        Ok(out)
    }

    /// Decode from the binary format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] for truncated input and [`Error::Malformed`] for a bad
    /// magic, an unsupported version, duplicate names or ids outside the static range.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
            return Err(malformed_error!("Invalid module index magic"));
        }
        let mut offset = MAGIC.len();

        let version = read_le_at::<u16>(data, &mut offset)?;
        if version != VERSION {
            return Err(malformed_error!("Unsupported module index version {}", version));
        }

        let mut index = ModuleIndex::default();
        let module_count = read_le_at::<u32>(data, &mut offset)?;
        for _ in 0..module_count {
            let name = read_str_at(data, &mut offset)?;
            index
                .push_name(&name)
                .map_err(|_| malformed_error!("Duplicate module name '{}'", name))?;
        }

        let known_count = read_le_at::<u32>(data, &mut offset)?;
        for _ in 0..known_count {
            let class_name = read_str_at(data, &mut offset)?;
            let id_count = read_le_at::<u32>(data, &mut offset)?;
            for _ in 0..id_count {
                let id = ModuleId::new(read_le_at::<u32>(data, &mut offset)?);
                if id.index() >= index.names.len() {
                    return Err(malformed_error!(
                        "Known type '{}' references module {} outside the static range",
                        class_name,
                        id
                    ));
                }
                index.known_types.insert(class_name.clone(), id);
            }
        }

        if offset != data.len() {
            return Err(malformed_error!(
                "{} trailing bytes after module index",
                data.len() - offset
            ));
        }

        Ok(index)
    }

    /// Read an encoded index from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or any error of
    /// [`ModuleIndex::from_bytes`].
    pub fn read_from(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Write the encoded index to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

fn count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| malformed_error!("Count {} does not fit the index", len))
}
