//! dumc-object — writes compiled machine code out as a relocatable ELF64
//! object file (`ET_REL`), with one global `STT_FUNC` symbol per compiled
//! function plus the `.text` section symbol its relocations would hang off.
//!
//! There is no dependency on `object`/`goblin`: the file this crate emits
//! has a fixed, small shape (one `PROGBITS` section, one symbol table, one
//! string table), so a hand-rolled writer is both simpler and more legible
//! than adapting a general-purpose object-file library to it.

#![forbid(unsafe_code)]

mod elf;

use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use thiserror::Error;

/// One function's extent within the `.text` a [`build_object`] call embeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFunction {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

/// The neutral input an object writer needs: raw code plus the symbols to
/// publish for it. Deliberately independent of `dumc-codegen`'s own types
/// so this crate can be exercised and reasoned about on its own.
#[derive(Debug, Clone, Default)]
pub struct ObjectInput {
    pub text: Vec<u8>,
    pub functions: Vec<ObjectFunction>,
}

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("failed to write object file '{path}'")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Builds the full byte image of a relocatable ELF64 object file. Pure and
/// infallible: every section grows a `Vec`, so there is no fixed-capacity
/// overflow to report.
pub fn build_object(input: &ObjectInput) -> Vec<u8> {
    elf::build(input)
}

/// Builds the object file and writes it to `path` with executable
/// permissions (`0755`), matching what a subsequent link step expects.
pub fn write_object_file(path: &Path, input: &ObjectInput) -> Result<(), ObjectError> {
    let bytes = build_object(input);
    log::debug!("writing {} bytes to {}", bytes.len(), path.display());
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o755)
        .open(path)
        .and_then(|mut f| {
            use std::io::Write;
            f.write_all(&bytes)
        })
        .map_err(|source| ObjectError::Io { path: path.display().to_string(), source })
}
