//! dumc — library surface
//!
//! Wires together the lexer, parser, codegen and object writer crates into
//! a single `compile_source` entry point. The binary (`src/main.rs`) is a
//! thin CLI shell around this; tests drive it directly to avoid spawning a
//! process per case.

use std::path::Path;

use anyhow::{Context, Result};

/// Version of this package (from Cargo).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compiles `source` down to the neutral object-writer input: raw machine
/// code plus the function symbols to publish for it.
pub fn compile_to_object_input(source: &str) -> Result<dumc_object::ObjectInput> {
    let program = dumc_parser::parse_program(source).context("parse error")?;
    let compiled = dumc_codegen::compile_program(&program).context("codegen error")?;
    Ok(dumc_object::ObjectInput {
        text: compiled.text,
        functions: compiled
            .functions
            .into_iter()
            .map(|f| dumc_object::ObjectFunction { name: f.name, offset: f.offset as u64, size: f.size as u64 })
            .collect(),
    })
}

/// Compiles `source` all the way to a relocatable object image. Does not
/// touch the filesystem; callers choose where the bytes end up.
pub fn compile_source(source: &str) -> Result<Vec<u8>> {
    Ok(dumc_object::build_object(&compile_to_object_input(source)?))
}

/// Derives the output object path for a source file: `<basename>.o`,
/// relative to the current directory regardless of where the input lives.
pub fn output_path_for(source_path: &Path) -> std::path::PathBuf {
    let stem = source_path.file_stem().unwrap_or_default();
    Path::new(stem).with_extension("o")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_not_empty() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn compiles_a_trivial_program_to_a_valid_elf_object() {
        let bytes = compile_source("@main() { ret 7 }").unwrap();
        assert_eq!(&bytes[0..4], b"\x7FELF");
    }

    #[test]
    fn parse_errors_surface_with_context() {
        let err = compile_source("@main( { ret 1 }").unwrap_err();
        assert!(format!("{err:#}").contains("parse error"));
    }

    #[test]
    fn output_path_swaps_extension_to_o() {
        let p = output_path_for(Path::new("prog.dum"));
        assert_eq!(p, Path::new("prog.o"));
    }

    #[test]
    fn output_path_drops_the_source_directory() {
        // The object always lands next to the *process*, not the source file.
        let p = output_path_for(Path::new("/tmp/somewhere/else/prog.dum"));
        assert_eq!(p, Path::new("prog.o"));
    }
}
