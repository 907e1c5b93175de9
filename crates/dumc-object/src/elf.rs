//! ELF64 constants and the fixed byte layout this crate always emits.
//!
//! Four sections, always in this order: `.text`, `.strtab`, `.symtab`,
//! `.shstrtab`. Section indices (1-based, slot 0 is the mandatory null
//! section) are therefore fixed too: `.text`=1, `.strtab`=2, `.symtab`=3,
//! `.shstrtab`=4.

use crate::ObjectInput;

const EI_NIDENT: usize = 16;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const ET_REL: u16 = 1;
const EM_X86_64: u16 = 62;

const SHT_NULL: u32 = 0;
const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;

const SHF_ALLOC: u64 = 0x2;
const SHF_EXECINSTR: u64 = 0x4;
const SHF_STRINGS: u64 = 0x20;

const STB_LOCAL: u8 = 0;
const STB_GLOBAL: u8 = 1;
const STT_SECTION: u8 = 3;
const STT_FUNC: u8 = 2;

pub(crate) const EHDR_SIZE: usize = 64;
pub(crate) const SHDR_SIZE: usize = 64;
pub(crate) const SYM_SIZE: usize = 24;

const SHN_TEXT: u16 = 1;
const SHN_STRTAB: u16 = 2;
const SHN_SHSTRTAB: u16 = 4;

/// `\0.text\0.shstrtab\0.symtab\0.strtab\0`, with every section's `sh_name`
/// fixed to the offset of its own entry below.
const SHSTRTAB: &[u8] = b"\0.text\0.shstrtab\0.symtab\0.strtab\0";
pub(crate) const SHNAME_TEXT: usize = 1;
pub(crate) const SHNAME_SHSTRTAB: usize = 7;
pub(crate) const SHNAME_SYMTAB: usize = 17;
pub(crate) const SHNAME_STRTAB: usize = 25;

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

fn push_ehdr(out: &mut Vec<u8>, e_shoff: u64) {
    let mut ident = [0u8; EI_NIDENT];
    ident[0..4].copy_from_slice(b"\x7FELF");
    ident[4] = ELFCLASS64;
    ident[5] = ELFDATA2LSB;
    ident[6] = EV_CURRENT;
    out.extend_from_slice(&ident);
    out.extend_from_slice(&ET_REL.to_le_bytes()); // e_type
    out.extend_from_slice(&EM_X86_64.to_le_bytes()); // e_machine
    out.extend_from_slice(&(EV_CURRENT as u32).to_le_bytes()); // e_version
    out.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    out.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
    out.extend_from_slice(&e_shoff.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes()); // e_ehsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&(SHDR_SIZE as u16).to_le_bytes()); // e_shentsize
    out.extend_from_slice(&5u16.to_le_bytes()); // e_shnum
    out.extend_from_slice(&SHN_SHSTRTAB.to_le_bytes()); // e_shstrndx
}

#[allow(clippy::too_many_arguments)]
fn push_shdr(
    out: &mut Vec<u8>,
    sh_name: u32,
    sh_type: u32,
    sh_flags: u64,
    sh_offset: u64,
    sh_size: u64,
    sh_link: u32,
    sh_info: u32,
    sh_addralign: u64,
    sh_entsize: u64,
) {
    out.extend_from_slice(&sh_name.to_le_bytes());
    out.extend_from_slice(&sh_type.to_le_bytes());
    out.extend_from_slice(&sh_flags.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes()); // sh_addr
    out.extend_from_slice(&sh_offset.to_le_bytes());
    out.extend_from_slice(&sh_size.to_le_bytes());
    out.extend_from_slice(&sh_link.to_le_bytes());
    out.extend_from_slice(&sh_info.to_le_bytes());
    out.extend_from_slice(&sh_addralign.to_le_bytes());
    out.extend_from_slice(&sh_entsize.to_le_bytes());
}

fn push_sym(out: &mut Vec<u8>, st_name: u32, bind: u8, kind: u8, st_shndx: u16, st_value: u64, st_size: u64) {
    out.extend_from_slice(&st_name.to_le_bytes());
    out.push((bind << 4) | kind);
    out.push(0); // st_other
    out.extend_from_slice(&st_shndx.to_le_bytes());
    out.extend_from_slice(&st_value.to_le_bytes());
    out.extend_from_slice(&st_size.to_le_bytes());
}

pub(crate) fn build(input: &ObjectInput) -> Vec<u8> {
    // .strtab: a leading NUL, then the .text section's own name (for its
    // STT_SECTION symbol), then each function's name.
    let mut strtab = vec![0u8];
    let text_sym_name_off = strtab.len() as u32;
    strtab.extend_from_slice(b".text\0");
    let func_name_offs: Vec<u32> = input
        .functions
        .iter()
        .map(|f| {
            let off = strtab.len() as u32;
            strtab.extend_from_slice(f.name.as_bytes());
            strtab.push(0);
            off
        })
        .collect();

    let text_off = EHDR_SIZE;
    let text_size = input.text.len();

    let strtab_off = text_off + text_size;
    let strtab_size = strtab.len();

    let symtab_off = align_up(strtab_off + strtab_size, 8);
    let symtab_entry_count = 2 + input.functions.len(); // null + .text section symbol + one per function
    let symtab_size = symtab_entry_count * SYM_SIZE;

    let shstrtab_off = symtab_off + symtab_size;
    let shstrtab_size = SHSTRTAB.len();

    let shoff = align_up(shstrtab_off + shstrtab_size, 8);

    let mut out = Vec::with_capacity(shoff + 5 * SHDR_SIZE);
    push_ehdr(&mut out, shoff as u64);

    out.extend_from_slice(&input.text);
    out.extend_from_slice(&strtab);
    out.resize(symtab_off, 0);

    push_sym(&mut out, 0, STB_LOCAL, 0, 0, 0, 0); // null symbol
    push_sym(&mut out, text_sym_name_off, STB_LOCAL, STT_SECTION, SHN_TEXT, 0, 0);
    for (func, name_off) in input.functions.iter().zip(&func_name_offs) {
        push_sym(&mut out, *name_off, STB_GLOBAL, STT_FUNC, SHN_TEXT, func.offset, func.size);
    }

    out.extend_from_slice(SHSTRTAB);
    out.resize(shoff, 0);

    push_shdr(&mut out, 0, SHT_NULL, 0, 0, 0, 0, 0, 0, 0); // mandatory null section
    push_shdr(
        &mut out,
        SHNAME_TEXT as u32,
        SHT_PROGBITS,
        SHF_ALLOC | SHF_EXECINSTR,
        text_off as u64,
        text_size as u64,
        0,
        0,
        8,
        0,
    );
    push_shdr(
        &mut out,
        SHNAME_STRTAB as u32,
        SHT_STRTAB,
        SHF_STRINGS | SHF_ALLOC,
        strtab_off as u64,
        strtab_size as u64,
        0,
        0,
        1,
        0,
    );
    push_shdr(
        &mut out,
        SHNAME_SYMTAB as u32,
        SHT_SYMTAB,
        SHF_ALLOC,
        symtab_off as u64,
        symtab_size as u64,
        SHN_STRTAB as u32,
        2, // index of first non-local symbol
        8,
        SYM_SIZE as u64,
    );
    push_shdr(
        &mut out,
        SHNAME_SHSTRTAB as u32,
        SHT_STRTAB,
        SHF_STRINGS | SHF_ALLOC,
        shstrtab_off as u64,
        shstrtab_size as u64,
        0,
        0,
        1,
        0,
    );

    out
}
