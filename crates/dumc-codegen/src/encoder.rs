//! Raw x86-64 instruction encoder.
//!
//! Every method appends a complete, already-encoded instruction to the
//! growable `.text` buffer. There is no set-then-flush staging area: the
//! value this module owns *is* the buffer, passed around by mutable
//! reference per the System V rewrite note on the original's global
//! encoder state.

/// General-purpose 64-bit register, numbered per the standard x86-64
/// encoding (`RAX..R15 = 0..15`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    pub const COUNT: usize = 16;

    pub fn from_index(i: u8) -> Reg {
        // SAFETY-free: all values 0..16 are covered by the enum's discriminants.
        match i {
            0 => Reg::Rax,
            1 => Reg::Rcx,
            2 => Reg::Rdx,
            3 => Reg::Rbx,
            4 => Reg::Rsp,
            5 => Reg::Rbp,
            6 => Reg::Rsi,
            7 => Reg::Rdi,
            8 => Reg::R8,
            9 => Reg::R9,
            10 => Reg::R10,
            11 => Reg::R11,
            12 => Reg::R12,
            13 => Reg::R13,
            14 => Reg::R14,
            15 => Reg::R15,
            other => panic!("register index {other} out of range"),
        }
    }

    #[inline]
    fn low3(self) -> u8 {
        (self as u8) & 7
    }

    #[inline]
    fn rex_bit(self) -> u8 {
        ((self as u8) >> 3) & 1
    }
}

/// Integer argument registers, in System V AMD64 order.
pub const PARAM_REGS: [Reg; 6] = [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

/// Callee-saved registers that every prologue spills and every epilogue restores.
pub const PRESERVED_REGS: [Reg; 5] = [Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15];

/// Condition codes used by the two-byte `Jcc rel32` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cc {
    E,
    Ne,
    L,
    Le,
    G,
    Ge,
}

impl Cc {
    fn bits(self) -> u8 {
        match self {
            Cc::E => 0x4,
            Cc::Ne => 0x5,
            Cc::L => 0xC,
            Cc::Le => 0xE,
            Cc::G => 0xF,
            Cc::Ge => 0xD,
        }
    }
}

/// The growable `.text` buffer plus the instruction encoder writing into it.
///
/// Only `RBP`-relative memory operands are needed anywhere in this
/// compiler (there is no heap, no globals, no arbitrary addressing), so
/// the memory-operand helpers below hard-code `RBP` as the base rather than
/// implementing a general SIB-capable effective-address encoder.
#[derive(Debug, Default)]
pub struct Encoder {
    text: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.text.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.text
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.text
    }

    fn rex(&mut self, w: bool, r: u8, x: u8, b: u8) {
        if !(w || r != 0 || x != 0 || b != 0) {
            return;
        }
        let mut byte = 0x40;
        if w {
            byte |= 0x08;
        }
        if r != 0 {
            byte |= 0x04;
        }
        if x != 0 {
            byte |= 0x02;
        }
        if b != 0 {
            byte |= 0x01;
        }
        self.text.push(byte);
    }

    fn modrm(mod_: u8, reg: u8, rm: u8) -> u8 {
        ((mod_ & 3) << 6) | ((reg & 7) << 3) | (rm & 7)
    }

    /// `mod`+disp for an `[RBP + disp]` operand; `RBP`'s low3 (`101`) can
    /// never be combined with `mod=00` (that encodes RIP-relative), so disp8
    /// is the smallest mode ever used here.
    fn modrm_rbp_disp(&mut self, reg_field: u8, disp: i32) {
        let rm = Reg::Rbp.low3();
        if (-128..=127).contains(&disp) {
            self.text.push(Self::modrm(0b01, reg_field, rm));
            self.text.push(disp as i8 as u8);
        } else {
            self.text.push(Self::modrm(0b10, reg_field, rm));
            self.text.extend_from_slice(&disp.to_le_bytes());
        }
    }

    pub fn push(&mut self, reg: Reg) {
        self.rex(false, 0, 0, reg.rex_bit());
        self.text.push(0x50 + reg.low3());
    }

    pub fn pop(&mut self, reg: Reg) {
        self.rex(false, 0, 0, reg.rex_bit());
        self.text.push(0x58 + reg.low3());
    }

    pub fn ret(&mut self) {
        self.text.push(0xC3);
    }

    /// `mov dst, imm64` — `0xB8+rd`, REX.W.
    pub fn mov_imm64(&mut self, dst: Reg, imm: i64) {
        self.rex(true, 0, 0, dst.rex_bit());
        self.text.push(0xB8 + dst.low3());
        self.text.extend_from_slice(&imm.to_le_bytes());
    }

    /// `mov dst, src` — `0x89 r/m64, r64`.
    pub fn mov_reg_reg(&mut self, dst: Reg, src: Reg) {
        if dst == src {
            return;
        }
        self.rex(true, src.rex_bit(), 0, dst.rex_bit());
        self.text.push(0x89);
        self.text.push(Self::modrm(0b11, src.low3(), dst.low3()));
    }

    /// `mov dst, [RBP + disp]` — `0x8B r64, r/m64`.
    pub fn mov_mem_to_reg(&mut self, dst: Reg, disp: i32) {
        self.rex(true, dst.rex_bit(), 0, Reg::Rbp.rex_bit());
        self.text.push(0x8B);
        self.modrm_rbp_disp(dst.low3(), disp);
    }

    /// `mov [RBP + disp], src` — `0x89 r/m64, r64`.
    pub fn mov_reg_to_mem(&mut self, disp: i32, src: Reg) {
        self.rex(true, src.rex_bit(), 0, Reg::Rbp.rex_bit());
        self.text.push(0x89);
        self.modrm_rbp_disp(src.low3(), disp);
    }

    /// `add dst, src` — `0x03 r64, r/m64`.
    pub fn add_reg_reg(&mut self, dst: Reg, src: Reg) {
        self.rex(true, dst.rex_bit(), 0, src.rex_bit());
        self.text.push(0x03);
        self.text.push(Self::modrm(0b11, dst.low3(), src.low3()));
    }

    /// `sub dst, src` — `0x2B r64, r/m64`.
    pub fn sub_reg_reg(&mut self, dst: Reg, src: Reg) {
        self.rex(true, dst.rex_bit(), 0, src.rex_bit());
        self.text.push(0x2B);
        self.text.push(Self::modrm(0b11, dst.low3(), src.low3()));
    }

    /// `sub dst, imm32` — `0x81 /5`.
    pub fn sub_reg_imm32(&mut self, dst: Reg, imm32: i32) {
        self.rex(true, 0, 0, dst.rex_bit());
        self.text.push(0x81);
        self.text.push(Self::modrm(0b11, 5, dst.low3()));
        self.text.extend_from_slice(&imm32.to_le_bytes());
    }

    /// `imul dst, src` — two-byte `0x0F 0xAF r64, r/m64`.
    pub fn imul_reg_reg(&mut self, dst: Reg, src: Reg) {
        self.rex(true, dst.rex_bit(), 0, src.rex_bit());
        self.text.push(0x0F);
        self.text.push(0xAF);
        self.text.push(Self::modrm(0b11, dst.low3(), src.low3()));
    }

    /// `div divisor` — `0xF7 /6`; implicitly divides `RDX:RAX` by `divisor`,
    /// leaving the quotient in `RAX` and the remainder in `RDX`.
    pub fn div_reg(&mut self, divisor: Reg) {
        self.rex(true, 0, 0, divisor.rex_bit());
        self.text.push(0xF7);
        self.text.push(Self::modrm(0b11, 6, divisor.low3()));
    }

    /// `cmp a, b` — `0x3B r64, r/m64`; sets flags for `a - b`.
    pub fn cmp_reg_reg(&mut self, a: Reg, b: Reg) {
        self.rex(true, a.rex_bit(), 0, b.rex_bit());
        self.text.push(0x3B);
        self.text.push(Self::modrm(0b11, a.low3(), b.low3()));
    }

    /// `cmp reg, imm8` — `0x83 /7`.
    pub fn cmp_reg_imm8(&mut self, reg: Reg, imm8: i8) {
        self.rex(true, 0, 0, reg.rex_bit());
        self.text.push(0x83);
        self.text.push(Self::modrm(0b11, 7, reg.low3()));
        self.text.push(imm8 as u8);
    }

    /// `call rel32` with an already-known displacement (no fixup needed:
    /// the callee has already been emitted by the time this is called).
    pub fn call_rel32(&mut self, rel32: i32) {
        self.text.push(0xE8);
        self.text.extend_from_slice(&rel32.to_le_bytes());
    }

    /// Emits `jmp` with a placeholder `rel32`, returning the instruction's
    /// start offset for later registration with the jump-fixup table.
    pub fn jmp_rel32(&mut self) -> usize {
        let site = self.text.len();
        self.text.push(0xE9);
        self.text.extend_from_slice(&0i32.to_le_bytes());
        site
    }

    /// Emits `Jcc` with a placeholder `rel32`, returning the instruction's
    /// start offset.
    pub fn jcc_rel32(&mut self, cc: Cc) -> usize {
        let site = self.text.len();
        self.text.push(0x0F);
        self.text.push(0x80 | cc.bits());
        self.text.extend_from_slice(&0i32.to_le_bytes());
        site
    }

    /// Rewrites the `rel32` of the jump/Jcc/call starting at `site` so that
    /// it lands on `target`. `instr_len` is 5 for `jmp`/`call`, 6 for `Jcc`.
    pub fn patch_rel32(&mut self, site: usize, target: usize, instr_len: usize) {
        let rel = target as i64 - (site as i64 + instr_len as i64);
        let rel = rel as i32;
        let imm_at = site + instr_len - 4;
        self.text[imm_at..imm_at + 4].copy_from_slice(&rel.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_imm64_sets_rex_w_and_b_for_high_register() {
        let mut enc = Encoder::new();
        enc.mov_imm64(Reg::R10, 42);
        let bytes = enc.bytes();
        assert_eq!(bytes[0], 0x49); // REX.W | REX.B
        assert_eq!(bytes[1], 0xB8 + (Reg::R10 as u8 & 7));
        assert_eq!(bytes.len(), 10);
    }

    #[test]
    fn jmp_then_patch_computes_correct_displacement() {
        let mut enc = Encoder::new();
        let site = enc.jmp_rel32();
        enc.ret(); // pad so target != site
        let target = enc.position();
        enc.patch_rel32(site, target, 5);
        let rel = i32::from_le_bytes(enc.bytes()[site + 1..site + 5].try_into().unwrap());
        assert_eq!(rel, (target as i64 - (site as i64 + 5)) as i32);
    }

    #[test]
    fn mov_reg_to_mem_round_trips_through_disp8_and_disp32() {
        let mut enc = Encoder::new();
        enc.mov_reg_to_mem(-8, Reg::Rax);
        enc.mov_reg_to_mem(-400, Reg::Rax);
        // first uses disp8 (REX + opcode + modrm + 1 byte disp = 4 bytes)
        // second uses disp32 (REX + opcode + modrm + 4 byte disp = 7 bytes)
        assert_eq!(enc.bytes().len(), 4 + 7);
    }
}
