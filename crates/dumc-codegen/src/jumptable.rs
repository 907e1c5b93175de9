//! Pending-branch fixup table.

use crate::encoder::Encoder;

/// Symbolic target of a pending branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    BlockStart,
    BlockEnd,
    LoopStart,
    Ret,
    /// Intermediate short-circuit target inside a nested `&&`/`||` chain;
    /// doubles per nesting level so sibling conjunctions never collide.
    NextCond(u32),
}

/// Which branch form was emitted at a pending site, and therefore how long
/// it is in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Jmp,
    Jcc,
}

impl OpKind {
    fn instr_len(self) -> usize {
        match self {
            OpKind::Jmp => 5,
            OpKind::Jcc => 6,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    site: usize,
    label: Label,
    kind: OpKind,
}

/// A vector of pending `(site, label, kind)` fixups, scanned linearly on
/// resolve. Expected occupancy is at most tens of entries per function, so
/// a linked list buys nothing over a flat `Vec`.
#[derive(Debug, Default)]
pub struct JumpTable {
    entries: Vec<Entry>,
}

impl JumpTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, site: usize, label: Label, kind: OpKind) {
        self.entries.push(Entry { site, label, kind });
    }

    /// Patches every pending site registered under `label` to branch to
    /// `target`, then drops those entries.
    pub fn resolve(&mut self, label: Label, target: usize, encoder: &mut Encoder) {
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].label == label {
                let entry = self.entries.remove(i);
                encoder.patch_rel32(entry.site, target, entry.kind.instr_len());
            } else {
                i += 1;
            }
        }
    }

    /// Moves every remaining entry into `dst`. Used to bubble fixups (chiefly
    /// `Ret`) that a nested construct cannot resolve itself out to the
    /// enclosing scope's table.
    pub fn merge(&mut self, dst: &mut JumpTable) {
        dst.entries.append(&mut self.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_patches_matching_entries_and_leaves_others() {
        let mut enc = Encoder::new();
        let a = enc.jmp_rel32();
        let b = enc.jmp_rel32();
        let mut table = JumpTable::new();
        table.insert(a, Label::BlockEnd, OpKind::Jmp);
        table.insert(b, Label::Ret, OpKind::Jmp);
        let target = enc.position();
        table.resolve(Label::BlockEnd, target, &mut enc);
        assert!(!table.is_empty());
        let rel = i32::from_le_bytes(enc.bytes()[a + 1..a + 5].try_into().unwrap());
        assert_eq!(rel, (target as i64 - (a as i64 + 5)) as i32);
    }

    #[test]
    fn merge_moves_all_entries() {
        let mut inner = JumpTable::new();
        inner.insert(0, Label::Ret, OpKind::Jmp);
        inner.insert(4, Label::Ret, OpKind::Jmp);
        let mut outer = JumpTable::new();
        inner.merge(&mut outer);
        assert!(inner.is_empty());
        assert!(!outer.is_empty());
    }
}
