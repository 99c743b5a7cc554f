// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The loader's per-method instruction vocabulary.
//!
//! Only opcode families that can move object references are
//! distinguished; everything else collapses into [`Insn::Other`].

use super::handles::{ClassHdl, FieldHdl, MethodHdl, RegIdx};

/// One instruction of a method's instruction graph, tagged by family.
#[derive(Clone, Debug)]
pub enum Insn {
    /// Pseudo-instruction at graph index 0.
    Entry,
    /// Pseudo-instruction at graph index N-1.
    Exit,
    /// `move-object*` and `move-result-object`. The loader encodes
    /// `move-result-object` with `src == RegIdx::RESULT`; the data-flow
    /// edge from the preceding invoke resolves it to the callsite.
    Move { dst: RegIdx, src: RegIdx },
    /// `return-object`.
    ReturnObject { src: RegIdx },
    /// `check-cast`.
    CheckCast { reg: RegIdx, class: ClassHdl },
    /// `const-string` / `const-string/jumbo`.
    ConstString { dst: RegIdx },
    /// `const-class`.
    ConstClass { dst: RegIdx, class: ClassHdl },
    /// `new-instance`.
    NewInstance { dst: RegIdx, class: ClassHdl },
    /// `new-array`.
    NewArray { dst: RegIdx, class: ClassHdl },
    /// `filled-new-array*`. Not modelled.
    FilledNewArray { args: Vec<RegIdx> },
    /// `aget-object`.
    AGet { dst: RegIdx, array: RegIdx, index: RegIdx },
    /// `aput-object`.
    APut { src: RegIdx, array: RegIdx, index: RegIdx },
    /// `iget-object` (and the sibling `iget-*` forms; the field
    /// descriptor decides whether an edge is emitted).
    IGet { dst: RegIdx, object: RegIdx, field: FieldHdl },
    /// `iput-object`.
    IPut { src: RegIdx, object: RegIdx, field: FieldHdl },
    /// `sget-object`.
    SGet { dst: RegIdx, field: FieldHdl },
    /// `sput-object`.
    SPut { src: RegIdx, field: FieldHdl },
    /// `invoke-*`. `args` lists the actual argument registers with one
    /// entry per register slot (a wide argument occupies two entries;
    /// the receiver of a non-static call occupies slot 0). The loader
    /// expands both the list and the range encodings into this form.
    Invoke {
        kind: InvokeKind,
        method: MethodHdl,
        args: Vec<RegIdx>,
    },
    /// `invoke-*-quick`. Not modelled.
    InvokeQuick,
    /// Any instruction that cannot move an object reference.
    Other,
}

/// Dispatch flavour of an `invoke-*` instruction.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

impl InvokeKind {
    /// True when the receiver is dispatched through the vtable, i.e.
    /// when the receiver register feeds an on-the-fly refinement.
    pub fn is_virtual_dispatch(self) -> bool {
        matches!(self, InvokeKind::Virtual | InvokeKind::Interface)
    }
}
