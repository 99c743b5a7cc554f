// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::VecDeque;

use thiserror::Error;

use crate::graph::pag::{PAGEdgeId, PAGNodeId, PAG};
use crate::pts_set::points_to::SortedPointsToSet;
use crate::vm::handles::{FieldHdl, InsnHdl, MethodHdl};

pub mod andersen;
pub mod propagator;

pub use andersen::AndersenPTA;

pub type NodeId = PAGNodeId;
pub type EdgeId = PAGEdgeId;
pub type PointsTo<T> = SortedPointsToSet<T>;

pub trait PointerAnalysis {
    fn analyze(&mut self) -> Result<(), AnalysisError>;
}

/// One expansion of a method body: the invoking callsite (`None` for
/// the entry method and for class initialisers) and the method.
///
/// A method reached from two callsites is analysed once per callsite;
/// re-entry from the same callsite is suppressed.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Invocation {
    pub callsite: Option<InsnHdl>,
    pub method: MethodHdl,
}

impl Invocation {
    pub fn new(callsite: Option<InsnHdl>, method: MethodHdl) -> Self {
        Invocation { callsite, method }
    }
}

/// Fatal analysis failures. Recoverable misses (unresolved classes,
/// instance fields and invoke targets) are logged and skipped instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("entry method {0:?} is not in the image")]
    EntryMethodNotFound(MethodHdl),

    /// Static references are the narrowest flow in the program; losing
    /// one would silently drop class-global flow.
    #[error("static field {field:?} referenced at {insn:?} is not in the image")]
    StaticFieldNotFound { field: FieldHdl, insn: InsnHdl },

    #[error("empty type descriptor on {owner}")]
    EmptyDescriptor { owner: String },

    #[error("method {method:?} declares ins_size {ins_size} exceeding registers_size {registers_size}")]
    InconsistentRegisterCount {
        method: MethodHdl,
        registers_size: u16,
        ins_size: u16,
    },

    #[error("invoke at {insn:?} passes {got} argument slots but callee {method:?} expects {want}")]
    ArgumentSlotMismatch {
        insn: InsnHdl,
        method: MethodHdl,
        got: usize,
        want: usize,
    },
}

/// FIFO worklist of PAG vertices, guarded by each vertex's dirty bit so
/// a vertex is enqueued at most once at a time.
pub struct Worklist {
    queue: VecDeque<NodeId>,
}

impl Default for Worklist {
    fn default() -> Self {
        Self::new()
    }
}

impl Worklist {
    pub fn new() -> Self {
        Worklist {
            queue: VecDeque::new(),
        }
    }

    pub fn push(&mut self, pag: &mut PAG, id: NodeId) {
        if !pag.node(id).dirty {
            pag.node_mut(id).dirty = true;
            self.queue.push_back(id);
        }
    }

    pub fn pop(&mut self, pag: &mut PAG) -> Option<NodeId> {
        let id = self.queue.pop_front()?;
        pag.node_mut(id).dirty = false;
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
