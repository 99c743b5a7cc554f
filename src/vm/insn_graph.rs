// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Per-method instruction graph.
//!
//! Vertices are indexed 0..N-1 with 0 the entry and N-1 the exit
//! pseudo-instruction. Control-flow edges give the instruction order;
//! data-flow edges, labelled with a register, connect a definition to
//! each use it reaches. The data-flow relation is computed by the
//! loader; the analysis only reads it back through [`InsnGraph::reaching_defs`].

use petgraph::graph::{DefaultIx, Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::handles::RegIdx;
use super::insn::Insn;

/// Edge of the instruction graph.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum InsnEdge {
    /// Execution may continue from the source to the target.
    Control,
    /// The register written at the source is read, unclobbered, at the
    /// target.
    DataFlow(RegIdx),
}

/// The instruction graph of one method.
#[derive(Clone, Debug)]
pub struct InsnGraph {
    graph: Graph<Insn, InsnEdge, petgraph::Directed, DefaultIx>,
}

impl Default for InsnGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl InsnGraph {
    pub fn new() -> Self {
        InsnGraph { graph: Graph::new() }
    }

    /// Number of instructions, entry/exit pseudo-instructions included.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Index of the exit pseudo-instruction. Zero for a bodyless method.
    pub fn exit_idx(&self) -> u16 {
        (self.graph.node_count().saturating_sub(1)) as u16
    }

    /// Appends an instruction, returning its index.
    pub fn push(&mut self, insn: Insn) -> u16 {
        let id = self.graph.add_node(insn);
        id.index() as u16
    }

    pub fn add_control_edge(&mut self, from: u16, to: u16) {
        self.graph
            .add_edge(Self::node(from), Self::node(to), InsnEdge::Control);
    }

    /// Records that the definition of `reg` at `def` reaches `use_site`.
    pub fn add_data_flow_edge(&mut self, def: u16, use_site: u16, reg: RegIdx) {
        self.graph
            .add_edge(Self::node(def), Self::node(use_site), InsnEdge::DataFlow(reg));
    }

    pub fn insn(&self, idx: u16) -> &Insn {
        &self.graph[Self::node(idx)]
    }

    /// Iterates instructions in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Insn)> {
        self.graph
            .node_indices()
            .map(move |id| (id.index() as u16, &self.graph[id]))
    }

    /// The indices of the instructions whose definition of `reg` reaches
    /// the instruction at `at`.
    pub fn reaching_defs(&self, at: u16, reg: RegIdx) -> impl Iterator<Item = u16> + '_ {
        self.graph
            .edges_directed(Self::node(at), Direction::Incoming)
            .filter(move |e| *e.weight() == InsnEdge::DataFlow(reg))
            .map(|e| e.source().index() as u16)
    }

    fn node(idx: u16) -> NodeIndex<DefaultIx> {
        NodeIndex::new(idx as usize)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reaching_defs_filters_by_register() {
        let mut g = InsnGraph::new();
        let entry = g.push(Insn::Entry);
        let d0 = g.push(Insn::Other);
        let d1 = g.push(Insn::Other);
        let use_site = g.push(Insn::Other);
        let exit = g.push(Insn::Exit);
        g.add_control_edge(entry, d0);
        g.add_control_edge(d0, d1);
        g.add_control_edge(d1, use_site);
        g.add_control_edge(use_site, exit);
        g.add_data_flow_edge(d0, use_site, RegIdx(0));
        g.add_data_flow_edge(d1, use_site, RegIdx(1));

        let defs: Vec<u16> = g.reaching_defs(use_site, RegIdx(0)).collect();
        assert_eq!(defs, vec![d0]);
        let defs: Vec<u16> = g.reaching_defs(use_site, RegIdx(1)).collect();
        assert_eq!(defs, vec![d1]);
        assert!(g.reaching_defs(use_site, RegIdx(2)).next().is_none());
    }

    #[test]
    fn merge_point_sees_both_definitions() {
        // Two definitions of v0 on different paths reaching one use.
        let mut g = InsnGraph::new();
        let entry = g.push(Insn::Entry);
        let a = g.push(Insn::Other);
        let b = g.push(Insn::Other);
        let join = g.push(Insn::Other);
        let exit = g.push(Insn::Exit);
        g.add_control_edge(entry, a);
        g.add_control_edge(entry, b);
        g.add_control_edge(a, join);
        g.add_control_edge(b, join);
        g.add_control_edge(join, exit);
        g.add_data_flow_edge(a, join, RegIdx(0));
        g.add_data_flow_edge(b, join, RegIdx(0));

        let mut defs: Vec<u16> = g.reaching_defs(join, RegIdx(0)).collect();
        defs.sort_unstable();
        assert_eq!(defs, vec![a, b]);
        assert_eq!(g.exit_idx(), exit);
    }
}
