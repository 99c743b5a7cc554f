// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The Pointer Assignment Graph.
//!
//! Vertices are abstract pointer-valued locations; an edge `u -> v`
//! constrains `pts(u) ⊆ pts(v)`. Vertices are interned: for every
//! (kind, carrier, context) there is at most one vertex, created on
//! first reference and never destroyed.

use std::collections::HashMap;

use petgraph::graph::{DefaultIx, EdgeIndex, Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::pts_set::points_to::{PointsToSet, SortedPointsToSet};
use crate::vm::handles::{FieldHdl, InsnHdl, RegHdl};

// Unique identifiers for graph nodes and edges.
pub type PAGNodeId = NodeIndex<DefaultIx>;
pub type PAGEdgeId = EdgeIndex<DefaultIx>;

/// The seven vertex shapes, dispatched by pattern match.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum PAGVertexEnum {
    /// A local register slot at a program point.
    Reg(RegHdl),
    /// The abstract heap object allocated at this site.
    Alloc(InsnHdl),
    /// A field reached through a base register.
    RegDotField(RegHdl, FieldHdl),
    /// A field of a concrete allocation.
    AllocDotField(InsnHdl, FieldHdl),
    /// The aggregate "any element" slot through a base register.
    RegDotArray(RegHdl),
    /// The aggregate "any element" slot of a concrete allocation.
    AllocDotArray(InsnHdl),
    /// A class-static reference field.
    StaticField(FieldHdl),
}

/// Edge labels. All labels propagate points-to along the arrow; they
/// retain provenance and keep store/load edges distinguishable.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PAGEdgeEnum {
    AllocPAGEdge,
    AssignPAGEdge,
    IStorePAGEdge,
    ILoadPAGEdge,
    AStorePAGEdge,
    ALoadPAGEdge,
    SStorePAGEdge,
    SLoadPAGEdge,
}

pub struct PAGEdge {
    pub kind: PAGEdgeEnum,
}

/// A vertex and its mutable analysis state.
pub struct PAGNode {
    pub vertex: PAGVertexEnum,
    /// Invoking callsite for Reg-family vertices analysed under a
    /// context; `None` (no context) for Alloc-family and StaticField
    /// vertices.
    pub context: Option<InsnHdl>,
    /// Union-find representative; only the representative's
    /// `points_to_set` is authoritative.
    pub(crate) parent: PAGNodeId,
    pub(crate) rank: u32,
    pub(crate) points_to_set: SortedPointsToSet<PAGNodeId>,
    /// RegDotField/RegDotArray vertices observing this vertex as their
    /// base. Pure indices; no ownership implied.
    pub(crate) dereferenced_by: SortedPointsToSet<PAGNodeId>,
    /// Presence bit for the solver worklist.
    pub(crate) dirty: bool,
    /// Set when this register is the receiver of a virtual invoke.
    pub(crate) virtual_invoke_receiver: bool,
}

impl PAGNode {
    fn new(vertex: PAGVertexEnum, context: Option<InsnHdl>) -> Self {
        PAGNode {
            vertex,
            context,
            parent: PAGNodeId::end(),
            rank: 0,
            points_to_set: SortedPointsToSet::new(),
            dereferenced_by: SortedPointsToSet::new(),
            dirty: false,
            virtual_invoke_receiver: false,
        }
    }

    pub fn points_to_set(&self) -> &SortedPointsToSet<PAGNodeId> {
        &self.points_to_set
    }

    pub fn dereferenced_by(&self) -> &SortedPointsToSet<PAGNodeId> {
        &self.dereferenced_by
    }
}

pub struct PAG {
    /// The graph structure capturing subset constraints between nodes.
    graph: Graph<PAGNode, PAGEdge>,
    // One lookup table per vertex kind.
    reg_lut: HashMap<(RegHdl, Option<InsnHdl>), PAGNodeId>,
    alloc_lut: HashMap<InsnHdl, PAGNodeId>,
    reg_dot_field_lut: HashMap<(RegHdl, FieldHdl, Option<InsnHdl>), PAGNodeId>,
    alloc_dot_field_lut: HashMap<(InsnHdl, FieldHdl), PAGNodeId>,
    reg_dot_array_lut: HashMap<(RegHdl, Option<InsnHdl>), PAGNodeId>,
    alloc_dot_array_lut: HashMap<InsnHdl, PAGNodeId>,
    static_field_lut: HashMap<FieldHdl, PAGNodeId>,
}

impl Default for PAG {
    fn default() -> Self {
        Self::new()
    }
}

impl PAG {
    pub fn new() -> Self {
        PAG {
            graph: Graph::new(),
            reg_lut: HashMap::new(),
            alloc_lut: HashMap::new(),
            reg_dot_field_lut: HashMap::new(),
            alloc_dot_field_lut: HashMap::new(),
            reg_dot_array_lut: HashMap::new(),
            alloc_dot_array_lut: HashMap::new(),
            static_field_lut: HashMap::new(),
        }
    }

    /// Returns a reference to the pag graph.
    #[inline]
    pub fn graph(&self) -> &Graph<PAGNode, PAGEdge> {
        &self.graph
    }

    pub fn node(&self, id: PAGNodeId) -> &PAGNode {
        self.graph.node_weight(id).unwrap()
    }

    pub(crate) fn node_mut(&mut self, id: PAGNodeId) -> &mut PAGNode {
        self.graph.node_weight_mut(id).unwrap()
    }

    fn add_node(&mut self, vertex: PAGVertexEnum, context: Option<InsnHdl>) -> PAGNodeId {
        let id = self.graph.add_node(PAGNode::new(vertex, context));
        self.graph[id].parent = id;
        id
    }

    /// Interns the register vertex for `(hdl, context)`.
    pub fn reg_vertex(&mut self, hdl: RegHdl, context: Option<InsnHdl>) -> PAGNodeId {
        if let Some(&id) = self.reg_lut.get(&(hdl, context)) {
            return id;
        }
        let id = self.add_node(PAGVertexEnum::Reg(hdl), context);
        self.reg_lut.insert((hdl, context), id);
        id
    }

    /// Interns the allocation vertex for the site `hdl`. The vertex's
    /// own points-to set is seeded with itself, once and forever.
    pub fn alloc_vertex(&mut self, hdl: InsnHdl) -> PAGNodeId {
        if let Some(&id) = self.alloc_lut.get(&hdl) {
            return id;
        }
        let id = self.add_node(PAGVertexEnum::Alloc(hdl), None);
        self.graph[id].points_to_set.insert(id);
        self.alloc_lut.insert(hdl, id);
        id
    }

    pub fn reg_dot_field_vertex(
        &mut self,
        base: RegHdl,
        field: FieldHdl,
        context: Option<InsnHdl>,
    ) -> PAGNodeId {
        if let Some(&id) = self.reg_dot_field_lut.get(&(base, field, context)) {
            return id;
        }
        let id = self.add_node(PAGVertexEnum::RegDotField(base, field), context);
        self.reg_dot_field_lut.insert((base, field, context), id);
        id
    }

    pub fn alloc_dot_field_vertex(&mut self, alloc: InsnHdl, field: FieldHdl) -> PAGNodeId {
        if let Some(&id) = self.alloc_dot_field_lut.get(&(alloc, field)) {
            return id;
        }
        let id = self.add_node(PAGVertexEnum::AllocDotField(alloc, field), None);
        self.alloc_dot_field_lut.insert((alloc, field), id);
        id
    }

    pub fn reg_dot_array_vertex(&mut self, base: RegHdl, context: Option<InsnHdl>) -> PAGNodeId {
        if let Some(&id) = self.reg_dot_array_lut.get(&(base, context)) {
            return id;
        }
        let id = self.add_node(PAGVertexEnum::RegDotArray(base), context);
        self.reg_dot_array_lut.insert((base, context), id);
        id
    }

    pub fn alloc_dot_array_vertex(&mut self, alloc: InsnHdl) -> PAGNodeId {
        if let Some(&id) = self.alloc_dot_array_lut.get(&alloc) {
            return id;
        }
        let id = self.add_node(PAGVertexEnum::AllocDotArray(alloc), None);
        self.alloc_dot_array_lut.insert(alloc, id);
        id
    }

    pub fn static_field_vertex(&mut self, field: FieldHdl) -> PAGNodeId {
        if let Some(&id) = self.static_field_lut.get(&field) {
            return id;
        }
        let id = self.add_node(PAGVertexEnum::StaticField(field), None);
        self.static_field_lut.insert(field, id);
        id
    }

    /// Looks up the register vertex without interning it.
    pub fn lookup_reg_vertex(&self, hdl: RegHdl, context: Option<InsnHdl>) -> Option<PAGNodeId> {
        self.reg_lut.get(&(hdl, context)).copied()
    }

    pub fn lookup_alloc_vertex(&self, hdl: InsnHdl) -> Option<PAGNodeId> {
        self.alloc_lut.get(&hdl).copied()
    }

    pub fn lookup_static_field_vertex(&self, field: FieldHdl) -> Option<PAGNodeId> {
        self.static_field_lut.get(&field).copied()
    }

    pub fn lookup_alloc_dot_field_vertex(
        &self,
        alloc: InsnHdl,
        field: FieldHdl,
    ) -> Option<PAGNodeId> {
        self.alloc_dot_field_lut.get(&(alloc, field)).copied()
    }

    pub fn lookup_alloc_dot_array_vertex(&self, alloc: InsnHdl) -> Option<PAGNodeId> {
        self.alloc_dot_array_lut.get(&alloc).copied()
    }

    /// The allocation site carried by an Alloc vertex.
    pub fn alloc_site(&self, id: PAGNodeId) -> Option<InsnHdl> {
        match self.graph[id].vertex {
            PAGVertexEnum::Alloc(hdl) => Some(hdl),
            _ => None,
        }
    }

    /// Adds an edge unconditionally; parallel edges are tolerated.
    pub fn add_edge(&mut self, src: PAGNodeId, dst: PAGNodeId, kind: PAGEdgeEnum) -> PAGEdgeId {
        self.graph.add_edge(src, dst, PAGEdge { kind })
    }

    /// Adds an edge unless the two vertices are already adjacent.
    /// Returns the edge id only when an edge was added.
    pub fn ensure_edge(
        &mut self,
        src: PAGNodeId,
        dst: PAGNodeId,
        kind: PAGEdgeEnum,
    ) -> Option<PAGEdgeId> {
        if self.graph.find_edge(src, dst).is_some() {
            return None;
        }
        Some(self.graph.add_edge(src, dst, PAGEdge { kind }))
    }

    pub fn in_neighbors(&self, id: PAGNodeId) -> impl Iterator<Item = PAGNodeId> + '_ {
        self.graph.neighbors_directed(id, Direction::Incoming)
    }

    pub fn out_neighbors(&self, id: PAGNodeId) -> impl Iterator<Item = PAGNodeId> + '_ {
        self.graph.neighbors_directed(id, Direction::Outgoing)
    }

    /// Iterates all edges as `(src, dst, kind)` triples.
    pub fn edges(&self) -> impl Iterator<Item = (PAGNodeId, PAGNodeId, PAGEdgeEnum)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), e.weight().kind))
    }

    /// Records `dereferencer` as observing `base` as its base pointer.
    pub fn record_dereferencer(&mut self, base: PAGNodeId, dereferencer: PAGNodeId) {
        self.node_mut(base).dereferenced_by.insert(dereferencer);
    }

    pub(crate) fn set_virtual_invoke_receiver(&mut self, id: PAGNodeId) {
        self.node_mut(id).virtual_invoke_receiver = true;
    }

    /// Union-find lookup with path compression.
    pub fn find(&mut self, id: PAGNodeId) -> PAGNodeId {
        let mut root = id;
        while self.graph[root].parent != root {
            root = self.graph[root].parent;
        }
        let mut cur = id;
        while self.graph[cur].parent != root {
            let next = self.graph[cur].parent;
            self.graph[cur].parent = root;
            cur = next;
        }
        root
    }

    /// Non-compressing representative walk for read-only paths.
    pub fn representative(&self, id: PAGNodeId) -> PAGNodeId {
        let mut root = id;
        while self.graph[root].parent != root {
            root = self.graph[root].parent;
        }
        root
    }

    /// Union by rank. The losing representative's points-to set is
    /// merged into the winner, which stays the only authoritative set.
    /// Kept for SCC collapse; the live algorithm never calls it.
    pub fn union(&mut self, a: PAGNodeId, b: PAGNodeId) -> PAGNodeId {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }
        let (winner, loser) = if self.graph[ra].rank >= self.graph[rb].rank {
            (ra, rb)
        } else {
            (rb, ra)
        };
        if self.graph[winner].rank == self.graph[loser].rank {
            self.graph[winner].rank += 1;
        }
        self.graph[loser].parent = winner;
        let (w, l) = self.graph.index_twice_mut(winner, loser);
        w.points_to_set.union(&l.points_to_set);
        winner
    }

    /// The points-to set of `id`'s representative.
    pub fn points_to(&self, id: PAGNodeId) -> &SortedPointsToSet<PAGNodeId> {
        &self.graph[self.representative(id)].points_to_set
    }

    /// Unions the representative `src`'s set into the representative
    /// `dst`'s set. Both arguments must be distinct representatives.
    pub(crate) fn union_points_to(&mut self, dst: PAGNodeId, src: PAGNodeId) -> bool {
        debug_assert_ne!(dst, src);
        let (d, s) = self.graph.index_twice_mut(dst, src);
        d.points_to_set.union(&s.points_to_set)
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    #[inline]
    pub fn num_alloc_vertices(&self) -> usize {
        self.alloc_lut.len()
    }

    #[inline]
    pub fn num_alloc_dot_field_vertices(&self) -> usize {
        self.alloc_dot_field_lut.len()
    }

    #[inline]
    pub fn num_alloc_dot_array_vertices(&self) -> usize {
        self.alloc_dot_array_lut.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::handles::{FieldHdl, InsnHdl, MethodHdl, RegIdx};

    fn reg(m: u32, insn: u16, reg: u16) -> RegHdl {
        RegHdl::new(InsnHdl::new(MethodHdl(m), insn), RegIdx(reg))
    }

    #[test]
    fn interning_is_idempotent_per_kind_and_context() {
        let mut pag = PAG::new();
        let site = InsnHdl::new(MethodHdl(0), 1);
        let ctx = Some(InsnHdl::new(MethodHdl(9), 4));

        let r1 = pag.reg_vertex(reg(0, 1, 0), ctx);
        let r2 = pag.reg_vertex(reg(0, 1, 0), ctx);
        assert_eq!(r1, r2);
        // Same carrier under another context is a different vertex.
        let r3 = pag.reg_vertex(reg(0, 1, 0), None);
        assert_ne!(r1, r3);

        let a1 = pag.alloc_vertex(site);
        let a2 = pag.alloc_vertex(site);
        assert_eq!(a1, a2);

        let f = FieldHdl(7);
        assert_eq!(
            pag.reg_dot_field_vertex(reg(0, 1, 0), f, ctx),
            pag.reg_dot_field_vertex(reg(0, 1, 0), f, ctx)
        );
        assert_eq!(
            pag.alloc_dot_field_vertex(site, f),
            pag.alloc_dot_field_vertex(site, f)
        );
        assert_eq!(
            pag.reg_dot_array_vertex(reg(0, 1, 0), ctx),
            pag.reg_dot_array_vertex(reg(0, 1, 0), ctx)
        );
        assert_eq!(pag.alloc_dot_array_vertex(site), pag.alloc_dot_array_vertex(site));
        assert_eq!(pag.static_field_vertex(f), pag.static_field_vertex(f));
        assert_eq!(pag.num_vertices(), 8);
    }

    #[test]
    fn alloc_vertices_seed_themselves_and_carry_no_context() {
        let mut pag = PAG::new();
        let site = InsnHdl::new(MethodHdl(0), 3);
        let a = pag.alloc_vertex(site);
        let pts: Vec<PAGNodeId> = pag.points_to(a).iter().collect();
        assert_eq!(pts, vec![a]);
        assert_eq!(pag.node(a).context, None);
        assert_eq!(pag.alloc_site(a), Some(site));

        let sf = pag.static_field_vertex(FieldHdl(0));
        assert_eq!(pag.node(sf).context, None);
        assert_eq!(pag.alloc_site(sf), None);
    }

    #[test]
    fn ensure_edge_suppresses_duplicates() {
        let mut pag = PAG::new();
        let a = pag.alloc_vertex(InsnHdl::new(MethodHdl(0), 1));
        let r = pag.reg_vertex(reg(0, 1, 0), None);
        assert!(pag.ensure_edge(a, r, PAGEdgeEnum::AllocPAGEdge).is_some());
        assert!(pag.ensure_edge(a, r, PAGEdgeEnum::AssignPAGEdge).is_none());
        assert_eq!(pag.num_edges(), 1);
        // The reverse direction is a distinct adjacency.
        assert!(pag.ensure_edge(r, a, PAGEdgeEnum::AssignPAGEdge).is_some());
    }

    #[test]
    fn dereferencer_records_stay_sorted_and_unique() {
        let mut pag = PAG::new();
        let base = pag.reg_vertex(reg(0, 1, 0), None);
        let d1 = pag.reg_dot_array_vertex(reg(0, 1, 0), None);
        let d2 = pag.reg_dot_field_vertex(reg(0, 1, 0), FieldHdl(1), None);
        pag.record_dereferencer(base, d2);
        pag.record_dereferencer(base, d1);
        pag.record_dereferencer(base, d2);
        let recorded: Vec<PAGNodeId> = pag.node(base).dereferenced_by().iter().collect();
        let mut expected = vec![d1, d2];
        expected.sort();
        assert_eq!(recorded, expected);
    }

    #[test]
    fn union_find_merges_sets_under_one_representative() {
        let mut pag = PAG::new();
        let a1 = pag.alloc_vertex(InsnHdl::new(MethodHdl(0), 1));
        let a2 = pag.alloc_vertex(InsnHdl::new(MethodHdl(0), 2));
        let r1 = pag.reg_vertex(reg(0, 3, 0), None);
        let r2 = pag.reg_vertex(reg(0, 4, 0), None);
        // Each vertex starts as its own representative.
        assert_eq!(pag.find(r1), r1);

        pag.node_mut(r1).points_to_set.insert(a1);
        pag.node_mut(r2).points_to_set.insert(a2);
        let root = pag.union(r1, r2);
        assert_eq!(pag.find(r1), root);
        assert_eq!(pag.find(r2), root);
        let merged: Vec<PAGNodeId> = pag.points_to(r1).iter().collect();
        assert_eq!(merged, vec![a1, a2]);
    }
}
