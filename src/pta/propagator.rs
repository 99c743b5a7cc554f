// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The key component of the pointer analysis.
//!
//! Propagates points-to sets along the PAG's inclusion edges until the
//! worklist drains. When a base pointer gains allocations, the
//! dereferencer splices concrete field/element vertices into the chains
//! that were previously abstract.

use log::*;

use super::{NodeId, Worklist};
use crate::graph::pag::{PAGEdgeEnum, PAGVertexEnum, PAG};
use crate::pts_set::points_to::PointsToSet;
use crate::util::options::AnalysisOptions;

/// Propagates the points-to information along the PAG edges.
pub struct Propagator<'pta> {
    /// Pointer Assignment Graph.
    pag: &'pta mut PAG,
    /// Worklist for resolution.
    worklist: &'pta mut Worklist,
    options: &'pta AnalysisOptions,
    iterations: usize,
}

impl<'pta> Propagator<'pta> {
    pub fn new(
        pag: &'pta mut PAG,
        worklist: &'pta mut Worklist,
        options: &'pta AnalysisOptions,
    ) -> Self {
        Propagator {
            pag,
            worklist,
            options,
            iterations: 0,
        }
    }

    /// Propagates points-to data until the worklist is empty. Returns
    /// the number of vertices processed.
    pub fn solve_worklist(&mut self) -> usize {
        while let Some(v) = self.worklist.pop(self.pag) {
            self.log_progress();
            self.iterations += 1;

            if !self.update_points_to_set(v) {
                // Points-to set did not change: continue.
                continue;
            }

            self.update_dereferencers(v);

            if self.options.on_the_fly_call_graph && self.pag.node(v).virtual_invoke_receiver {
                // Hook for deferring virtual callee expansion until the
                // receiver's set is populated. Expansion currently
                // happens eagerly at translation time, so there is
                // nothing left to refine here.
            }

            self.update_worklist(v);
        }
        self.iterations
    }

    fn log_progress(&self) {
        let period = self.options.progress_period;
        if period > 0 && self.iterations % period == 0 {
            info!(
                "iteration {:>8}: worklist {:>8}, {} vertices ({} allocs, {} alloc fields, {} alloc arrays)",
                self.iterations,
                self.worklist.len(),
                self.pag.num_vertices(),
                self.pag.num_alloc_vertices(),
                self.pag.num_alloc_dot_field_vertices(),
                self.pag.num_alloc_dot_array_vertices(),
            );
        }
    }

    /// Unions the incoming representatives' sets into `v`'s
    /// representative's set. Returns true if the set grew.
    fn update_points_to_set(&mut self, v: NodeId) -> bool {
        let rep = self.pag.find(v);
        let srcs: Vec<NodeId> = self.pag.in_neighbors(v).collect();
        let mut grew = false;
        for u in srcs {
            let src_rep = self.pag.find(u);
            if src_rep == rep {
                continue;
            }
            grew |= self.pag.union_points_to(rep, src_rep);
        }
        grew
    }

    /// Splices concrete field/element vertices around every
    /// dereferencer recorded on `v`, one per allocation in `v`'s set.
    fn update_dereferencers(&mut self, v: NodeId) {
        let dereferenced_by: Vec<NodeId> = self.pag.node(v).dereferenced_by().iter().collect();
        if dereferenced_by.is_empty() {
            return;
        }
        let base_pts: Vec<NodeId> = self.pag.points_to(v).iter().collect();

        let mut edges_to_add: Vec<(NodeId, NodeId)> = Vec::new();
        for d in dereferenced_by {
            match self.pag.node(d).vertex {
                PAGVertexEnum::RegDotField(_, field) => {
                    for &a in &base_pts {
                        let Some(site) = self.pag.alloc_site(a) else {
                            unreachable!("points-to sets hold allocation vertices only");
                        };
                        let adf = self.pag.alloc_dot_field_vertex(site, field);
                        self.collect_splice_edges(d, adf, &mut edges_to_add);
                    }
                }
                PAGVertexEnum::RegDotArray(_) => {
                    for &a in &base_pts {
                        let Some(site) = self.pag.alloc_site(a) else {
                            unreachable!("points-to sets hold allocation vertices only");
                        };
                        let ada = self.pag.alloc_dot_array_vertex(site);
                        self.collect_splice_edges(d, ada, &mut edges_to_add);
                    }
                }
                _ => {}
            }
        }

        for (src, dst) in edges_to_add {
            // Linear adjacency scan keeps the splice duplicate-free.
            if self.pag.ensure_edge(src, dst, PAGEdgeEnum::AssignPAGEdge).is_some() {
                self.worklist.push(self.pag, dst);
            }
        }
    }

    /// Routes the dereferencer's neighbours through the concrete
    /// vertex: `x -> concrete` for in-neighbours, `concrete -> y` for
    /// out-neighbours.
    fn collect_splice_edges(
        &self,
        dereferencer: NodeId,
        concrete: NodeId,
        edges_to_add: &mut Vec<(NodeId, NodeId)>,
    ) {
        for x in self.pag.in_neighbors(dereferencer) {
            edges_to_add.push((x, concrete));
        }
        for y in self.pag.out_neighbors(dereferencer) {
            edges_to_add.push((concrete, y));
        }
    }

    /// Enqueues the out-neighbours that take part in propagation.
    /// RegDotField/RegDotArray targets are served by the dereferencer's
    /// spliced edges instead, and Alloc vertices never change.
    fn update_worklist(&mut self, v: NodeId) {
        let targets: Vec<NodeId> = self.pag.out_neighbors(v).collect();
        for w in targets {
            match self.pag.node(w).vertex {
                PAGVertexEnum::Reg(..)
                | PAGVertexEnum::AllocDotField(..)
                | PAGVertexEnum::StaticField(..)
                | PAGVertexEnum::AllocDotArray(..) => self.worklist.push(self.pag, w),
                PAGVertexEnum::Alloc(..)
                | PAGVertexEnum::RegDotField(..)
                | PAGVertexEnum::RegDotArray(..) => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::pag::PAGEdgeEnum;
    use crate::vm::handles::{FieldHdl, InsnHdl, MethodHdl, RegHdl, RegIdx};

    fn insn(idx: u16) -> InsnHdl {
        InsnHdl::new(MethodHdl(0), idx)
    }

    fn reg(idx: u16, r: u16) -> RegHdl {
        RegHdl::new(insn(idx), RegIdx(r))
    }

    #[test]
    fn propagates_along_assign_chain() {
        let mut pag = PAG::new();
        let mut worklist = Worklist::new();
        let options = AnalysisOptions::default();

        let a = pag.alloc_vertex(insn(1));
        let r1 = pag.reg_vertex(reg(1, 0), None);
        let r2 = pag.reg_vertex(reg(2, 1), None);
        pag.add_edge(a, r1, PAGEdgeEnum::AllocPAGEdge);
        pag.add_edge(r1, r2, PAGEdgeEnum::AssignPAGEdge);
        worklist.push(&mut pag, r1);

        let iterations = Propagator::new(&mut pag, &mut worklist, &options).solve_worklist();
        assert!(iterations >= 2);
        assert_eq!(pag.points_to(r1).iter().collect::<Vec<_>>(), vec![a]);
        assert_eq!(pag.points_to(r2).iter().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn splices_field_vertices_for_dereferencers() {
        let mut pag = PAG::new();
        let mut worklist = Worklist::new();
        let options = AnalysisOptions::default();
        let field = FieldHdl(0);

        // base = new; base.f = src; dst = base.f  --- wired by hand.
        let a = pag.alloc_vertex(insn(1));
        let base = pag.reg_vertex(reg(1, 0), None);
        let src_alloc = pag.alloc_vertex(insn(2));
        let src = pag.reg_vertex(reg(2, 1), None);
        let dst = pag.reg_vertex(reg(4, 2), None);
        let rdf = pag.reg_dot_field_vertex(reg(1, 0), field, None);

        pag.add_edge(a, base, PAGEdgeEnum::AllocPAGEdge);
        pag.add_edge(src_alloc, src, PAGEdgeEnum::AllocPAGEdge);
        pag.add_edge(src, rdf, PAGEdgeEnum::IStorePAGEdge);
        pag.add_edge(rdf, dst, PAGEdgeEnum::ILoadPAGEdge);
        pag.record_dereferencer(base, rdf);
        worklist.push(&mut pag, base);
        worklist.push(&mut pag, src);

        Propagator::new(&mut pag, &mut worklist, &options).solve_worklist();

        let adf = pag
            .lookup_alloc_dot_field_vertex(insn(1), field)
            .expect("concrete field vertex materialised");
        // src -> ALLOC.FIELD -> dst took over the abstract chain.
        assert_eq!(pag.points_to(adf).iter().collect::<Vec<_>>(), vec![src_alloc]);
        assert_eq!(pag.points_to(dst).iter().collect::<Vec<_>>(), vec![src_alloc]);
        // The abstract dereferencer itself stays empty.
        assert!(pag.points_to(rdf).is_empty());
    }
}
