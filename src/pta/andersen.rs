// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::{HashSet, VecDeque};
use std::fmt::{Debug, Formatter, Result as FmtResult};

use log::*;

use super::propagator::Propagator;
use super::{AnalysisError, Invocation, PointerAnalysis, Worklist};
use crate::builder::pag_builder::MethodTranslator;
use crate::graph::call_graph::CallGraph;
use crate::graph::pag::PAG;
use crate::pts_set::points_to::PointsToSet;
use crate::util::options::AnalysisOptions;
use crate::util::pta_statistics::PtaStats;
use crate::vm::handles::{InsnHdl, MethodHdl, RegHdl};
use crate::vm::image::VmImage;

/// Inclusion-based points-to analysis over a loaded VM image, with one
/// callsite of context (1-CFA) and dynamic field resolution.
///
/// The image is read-only for the whole run; all mutation happens in
/// the PAG owned by this value. On error the partially built PAG is
/// dropped with the analysis.
pub struct AndersenPTA<'vm> {
    image: &'vm VmImage,
    options: AnalysisOptions,
    entry: MethodHdl,
    /// Pointer Assignment Graph.
    pag: PAG,
    /// Call graph.
    call_graph: CallGraph,
    worklist: Worklist,
    /// Invocations awaiting body translation.
    invoc_queue: VecDeque<Invocation>,
    /// Records the invocations that have been translated.
    visited: HashSet<Invocation>,
    iterations: usize,
}

impl Debug for AndersenPTA<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        "AndersenPTA".fmt(f)
    }
}

impl<'vm> AndersenPTA<'vm> {
    pub fn new(image: &'vm VmImage, entry: MethodHdl, options: AnalysisOptions) -> Self {
        AndersenPTA {
            image,
            options,
            entry,
            pag: PAG::new(),
            call_graph: CallGraph::new(),
            worklist: Worklist::new(),
            invoc_queue: VecDeque::new(),
            visited: HashSet::new(),
            iterations: 0,
        }
    }

    /// Builds and solves the analysis in one call, returning the
    /// analysis only if it ran to quiescence.
    pub fn run(
        image: &'vm VmImage,
        entry: MethodHdl,
        options: AnalysisOptions,
    ) -> Result<Self, AnalysisError> {
        let mut pta = Self::new(image, entry, options);
        pta.analyze()?;
        Ok(pta)
    }

    /// Initialize the analysis: translate every body reachable from
    /// the entry method, seeding the solver worklist.
    fn initialize(&mut self) -> Result<(), AnalysisError> {
        if self.image.find_method(self.entry).is_none() {
            return Err(AnalysisError::EntryMethodNotFound(self.entry));
        }
        self.invoc_queue.push_back(Invocation::new(None, self.entry));
        self.process_invocations()
    }

    /// Drains the invocation queue through the translator. Translating
    /// a body may queue further invocations; a `(callsite, method)`
    /// pair is translated at most once.
    fn process_invocations(&mut self) -> Result<(), AnalysisError> {
        let image = self.image;
        while let Some(invoc) = self.invoc_queue.pop_front() {
            if !self.visited.insert(invoc) {
                continue;
            }
            let Some(method) = image.find_method(invoc.method) else {
                warn!("method not found: {:?} (queued invocation)", invoc.method);
                continue;
            };
            self.call_graph.add_node(invoc.method);
            let mut translator = MethodTranslator::new(
                image,
                method,
                invoc.callsite,
                &mut self.pag,
                &mut self.call_graph,
                &mut self.worklist,
                &mut self.invoc_queue,
            );
            translator.translate()?;
        }
        Ok(())
    }

    /// Solve the worklist problem.
    fn propagate(&mut self) {
        let mut propagator = Propagator::new(&mut self.pag, &mut self.worklist, &self.options);
        self.iterations += propagator.solve_worklist();
    }

    /// Finalize the analysis.
    fn finalize(&self) {
        let stats = PtaStats::collect(self);
        info!("points-to analysis completed: {}", stats);
    }

    #[inline]
    pub fn pag(&self) -> &PAG {
        &self.pag
    }

    #[inline]
    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    /// Solver iterations spent reaching the fixpoint.
    #[inline]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// The allocation sites a register may reference under `context`,
    /// read through the register vertex's representative. Empty if the
    /// register vertex was never materialised.
    pub fn points_to(&self, reg: RegHdl, context: Option<InsnHdl>) -> Vec<InsnHdl> {
        match self.pag.lookup_reg_vertex(reg, context) {
            Some(v) => self
                .pag
                .points_to(v)
                .iter()
                .filter_map(|a| self.pag.alloc_site(a))
                .collect(),
            None => Vec::new(),
        }
    }
}

impl PointerAnalysis for AndersenPTA<'_> {
    /// Analyze the image starting from the entry method, returning when
    /// the worklist is empty.
    fn analyze(&mut self) -> Result<(), AnalysisError> {
        self.initialize()?;
        self.propagate();
        self.finalize();
        Ok(())
    }
}
