// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Expands one invoke instruction.
//!
//! Virtual dispatch is over-approximated: the invoke is wired to every
//! method in the inheritance closure of the nominal target. Each
//! reachable callee is queued for body translation under the callsite's
//! context (1-CFA) and connected through argument and return edges.

use std::collections::VecDeque;

use log::*;

use super::enqueue_clinit;
use crate::graph::call_graph::CallGraph;
use crate::graph::pag::{PAGEdgeEnum, PAG};
use crate::pta::{AnalysisError, Invocation};
use crate::vm::handles::{InsnHdl, MethodHdl, RegHdl, RegIdx};
use crate::vm::image::{MethodDef, VmImage};
use crate::vm::insn::InvokeKind;
use crate::vm::{is_reference_char, is_wide_char};

pub struct CallSiteExpander<'pta, 'vm> {
    image: &'vm VmImage,
    caller: &'vm MethodDef,
    /// The invoke instruction being expanded.
    callsite: InsnHdl,
    /// Context the calling body is analysed under.
    context: Option<InsnHdl>,
    pag: &'pta mut PAG,
    call_graph: &'pta mut CallGraph,
    invoc_queue: &'pta mut VecDeque<Invocation>,
}

impl<'pta, 'vm> CallSiteExpander<'pta, 'vm> {
    pub fn new(
        image: &'vm VmImage,
        caller: &'vm MethodDef,
        callsite: InsnHdl,
        context: Option<InsnHdl>,
        pag: &'pta mut PAG,
        call_graph: &'pta mut CallGraph,
        invoc_queue: &'pta mut VecDeque<Invocation>,
    ) -> Self {
        CallSiteExpander {
            image,
            caller,
            callsite,
            context,
            pag,
            call_graph,
            invoc_queue,
        }
    }

    pub fn expand(
        &mut self,
        kind: InvokeKind,
        nominal: MethodHdl,
        args: &[RegIdx],
    ) -> Result<(), AnalysisError> {
        let Some(nominal_def) = self.image.find_method(nominal) else {
            warn!("method not found: {:?} (invoke at {:?})", nominal, self.callsite);
            return Ok(());
        };
        if kind == InvokeKind::Static {
            // Run <clinit> of the declaring class.
            enqueue_clinit(self.image, self.invoc_queue, nominal_def.class);
        }

        // Dispatch to every override reachable from the nominal target.
        for callee_hdl in self.image.inheritance_closure(nominal) {
            self.invoc_queue
                .push_back(Invocation::new(Some(self.callsite), callee_hdl));
            self.call_graph
                .add_edge(self.callsite, self.caller.hdl, callee_hdl);
            self.add_invoke_edges(kind, callee_hdl, args)?;
        }
        Ok(())
    }

    /// Wires argument and return edges between the callsite and one
    /// callee. The callee's register vertices carry the callsite as
    /// their context.
    fn add_invoke_edges(
        &mut self,
        kind: InvokeKind,
        callee_hdl: MethodHdl,
        args: &[RegIdx],
    ) -> Result<(), AnalysisError> {
        let Some(callee) = self.image.find_method(callee_hdl) else {
            warn!(
                "method not found: {:?} (override of invoke at {:?})",
                callee_hdl, self.callsite
            );
            return Ok(());
        };
        if callee.ins_size > callee.registers_size {
            return Err(AnalysisError::InconsistentRegisterCount {
                method: callee.hdl,
                registers_size: callee.registers_size,
                ins_size: callee.ins_size,
            });
        }

        // Argument slot offset of each reference-typed parameter. The
        // receiver of a non-static callee occupies slot 0; a wide
        // parameter consumes two slots and is never reference-typed.
        let mut reg_offsets: Vec<usize> = Vec::with_capacity(callee.params.len() + 1);
        let mut slots = 0usize;
        if !callee.is_static() {
            reg_offsets.push(0);
            slots += 1;
        }
        for (i, param) in callee.params.iter().enumerate() {
            let c = param
                .chars()
                .next()
                .ok_or_else(|| AnalysisError::EmptyDescriptor {
                    owner: format!("parameter {} of {:?}", i, callee.hdl),
                })?;
            if is_reference_char(c) {
                reg_offsets.push(slots);
            }
            slots += 1;
            if is_wide_char(c) {
                slots += 1;
            }
        }
        if args.len() < slots {
            return Err(AnalysisError::ArgumentSlotMismatch {
                insn: self.callsite,
                method: callee.hdl,
                got: args.len(),
                want: slots,
            });
        }

        // Formal parameters occupy the highest-numbered registers,
        // starting at the callee's entry instruction.
        let formal_reg_start = (callee.registers_size - callee.ins_size) as usize;
        let callee_entry = InsnHdl::new(callee.hdl, 0);
        for off in reg_offsets {
            let formal_hdl = RegHdl::new(callee_entry, RegIdx((formal_reg_start + off) as u16));
            let is_receiver = off == 0 && !callee.is_static();
            for actual_hdl in self.reaching_defs(args[off]) {
                let src_v = self.pag.reg_vertex(actual_hdl, self.context);
                let dst_v = self.pag.reg_vertex(formal_hdl, Some(self.callsite));
                self.pag.add_edge(src_v, dst_v, PAGEdgeEnum::AssignPAGEdge);
                if is_receiver && kind.is_virtual_dispatch() {
                    self.pag.set_virtual_invoke_receiver(src_v);
                }
            }
        }

        // Return value.
        let ret_c = callee
            .return_descriptor
            .chars()
            .next()
            .ok_or_else(|| AnalysisError::EmptyDescriptor {
                owner: format!("return of {:?}", callee.hdl),
            })?;
        if is_reference_char(ret_c) {
            let callee_exit = InsnHdl::new(callee.hdl, callee.insns.exit_idx());
            let src_hdl = RegHdl::new(callee_exit, RegIdx::RESULT);
            let dst_hdl = RegHdl::new(self.callsite, RegIdx::RESULT);
            let src_v = self.pag.reg_vertex(src_hdl, Some(self.callsite));
            let dst_v = self.pag.reg_vertex(dst_hdl, self.context);
            self.pag.add_edge(src_v, dst_v, PAGEdgeEnum::AssignPAGEdge);
        }
        Ok(())
    }

    fn reaching_defs(&self, reg: RegIdx) -> Vec<RegHdl> {
        self.caller
            .insns
            .reaching_defs(self.callsite.idx, reg)
            .map(|def_idx| RegHdl::new(InsnHdl::new(self.caller.hdl, def_idx), reg))
            .collect()
    }
}
