// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Builds the Pointer Assignment Graph for a single method body.
//!
//! One translator runs per `(callsite, method)` invocation. Each
//! reference-typed instruction contributes vertices and edges to the
//! whole-program PAG; allocation destinations seed the solver worklist;
//! invokes and static accesses queue further invocations.

use std::collections::VecDeque;
use std::fmt::{Debug, Formatter, Result as FmtResult};

use log::*;

use super::call_expander::CallSiteExpander;
use super::enqueue_clinit;
use crate::graph::call_graph::CallGraph;
use crate::graph::pag::{PAGEdgeEnum, PAG};
use crate::pta::{AnalysisError, Invocation, Worklist};
use crate::vm::handles::{ClassHdl, FieldHdl, InsnHdl, MethodHdl, RegHdl, RegIdx};
use crate::vm::image::{FieldDef, MethodDef, VmImage};
use crate::vm::insn::{Insn, InvokeKind};
use crate::vm::is_reference_char;

/// A visitor that traverses one method's instruction graph and builds
/// the method's portion of the pointer assignment graph.
pub struct MethodTranslator<'pta, 'vm> {
    image: &'vm VmImage,
    method: &'vm MethodDef,
    /// The callsite this body is analysed under; `None` for the entry
    /// method and class initialisers.
    context: Option<InsnHdl>,
    pag: &'pta mut PAG,
    call_graph: &'pta mut CallGraph,
    worklist: &'pta mut Worklist,
    invoc_queue: &'pta mut VecDeque<Invocation>,
    /// Handle of the instruction currently visited.
    cur: InsnHdl,
}

impl Debug for MethodTranslator<'_, '_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        "MethodTranslator".fmt(f)
    }
}

impl<'pta, 'vm> MethodTranslator<'pta, 'vm> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image: &'vm VmImage,
        method: &'vm MethodDef,
        context: Option<InsnHdl>,
        pag: &'pta mut PAG,
        call_graph: &'pta mut CallGraph,
        worklist: &'pta mut Worklist,
        invoc_queue: &'pta mut VecDeque<Invocation>,
    ) -> Self {
        debug!("translating {:?} ({}) under {:?}", method.hdl, method.name, context);
        MethodTranslator {
            image,
            method,
            context,
            pag,
            call_graph,
            worklist,
            invoc_queue,
            cur: InsnHdl::new(method.hdl, 0),
        }
    }

    /// Visits every instruction of the body and emits its edges.
    pub fn translate(&mut self) -> Result<(), AnalysisError> {
        if self.method.ins_size > self.method.registers_size {
            return Err(AnalysisError::InconsistentRegisterCount {
                method: self.method.hdl,
                registers_size: self.method.registers_size,
                ins_size: self.method.ins_size,
            });
        }
        let method = self.method;
        for (idx, insn) in method.insns.iter() {
            self.cur = InsnHdl::new(method.hdl, idx);
            self.visit_insn(insn)?;
        }
        Ok(())
    }

    fn visit_insn(&mut self, insn: &Insn) -> Result<(), AnalysisError> {
        match insn {
            Insn::Move { dst, src } => {
                self.add_assign_edge(*dst, *src);
                Ok(())
            }
            Insn::ReturnObject { src } => {
                self.add_assign_edge(RegIdx::RESULT, *src);
                Ok(())
            }
            // A cast is identity for points-to.
            Insn::CheckCast { reg, .. } => {
                self.add_assign_edge(*reg, *reg);
                Ok(())
            }
            Insn::ConstString { dst }
            | Insn::ConstClass { dst, .. }
            | Insn::NewArray { dst, .. } => {
                self.add_alloc_edge(*dst);
                Ok(())
            }
            Insn::NewInstance { dst, class } => self.visit_new_instance(*dst, *class),
            Insn::AGet { dst, array, .. } => {
                self.add_aload_edge(*dst, *array);
                Ok(())
            }
            Insn::APut { src, array, .. } => {
                self.add_astore_edge(*src, *array);
                Ok(())
            }
            Insn::IGet { dst, object, field } => self.add_iload_edge(*dst, *object, *field),
            Insn::IPut { src, object, field } => self.add_istore_edge(*src, *object, *field),
            Insn::SGet { dst, field } => self.add_sload_edge(*dst, *field),
            Insn::SPut { src, field } => self.add_sstore_edge(*src, *field),
            Insn::Invoke { kind, method, args } => self.visit_invoke(*kind, *method, args),
            Insn::Entry
            | Insn::Exit
            | Insn::FilledNewArray { .. }
            | Insn::InvokeQuick
            | Insn::Other => Ok(()),
        }
    }

    /// Register handles for the definitions of `reg` reaching the
    /// current instruction, via the loader's data-flow relation.
    fn reaching_defs(&self, reg: RegIdx) -> Vec<RegHdl> {
        self.method
            .insns
            .reaching_defs(self.cur.idx, reg)
            .map(|def_idx| RegHdl::new(InsnHdl::new(self.method.hdl, def_idx), reg))
            .collect()
    }

    fn add_alloc_edge(&mut self, dst: RegIdx) {
        let dst_hdl = RegHdl::new(self.cur, dst);
        let src_v = self.pag.alloc_vertex(self.cur);
        let dst_v = self.pag.reg_vertex(dst_hdl, self.context);
        self.pag.add_edge(src_v, dst_v, PAGEdgeEnum::AllocPAGEdge);
        self.worklist.push(self.pag, dst_v);
    }

    fn add_assign_edge(&mut self, dst: RegIdx, src: RegIdx) {
        let mut dst_hdl = RegHdl::new(self.cur, dst);
        // A result destination comes from a return instruction; the
        // result register is anchored at the exit instruction.
        if dst == RegIdx::RESULT {
            dst_hdl.insn.idx = self.method.insns.exit_idx();
        }
        for src_hdl in self.reaching_defs(src) {
            let src_v = self.pag.reg_vertex(src_hdl, self.context);
            let dst_v = self.pag.reg_vertex(dst_hdl, self.context);
            self.pag.add_edge(src_v, dst_v, PAGEdgeEnum::AssignPAGEdge);
        }
    }

    fn visit_new_instance(&mut self, dst: RegIdx, class: ClassHdl) -> Result<(), AnalysisError> {
        // Run <clinit> of the instantiated class.
        let Some(class_def) = self.image.find_class(class) else {
            warn!("class not found: {:?} (new-instance at {:?})", class, self.cur);
            return Ok(());
        };
        if let Some(clinit) = class_def.clinit {
            self.invoc_queue.push_back(Invocation::new(None, clinit));
        }
        self.add_alloc_edge(dst);
        Ok(())
    }

    fn add_aload_edge(&mut self, dst: RegIdx, array: RegIdx) {
        let dst_hdl = RegHdl::new(self.cur, dst);
        for obj_hdl in self.reaching_defs(array) {
            let src_v = self.pag.reg_dot_array_vertex(obj_hdl, self.context);
            let dst_v = self.pag.reg_vertex(dst_hdl, self.context);
            let obj_v = self.pag.reg_vertex(obj_hdl, self.context);
            self.pag.record_dereferencer(obj_v, src_v);
            self.pag.add_edge(src_v, dst_v, PAGEdgeEnum::ALoadPAGEdge);
        }
    }

    fn add_astore_edge(&mut self, src: RegIdx, array: RegIdx) {
        for src_hdl in self.reaching_defs(src) {
            for obj_hdl in self.reaching_defs(array) {
                let src_v = self.pag.reg_vertex(src_hdl, self.context);
                let dst_v = self.pag.reg_dot_array_vertex(obj_hdl, self.context);
                let obj_v = self.pag.reg_vertex(obj_hdl, self.context);
                self.pag.record_dereferencer(obj_v, dst_v);
                self.pag.add_edge(src_v, dst_v, PAGEdgeEnum::AStorePAGEdge);
            }
        }
    }

    fn add_iload_edge(
        &mut self,
        dst: RegIdx,
        object: RegIdx,
        field: FieldHdl,
    ) -> Result<(), AnalysisError> {
        let Some(field_def) = self.image.find_field(field) else {
            warn!("field not found: {:?} (iget at {:?})", field, self.cur);
            return Ok(());
        };
        if !is_reference_field(field_def)? {
            return Ok(());
        }
        let dst_hdl = RegHdl::new(self.cur, dst);
        for obj_hdl in self.reaching_defs(object) {
            let src_v = self.pag.reg_dot_field_vertex(obj_hdl, field, self.context);
            let dst_v = self.pag.reg_vertex(dst_hdl, self.context);
            let obj_v = self.pag.reg_vertex(obj_hdl, self.context);
            self.pag.record_dereferencer(obj_v, src_v);
            self.pag.add_edge(src_v, dst_v, PAGEdgeEnum::ILoadPAGEdge);
        }
        Ok(())
    }

    fn add_istore_edge(
        &mut self,
        src: RegIdx,
        object: RegIdx,
        field: FieldHdl,
    ) -> Result<(), AnalysisError> {
        let Some(field_def) = self.image.find_field(field) else {
            warn!("field not found: {:?} (iput at {:?})", field, self.cur);
            return Ok(());
        };
        if !is_reference_field(field_def)? {
            return Ok(());
        }
        for src_hdl in self.reaching_defs(src) {
            for obj_hdl in self.reaching_defs(object) {
                let src_v = self.pag.reg_vertex(src_hdl, self.context);
                let dst_v = self.pag.reg_dot_field_vertex(obj_hdl, field, self.context);
                let obj_v = self.pag.reg_vertex(obj_hdl, self.context);
                self.pag.record_dereferencer(obj_v, dst_v);
                self.pag.add_edge(src_v, dst_v, PAGEdgeEnum::IStorePAGEdge);
            }
        }
        Ok(())
    }

    fn add_sload_edge(&mut self, dst: RegIdx, field: FieldHdl) -> Result<(), AnalysisError> {
        let field_def = self
            .image
            .find_field(field)
            .ok_or(AnalysisError::StaticFieldNotFound { field, insn: self.cur })?;
        // Run <clinit> of the declaring class, reference-typed or not.
        enqueue_clinit(self.image, self.invoc_queue, field_def.class);
        if !is_reference_field(field_def)? {
            return Ok(());
        }
        let dst_hdl = RegHdl::new(self.cur, dst);
        let src_v = self.pag.static_field_vertex(field);
        let dst_v = self.pag.reg_vertex(dst_hdl, self.context);
        self.pag.add_edge(src_v, dst_v, PAGEdgeEnum::SLoadPAGEdge);
        Ok(())
    }

    fn add_sstore_edge(&mut self, src: RegIdx, field: FieldHdl) -> Result<(), AnalysisError> {
        let field_def = self
            .image
            .find_field(field)
            .ok_or(AnalysisError::StaticFieldNotFound { field, insn: self.cur })?;
        enqueue_clinit(self.image, self.invoc_queue, field_def.class);
        if !is_reference_field(field_def)? {
            return Ok(());
        }
        for src_hdl in self.reaching_defs(src) {
            let src_v = self.pag.reg_vertex(src_hdl, self.context);
            let dst_v = self.pag.static_field_vertex(field);
            self.pag.add_edge(src_v, dst_v, PAGEdgeEnum::SStorePAGEdge);
        }
        Ok(())
    }

    fn visit_invoke(
        &mut self,
        kind: InvokeKind,
        nominal: MethodHdl,
        args: &[RegIdx],
    ) -> Result<(), AnalysisError> {
        let mut expander = CallSiteExpander::new(
            self.image,
            self.method,
            self.cur,
            self.context,
            &mut *self.pag,
            &mut *self.call_graph,
            &mut *self.invoc_queue,
        );
        expander.expand(kind, nominal, args)
    }
}

/// True when the field's values are object references, judged by the
/// descriptor's first character.
fn is_reference_field(field: &FieldDef) -> Result<bool, AnalysisError> {
    let c = field.type_char().ok_or_else(|| AnalysisError::EmptyDescriptor {
        owner: format!("field {} ({:?})", field.name, field.hdl),
    })?;
    Ok(is_reference_char(c))
}
