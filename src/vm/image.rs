// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The loaded virtual machine image.
//!
//! Classes, methods and fields are resolved by the loader before the
//! analysis starts; the image is read-only for the whole run. The
//! `add_*` methods are the loader-facing construction API.

use std::collections::HashMap;

use super::handles::{ClassHdl, FieldHdl, MethodHdl};
use super::insn_graph::InsnGraph;

/// Method access flag: declared `static`.
pub const ACC_STATIC: u32 = 0x0008;
/// Method access flag: declared `abstract` (no body).
pub const ACC_ABSTRACT: u32 = 0x0400;

#[derive(Clone, Debug)]
pub struct ClassDef {
    pub hdl: ClassHdl,
    /// JVM-style type descriptor, e.g. `LA;`.
    pub descriptor: String,
    /// The class initialiser `<clinit>()V`, if the class has one.
    pub clinit: Option<MethodHdl>,
}

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub hdl: FieldHdl,
    pub class: ClassHdl,
    pub name: String,
    /// Type descriptor; the first character decides reference-ness.
    pub descriptor: String,
}

impl FieldDef {
    pub fn type_char(&self) -> Option<char> {
        self.descriptor.chars().next()
    }
}

#[derive(Clone, Debug)]
pub struct MethodDef {
    pub hdl: MethodHdl,
    pub class: ClassHdl,
    pub name: String,
    pub access_flags: u32,
    /// Parameter type descriptors, receiver excluded.
    pub params: Vec<String>,
    pub return_descriptor: String,
    /// Size of the virtual register file.
    pub registers_size: u16,
    /// Number of registers occupied by incoming arguments; these are
    /// the highest-numbered registers.
    pub ins_size: u16,
    pub insns: InsnGraph,
    /// Methods overriding this one (override edges of the method
    /// dictionary).
    pub overridden_by: Vec<MethodHdl>,
}

impl MethodDef {
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }
}

/// The loaded image: one table per handle space.
#[derive(Debug, Default)]
pub struct VmImage {
    classes: HashMap<ClassHdl, ClassDef>,
    methods: HashMap<MethodHdl, MethodDef>,
    fields: HashMap<FieldHdl, FieldDef>,
    next_class: u32,
    next_method: u32,
    next_field: u32,
}

impl VmImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_class(&self, hdl: ClassHdl) -> Option<&ClassDef> {
        self.classes.get(&hdl)
    }

    pub fn find_method(&self, hdl: MethodHdl) -> Option<&MethodDef> {
        self.methods.get(&hdl)
    }

    pub fn find_field(&self, hdl: FieldHdl) -> Option<&FieldDef> {
        self.fields.get(&hdl)
    }

    /// The methods reachable from `root` along override edges of the
    /// method dictionary, `root` included, in depth-first order.
    pub fn inheritance_closure(&self, root: MethodHdl) -> Vec<MethodHdl> {
        let mut closure = Vec::new();
        let mut stack = vec![root];
        while let Some(m) = stack.pop() {
            if closure.contains(&m) {
                continue;
            }
            closure.push(m);
            if let Some(def) = self.methods.get(&m) {
                for &sub in def.overridden_by.iter().rev() {
                    stack.push(sub);
                }
            }
        }
        closure
    }

    pub fn add_class(&mut self, descriptor: &str) -> ClassHdl {
        let hdl = ClassHdl(self.next_class);
        self.next_class += 1;
        self.classes.insert(
            hdl,
            ClassDef {
                hdl,
                descriptor: descriptor.to_string(),
                clinit: None,
            },
        );
        hdl
    }

    pub fn add_field(&mut self, class: ClassHdl, name: &str, descriptor: &str) -> FieldHdl {
        let hdl = FieldHdl(self.next_field);
        self.next_field += 1;
        self.fields.insert(
            hdl,
            FieldDef {
                hdl,
                class,
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            },
        );
        hdl
    }

    pub fn add_method(
        &mut self,
        class: ClassHdl,
        name: &str,
        access_flags: u32,
        params: Vec<String>,
        return_descriptor: &str,
    ) -> MethodHdl {
        let hdl = MethodHdl(self.next_method);
        self.next_method += 1;
        self.methods.insert(
            hdl,
            MethodDef {
                hdl,
                class,
                name: name.to_string(),
                access_flags,
                params,
                return_descriptor: return_descriptor.to_string(),
                registers_size: 0,
                ins_size: 0,
                insns: InsnGraph::new(),
                overridden_by: Vec::new(),
            },
        );
        if name == "<clinit>" {
            if let Some(c) = self.classes.get_mut(&class) {
                c.clinit = Some(hdl);
            }
        }
        hdl
    }

    /// Mutable access for the loader to fill in the body.
    pub fn method_mut(&mut self, hdl: MethodHdl) -> &mut MethodDef {
        self.methods.get_mut(&hdl).expect("unknown method handle")
    }

    /// Records that `overriding` overrides `base` in the method
    /// dictionary.
    pub fn add_override(&mut self, base: MethodHdl, overriding: MethodHdl) {
        let def = self.methods.get_mut(&base).expect("unknown method handle");
        if !def.overridden_by.contains(&overriding) {
            def.overridden_by.push(overriding);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn closure_walks_override_edges_transitively() {
        let mut image = VmImage::new();
        let c = image.add_class("LI;");
        let base = image.add_method(c, "m", ACC_ABSTRACT, vec![], "V");
        let mid = image.add_method(c, "m", 0, vec![], "V");
        let leaf = image.add_method(c, "m", 0, vec![], "V");
        image.add_override(base, mid);
        image.add_override(mid, leaf);

        let closure = image.inheritance_closure(base);
        assert_eq!(closure, vec![base, mid, leaf]);
        assert_eq!(image.inheritance_closure(leaf), vec![leaf]);
    }

    #[test]
    fn clinit_registers_on_its_class() {
        let mut image = VmImage::new();
        let c = image.add_class("LS;");
        let clinit = image.add_method(c, "<clinit>", ACC_STATIC, vec![], "V");
        assert_eq!(image.find_class(c).unwrap().clinit, Some(clinit));
    }
}
