// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Call graph built alongside the PAG.
//!
//! Nodes are analysed methods; an edge records one `(callsite, caller,
//! callee)` expansion. Class initialisers triggered by static accesses
//! appear as nodes without an incoming callsite edge.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use petgraph::graph::{DefaultIx, EdgeIndex, Graph, NodeIndex};

use crate::vm::handles::{InsnHdl, MethodHdl};

pub type CGNodeId = NodeIndex<DefaultIx>;
pub type CGEdgeId = EdgeIndex<DefaultIx>;

#[derive(Debug)]
pub struct CallGraphNode {
    pub method: MethodHdl,
}

#[derive(Debug)]
pub struct CallGraphEdge {
    pub callsite: InsnHdl,
}

pub struct CallGraph {
    /// The graph structure capturing call relationships.
    graph: Graph<CallGraphNode, CallGraphEdge>,
    /// A map from methods to their corresponding call graph nodes.
    method_nodes: HashMap<MethodHdl, CGNodeId>,
    /// A map from call sites to call graph edges.
    callsite_to_edges: HashMap<InsnHdl, HashSet<CGEdgeId>>,
}

impl Default for CallGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl CallGraph {
    pub fn new() -> Self {
        CallGraph {
            graph: Graph::new(),
            method_nodes: HashMap::new(),
            callsite_to_edges: HashMap::new(),
        }
    }

    #[inline]
    pub fn graph(&self) -> &Graph<CallGraphNode, CallGraphEdge> {
        &self.graph
    }

    /// Adds a node for `method` if it is not present yet.
    pub fn add_node(&mut self, method: MethodHdl) -> CGNodeId {
        match self.method_nodes.entry(method) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let id = self.graph.add_node(CallGraphNode { method });
                *v.insert(id)
            }
        }
    }

    pub fn contains(&self, method: MethodHdl) -> bool {
        self.method_nodes.contains_key(&method)
    }

    /// All callees recorded for the callsite.
    pub fn callees_at(&self, callsite: InsnHdl) -> HashSet<MethodHdl> {
        match self.callsite_to_edges.get(&callsite) {
            Some(edges) => edges
                .iter()
                .filter_map(|edge_id| {
                    let (_, target) = self.graph.edge_endpoints(*edge_id)?;
                    Some(self.graph[target].method)
                })
                .collect(),
            None => HashSet::new(),
        }
    }

    /// Adds a call edge from `caller` to `callee` at `callsite`.
    /// Returns false if the edge already existed.
    pub fn add_edge(&mut self, callsite: InsnHdl, caller: MethodHdl, callee: MethodHdl) -> bool {
        if self.callees_at(callsite).contains(&callee) {
            return false;
        }
        let caller_node = self.add_node(caller);
        let callee_node = self.add_node(callee);
        let edge_id = self
            .graph
            .add_edge(caller_node, callee_node, CallGraphEdge { callsite });
        self.callsite_to_edges
            .entry(callsite)
            .or_default()
            .insert(edge_id);
        true
    }

    pub fn num_methods(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_call_edges(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn edges_deduplicate_per_callsite() {
        let mut cg = CallGraph::new();
        let caller = MethodHdl(0);
        let callee = MethodHdl(1);
        let site = InsnHdl::new(caller, 2);

        assert!(cg.add_edge(site, caller, callee));
        assert!(!cg.add_edge(site, caller, callee));
        assert_eq!(cg.num_call_edges(), 1);

        // The same pair at another callsite is a new edge.
        let other_site = InsnHdl::new(caller, 5);
        assert!(cg.add_edge(other_site, caller, callee));
        assert_eq!(cg.callees_at(site).len(), 1);
        assert!(cg.contains(caller) && cg.contains(callee));
    }
}
