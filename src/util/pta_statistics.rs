// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use itertools::Itertools;

use crate::graph::pag::PAGVertexEnum;
use crate::pta::andersen::AndersenPTA;
use crate::pts_set::points_to::PointsToSet;

/// Aggregate numbers describing one finished analysis run.
#[derive(Clone, Debug)]
pub struct PtaStats {
    pub reachable_methods: usize,
    pub call_edges: usize,
    pub vertices: usize,
    pub edges: usize,
    pub vertices_by_kind: HashMap<&'static str, usize>,
    /// Vertices with a non-empty points-to set.
    pub pointers: usize,
    /// Total size of all points-to sets.
    pub pts_relations: usize,
    pub iterations: usize,
}

impl PtaStats {
    pub fn collect(pta: &AndersenPTA<'_>) -> Self {
        let pag = pta.pag();
        let vertices_by_kind = pag
            .graph()
            .node_weights()
            .map(|node| kind_name(&node.vertex))
            .counts();

        let mut pointers = 0;
        let mut pts_relations = 0;
        for node in pag.graph().node_weights() {
            let count = node.points_to_set().count();
            if count > 0 {
                pointers += 1;
                pts_relations += count;
            }
        }

        PtaStats {
            reachable_methods: pta.call_graph().num_methods(),
            call_edges: pta.call_graph().num_call_edges(),
            vertices: pag.num_vertices(),
            edges: pag.num_edges(),
            vertices_by_kind,
            pointers,
            pts_relations,
            iterations: pta.iterations(),
        }
    }

    pub fn avg_pts_size(&self) -> f64 {
        if self.pointers == 0 {
            0.0
        } else {
            self.pts_relations as f64 / self.pointers as f64
        }
    }

    /// Writes the statistics in the block format used for dump files.
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        writeln!(w, "##########################################################")?;
        writeln!(w, "Call Graph Statistics:")?;
        writeln!(w, "#Reachable methods: {}", self.reachable_methods)?;
        writeln!(w, "#Call edges: {}", self.call_edges)?;
        writeln!(w, "----------------------------------------------------------")?;
        writeln!(w, "Points-to Statistics:")?;
        writeln!(w, "#Vertices: {}", self.vertices)?;
        for (kind, count) in self.vertices_by_kind.iter().sorted() {
            writeln!(w, "  #{}: {}", kind, count)?;
        }
        writeln!(w, "#Edges: {}", self.edges)?;
        writeln!(w, "#Pointers: {}", self.pointers)?;
        writeln!(w, "#Points-to relations: {}", self.pts_relations)?;
        writeln!(w, "#Avg points-to size: {:.2}", self.avg_pts_size())?;
        writeln!(w, "#Solver iterations: {}", self.iterations)?;
        writeln!(w, "##########################################################")?;
        Ok(())
    }
}

impl fmt::Display for PtaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} methods, {} call edges, {} vertices, {} edges, {} pointers, {} relations (avg {:.2}), {} iterations",
            self.reachable_methods,
            self.call_edges,
            self.vertices,
            self.edges,
            self.pointers,
            self.pts_relations,
            self.avg_pts_size(),
            self.iterations,
        )
    }
}

fn kind_name(vertex: &PAGVertexEnum) -> &'static str {
    match vertex {
        PAGVertexEnum::Reg(..) => "reg",
        PAGVertexEnum::Alloc(..) => "alloc",
        PAGVertexEnum::RegDotField(..) => "reg.field",
        PAGVertexEnum::AllocDotField(..) => "alloc.field",
        PAGVertexEnum::RegDotArray(..) => "reg.array",
        PAGVertexEnum::AllocDotArray(..) => "alloc.array",
        PAGVertexEnum::StaticField(..) => "static.field",
    }
}
