// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// pvs.rs — leaf and cluster PVS expansion, point lookups

use qfmod_common::q_shared::{plane_diff, Vec3};
use qfmod_common::set::Set;
use qfmod_common::vis::{decompress_vis_mix, decompress_vis_set, vis_row, VisError};

use crate::model_types::{BrushModel, ClusterChild, NodeRef};

impl BrushModel {
    /// Visible leafs of the world, not counting the solid leaf 0.
    pub fn visleafs(&self) -> u32 {
        self.submodels.first().map(|m| m.visleafs).unwrap_or(0)
    }

    /// Compressed row of `leaf`, `None` when the leaf has no visibility.
    pub fn leaf_vis(&self, leaf: usize) -> Option<&[u8]> {
        let ofs = self.leafs.get(leaf)?.compressed_vis?;
        self.visdata.get(ofs..)
    }
}

/// Scratch space for repeated PVS expansion.
#[derive(Debug, Default, Clone)]
pub struct PvsScratch {
    row: Vec<u8>,
}

impl PvsScratch {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&mut self, len: usize) -> &mut [u8] {
        if self.row.len() < len {
            self.row.resize(len, 0);
        }
        &mut self.row[..len]
    }
}

/// Overwrite `out` with the PVS of `leaf`. Bit `j` is leaf `j + 1`.
///
/// The solid leaf and leafs without visibility data see `defvis` in every
/// byte. Bits past the visible leaf count are cleared.
pub fn leaf_pvs_set(
    brush: &BrushModel,
    leaf: usize,
    defvis: u8,
    out: &mut Set,
    scratch: &mut PvsScratch,
) -> Result<(), VisError> {
    let numvis = brush.visleafs() as usize;
    out.expand(numvis);
    out.inverted = false;
    if leaf == 0 {
        out.fill_bytes(defvis);
    } else {
        let row = scratch.row(vis_row(numvis));
        decompress_vis_set(brush.leaf_vis(leaf), row.len(), defvis, row)?;
        out.copy_from_bytes(row);
    }
    out.mask_tail(numvis);
    Ok(())
}

/// OR the PVS of `leaf` into `out`.
pub fn leaf_pvs_mix(
    brush: &BrushModel,
    leaf: usize,
    defvis: u8,
    out: &mut Set,
    scratch: &mut PvsScratch,
) -> Result<(), VisError> {
    let numvis = brush.visleafs() as usize;
    out.expand(numvis);
    let row = scratch.row(vis_row(numvis));
    out.copy_to_bytes(row);
    if leaf == 0 {
        for b in row.iter_mut() {
            *b |= defvis;
        }
    } else {
        decompress_vis_mix(brush.leaf_vis(leaf), row.len(), defvis, row)?;
    }
    out.copy_from_bytes(row);
    out.mask_tail(numvis);
    Ok(())
}

/// Overwrite `out` with the clusters visible from `cluster`.
pub fn cluster_pvs_set(
    brush: &BrushModel,
    cluster: u32,
    out: &mut Set,
    scratch: &mut PvsScratch,
) -> Result<(), VisError> {
    let data = &brush.clusters;
    let numclusters = data.num_clusters as usize;
    out.expand(numclusters);
    out.inverted = false;
    let input = data
        .cluster_offs
        .get(cluster as usize)
        .and_then(|&ofs| data.cluster_vis.get(ofs as usize..));
    let row = scratch.row(vis_row(numclusters));
    decompress_vis_set(input, row.len(), 0xff, row)?;
    out.copy_from_bytes(row);
    out.mask_tail(numclusters);
    Ok(())
}

/// Leaf containing `p`, `None` when the model has no draw tree.
pub fn point_in_leaf(brush: &BrushModel, p: &Vec3) -> Option<usize> {
    if brush.nodes.is_empty() {
        return None;
    }
    let mut node = NodeRef::Node(0);
    for _ in 0..=brush.nodes.len() {
        match node {
            NodeRef::Leaf(l) => return Some(l as usize),
            NodeRef::Node(n) => {
                let n = brush.nodes.get(n as usize)?;
                let d = plane_diff(p, &n.plane);
                node = n.children[(d < 0.0) as usize];
            }
        }
    }
    None
}

/// Cluster containing `p`, walking the condensed cluster tree.
///
/// Solid space adjoining a cluster is folded into it, so a point inside a
/// wall reports the neighbouring cluster. `None` only for a tree with no
/// clusters at all.
pub fn cluster_for_point(brush: &BrushModel, p: &Vec3) -> Option<u32> {
    let tree = &brush.clusters.tree;
    let mut child = tree.root;
    for _ in 0..=tree.nodes.len() {
        match child {
            ClusterChild::Cluster(c) => return Some(c),
            ClusterChild::Solid => return None,
            ClusterChild::Node(n) => {
                let n = tree.nodes.get(n as usize)?;
                let d = plane_diff(p, &n.plane);
                child = n.children[(d < 0.0) as usize];
            }
        }
    }
    None
}
