// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// clusters.rs — fuse leafs sharing a visibility row into clusters and build
// the cluster tree, per-cluster surface lists and cluster visibility

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use qfmod_common::set::Set;
use qfmod_common::vis::{compress_vis, decompress_vis_mix, decompress_vis_set, vis_row, VisError};

use crate::error::{ModelError, Result};
use crate::model_types::{
    BrushModel, Cluster, ClusterChild, ClusterData, ClusterNode, ClusterTree, LeafMap, NodeRef,
};
use crate::worker::{Completion, WorkerPool};

/// Sort key of a leaf's visibility row; leafs without one sort first.
fn vis_key(brush: &BrushModel, leaf: usize) -> i64 {
    brush.leafs[leaf].compressed_vis.map(|o| o as i64).unwrap_or(-1)
}

/// Build the cluster data for the world leafs `1..=visleafs`.
pub(crate) fn merge_clusters(
    model: &str,
    brush: &BrushModel,
    pool: &WorkerPool,
    join_poll: Duration,
) -> Result<ClusterData> {
    let num_leafs = (brush.visleafs() as usize).min(brush.leafs.len().saturating_sub(1));
    let mut data = ClusterData {
        cluster_map: vec![None; brush.leafs.len()],
        ..Default::default()
    };
    if num_leafs == 0 {
        return Ok(data);
    }

    // leaf runs sharing one row
    for leaf in 1..=num_leafs {
        let key = vis_key(brush, leaf);
        if leaf > 1 {
            let prev = vis_key(brush, leaf - 1);
            if key < prev {
                return Err(ModelError::ScrambledLeafOrder {
                    model: model.to_string(),
                    leaf,
                });
            }
            if key == prev {
                if let Some(run) = data.leaf_map.last_mut() {
                    run.num_leafs += 1;
                }
                data.cluster_map[leaf] = Some(data.leaf_map.len() as u32 - 1);
                continue;
            }
        }
        data.cluster_map[leaf] = Some(data.leaf_map.len() as u32);
        data.leaf_map.push(LeafMap {
            first_leaf: leaf as u32,
            num_leafs: 1,
        });
    }
    data.num_clusters = data.leaf_map.len() as u32;
    log::debug!(
        "{}: {} leafs in {} clusters",
        model,
        num_leafs,
        data.num_clusters
    );

    data.tree = build_cluster_tree(brush, &data.cluster_map);
    build_cluster_surfaces(brush, &mut data);

    if data.num_clusters as usize == num_leafs {
        reindex_leaf_vis(model, brush, &mut data)?;
    } else {
        solve_cluster_vis(model, brush, pool, join_poll, num_leafs, &mut data)?;
    }
    Ok(data)
}

// ============================================================
// Cluster tree
// ============================================================

pub(crate) fn build_cluster_tree(brush: &BrushModel, cluster_map: &[Option<u32>]) -> ClusterTree {
    let mut tree = ClusterTree::default();
    if brush.nodes.is_empty() {
        return tree;
    }
    tree.root = classify(brush, cluster_map, NodeRef::Node(0), &mut tree.nodes);
    tree
}

/// Post-order walk. A node survives only when its sides fall in different
/// clusters; a side outside every cluster takes the other side's answer.
fn classify(
    brush: &BrushModel,
    cluster_map: &[Option<u32>],
    node: NodeRef,
    out: &mut Vec<ClusterNode>,
) -> ClusterChild {
    let n = match node {
        NodeRef::Leaf(l) => {
            return match cluster_map.get(l as usize).copied().flatten() {
                Some(c) => ClusterChild::Cluster(c),
                None => ClusterChild::Solid,
            };
        }
        NodeRef::Node(n) => &brush.nodes[n as usize],
    };
    let front = classify(brush, cluster_map, n.children[0], out);
    let back = classify(brush, cluster_map, n.children[1], out);
    match (front, back) {
        (a, b) if a == b => a,
        (ClusterChild::Solid, b) => b,
        (a, ClusterChild::Solid) => a,
        (a, b) => {
            out.push(ClusterNode {
                plane: n.plane,
                children: [a, b],
            });
            ClusterChild::Node(out.len() as u32 - 1)
        }
    }
}

// ============================================================
// Surfaces
// ============================================================

/// Per-cluster surface lists, deduplicated and ordered by texinfo then
/// surface so a cluster can be drawn in texture batches.
fn build_cluster_surfaces(brush: &BrushModel, data: &mut ClusterData) {
    let mut seen = Set::with_capacity(brush.surfaces.len());

    data.clusters.reserve(data.leaf_map.len());
    for run in &data.leaf_map {
        seen.empty();
        let first = run.first_leaf as usize;
        for leaf in &brush.leafs[first..first + run.num_leafs as usize] {
            let marks = &brush.marksurfaces[leaf.firstmarksurface..][..leaf.nummarksurfaces];
            for &surf in marks {
                seen.add(surf as usize);
            }
        }
        let mut surfs: Vec<u32> = seen.iter().map(|s| s as u32).collect();
        surfs.sort_by_key(|&s| (brush.surfaces[s as usize].texinfo, s));
        data.clusters.push(Cluster {
            first_surface: data.cluster_surfs.len() as u32,
            num_surfaces: surfs.len() as u32,
        });
        data.cluster_surfs.extend(surfs);
    }
}

// ============================================================
// Visibility
// ============================================================

/// One leaf per cluster: cluster bits are leaf bits, so the leaf rows are
/// reused as they are. Every reused row is decoded once so a corrupt row
/// fails the load here rather than at the first PVS query.
fn reindex_leaf_vis(model: &str, brush: &BrushModel, data: &mut ClusterData) -> Result<()> {
    data.cluster_vis = brush.visdata.clone();

    let mut scratch = vec![0u8; vis_row(data.num_clusters as usize)];
    let mut all_visible: Option<u32> = None;
    for run in &data.leaf_map {
        let leaf = run.first_leaf as usize;
        let ofs = match brush.leafs[leaf].compressed_vis {
            Some(ofs) => {
                decompress_vis_set(brush.leaf_vis(leaf), scratch.len(), 0xff, &mut scratch)
                    .map_err(|source| ModelError::Vis {
                        model: model.to_string(),
                        leaf,
                        source,
                    })?;
                ofs as u32
            }
            None => *all_visible.get_or_insert_with(|| {
                let ofs = data.cluster_vis.len() as u32;
                let mut row = Set::with_capacity(data.num_clusters as usize);
                row.fill_bytes(0xff);
                row.mask_tail(data.num_clusters as usize);
                let mut bytes = vec![0u8; vis_row(data.num_clusters as usize)];
                row.copy_to_bytes(&mut bytes);
                compress_vis(&bytes, &mut data.cluster_vis);
                ofs
            }),
        };
        data.cluster_offs.push(ofs);
    }
    Ok(())
}

/// Immutable input shared by every cluster task.
struct VisJob {
    model: String,
    visdata: Vec<u8>,
    /// Row offset of every world leaf, index 0 unused.
    leaf_vis: Vec<Option<usize>>,
    leaf_map: Vec<LeafMap>,
    cluster_map: Vec<Option<u32>>,
    num_leafs: usize,
    num_clusters: usize,
}

/// Worker-private scratch.
#[derive(Default)]
struct WorkerPvs {
    leaf_row: Vec<u8>,
    leafs: Set,
    clusters: Set,
    cluster_row: Vec<u8>,
}

type TaskResult = (usize, std::result::Result<Vec<u8>, (usize, VisError)>);

impl VisJob {
    fn row(&self, leaf: usize) -> Option<&[u8]> {
        self.leaf_vis[leaf].and_then(|ofs| self.visdata.get(ofs..))
    }

    /// Union of the leaf PVS rows of `cluster`, folded into cluster space and
    /// compressed.
    fn cluster_vis(
        &self,
        cluster: usize,
        w: &mut WorkerPvs,
    ) -> std::result::Result<Vec<u8>, (usize, VisError)> {
        let WorkerPvs {
            leaf_row,
            leafs,
            clusters,
            cluster_row,
        } = w;
        let run = self.leaf_map[cluster];
        let first = run.first_leaf as usize;

        leaf_row.resize(vis_row(self.num_leafs), 0);
        decompress_vis_set(self.row(first), leaf_row.len(), 0xff, leaf_row)
            .map_err(|e| (first, e))?;
        for leaf in first + 1..first + run.num_leafs as usize {
            decompress_vis_mix(self.row(leaf), leaf_row.len(), 0xff, leaf_row)
                .map_err(|e| (leaf, e))?;
        }

        leafs.expand(self.num_leafs);
        leafs.empty();
        leafs.copy_from_bytes(leaf_row);
        leafs.mask_tail(self.num_leafs);

        clusters.expand(self.num_clusters);
        clusters.empty();
        for bit in leafs.iter() {
            if let Some(c) = self.cluster_map[bit + 1] {
                clusters.add(c as usize);
            }
        }

        cluster_row.resize(vis_row(self.num_clusters), 0);
        clusters.copy_to_bytes(cluster_row);
        let mut out = Vec::with_capacity(cluster_row.len());
        compress_vis(cluster_row, &mut out);
        Ok(out)
    }
}

/// Expand every cluster's leaf PVS into cluster space on the worker pool,
/// then concatenate the compressed rows.
fn solve_cluster_vis(
    model: &str,
    brush: &BrushModel,
    pool: &WorkerPool,
    join_poll: Duration,
    num_leafs: usize,
    data: &mut ClusterData,
) -> Result<()> {
    let num_clusters = data.num_clusters as usize;
    let job = Arc::new(VisJob {
        model: model.to_string(),
        visdata: brush.visdata.clone(),
        leaf_vis: brush.leafs[..=num_leafs]
            .iter()
            .map(|l| l.compressed_vis)
            .collect(),
        leaf_map: data.leaf_map.clone(),
        cluster_map: data.cluster_map[..=num_leafs].to_vec(),
        num_leafs,
        num_clusters,
    });

    let workers = pool.num_workers().max(1);
    let scratch: Arc<Vec<Mutex<WorkerPvs>>> =
        Arc::new((0..workers).map(|_| Mutex::new(WorkerPvs::default())).collect());
    log::debug!(
        "{}: cluster visibility for {} clusters on {} workers",
        model,
        num_clusters,
        workers
    );

    let (tx, rx) = crossbeam::channel::unbounded::<TaskResult>();
    let latch = Completion::new(num_clusters);
    for cluster in 0..num_clusters {
        let job = Arc::clone(&job);
        let scratch = Arc::clone(&scratch);
        let tx = tx.clone();
        let guard = latch.guard();
        pool.spawn(move || {
            let _guard = guard;
            let slot = rayon::current_thread_index().unwrap_or(0) % scratch.len();
            let mut w = scratch[slot].lock();
            let res = job.cluster_vis(cluster, &mut w);
            if let Err((leaf, e)) = &res {
                log::error!("{}: cluster {} leaf {}: {}", job.model, cluster, leaf, e);
            }
            let _ = tx.send((cluster, res));
        });
    }
    drop(tx);

    let rearmed = latch.wait(join_poll);
    if rearmed > 0 {
        log::debug!("{}: cluster visibility join re-armed {} times", model, rearmed);
    }

    let mut rows: Vec<Option<Vec<u8>>> = vec![None; num_clusters];
    for (cluster, res) in rx.try_iter() {
        match res {
            Ok(row) => rows[cluster] = Some(row),
            Err((leaf, source)) => {
                return Err(ModelError::Vis {
                    model: model.to_string(),
                    leaf,
                    source,
                })
            }
        }
    }

    data.cluster_offs.reserve(num_clusters);
    for (cluster, row) in rows.into_iter().enumerate() {
        let row = row.ok_or_else(|| ModelError::ClusterTaskFailed {
            model: model.to_string(),
            cluster,
        })?;
        data.cluster_offs.push(data.cluster_vis.len() as u32);
        data.cluster_vis.extend_from_slice(&row);
    }
    Ok(())
}
