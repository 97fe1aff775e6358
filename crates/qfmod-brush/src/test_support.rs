// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// test_support.rs — small synthetic maps for the loader tests

use std::time::Duration;

use qfmod_common::q_shared::{Vec3, CONTENTS_EMPTY, CONTENTS_SOLID};
use qfmod_common::qfiles::{
    Bsp, DClipNode, DEdge, DFace, DLeaf, DModel, DNode, DPlane, DVertex, MipTex, TexInfo,
    HEADER_LUMPS,
};
use qfmod_common::vis::compress_vis;

use crate::config::BrushConfig;
use crate::model_brush::ModelLoader;
use crate::model_types::Model;

/// Width of one leaf slab along x.
pub(crate) const SLAB: f32 = 64.0;

/// Lightmap bytes per face: a 64x64 face has 5x5 samples.
const FACE_SAMPLES: i32 = 25;

/// A corridor of leafs along +x. Each `(count, row)` group adds `count`
/// consecutive leafs sharing one compressed visibility row, `None` leaving
/// the group without visibility.
///
/// Node `k` splits at `x = (k + 1) * 64`: its back child is leaf `k + 1`,
/// its front child node `k + 1`, or the solid leaf past the last slab.
/// Leaf `k` holds one floor face, surface `k - 1`, textured "wall" or
/// "floor" alternately.
pub(crate) fn chain_bsp(groups: &[(usize, Option<Vec<u8>>)]) -> Bsp {
    let n: usize = groups.iter().map(|g| g.0).sum();
    let mut bsp = Bsp::default();

    // per leaf visofs
    let mut visofs = Vec::with_capacity(n);
    for (count, row) in groups {
        let ofs = match row {
            Some(row) => {
                let ofs = bsp.visdata.len() as i32;
                compress_vis(row, &mut bsp.visdata);
                ofs
            }
            None => -1,
        };
        visofs.extend(std::iter::repeat(ofs).take(*count));
    }

    for k in 0..n {
        bsp.planes.push(DPlane {
            normal: [1.0, 0.0, 0.0],
            dist: (k + 1) as f32 * SLAB,
            plane_type: 0,
        });
    }
    // the floor
    bsp.planes.push(DPlane {
        normal: [0.0, 0.0, 1.0],
        dist: 0.0,
        plane_type: 2,
    });

    bsp.edges.push(DEdge::default());
    bsp.leafs.push(DLeaf {
        contents: CONTENTS_SOLID,
        visofs: -1,
        ..Default::default()
    });
    for k in 0..n {
        let x0 = k as f32 * SLAB;
        let x1 = x0 + SLAB;
        let base = bsp.vertexes.len() as u32;
        for point in [[x0, 0.0, 0.0], [x1, 0.0, 0.0], [x1, SLAB, 0.0], [x0, SLAB, 0.0]] {
            bsp.vertexes.push(DVertex { point });
        }
        let firstedge = bsp.surfedges.len() as i32;
        for i in 0..4 {
            bsp.surfedges.push(bsp.edges.len() as i32);
            bsp.edges.push(DEdge {
                v: [base + i, base + (i + 1) % 4],
            });
        }
        bsp.faces.push(DFace {
            planenum: n as u32,
            side: 0,
            firstedge,
            numedges: 4,
            texinfo: (k % 2) as u32,
            styles: [0, 255, 255, 255],
            lightofs: k as i32 * FACE_SAMPLES,
        });
        bsp.marksurfaces.push(k as u32);

        bsp.leafs.push(DLeaf {
            contents: CONTENTS_EMPTY,
            visofs: visofs[k],
            mins: [x0, 0.0, -8.0],
            maxs: [x1, SLAB, 8.0],
            firstmarksurface: k as u32,
            nummarksurfaces: 1,
            ambient_level: [0; 4],
        });

        let front = if k + 1 < n { (k + 1) as i32 } else { !0 };
        bsp.nodes.push(DNode {
            planenum: k as u32,
            children: [front, !((k + 1) as i32)],
            mins: [x0, 0.0, -8.0],
            maxs: [n as f32 * SLAB, SLAB, 8.0],
            firstface: k as u32,
            numfaces: 1,
        });
    }

    let axis = |s: [f32; 4], t: [f32; 4], miptex| TexInfo {
        vecs: [s, t],
        miptex,
        flags: 0,
    };
    bsp.texinfo = vec![
        axis([1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], 0),
        axis([1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], 1),
    ];
    bsp.textures = vec![
        Some(MipTex::new("wall", 16, 16)),
        Some(MipTex::new("floor", 16, 16)),
    ];

    // a single plane splitting the clip hulls at x = 64
    bsp.clipnodes.push(DClipNode {
        planenum: 0,
        children: [CONTENTS_EMPTY, CONTENTS_SOLID],
    });

    bsp.models.push(DModel {
        mins: [0.0, 0.0, -8.0],
        maxs: [n as f32 * SLAB, SLAB, 8.0],
        origin: [0.0; 3],
        headnode: [0; 4],
        visleafs: n as i32,
        firstface: 0,
        numfaces: n as i32,
    });

    bsp.lightdata = vec![0x80; n * FACE_SAMPLES as usize];
    bsp.entdata = b"{\n\"classname\" \"worldspawn\"\n}\n\0".to_vec();
    for (i, csum) in bsp.lump_checksums.iter_mut().enumerate().take(HEADER_LUMPS) {
        *csum = 1 << i;
    }
    bsp
}

/// Append a door: one node over one leaf holding a copy of face 0, with its
/// own clip-node.
pub(crate) fn add_submodel(bsp: &mut Bsp) {
    let leaf = bsp.leafs.len() as i32;
    let face = bsp.faces.len() as i32;
    let clipnode = bsp.clipnodes.len() as i32;
    let node = bsp.nodes.len() as i32;

    bsp.faces.push(bsp.faces[0]);
    bsp.leafs.push(DLeaf {
        contents: CONTENTS_EMPTY,
        visofs: -1,
        mins: [0.0, 0.0, -8.0],
        maxs: [SLAB, SLAB, 8.0],
        firstmarksurface: bsp.marksurfaces.len() as u32,
        nummarksurfaces: 0,
        ambient_level: [0; 4],
    });
    bsp.nodes.push(DNode {
        planenum: 0,
        children: [!leaf, !0],
        mins: [0.0, 0.0, -8.0],
        maxs: [SLAB, SLAB, 8.0],
        firstface: face as u32,
        numfaces: 1,
    });
    bsp.clipnodes.push(DClipNode {
        planenum: 0,
        children: [CONTENTS_EMPTY, CONTENTS_SOLID],
    });
    bsp.models.push(DModel {
        mins: [0.0, 0.0, -8.0],
        maxs: [SLAB, SLAB, 8.0],
        origin: [0.0; 3],
        headnode: [node, clipnode, clipnode, 0],
        visleafs: 0,
        firstface: face,
        numfaces: 1,
    });
}

/// Middle of leaf `leaf`'s slab, on the floor.
pub(crate) fn slab_center(leaf: usize) -> Vec3 {
    [(leaf as f32 - 0.5) * SLAB, SLAB / 2.0, 0.0]
}

pub(crate) fn loader() -> ModelLoader {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = BrushConfig::default()
        .with_worker_threads(2)
        .with_join_poll(Duration::from_millis(5));
    ModelLoader::new(config).unwrap()
}

pub(crate) fn load_world(bsp: Bsp) -> Model {
    loader()
        .load_brush_model("maps/test.bsp", bsp)
        .unwrap()
        .remove(0)
}
