// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// model_brush.rs — brush model loading
// Converts the parsed map into the in-memory model, derives parents, leaf
// flags, hulls, depths and clusters, then fans the submodels out.

use std::sync::Arc;

use qfmod_common::q_shared::{radius_from_bounds, vector_add, vector_length, vector_subtract, Plane, PlaneType, Vec3};
use qfmod_common::qfiles::{
    Bsp, DClipNode, DEdge, DFace, DLeaf, DModel, DNode, DPlane, DVertex, MipTex, TexInfo,
    HEADER_LUMPS, LEGACY_MAX_FACES, LEGACY_MAX_MARKSURFACES, LEGACY_MAX_NODES, LEGACY_MAX_VISLEAFS,
    LUMP_ENTITIES, LUMP_LEAFS, LUMP_NODES, LUMP_VISIBILITY, MAX_MAP_HULLS, TEX_SPECIAL,
};
use rayon::prelude::*;

use crate::clusters::merge_clusters;
use crate::config::BrushConfig;
use crate::error::{check_index, ModelError, Result};
use crate::hull::{base_hulls, find_clip_depth, find_draw_depth, load_clipnodes, make_hull0};
use crate::model_funcs::{copy_lighting, ModelFuncs};
use crate::model_types::{
    BrushModel, Hull, MEdge, MLeaf, MModel, MNode, MSurface, MTexInfo, MVertex, Model, NodeRef,
    SurfFlags,
};
use crate::textures::load_textures;
use crate::worker::WorkerPool;

/// Lumps at least this long are converted on the rayon global pool.
const PARALLEL_LUMP_THRESHOLD: usize = 64;

/// Regular and alternate animation.
const BRUSH_NUMFRAMES: i32 = 2;

/// Loads brush models. Owns the worker pool used for cluster visibility so
/// repeated map loads reuse the same threads.
pub struct ModelLoader {
    config: BrushConfig,
    funcs: Option<Arc<dyn ModelFuncs>>,
    pool: Arc<WorkerPool>,
}

impl ModelLoader {
    pub fn new(config: BrushConfig) -> Result<Self> {
        let pool = Arc::new(WorkerPool::new(config.worker_threads)?);
        Ok(Self {
            config,
            funcs: None,
            pool,
        })
    }

    /// Install renderer hooks.
    pub fn with_funcs(mut self, funcs: Arc<dyn ModelFuncs>) -> Self {
        self.funcs = Some(funcs);
        self
    }

    /// Share a pool with other loaders.
    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn config(&self) -> &BrushConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Build the world model `name` and its inline submodels `*1`, `*2`, ...
    /// from a parsed map. The map is consumed; nothing is returned on error.
    pub fn load_brush_model(&self, name: &str, mut bsp: Bsp) -> Result<Vec<Model>> {
        let mut ctx = BrushLoad {
            name,
            config: &self.config,
            funcs: self.funcs.as_deref(),
            brush: BrushModel::default(),
        };

        ctx.load_vertexes(&bsp.vertexes);
        ctx.load_edges(&bsp.edges)?;
        ctx.load_surfedges(&bsp.surfedges);
        ctx.load_textures(std::mem::take(&mut bsp.textures))?;
        ctx.load_lighting(&bsp);
        ctx.load_planes(&bsp.planes);
        ctx.load_texinfo(&bsp.texinfo)?;
        ctx.load_faces(&bsp.faces)?;
        ctx.load_marksurfaces(&bsp.marksurfaces)?;
        ctx.load_visibility(std::mem::take(&mut bsp.visdata));
        ctx.load_leafs(&bsp.leafs)?;
        ctx.load_nodes(&bsp.nodes)?;
        ctx.load_clipnodes(&bsp.clipnodes)?;
        ctx.load_entities(&bsp.entdata);
        ctx.load_submodels(&bsp.models)?;

        ctx.brush.hull0_clipnodes = make_hull0(&ctx.brush.nodes, &ctx.brush.leafs);
        ctx.brush.depth = find_draw_depth(name, &ctx.brush.nodes)?;
        let hulls = ctx.submodel_hulls()?;
        ctx.set_model_index()?;
        ctx.do_checksums(&bsp.lump_checksums);

        ctx.brush.clusters = merge_clusters(name, &ctx.brush, &self.pool, self.config.join_poll)?;
        let cluster_map = &ctx.brush.clusters.cluster_map;
        for (leaf, cluster) in ctx.brush.leafs.iter_mut().zip(cluster_map.iter()) {
            leaf.cluster = *cluster;
        }

        drop(bsp);
        Ok(ctx.spread_submodels(hulls))
    }
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("config", &self.config)
            .field("funcs", &self.funcs.is_some())
            .field("pool", &self.pool)
            .finish()
    }
}

/// State of one load in progress.
struct BrushLoad<'a> {
    name: &'a str,
    config: &'a BrushConfig,
    funcs: Option<&'a dyn ModelFuncs>,
    brush: BrushModel,
}

impl BrushLoad<'_> {
    // ============================================================
    // Lumps
    // ============================================================

    fn load_vertexes(&mut self, input: &[DVertex]) {
        let convert = |v: &DVertex| MVertex { position: v.point };
        self.brush.vertexes = if input.len() >= PARALLEL_LUMP_THRESHOLD {
            input.par_iter().map(convert).collect()
        } else {
            input.iter().map(convert).collect()
        };
    }

    fn load_edges(&mut self, input: &[DEdge]) -> Result<()> {
        let numverts = self.brush.vertexes.len();
        let mut out = Vec::with_capacity(input.len());
        for e in input {
            for &v in &e.v {
                check_index(self.name, "edge vertex", v as i64, numverts)?;
            }
            out.push(MEdge { v: e.v });
        }
        self.brush.edges = out;
        Ok(())
    }

    fn load_surfedges(&mut self, input: &[i32]) {
        self.brush.surfedges = input.to_vec();
    }

    fn load_textures(&mut self, miptex: Vec<Option<MipTex>>) -> Result<()> {
        let loaded = load_textures(self.name, miptex, self.funcs)?;
        self.brush.textures = loaded.textures;
        self.brush.skytexture = loaded.skytexture;
        Ok(())
    }

    fn load_lighting(&mut self, bsp: &Bsp) {
        self.brush.lightdata = match self.funcs {
            Some(funcs) => funcs.load_lighting(bsp),
            None => copy_lighting(bsp),
        };
    }

    fn load_planes(&mut self, input: &[DPlane]) {
        let convert = |p: &DPlane| {
            Plane::new(p.normal, p.dist, PlaneType::from_disk(p.plane_type, &p.normal))
        };
        self.brush.planes = if input.len() >= PARALLEL_LUMP_THRESHOLD {
            input.par_iter().map(convert).collect()
        } else {
            input.iter().map(convert).collect()
        };
        log::debug!("{}: {} planes", self.name, self.brush.planes.len());
    }

    fn load_texinfo(&mut self, input: &[TexInfo]) -> Result<()> {
        let numtextures = self.brush.textures.len();
        let mut out = Vec::with_capacity(input.len());
        for ti in input {
            let axis = |v: &[f32; 4]| vector_length(&[v[0], v[1], v[2]]);
            let len = (axis(&ti.vecs[0]) + axis(&ti.vecs[1])) / 2.0;
            let mipadjust = if len < 0.32 {
                4.0
            } else if len < 0.49 {
                3.0
            } else if len < 0.99 {
                2.0
            } else {
                1.0
            };

            let mut info = MTexInfo {
                vecs: ti.vecs,
                mipadjust,
                texture: None,
                flags: ti.flags,
            };
            if numtextures == 0 {
                info.flags = 0;
            } else {
                let idx = check_index(self.name, "miptex", ti.miptex as i64, numtextures)?;
                if self.brush.textures[idx].is_some() {
                    info.texture = Some(idx);
                } else {
                    info.flags = 0;
                }
            }
            out.push(info);
        }
        self.brush.texinfo = out;
        Ok(())
    }

    /// Vertex at the start of surfedge `e`, walking the edge backwards for
    /// negative values.
    fn surfedge_vertex(&self, e: i32) -> Result<&MVertex> {
        let edge_idx = e.unsigned_abs() as i64;
        let idx = check_index(self.name, "edge", edge_idx, self.brush.edges.len())?;
        let edge = &self.brush.edges[idx];
        let v = if e >= 0 { edge.v[0] } else { edge.v[1] };
        Ok(&self.brush.vertexes[v as usize])
    }

    /// Texture-space bounds of a surface snapped to the 16 unit lightmap grid.
    fn calc_surface_extents(&self, surfnum: usize, surf: &mut MSurface) -> Result<()> {
        let tex = &self.brush.texinfo[surf.texinfo];
        let mut mins = [999999.0f32; 2];
        let mut maxs = [-99999.0f32; 2];
        if surf.numedges == 0 {
            mins = [0.0; 2];
            maxs = [0.0; 2];
        }

        for i in 0..surf.numedges {
            let e = self.brush.surfedges[surf.firstedge + i];
            let v = self.surfedge_vertex(e)?;
            for j in 0..2 {
                let val = v.position[0] * tex.vecs[j][0]
                    + v.position[1] * tex.vecs[j][1]
                    + v.position[2] * tex.vecs[j][2]
                    + tex.vecs[j][3];
                mins[j] = mins[j].min(val);
                maxs[j] = maxs[j].max(val);
            }
        }

        for i in 0..2 {
            let bmins = (mins[i] / 16.0).floor() as i32;
            let bmaxs = (maxs[i] / 16.0).ceil() as i32;
            surf.texturemins[i] = bmins * 16;
            surf.extents[i] = (bmaxs - bmins) * 16;
            if let Some(limit) = self.config.extents_limit {
                if tex.flags & TEX_SPECIAL == 0 && surf.extents[i] > limit {
                    return Err(ModelError::BadSurfaceExtents {
                        model: self.name.to_string(),
                        surface: surfnum,
                        extents: surf.extents[i],
                    });
                }
            }
        }
        Ok(())
    }

    fn load_faces(&mut self, input: &[DFace]) -> Result<()> {
        if input.len() > LEGACY_MAX_FACES {
            log::warn!(
                "{}: {} faces exceeds standard limit of {}",
                self.name,
                input.len(),
                LEGACY_MAX_FACES
            );
        }

        let numsurfedges = self.brush.surfedges.len() as i64;
        let mut surfaces = Vec::with_capacity(input.len());
        for (surfnum, face) in input.iter().enumerate() {
            let plane = check_index(self.name, "face plane", face.planenum as i64, self.brush.planes.len())?;
            let texinfo = check_index(self.name, "texinfo", face.texinfo as i64, self.brush.texinfo.len())?;
            let first = face.firstedge as i64;
            let last = first + face.numedges as i64;
            if first < 0 || face.numedges < 0 || last > numsurfedges {
                return Err(ModelError::bad_index(self.name, "surfedge", last, numsurfedges as usize));
            }

            let mut surf = MSurface {
                plane,
                texinfo,
                firstedge: first as usize,
                numedges: face.numedges as usize,
                styles: face.styles,
                ..Default::default()
            };
            if face.side != 0 {
                surf.flags |= SurfFlags::PLANEBACK;
            }

            self.calc_surface_extents(surfnum, &mut surf)?;

            surf.samples = match (&self.brush.lightdata, face.lightofs) {
                (Some(_), ofs) if ofs >= 0 => Some(ofs as usize * self.config.lightmap_bytes),
                _ => None,
            };

            // surfaces without a texture keep no draw flags
            let Some(tex) = self.brush.texinfo[texinfo]
                .texture
                .and_then(|t| self.brush.textures[t].as_ref())
            else {
                surfaces.push(surf);
                continue;
            };

            if tex.name.starts_with("sky") {
                surf.flags |= SurfFlags::DRAWSKY | SurfFlags::DRAWTILED;
                if self.config.sky_divide {
                    if let Some(funcs) = self.funcs {
                        funcs.subdivide_surface(&self.brush, &mut surf);
                    }
                }
            } else if tex.name.starts_with('*') {
                surf.flags |= SurfFlags::DRAWTURB | SurfFlags::DRAWTILED | SurfFlags::LIGHTBOTHSIDES;
                surf.extents = [16384; 2];
                surf.texturemins = [-8192; 2];
                // cut up polygon for warps
                if let Some(funcs) = self.funcs {
                    funcs.subdivide_surface(&self.brush, &mut surf);
                }
            } else if tex.name.starts_with('{') {
                surf.flags |= SurfFlags::DRAWALPHA;
            }
            surfaces.push(surf);
        }
        self.brush.surfaces = surfaces;
        Ok(())
    }

    fn load_marksurfaces(&mut self, input: &[u32]) -> Result<()> {
        if input.len() > LEGACY_MAX_MARKSURFACES {
            log::warn!(
                "{}: {} marksurfaces exceeds standard limit of {}",
                self.name,
                input.len(),
                LEGACY_MAX_MARKSURFACES
            );
        }
        let numsurfaces = self.brush.surfaces.len();
        for &s in input {
            check_index(self.name, "marksurface", s as i64, numsurfaces)?;
        }
        self.brush.marksurfaces = input.to_vec();
        Ok(())
    }

    fn load_visibility(&mut self, visdata: Vec<u8>) {
        self.brush.visdata = visdata;
    }

    fn load_leafs(&mut self, input: &[DLeaf]) -> Result<()> {
        let numvis = self.brush.visdata.len();
        let nummarks = self.brush.marksurfaces.len();
        let mut out = Vec::with_capacity(input.len());
        for leaf in input {
            let compressed_vis = match leaf.visofs {
                -1 => None,
                _ if numvis == 0 => None,
                ofs => Some(check_index(self.name, "leaf visofs", ofs as i64, numvis)?),
            };
            let first = leaf.firstmarksurface as usize;
            let count = leaf.nummarksurfaces as usize;
            if first + count > nummarks {
                return Err(ModelError::bad_index(
                    self.name,
                    "leaf marksurface",
                    (first + count) as i64,
                    nummarks,
                ));
            }

            let mut minmaxs = [0.0f32; 6];
            minmaxs[..3].copy_from_slice(&leaf.mins);
            minmaxs[3..].copy_from_slice(&leaf.maxs);
            out.push(MLeaf {
                contents: leaf.contents,
                cluster: None,
                minmaxs,
                compressed_vis,
                firstmarksurface: first,
                nummarksurfaces: count,
                ambient_sound_level: leaf.ambient_level,
            });
        }
        self.brush.leafs = out;
        log::debug!("{}: {} leafs", self.name, self.brush.leafs.len());
        Ok(())
    }

    fn load_nodes(&mut self, input: &[DNode]) -> Result<()> {
        if input.len() > LEGACY_MAX_NODES {
            log::warn!(
                "{}: {} nodes exceeds standard limit of {}",
                self.name,
                input.len(),
                LEGACY_MAX_NODES
            );
        }

        let numleafs = self.brush.leafs.len();
        let mut out = Vec::with_capacity(input.len());
        for dn in input {
            let planenum = check_index(self.name, "node plane", dn.planenum as i64, self.brush.planes.len())?;
            let plane = &self.brush.planes[planenum];

            let mut children = [NodeRef::Leaf(0); 2];
            for (child, &raw) in children.iter_mut().zip(dn.children.iter()) {
                *child = NodeRef::from_disk(raw);
                match *child {
                    NodeRef::Node(n) => check_index(self.name, "node child", n as i64, input.len())?,
                    NodeRef::Leaf(l) => check_index(self.name, "node leaf", l as i64, numleafs)?,
                };
            }

            let mut minmaxs = [0.0f32; 6];
            minmaxs[..3].copy_from_slice(&dn.mins);
            minmaxs[3..].copy_from_slice(&dn.maxs);
            out.push(MNode {
                plane: plane.to_vec4(),
                planenum: planenum as u32,
                plane_type: plane.plane_type,
                signbits: plane.signbits,
                children,
                minmaxs,
                firstsurface: dn.firstface,
                numsurfaces: dn.numfaces,
            });
        }
        self.brush.nodes = out;

        self.set_parents()?;
        self.set_leaf_flags();
        Ok(())
    }

    /// Parent of every node and leaf reachable from node 0. The solid leaf 0
    /// is shared and keeps no parent.
    fn set_parents(&mut self) -> Result<()> {
        let brush = &mut self.brush;
        brush.node_parents = vec![None; brush.nodes.len()];
        brush.leaf_parents = vec![None; brush.leafs.len()];
        if brush.nodes.is_empty() {
            return Ok(());
        }

        let mut visited = vec![false; brush.nodes.len()];
        let mut leaf_seen = vec![false; brush.leafs.len()];
        let mut stack = vec![(NodeRef::Node(0), None)];
        while let Some((node, parent)) = stack.pop() {
            match node {
                NodeRef::Leaf(0) => {}
                NodeRef::Leaf(l) => {
                    let l = l as usize;
                    if leaf_seen[l] {
                        return Err(ModelError::CyclicTree {
                            model: self.name.to_string(),
                            what: "leaf",
                            node: l,
                        });
                    }
                    leaf_seen[l] = true;
                    brush.leaf_parents[l] = parent;
                }
                NodeRef::Node(n) => {
                    let n = n as usize;
                    if visited[n] {
                        return Err(ModelError::CyclicTree {
                            model: self.name.to_string(),
                            what: "node",
                            node: n,
                        });
                    }
                    visited[n] = true;
                    brush.node_parents[n] = parent;
                    let children = brush.nodes[n].children;
                    stack.push((children[1], Some(n as u32)));
                    stack.push((children[0], Some(n as u32)));
                }
            }
        }
        Ok(())
    }

    fn set_leaf_flags(&mut self) {
        let brush = &self.brush;
        let flags = brush
            .leafs
            .iter()
            .map(|leaf| {
                brush.marksurfaces[leaf.firstmarksurface..][..leaf.nummarksurfaces]
                    .iter()
                    .fold(SurfFlags::empty(), |acc, &s| acc | brush.surfaces[s as usize].flags)
            })
            .collect();
        self.brush.leaf_flags = flags;
    }

    fn load_clipnodes(&mut self, input: &[DClipNode]) -> Result<()> {
        self.brush.clipnodes = load_clipnodes(self.name, input, self.brush.planes.len())?;
        Ok(())
    }

    fn load_entities(&mut self, entdata: &[u8]) {
        let end = entdata.iter().position(|&b| b == 0).unwrap_or(entdata.len());
        self.brush.entities = String::from_utf8_lossy(&entdata[..end]).into_owned();
    }

    fn load_submodels(&mut self, input: &[DModel]) -> Result<()> {
        if input.is_empty() {
            return Err(ModelError::NoModels {
                model: self.name.to_string(),
            });
        }
        // spread the mins / maxs by a pixel
        let offset: Vec3 = [1.0, 1.0, 1.0];
        let mut out = Vec::with_capacity(input.len());
        for dm in input {
            let firstface = check_index(self.name, "submodel face", dm.firstface as i64, usize::MAX)?;
            let numfaces = check_index(self.name, "submodel face count", dm.numfaces as i64, usize::MAX)?;
            out.push(MModel {
                mins: vector_subtract(&dm.mins, &offset),
                maxs: vector_add(&dm.maxs, &offset),
                origin: dm.origin,
                headnode: dm.headnode,
                visleafs: dm.visleafs.max(0) as u32,
                firstface,
                numfaces,
            });
        }

        if out[0].visleafs > LEGACY_MAX_VISLEAFS {
            log::warn!(
                "{}: {} visleafs exceeds standard limit of {}",
                self.name,
                out[0].visleafs,
                LEGACY_MAX_VISLEAFS
            );
        }
        self.brush.submodels = out;
        Ok(())
    }

    // ============================================================
    // Derived data
    // ============================================================

    /// Hulls of every submodel, rooted at its head nodes, with depths.
    fn submodel_hulls(&self) -> Result<Vec<[Hull; MAX_MAP_HULLS]>> {
        let base = base_hulls(self.brush.nodes.len(), self.brush.clipnodes.len());
        let mut all = Vec::with_capacity(self.brush.submodels.len());
        for sub in &self.brush.submodels {
            check_index(self.name, "submodel headnode", sub.headnode[0] as i64, self.brush.nodes.len())?;
            let mut hulls = base;
            for (j, hull) in hulls.iter_mut().enumerate() {
                hull.firstclipnode = sub.headnode[j];
                hull.depth = find_clip_depth(self.name, hull, &self.brush)?;
            }
            all.push(hulls);
        }
        Ok(all)
    }

    /// Tag every surface with the submodel whose face range holds it.
    fn set_model_index(&mut self) -> Result<()> {
        let numsurfaces = self.brush.surfaces.len();
        for (i, sub) in self.brush.submodels.iter().enumerate() {
            let end = sub.firstface + sub.numfaces;
            if end > numsurfaces {
                return Err(ModelError::bad_index(self.name, "submodel face", end as i64, numsurfaces));
            }
            for surf in &mut self.brush.surfaces[sub.firstface..end] {
                surf.model_index = i;
            }
        }
        Ok(())
    }

    /// `checksum` covers every lump but the entities; `checksum2` also
    /// leaves out the visibility, leafs and nodes.
    fn do_checksums(&mut self, lump_checksums: &[u32; HEADER_LUMPS]) {
        let mut checksum = 0;
        let mut checksum2 = 0;
        for (i, &csum) in lump_checksums.iter().enumerate() {
            if i == LUMP_ENTITIES {
                continue;
            }
            checksum ^= csum;
            if i != LUMP_VISIBILITY && i != LUMP_LEAFS && i != LUMP_NODES {
                checksum2 ^= csum;
            }
        }
        self.brush.checksum = checksum;
        self.brush.checksum2 = checksum2;
    }

    /// The world model and one `*N` model per further submodel, all sharing
    /// the same geometry.
    fn spread_submodels(self, hulls: Vec<[Hull; MAX_MAP_HULLS]>) -> Vec<Model> {
        let name = self.name;
        let brush = Arc::new(self.brush);
        let models = brush
            .submodels
            .iter()
            .zip(hulls)
            .enumerate()
            .map(|(i, (sub, hulls))| Model {
                name: if i == 0 {
                    name.to_string()
                } else {
                    format!("*{}", i)
                },
                numframes: BRUSH_NUMFRAMES,
                mins: sub.mins,
                maxs: sub.maxs,
                radius: radius_from_bounds(&sub.mins, &sub.maxs),
                firstmodelsurface: sub.firstface,
                nummodelsurfaces: sub.numfaces,
                visleafs: sub.visleafs,
                modleafs: sub.visleafs + 1,
                hulls,
                brush: Arc::clone(&brush),
                owns_brush: i == 0,
            })
            .collect();
        models
    }
}
