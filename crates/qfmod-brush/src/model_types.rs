// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// model_types.rs — in-memory brush model records
// d* structures (qfmod_common::qfiles) are the parsed file,
// m* structures here are what the loader builds from them.

use std::sync::Arc;

use qfmod_common::q_shared::{Plane, PlaneType, Vec3, Vec4};
use qfmod_common::qfiles::{MAXLIGHTMAPS, MAX_MAP_HULLS, MIPLEVELS, NUM_AMBIENTS};

// ============================================================================
// Tree references
// ============================================================================

/// A child slot of a draw node. On disk a negative value is the bitwise
/// complement of a leaf index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Node(u32),
    Leaf(u32),
}

impl NodeRef {
    #[inline]
    pub fn from_disk(child: i32) -> Self {
        if child >= 0 {
            NodeRef::Node(child as u32)
        } else {
            NodeRef::Leaf(!child as u32)
        }
    }

    #[inline]
    pub fn to_disk(self) -> i32 {
        match self {
            NodeRef::Node(n) => n as i32,
            NodeRef::Leaf(l) => !(l as i32),
        }
    }
}

// ============================================================================
// Surfaces
// ============================================================================

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfFlags: u32 {
        const PLANEBACK      = 0x0002;
        const DRAWSKY        = 0x0004;
        const DRAWSPRITE     = 0x0008;
        const DRAWTURB       = 0x0010;
        const DRAWTILED      = 0x0020;
        const DRAWBACKGROUND = 0x0040;
        const UNDERWATER     = 0x0080;
        const DONTWARP       = 0x0100;
        const DRAWNOALPHA    = 0x0200;
        const DRAWFULLBRIGHT = 0x0400;
        const LIGHTBOTHSIDES = 0x0800;
        const DRAWALPHA      = 0x1000;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MVertex {
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MEdge {
    pub v: [u32; 2],
}

/// Frame duration of animated textures, in animation ticks.
pub const ANIM_CYCLE: i32 = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Backend private block, `ModelFuncs::texture_render_size` bytes.
    pub render: Vec<u8>,
    /// Frames in the sequence, 0 when not animating.
    pub anim_total: i32,
    pub anim_min: i32,
    pub anim_max: i32,
    pub anim_next: Option<usize>,
    pub alternate_anims: Option<usize>,
    /// Start of each mip level within `pixels`.
    pub offsets: [u32; MIPLEVELS],
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MTexInfo {
    pub vecs: [[f32; 4]; 2],
    pub mipadjust: f32,
    pub texture: Option<usize>,
    pub flags: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MSurface {
    pub plane: usize,
    pub flags: SurfFlags,
    pub firstedge: usize,
    pub numedges: usize,
    pub texturemins: [i32; 2],
    pub extents: [i32; 2],
    pub texinfo: usize,
    pub styles: [u8; MAXLIGHTMAPS],
    /// Byte offset into the lightmap data, `None` when unlit.
    pub samples: Option<usize>,
    /// Submodel whose face range holds this surface.
    pub model_index: usize,
}

// ============================================================================
// BSP tree
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MNode {
    /// Splitting plane packed as `[normal, -dist]`.
    pub plane: Vec4,
    pub planenum: u32,
    pub plane_type: PlaneType,
    pub signbits: u8,
    pub children: [NodeRef; 2],
    /// mins[3] followed by maxs[3]
    pub minmaxs: [f32; 6],
    pub firstsurface: u32,
    pub numsurfaces: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MLeaf {
    pub contents: i32,
    pub cluster: Option<u32>,
    pub minmaxs: [f32; 6],
    /// Offset of the leaf's row in `BrushModel::visdata`.
    pub compressed_vis: Option<usize>,
    pub firstmarksurface: usize,
    pub nummarksurfaces: usize,
    pub ambient_sound_level: [u8; NUM_AMBIENTS],
}

// ============================================================================
// Hulls
// ============================================================================

/// Children `>= 0` are clip-node indices, negative values are contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MClipNode {
    pub planenum: u32,
    pub children: [i32; 2],
}

/// Which clip-node array a hull walks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HullSource {
    /// `BrushModel::hull0_clipnodes`, rebuilt from the draw tree.
    Draw,
    /// `BrushModel::clipnodes`, straight from the file.
    ClipNodes,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Hull {
    pub source: HullSource,
    pub firstclipnode: i32,
    pub lastclipnode: i32,
    pub clip_mins: Vec3,
    pub clip_maxs: Vec3,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub headnode: [i32; MAX_MAP_HULLS],
    pub visleafs: u32,
    pub firstface: usize,
    pub numfaces: usize,
}

// ============================================================================
// Clusters
// ============================================================================

/// Run of leafs sharing one visibility row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeafMap {
    pub first_leaf: u32,
    pub num_leafs: u32,
}

/// Slice of `ClusterData::cluster_surfs`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cluster {
    pub first_surface: u32,
    pub num_surfaces: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClusterChild {
    Node(u32),
    Cluster(u32),
    /// Outside every cluster (the solid leaf and empty trees). Only a tree
    /// root can be `Solid`: a node with one solid side collapses into its
    /// other side, so points in solid space next to a cluster resolve to
    /// that cluster.
    #[default]
    Solid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterNode {
    pub plane: Vec4,
    pub children: [ClusterChild; 2],
}

/// Draw tree with every node whose sides land in the same cluster removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterTree {
    pub nodes: Vec<ClusterNode>,
    pub root: ClusterChild,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterData {
    pub num_clusters: u32,
    /// Indexed by leaf, `None` for the solid leaf and non-world leafs.
    pub cluster_map: Vec<Option<u32>>,
    pub leaf_map: Vec<LeafMap>,
    pub clusters: Vec<Cluster>,
    pub cluster_surfs: Vec<u32>,
    /// Compressed cluster-to-cluster visibility rows.
    pub cluster_vis: Vec<u8>,
    pub cluster_offs: Vec<u32>,
    pub tree: ClusterTree,
}

// ============================================================================
// Whole model
// ============================================================================

/// Geometry shared by the world and all of its inline submodels.
#[derive(Debug, Clone, Default)]
pub struct BrushModel {
    pub planes: Vec<Plane>,
    pub vertexes: Vec<MVertex>,
    pub edges: Vec<MEdge>,
    pub surfedges: Vec<i32>,
    pub textures: Vec<Option<Texture>>,
    pub skytexture: Option<usize>,
    pub texinfo: Vec<MTexInfo>,
    pub surfaces: Vec<MSurface>,
    pub marksurfaces: Vec<u32>,
    pub leafs: Vec<MLeaf>,
    pub nodes: Vec<MNode>,
    pub clipnodes: Vec<MClipNode>,
    pub hull0_clipnodes: Vec<MClipNode>,
    pub submodels: Vec<MModel>,

    pub visdata: Vec<u8>,
    pub lightdata: Option<Vec<u8>>,
    pub entities: String,

    pub node_parents: Vec<Option<u32>>,
    pub leaf_parents: Vec<Option<u32>>,
    /// Union of the surface flags seen from each leaf.
    pub leaf_flags: Vec<SurfFlags>,

    /// Deepest draw-tree path, counted in nodes plus the final leaf.
    pub depth: u32,
    pub checksum: u32,
    pub checksum2: u32,

    pub clusters: ClusterData,
}

/// One loaded model: the world (`owns_brush`) or an inline `*N` submodel.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub numframes: i32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub radius: f32,
    pub firstmodelsurface: usize,
    pub nummodelsurfaces: usize,
    pub visleafs: u32,
    pub modleafs: u32,
    pub hulls: [Hull; MAX_MAP_HULLS],
    pub brush: Arc<BrushModel>,
    /// Only the world model tears the shared geometry down.
    pub owns_brush: bool,
}

impl Model {
    /// Surfaces belonging to this model.
    pub fn surfaces(&self) -> &[MSurface] {
        let end = self.firstmodelsurface + self.nummodelsurfaces;
        self.brush
            .surfaces
            .get(self.firstmodelsurface..end)
            .unwrap_or(&[])
    }
}
