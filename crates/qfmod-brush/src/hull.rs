// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// hull.rs — collision hulls: hull 0 from the draw tree, hulls 1/2 from the
// clip-node lump, tree depths and point contents

use qfmod_common::q_shared::{Vec3, CONTENTS_EMPTY, CONTENTS_SOLID};
use qfmod_common::qfiles::{DClipNode, MAX_MAP_HULLS};

use crate::error::{check_index, ModelError, Result};
use crate::model_types::{BrushModel, Hull, HullSource, MClipNode, MLeaf, MNode, NodeRef};

pub const HULL1_MINS: Vec3 = [-16.0, -16.0, -24.0];
pub const HULL1_MAXS: Vec3 = [16.0, 16.0, 32.0];
pub const HULL2_MINS: Vec3 = [-32.0, -32.0, -24.0];
pub const HULL2_MAXS: Vec3 = [32.0, 32.0, 64.0];

/// Child values at or above the lump size are extended BSP29 indices.
const EXTENDED_CLIPNODE_BIAS: i32 = 65536;

impl Hull {
    pub fn clipnodes<'a>(&self, brush: &'a BrushModel) -> &'a [MClipNode] {
        match self.source {
            HullSource::Draw => &brush.hull0_clipnodes,
            HullSource::ClipNodes => &brush.clipnodes,
            HullSource::None => &[],
        }
    }

    /// True when the hull has no clip-node to start from.
    pub fn is_empty(&self, brush: &BrushModel) -> bool {
        let count = self.clipnodes(brush).len() as i64;
        self.source == HullSource::None
            || self.firstclipnode < 0
            || self.firstclipnode > self.lastclipnode
            || self.firstclipnode as i64 >= count
    }

    /// Contents code at `p`, walking from `firstclipnode`.
    pub fn point_contents(&self, brush: &BrushModel, p: &Vec3) -> i32 {
        if self.source == HullSource::None {
            return CONTENTS_EMPTY;
        }
        let nodes = self.clipnodes(brush);
        let mut num = self.firstclipnode;
        // a well formed hull never revisits a node
        for _ in 0..=nodes.len() {
            if num < 0 {
                return num;
            }
            let Some(node) = nodes.get(num as usize) else {
                return CONTENTS_SOLID;
            };
            let Some(plane) = brush.planes.get(node.planenum as usize) else {
                return CONTENTS_SOLID;
            };
            let d = plane.diff(p);
            num = node.children[(d < 0.0) as usize];
        }
        CONTENTS_SOLID
    }
}

/// Replicate the draw tree as a clipping hull; leaf children become the
/// leaf's contents.
pub(crate) fn make_hull0(nodes: &[MNode], leafs: &[MLeaf]) -> Vec<MClipNode> {
    nodes
        .iter()
        .map(|node| {
            let mut children = [0i32; 2];
            for (out, child) in children.iter_mut().zip(node.children.iter()) {
                *out = match *child {
                    NodeRef::Node(n) => n as i32,
                    NodeRef::Leaf(l) => leafs
                        .get(l as usize)
                        .map(|leaf| leaf.contents)
                        .unwrap_or(CONTENTS_SOLID),
                };
            }
            MClipNode {
                planenum: node.planenum,
                children,
            }
        })
        .collect()
}

pub(crate) fn load_clipnodes(
    model: &str,
    input: &[DClipNode],
    numplanes: usize,
) -> Result<Vec<MClipNode>> {
    let count = input.len() as i32;
    if input.len() > qfmod_common::qfiles::LEGACY_MAX_CLIPNODES {
        log::warn!(
            "{}: {} clipnodes exceeds standard limit of {}",
            model,
            input.len(),
            qfmod_common::qfiles::LEGACY_MAX_CLIPNODES
        );
    }

    let mut out = Vec::with_capacity(input.len());
    for din in input {
        check_index(model, "clipnode plane", din.planenum as i64, numplanes)?;
        let mut children = din.children;
        for child in children.iter_mut() {
            if *child >= count {
                *child -= EXTENDED_CLIPNODE_BIAS;
            }
            if *child >= 0 && *child > count - 1 {
                return Err(ModelError::bad_index(
                    model,
                    "clipnode child",
                    *child as i64,
                    input.len(),
                ));
            }
        }
        out.push(MClipNode {
            planenum: din.planenum,
            children,
        });
    }
    Ok(out)
}

/// Hulls of the world before the submodel head nodes are applied.
pub(crate) fn base_hulls(numnodes: usize, numclipnodes: usize) -> [Hull; MAX_MAP_HULLS] {
    let mut hulls = [Hull::default(); MAX_MAP_HULLS];
    hulls[0] = Hull {
        source: HullSource::Draw,
        firstclipnode: 0,
        lastclipnode: numnodes as i32 - 1,
        ..Default::default()
    };
    for (hull, (mins, maxs)) in hulls[1..3]
        .iter_mut()
        .zip([(HULL1_MINS, HULL1_MAXS), (HULL2_MINS, HULL2_MAXS)])
    {
        *hull = Hull {
            source: HullSource::ClipNodes,
            firstclipnode: 0,
            lastclipnode: numclipnodes as i32 - 1,
            clip_mins: mins,
            clip_maxs: maxs,
            depth: 0,
        };
    }
    hulls
}

/// Deepest path through the draw tree from node 0, counting the leaf.
pub(crate) fn find_draw_depth(model: &str, nodes: &[MNode]) -> Result<u32> {
    if nodes.is_empty() {
        return Ok(0);
    }
    let mut depth = 0;
    let mut stack = vec![(NodeRef::Node(0), 1u32)];
    while let Some((node, d)) = stack.pop() {
        match node {
            NodeRef::Leaf(_) => depth = depth.max(d),
            NodeRef::Node(n) => {
                if d as usize > nodes.len() {
                    return Err(ModelError::CyclicTree {
                        model: model.to_string(),
                        what: "node",
                        node: n as usize,
                    });
                }
                let children = nodes[n as usize].children;
                stack.push((children[1], d + 1));
                stack.push((children[0], d + 1));
            }
        }
    }
    Ok(depth)
}

/// Walk state of one clip-node in `find_clip_depth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done(u32),
}

/// Deepest path through a hull's clip-nodes, 0 for an empty hull.
///
/// Post-order walk memoising each node's depth, so nodes shared between
/// several parents are visited once. A node found on its own walk stack is
/// a cycle.
pub(crate) fn find_clip_depth(model: &str, hull: &Hull, brush: &BrushModel) -> Result<u32> {
    if hull.is_empty(brush) {
        return Ok(0);
    }
    let nodes = hull.clipnodes(brush);
    let root = hull.firstclipnode as usize;
    let mut marks = vec![Mark::Unvisited; nodes.len()];
    let mut stack = vec![root];
    while let Some(&num) = stack.last() {
        marks[num] = Mark::OnStack;
        let mut pending = None;
        // a contents child is a leaf, one level down
        let mut deepest = 1;
        for &child in &nodes[num].children {
            if child < 0 {
                continue;
            }
            let c = child as usize;
            match marks.get(c) {
                None => return Err(ModelError::bad_index(model, "clipnode", child as i64, nodes.len())),
                Some(Mark::Done(d)) => deepest = deepest.max(*d),
                Some(Mark::OnStack) => {
                    return Err(ModelError::CyclicTree {
                        model: model.to_string(),
                        what: "clipnode",
                        node: c,
                    })
                }
                Some(Mark::Unvisited) => {
                    pending = Some(c);
                    break;
                }
            }
        }
        match pending {
            Some(c) => stack.push(c),
            None => {
                marks[num] = Mark::Done(deepest + 1);
                stack.pop();
            }
        }
    }
    match marks[root] {
        Mark::Done(d) => Ok(d),
        _ => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qfmod_common::q_shared::{Plane, PlaneType, CONTENTS_WATER};

    fn node(planenum: u32, children: [NodeRef; 2]) -> MNode {
        MNode {
            plane: [1.0, 0.0, 0.0, 0.0],
            planenum,
            plane_type: PlaneType::X,
            signbits: 0,
            children,
            minmaxs: [0.0; 6],
            firstsurface: 0,
            numsurfaces: 0,
        }
    }

    fn leaf(contents: i32) -> MLeaf {
        MLeaf {
            contents,
            ..Default::default()
        }
    }

    /// node 0 splits x = 0, node 1 splits y = 0 on the front side.
    fn small_brush() -> BrushModel {
        let nodes = vec![
            node(0, [NodeRef::Node(1), NodeRef::Leaf(3)]),
            node(1, [NodeRef::Leaf(1), NodeRef::Leaf(2)]),
        ];
        let leafs = vec![
            leaf(CONTENTS_SOLID),
            leaf(CONTENTS_EMPTY),
            leaf(CONTENTS_WATER),
            leaf(CONTENTS_EMPTY),
        ];
        let hull0 = make_hull0(&nodes, &leafs);
        BrushModel {
            planes: vec![
                Plane::new([1.0, 0.0, 0.0], 0.0, PlaneType::X),
                Plane::new([0.0, 1.0, 0.0], 0.0, PlaneType::Y),
            ],
            nodes,
            leafs,
            hull0_clipnodes: hull0,
            ..Default::default()
        }
    }

    #[test]
    fn test_make_hull0() {
        let brush = small_brush();
        assert_eq!(
            brush.hull0_clipnodes,
            vec![
                MClipNode { planenum: 0, children: [1, CONTENTS_EMPTY] },
                MClipNode { planenum: 1, children: [CONTENTS_EMPTY, CONTENTS_WATER] },
            ]
        );
    }

    #[test]
    fn test_hull0_point_contents() {
        let brush = small_brush();
        let hulls = base_hulls(brush.nodes.len(), 0);
        assert_eq!(hulls[0].point_contents(&brush, &[5.0, -5.0, 0.0]), CONTENTS_WATER);
        assert_eq!(hulls[0].point_contents(&brush, &[5.0, 5.0, 0.0]), CONTENTS_EMPTY);
        assert_eq!(hulls[0].point_contents(&brush, &[-5.0, 5.0, 0.0]), CONTENTS_EMPTY);
        assert_eq!(hulls[3].point_contents(&brush, &[0.0; 3]), CONTENTS_EMPTY);
    }

    #[test]
    fn test_depths() {
        let mut brush = small_brush();
        assert_eq!(find_draw_depth("m", &brush.nodes).unwrap(), 3);

        brush.clipnodes = vec![MClipNode { planenum: 0, children: [CONTENTS_SOLID, CONTENTS_EMPTY] }];
        let hulls = base_hulls(brush.nodes.len(), brush.clipnodes.len());
        assert_eq!(find_clip_depth("m", &hulls[0], &brush).unwrap(), 3);
        assert_eq!(find_clip_depth("m", &hulls[1], &brush).unwrap(), 2);
        assert_eq!(find_clip_depth("m", &hulls[3], &brush).unwrap(), 0);
    }

    fn clip_brush(clipnodes: Vec<MClipNode>) -> (BrushModel, Hull) {
        let brush = BrushModel {
            planes: vec![Plane::new([1.0, 0.0, 0.0], 0.0, PlaneType::X)],
            clipnodes,
            ..Default::default()
        };
        let hull = base_hulls(0, brush.clipnodes.len())[1];
        (brush, hull)
    }

    #[test]
    fn test_clip_depth_shared_children() {
        // every node points both children at the next one
        let n = 64;
        let mut clipnodes: Vec<MClipNode> = (0..n - 1)
            .map(|i| MClipNode { planenum: 0, children: [i + 1, i + 1] })
            .collect();
        clipnodes.push(MClipNode { planenum: 0, children: [CONTENTS_EMPTY, CONTENTS_SOLID] });
        let (brush, hull) = clip_brush(clipnodes);
        assert_eq!(find_clip_depth("m", &hull, &brush).unwrap(), n as u32 + 1);
    }

    #[test]
    fn test_clip_depth_cycle() {
        let (brush, hull) = clip_brush(vec![
            MClipNode { planenum: 0, children: [1, CONTENTS_EMPTY] },
            MClipNode { planenum: 0, children: [CONTENTS_SOLID, 0] },
        ]);
        assert!(matches!(
            find_clip_depth("m", &hull, &brush),
            Err(ModelError::CyclicTree { what: "clipnode", node: 0, .. })
        ));

        let (brush, hull) = clip_brush(vec![MClipNode { planenum: 0, children: [0, 0] }]);
        assert!(matches!(
            find_clip_depth("m", &hull, &brush),
            Err(ModelError::CyclicTree { .. })
        ));
    }

    #[test]
    fn test_empty_clip_hull() {
        let brush = small_brush();
        let hulls = base_hulls(brush.nodes.len(), 0);
        assert!(hulls[1].is_empty(&brush));
        assert_eq!(find_clip_depth("m", &hulls[1], &brush).unwrap(), 0);
    }

    #[test]
    fn test_cyclic_draw_tree() {
        let nodes = vec![node(0, [NodeRef::Node(0), NodeRef::Leaf(0)])];
        assert!(matches!(
            find_draw_depth("m", &nodes),
            Err(ModelError::CyclicTree { .. })
        ));
    }

    #[test]
    fn test_load_clipnodes_extended_children() {
        let input = vec![
            DClipNode { planenum: 0, children: [1, 65536 - 2] },
            DClipNode { planenum: 0, children: [-1, -2] },
        ];
        let out = load_clipnodes("m", &input, 1).unwrap();
        assert_eq!(out[0].children, [1, -2]);
        assert_eq!(out[1].children, [-1, -2]);
    }

    #[test]
    fn test_load_clipnodes_rejects_bad_input() {
        let bad_plane = vec![DClipNode { planenum: 3, children: [-1, -1] }];
        assert!(load_clipnodes("m", &bad_plane, 1).is_err());

        // 65536 + 5 rebases to 5, past the last clip-node
        let bad_child = vec![DClipNode { planenum: 0, children: [65541, -1] }];
        assert!(load_clipnodes("m", &bad_child, 1).is_err());
    }

    #[test]
    fn test_base_hull_boxes() {
        let hulls = base_hulls(4, 9);
        assert_eq!(hulls[0].lastclipnode, 3);
        assert_eq!(hulls[1].clip_mins, HULL1_MINS);
        assert_eq!(hulls[2].clip_maxs, HULL2_MAXS);
        assert_eq!(hulls[2].lastclipnode, 8);
        assert_eq!(hulls[3].source, HullSource::None);
    }
}
