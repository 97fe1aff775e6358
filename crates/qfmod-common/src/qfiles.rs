// qfiles.rs — BSP file structures as handed over by the map parser
//
// All values are already in host byte order and the lump sizes have been
// validated by the parser. Indices inside the records are NOT validated;
// that is the loader's job.

// ============================================================
// BSP file format
// ============================================================

pub const BSPVERSION: i32 = 29;

pub const MAX_MAP_HULLS: usize = 4;
pub const MIPLEVELS: usize = 4;
pub const MAXLIGHTMAPS: usize = 4;
pub const NUM_AMBIENTS: usize = 4;

/// Size of a miptex record header on disk: name[16], width, height, offsets[4].
pub const MIPTEX_HEADER_SIZE: u32 = 16 + 4 + 4 + 4 * MIPLEVELS as u32;
pub const MIPTEX_NAME_LEN: usize = 16;

/// Largest pixel block (all four mip levels) a miptex may carry.
pub const MAX_MIPTEX_BYTES: usize = 64 << 20;

/// Bytes of a `width` x `height` texture with its three reduced mip levels,
/// `None` on overflow or past `MAX_MIPTEX_BYTES`.
pub fn miptex_size(width: u32, height: u32) -> Option<usize> {
    let size = (width as u64).checked_mul(height as u64)? / 64 * 85;
    usize::try_from(size).ok().filter(|&s| s <= MAX_MIPTEX_BYTES)
}

// Soft limits of the classic engine. Exceeding them only warns.
pub const LEGACY_MAX_FACES: usize = 32767;
pub const LEGACY_MAX_NODES: usize = 32767;
pub const LEGACY_MAX_CLIPNODES: usize = 32767;
pub const LEGACY_MAX_MARKSURFACES: usize = 32767;
pub const LEGACY_MAX_VISLEAFS: u32 = 8192;

// Lump indices
pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_PLANES: usize = 1;
pub const LUMP_TEXTURES: usize = 2;
pub const LUMP_VERTEXES: usize = 3;
pub const LUMP_VISIBILITY: usize = 4;
pub const LUMP_NODES: usize = 5;
pub const LUMP_TEXINFO: usize = 6;
pub const LUMP_FACES: usize = 7;
pub const LUMP_LIGHTING: usize = 8;
pub const LUMP_CLIPNODES: usize = 9;
pub const LUMP_LEAFS: usize = 10;
pub const LUMP_MARKSURFACES: usize = 11;
pub const LUMP_EDGES: usize = 12;
pub const LUMP_SURFEDGES: usize = 13;
pub const LUMP_MODELS: usize = 14;
pub const HEADER_LUMPS: usize = 15;

/// texinfo flag: sky or slime, no lightmap or 256 subdivision
pub const TEX_SPECIAL: i32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DModel {
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub origin: [f32; 3],
    pub headnode: [i32; MAX_MAP_HULLS],
    pub visleafs: i32, // not including the solid leaf 0
    pub firstface: i32,
    pub numfaces: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DVertex {
    pub point: [f32; 3],
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DPlane {
    pub normal: [f32; 3],
    pub dist: f32,
    pub plane_type: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DNode {
    pub planenum: u32,
    pub children: [i32; 2], // negative numbers are -(leafs+1), not nodes
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub firstface: u32,
    pub numfaces: u32, // counting both sides
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DClipNode {
    pub planenum: u32,
    pub children: [i32; 2], // negative numbers are contents
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TexInfo {
    pub vecs: [[f32; 4]; 2], // [s/t][xyz offset]
    pub miptex: u32,
    pub flags: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DEdge {
    pub v: [u32; 2], // vertex numbers
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DFace {
    pub planenum: u32,
    pub side: i32,
    pub firstedge: i32,
    pub numedges: i32,
    pub texinfo: u32,
    pub styles: [u8; MAXLIGHTMAPS],
    pub lightofs: i32, // start of [numstyles*surfsize] samples
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DLeaf {
    pub contents: i32,
    pub visofs: i32, // -1 = no visibility info
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub firstmarksurface: u32,
    pub nummarksurfaces: u32,
    pub ambient_level: [u8; NUM_AMBIENTS],
}

/// One entry of the miptex lump. `offsets` are relative to the start of the
/// on-disk record, so the first mip level sits at `MIPTEX_HEADER_SIZE`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MipTex {
    pub name: [u8; MIPTEX_NAME_LEN],
    pub width: u32,
    pub height: u32,
    pub offsets: [u32; MIPLEVELS],
    pub pixels: Vec<u8>,
}

impl MipTex {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        let mut raw = [0u8; MIPTEX_NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(MIPTEX_NAME_LEN - 1);
        raw[..len].copy_from_slice(&bytes[..len]);

        let mut offsets = [0u32; MIPLEVELS];
        let mut ofs = MIPTEX_HEADER_SIZE as u64;
        for (level, slot) in offsets.iter_mut().enumerate() {
            *slot = u32::try_from(ofs).unwrap_or(u32::MAX);
            ofs += (width >> level) as u64 * (height >> level) as u64;
        }
        // oversized textures carry no pixels; the loader rejects them
        let pixels = vec![0u8; miptex_size(width, height).unwrap_or(0)];
        Self {
            name: raw,
            width,
            height,
            offsets,
            pixels,
        }
    }

    /// Name up to the first NUL.
    pub fn name_str(&self) -> String {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(MIPTEX_NAME_LEN);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }
}

/// The parsed map, owned by the loader for the duration of a load and
/// dropped once the brush model has been built.
#[derive(Debug, Clone, Default)]
pub struct Bsp {
    pub models: Vec<DModel>,
    pub vertexes: Vec<DVertex>,
    pub planes: Vec<DPlane>,
    pub leafs: Vec<DLeaf>,
    pub nodes: Vec<DNode>,
    pub clipnodes: Vec<DClipNode>,
    pub texinfo: Vec<TexInfo>,
    pub faces: Vec<DFace>,
    pub edges: Vec<DEdge>,
    pub surfedges: Vec<i32>,
    pub marksurfaces: Vec<u32>,
    /// Miptex lump; `None` entries are the `dataofs == ~0` holes.
    pub textures: Vec<Option<MipTex>>,
    pub visdata: Vec<u8>,
    pub lightdata: Vec<u8>,
    pub entdata: Vec<u8>,
    /// Per-lump block checksums computed by the parser.
    pub lump_checksums: [u32; HEADER_LUMPS],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miptex_header_size() {
        // name[16] + width + height + offsets[4] = 40 bytes
        assert_eq!(MIPTEX_HEADER_SIZE, 40);
    }

    #[test]
    fn miptex_new_layout() {
        let mt = MipTex::new("+0button", 32, 16);
        assert_eq!(mt.name_str(), "+0button");
        assert_eq!(mt.offsets[0], MIPTEX_HEADER_SIZE);
        assert_eq!(mt.offsets[1], MIPTEX_HEADER_SIZE + 32 * 16);
        assert_eq!(mt.pixels.len(), 32 * 16 / 64 * 85);
    }

    #[test]
    fn miptex_size_is_bounded() {
        assert_eq!(miptex_size(64, 64), Some(64 * 64 / 64 * 85));
        assert_eq!(miptex_size(4096, 4096), Some(4096 * 4096 / 64 * 85));
        assert_eq!(miptex_size(8192, 8192), None);
        assert_eq!(miptex_size(65536, 65536), None);
        assert_eq!(miptex_size(u32::MAX, u32::MAX), None);

        let mt = MipTex::new("huge", 65536, 65536);
        assert!(mt.pixels.is_empty());
        assert_eq!(mt.offsets[1], u32::MAX);
    }

    #[test]
    fn miptex_name_truncated_to_field() {
        let mt = MipTex::new("abcdefghijklmnopqrstuvwxyz", 16, 16);
        assert_eq!(mt.name_str().len(), MIPTEX_NAME_LEN - 1);
    }

    #[test]
    fn lump_indices_are_unique() {
        let lumps = [
            LUMP_ENTITIES, LUMP_PLANES, LUMP_TEXTURES, LUMP_VERTEXES, LUMP_VISIBILITY,
            LUMP_NODES, LUMP_TEXINFO, LUMP_FACES, LUMP_LIGHTING, LUMP_CLIPNODES,
            LUMP_LEAFS, LUMP_MARKSURFACES, LUMP_EDGES, LUMP_SURFEDGES, LUMP_MODELS,
        ];
        for (i, &l) in lumps.iter().enumerate() {
            assert_eq!(l, i);
        }
        assert_eq!(lumps.len(), HEADER_LUMPS);
    }
}
