// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// model_funcs.rs — optional renderer hooks called during a brush load

use qfmod_common::qfiles::Bsp;

use crate::model_types::{BrushModel, MSurface, Texture};

/// Hooks a rendering backend installs on the loader.
///
/// Every method has a do-nothing default so a backend only implements what it
/// needs. Hooks run on the loading thread.
pub trait ModelFuncs: Send + Sync {
    /// Size of the zeroed per-texture block handed to `process_texture`.
    fn texture_render_size(&self) -> usize {
        0
    }

    /// Called once per loaded texture, then once with `None` after the last.
    fn process_texture(&self, _tx: Option<&mut Texture>) {}

    /// Called for sky (when enabled) and turbulent surfaces once their
    /// extents are known.
    fn subdivide_surface(&self, _brush: &BrushModel, _surf: &mut MSurface) {}

    /// Lightmap ingestion. Runs before planes, texinfo and faces.
    fn load_lighting(&self, bsp: &Bsp) -> Option<Vec<u8>> {
        copy_lighting(bsp)
    }
}

/// Plain copy of the lighting lump, `None` when the map is unlit.
pub fn copy_lighting(bsp: &Bsp) -> Option<Vec<u8>> {
    if bsp.lightdata.is_empty() {
        None
    } else {
        Some(bsp.lightdata.clone())
    }
}
