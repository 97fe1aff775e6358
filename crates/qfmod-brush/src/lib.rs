// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// lib.rs — brush model loader

#![allow(clippy::needless_range_loop, clippy::manual_range_contains,
         clippy::too_many_arguments, clippy::type_complexity)]

pub mod clusters;
pub mod config;
pub mod error;
pub mod hull;
pub mod model_brush;
pub mod model_funcs;
pub mod model_types;
pub mod pvs;
mod textures;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use config::BrushConfig;
pub use error::{ModelError, Result};
pub use model_brush::ModelLoader;
pub use model_funcs::ModelFuncs;
pub use model_types::{BrushModel, Model};
