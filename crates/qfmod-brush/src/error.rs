// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// error.rs — fatal brush model load errors

use qfmod_common::vis::VisError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("{model}: bad {what} index {index} (count {count})")]
    BadIndex {
        model: String,
        what: &'static str,
        index: i64,
        count: usize,
    },

    #[error("{model}: bad surface extents {extents} on surface {surface}")]
    BadSurfaceExtents {
        model: String,
        surface: usize,
        extents: i32,
    },

    #[error("{model}: texture {name} is not 16 aligned ({width}x{height})")]
    TextureNotAligned {
        model: String,
        name: String,
        width: u32,
        height: u32,
    },

    #[error("{model}: texture {name} is too large ({width}x{height})")]
    TextureTooLarge {
        model: String,
        name: String,
        width: u32,
        height: u32,
    },

    #[error("{model}: bad animating texture {name}")]
    BadAnimatingTexture { model: String, name: String },

    #[error("{model}: missing frame {frame} of {name}")]
    MissingFrame {
        model: String,
        name: String,
        frame: usize,
    },

    #[error("{model}: leafs are not in visibility order (leaf {leaf})")]
    ScrambledLeafOrder { model: String, leaf: usize },

    #[error("{model}: {what} {node} is reached twice")]
    CyclicTree {
        model: String,
        what: &'static str,
        node: usize,
    },

    #[error("{model}: map has no models")]
    NoModels { model: String },

    #[error("{model}: cluster {cluster} produced no visibility")]
    ClusterTaskFailed { model: String, cluster: usize },

    #[error("{model}: leaf {leaf}: {source}")]
    Vis {
        model: String,
        leaf: usize,
        #[source]
        source: VisError,
    },

    #[error("worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl ModelError {
    pub(crate) fn bad_index(model: &str, what: &'static str, index: i64, count: usize) -> Self {
        ModelError::BadIndex {
            model: model.to_string(),
            what,
            index,
            count,
        }
    }
}

/// Check `index` against `count`, producing a `BadIndex` error when out of range.
pub(crate) fn check_index(
    model: &str,
    what: &'static str,
    index: i64,
    count: usize,
) -> Result<usize> {
    if index < 0 || index as u64 >= count as u64 {
        return Err(ModelError::bad_index(model, what, index, count));
    }
    Ok(index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_index() {
        assert_eq!(check_index("m", "plane", 3, 4).unwrap(), 3);
        assert!(check_index("m", "plane", 4, 4).is_err());
        assert!(check_index("m", "plane", -1, 4).is_err());
    }

    #[test]
    fn test_messages_name_the_model() {
        let err = ModelError::bad_index("maps/e1m1.bsp", "texinfo", 9, 2);
        assert_eq!(err.to_string(), "maps/e1m1.bsp: bad texinfo index 9 (count 2)");

        let err = ModelError::Vis {
            model: "x".into(),
            leaf: 3,
            source: VisError::Truncated { produced: 1, row: 2 },
        };
        assert!(err.to_string().starts_with("x: leaf 3: "));
    }
}
