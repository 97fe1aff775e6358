// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// config.rs — load-time knobs for the brush model loader

use std::time::Duration;

/// Upper bound on surface texture extents for non-special surfaces.
pub const DEFAULT_EXTENTS_LIMIT: i32 = 2000;

/// Wait quantum used while the cluster visibility tasks run.
pub const DEFAULT_JOIN_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct BrushConfig {
    /// Offer sky surfaces to `ModelFuncs::subdivide_surface`.
    pub sky_divide: bool,
    /// Bytes per lightmap sample; scales `lightofs` into `samples`.
    pub lightmap_bytes: usize,
    /// `None` disables the extents sanity check.
    pub extents_limit: Option<i32>,
    /// Worker pool size, 0 = one per CPU.
    pub worker_threads: usize,
    pub join_poll: Duration,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            sky_divide: false,
            lightmap_bytes: 1,
            extents_limit: Some(DEFAULT_EXTENTS_LIMIT),
            worker_threads: 0,
            join_poll: DEFAULT_JOIN_POLL,
        }
    }
}

impl BrushConfig {
    pub fn with_sky_divide(mut self, sky_divide: bool) -> Self {
        self.sky_divide = sky_divide;
        self
    }

    pub fn with_lightmap_bytes(mut self, bytes: usize) -> Self {
        self.lightmap_bytes = bytes.max(1);
        self
    }

    pub fn with_extents_limit(mut self, limit: Option<i32>) -> Self {
        self.extents_limit = limit;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_join_poll(mut self, poll: Duration) -> Self {
        // a zero quantum would spin
        self.join_poll = poll.max(Duration::from_millis(1));
        self
    }
}
