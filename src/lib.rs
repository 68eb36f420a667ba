//! # netweave
//!
//! An animated, theme-reactive layered-network visualization.
//!
//! The engine lays out a dense feed-forward "neural network" diagram inside a
//! viewport, flies the nodes in, then keeps signals propagating forward (and,
//! optionally, backward as a training sweep). Frames are drawn into an owned
//! premultiplied RGBA8 buffer by a GPU backend when one is available, or by a
//! CPU raster backend otherwise.
//!
//! ## Quick Start
//!
//! ```
//! use netweave::prelude::*;
//! use std::time::Duration;
//!
//! let config = VizConfig {
//!     layer_sizes: vec![3, 5, 3],
//!     force_raster: true,
//!     ..VizConfig::default()
//! };
//! let mut viz = NetworkViz::mount(320, 200, Theme::Dark, config);
//!
//! // One call per display refresh.
//! let start = Instant::now();
//! viz.tick(start);
//! viz.tick(start + Duration::from_millis(16));
//!
//! let frame = viz.frame().unwrap();
//! assert_eq!(frame.pixels.len(), 320 * 200 * 4);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Serialization of config, palette and snapshots
//! - `gpu`: Enable the wgpu render backend
//!
//! ## Modules
//!
//! - [`engine`]: The mounted visualization
//! - [`topology`]: Node/edge layout
//! - [`choreography`]: Entrance and propagation timeline
//! - [`render`]: GPU and raster backends, and the selector between them
//! - [`observer`]: Read-only snapshots

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/palette.rs"]
pub mod palette;

#[path = "core/topology.rs"]
pub mod topology;

#[path = "core/pool.rs"]
pub mod pool;

#[path = "core/timeline.rs"]
pub mod timeline;

#[path = "core/choreography.rs"]
pub mod choreography;

#[path = "core/render/mod.rs"]
pub mod render;

#[path = "core/scheduler.rs"]
pub mod scheduler;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/engine.rs"]
pub mod engine;

pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use netweave::prelude::*;
/// ```
pub mod prelude {
    pub use crate::choreography::Phase;
    pub use crate::config::{ConfigError, VizConfig};
    pub use crate::engine::NetworkViz;
    pub use crate::observer::EngineSnapshot;
    pub use crate::palette::{ColorOverrides, ColorScheme, Rgba, Theme};
    pub use crate::render::{BackendKind, FrameView, RenderError, RenderStats};
    pub use crate::scheduler::Instant;
}
