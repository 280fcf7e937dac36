//! Approximate a raster image with a bounded stack of simple shapes.
//!
//! Each step samples random primitives against the current canvas, hill-climbs
//! the best one, and keeps it only if the canvas gets closer to the target.

pub mod error;
pub mod export;
pub mod fitness;
pub mod geom;
pub mod optimizer;
pub mod render;
pub mod settings;
pub mod shape;
pub mod state;
pub mod step;

pub use error::{Error, Result};
pub use export::{ExportNode, SvgExport};
pub use optimizer::{hill_climb, pick_best, Optimizer, OptimizerBuilder, Phase, Refinement, RunSummary};
pub use render::Canvas;
pub use settings::{Fill, Settings};
pub use shape::{Geometry, Shape, ShapeKind};
pub use state::State;
pub use step::{Candidate, Step};
