use std::sync::Arc;

use crate::error::Result;
use crate::fitness::{difference_to_distance, MetricsSnapshot};
use crate::render::Canvas;

/// One snapshot of the search: the shared target, the current canvas and how far apart they are.
/// States are never mutated; accepting a step produces a new one.
#[derive(Clone, Debug)]
pub struct State {
    target: Arc<Canvas>,
    canvas: Canvas,
    difference: u64,
    distance: f64,
}

impl State {
    /// `difference` is the known squared error of `canvas` against `target`.
    /// None computes it; Some is trusted as-is.
    pub fn new(target: Arc<Canvas>, canvas: Canvas, difference: Option<u64>) -> Result<Self> {
        profiling::scope!("State::new");
        target.check_size(&canvas)?;
        let difference = match difference {
            Some(known) => known,
            None => target.difference(&canvas)?,
        };
        let distance = difference_to_distance(difference, canvas.num_pixels());
        Ok(Self {
            target,
            canvas,
            difference,
            distance,
        })
    }

    #[inline]
    pub fn target(&self) -> &Arc<Canvas> {
        &self.target
    }

    #[inline]
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    #[inline]
    pub fn difference(&self) -> u64 {
        self.difference
    }

    #[inline]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::from_difference(self.difference, self.canvas.num_pixels())
    }

    /// distance recomputed from the pixels, ignoring the cached value
    pub fn real_distance(&self) -> Result<f64> {
        self.target.distance(&self.canvas)
    }
}
