/// run settings for primitrace
/// loaded from a JSON file, then overridden from the command line
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::shape::ShapeKind;

/// background of the initial canvas
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    /// dominant colour of the target
    Auto,
    Rgb([u8; 3]),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // search budget
    /// outer iterations; each adds at most one shape
    pub steps: u32,
    /// random candidates sampled per iteration
    pub shapes: u32,
    /// consecutive failed mutations before refinement gives up
    pub mutations: u32,

    // canvas bounds (compute size); filled from the target by the CLI
    pub width: u32,
    pub height: u32,

    // shapes
    pub shape_types: Vec<ShapeKind>,
    /// fill opacity of freshly sampled candidates
    pub alpha: f32,
    pub mutate_alpha: bool,
    pub antialias: bool,

    pub fill: Fill,

    // raster sizes
    /// longest side of the working raster
    pub compute_size: u32,
    /// longest side of the exported SVG
    pub view_size: u32,

    /// rng seed; None picks one at random (and logs it)
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            steps: 50,
            shapes: 200,
            mutations: 30,

            width: 0,
            height: 0,

            shape_types: vec![ShapeKind::Triangle, ShapeKind::Rectangle, ShapeKind::Ellipse],
            alpha: 0.5,
            mutate_alpha: true,
            antialias: true,

            fill: Fill::Auto,

            compute_size: 256,
            view_size: 512,

            seed: None,
        }
    }
}

impl Settings {
    /// reject settings the optimizer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(Error::InvalidConfig("steps must be at least 1".into()));
        }
        if self.shapes == 0 {
            return Err(Error::InvalidConfig("shapes must be at least 1".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "canvas size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.shape_types.is_empty() {
            return Err(Error::InvalidConfig("shape_types must not be empty".into()));
        }
        if let Some(kind) = self
            .shape_types
            .iter()
            .find(|kind| matches!(kind, ShapeKind::Polygon(n) if *n < 3))
        {
            return Err(Error::InvalidConfig(format!("{} needs at least 3 points", kind)));
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(Error::InvalidConfig(format!("alpha must be in (0, 1], got {}", self.alpha)));
        }
        Ok(())
    }

    /// save settings to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// load settings from a JSON file, or return defaults if it is missing or malformed
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("failed to parse {}: {}. using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                // file doesn't exist or can't be read - use defaults
                Self::default()
            }
        }
    }
}
