// candidate shapes and their evaluation against a state
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::export::{rgb, ExportNode, SvgExport};
use crate::fitness::{difference_rgb_rect, difference_rgb_region, difference_to_distance};
use crate::render::{Canvas, Patch};
use crate::settings::Settings;
use crate::shape::Shape;
use crate::state::State;

/// alpha perturbation span per mutation
const ALPHA_SPAN: f32 = 0.08;
const ALPHA_MIN: f32 = 0.1;
const ALPHA_MAX: f32 = 1.0;

/// a shape and opacity that have not been scored yet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub shape: Shape,
    pub alpha: f32,
}

impl Candidate {
    pub fn new(shape: Shape, alpha: f32) -> Self {
        Self { shape, alpha }
    }

    /// random shape from the catalog at the configured opacity
    pub fn random<R: Rng + ?Sized>(settings: &Settings, rng: &mut R) -> Result<Self> {
        Ok(Self::new(Shape::create(settings, rng)?, settings.alpha))
    }

    /// Score the candidate against `state` without touching it.
    /// Only the pixels under the shape's bbox are revisited; the rest of the
    /// difference carries over from the state.
    pub fn evaluate(self, state: &State, antialias: bool) -> Result<Step> {
        profiling::scope!("Candidate::evaluate");
        let mask = self.shape.rasterize(self.alpha, antialias)?;
        let canvas = state.canvas();
        let target = state.target();
        let bbox = self.shape.bbox();

        let color = canvas.optimal_color(target, bbox, &mask);
        let difference = match canvas.composite(bbox, &mask, color) {
            Some(patch) => patched_difference(state, &patch),
            None => state.difference(),
        };

        Ok(Step {
            shape: self.shape,
            alpha: self.alpha,
            antialias,
            color,
            difference,
            distance: difference_to_distance(difference, canvas.num_pixels()),
        })
    }
}

/// state difference with the patch's region swapped in
fn patched_difference(state: &State, patch: &Patch) -> u64 {
    let stride = state.canvas().width();
    let target = state.target().data();
    let old = difference_rgb_rect(target, state.canvas().data(), patch.rect(), stride);
    let new = difference_rgb_region(target, patch.data(), patch.rect(), stride);
    state.difference().saturating_sub(old) + new
}

/// An evaluated candidate: the fill colour chosen for it and the distance the
/// canvas would have if it were applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    shape: Shape,
    alpha: f32,
    antialias: bool,
    color: [u8; 3],
    difference: u64,
    distance: f64,
}

impl Step {
    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    #[inline]
    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    #[inline]
    pub fn difference(&self) -> u64 {
        self.difference
    }

    #[inline]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Neighbour of this step: the shape perturbed once, alpha nudged when enabled.
    /// Alpha never drops below the configured starting opacity if that is under `ALPHA_MIN`.
    pub fn mutate<R: Rng + ?Sized>(&self, rng: &mut R, settings: &Settings) -> Candidate {
        let alpha = if settings.mutate_alpha {
            let floor = settings.alpha.min(ALPHA_MIN);
            (self.alpha + (rng.random::<f32>() - 0.5) * ALPHA_SPAN).clamp(floor, ALPHA_MAX)
        } else {
            self.alpha
        };
        Candidate::new(self.shape.mutate(rng), alpha)
    }

    /// Draw the step onto a copy of the state's canvas. The blend is the one
    /// `evaluate` scored, so the carried difference is exact.
    pub fn apply(&self, state: &State) -> Result<State> {
        profiling::scope!("Step::apply");
        let mask = self.shape.rasterize(self.alpha, self.antialias)?;
        let mut canvas: Canvas = state.canvas().clone();
        if let Some(patch) = canvas.composite(self.shape.bbox(), &mask, self.color) {
            canvas.paste(&patch);
        }
        State::new(state.target().clone(), canvas, Some(self.difference))
    }

    pub fn to_export_node(&self, ctx: &SvgExport) -> ExportNode {
        self.shape
            .to_export_node(ctx)
            .set("fill", rgb(self.color))
            .set("fill-opacity", (self.alpha * 1000.0).round() / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::BBox;
    use crate::shape::{Geometry, ShapeKind};
    use rand::SeedableRng;
    use rand_pcg::Pcg32;
    use std::sync::Arc;

    /// left half red, right half blue, on a black canvas
    fn split_state() -> State {
        let (w, h) = (16u32, 8u32);
        let mut rgba = Vec::new();
        for _y in 0..h {
            for x in 0..w {
                if x < w / 2 {
                    rgba.extend_from_slice(&[220, 20, 20, 255]);
                } else {
                    rgba.extend_from_slice(&[20, 20, 220, 255]);
                }
            }
        }
        let target = Arc::new(Canvas::from_rgba(w, h, &rgba).unwrap());
        let canvas = Canvas::filled(w, h, [0, 0, 0]).unwrap();
        State::new(target, canvas, None).unwrap()
    }

    fn settings_for(state: &State) -> Settings {
        Settings {
            width: state.canvas().width(),
            height: state.canvas().height(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_evaluate_picks_colour_of_covered_region() {
        let state = split_state();
        let shape = Shape::from_geometry(Geometry::Rectangle {
            points: [(0, 0), (8, 0), (8, 8), (0, 8)],
        });
        let step = Candidate::new(shape, 1.0).evaluate(&state, false).unwrap();
        assert_eq!(step.color(), [220, 20, 20]);
        assert!(step.distance() < state.distance());
    }

    #[test]
    fn test_incremental_difference_matches_recompute() {
        let state = split_state();
        let settings = settings_for(&state);
        let mut rng = Pcg32::seed_from_u64(21);
        let mut current = state;
        for _ in 0..40 {
            let step = Candidate::random(&settings, &mut rng)
                .unwrap()
                .evaluate(&current, settings.antialias)
                .unwrap();
            let next = step.apply(&current).unwrap();
            let recomputed = next.target().difference(next.canvas()).unwrap();
            assert_eq!(next.difference(), recomputed);
            assert_eq!(next.distance(), step.distance());
            current = next;
        }
    }

    #[test]
    fn test_evaluate_leaves_state_untouched() {
        let state = split_state();
        let before = state.canvas().data().to_vec();
        let shape = Shape::from_geometry(Geometry::Ellipse { center: (4, 4), rx: 3, ry: 3 });
        Candidate::new(shape, 0.5).evaluate(&state, true).unwrap();
        assert_eq!(state.canvas().data(), &before[..]);
    }

    #[test]
    fn test_off_canvas_shape_changes_nothing() {
        let state = split_state();
        let shape = Shape::from_geometry(Geometry::Ellipse { center: (100, 100), rx: 2, ry: 2 });
        assert_eq!(shape.bbox(), BBox { left: 98, top: 98, width: 4, height: 4 });
        let step = Candidate::new(shape, 0.5).evaluate(&state, true).unwrap();
        assert_eq!(step.color(), [0, 0, 0]);
        assert_eq!(step.difference(), state.difference());
    }

    #[test]
    fn test_mutate_keeps_kind_and_bounds_alpha() {
        let state = split_state();
        let mut settings = settings_for(&state);
        let mut rng = Pcg32::seed_from_u64(5);
        let shape = Shape::new(ShapeKind::Triangle, 16, 8, &mut rng).unwrap();
        let mut step = Candidate::new(shape, 0.12).evaluate(&state, true).unwrap();
        for _ in 0..200 {
            let candidate = step.mutate(&mut rng, &settings);
            assert_eq!(candidate.shape.kind(), ShapeKind::Triangle);
            assert!((ALPHA_MIN..=ALPHA_MAX).contains(&candidate.alpha));
            step = candidate.evaluate(&state, true).unwrap();
        }

        settings.mutate_alpha = false;
        let alpha = step.alpha();
        assert_eq!(step.mutate(&mut rng, &settings).alpha, alpha);
    }

    #[test]
    fn test_mutate_keeps_low_configured_alpha() {
        let state = split_state();
        let settings = Settings {
            alpha: 0.05,
            ..settings_for(&state)
        };
        let mut rng = Pcg32::seed_from_u64(17);
        let shape = Shape::new(ShapeKind::Ellipse, 16, 8, &mut rng).unwrap();
        let step = Candidate::new(shape, settings.alpha).evaluate(&state, true).unwrap();
        for _ in 0..50 {
            // one nudge from 0.05 moves at most 0.04, so it stays under the default floor
            let alpha = step.mutate(&mut rng, &settings).alpha;
            assert!((0.05..ALPHA_MIN).contains(&alpha), "{}", alpha);
        }
    }

    #[test]
    fn test_export_node_carries_fill() {
        let state = split_state();
        let shape = Shape::from_geometry(Geometry::Triangle { points: [(0, 0), (8, 0), (0, 8)] });
        let step = Candidate::new(shape, 0.5).evaluate(&state, false).unwrap();
        let markup = step.to_export_node(&SvgExport::new(16, 8, 1.0)).to_string();
        assert!(markup.contains(&format!("fill=\"{}\"", rgb(step.color()))));
        assert!(markup.contains("fill-opacity=\"0.5\""));
    }
}
