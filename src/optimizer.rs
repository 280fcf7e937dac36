// Optimizer: sample random shapes, hill-climb the best one, keep it if it helps.
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::export::SvgExport;
use crate::render::Canvas;
use crate::settings::{Fill, Settings};
use crate::state::State;
use crate::step::{Candidate, Step};

/// where the optimizer is in its outer loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
    Refining,
    /// step budget exhausted
    Converged,
}

/// called once per outer iteration with the accepted step, or None on rejection
pub type Observer = Box<dyn FnMut(Option<&Step>) + Send>;

/// outcome of a full run
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub steps: u32,
    pub accepted: u32,
    pub initial_distance: f64,
    pub final_distance: f64,
    /// final distance recomputed from the pixels
    pub real_distance: f64,
    pub elapsed: Duration,
}

/// result of hill-climbing one sampled step
#[derive(Clone, Debug)]
pub struct Refinement {
    pub step: Step,
    /// mutations evaluated
    pub attempts: u32,
    /// mutations that beat the running best
    pub improvements: u32,
}

pub struct OptimizerBuilder {
    target: Canvas,
    settings: Settings,
    export: Option<SvgExport>,
    observer: Option<Observer>,
}

impl OptimizerBuilder {
    pub fn new(target: Canvas, settings: Settings) -> Self {
        Self {
            target,
            settings,
            export: None,
            observer: None,
        }
    }

    pub fn export(mut self, ctx: SvgExport) -> Self {
        self.export = Some(ctx);
        self
    }

    pub fn observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(Option<&Step>) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn build(self) -> Result<Optimizer> {
        profiling::scope!("OptimizerBuilder::build");
        let export = self.export.ok_or(Error::MissingExportContext)?;
        let settings = self.settings;
        settings.validate()?;

        let target = self.target;
        if target.width() != settings.width || target.height() != settings.height {
            return Err(Error::SizeMismatch {
                expected_width: settings.width,
                expected_height: settings.height,
                width: target.width(),
                height: target.height(),
            });
        }

        let background = match settings.fill {
            Fill::Auto => target.dominant_color(),
            Fill::Rgb(rgb) => rgb,
        };
        let canvas = Canvas::filled(settings.width, settings.height, background)?;
        let state = State::new(Arc::new(target), canvas, None)?;

        let seed = settings.seed.unwrap_or_else(rand::random::<u64>);
        info!(
            "{}x{} canvas, background rgb({},{},{}), seed {}",
            settings.width, settings.height, background[0], background[1], background[2], seed
        );
        info!("initial distance {:.6}", state.distance());

        Ok(Optimizer {
            initial_distance: state.distance(),
            settings,
            export,
            state,
            rng: Pcg32::seed_from_u64(seed),
            observer: self.observer,
            phase: Phase::Idle,
            steps_taken: 0,
            accepted: 0,
            background,
        })
    }
}

pub struct Optimizer {
    settings: Settings,
    export: SvgExport,
    state: State,
    rng: Pcg32,
    observer: Option<Observer>,
    phase: Phase,
    steps_taken: u32,
    accepted: u32,
    background: [u8; 3],
    initial_distance: f64,
}

impl Optimizer {
    /// Run outer iterations until the step budget is spent.
    /// Any evaluation error aborts the run.
    pub fn start(&mut self) -> Result<RunSummary> {
        profiling::scope!("Optimizer::start");
        let started = Instant::now();
        info!(
            "starting: {} steps, {} shapes per step, {} mutations",
            self.settings.steps, self.settings.shapes, self.settings.mutations
        );

        while self.steps_taken < self.settings.steps {
            self.add_shape()?;
            std::thread::yield_now();
        }
        self.phase = Phase::Converged;

        let elapsed = started.elapsed();
        let real_distance = self.state.real_distance()?;
        info!("target distance {:.6}", self.state.distance());
        info!("real target distance {:.6}", real_distance);
        info!("finished in {:.2?}, {} of {} steps accepted", elapsed, self.accepted, self.steps_taken);

        Ok(RunSummary {
            steps: self.steps_taken,
            accepted: self.accepted,
            initial_distance: self.initial_distance,
            final_distance: self.state.distance(),
            real_distance,
            elapsed,
        })
    }

    /// One outer iteration: sample, refine, then accept or reject.
    pub fn add_shape(&mut self) -> Result<Option<Step>> {
        profiling::scope!("add_shape");
        self.phase = Phase::Sampling;
        let sampled = self.sample()?;

        self.phase = Phase::Refining;
        let refined = self.refine(sampled)?;
        self.steps_taken += 1;

        let step = refined.step;
        let accepted = if step.distance() < self.state.distance() {
            self.state = step.apply(&self.state)?;
            self.accepted += 1;
            let metrics = self.state.metrics();
            info!(
                "step {}/{}: switched to new state (distance {:.6}, rmse {:.2}, psnr {:.2} dB, {:?})",
                self.steps_taken,
                self.settings.steps,
                self.state.distance(),
                metrics.rmse,
                metrics.psnr,
                step.shape().kind()
            );
            Some(step)
        } else {
            debug!(
                "step {}/{}: best candidate {:.6} does not beat {:.6}",
                self.steps_taken,
                self.settings.steps,
                step.distance(),
                self.state.distance()
            );
            None
        };

        if let Some(observer) = self.observer.as_mut() {
            observer(accepted.as_ref());
        }
        Ok(accepted)
    }

    /// Evaluate `shapes` random candidates in parallel against the current state
    /// and return the best one.
    pub fn sample(&mut self) -> Result<Step> {
        profiling::scope!("sample");
        // seeds come from the optimizer rng so runs replay under any thread count
        let seeds: Vec<u64> = (0..self.settings.shapes).map(|_| self.rng.random::<u64>()).collect();

        let state = &self.state;
        let settings = &self.settings;
        let steps = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = Pcg32::seed_from_u64(seed);
                Candidate::random(settings, &mut rng)?.evaluate(state, settings.antialias)
            })
            .collect::<Result<Vec<Step>>>()?;

        pick_best(steps).ok_or_else(|| Error::InvalidConfig("shapes must be at least 1".into()))
    }

    /// Hill-climb from `step` until `mutations` consecutive mutations fail to improve it.
    pub fn refine(&mut self, step: Step) -> Result<Refinement> {
        profiling::scope!("refine");
        let from = step.distance();
        let rng = &mut self.rng;
        let settings = &self.settings;
        let state = &self.state;
        let refined = hill_climb(step, settings.mutations, |best| {
            best.mutate(&mut *rng, settings).evaluate(state, settings.antialias)
        })?;

        debug!(
            "mutating: {:.6} -> {:.6} ({} good out of {})",
            from,
            refined.step.distance(),
            refined.improvements,
            refined.attempts
        );
        Ok(refined)
    }

    #[inline]
    pub fn state(&self) -> &State {
        &self.state
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    #[inline]
    pub fn accepted(&self) -> u32 {
        self.accepted
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn export_context(&self) -> &SvgExport {
        &self.export
    }

    /// colour the initial canvas was filled with
    #[inline]
    pub fn background(&self) -> [u8; 3] {
        self.background
    }
}

/// Keep asking `next` for a neighbour of the running best. A strictly better
/// neighbour replaces it and resets the failure count; the climb ends after
/// `mutations` failures in a row.
pub fn hill_climb<F>(step: Step, mutations: u32, mut next: F) -> Result<Refinement>
where
    F: FnMut(&Step) -> Result<Step>,
{
    let mut best = step;
    let mut failed = 0;
    let mut attempts = 0;
    let mut improvements = 0;

    while failed < mutations {
        let candidate = next(&best)?;
        attempts += 1;
        if candidate.distance() < best.distance() {
            best = candidate;
            failed = 0;
            improvements += 1;
        } else {
            failed += 1;
        }
    }

    Ok(Refinement {
        step: best,
        attempts,
        improvements,
    })
}

/// Lowest distance wins; on a tie the earliest step is kept.
pub fn pick_best<I>(steps: I) -> Option<Step>
where
    I: IntoIterator<Item = Step>,
{
    steps.into_iter().fold(None, |best: Option<Step>, step| match best {
        Some(current) if step.distance() >= current.distance() => Some(current),
        _ => Some(step),
    })
}
