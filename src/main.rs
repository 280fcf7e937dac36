use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, ensure, Context, Result};
use clap::Parser;
use image::imageops::FilterType;
use log::info;

use primitrace::fitness::metrics::{psnr_from_mse, PSNR_PEAK};
use primitrace::{Canvas, OptimizerBuilder, RunSummary, Settings, ShapeKind, Step, SvgExport};

#[derive(Parser, Debug)]
#[command(name = "primitrace")]
#[command(author, version, about = "Approximate images with triangles, rectangles and ellipses")]
struct Args {
    /// Input image path
    input: PathBuf,

    /// Output SVG path
    #[arg(short, long, default_value = "output.svg")]
    output: PathBuf,

    /// Also write the final raster (compute size) as PNG
    #[arg(long)]
    png: Option<PathBuf>,

    /// Dump accepted steps as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Settings file; missing file means defaults
    #[arg(short, long, default_value = "settings.json")]
    config: PathBuf,

    /// Write the effective settings (after command-line overrides) and continue
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Outer iterations
    #[arg(short = 'n', long)]
    steps: Option<u32>,

    /// Random shapes sampled per iteration
    #[arg(short, long)]
    shapes: Option<u32>,

    /// Consecutive failed mutations before giving up on a shape
    #[arg(short, long)]
    mutations: Option<u32>,

    /// Shape kind to sample (repeatable): triangle, rectangle, ellipse, debug, polygon:N
    #[arg(short = 't', long = "shape")]
    shape_types: Vec<ShapeKind>,

    /// Starting opacity of new shapes
    #[arg(long)]
    alpha: Option<f32>,

    /// RNG seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Longest side of the working raster
    #[arg(long)]
    compute_size: Option<u32>,

    /// Longest side of the exported SVG
    #[arg(long)]
    view_size: Option<u32>,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(steps) = self.steps {
            settings.steps = steps;
        }
        if let Some(shapes) = self.shapes {
            settings.shapes = shapes;
        }
        if let Some(mutations) = self.mutations {
            settings.mutations = mutations;
        }
        if !self.shape_types.is_empty() {
            settings.shape_types = self.shape_types.clone();
        }
        if let Some(alpha) = self.alpha {
            settings.alpha = alpha;
        }
        if self.seed.is_some() {
            settings.seed = self.seed;
        }
        if let Some(size) = self.compute_size {
            settings.compute_size = size;
        }
        if let Some(size) = self.view_size {
            settings.view_size = size;
        }
    }
}

/// scale (width, height) so the longest side becomes `size`
fn fit(width: u32, height: u32, size: u32) -> (u32, u32) {
    let scale = size as f64 / width.max(height) as f64;
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

fn load_target(args: &Args, compute_size: u32) -> Result<Canvas> {
    profiling::scope!("load_target");
    let img = image::open(&args.input).with_context(|| format!("failed to open {}", args.input.display()))?;
    let rgba8 = img.to_rgba8();
    let (w, h) = fit(rgba8.width(), rgba8.height(), compute_size);
    info!(
        "loaded {} ({}x{}), computing at {}x{}",
        args.input.display(),
        rgba8.width(),
        rgba8.height(),
        w,
        h
    );

    let rgba8 = if (w, h) == rgba8.dimensions() {
        rgba8
    } else {
        image::imageops::resize(&rgba8, w, h, FilterType::CatmullRom)
    };
    Ok(Canvas::from_rgba(w, h, rgba8.as_raw())?)
}

fn main() -> Result<()> {
    // Initialize the logger. Default filter is "info" if RUST_LOG is not set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    // configure Rayon's global thread pool once at startup so worker threads get nice names like "rayon-0".
    let _ = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("rayon-{i}"))
        .build_global();

    let args = Args::parse();

    let mut settings = Settings::load(&args.config);
    args.apply(&mut settings);
    if let Some(path) = &args.save_config {
        settings
            .save(path)
            .with_context(|| format!("failed to save settings to {}", path.display()))?;
        info!("settings saved to {}", path.display());
    }
    ensure!(settings.compute_size > 0, "compute size must be at least 1");
    ensure!(settings.view_size > 0, "view size must be at least 1");

    let target = load_target(&args, settings.compute_size)?;
    settings.width = target.width();
    settings.height = target.height();

    let ctx = SvgExport::with_view_size(settings.width, settings.height, settings.view_size);
    let (step_tx, step_rx) = mpsc::channel::<Step>();
    let mut optimizer = OptimizerBuilder::new(target, settings)
        .export(ctx.clone())
        .observer(move |step| {
            if let Some(step) = step {
                let _ = step_tx.send(step.clone());
            }
        })
        .build()
        .context("failed to set up optimizer")?;
    let background = optimizer.background();

    // the optimizer (and the observer's sender) is dropped when the thread ends,
    // which closes the channel below
    let worker = thread::Builder::new()
        .name("optimizer".to_owned())
        .spawn(move || -> primitrace::Result<(RunSummary, Canvas)> {
            let summary = optimizer.start()?;
            Ok((summary, optimizer.state().canvas().clone()))
        })
        .context("failed to spawn optimizer thread")?;

    let steps: Vec<Step> = step_rx.iter().collect();
    let (summary, canvas) = worker
        .join()
        .map_err(|_| anyhow!("optimizer thread panicked"))?
        .context("optimization failed")?;

    let document = ctx.document(background, steps.iter().map(|step| step.to_export_node(&ctx)));
    ctx.save(&args.output, &document)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!("wrote {} ({} shapes)", args.output.display(), steps.len());

    if let Some(path) = &args.png {
        canvas
            .save_png(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote {}", path.display());
    }

    if let Some(path) = &args.json {
        let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &steps)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote {}", path.display());
    }

    let psnr = psnr_from_mse((summary.real_distance * PSNR_PEAK).powi(2), PSNR_PEAK);
    info!(
        "distance {:.6} -> {:.6} ({} of {} steps accepted, {:.1} dB) in {:.2?}",
        summary.initial_distance, summary.final_distance, summary.accepted, summary.steps, psnr, summary.elapsed
    );

    Ok(())
}
