use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use strata::{
    Canvas, Compositor, EncoderFactory as _, FfmpegEncoderFactory, FrameRGBA, IntervalScheduler,
    PixelSurface, Recorder, RecorderOpts, RenderSurface, Rgba8Premul, SurfaceRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "strata", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record the animated demo layers to a video (requires `ffmpeg` on PATH).
    Record(RecordArgs),
    /// Composite one frame of the demo layers to a PNG.
    Frame(FrameArgs),
    /// List the preferred encoding profiles and which ones the local `ffmpeg` supports.
    Profiles(ProfilesArgs),
}

#[derive(Parser, Debug)]
struct LayerArgs {
    /// Width of the first (bottom) layer, which sets the output size.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Height of the first (bottom) layer.
    #[arg(long, default_value_t = 360)]
    height: u32,

    /// Number of layers, including the background.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=16))]
    layers: u32,
}

#[derive(Parser, Debug)]
struct RecordArgs {
    /// Output video path.
    #[arg(long)]
    out: PathBuf,

    /// Recording length in milliseconds.
    #[arg(long, default_value_t = 3000, value_parser = clap::value_parser!(u64).range(1..))]
    duration_ms: u64,

    /// Recorder options JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Encoding profile to prefer over the configured list (e.g. `video/mp4;codecs=h264`).
    #[arg(long)]
    profile: Option<String>,

    /// Display refresh rate driving the composite loop.
    #[arg(long, default_value_t = 60)]
    refresh_hz: u32,

    #[command(flatten)]
    layers: LayerArgs,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Animation time of the frame in milliseconds.
    #[arg(long, default_value_t = 0)]
    at_ms: u64,

    #[command(flatten)]
    layers: LayerArgs,
}

#[derive(Parser, Debug)]
struct ProfilesArgs {
    /// Recorder options JSON whose profile list is checked.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Record(args) => cmd_record(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Profiles(args) => cmd_profiles(args),
    }
}

fn load_opts(config: Option<&PathBuf>) -> anyhow::Result<RecorderOpts> {
    match config {
        Some(path) => RecorderOpts::from_json_path(path)
            .with_context(|| format!("load recorder options '{}'", path.display())),
        None => Ok(RecorderOpts::default()),
    }
}

/// Solid background plus translucent rectangles sweeping across smaller, stretched layers.
struct DemoLayers {
    layers: Vec<Arc<PixelSurface>>,
}

const LAYER_COLORS: [[u8; 4]; 4] = [
    [236, 72, 153, 200],
    [56, 189, 248, 180],
    [250, 204, 21, 160],
    [74, 222, 128, 170],
];

impl DemoLayers {
    fn new(args: &LayerArgs) -> anyhow::Result<Self> {
        let base = Canvas::new(args.width, args.height);
        anyhow::ensure!(!base.is_empty(), "layer size must be non-zero, got {base}");

        let mut layers = vec![Arc::new(PixelSurface::from_frame(FrameRGBA::filled(
            base,
            Rgba8Premul::from_straight_rgba(18, 20, 28, 255),
        )?))];
        for i in 1..args.layers {
            // Upper layers are lower resolution and get stretched to the output size.
            let div = 1 + (i % 3);
            let size = Canvas::new((args.width / div).max(1), (args.height / div).max(1));
            layers.push(Arc::new(PixelSurface::new(size)?));
        }
        Ok(Self { layers })
    }

    fn attach_to(&self, registry: &SurfaceRegistry) {
        for layer in &self.layers {
            registry.attach(layer.clone());
        }
    }

    fn animate(&self, t: Duration) -> anyhow::Result<()> {
        let t = t.as_secs_f64();
        for (i, layer) in self.layers.iter().enumerate().skip(1) {
            let [r, g, b, a] = LAYER_COLORS[(i - 1) % LAYER_COLORS.len()];
            let color = Rgba8Premul::from_straight_rgba(r, g, b, a);
            let speed = 0.25 + 0.15 * i as f64;
            layer.update(|frame| {
                let (w, h) = (frame.width, frame.height);
                let rect_w = (w / 4).max(1);
                let rect_h = (h / 3).max(1);
                let travel = f64::from(w.saturating_sub(rect_w));
                let phase = (t * speed + i as f64 * 0.3).fract();
                let x0 = (phase * travel).round() as u32;
                let y0 = (h.saturating_sub(rect_h) * i as u32) / (i as u32 + 1);
                frame.fill(Rgba8Premul::transparent());
                frame.fill_rect(x0, y0, x0 + rect_w, y0 + rect_h, color);
            })?;
        }
        Ok(())
    }
}

fn cmd_record(args: RecordArgs) -> anyhow::Result<()> {
    let mut opts = load_opts(args.config.as_ref())?;
    if let Some(profile) = &args.profile {
        let profile = profile
            .parse()
            .with_context(|| format!("parse profile '{profile}'"))?;
        opts.profiles.insert(0, profile);
    }

    let demo = Arc::new(DemoLayers::new(&args.layers)?);
    let registry = Arc::new(SurfaceRegistry::new());
    demo.attach_to(&registry);

    let encoders = Arc::new(FfmpegEncoderFactory::new().with_background(opts.background_rgba));
    let scheduler = Arc::new(IntervalScheduler::new(args.refresh_hz)?);
    let recorder = Recorder::new(opts, registry, encoders, scheduler)?;

    let done = Arc::new(AtomicBool::new(false));
    let animator = {
        let demo = Arc::clone(&demo);
        let done = Arc::clone(&done);
        std::thread::Builder::new()
            .name("strata-demo".to_string())
            .spawn(move || -> anyhow::Result<()> {
                let t0 = Instant::now();
                while !done.load(Ordering::Relaxed) {
                    demo.animate(t0.elapsed())?;
                    std::thread::sleep(Duration::from_millis(8));
                }
                Ok(())
            })
            .context("spawn demo animator")?
    };
    demo.animate(Duration::ZERO)?;

    let handle = recorder
        .start_awaitable(Duration::from_millis(args.duration_ms))?
        .context("recorder is already recording")?;
    let artifact = handle.wait();
    done.store(true, Ordering::Relaxed);
    animator
        .join()
        .map_err(|_| anyhow::anyhow!("demo animator panicked"))??;
    let artifact = artifact?;

    if let Some(err) = &artifact.error {
        anyhow::bail!("encoding failed: {err}");
    }
    artifact.write_to(&args.out)?;
    eprintln!(
        "wrote {} ({}, {} bytes, {} frames, {} dropped)",
        args.out.display(),
        artifact.mime_type,
        artifact.len(),
        artifact.frames_encoded,
        artifact.frames_dropped
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let demo = DemoLayers::new(&args.layers)?;
    demo.animate(Duration::from_millis(args.at_ms))?;

    let surfaces: Vec<Arc<dyn RenderSurface>> = demo
        .layers
        .iter()
        .map(|l| Arc::clone(l) as Arc<dyn RenderSurface>)
        .collect();
    let bg = Rgba8Premul::from_straight_rgba(0, 0, 0, 255);
    let mut compositor = Compositor::new(surfaces[0].pixel_size(), bg)?;
    let report = compositor.composite(&surfaces);
    anyhow::ensure!(report.failed == 0, "{} layer(s) failed to draw", report.failed);

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    compositor
        .frame()
        .to_straight_image()?
        .save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_profiles(args: ProfilesArgs) -> anyhow::Result<()> {
    let opts = load_opts(args.config.as_ref())?;
    let ffmpeg = FfmpegEncoderFactory::new();
    let on_path = strata::is_ffmpeg_on_path();
    if !on_path {
        eprintln!("ffmpeg not found on PATH; only the preference list is shown");
    }
    for (rank, profile) in opts.profiles.iter().enumerate() {
        let status = if !on_path {
            "unknown"
        } else if ffmpeg.is_supported(profile) {
            "supported"
        } else {
            "unsupported"
        };
        println!("{:>2}. {:<28} {status}", rank + 1, profile.to_string());
    }
    Ok(())
}
