use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use netweave::config::VizConfig;
use netweave::engine::NetworkViz;
use netweave::palette::Theme;
use netweave::scheduler::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Headless demo driver: mounts the visualization, feeds it a simulated
/// 60 Hz clock and optionally writes the last frame as a PNG.
#[derive(Debug, Clone)]
struct DemoConfig {
    width: u32,
    height: u32,
    seconds: f64,
    theme: Theme,
    png: Option<PathBuf>,
    /// Print a JSON snapshot every this many seconds of simulated time.
    report_every: f64,
    /// `(width, height, at_seconds)`.
    resize: Option<(u32, u32, f64)>,
    viz: VizConfig,
}

fn parse_size(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

impl DemoConfig {
    fn from_env_and_args() -> Result<Self, netweave::config::ConfigError> {
        let mut config_path: Option<PathBuf> =
            env::var("NETWEAVE_CONFIG").ok().map(PathBuf::from);
        let mut width = 800;
        let mut height = 400;
        let mut seconds = 6.0;
        let mut theme = Theme::Dark;
        let mut png: Option<PathBuf> = env::var("NETWEAVE_PNG").ok().map(PathBuf::from);
        let mut report_every = 1.0;
        let mut resize = None;
        let mut flags: Vec<(String, String)> = Vec::new();

        let mut args = env::args().skip(1);
        while let Some(a) = args.next() {
            match a.as_str() {
                "--config" => {
                    if let Some(v) = args.next() {
                        config_path = Some(PathBuf::from(v));
                    }
                }
                "--size" => {
                    if let Some((w, h)) = args.next().as_deref().and_then(parse_size) {
                        width = w;
                        height = h;
                    }
                }
                "--seconds" => {
                    if let Some(v) = args.next() {
                        seconds = v
                            .parse::<f64>()
                            .ok()
                            .filter(|s| *s > 0.0)
                            .unwrap_or(seconds);
                    }
                }
                "--light" => theme = Theme::Light,
                "--dark" => theme = Theme::Dark,
                "--png" => {
                    if let Some(v) = args.next() {
                        png = Some(PathBuf::from(v));
                    }
                }
                "--report-every" => {
                    if let Some(v) = args.next() {
                        report_every = v
                            .parse::<f64>()
                            .ok()
                            .filter(|s| *s > 0.0)
                            .unwrap_or(report_every);
                    }
                }
                "--resize" => {
                    // WxH@SECONDS
                    if let Some(v) = args.next() {
                        resize = v.split_once('@').and_then(|(size, at)| {
                            let (w, h) = parse_size(size)?;
                            Some((w, h, at.trim().parse::<f64>().ok()?))
                        });
                    }
                }
                other => match other.strip_prefix("--") {
                    Some(name) if VizConfig::SETTINGS.contains(&name) => {
                        if let Some(v) = args.next() {
                            flags.push((name.to_owned(), v));
                        }
                    }
                    _ => warn!(arg = other, "ignoring unknown argument"),
                },
            }
        }

        // File, then environment, then flags.
        let mut viz = match &config_path {
            Some(path) => VizConfig::load(path)?,
            None => VizConfig::default(),
        };
        viz.apply_env();
        for (name, value) in &flags {
            viz.set(name, value);
        }

        Ok(Self {
            width,
            height,
            seconds,
            theme,
            png,
            report_every,
            resize,
            viz,
        })
    }
}

fn print_help() {
    println!("netweave (headless layered-network visualization demo)");
    println!("usage:");
    println!("  netweave [--size WxH] [--seconds S] [--light|--dark] [--png PATH]");
    println!("           [--report-every S] [--resize WxH@S] [--config FILE.json]");
    println!("  netweave --help");
    println!();
    println!("visualization settings (also NETWEAVE_<NAME> env vars):");
    for name in VizConfig::SETTINGS {
        println!("  --{name} VALUE");
    }
}

fn save_png(viz: &NetworkViz, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let frame = viz.frame().ok_or("no frame has been rendered")?;
    let size = tiny_skia::IntSize::from_wh(frame.width, frame.height).ok_or("empty frame")?;
    let pixmap =
        tiny_skia::Pixmap::from_vec(frame.pixels.to_vec(), size).ok_or("frame size mismatch")?;
    pixmap.save_png(path)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if env::args().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let demo = DemoConfig::from_env_and_args()?;
    info!(
        width = demo.width,
        height = demo.height,
        seconds = demo.seconds,
        layers = ?demo.viz.layer_sizes,
        "starting demo"
    );

    let mut viz = NetworkViz::mount(demo.width, demo.height, demo.theme, demo.viz.clone());
    info!(backend = viz.backend_name().unwrap_or("none"), "mounted");

    let start = Instant::now();
    let frames = (demo.seconds * 60.0).ceil() as u64;
    let mut next_report = 0.0;
    let mut resize = demo.resize;

    for i in 0..=frames {
        let t = i as f64 / 60.0;
        let now = start + Duration::from_secs_f64(t);

        if let Some((w, h, at)) = resize {
            if t >= at {
                viz.notify_resize(w, h, now);
                resize = None;
            }
        }

        viz.tick(now);

        if t >= next_report {
            println!("{}", serde_json::to_string(&viz.snapshot())?);
            next_report += demo.report_every;
        }
    }

    if let Some(path) = &demo.png {
        save_png(&viz, path)?;
        info!(path = %path.display(), "frame written");
    }

    viz.teardown();
    Ok(())
}
