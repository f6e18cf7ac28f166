use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use renderer::{BackendKind, SurfaceSize, ALPHA_RANGE, RADIUS_RANGE};

#[derive(Parser, Debug)]
#[command(
    name = "fundraiser",
    author,
    version,
    about = "Everybody's Cool fundraiser: painterly planet renderer and donation API"
)]
pub struct Cli {
    /// Configuration file; defaults to `fundraiser.toml` in the config directory.
    #[arg(long, global = true, value_name = "PATH", env = "FUNDRAISER_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the donation HTTP API until interrupted.
    Serve(ServeArgs),
    /// Open the interactive planet preview window.
    Preview(PreviewArgs),
    /// Render one deterministic frame to a PNG.
    Render(RenderArgs),
    /// Inspect the resolved configuration.
    Config(ConfigCommand),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Listen address; overrides `server.bind` and `FUNDRAISER_BIND`.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,
}

/// Stylisation flags shared by `preview` and `render`.
#[derive(Args, Debug, Default, Clone)]
pub struct StyleArgs {
    /// Show the raw scene without the painterly passes.
    #[arg(long)]
    pub no_painterly: bool,

    /// Kuwahara kernel radius in pixels (1-10).
    #[arg(long, value_name = "N", value_parser = parse_radius)]
    pub radius: Option<u32>,

    /// Kuwahara sharpness exponent (1-50).
    #[arg(long, value_name = "A", value_parser = parse_alpha)]
    pub alpha: Option<f32>,

    /// Seed for the paper grain texture.
    #[arg(long, value_name = "SEED")]
    pub paper_seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<SurfaceSize>,

    #[command(flatten)]
    pub style: StyleArgs,

    /// Frame rate cap (0 = redraw continuously).
    #[arg(long, value_name = "FPS", value_parser = parse_fps)]
    pub fps: Option<f32>,

    /// Seed for confetti bursts.
    #[arg(long, value_name = "SEED", default_value_t = 0)]
    pub confetti_seed: u64,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Destination PNG.
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// Image size (e.g. `1920x1080`).
    #[arg(long, value_name = "WIDTHxHEIGHT", default_value = "1280x720")]
    pub size: SurfaceSize,

    /// Animation time of the frame, in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0, value_parser = parse_time)]
    pub time: f32,

    /// `gpu` (wgpu) or `cpu` (reference implementation, no GPU needed).
    #[arg(long, value_name = "BACKEND", default_value = "gpu")]
    pub backend: BackendKind,

    #[command(flatten)]
    pub style: StyleArgs,
}

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Load and validate the configuration, then print it with secrets redacted.
    Check,
    /// Print the resolved configuration directory and file.
    Where,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_radius(value: &str) -> Result<u32, String> {
    let radius: u32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid radius '{value}'; expected a whole number"))?;
    let (min, max) = RADIUS_RANGE;
    if !(min..=max).contains(&radius) {
        return Err(format!("radius {radius} is outside {min}-{max}"));
    }
    Ok(radius)
}

pub fn parse_alpha(value: &str) -> Result<f32, String> {
    let alpha: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid alpha '{value}'"))?;
    let (min, max) = ALPHA_RANGE;
    if !alpha.is_finite() || !(min..=max).contains(&alpha) {
        return Err(format!("alpha {alpha} is outside {min}-{max}"));
    }
    Ok(alpha)
}

pub fn parse_fps(value: &str) -> Result<f32, String> {
    let fps: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid frame rate '{value}'"))?;
    if !fps.is_finite() || fps < 0.0 {
        return Err("frame rate must be zero or positive".to_string());
    }
    Ok(fps)
}

pub fn parse_time(value: &str) -> Result<f32, String> {
    let time: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid time '{value}'"))?;
    if !time.is_finite() || time < 0.0 {
        return Err("time must be zero or positive".to_string());
    }
    Ok(time)
}
