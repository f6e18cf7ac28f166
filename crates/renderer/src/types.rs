use glam::Vec2;
use thiserror::Error;

/// Painterly filter radius bounds (inclusive, in pixels).
pub const RADIUS_RANGE: (u32, u32) = (1, 10);
/// Anisotropy strength bounds (inclusive).
pub const ALPHA_RANGE: (f32, f32) = (1.0, 50.0);
/// Sector count bounds (inclusive). The Kuwahara pass always evaluates eight.
pub const SECTOR_RANGE: (u32, u32) = (4, 16);
/// Number of sectors the Kuwahara pass actually samples.
pub const KUWAHARA_SECTORS: u32 = 8;

/// Drawable size in device pixels. Both dimensions are at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    /// Returns `None` when either dimension is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            None
        } else {
            Some(Self { width, height })
        }
    }

    /// Converts a logical size and device-pixel ratio into device pixels.
    pub fn from_logical(width: f64, height: f64, scale_factor: f64) -> Option<Self> {
        if !(width.is_finite() && height.is_finite() && scale_factor.is_finite()) {
            return None;
        }
        let scale = scale_factor.max(0.0);
        let width = (width * scale).round();
        let height = (height * scale).round();
        if width < 1.0 || height < 1.0 || width > u32::MAX as f64 || height > u32::MAX as f64 {
            return None;
        }
        Self::new(width as u32, height as u32)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_vec2(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

impl std::fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for SurfaceSize {
    type Err = String;

    /// Parses `WIDTHxHEIGHT`, e.g. `1280x720`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (width, height) = value
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
        let width: u32 = width
            .trim()
            .parse()
            .map_err(|err| format!("invalid width `{width}`: {err}"))?;
        let height: u32 = height
            .trim()
            .parse()
            .map_err(|err| format!("invalid height `{height}`: {err}"))?;
        SurfaceSize::new(width, height).ok_or_else(|| format!("size `{value}` has zero area"))
    }
}

/// Pointer position in surface pixels with a bottom-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pointer {
    pub x: f32,
    pub y: f32,
}

impl Pointer {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Builds a pointer from window coordinates (top-left origin).
    pub fn from_window(x: f64, y: f64, size: SurfaceSize) -> Self {
        Self {
            x: x as f32,
            y: size.height as f32 - y as f32,
        }
    }

    /// Maps the pointer into normalised device coordinates (-1..1).
    pub fn to_ndc(&self, size: SurfaceSize) -> Vec2 {
        Vec2::new(self.x, self.y) / size.as_vec2() * 2.0 - Vec2::ONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FilterParamsError {
    #[error("radius {0} is outside 1-10")]
    Radius(u32),
    #[error("alpha {0} is outside 1-50")]
    Alpha(f32),
    #[error("sector count {0} is outside 4-16")]
    Sectors(u32),
}

/// Tunables for the anisotropic Kuwahara pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    radius: u32,
    alpha: f32,
    sectors: u32,
}

impl FilterParams {
    pub fn new(radius: u32, alpha: f32, sectors: u32) -> Result<Self, FilterParamsError> {
        if !(RADIUS_RANGE.0..=RADIUS_RANGE.1).contains(&radius) {
            return Err(FilterParamsError::Radius(radius));
        }
        if !alpha.is_finite() || !(ALPHA_RANGE.0..=ALPHA_RANGE.1).contains(&alpha) {
            return Err(FilterParamsError::Alpha(alpha));
        }
        if !(SECTOR_RANGE.0..=SECTOR_RANGE.1).contains(&sectors) {
            return Err(FilterParamsError::Sectors(sectors));
        }
        Ok(Self {
            radius,
            alpha,
            sectors,
        })
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn sectors(&self) -> u32 {
        self.sectors
    }
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            radius: 7,
            alpha: 25.0,
            sectors: KUWAHARA_SECTORS,
        }
    }
}

/// Per-frame inputs handed to every pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub time: f32,
    pub frame_index: u64,
    pub size: SurfaceSize,
    pub pointer: Pointer,
    pub filter: FilterParams,
}

/// Which implementation executes the passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Gpu,
    Cpu,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "gpu" | "wgpu" => Ok(Self::Gpu),
            "cpu" | "reference" => Ok(Self::Cpu),
            other => Err(format!("unknown backend `{other}` (expected gpu or cpu)")),
        }
    }
}

/// Configuration for the interactive preview window.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Initial inner size in logical pixels.
    pub surface_size: SurfaceSize,
    pub stylize: bool,
    pub filter: FilterParams,
    /// Optional FPS cap; `None` renders on every redraw.
    pub target_fps: Option<f32>,
    pub paper_seed: u64,
    pub confetti_seed: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            surface_size: SurfaceSize {
                width: 960,
                height: 720,
            },
            stylize: true,
            filter: FilterParams::default(),
            target_fps: None,
            paper_seed: crate::paper::DEFAULT_PAPER_SEED,
            confetti_seed: 0,
        }
    }
}
