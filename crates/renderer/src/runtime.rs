use std::time::{Duration, Instant};

/// Snapshot of the clock handed to the scene pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Elapsed time since mount in seconds.
    pub seconds: f32,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where time values originate from.
pub trait TimeSource: Send {
    /// Elapsed seconds for the next frame.
    fn seconds(&mut self) -> f32;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn seconds(&mut self) -> f32 {
        self.origin.elapsed().as_secs_f32()
    }
}

/// Time source that always reports a fixed timestamp. Used for still export.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    time: f32,
}

impl FixedTimeSource {
    pub fn new(time: f32) -> Self {
        Self {
            time: time.max(0.0),
        }
    }

    pub fn time(&self) -> f32 {
        self.time
    }
}

impl TimeSource for FixedTimeSource {
    fn seconds(&mut self) -> f32 {
        self.time
    }
}

pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

/// Frame clock owned by the orchestrator: elapsed seconds plus a frame counter.
///
/// Samples never go backwards even if the underlying source does.
pub struct FrameClock {
    source: BoxedTimeSource,
    frame: u64,
    last_seconds: f32,
}

impl FrameClock {
    pub fn new(source: BoxedTimeSource) -> Self {
        Self {
            source,
            frame: 0,
            last_seconds: 0.0,
        }
    }

    pub fn system() -> Self {
        Self::new(Box::new(SystemTimeSource::new()))
    }

    pub fn fixed(time: f32) -> Self {
        Self::new(Box::new(FixedTimeSource::new(time)))
    }

    /// Reads the clock once for the upcoming frame.
    pub fn tick(&mut self) -> TimeSample {
        let seconds = self.source.seconds().max(self.last_seconds);
        self.last_seconds = seconds;
        let sample = TimeSample::new(seconds, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }
}

impl std::fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameClock")
            .field("frame", &self.frame)
            .field("last_seconds", &self.last_seconds)
            .finish()
    }
}

/// Decides when the preview loop should request the next redraw.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    interval: Option<Duration>,
    last_frame: Option<Instant>,
}

impl FrameScheduler {
    /// `target_fps` of `None` (or a non-positive value) renders as fast as the surface allows.
    pub fn new(target_fps: Option<f32>) -> Self {
        let interval = target_fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)));
        Self {
            interval,
            last_frame: None,
        }
    }

    pub fn ready_for_frame(&self, now: Instant) -> bool {
        match (self.interval, self.last_frame) {
            (Some(interval), Some(last)) => now.saturating_duration_since(last) >= interval,
            _ => true,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.interval, self.last_frame) {
            (Some(interval), Some(last)) => Some(last + interval),
            _ => None,
        }
    }

    pub fn mark_rendered(&mut self, now: Instant) {
        self.last_frame = Some(now);
    }
}
