/*!
 # Sites and their render loops

 A site is one physical installation: a pixel buffer, the strips that
 carve it up, and the schedules that decide what plays on it. Each site
 runs a dedicated render thread that holds the frame cadence and feeds
 every strip client from a single buffer snapshot per tick.
*/

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::client::StripClient;
use crate::codec::BUFFER_LATENCY;
use crate::graphics::{PixelBuffer, Rgb};
use crate::schedule::{rotation_index, EffectSchedule};
use crate::{Error, Result};

/// Window over which the minimum per-tick headroom is tracked
const SPARE_WINDOW: Duration = Duration::from_secs(1);

/// Name reported while no schedule window is open
const IDLE_EFFECT_NAME: &str = "(idle)";

/// One LED installation: pixel buffer, strips, schedules and the
/// render thread that drives them.
pub struct Site {
    name: String,
    pixel_count: usize,
    target_fps: f64,
    strips: Vec<Arc<StripClient>>,
    /// Taken by the render thread at start; the thread owns the
    /// schedules (and their effect state) from then on.
    schedules: Mutex<Option<Vec<EffectSchedule>>>,
    started: AtomicBool,
    frames: AtomicU64,
    overruns: AtomicU64,
    spare_ms: AtomicI64,
    effect_name: RwLock<&'static str>,
}

impl Site {
    /// Builds a site, validating every strip extent against the buffer.
    /// An out-of-range strip is a configuration error and fatal at
    /// startup.
    pub fn new(
        name: impl Into<String>,
        pixel_count: usize,
        target_fps: f64,
        strips: Vec<Arc<StripClient>>,
        schedules: Vec<EffectSchedule>,
    ) -> Result<Arc<Self>> {
        let name = name.into();
        for strip in &strips {
            let cfg = strip.config();
            if cfg.offset + cfg.length > pixel_count {
                return Err(Error::StripOutOfRange {
                    strip: cfg.name.clone(),
                    site: name,
                    offset: cfg.offset,
                    length: cfg.length,
                    pixel_count,
                });
            }
        }

        Ok(Arc::new(Site {
            name,
            pixel_count,
            target_fps,
            strips,
            schedules: Mutex::new(Some(schedules)),
            started: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            spare_ms: AtomicI64::new(0),
            effect_name: RwLock::new(IDLE_EFFECT_NAME),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    pub fn target_fps(&self) -> f64 {
        self.target_fps
    }

    pub fn strips(&self) -> &[Arc<StripClient>] {
        &self.strips
    }

    /// Frames rendered since start; observers diff this for actual fps.
    pub fn frames_total(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Ticks that took longer than one frame period
    pub fn overruns_total(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Minimum per-tick headroom (period minus render time) over the
    /// last second, in milliseconds. Negative while overrunning.
    pub fn spare_ms(&self) -> i64 {
        self.spare_ms.load(Ordering::Relaxed)
    }

    /// Name of the effect chosen on the most recent tick
    pub fn current_effect_name(&self) -> &'static str {
        *self.effect_name.read()
    }

    /// Spawns the render thread and every strip's send worker. Runs
    /// until process exit; there is no stop path.
    pub fn start(self: Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Site {} started twice; ignoring", self.name);
            return;
        }
        let schedules = self
            .schedules
            .lock()
            .take()
            .expect("schedules present before first start");

        info!(
            "Starting site {} ({} pixels, {} strips, {} schedules, {} fps)",
            self.name,
            self.pixel_count,
            self.strips.len(),
            schedules.len(),
            self.target_fps
        );

        for strip in &self.strips {
            Arc::clone(strip).start();
        }

        std::thread::Builder::new()
            .name(format!("render-{}", self.name))
            .spawn(move || self.run(schedules))
            .expect("spawn render thread");
    }

    /// Render loop. One render per tick, dispatch to every ready strip,
    /// then sleep off the remainder of the frame period. The pixel
    /// buffer lives on this thread's stack; nothing else ever sees a
    /// mutable reference to it.
    fn run(self: Arc<Self>, mut schedules: Vec<EffectSchedule>) {
        let mut canvas = PixelBuffer::new(self.pixel_count);
        let period = Duration::from_secs_f64(1.0 / self.target_fps);
        let started_at = Utc::now();
        let mut spare_window: VecDeque<(Instant, i64)> = VecDeque::new();

        loop {
            let tick_start = Instant::now();
            let now = Utc::now();

            self.render_frame(&mut canvas, &mut schedules, now, started_at);
            self.dispatch(canvas.as_slice(), now);
            self.frames.fetch_add(1, Ordering::Relaxed);

            let elapsed = tick_start.elapsed();
            let spare = period.as_secs_f64() - elapsed.as_secs_f64();
            self.update_spare(&mut spare_window, tick_start, (spare * 1000.0) as i64);

            if elapsed > period {
                self.overruns.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Site {} tick overran by {:?}",
                    self.name,
                    elapsed - period
                );
            } else {
                std::thread::sleep(period - elapsed);
            }
        }
    }

    /// Picks the active effect for this instant and renders it into the
    /// buffer. With no window open the buffer keeps its previous
    /// contents and the frame is still dispatched.
    fn render_frame(
        &self,
        canvas: &mut PixelBuffer,
        schedules: &mut [EffectSchedule],
        now: DateTime<Utc>,
        started_at: DateTime<Utc>,
    ) {
        let local = Local::now().naive_local();
        let active: Vec<usize> = schedules
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_active_at(local))
            .map(|(i, _)| i)
            .collect();

        if active.is_empty() {
            *self.effect_name.write() = IDLE_EFFECT_NAME;
            return;
        }

        let pick = active[rotation_index(now, started_at, active.len())];
        let schedule = &mut schedules[pick];
        schedule.effect.render(canvas, now);
        *self.effect_name.write() = schedule.effect.name();
    }

    /// Offers the frame to every strip. Each strip sees a consistent
    /// snapshot; a strip either takes its whole slice or drops the
    /// frame.
    fn dispatch(&self, frame: &[Rgb], now: DateTime<Utc>) {
        let present = now + chrono::Duration::from_std(BUFFER_LATENCY).expect("latency fits");
        for strip in &self.strips {
            let cfg = strip.config();
            let mut slice: Vec<Rgb> = frame[cfg.offset..cfg.offset + cfg.length].to_vec();
            if cfg.reversed {
                slice.reverse();
            }
            strip.enqueue(&slice, present);
        }
    }

    fn update_spare(
        &self,
        window: &mut VecDeque<(Instant, i64)>,
        now: Instant,
        spare_ms: i64,
    ) {
        window.push_back((now, spare_ms));
        while let Some(&(t, _)) = window.front() {
            if now.duration_since(t) > SPARE_WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
        let min = window.iter().map(|&(_, s)| s).min().unwrap_or(0);
        self.spare_ms.store(min, Ordering::Relaxed);
    }
}
