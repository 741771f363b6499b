/*!
 # Effect catalog

 Effects are stateful pixel producers: each frame the site's render
 thread hands the active effect the drawing surface and the current
 time, and the effect repaints (or incrementally mutates) the buffer.
*/

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::graphics::{PixelBuffer, Rgb};

/// A pixel producer driven once per frame by the site render thread.
pub trait Effect: Send {
    /// Short type name, surfaced in status output
    fn name(&self) -> &'static str;

    /// Draws one frame onto `canvas`. `now` is wall-clock UTC, shared by
    /// every strip of the site for this frame.
    fn render(&mut self, canvas: &mut PixelBuffer, now: DateTime<Utc>);
}

/// Seconds since the epoch as a float, used to phase animations.
fn clock_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0
}

/// Paints the whole buffer one fixed color.
pub struct SolidFill {
    color: Rgb,
}

impl SolidFill {
    pub fn new(color: Rgb) -> Self {
        SolidFill { color }
    }
}

impl Effect for SolidFill {
    fn name(&self) -> &'static str {
        "SolidFill"
    }

    fn render(&mut self, canvas: &mut PixelBuffer, _now: DateTime<Utc>) {
        canvas.fill_solid(self.color);
    }
}

/// A full-spectrum hue ramp that scrolls along the strip over time.
pub struct RainbowScroll {
    /// Hue step between adjacent pixels, degrees
    delta_hue: f64,
    /// Scroll rate, degrees of hue per second
    speed: f64,
}

impl RainbowScroll {
    pub fn new(delta_hue: f64, speed: f64) -> Self {
        RainbowScroll { delta_hue, speed }
    }
}

impl Effect for RainbowScroll {
    fn name(&self) -> &'static str {
        "RainbowScroll"
    }

    fn render(&mut self, canvas: &mut PixelBuffer, now: DateTime<Utc>) {
        let start_hue = clock_seconds(now) * self.speed;
        canvas.fill_rainbow(start_hue, self.delta_hue);
    }
}

/// A bright anti-aliased head bouncing end to end, trailing a fading,
/// slowly hue-shifting tail.
pub struct Comet {
    /// Head width in pixels
    width: f64,
    /// Head speed in pixels per second
    speed: f64,
    /// Per-frame tail decay fraction
    decay: f64,
}

impl Comet {
    pub fn new(width: f64, speed: f64) -> Self {
        Comet {
            width,
            speed,
            decay: 0.25,
        }
    }

    /// Head position at time `t`, bouncing across `span` pixels.
    fn position(&self, t: f64, span: f64) -> f64 {
        if span <= 0.0 {
            return 0.0;
        }
        let cycle = (t * self.speed).rem_euclid(2.0 * span);
        if cycle > span {
            2.0 * span - cycle
        } else {
            cycle
        }
    }
}

impl Effect for Comet {
    fn name(&self) -> &'static str {
        "Comet"
    }

    fn render(&mut self, canvas: &mut PixelBuffer, now: DateTime<Utc>) {
        for i in 0..canvas.len() {
            canvas.fade_to_black_by(i, self.decay);
        }
        let t = clock_seconds(now);
        let span = (canvas.len() as f64 - self.width).max(0.0);
        let hue = (t * 20.0).rem_euclid(360.0);
        canvas.draw_pixels(self.position(t, span), self.width, Rgb::from_hsv(hue, 1.0, 1.0));
    }
}

/// Random pixels flare up and decay, like slow static.
pub struct Twinkle {
    /// Sparks ignited per frame, as a fraction of the buffer length
    density: f64,
    /// Per-frame decay fraction
    decay: f64,
    rng: StdRng,
}

impl Twinkle {
    pub fn new(density: f64) -> Self {
        Twinkle {
            density,
            decay: 0.08,
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    fn seeded(density: f64, seed: u64) -> Self {
        Twinkle {
            density,
            decay: 0.08,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Effect for Twinkle {
    fn name(&self) -> &'static str {
        "Twinkle"
    }

    fn render(&mut self, canvas: &mut PixelBuffer, _now: DateTime<Utc>) {
        for i in 0..canvas.len() {
            canvas.fade_to_black_by(i, self.decay);
        }
        if canvas.is_empty() {
            return;
        }
        let sparks = (canvas.len() as f64 * self.density).ceil() as usize;
        for _ in 0..sparks {
            let i = self.rng.gen_range(0..canvas.len());
            let hue = self.rng.gen_range(0.0..360.0);
            canvas.draw_pixel(i, Rgb::from_hsv(hue, 1.0, 1.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn solid_fill_paints_everything() {
        let mut canvas = PixelBuffer::new(12);
        let mut fx = SolidFill::new(Rgb::new(9, 8, 7));
        fx.render(&mut canvas, at(0));
        assert!(canvas.as_slice().iter().all(|&p| p == Rgb::new(9, 8, 7)));
    }

    #[test]
    fn rainbow_scroll_moves_with_time() {
        let mut canvas = PixelBuffer::new(16);
        let mut fx = RainbowScroll::new(10.0, 36.0);
        fx.render(&mut canvas, at(1_700_000_000));
        let first = canvas.as_slice().to_vec();
        fx.render(&mut canvas, at(1_700_000_003));
        assert_ne!(canvas.as_slice(), &first[..]);
    }

    #[test]
    fn comet_bounces_within_bounds() {
        let fx = Comet::new(4.0, 7.0);
        for tick in 0..400 {
            let pos = fx.position(tick as f64 * 0.173, 60.0);
            assert!((0.0..=60.0).contains(&pos), "escaped at tick {tick}: {pos}");
        }
    }

    #[test]
    fn comet_lights_pixels_and_trails_off() {
        let mut canvas = PixelBuffer::new(30);
        let mut fx = Comet::new(3.0, 5.0);
        fx.render(&mut canvas, at(1_700_000_010));
        let lit: usize = canvas
            .as_slice()
            .iter()
            .filter(|&&p| p != Rgb::BLACK)
            .count();
        assert!(lit >= 3, "comet head missing, only {lit} lit");
        assert!(lit <= 5, "comet head too wide: {lit} lit");
    }

    #[test]
    fn twinkle_sparks_then_decays() {
        let mut canvas = PixelBuffer::new(50);
        let mut fx = Twinkle::seeded(0.1, 42);
        fx.render(&mut canvas, at(0));
        assert!(canvas.as_slice().iter().any(|&p| p != Rgb::BLACK));

        // With no new sparks the field decays toward black.
        let mut quiet = Twinkle::seeded(0.0, 42);
        for _ in 0..200 {
            quiet.render(&mut canvas, at(0));
        }
        assert!(canvas.as_slice().iter().all(|&p| p == Rgb::BLACK));
    }
}
