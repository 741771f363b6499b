/*!
 # Scheduling of effects

 This module provides the activation windows that decide which effects
 a site may run at a given local time, and the wall-clock rotation that
 picks one effect out of the currently active set.
*/

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc, Weekday};

use crate::effects::Effect;

/// Day-of-week bitmask constants for activation windows
pub mod days {
    /// Monday (0x01)
    pub const MONDAY: u8 = 0x01;
    /// Tuesday (0x02)
    pub const TUESDAY: u8 = 0x02;
    /// Wednesday (0x04)
    pub const WEDNESDAY: u8 = 0x04;
    /// Thursday (0x08)
    pub const THURSDAY: u8 = 0x08;
    /// Friday (0x10)
    pub const FRIDAY: u8 = 0x10;
    /// Saturday (0x20)
    pub const SATURDAY: u8 = 0x20;
    /// Sunday (0x40)
    pub const SUNDAY: u8 = 0x40;
    /// Monday through Friday (0x1F)
    pub const WEEKDAYS: u8 = MONDAY | TUESDAY | WEDNESDAY | THURSDAY | FRIDAY;
    /// Saturday and Sunday (0x60)
    pub const WEEKEND: u8 = SATURDAY | SUNDAY;
    /// Every day (0x7F)
    pub const ALL: u8 = WEEKDAYS | WEEKEND;
}

/// Bit for a `chrono` weekday, matching the constants in [`days`].
pub fn day_bit(weekday: Weekday) -> u8 {
    1 << weekday.num_days_from_monday()
}

/// How long one effect runs before the rotation advances to the next
/// active one
pub const SECONDS_PER_EFFECT: i64 = 30;

/// An effect plus the local-time window in which it may run.
///
/// The window is inclusive at minute resolution on both ends and never
/// crosses midnight; a window whose start lies after its end is simply
/// never active.
pub struct EffectSchedule {
    /// The effect to run while the window is active
    pub effect: Box<dyn Effect>,
    /// Day-of-week bitmask, see [`days`]
    pub days: u8,
    /// First active hour (0-23)
    pub start_hour: u32,
    /// Last active hour (0-23)
    pub end_hour: u32,
    /// Minute within `start_hour` the window opens
    pub start_minute: u32,
    /// Minute within `end_hour` the window closes (60 covers the hour)
    pub end_minute: u32,
}

impl EffectSchedule {
    /// A window spanning whole hours on the given days:
    /// `[start_hour:00, end_hour:60]`.
    pub fn new(effect: Box<dyn Effect>, days: u8, start_hour: u32, end_hour: u32) -> Self {
        Self::with_minutes(effect, days, start_hour, 0, end_hour, 60)
    }

    /// A window with explicit minutes on both ends.
    pub fn with_minutes(
        effect: Box<dyn Effect>,
        days: u8,
        start_hour: u32,
        start_minute: u32,
        end_hour: u32,
        end_minute: u32,
    ) -> Self {
        EffectSchedule {
            effect,
            days,
            start_hour,
            end_hour,
            start_minute,
            end_minute,
        }
    }

    /// An always-active schedule.
    pub fn always(effect: Box<dyn Effect>) -> Self {
        Self::new(effect, days::ALL, 0, 23)
    }

    /// Whether the window is open at the given local civil time.
    pub fn is_active_at(&self, local: NaiveDateTime) -> bool {
        if day_bit(local.weekday()) & self.days == 0 {
            return false;
        }
        let now = local.hour() * 60 + local.minute();
        let open = self.start_hour * 60 + self.start_minute;
        let close = self.end_hour * 60 + self.end_minute;
        open <= now && now <= close
    }
}

/// Index into the active-schedule list for this instant.
///
/// Rotation advances every [`SECONDS_PER_EFFECT`] seconds of wall clock
/// since the site started, so recomputing the active list each frame
/// still lands on a deterministic choice.
pub fn rotation_index(now: DateTime<Utc>, started: DateTime<Utc>, active_len: usize) -> usize {
    debug_assert!(active_len > 0);
    let elapsed = (now - started).num_seconds().max(0);
    (elapsed / SECONDS_PER_EFFECT) as usize % active_len
}
