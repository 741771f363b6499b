/*!
 # Compiled-in site catalog

 The server takes no configuration files: every installation, its strip
 controllers and its schedule windows are declared here and baked into
 the binary.
*/

use std::sync::Arc;

use crate::client::{StripClient, StripConfig, DEFAULT_PORT};
use crate::effects::{Comet, RainbowScroll, SolidFill, Twinkle};
use crate::graphics::Rgb;
use crate::schedule::{days, EffectSchedule};
use crate::site::Site;
use crate::Result;

/// Builds every site this process drives.
pub fn builtin_sites() -> Result<Vec<Arc<Site>>> {
    Ok(vec![cabana()?, tree()?])
}

/// Roofline run around the cabana: one buffer split across two
/// controllers, the far half mounted tip-to-tip so its slice reverses.
fn cabana() -> Result<Arc<Site>> {
    let strips = vec![
        StripClient::new(StripConfig {
            host: "192.168.8.36".into(),
            port: DEFAULT_PORT,
            name: "roof-east".into(),
            length: 144,
            channel_mask: 0xFFFF,
            offset: 0,
            reversed: false,
            compress: true,
        }),
        StripClient::new(StripConfig {
            host: "192.168.8.37".into(),
            port: DEFAULT_PORT,
            name: "roof-west".into(),
            length: 144,
            channel_mask: 0xFFFF,
            offset: 144,
            reversed: true,
            compress: true,
        }),
    ];

    let schedules = vec![
        // Daytime ambience
        EffectSchedule::new(Box::new(RainbowScroll::new(2.5, 24.0)), days::ALL, 8, 17),
        // Evenings rotate between the comet and sparkle looks
        EffectSchedule::new(Box::new(Comet::new(5.0, 40.0)), days::ALL, 18, 23),
        EffectSchedule::new(Box::new(Twinkle::new(0.05)), days::ALL, 18, 23),
    ];

    Site::new("cabana", 288, 22.0, strips, schedules)
}

/// Single-controller tree wrap on channel 1 only.
fn tree() -> Result<Arc<Site>> {
    let strips = vec![StripClient::new(StripConfig {
        host: "192.168.8.60".into(),
        port: DEFAULT_PORT,
        name: "trunk".into(),
        length: 32,
        channel_mask: 0x0001,
        offset: 0,
        reversed: false,
        compress: false,
    })];

    let schedules = vec![
        EffectSchedule::new(Box::new(Twinkle::new(0.08)), days::ALL, 17, 23),
        // Weekday mornings get a steady warm glow before the windows open
        EffectSchedule::with_minutes(
            Box::new(SolidFill::new(Rgb::new(255, 96, 8))),
            days::WEEKDAYS,
            6,
            30,
            8,
            0,
        ),
    ];

    Site::new("tree", 32, 30.0, strips, schedules)
}
