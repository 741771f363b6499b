/*!
 # NightDriver LED Animation Server

 A Rust server that renders RGB animation frames for one or more physical
 LED installations ("sites") and streams them, compressed and timestamped,
 to networked strip controllers over TCP. Controllers buffer roughly one
 second of future frames and display each one when wall-clock time reaches
 its embedded presentation timestamp.

 ## Features

 * Fixed-cadence render loop per site, one OS thread each
 * Time-of-day / day-of-week scheduling of effects
 * Anti-aliased 1-D drawing surface for effect authors
 * Per-strip TCP clients with bounded queues and reconnect backoff
 * Optional DEFLATE compression of the pixel wire format
 * Periodic status reporting for every site and strip

 ## Example

 ```no_run
 use nightdriver_server::{Result, SiteRegistry};

 fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     // Bring up every compiled-in site and its strip workers
     let registry = SiteRegistry::new(nightdriver_server::sites::builtin_sites()?);
     registry.start();

     loop {
         std::thread::sleep(std::time::Duration::from_secs(5));
         for status in registry.status() {
             println!("{status}");
         }
     }
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the LED animation server
#[derive(Error, Debug)]
pub enum Error {
    /// A strip claims pixels outside its site's buffer
    #[error("strip '{strip}' covers pixels {offset}..{end} of site '{site}' which has only {pixel_count}", end = .offset + .length)]
    StripOutOfRange {
        /// Strip name as declared in the site catalog
        strip: String,
        /// Site name
        site: String,
        /// First pixel of the strip's extent
        offset: usize,
        /// Number of pixels the strip covers
        length: usize,
        /// Total pixels in the site buffer
        pixel_count: usize,
    },

    /// Frame payload too large for the wire format
    #[error("frame of {0} pixels exceeds the wire format limit")]
    FrameTooLarge(usize),

    /// Incoming or loop-back bytes do not parse as a frame
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// Controller hostname did not resolve to an address
    #[error("could not resolve controller address {0}")]
    HostUnresolved(String),

    /// I/O error from sockets or compression
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// Import needed for Result type extension
pub type Result<T> = std::result::Result<T, Error>;

// Re-export modules
pub mod client;
pub mod codec;
pub mod effects;
pub mod graphics;
pub mod registry;
pub mod schedule;
pub mod site;
pub mod sites;

// Re-export key types
pub use client::{StripClient, StripConfig, QUEUE_CAPACITY};
pub use codec::{BUFFER_LATENCY, WIFI_COMMAND_PIXELDATA64};
pub use effects::Effect;
pub use graphics::{PixelBuffer, Rgb};
pub use registry::{SiteRegistry, SiteStatus};
pub use schedule::{days, EffectSchedule};
pub use site::Site;
