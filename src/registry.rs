/*!
 # Process-wide site registry

 The registry owns the immutable list of sites. It is built once at
 boot, started once, and handed by reference to anything that wants to
 observe the running system; there is no global.
*/

use std::fmt;
use std::sync::Arc;

use crate::site::Site;

/// Immutable collection of every site this process drives.
pub struct SiteRegistry {
    sites: Vec<Arc<Site>>,
}

impl SiteRegistry {
    pub fn new(sites: Vec<Arc<Site>>) -> Self {
        SiteRegistry { sites }
    }

    pub fn sites(&self) -> &[Arc<Site>] {
        &self.sites
    }

    /// Starts every site's render thread and strip workers. They run
    /// until process exit; there is no stop path.
    pub fn start(&self) {
        for site in &self.sites {
            Arc::clone(site).start();
        }
    }

    /// Smallest per-tick headroom across all sites, in milliseconds.
    /// The canary for an overloaded host.
    pub fn global_min_spare_ms(&self) -> i64 {
        self.sites
            .iter()
            .map(|s| s.spare_ms())
            .min()
            .unwrap_or(0)
    }

    /// One point-in-time snapshot per site, for status printing.
    pub fn status(&self) -> Vec<SiteStatus> {
        self.sites
            .iter()
            .map(|site| SiteStatus {
                name: site.name().to_string(),
                frames_total: site.frames_total(),
                overruns_total: site.overruns_total(),
                spare_ms: site.spare_ms(),
                current_effect: site.current_effect_name(),
                strips: site
                    .strips()
                    .iter()
                    .map(|strip| StripStatus {
                        name: strip.config().name.clone(),
                        queue_depth: strip.queue_depth(),
                        connected: strip.is_connected(),
                        drops_total: strip.drops_total(),
                        frames_sent: strip.frames_sent(),
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Snapshot of one site's health
#[derive(Debug, Clone)]
pub struct SiteStatus {
    pub name: String,
    pub frames_total: u64,
    pub overruns_total: u64,
    pub spare_ms: i64,
    pub current_effect: &'static str,
    pub strips: Vec<StripStatus>,
}

/// Snapshot of one strip's health
#[derive(Debug, Clone)]
pub struct StripStatus {
    pub name: String,
    pub queue_depth: usize,
    pub connected: bool,
    pub drops_total: u64,
    pub frames_sent: u64,
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: effect={} spare={}ms frames={} overruns={}",
            self.name, self.current_effect, self.spare_ms, self.frames_total, self.overruns_total
        )?;
        for strip in &self.strips {
            write!(
                f,
                " | {}[{} q={} sent={} drops={}]",
                strip.name,
                if strip.connected { "up" } else { "down" },
                strip.queue_depth,
                strip.frames_sent,
                strip.drops_total
            )?;
        }
        Ok(())
    }
}
