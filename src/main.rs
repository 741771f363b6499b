use clap::Parser;
use color_eyre::eyre::Result;
use nightdriver_server::{sites, SiteRegistry};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Seconds between status lines printed to stdout
    #[arg(long, default_value_t = 5)]
    status_interval: u64,

    /// Print the compiled-in site catalog and exit
    #[arg(long)]
    list_sites: bool,
}

fn main() -> Result<()> {
    // Initialize tracing with pretty colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("nightdriver_server=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    // A bad strip extent is fatal here, before any thread starts.
    let sites = sites::builtin_sites()?;

    if cli.list_sites {
        for site in &sites {
            println!(
                "{}: {} pixels @ {} fps",
                site.name(),
                site.pixel_count(),
                site.target_fps()
            );
            for strip in site.strips() {
                let cfg = strip.config();
                println!(
                    "  {} -> {}:{} pixels {}..{}{}{}",
                    cfg.name,
                    cfg.host,
                    cfg.port,
                    cfg.offset,
                    cfg.offset + cfg.length,
                    if cfg.reversed { " reversed" } else { "" },
                    if cfg.compress { " compressed" } else { "" },
                );
            }
        }
        return Ok(());
    }

    let registry = SiteRegistry::new(sites);
    registry.start();
    info!(
        "Serving {} site(s); status every {}s",
        registry.sites().len(),
        cli.status_interval
    );

    // Observer loop: read-only snapshots, one line per site.
    let interval = Duration::from_secs(cli.status_interval.max(1));
    let mut last_frames: Vec<u64> = registry.sites().iter().map(|_| 0).collect();
    loop {
        std::thread::sleep(interval);
        for (i, status) in registry.status().into_iter().enumerate() {
            let fps = (status.frames_total - last_frames[i]) as f64 / interval.as_secs_f64();
            last_frames[i] = status.frames_total;
            println!("{status} fps={fps:.1}");
        }
        println!("global min spare: {}ms", registry.global_min_spare_ms());
    }
}
