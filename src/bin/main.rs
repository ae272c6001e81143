use clap::error::ErrorKind;
use clap::Parser;
use mrt2bmp::config::Config;
use mrt2bmp::supervisor::{run_replay, DataSource, Shutdown};
use mrt2bmp::sync::MirrorSource;
use std::path::PathBuf;
use std::process::exit;

/// Replay archived MRT routing data as a live BMP stream towards an OpenBMP
/// collector.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Opts {
    /// Configuration file path.
    #[clap(short, long)]
    config: PathBuf,

    /// Replay locally provided MRT files for the named router.
    #[clap(short, long)]
    router: Option<String>,

    /// Synchronize the named router from the RouteViews mirror;
    /// `list` prints the available routers and exits.
    #[clap(long = "routeviews", visible_alias = "rv", value_name = "NAME")]
    routeviews: Option<String>,

    /// Synchronize the named router from the RIPE RIS mirror;
    /// `list` prints the available routers and exits.
    #[clap(long = "ripe", visible_alias = "rp", value_name = "NAME")]
    ripe: Option<String>,
}

fn list_routers(source: MirrorSource) -> ! {
    match source.list_routers() {
        Ok(routers) => {
            for router in routers {
                println!("{router}");
            }
            exit(0);
        }
        Err(e) => {
            eprintln!("cannot list routers from {source}: {e}");
            exit(2);
        }
    }
}

fn main() {
    let opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{e}");
            exit(0);
        }
        Err(e) => {
            eprint!("{e}");
            match e.kind() {
                ErrorKind::UnknownArgument => exit(1),
                _ => exit(2),
            }
        }
    };

    let (router, source) = match (&opts.router, &opts.routeviews, &opts.ripe) {
        (Some(name), None, None) => (name.clone(), DataSource::Local),
        (None, Some(name), None) => {
            if name == "list" {
                list_routers(MirrorSource::RouteViews);
            }
            (name.clone(), DataSource::Mirror(MirrorSource::RouteViews))
        }
        (None, None, Some(name)) => {
            if name == "list" {
                list_routers(MirrorSource::RipeRis);
            }
            (name.clone(), DataSource::Mirror(MirrorSource::RipeRis))
        }
        _ => {
            eprintln!("exactly one of --router, --routeviews or --ripe must be given");
            exit(2);
        }
    };

    let config = match Config::load(&opts.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            exit(2);
        }
    };

    env_logger::Builder::new()
        .parse_filters(&config.logging.level)
        .init();

    let shutdown = Shutdown::new();
    let ctrlc_shutdown = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("interrupt received, shutting down");
        ctrlc_shutdown.trigger();
    }) {
        log::warn!("cannot install interrupt handler: {e}");
    }

    log::info!("starting replay of {router} towards {}:{}", config.collector.host, config.collector.port);
    if let Err(e) = run_replay(&config, &router, source, shutdown) {
        log::error!("{e}");
        exit(2);
    }
}
