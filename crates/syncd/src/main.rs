//! syncd — command-line entry point for the tracker sync daemon.

use std::path::PathBuf;
use std::time::Duration;

use tracker_core::SyncError;
use tracker_protocol::FitbitClient;
use tracker_server::GalileoClient;
use tracker_transport::RusbDongleChannel;

use syncd::{run_once, RunOptions, TrackerOutcome};

const DEFAULT_SERVER_URL: &str = "https://production.galileo.fitbit.com/device/tracker/uploadData";
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    println!("Usage: syncd <command> [options]");
    println!();
    println!("Commands:");
    println!("  sync                     Run a single sync pass and exit");
    println!("  daemon                   Run sync passes on a fixed period");
    println!("  version                  Print the version and exit");
    println!();
    println!("Options:");
    println!("  --force / --no-force         Sync even recently-synced trackers (default: no-force)");
    println!("  --dump / --no-dump           Archive dumps to disk (default: dump)");
    println!("  --upload / --no-upload       Upload dumps to the server (default: upload)");
    println!("  --include <hex>              Only sync trackers whose id contains <hex> (repeatable)");
    println!("  --exclude <hex>              Skip trackers whose id contains <hex> (repeatable)");
    println!("  --dump-dir <path>            Where to archive dumps (default: ./dumps)");
    println!("  --daemon-period <seconds>    Seconds between daemon passes (default: 3600)");
    println!("  --server-url <url>           Galileo server URL");
}

struct Cli {
    force: bool,
    dump: bool,
    upload: bool,
    include: Vec<String>,
    exclude: Vec<String>,
    dump_dir: PathBuf,
    daemon_period: Duration,
    server_url: String,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            force: false,
            dump: true,
            upload: true,
            include: Vec::new(),
            exclude: Vec::new(),
            dump_dir: PathBuf::from("./dumps"),
            daemon_period: Duration::from_secs(3600),
            server_url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}

fn parse_args(args: &[String]) -> Result<Cli, String> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--force" => cli.force = true,
            "--no-force" => cli.force = false,
            "--dump" => cli.dump = true,
            "--no-dump" => cli.dump = false,
            "--upload" => cli.upload = true,
            "--no-upload" => cli.upload = false,
            "--include" => {
                i += 1;
                cli.include.push(args.get(i).ok_or("--include requires a value")?.clone());
            }
            "--exclude" => {
                i += 1;
                cli.exclude.push(args.get(i).ok_or("--exclude requires a value")?.clone());
            }
            "--dump-dir" => {
                i += 1;
                cli.dump_dir = PathBuf::from(args.get(i).ok_or("--dump-dir requires a value")?);
            }
            "--daemon-period" => {
                i += 1;
                let secs: u64 = args
                    .get(i)
                    .ok_or("--daemon-period requires a value")?
                    .parse()
                    .map_err(|_| "--daemon-period must be a number of seconds")?;
                cli.daemon_period = Duration::from_secs(secs);
            }
            "--server-url" => {
                i += 1;
                cli.server_url = args.get(i).ok_or("--server-url requires a value")?.clone();
            }
            other => return Err(format!("unknown option: {other}")),
        }
        i += 1;
    }
    Ok(cli)
}

impl Cli {
    fn into_run_options(self) -> RunOptions {
        RunOptions {
            force_sync: self.force,
            dump_enabled: self.dump,
            upload_enabled: self.upload,
            include: if self.include.is_empty() { None } else { Some(self.include) },
            exclude: if self.exclude.is_empty() { None } else { Some(self.exclude) },
            dump_dir: self.dump_dir,
            server_url: self.server_url,
            client_version: VERSION.to_string(),
        }
    }
}

fn run_pass(opts: &RunOptions) -> Result<(), SyncError> {
    let channel = match RusbDongleChannel::open() {
        Ok(c) => c,
        Err(SyncError::NoDongle) => {
            tracing::warn!("no dongle found, nothing to do");
            return Ok(());
        }
        Err(SyncError::PermissionDenied) => {
            eprintln!("permission denied accessing the dongle; check your udev rules");
            return Err(SyncError::PermissionDenied);
        }
        Err(e) => return Err(e),
    };
    let mut client = FitbitClient::new(channel);
    let server = GalileoClient::new(&opts.server_url, &opts.client_version);

    let results = run_once(&mut client, &server, opts)?;
    for r in &results {
        match &r.outcome {
            TrackerOutcome::Uploaded => tracing::info!(tracker = %r.tracker_id_hex, "synced"),
            other => tracing::info!(tracker = %r.tracker_id_hex, outcome = ?other, "sync finished"),
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().cloned() else {
        print_usage();
        std::process::exit(1);
    };

    match command.as_str() {
        "version" => {
            println!("syncd {VERSION}");
        }
        "sync" => {
            let cli = match parse_args(&args[1..]) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("{e}");
                    print_usage();
                    std::process::exit(1);
                }
            };
            let opts = cli.into_run_options();
            if let Err(e) = run_pass(&opts) {
                eprintln!("sync failed: {e}");
                std::process::exit(1);
            }
        }
        "daemon" => {
            let cli = match parse_args(&args[1..]) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("{e}");
                    print_usage();
                    std::process::exit(1);
                }
            };
            let period = cli.daemon_period;
            let opts = cli.into_run_options();
            loop {
                match run_pass(&opts) {
                    Ok(()) => std::thread::sleep(period),
                    Err(SyncError::BackOff { min_ms, max_ms }) => {
                        let wait_ms = tracker_server::BackOff::new(min_ms, max_ms).sample();
                        tracing::warn!(wait_ms, "server requested back-off");
                        std::thread::sleep(Duration::from_millis(wait_ms));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "sync pass failed");
                        std::thread::sleep(period);
                    }
                }
            }
        }
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("unknown command: {other}");
            print_usage();
            std::process::exit(1);
        }
    }
}
