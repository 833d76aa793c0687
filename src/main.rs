use clap::Parser;
use log::{error, info, LevelFilter};

use sqlitefs::{Filesystem, SqliteFs, Storage};

/// A POSIX filesystem backed by a SQLite database, exposed over FUSE.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Where to mount the filesystem.
    mountpoint: String,

    /// Path to the SQLite database file backing the filesystem. Created
    /// and bootstrapped with a root directory if it doesn't exist yet.
    #[arg(long, default_value = "sqlitefs.db")]
    database: String,

    /// Run in the foreground instead of forking into the background.
    #[arg(long)]
    foreground: bool,

    /// Increase log verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Number of pooled database connections (bound worker concurrency).
    #[arg(long, default_value_t = 8)]
    connections: usize,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    let storage = match Storage::open(&args.database, args.connections) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to open database {}: {}", args.database, e);
            std::process::exit(1);
        }
    };

    let fs = SqliteFs::new(Filesystem::new(storage));

    let mut options = vec![
        fuser::MountOption::FSName("sqlitefs".to_string()),
        fuser::MountOption::DefaultPermissions,
    ];
    if !args.foreground {
        options.push(fuser::MountOption::AutoUnmount);
    }

    info!("mounting {} on {}", args.database, args.mountpoint);
    if let Err(e) = fuser::mount2(fs, &args.mountpoint, &options) {
        error!("mount failed: {}", e);
        std::process::exit(match e.kind() {
            std::io::ErrorKind::PermissionDenied => 2,
            _ => 1,
        });
    }
}
