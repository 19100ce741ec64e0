use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process;

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, LevelFilter};

use get_song::download::{self, DownloadOptions, Downloader};
use get_song::notify::ProgressLog;
use get_song::resolve::{self, SourceDescriptor};
use get_song::tools::{self, ToolRun};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Notification id and program name.
const PROG_NAME: &str = "get-song";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to save downloaded files to
    #[arg(short, long, value_name = "DIR", value_hint = ValueHint::DirPath, default_value_t = String::from("."))]
    directory: String,

    /// Timestamp prefix for filenames
    ///
    /// [default: today as YYYYMMDD, or the date prefix of a file input]
    #[arg(short, long, value_name = "DATETIME")]
    timestamp: Option<String>,

    /// Number of recent log lines to show in the notification
    #[arg(long, value_name = "N", default_value_t = 5)]
    notification_lines: usize,

    /// Populate an empty album metadata field with the title field
    #[arg(long, default_value_t = false)]
    populate_empty_album: bool,

    /// If the target file already exists, take its mtime plus SECONDS for
    /// the downloaded file
    #[arg(long, value_name = "SECONDS", allow_hyphen_values = true)]
    use_existing_target_file_mtime_shifted: Option<i64>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    /// URLs to download from, or audio file paths to get download URLs from
    #[arg(value_name = "URL-OR-FILE", required = true, value_hint = ValueHint::AnyPath)]
    inputs: Vec<String>,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
        logger.filter_module("get_song", level);
    }

    logger.init();
}

/// Checks that the target directory can receive downloads.
fn validate_target_dir(dir: &Path) -> Result<(), String> {
    if !dir.exists() {
        return Err(format!("Directory does not exist: {}", dir.display()));
    }
    if !dir.is_dir() {
        return Err(format!("Not a directory: {}", dir.display()));
    }
    Ok(())
}

/// Classifies one input and, for file inputs, resolves it into a source.
///
/// Returns `None` when the input cannot be processed; the batch then
/// continues with the next input.
async fn resolve_input(input: &str, log: &mut ProgressLog) -> Option<SourceDescriptor> {
    if resolve::is_url(input) {
        log.info(&format!("Processing URL '{input}'...")).await;
        return Some(SourceDescriptor {
            url: input.to_string(),
            timestamp: None,
        });
    }

    let path = Path::new(input);
    if !path.exists() {
        log.warn(&format!("File does not exist: {input}")).await;
        return None;
    }

    log.info(&format!("Processing file '{input}'...")).await;
    match resolve::resolve(path, log).await {
        Ok(source) => Some(source),
        Err(e) => {
            log.warn(&format!("No URL found in metadata for file: {input}"))
                .await;
            debug!("resolution detail: {e}");
            None
        }
    }
}

/// Pushes freshly downloaded files into the Android media library.
///
/// A missing scanner abandons the remaining calls; scan failures never
/// affect the batch result.
async fn scan_media(files: &[PathBuf], log: &mut ProgressLog) {
    if files.is_empty() {
        return;
    }

    log.info("Scanning files for Android media library...").await;
    for file in files {
        let name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match tools::run("termux-media-scan", [OsStr::new("-v"), file.as_os_str()]).await {
            Ok(ToolRun::Unavailable) => {
                log.warn("termux-media-scan not found, skipping media scan")
                    .await;
                break;
            }
            Ok(ToolRun::Finished(output)) if output.status.success() => {
                log.info(&format!("Media scan completed for '{name}'")).await;
            }
            Ok(ToolRun::Finished(_)) => {
                log.warn(&format!("Media scan failed for '{name}'")).await;
            }
            Err(e) => {
                log.warn(&format!("Media scan error for '{name}': {e}")).await;
            }
        }
    }
}

/// Processes the whole batch and returns the process exit code.
async fn run(args: &Args, log: &mut ProgressLog) -> i32 {
    // Pre-flight: the downloader is the one hard dependency. Without it,
    // nothing is attempted.
    if !tools::is_available(download::DOWNLOADER) {
        error!("Required utilities missing: {}", download::DOWNLOADER);
        return 1;
    }

    let target_dir = PathBuf::from(&args.directory);
    if let Err(reason) = validate_target_dir(&target_dir) {
        error!("{reason}");
        return 1;
    }

    let downloader = Downloader::new(&target_dir);
    let options = DownloadOptions {
        timestamp: args.timestamp.clone(),
        populate_album: args.populate_empty_album,
        mtime_shift: args.use_existing_target_file_mtime_shifted,
    };

    let mut all_success = true;
    let mut downloaded = Vec::new();

    for input in &args.inputs {
        let Some(source) = resolve_input(input, log).await else {
            all_success = false;
            continue;
        };

        let outcome = downloader.download(&source, &options, log).await;
        match outcome.final_path {
            Some(path) if outcome.succeeded => downloaded.push(path),
            _ => {
                all_success = false;
                log.warn(&format!("Failed to download '{input}'!")).await;
            }
        }
    }

    scan_media(&downloaded, log).await;

    if all_success {
        log.success("Song(s) downloaded successfully.").await;
        0
    } else {
        log.failure("Failed to download some songs!").await;
        1
    }
}

/// Main entry point of the application.
///
/// Initializes the logger facade, parses the command line arguments, runs
/// the batch, and always finalizes the notification before exiting.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();
    info!("starting {name}/{version}; {BUILD_PROFILE}");

    let mut log = ProgressLog::new(PROG_NAME, args.notification_lines);
    let code = run(&args, &mut log).await;

    // Resource-release guarantee: the notification must stop being
    // "ongoing" no matter which path brought us here.
    log.finalize().await;
    process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_target_dir_accepts_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(validate_target_dir(dir.path()).is_ok());
    }

    #[test]
    fn test_validate_target_dir_rejects_missing_path() {
        let error = validate_target_dir(Path::new("/definitely/not/a/real/path"))
            .expect_err("missing directory must be rejected");
        assert!(error.starts_with("Directory does not exist"));
    }

    #[test]
    fn test_validate_target_dir_rejects_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("plain-file");
        std::fs::write(&file, b"x").expect("file written");

        let error = validate_target_dir(&file).expect_err("plain file must be rejected");
        assert!(error.starts_with("Not a directory"));
    }

    #[test]
    fn test_args_parse_defaults() {
        let args = Args::parse_from(["get-song", "https://example.com/x"]);
        assert_eq!(args.directory, ".");
        assert_eq!(args.notification_lines, 5);
        assert!(!args.populate_empty_album);
        assert_eq!(args.use_existing_target_file_mtime_shifted, None);
        assert_eq!(args.inputs, ["https://example.com/x"]);
    }

    #[test]
    fn test_args_negative_mtime_shift() {
        let args = Args::parse_from([
            "get-song",
            "--use-existing-target-file-mtime-shifted",
            "-60",
            "input.opus",
        ]);
        assert_eq!(args.use_existing_target_file_mtime_shifted, Some(-60));
    }

    #[test]
    fn test_args_require_an_input() {
        assert!(Args::try_parse_from(["get-song"]).is_err());
    }
}
