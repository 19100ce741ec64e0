//! Download orchestration: drives the external downloader and finalizes
//! the file it produces.
//!
//! One [`Downloader::download`] call covers a single input end to end:
//!
//! 1. settle the `YYYYMMDD` stamp (explicit override, then the stamp the
//!    resolver carried over, then today);
//! 2. hand `yt-dlp` a scratch file to announce its final on-disk path in;
//! 3. run the downloader to completion with its output on the terminal;
//! 4. rename the announced file into the local naming convention;
//! 5. refresh the file's mtime, optionally repair the album tag, and
//!    optionally shift the mtime relative to a file that previously
//!    occupied the same name.
//!
//! The orchestrator never propagates errors to its caller: whatever goes
//! wrong is logged and folded into an unsuccessful [`DownloadOutcome`],
//! and the scratch file is deleted on every exit path.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::Builder;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::normalize::normalize_filename;
use crate::notify::ProgressLog;
use crate::resolve::SourceDescriptor;
use crate::tags;
use crate::tools::{self, ToolExit};

/// The external downloader; the one hard dependency of this tool.
pub const DOWNLOADER: &str = "yt-dlp";

/// Result of one download attempt.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DownloadOutcome {
    /// Final on-disk path, when the downloader produced a file.
    pub final_path: Option<PathBuf>,
    /// Whether this input counts as successfully processed.
    pub succeeded: bool,
}

impl DownloadOutcome {
    fn failed() -> Self {
        Self {
            final_path: None,
            succeeded: false,
        }
    }
}

/// Per-run options affecting the finalization steps.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct DownloadOptions {
    /// Explicit `YYYYMMDD` override for the output template.
    pub timestamp: Option<String>,
    /// Copy an empty album tag from the title after downloading.
    pub populate_album: bool,
    /// Seconds to offset the final mtime relative to a file that previously
    /// occupied the normalized target path. May be negative.
    pub mtime_shift: Option<i64>,
}

/// Drives the external downloader against one target directory.
#[derive(Clone, Debug)]
pub struct Downloader {
    /// Program to invoke; [`DOWNLOADER`] outside of tests.
    program: String,
    target_dir: PathBuf,
}

impl Downloader {
    /// Creates a downloader writing into `target_dir`.
    #[must_use]
    pub fn new(target_dir: &Path) -> Self {
        Self {
            program: DOWNLOADER.to_string(),
            target_dir: target_dir.to_path_buf(),
        }
    }

    /// Downloads one source and finalizes the produced file.
    ///
    /// Never returns an error: failures are logged and reported through the
    /// outcome. The scratch file receiving the announced path is deleted on
    /// success and failure alike; only a failed deletion is (harmlessly)
    /// logged.
    pub async fn download(
        &self,
        source: &SourceDescriptor,
        options: &DownloadOptions,
        log: &mut ProgressLog,
    ) -> DownloadOutcome {
        let scratch = match Builder::new().prefix("yt-dlp-filepath-").tempfile() {
            Ok(scratch) => scratch,
            Err(e) => {
                log.error(&format!("Could not create a scratch file: {e}")).await;
                return DownloadOutcome::failed();
            }
        };
        let announce_file = scratch.path().to_path_buf();

        let attempt = self.attempt(source, options, &announce_file, log).await;

        if let Err(e) = scratch.close() {
            log.warn(&format!(
                "Deleting temp file '{}' failed: {e}",
                announce_file.display()
            ))
            .await;
        }

        match attempt {
            Ok(Some(final_path)) => DownloadOutcome {
                final_path: Some(final_path),
                succeeded: true,
            },
            // the downloader spoke for itself on the terminal
            Ok(None) => DownloadOutcome::failed(),
            Err(e) => {
                log.error(&e.to_string()).await;
                DownloadOutcome::failed()
            }
        }
    }

    /// One full attempt. `Ok(None)` is a failure that needs no extra log
    /// line, `Err` is logged by the caller.
    async fn attempt(
        &self,
        source: &SourceDescriptor,
        options: &DownloadOptions,
        announce_file: &Path,
        log: &mut ProgressLog,
    ) -> Result<Option<PathBuf>> {
        let timestamp = match options.timestamp.as_ref().or(source.timestamp.as_ref()) {
            Some(stamp) => stamp.clone(),
            None => today_stamp()?,
        };

        log.info("Downloading the file...").await;

        let args = downloader_args(&timestamp, announce_file, &source.url);
        let status = match tools::run_inherited(&self.program, &args, Some(&self.target_dir)).await?
        {
            ToolExit::Unavailable => {
                return Err(Error::unavailable(format!(
                    "'{}' is not on the PATH",
                    self.program
                )));
            }
            ToolExit::Exited(status) => status,
        };
        if !status.success() {
            return Ok(None);
        }

        let announced = tokio::fs::read_to_string(announce_file).await?;
        let announced = announced.trim();
        if announced.is_empty() {
            log.error("No filepath returned from yt-dlp!").await;
            return Ok(None);
        }

        let final_path = self.finalize_file(announced, options, log).await?;
        log.info("Done.").await;
        Ok(Some(final_path))
    }

    /// Applies the naming convention and the post-download file tweaks.
    async fn finalize_file(
        &self,
        announced: &str,
        options: &DownloadOptions,
        log: &mut ProgressLog,
    ) -> Result<PathBuf> {
        // an absolute announced path replaces the join entirely
        let announced_path = self.target_dir.join(announced);
        let name = announced_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let normalized = normalize_filename(&name);

        let mut final_path = announced_path.clone();
        let mut previous_mtime: Option<SystemTime> = None;

        if normalized != name {
            log.info("Tweaking the file name...").await;
            let new_path = announced_path
                .parent()
                .unwrap_or(&self.target_dir)
                .join(&normalized);

            // remember what previously occupied the target slot, for the
            // optional mtime shift below
            if new_path.exists() {
                previous_mtime = Some(fs::metadata(&new_path)?.modified()?);
            }

            if announced_path.exists() {
                fs::rename(&announced_path, &new_path)?;
                log.info(&format!("Renamed '{name}' to '{normalized}'.")).await;
                final_path = new_path;
            } else {
                log.warn(&format!("File '{announced}' not found, skipping rename..."))
                    .await;
            }
        }

        if final_path.exists() {
            touch(&final_path)?;
        }

        if options.populate_album {
            log.info("Checking album metadata...").await;
            tags::repair_album(&final_path, log).await;
        }

        if let (Some(shift), Some(previous)) = (options.mtime_shift, previous_mtime) {
            match shift_mtime(&final_path, previous, shift) {
                Ok(()) => {
                    log.debug(&format!(
                        "Applied mtime shift of {shift}s to '{normalized}'"
                    ))
                    .await;
                }
                Err(e) => {
                    log.warn(&format!("Failed to apply mtime shift: {e}")).await;
                }
            }
        }

        Ok(final_path)
    }
}

/// Builds the fixed downloader argv for one URL.
fn downloader_args(timestamp: &str, announce_file: &Path, url: &str) -> Vec<std::ffi::OsString> {
    let template = format!(
        "{timestamp}--%(artist,album_artist,channel|unknown)#S--\
         %(album|unknown)#S--%(track,title|unknown)#S.%(ext)#S"
    );

    let mut args: Vec<std::ffi::OsString> = [
        "--no-playlist",
        "--js-runtimes",
        "node",
        "--audio-format",
        "opus",
        "-x",
        "--embed-metadata",
        "--embed-thumbnail",
        "--embed-subs",
        "-o",
    ]
    .into_iter()
    .map(Into::into)
    .collect();

    args.push(template.into());
    args.push("--print-to-file".into());
    args.push("after_move:filepath".into());
    args.push(announce_file.as_os_str().to_owned());
    args.push("--".into());
    args.push(url.into());
    args
}

/// Today's date as a `YYYYMMDD` string, in local time where determinable.
fn today_stamp() -> Result<String> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(now.format(format_description!("[year][month][day]"))?)
}

/// Refreshes a file's mtime to now.
fn touch(path: &Path) -> Result<()> {
    let file = OpenOptions::new().append(true).open(path)?;
    file.set_modified(SystemTime::now())?;
    Ok(())
}

/// Sets a file's mtime to `previous` offset by `shift_seconds`.
fn shift_mtime(path: &Path, previous: SystemTime, shift_seconds: i64) -> Result<()> {
    let offset = Duration::from_secs(shift_seconds.unsigned_abs());
    let shifted = if shift_seconds >= 0 {
        previous.checked_add(offset)
    } else {
        previous.checked_sub(offset)
    }
    .ok_or_else(|| Error::out_of_range("mtime shift overflows the clock range"))?;

    let file = OpenOptions::new().append(true).open(path)?;
    file.set_modified(shifted)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_today_stamp_shape() {
        let stamp = today_stamp().expect("date should format");
        assert_eq!(stamp.len(), 8);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_downloader_args_order() {
        let args = downloader_args("20240101", Path::new("/tmp/announce"), "https://example.com/x");

        assert_eq!(args[0], "--no-playlist");
        assert!(args.contains(&"--print-to-file".into()));
        // the URL is terminal and preceded by the option terminator
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args[args.len() - 1], "https://example.com/x");
        // template embeds the timestamp
        let template = args
            .iter()
            .find(|a| a.to_string_lossy().starts_with("20240101--"))
            .expect("template present");
        assert!(template.to_string_lossy().ends_with(".%(ext)#S"));
    }

    #[cfg(unix)]
    mod stubbed {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Writes an executable shell script standing in for yt-dlp. The
        /// announce file the orchestrator passes is argument 14.
        fn stub_downloader(dir: &Path, body: &str) -> Downloader {
            let program = dir.join("stub-downloader");
            fs::write(&program, format!("#!/bin/sh\n{body}\n")).expect("script written");
            let mut perms = fs::metadata(&program).expect("script exists").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&program, perms).expect("script made executable");

            Downloader {
                program: program.to_string_lossy().into_owned(),
                target_dir: dir.to_path_buf(),
            }
        }

        fn source() -> SourceDescriptor {
            SourceDescriptor {
                url: "https://example.com/watch?v=abc".to_string(),
                timestamp: Some("20240101".to_string()),
            }
        }

        #[tokio::test]
        async fn test_failing_downloader_leaves_no_scratch_file() {
            let dir = tempfile::tempdir().expect("temp dir");
            // capture the announce-file path we were handed, then fail
            let downloader = stub_downloader(dir.path(), "printf '%s' \"${14}\" > announce-path.txt; exit 1");

            let mut log = ProgressLog::new("get-song-test", 5);
            let outcome = downloader
                .download(&source(), &DownloadOptions::default(), &mut log)
                .await;

            assert!(!outcome.succeeded);
            assert_eq!(outcome.final_path, None);

            let captured = fs::read_to_string(dir.path().join("announce-path.txt"))
                .expect("stub captured the announce path");
            assert!(!captured.is_empty());
            assert!(
                !Path::new(captured.trim()).exists(),
                "scratch file must be deleted after a failed run"
            );
        }

        #[tokio::test]
        async fn test_empty_announcement_is_a_failure() {
            let dir = tempfile::tempdir().expect("temp dir");
            let downloader = stub_downloader(dir.path(), "exit 0");

            let mut log = ProgressLog::new("get-song-test", 5);
            let outcome = downloader
                .download(&source(), &DownloadOptions::default(), &mut log)
                .await;

            assert!(!outcome.succeeded);
        }

        #[tokio::test]
        async fn test_successful_download_renames_to_convention() {
            let dir = tempfile::tempdir().expect("temp dir");
            let downloader = stub_downloader(
                dir.path(),
                "name='20240101--Artist_Name--Album--My_Song.opus'\n\
                 : > \"$name\"\n\
                 printf '%s' \"$name\" > \"${14}\"\n\
                 exit 0",
            );

            let mut log = ProgressLog::new("get-song-test", 5);
            let outcome = downloader
                .download(&source(), &DownloadOptions::default(), &mut log)
                .await;

            assert!(outcome.succeeded);
            let expected = dir.path().join("20240101_artist-name_album_my-song.opus");
            assert_eq!(outcome.final_path.as_deref(), Some(expected.as_path()));
            assert!(expected.exists());
            assert!(!dir.path().join("20240101--Artist_Name--Album--My_Song.opus").exists());
        }

        #[tokio::test]
        async fn test_vanished_announced_file_skips_rename() {
            let dir = tempfile::tempdir().expect("temp dir");
            // announce a name without ever creating the file
            let downloader = stub_downloader(
                dir.path(),
                "printf '%s' '20240101--Gone--Album--Track.opus' > \"${14}\"; exit 0",
            );

            let mut log = ProgressLog::new("get-song-test", 5);
            let outcome = downloader
                .download(&source(), &DownloadOptions::default(), &mut log)
                .await;

            // non-fatal: the unrenamed name is reported as final
            assert!(outcome.succeeded);
            assert_eq!(
                outcome.final_path,
                Some(dir.path().join("20240101--Gone--Album--Track.opus"))
            );
        }

        #[tokio::test]
        async fn test_mtime_shift_relative_to_previous_occupant() {
            let dir = tempfile::tempdir().expect("temp dir");
            let normalized = dir.path().join("20240101_artist_album_track.opus");

            // a previous version already occupies the normalized slot, with
            // an mtime safely in the past
            fs::write(&normalized, b"previous version").expect("previous file");
            let previous_mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
            let file = OpenOptions::new()
                .append(true)
                .open(&normalized)
                .expect("previous file opens");
            file.set_modified(previous_mtime).expect("mtime set");
            drop(file);

            let downloader = stub_downloader(
                dir.path(),
                "name='20240101--Artist--Album--Track.opus'\n\
                 : > \"$name\"\n\
                 printf '%s' \"$name\" > \"${14}\"\n\
                 exit 0",
            );

            let options = DownloadOptions {
                mtime_shift: Some(60),
                ..DownloadOptions::default()
            };
            let mut log = ProgressLog::new("get-song-test", 5);
            let outcome = downloader.download(&source(), &options, &mut log).await;

            assert!(outcome.succeeded);
            let final_mtime = fs::metadata(&normalized)
                .expect("final file exists")
                .modified()
                .expect("mtime readable");
            assert_eq!(final_mtime, previous_mtime + Duration::from_secs(60));
        }

        #[tokio::test]
        async fn test_no_shift_without_previous_occupant() {
            let dir = tempfile::tempdir().expect("temp dir");
            let downloader = stub_downloader(
                dir.path(),
                "name='20240101--Artist--Album--Track.opus'\n\
                 : > \"$name\"\n\
                 printf '%s' \"$name\" > \"${14}\"\n\
                 exit 0",
            );

            let options = DownloadOptions {
                mtime_shift: Some(3600),
                ..DownloadOptions::default()
            };
            let mut log = ProgressLog::new("get-song-test", 5);
            let before = SystemTime::now();
            let outcome = downloader.download(&source(), &options, &mut log).await;

            assert!(outcome.succeeded);
            // without a previous occupant the shift does not apply; the
            // mtime stays at "touched just now"
            let final_mtime = fs::metadata(dir.path().join("20240101_artist_album_track.opus"))
                .expect("final file exists")
                .modified()
                .expect("mtime readable");
            // small slack for coarse filesystem timestamp granularity
            assert!(final_mtime >= before - Duration::from_secs(2));
            assert!(final_mtime <= SystemTime::now() + Duration::from_secs(5));
        }
    }
}
