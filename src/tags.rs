//! Tag backends shared by source resolution and album repair.
//!
//! Two ways of getting at a file's metadata, tried in order:
//!
//! 1. the structured tag library (`lofty`), which can also write tags back
//!    in place;
//! 2. an external `ffprobe` run emitting the container-level tag map as
//!    JSON, paired with `ffmpeg` for the write side (copy with rewritten
//!    metadata, then atomic replace).
//!
//! Both backends produce the same [`TagSet`] shape so callers can run one
//! cascade over either result. Keys are matched case-insensitively: probed
//! containers spell the same tag as `album` or `ALBUM` depending on the
//! muxer.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use lofty::{Accessor, AudioFile, ItemKey, ParseOptions, Probe, TaggedFileExt};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::notify::ProgressLog;
use crate::tools::{self, ToolRun};

/// Flat, case-insensitive view of one file's tag map.
#[derive(Debug, Default)]
pub struct TagSet {
    entries: HashMap<String, String>,
}

impl TagSet {
    /// Stores a tag value; the key is folded to lowercase.
    pub fn insert(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_ascii_lowercase(), value);
    }

    /// Looks a tag up regardless of the case it was stored under.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// `true` when no tags were found at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads a file's tags through the structured tag library.
///
/// Audio properties are skipped; only the tag chunks are parsed. Returns an
/// empty set for a file that parses but carries no tags.
pub fn read_tags(path: &Path) -> Result<TagSet> {
    let tagged = Probe::open(path)?
        .options(ParseOptions::new().read_properties(false))
        .read()?;

    let mut set = TagSet::default();
    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return Ok(set);
    };

    if let Some(title) = tag.title() {
        set.insert("title", title.into_owned());
    }
    if let Some(album) = tag.album() {
        set.insert("album", album.into_owned());
    }
    if let Some(comment) = tag.comment() {
        set.insert("comment", comment.into_owned());
    }

    // non-standard keys (yt-dlp's "purl" among them) come through verbatim
    for item in tag.items() {
        if let ItemKey::Unknown(key) = item.key() {
            if let Some(text) = item.value().text() {
                set.insert(key, text.to_string());
            }
        }
    }

    Ok(set)
}

/// `ffprobe -print_format json` output, reduced to the parts we read.
#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: HashMap<String, String>,
}

fn tag_set_from_probe_json(raw: &[u8]) -> Result<TagSet> {
    let probed: ProbeOutput = serde_json::from_slice(raw)?;

    let mut set = TagSet::default();
    for (key, value) in probed.format.tags {
        set.insert(&key, value);
    }
    Ok(set)
}

/// Reads a file's container-level tags through `ffprobe`.
///
/// Fails with `Unavailable` when `ffprobe` is not installed, `Aborted` when
/// it rejects the file.
pub async fn probe_tags(path: &Path) -> Result<TagSet> {
    let args = [
        OsStr::new("-v"),
        OsStr::new("quiet"),
        OsStr::new("-print_format"),
        OsStr::new("json"),
        OsStr::new("-show_format"),
        path.as_os_str(),
    ];

    match tools::run("ffprobe", args).await? {
        ToolRun::Unavailable => Err(Error::unavailable("ffprobe is not installed")),
        ToolRun::Finished(output) => {
            if !output.status.success() {
                return Err(Error::aborted(format!(
                    "ffprobe exited with {} for '{}'",
                    output.status,
                    path.display()
                )));
            }
            tag_set_from_probe_json(&output.stdout)
        }
    }
}

/// Copies an empty album field from the title, when there is a title.
///
/// Tries the structured tag library first (in-place rewrite); a file it
/// cannot handle falls back to `ffprobe` + `ffmpeg`. Every failure mode is
/// a warning, never an error: a repaired album tag is nice to have, the
/// download stays valid without it.
pub async fn repair_album(path: &Path, log: &mut ProgressLog) {
    match repair_in_place(path, log).await {
        Ok(()) => {}
        Err(e) => {
            log.debug(&format!(
                "Structured tag rewrite not possible ({e}), trying ffmpeg..."
            ))
            .await;
            repair_by_remux(path, log).await;
        }
    }
}

/// In-place repair through the tag library.
async fn repair_in_place(path: &Path, log: &mut ProgressLog) -> Result<()> {
    log.debug("Checking album metadata...").await;

    let mut tagged = Probe::open(path)?
        .options(ParseOptions::new().read_properties(false))
        .read()?;

    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        log.debug("No tags found in audio file").await;
        return Ok(());
    };

    let album = tag.album().map(|v| v.trim().to_string()).unwrap_or_default();
    let title = tag.title().map(|v| v.trim().to_string()).unwrap_or_default();
    let tag_type = tag.tag_type();

    if !album.is_empty() {
        log.debug(&format!("Album already populated: {album}")).await;
        return Ok(());
    }
    if title.is_empty() {
        log.debug("Title is also empty, cannot populate album").await;
        return Ok(());
    }

    if let Some(tag) = tagged.tag_mut(tag_type) {
        tag.set_album(title.clone());
    }
    tagged.save_to_path(path)?;

    log.info(&format!("Populated empty album with title: {title}"))
        .await;
    Ok(())
}

/// Fallback repair: probe with `ffprobe`, rewrite with `ffmpeg` into a
/// sibling temp file that is promoted over the original on success.
async fn repair_by_remux(path: &Path, log: &mut ProgressLog) {
    if !tools::is_available("ffmpeg") {
        log.warn_toast("Cannot populate album: no usable tag backend for this file")
            .await;
        return;
    }

    let tags = match probe_tags(path).await {
        Ok(tags) => tags,
        Err(e) => {
            log.warn(&format!("ffprobe failed to read tags: {e}")).await;
            return;
        }
    };

    let album = tags.get("album").map(str::trim).unwrap_or_default();
    let title = tags
        .get("title")
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    if !album.is_empty() {
        log.debug(&format!("Album already populated: {album}")).await;
        return;
    }
    if title.is_empty() {
        log.debug("Title is also empty, cannot populate album").await;
        return;
    }

    let staging = sibling_tmp_path(path);
    let metadata = format!("album={title}");
    let args = [
        OsStr::new("-i"),
        path.as_os_str(),
        OsStr::new("-c"),
        OsStr::new("copy"),
        OsStr::new("-metadata"),
        OsStr::new(&metadata),
        staging.as_os_str(),
        OsStr::new("-y"),
        OsStr::new("-v"),
        OsStr::new("quiet"),
    ];

    match tools::run("ffmpeg", args).await {
        Ok(ToolRun::Finished(output)) if output.status.success() => {
            if let Err(e) = fs::rename(&staging, path) {
                log.warn(&format!("Could not replace '{}': {e}", path.display()))
                    .await;
                discard_staging(&staging);
                return;
            }
            log.info(&format!("Populated empty album with title: {title}"))
                .await;
        }
        Ok(ToolRun::Finished(output)) => {
            log.warn(&format!(
                "ffmpeg failed to update metadata: {}",
                String::from_utf8_lossy(&output.stderr)
            ))
            .await;
            discard_staging(&staging);
        }
        Ok(ToolRun::Unavailable) => {
            log.warn_toast("Cannot populate album: no usable tag backend for this file")
                .await;
        }
        Err(e) => {
            log.warn(&format!("ffmpeg invocation failed: {e}")).await;
            discard_staging(&staging);
        }
    }
}

/// Sibling path the remux writes into before the atomic promote.
fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".tmp");
    PathBuf::from(raw)
}

fn discard_staging(staging: &Path) {
    if staging.exists() {
        if let Err(e) = fs::remove_file(staging) {
            warn!("could not remove staging file '{}': {e}", staging.display());
        }
    }
}
