//! Source URL and timestamp resolution for audio file inputs.
//!
//! Files downloaded by this tool carry their origin in the tag data:
//! yt-dlp embeds the watch page as a `purl` tag, and plenty of uploaders
//! paste a link into the free-text comment. Resolution runs one cascade
//! over whichever tag backend managed to read the file:
//!
//! 1. a dedicated `purl` tag, taken verbatim;
//! 2. a `comment` tag that is itself a URL;
//! 3. the first URL-looking substring inside the comment text.
//!
//! Independently of the URL, an 8-digit date prefix on the file name is
//! picked up as the timestamp to reuse for the fresh download.

use std::path::Path;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::error::{Error, ErrorKind, Result};
use crate::notify::ProgressLog;
use crate::tags::{self, TagSet};

/// Scheme prefix that qualifies an input string as a URL.
static URL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?|ftp)://").expect("static pattern"));

/// Loose pattern for a URL embedded in free text.
static EMBEDDED_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("static pattern"));

/// Eight leading digits of a file name, i.e. a `YYYYMMDD` stamp.
static DATE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}").expect("static pattern"));

/// Resolved origin of one input: where to download from and, when the file
/// name carried one, the date stamp to keep.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SourceDescriptor {
    /// Download URL extracted from the file's metadata.
    pub url: String,
    /// `YYYYMMDD` stamp parsed off the file name, if any.
    pub timestamp: Option<String>,
}

/// `true` when the input string is a URL rather than a file path.
#[must_use]
pub fn is_url(input: &str) -> bool {
    URL_PREFIX.is_match(input)
}

/// Runs the purl -> comment-literal -> comment-embedded cascade.
fn url_from_tag_set(tags: &TagSet) -> Option<String> {
    if let Some(purl) = tags.get("purl") {
        let purl = purl.trim();
        if !purl.is_empty() {
            return Some(purl.to_string());
        }
    }

    let comment = tags.get("comment")?;
    if is_url(comment) {
        return Some(comment.to_string());
    }
    EMBEDDED_URL
        .find(comment)
        .map(|found| found.as_str().to_string())
}

/// Extracts the date stamp prefix from a file's base name.
#[must_use]
pub fn timestamp_from_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    DATE_PREFIX
        .find(name)
        .map(|found| found.as_str().to_string())
}

/// Resolves one audio file into a [`SourceDescriptor`].
///
/// The structured tag backend is tried first; a file it cannot read is
/// probed through `ffprobe` instead. Backend failures are logged and
/// swallowed; when no backend produces a URL the whole resolution fails
/// with `NotFound`, which callers treat as "skip this input".
pub async fn resolve(path: &Path, log: &mut ProgressLog) -> Result<SourceDescriptor> {
    let tag_set = match tags::read_tags(path) {
        Ok(tags) => Some(tags),
        Err(read_error) => {
            log.debug(&format!(
                "Structured tag read failed ({read_error}), probing with ffprobe..."
            ))
            .await;

            match tags::probe_tags(path).await {
                Ok(tags) => Some(tags),
                Err(probe_error) if probe_error.kind == ErrorKind::Unavailable => {
                    log.warn("No tag backend available to extract metadata.").await;
                    None
                }
                Err(probe_error) => {
                    log.warn(&format!("ffprobe failed to extract metadata: {probe_error}"))
                        .await;
                    None
                }
            }
        }
    };

    let url = tag_set
        .as_ref()
        .and_then(url_from_tag_set)
        .ok_or_else(|| {
            Error::not_found(format!("no source URL in metadata of '{}'", path.display()))
        })?;

    Ok(SourceDescriptor {
        url,
        timestamp: timestamp_from_name(path),
    })
}
