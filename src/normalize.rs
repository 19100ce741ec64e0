//! Filename convention enforcement.
//!
//! `yt-dlp` sanitizes whitespace to underscores and joins the template
//! fields with literal `--`. The local convention wants the opposite:
//! dashes between words, underscores between fields, everything lowercase.
//! A naive sequential swap of `_` -> `-` and `--` -> `_` corrupts names
//! where underscores sit next to dashes, so the transform stages through
//! three placeholder tokens that cannot otherwise occur in the input and
//! resolves them afterwards.
//!
//! The transform is total and deterministic but intentionally lossy: an
//! original underscore and an original space both end up as a dash, and
//! that collapse is part of the convention.

/// Rewrites one file name into the local naming convention.
///
/// Replacement order is load-bearing; reordering the stages changes the
/// result for inputs with adjacent `_` and `-` characters.
#[must_use]
pub fn normalize_filename(name: &str) -> String {
    name
        // escape literals to placeholder tokens
        .replace('%', "%prcnt")
        .replace('_', "%whspc")
        .replace("--", "%ddash")
        // resolve the placeholders to the convention's characters
        .replace("%whspc", "-")
        .replace("%ddash", "_")
        .replace("%prcnt", "%")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swaps_separators_and_lowercases() {
        assert_eq!(
            normalize_filename("20240101--Artist_Name--Album--My_Song.opus"),
            "20240101_artist-name_album_my-song.opus"
        );
    }

    #[test]
    fn test_preserves_percent_literals() {
        assert_eq!(
            normalize_filename("track%20name_final.opus"),
            "track%20name-final.opus"
        );
    }

    #[test]
    fn test_underscore_adjacent_to_dash() {
        // "_-" must become "--", not get swallowed by the double-dash rule
        assert_eq!(normalize_filename("a_-b"), "a--b");
        // "-_" likewise
        assert_eq!(normalize_filename("a-_b"), "a--b");
    }

    #[test]
    fn test_triple_dash() {
        // "---" pairs greedily from the left: "--" then a bare "-"
        assert_eq!(normalize_filename("a---b"), "a_-b");
    }

    #[test]
    fn test_already_normalized_name_is_untouched() {
        assert_eq!(
            normalize_filename("20240101-artist-name.opus"),
            "20240101-artist-name.opus"
        );
    }

    #[test]
    fn test_lossy_collapse_is_expected() {
        // an original space (already turned into "_" upstream) and an
        // original dash normalize to the same character
        assert_eq!(normalize_filename("my_song"), "my-song");
        assert_eq!(normalize_filename("my-song"), "my-song");
    }

    #[test]
    fn test_placeholder_lookalikes_survive() {
        // input that already contains a placeholder-looking sequence is not
        // confused with the escape tokens
        assert_eq!(normalize_filename("x%whspcy"), "x%whspcy");
        assert_eq!(normalize_filename("x%ddashy"), "x%ddashy");
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(normalize_filename(""), "");
    }
}
