//! Guessing `<show>/Season NN` folders from descriptor file names.
//!
//! This is a best-effort heuristic, not a title parser. The steps run in a
//! fixed order: the extension goes first, then bracketed text, and only then
//! is the `Sxx` marker searched, so a season number inside brackets is never
//! picked up. Titles are assumed to be Latin script; anything non-ASCII is
//! dropped.
use std::path::Path;

use regex::Regex;

lazy_static::lazy_static! {
    static ref BRACKETS: [Regex; 4] = [
        Regex::new(r"\[.*?\]").unwrap(),
        Regex::new(r"【.*?】").unwrap(),
        Regex::new(r"\(.*?\)").unwrap(),
        Regex::new(r"（.*?）").unwrap(),
    ];
    static ref SEASON: Regex = Regex::new(r"(?i)^(.*?)[._\s]+S(\d+)").unwrap();
    static ref NON_ASCII: Regex = Regex::new(r"[^\x00-\x7F]+").unwrap();
    static ref SPACES: Regex = Regex::new(r"\s+").unwrap();
    static ref DIGIT: Regex = Regex::new(r"^\d$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    pub title: String,
    /// Folder name, e.g. `Season 01`
    pub season: String,
}

pub fn strip_extension(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

pub fn strip_brackets(name: &str) -> String {
    BRACKETS.iter().fold(name.to_string(), |acc, re| {
        re.replace_all(&acc, "").into_owned()
    })
}

/// Returns the raw title and the season digits.
pub fn match_season(name: &str) -> Option<(&str, &str)> {
    let m = SEASON.captures(name)?;
    Some((m.get(1)?.as_str(), m.get(2)?.as_str()))
}

pub fn strip_non_ascii(title: &str) -> String {
    NON_ASCII.replace_all(title, "").into_owned()
}

pub fn normalize_title(title: &str) -> String {
    let title = title.replace(['.', '_'], " ");
    SPACES.replace_all(title.trim(), " ").trim().to_string()
}

fn is_decimal(c: char) -> bool {
    DIGIT.is_match(c.encode_utf8(&mut [0; 4]))
}

/// Value of any Unicode decimal digit. Unicode lays every decimal digit set
/// out as contiguous runs of ten starting at zero, so the value is the
/// distance to the start of the run, modulo ten.
fn digit_value(c: char) -> Option<u64> {
    if let Some(d) = c.to_digit(10) {
        return Some(d.into());
    }
    if !is_decimal(c) {
        return None;
    }
    let mut offset = 0;
    let mut code = c as u32;
    while let Some(prev) = code.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal(prev) {
            break;
        }
        offset += 1;
        code -= 1;
    }
    Some(offset % 10)
}

fn parse_digits(digits: &str) -> Option<u64> {
    if digits.is_empty() {
        return None;
    }
    digits.chars().try_fold(0u64, |acc, c| {
        acc.checked_mul(10)?.checked_add(digit_value(c)?)
    })
}

/// `Season NN`; the raw digits are kept only when they overflow.
pub fn season_folder(digits: &str) -> String {
    match parse_digits(digits) {
        Some(n) => format!("Season {n:02}"),
        None => format!("Season {digits}"),
    }
}

/// Runs the whole pipeline. `None` means the name does not look episodic.
pub fn extract_series(filename: &str) -> Option<Series> {
    let name = strip_brackets(strip_extension(filename));
    let (raw_title, digits) = match_season(&name)?;
    let title = normalize_title(&strip_non_ascii(raw_title));
    if title.is_empty() {
        return None;
    }
    Some(Series {
        title,
        season: season_folder(digits),
    })
}

/// The remote folder a file should be downloaded into.
pub fn save_path(filename: &str, cloud_base: &str) -> String {
    match extract_series(filename) {
        Some(series) => format!(
            "{}/{}/{}",
            cloud_base.trim_end_matches('/'),
            series.title,
            series.season
        ),
        None => cloud_base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "/pikpak/Media/TV";

    #[test]
    fn dotted_release_name() {
        assert_eq!(
            extract_series("Show.Name.S01.1080p.mkv"),
            Some(Series {
                title: "Show Name".to_string(),
                season: "Season 01".to_string(),
            })
        );
        assert_eq!(
            save_path("Show.Name.S01.1080p.mkv", BASE),
            "/pikpak/Media/TV/Show Name/Season 01"
        );
    }

    #[test]
    fn brackets_go_before_season_match() {
        assert_eq!(strip_brackets("Show [2023] S2"), "Show  S2");
        assert_eq!(save_path("Show [2023] S2.mkv", BASE), "/pikpak/Media/TV/Show/Season 02");
        // the season inside brackets is gone before matching
        assert_eq!(save_path("Movie [S01].torrent", BASE), BASE);
    }

    #[test]
    fn all_bracket_styles() {
        assert_eq!(
            strip_brackets("[a]b【c】d(e)f（g）h"),
            "bdfh"
        );
    }

    #[test]
    fn not_episodic() {
        assert_eq!(save_path("RandomMovie.2023.mkv", BASE), BASE);
        assert_eq!(extract_series("RandomMovie.2023.mkv"), None);
    }

    #[test]
    fn non_ascii_title() {
        assert_eq!(save_path("[中文]Show.S01.mkv", BASE), "/pikpak/Media/TV/Show/Season 01");
        assert_eq!(save_path("中文Show.S01.mkv", BASE), "/pikpak/Media/TV/Show/Season 01");
        // nothing left once the CJK title is dropped
        assert_eq!(save_path("中文.S01.mkv", BASE), BASE);
    }

    #[test]
    fn underscores_and_case() {
        assert_eq!(
            save_path("the_great__show_s3e04.torrent", "/cloud/"),
            "/cloud/the great show/Season 03"
        );
        assert_eq!(
            save_path("Show.S12.magnet", "/cloud"),
            "/cloud/Show/Season 12"
        );
    }

    #[test]
    fn full_width_season_digits() {
        assert_eq!(save_path("Show.S０２.torrent", "/tv"), "/tv/Show/Season 02");
        assert_eq!(save_path("Show.S１２.magnet", "/tv"), "/tv/Show/Season 12");
    }

    #[test]
    fn season_folder_formatting() {
        assert_eq!(season_folder("1"), "Season 01");
        assert_eq!(season_folder("007"), "Season 07");
        assert_eq!(season_folder("123"), "Season 123");
        assert_eq!(season_folder("１"), "Season 01");
        assert_eq!(season_folder("٣"), "Season 03");
        assert_eq!(season_folder("𝟗"), "Season 09");
        assert_eq!(season_folder("99999999999999999999"), "Season 99999999999999999999");
    }

    #[test]
    fn extension_only_stripped_once() {
        assert_eq!(strip_extension("a.b.c.torrent"), "a.b.c");
        assert_eq!(strip_extension("noext"), "noext");
    }
}
