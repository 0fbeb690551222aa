/* This file is part of the YT Audio project - https://github.com/mini-bomba/ytaudio
*
*  Copyright (C) 2025 mini_bomba
*  
*  This program is free software: you can redistribute it and/or modify
*  it under the terms of the GNU Affero General Public License as published by
*  the Free Software Foundation, either version 3 of the License, or
*  (at your option) any later version.
*
*  This program is distributed in the hope that it will be useful,
*  but WITHOUT ANY WARRANTY; without even the implied warranty of
*  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
*  GNU Affero General Public License for more details.
*
*  You should have received a copy of the GNU Affero General Public License
*  along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/
use std::sync::LazyLock;

use regex::Regex;

// [download]  42.3% of    3.47MiB at    1.21MiB/s ETA 00:02
// [download] 100% of    3.47MiB in 00:00:03 at 1.02MiB/s
static DOWNLOAD_PERCENT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[download\]\s+(\S+)%").expect("Should be able to parse the download progress regex"));

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Percentage reported by the tool for the current download, 0 to 100
    Downloading(f64),
    /// The download finished and the audio is being extracted/transcoded
    Converting,
}

/// Turns yt-dlp's `--newline` output into progress events, one line at a time.
///
/// Unrecognized or malformed lines are skipped. Download percentages are only
/// reported when they go up.
#[derive(Debug, Default)]
pub struct ProgressParser {
    last_percent: Option<f64>,
    converting: bool,
}

impl ProgressParser {
    pub fn new() -> ProgressParser {
        ProgressParser::default()
    }

    pub fn feed(&mut self, line: &str) -> Option<ProgressEvent> {
        let line = line.trim();
        if line.starts_with("[ExtractAudio]") {
            if self.converting {
                return None;
            }
            self.converting = true;
            return Some(ProgressEvent::Converting);
        }
        if self.converting {
            return None;
        }

        let percent: f64 = DOWNLOAD_PERCENT_REGEX.captures(line)?.get(1)?.as_str().parse().ok()?;
        if !percent.is_finite() {
            return None;
        }
        let percent = percent.clamp(0., 100.);
        if self.last_percent.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(ProgressEvent::Downloading(percent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_download_lines() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.feed("[download]   0.0% of    3.47MiB at  Unknown B/s ETA Unknown"), Some(ProgressEvent::Downloading(0.)));
        assert_eq!(parser.feed("[download]  42.3% of    3.47MiB at    1.21MiB/s ETA 00:02"), Some(ProgressEvent::Downloading(42.3)));
        assert_eq!(parser.feed("[download] 100% of    3.47MiB in 00:00:03 at 1.02MiB/s"), Some(ProgressEvent::Downloading(100.)));
        assert_eq!(parser.feed("[download]  99.9% of    3.47MiB at    1.21MiB/s ETA 00:00"), None);
    }

    #[test]
    fn ignores_unrelated_and_malformed_lines() {
        let mut parser = ProgressParser::new();
        for line in [
            "[youtube] Extracting URL: https://youtu.be/abc",
            "[info] abc: Downloading 1 format(s): 251",
            "[download] Destination: temp_downloads/abc.webm",
            "[download] NaN% of ~ 3.47MiB",
            "[download] abc%",
            "100% done",
            "",
        ] {
            assert_eq!(parser.feed(line), None, "{line:?}");
        }
        assert_eq!(parser.feed("[download]   0.0% of ~ 3.47MiB"), Some(ProgressEvent::Downloading(0.)));
    }

    #[test]
    fn never_goes_backwards() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed("[download]  50.0% of 1MiB").is_some());
        assert_eq!(parser.feed("[download]  10.0% of 1MiB"), None);
        assert_eq!(parser.feed("[download]  50.0% of 1MiB"), None);
        assert_eq!(parser.feed("[download]  60.5% of 1MiB"), Some(ProgressEvent::Downloading(60.5)));
    }

    #[test]
    fn extract_audio_switches_to_converting_once() {
        let mut parser = ProgressParser::new();
        parser.feed("[download] 100% of 1MiB");
        assert_eq!(parser.feed("[ExtractAudio] Destination: temp_downloads/abc.mp3"), Some(ProgressEvent::Converting));
        assert_eq!(parser.feed("[ExtractAudio] Destination: temp_downloads/abc.mp3"), None);
        assert_eq!(parser.feed("[download] 100% of 1MiB"), None);
    }
}
