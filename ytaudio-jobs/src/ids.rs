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
use std::sync::{atomic::{AtomicU64, Ordering::Relaxed}, LazyLock};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use log::warn;
use regex::Regex;

static V_PARAM_REGEX: LazyLock<Regex>    = LazyLock::new(|| Regex::new(r"(?:^|[?&#/])v=([^&#]+)").expect("Should be able to parse the v= parameter regex"));
static SHORT_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.-]*://)?(?:[^/?#]*\.)?(?i:youtu\.be/|youtube(?:-nocookie)?\.com/(?:shorts|embed|live|v)/)([^/?#]+)").expect("Should be able to parse the short link regex"));
// the id ends up as a file name prefix and a path segment
static ID_REGEX: LazyLock<Regex>         = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("Should be able to parse the job id regex"));

/// Derives the job identifier for a submitted URL.
///
/// Tries the `v=` query parameter first, then the short link forms (`youtu.be/<id>`,
/// `/shorts/<id>`, `/embed/<id>`, ...). Anything else gets a fresh [`random_token`],
/// so the result is never empty.
pub fn extract_job_id(url: &str) -> String {
    let url = url.trim();
    [&*V_PARAM_REGEX, &*SHORT_LINK_REGEX].into_iter()
        .filter_map(|regex| regex.captures(url)?.get(1))
        .map(|id| id.as_str())
        .find(|id| is_valid_job_id(id))
        .map_or_else(random_token, str::to_owned)
}

/// Whether `id` can be used as a job identifier
pub fn is_valid_job_id(id: &str) -> bool {
    ID_REGEX.is_match(id)
}

/// 22 characters of URL-safe base64
pub fn random_token() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let mut buffer = [0u8; 16];
    if let Err(e) = getrandom::fill(&mut buffer) {
        // should never happen, but the extractor must not fail
        warn!("Failed to get random bytes, falling back to a timestamp based token: {e}");
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes();
        let count = COUNTER.fetch_add(1, Relaxed).to_le_bytes();
        buffer[..8].copy_from_slice(&nanos);
        buffer[8..].copy_from_slice(&count);
    }
    URL_SAFE_NO_PAD.encode(buffer)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn watch_urls_use_the_v_parameter() {
        assert_eq!(extract_job_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(extract_job_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s&list=PL0"), "dQw4w9WgXcQ");
        assert_eq!(extract_job_id("https://m.youtube.com/watch?feature=share&v=abc-DEF_123"), "abc-DEF_123");
        assert_eq!(extract_job_id("  youtube.com/watch?v=xyz#t=10  "), "xyz");
    }

    #[test]
    fn short_links_use_the_last_segment() {
        assert_eq!(extract_job_id("https://youtu.be/abc123XYZ_0"), "abc123XYZ_0");
        assert_eq!(extract_job_id("https://youtu.be/abc123XYZ_0?si=tracking"), "abc123XYZ_0");
        assert_eq!(extract_job_id("youtu.be/XYZ"), "XYZ");
        assert_eq!(extract_job_id("https://www.youtube.com/shorts/Sh0rtId"), "Sh0rtId");
        assert_eq!(extract_job_id("https://www.youtube-nocookie.com/embed/EmB3d"), "EmB3d");
    }

    #[test]
    fn unparseable_urls_get_distinct_tokens() {
        let urls = ["not a url", "https://example.com/some/video", "", "https://youtu.be/", "https://youtu.be/../../etc"];
        let mut seen = HashSet::new();
        for url in urls {
            let id = extract_job_id(url);
            assert_eq!(id.len(), 22, "{url:?} produced {id:?}");
            assert!(is_valid_job_id(&id));
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn ids_with_unsafe_characters_are_rejected() {
        let id = extract_job_id("https://www.youtube.com/watch?v=..%2F..%2Fpasswd");
        assert_ne!(id, "..%2F..%2Fpasswd");
        assert_eq!(id.len(), 22);
    }

    #[test]
    fn random_tokens_do_not_repeat() {
        let tokens: HashSet<String> = (0..1000).map(|_| random_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
