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
use std::{io, path::{Path, PathBuf}};

use tokio::fs::OpenOptions;

/// Characters that are not allowed in file names on at least one common platform
pub const ILLEGAL_FILENAME_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Removes characters that can't appear in a file name, keeping everything else in order.
pub fn sanitize_title(title: &str) -> String {
    title.trim()
        .chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c))
        .collect()
}

/// File name of the finished download. Falls back to the job id if nothing usable is left of the title.
pub fn output_file_name(title: &str, job_id: &str, extension: &str) -> String {
    let stem = sanitize_title(title);
    let stem = stem.trim();
    if stem.chars().all(|c| c == '.') {
        format!("{job_id}.{extension}")
    } else {
        format!("{stem}.{extension}")
    }
}

/// Reserves `dir/name`, or `dir/stem (n).ext` with the lowest free `n`, by creating an empty file there.
///
/// The caller is expected to replace the placeholder, e.g. by renaming the real file onto it.
pub async fn claim_unique_path(dir: &Path, name: &str) -> io::Result<PathBuf> {
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let mut n = 0u32;
    loop {
        let candidate = match (n, extension) {
            (0, _) => dir.join(name),
            (n, Some(ext)) => dir.join(format!("{stem} ({n}).{ext}")),
            (n, None) => dir.join(format!("{stem} ({n})")),
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate).await {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}
