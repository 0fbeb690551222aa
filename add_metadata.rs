/* This file is part of the YT Audio project - https://github.com/mini-bomba/ytaudio
*
*  Copyright (C) 2025 mini_bomba
*
*  Some code was copied and adapted from the built library: https://github.com/lukaslueg/built,
*  which is licensed under the MIT license.
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

use std::{env, fs::File, io::{BufWriter, Write}, path::Path};

use anyhow::Context;
use chrono::{FixedOffset, TimeZone};
use git2::Repository;

fn main() -> anyhow::Result<()> {
    let out_dir = env::var("OUT_DIR").context("OUT_DIR not set")?;
    let built_file = Path::new(&out_dir).join("built.rs");
    let manifest_location = env::var("CARGO_MANIFEST_DIR").context("CARGO_MANIFEST_DIR not set")?;
    let manifest_location = Path::new(&manifest_location);

    built::write_built_file_with_opts(Some(manifest_location), &built_file)
        .context("Failed to compile build-time info")?;

    let mut file = BufWriter::new(
        File::options().append(true).open(&built_file).context("Failed to open the build-time info file")?
    );
    let commit_timestamp = commit_timestamp(manifest_location)?;
    let commit_timestamp = match commit_timestamp {
        Some(ts) => format!("Some(\"{}\")", ts.escape_default()),
        None => "None".to_owned(),
    };
    writeln!(file, "\
        #[allow(clippy::needless_raw_string_hashes)]\n\
        #[doc=r#\"The commit time in RFC3339/ISO8601.\"#]\n\
        #[allow(dead_code)]\n\
        pub const GIT_COMMIT_TIMESTAMP: Option<&str> = {commit_timestamp};"
    ).context("Failed to write the commit timestamp")?;
    file.flush().context("Failed to flush the build-time info file")?;
    Ok(())
}

/// HEAD's commit time, or `None` outside of a git checkout
fn commit_timestamp(manifest_loc: &Path) -> anyhow::Result<Option<String>> {
    let repo = match Repository::discover(manifest_loc) {
        Ok(repo) => repo,
        Err(e) if e.class() == git2::ErrorClass::Repository && e.code() == git2::ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e).context("Failed to read git repo"),
    };
    let head = repo
        .head().context("Failed to read repo head")?
        .peel_to_commit().context("Failed to peel reference to commit")?;
    let commit_time = head.time();
    let tz = FixedOffset::east_opt(commit_time.offset_minutes() * 60).context("Commit timestamp had an invalid timezone offset")?;
    let commit_datetime = tz.timestamp_opt(commit_time.seconds(), 0).single().context("Commit timestamp is out of range")?;
    Ok(Some(commit_datetime.to_rfc3339()))
}
