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
use std::{ffi::OsStr, path::{Component, PathBuf}, process::{Output, Stdio}};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// How to invoke yt-dlp.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ToolConfig {
    /// Relative paths containing a separator are resolved against the working directory,
    /// bare names are looked up in `PATH`
    pub path: PathBuf,
    /// Inserted before the arguments of every invocation
    pub extra_args: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./yt-dlp"),
            extra_args: Vec::new(),
        }
    }
}

impl ToolConfig {
    fn is_bare_name(&self) -> bool {
        let mut components = self.path.components();
        matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
    }

    /// Returns the program to execute, failing if a path-like value points at nothing
    pub fn resolve(&self) -> anyhow::Result<PathBuf> {
        if self.is_bare_name() {
            return Ok(self.path.clone());
        }
        let path = if self.path.is_relative() {
            std::env::current_dir().context("Failed to get the working directory")?.join(&self.path)
        } else {
            self.path.clone()
        };
        if !path.exists() {
            bail!("yt-dlp not found at {}", path.display());
        }
        Ok(path)
    }

    pub fn command(&self) -> anyhow::Result<Command> {
        let mut cmd = Command::new(self.resolve()?);
        cmd.args(&self.extra_args)
           .stdin(Stdio::null())
           .kill_on_drop(true);
        Ok(cmd)
    }

    /// Human readable command line, for logs
    pub fn describe<S: AsRef<OsStr>>(&self, args: &[S]) -> String {
        let mut line = self.path.display().to_string();
        for arg in self.extra_args.iter().map(OsStr::new).chain(args.iter().map(OsStr::new)) {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Runs the tool to completion with stdout and stderr captured
    pub async fn run_captured<S: AsRef<OsStr>>(&self, args: &[S]) -> anyhow::Result<Output> {
        self.command()?
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run `{}`", self.describe(args)))
    }
}

/// Last non-empty line of the tool's stderr, or all of it if it is short
pub(crate) fn stderr_summary(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.lines().count() <= 3 {
        return text.to_owned();
    }
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_owned()
}
