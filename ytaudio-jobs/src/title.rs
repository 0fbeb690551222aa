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
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::{tool::stderr_summary, ToolConfig};

/// yt-dlp invocations tried in order, each more lenient than the previous one
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ExtractStrategy {
    Full,
    Flat,
    FlatUnprocessed,
}

impl ExtractStrategy {
    pub const ALL: [ExtractStrategy; 3] = [ExtractStrategy::Full, ExtractStrategy::Flat, ExtractStrategy::FlatUnprocessed];

    fn args(self) -> &'static [&'static str] {
        match self {
            ExtractStrategy::Full            => &[],
            ExtractStrategy::Flat            => &["--flat-playlist"],
            ExtractStrategy::FlatUnprocessed => &["--flat-playlist", "--ignore-no-formats-error", "--no-check-formats"],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTitle {
    pub title: String,
    pub strategy: ExtractStrategy,
}

#[derive(Deserialize)]
struct VideoInfo {
    title: Option<String>,
}

/// Looks up video titles without downloading anything.
///
/// At most `parallelism` lookups run the tool at once, other callers wait their turn.
pub struct TitleResolver {
    tool: ToolConfig,
    socket_timeout: Duration,
    permits: Semaphore,
}

impl TitleResolver {
    pub fn new(tool: ToolConfig, socket_timeout: Duration, parallelism: usize) -> TitleResolver {
        TitleResolver {
            tool,
            socket_timeout,
            permits: Semaphore::new(parallelism.max(1)),
        }
    }

    /// Tries every [`ExtractStrategy`] in order, returning the first title found or the last error
    pub async fn resolve(&self, url: &str) -> anyhow::Result<ResolvedTitle> {
        let _permit = self.permits.acquire().await.context("The title resolver was shut down")?;
        let mut last_error = None;
        for strategy in ExtractStrategy::ALL {
            match self.attempt(url, strategy).await {
                Ok(title) => {
                    info!("Resolved the title of {url} using the {strategy} strategy");
                    return Ok(ResolvedTitle { title, strategy });
                },
                Err(e) => {
                    warn!("Failed to resolve the title of {url} using the {strategy} strategy: {e:?}");
                    last_error = Some(e);
                },
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("No title extraction strategy is available")))
    }

    async fn attempt(&self, url: &str, strategy: ExtractStrategy) -> anyhow::Result<String> {
        let timeout = self.socket_timeout.as_secs().max(1).to_string();
        let mut args = vec!["--skip-download", "--dump-single-json", "--no-playlist", "--socket-timeout", timeout.as_str()];
        args.extend_from_slice(strategy.args());
        args.push(url);
        debug!("Running `{}`", self.tool.describe(&args));

        let output = self.tool.run_captured(&args).await?;
        if !output.status.success() {
            bail!("yt-dlp exited with {}: {}", output.status, stderr_summary(&output.stderr));
        }
        let info: VideoInfo = serde_json::from_slice(&output.stdout).context("yt-dlp printed invalid JSON")?;
        info.title
            .map(|title| title.trim().to_owned())
            .filter(|title| !title.is_empty())
            .context("yt-dlp did not report a title")
    }
}
