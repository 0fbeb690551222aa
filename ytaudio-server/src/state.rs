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
use std::{path::PathBuf, sync::Arc, time::Duration};

use actix_web::web;
use anyhow::bail;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Serialize, Deserialize};
use ytaudio_jobs::{AudioConfig, Downloader, Job, JobQueue, StatusStore, TitleResolver, ToolConfig};

pub type StoreData = web::Data<StatusStore>;
pub type QueueData = web::Data<JobQueue>;
pub type ResolverData = web::Data<TitleResolver>;

#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub static_content_path: PathBuf,
    /// actix worker threads, defaults to the number of CPU cores
    pub http_workers: Option<usize>,
    pub listen: ListenConfig,
    pub ytdlp: ToolConfig,
    pub audio: AudioConfig,
    pub jobs: JobsConfig,
    pub title: TitleConfig,
    #[serde(skip)]
    pub startup_timestamp: DateTime<Utc>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./temp_downloads"),
            static_content_path: PathBuf::from("./static"),
            http_workers: None,
            listen: ListenConfig::default(),
            ytdlp: ToolConfig::default(),
            audio: AudioConfig::default(),
            jobs: JobsConfig::default(),
            title: TitleConfig::default(),
            startup_timestamp: Utc::now(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen.tcp.is_none() && self.listen.unix.is_none() {
            bail!("Invalid configuration - no tcp port or unix socket path specified");
        }
        if self.http_workers == Some(0) {
            bail!("Invalid configuration - http_workers must be at least 1");
        }
        if self.jobs.workers == 0 {
            bail!("Invalid configuration - jobs.workers must be at least 1");
        }
        if self.jobs.queue_capacity == 0 {
            bail!("Invalid configuration - jobs.queue_capacity must be at least 1");
        }
        if self.title.parallelism == 0 {
            bail!("Invalid configuration - title.parallelism must be at least 1");
        }
        Ok(())
    }

    pub fn status_store(&self) -> StatusStore {
        StatusStore::new(Duration::from_secs(self.jobs.retention_secs), self.jobs.max_finished)
    }

    /// Starts the download workers on the current runtime
    pub fn start_job_queue(&self, store: Arc<StatusStore>) -> JobQueue {
        let downloader = Arc::new(Downloader::new(self.ytdlp.clone(), self.output_dir.clone(), self.audio.clone()));
        JobQueue::start(self.jobs.workers, self.jobs.queue_capacity, move |job: Job| {
            let downloader = downloader.clone();
            let store = store.clone();
            async move {
                downloader.process(&store, job).await;
            }.boxed()
        })
    }

    pub fn title_resolver(&self) -> TitleResolver {
        TitleResolver::new(self.ytdlp.clone(), Duration::from_secs(self.title.socket_timeout_secs), self.title.parallelism)
    }
}

#[derive(Serialize, Deserialize)]
pub struct ListenConfig {
    pub tcp: Option<(String, u16)>,
    pub unix: Option<String>,
    pub unix_mode: Option<u32>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            tcp: Some(("127.0.0.1".to_owned(), 5000)),
            unix: None,
            unix_mode: None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub workers: usize,
    /// Jobs waiting for a worker, submissions beyond this are refused
    pub queue_capacity: usize,
    /// How long finished jobs can still be polled
    pub retention_secs: u64,
    pub max_finished: usize,
    pub sweep_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 32,
            retention_secs: 3600,
            max_finished: 1024,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    pub socket_timeout_secs: u64,
    /// Title lookups allowed to run at once
    pub parallelism: usize,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            socket_timeout_secs: 15,
            parallelism: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_the_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.listen.tcp, Some(("127.0.0.1".to_owned(), 5000)));
        assert_eq!(config.output_dir, PathBuf::from("./temp_downloads"));
        assert_eq!(config.ytdlp.path, PathBuf::from("./yt-dlp"));
        assert_eq!(config.audio.format, "mp3");
        assert_eq!(config.jobs.workers, 4);
        assert_eq!(config.title.parallelism, 1);
    }

    #[test]
    fn default_config_can_be_written_and_read_back() {
        let serialized = toml::to_string(&AppConfig::default()).unwrap();
        let config: AppConfig = toml::from_str(&serialized).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: AppConfig = toml::from_str("[jobs]\nworkers = 2\n\n[ytdlp]\npath = \"yt-dlp\"\nextra_args = [\"--proxy\", \"socks5://127.0.0.1:1080\"]\n").unwrap();
        assert_eq!(config.jobs.workers, 2);
        assert_eq!(config.jobs.queue_capacity, 32);
        assert_eq!(config.ytdlp.extra_args, ["--proxy", "socks5://127.0.0.1:1080"]);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut config = AppConfig::default();
        config.listen.tcp = None;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.jobs.workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.jobs.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.title.parallelism = 0;
        assert!(config.validate().is_err());
    }
}
