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
use std::{ffi::OsStr, path::PathBuf, process::Stdio};

use anyhow::{bail, Context};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::{progress::{ProgressEvent, ProgressParser}, sanitize::{claim_unique_path, output_file_name, sanitize_title}, tool::stderr_summary, Job, JobState, JobUpdate, StatusStore, ToolConfig};

const INFO_PERCENT: f64 = 5.;
const PROCESSING_PERCENT: f64 = 10.;
const DOWNLOAD_START_PERCENT: f64 = 20.;
const DOWNLOAD_SPAN_PERCENT: f64 = 70.;
const CONVERTING_PERCENT: f64 = 95.;

const PARTIAL_SUFFIXES: [&str; 3] = [".part", ".ytdl", ".temp"];

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AudioConfig {
    /// Passed to `--audio-format`, also the extension of the finished file
    pub format: String,
    /// Passed to `--audio-quality`, `0` is the best
    pub quality: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            format: "mp3".to_owned(),
            quality: "0".to_owned(),
        }
    }
}

/// Runs a single job through yt-dlp, reporting every step to the [`StatusStore`].
pub struct Downloader {
    tool: ToolConfig,
    output_dir: PathBuf,
    audio: AudioConfig,
}

impl Downloader {
    pub fn new(tool: ToolConfig, output_dir: PathBuf, audio: AudioConfig) -> Downloader {
        Downloader { tool, output_dir, audio }
    }

    /// Entry point for the worker pool. Failures are already recorded in the store.
    pub async fn process(&self, store: &StatusStore, job: Job) {
        if let Ok(filename) = self.download(store, &job).await {
            debug!("Job {} produced {filename}", job.id);
        }
    }

    /// Downloads the job's audio and returns the name of the finished file in the output directory.
    ///
    /// On failure the job is moved to the error state with the error's message.
    pub async fn download(&self, store: &StatusStore, job: &Job) -> anyhow::Result<String> {
        info!("Starting job {} for {}", job.id, job.url);
        match self.run(store, job).await {
            Ok(filename) => {
                info!("Job {} completed: {filename}", job.id);
                Ok(filename)
            },
            Err(e) => {
                error!("Job {} failed: {e:?}", job.id);
                if let Err(store_err) = store.upsert(&job.id, JobUpdate::failed(e.to_string())) {
                    error!("Failed to record the failure of job {}: {store_err:?}", job.id);
                }
                Err(e)
            },
        }
    }

    async fn run(&self, store: &StatusStore, job: &Job) -> anyhow::Result<String> {
        self.tool.resolve()?;

        store.upsert(&job.id, JobUpdate::new(JobState::GettingInfo).percentage(INFO_PERCENT))?;
        let title = self.fetch_title(job).await?;
        store.upsert(&job.id, JobUpdate::new(JobState::Processing).percentage(PROCESSING_PERCENT).title(&*title))?;

        store.upsert(&job.id, JobUpdate::new(JobState::Downloading).percentage(DOWNLOAD_START_PERCENT))?;
        self.fetch_audio(store, job).await?;

        let source = self.find_output(&job.id).await?;
        let extension = source.extension().and_then(|e| e.to_str()).unwrap_or(self.audio.format.as_str());
        let name = output_file_name(&title, &job.id, extension);
        let mut target = self.output_dir.join(&name);
        if target != source {
            target = claim_unique_path(&self.output_dir, &name).await
                .with_context(|| format!("Failed to reserve a file name for {name}"))?;
            if let Err(e) = tokio::fs::rename(&source, &target).await {
                if let Err(cleanup) = tokio::fs::remove_file(&target).await {
                    warn!("Failed to remove the unused placeholder {}: {cleanup}", target.display());
                }
                return Err(e).with_context(|| format!("Failed to rename {} to {}", source.display(), target.display()));
            }
        }
        let filename = target.file_name()
            .and_then(|n| n.to_str())
            .context("Renamed file has no usable name")?
            .to_owned();

        store.upsert(&job.id, JobUpdate::completed(title, &*filename))?;
        Ok(filename)
    }

    async fn fetch_title(&self, job: &Job) -> anyhow::Result<String> {
        let args = ["--get-title", "--no-playlist", job.url.as_str()];
        let output = self.tool.run_captured(&args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let title = stdout.lines().map(str::trim).find(|line| !line.is_empty());
        match title {
            Some(title) if output.status.success() => Ok(sanitize_title(title)),
            _ => {
                let stderr = stderr_summary(&output.stderr);
                warn!("`{}` exited with {}: {stderr}", self.tool.describe(&args), output.status);
                if stderr.is_empty() {
                    bail!("Could not get video title");
                }
                bail!("Could not get video title: {stderr}");
            },
        }
    }

    async fn fetch_audio(&self, store: &StatusStore, job: &Job) -> anyhow::Result<()> {
        let template = self.output_dir.join(format!("{}.%(ext)s", job.id));
        let args: [&OsStr; 10] = [
            OsStr::new("-x"),
            OsStr::new("--audio-format"), OsStr::new(&self.audio.format),
            OsStr::new("--audio-quality"), OsStr::new(&self.audio.quality),
            OsStr::new("--no-playlist"),
            OsStr::new("--newline"),
            OsStr::new("-o"), template.as_os_str(),
            OsStr::new(&job.url),
        ];
        debug!("Job {}: running `{}`", job.id, self.tool.describe(&args));
        let mut child = self.tool.command()?
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run `{}`", self.tool.describe(&args)))?;
        let stdout = child.stdout.take().context("yt-dlp stdout was not captured")?;
        let mut stderr = child.stderr.take().context("yt-dlp stderr was not captured")?;

        let read_progress = async {
            let mut parser = ProgressParser::new();
            let mut lines = BufReader::new(stdout).split(b'\n');
            while let Some(line) = lines.next_segment().await? {
                let percentage = match parser.feed(&String::from_utf8_lossy(&line)) {
                    Some(ProgressEvent::Downloading(p)) => DOWNLOAD_START_PERCENT + p * DOWNLOAD_SPAN_PERCENT / 100.,
                    Some(ProgressEvent::Converting) => CONVERTING_PERCENT,
                    None => continue,
                };
                store.upsert(&job.id, JobUpdate::new(JobState::Downloading).percentage(percentage))?;
            }
            anyhow::Ok(())
        };
        let read_errors = async {
            let mut buffer = Vec::new();
            stderr.read_to_end(&mut buffer).await.map(|_| buffer)
        };
        let (progress, errors) = futures::join!(read_progress, read_errors);

        let status = child.wait().await.context("Failed to wait for yt-dlp")?;
        let errors = errors.context("Failed to read yt-dlp's stderr")?;
        progress.context("Failed to read yt-dlp's output")?;
        if !status.success() {
            let stderr = stderr_summary(&errors);
            if stderr.is_empty() {
                bail!("yt-dlp failed with {status}");
            }
            bail!("yt-dlp failed: {stderr}");
        }
        Ok(())
    }

    /// Finds `<id>.*` in the output directory, preferring the configured audio format
    async fn find_output(&self, id: &str) -> anyhow::Result<PathBuf> {
        let prefix = format!("{id}.");
        let mut entries = tokio::fs::read_dir(&self.output_dir).await
            .with_context(|| format!("Failed to list {}", self.output_dir.display()))?;
        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.len() <= prefix.len() || !name.starts_with(&prefix) || PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                continue;
            }
            if entry.file_type().await.is_ok_and(|t| t.is_file()) {
                candidates.push(entry.path());
            }
        }
        let preferred = candidates.iter()
            .position(|path| path.extension().is_some_and(|e| *e == *self.audio.format));
        match preferred {
            Some(index) => Ok(candidates.swap_remove(index)),
            None => candidates.into_iter().next().context("Could not find downloaded file"),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use crate::extract_job_id;

    use super::*;

    const COMPLETING_TOOL: &str = r#"
out=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "-o" ]; then out="$arg"; fi
    prev="$arg"
done
case "$*" in
    *--get-title*) echo "My: Song?"; exit 0;;
esac
echo "[youtube] Extracting URL"
echo "[download]   0.0% of 1.00MiB"
echo "[download]  50.0% of 1.00MiB"
echo "[download] 100% of 1.00MiB"
file="${out%.*}.mp3"
echo "[ExtractAudio] Destination: $file"
printf 'audio' > "$file"
"#;

    struct Fixture {
        _dir: tempfile::TempDir,
        output_dir: PathBuf,
        downloader: Downloader,
        store: StatusStore,
    }

    fn fixture(script: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("fake-yt-dlp.sh");
        std::fs::write(&script_path, script).unwrap();
        let output_dir = dir.path().join("downloads");
        std::fs::create_dir(&output_dir).unwrap();
        let tool = ToolConfig {
            path: PathBuf::from("/bin/sh"),
            extra_args: vec![script_path.to_string_lossy().into_owned()],
        };
        Fixture {
            downloader: Downloader::new(tool, output_dir.clone(), AudioConfig::default()),
            output_dir,
            store: StatusStore::new(Duration::from_secs(3600), 16),
            _dir: dir,
        }
    }

    fn job(url: &str) -> Job {
        Job { id: extract_job_id(url).into(), url: url.to_owned() }
    }

    #[tokio::test]
    async fn short_link_download_completes() {
        let f = fixture(COMPLETING_TOOL);
        let job = job("https://youtu.be/abc123XYZ_0");
        assert_eq!(&*job.id, "abc123XYZ_0");
        f.store.begin(&job.id).unwrap();

        let filename = f.downloader.download(&f.store, &job).await.unwrap();
        assert_eq!(filename, "My Song.mp3");
        assert_eq!(std::fs::read(f.output_dir.join("My Song.mp3")).unwrap(), b"audio");
        assert!(!f.output_dir.join("abc123XYZ_0.mp3").exists());

        let record = f.store.get(&job.id).unwrap().unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.percentage, 100.);
        assert_eq!(record.title.as_deref(), Some("My Song"));
        assert_eq!(record.output_filename.as_deref(), Some("My Song.mp3"));
        assert_eq!(record.error_message, None);
    }

    #[tokio::test]
    async fn existing_files_are_not_overwritten() {
        let f = fixture(COMPLETING_TOOL);
        std::fs::write(f.output_dir.join("My Song.mp3"), b"older").unwrap();
        let job = job("https://www.youtube.com/watch?v=dQw4w9WgXcQ");

        let filename = f.downloader.download(&f.store, &job).await.unwrap();
        assert_eq!(filename, "My Song (1).mp3");
        assert_eq!(std::fs::read(f.output_dir.join("My Song.mp3")).unwrap(), b"older");
        assert_eq!(std::fs::read(f.output_dir.join("My Song (1).mp3")).unwrap(), b"audio");
    }

    #[tokio::test]
    async fn title_failure_marks_the_job_as_failed() {
        let f = fixture("echo 'ERROR: [generic] Unsupported URL: not a url' >&2\nexit 1\n");
        let job = job("not a url");
        assert_eq!(job.id.len(), 22);
        f.store.begin(&job.id).unwrap();

        let err = f.downloader.download(&f.store, &job).await.unwrap_err();
        assert!(err.to_string().starts_with("Could not get video title"));

        let record = f.store.get(&job.id).unwrap().unwrap();
        assert_eq!(record.state, JobState::Error);
        assert!(record.error_message.unwrap().starts_with("Could not get video title"));
        assert_eq!(record.output_filename, None);
        assert_eq!(record.percentage, INFO_PERCENT);
    }

    #[tokio::test]
    async fn download_failure_reports_stderr() {
        let f = fixture(r#"
case "$*" in
    *--get-title*) echo "Title"; exit 0;;
esac
echo "[download]  10.0% of 1.00MiB"
echo "ERROR: unable to download video data: HTTP Error 403: Forbidden" >&2
exit 1
"#);
        let job = job("https://youtu.be/Forbidden");
        f.downloader.process(&f.store, job.clone()).await;

        let record = f.store.get(&job.id).unwrap().unwrap();
        assert_eq!(record.state, JobState::Error);
        assert_eq!(record.error_message.as_deref(), Some("yt-dlp failed: ERROR: unable to download video data: HTTP Error 403: Forbidden"));
        assert_eq!(record.title.as_deref(), Some("Title"));
        assert_eq!(record.percentage, 27.);
    }

    #[tokio::test]
    async fn missing_output_is_reported() {
        let f = fixture(r#"
case "$*" in
    *--get-title*) echo "Title"; exit 0;;
esac
"#);
        std::fs::write(f.output_dir.join("NoFile.webm.part"), b"partial").unwrap();
        let job = job("https://youtu.be/NoFile");
        let err = f.downloader.download(&f.store, &job).await.unwrap_err();
        assert_eq!(err.to_string(), "Could not find downloaded file");
    }

    #[tokio::test]
    async fn missing_tool_is_reported() {
        let store = StatusStore::new(Duration::from_secs(3600), 16);
        let tool = ToolConfig { path: PathBuf::from("./definitely/not/yt-dlp"), extra_args: vec![] };
        let downloader = Downloader::new(tool, PathBuf::from("."), AudioConfig::default());
        let job = job("https://youtu.be/abc");
        downloader.process(&store, job.clone()).await;

        let record = store.get(&job.id).unwrap().unwrap();
        assert_eq!(record.state, JobState::Error);
        assert!(record.error_message.unwrap().starts_with("yt-dlp not found at "));
    }
}
