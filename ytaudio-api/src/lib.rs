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
use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    GettingInfo,
    Processing,
    Downloading,
    Completed,
    Error,
    NotFound,
}
#[cfg(feature = "ytaudio-jobs")]
impl From<ytaudio_jobs::JobState> for JobStatus {
    fn from(value: ytaudio_jobs::JobState) -> Self {
        use ytaudio_jobs::JobState;
        match value {
            JobState::Starting    => Self::Starting,
            JobState::GettingInfo => Self::GettingInfo,
            JobState::Processing  => Self::Processing,
            JobState::Downloading => Self::Downloading,
            JobState::Completed   => Self::Completed,
            JobState::Error       => Self::Error,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProgressResponse {
    pub status: JobStatus,
    pub title: Option<String>,
    pub filename: Option<String>,
    pub percentage: f64,
    pub error: Option<String>,
}
#[cfg(feature = "ytaudio-jobs")]
impl From<&ytaudio_jobs::JobRecord> for ProgressResponse {
    fn from(value: &ytaudio_jobs::JobRecord) -> Self {
        Self {
            status: value.state.into(),
            title: value.title.clone(),
            filename: value.output_filename.clone(),
            percentage: value.percentage,
            error: value.error_message.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NotFoundResponse {
    pub status: JobStatus,
    pub message: String,
}

impl NotFoundResponse {
    pub fn download() -> NotFoundResponse {
        NotFoundResponse {
            status: JobStatus::NotFound,
            message: "Download not found".to_owned(),
        }
    }
}

/// Reply to a JSON submission
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SubmitResponse {
    pub job_id: String,
    pub progress_url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TitleResponse {
    pub video_id: String,
    pub title: String,
    /// Which extraction strategy produced the title
    pub strategy: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StatusResponse {
    // job stats
    pub active_jobs: usize,
    pub finished_jobs: usize,
    pub queued_jobs: usize,
    pub queue_capacity: usize,
    pub workers: usize,
    // general server build data
    pub server_version: String,
    pub server_git_hash: Option<String>,
    pub server_git_dirty: Option<bool>,
    pub server_git_commit_timestamp: Option<String>,
    pub server_build_timestamp: Option<i64>,
    pub server_startup_timestamp: i64,
}
