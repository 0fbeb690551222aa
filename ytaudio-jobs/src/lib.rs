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
use chrono::Utc;

pub mod downloader;
pub mod ids;
pub mod progress;
pub mod queue;
pub mod sanitize;
pub mod store;
pub mod title;
pub mod tool;

pub use downloader::{AudioConfig, Downloader};
pub use ids::{extract_job_id, is_valid_job_id, random_token};
pub use queue::{Job, JobQueue, SubmitError};
pub use store::{Admission, JobUpdate, StatusStore, StoreCounts};
pub use title::{ExtractStrategy, ResolvedTitle, TitleResolver};
pub use tool::ToolConfig;

/// Lifecycle of a single job. Variants are declared in the order a job moves through them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Starting,
    GettingInfo,
    Processing,
    Downloading,
    Completed,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobRecord {
    pub state: JobState,
    /// 0 to 100, never decreasing
    pub percentage: f64,
    pub title: Option<String>,
    /// Only set once the job is [`JobState::Completed`]
    pub output_filename: Option<String>,
    /// Only set once the job is [`JobState::Error`]
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl JobRecord {
    pub fn new() -> JobRecord {
        let now = Utc::now().timestamp_millis();
        JobRecord {
            state: JobState::Starting,
            percentage: 0.,
            title: None,
            output_filename: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for JobRecord {
    fn default() -> Self {
        Self::new()
    }
}
