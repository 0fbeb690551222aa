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
use std::{collections::HashMap, sync::{Arc, RwLock}, time::{Duration, Instant}};

use anyhow::anyhow;
use chrono::Utc;
use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::{JobRecord, JobState};

pub const STORE_READ_ERR:  &str = "Failed to acquire the status store for reading";
pub const STORE_WRITE_ERR: &str = "Failed to acquire the status store for writing";

/// A partial update of a [`JobRecord`]. Fields left as `None` keep their previous value.
#[derive(Clone, Debug, PartialEq)]
pub struct JobUpdate {
    pub state: JobState,
    pub percentage: Option<f64>,
    pub title: Option<String>,
    pub filename: Option<String>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn new(state: JobState) -> JobUpdate {
        JobUpdate { state, percentage: None, title: None, filename: None, error: None }
    }

    pub fn completed(title: impl Into<String>, filename: impl Into<String>) -> JobUpdate {
        JobUpdate::new(JobState::Completed).percentage(100.).title(title).filename(filename)
    }

    pub fn failed(message: impl Into<String>) -> JobUpdate {
        JobUpdate::new(JobState::Error).error(message)
    }

    #[must_use]
    pub fn percentage(mut self, percentage: f64) -> JobUpdate {
        self.percentage = Some(percentage);
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> JobUpdate {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> JobUpdate {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> JobUpdate {
        self.error = Some(error.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// A fresh record was created, the caller should start the job
    Started,
    /// A job with this id is still in progress, the submission joins it
    AlreadyRunning,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub active: usize,
    pub finished: usize,
}

struct Entry {
    record: JobRecord,
    finished_at: Option<Instant>,
    /// Another submission joined this job after it was created
    joined: bool,
}

impl Entry {
    fn new() -> Entry {
        Entry { record: JobRecord::new(), finished_at: None, joined: false }
    }

    /// Applies the update unless it would move the job backwards or touch a finished job
    fn apply(&mut self, update: JobUpdate) -> bool {
        let record = &mut self.record;
        if record.state.is_terminal() || update.state < record.state {
            return false;
        }
        match update.state {
            JobState::Completed if update.filename.is_none() => return false,
            JobState::Error => {
                let message = update.error.filter(|e| !e.trim().is_empty()).unwrap_or_else(|| "Unknown error".to_owned());
                record.error_message = Some(message);
            },
            JobState::Completed => {
                record.output_filename = update.filename;
                record.percentage = 100.;
            },
            _ => {},
        }
        record.state = update.state;
        if let Some(percentage) = update.percentage.filter(|p| p.is_finite()) {
            record.percentage = record.percentage.max(percentage.clamp(0., 100.));
        }
        if update.title.is_some() {
            record.title = update.title;
        }
        record.updated_at = Utc::now().timestamp_millis();
        if record.state.is_terminal() {
            self.finished_at = Some(Instant::now());
        }
        true
    }
}

/// In-memory job status map.
///
/// Records only move forward: percentages never decrease, states never go back and
/// finished (completed or failed) records are frozen until [`StatusStore::prune`] evicts them.
pub struct StatusStore {
    jobs: RwLock<HashMap<Arc<str>, Entry>>,
    retention: Duration,
    max_finished: usize,
}

impl StatusStore {
    pub fn new(retention: Duration, max_finished: usize) -> StatusStore {
        StatusStore {
            jobs: RwLock::default(),
            retention,
            max_finished,
        }
    }

    /// Creates a fresh record for a submitted job, unless one is still in progress.
    ///
    /// Finished records with the same id are replaced.
    pub fn begin(&self, id: &str) -> anyhow::Result<Admission> {
        let mut jobs = self.jobs.write().map_err(|_| anyhow!(STORE_WRITE_ERR))?;
        match jobs.get_mut(id) {
            Some(entry) if !entry.record.state.is_terminal() => {
                entry.joined = true;
                Ok(Admission::AlreadyRunning)
            },
            _ => {
                jobs.insert(id.into(), Entry::new());
                Ok(Admission::Started)
            },
        }
    }

    /// Returns whether the update was applied
    pub fn upsert(&self, id: &str, update: JobUpdate) -> anyhow::Result<bool> {
        let mut jobs = self.jobs.write().map_err(|_| anyhow!(STORE_WRITE_ERR))?;
        let entry = jobs.entry(id.into()).or_insert_with(Entry::new);
        let state = update.state;
        let applied = entry.apply(update);
        if !applied {
            debug!("Ignored {state} update for job {id} in state {}", entry.record.state);
        }
        Ok(applied)
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<JobRecord>> {
        let jobs = self.jobs.read().map_err(|_| anyhow!(STORE_READ_ERR))?;
        Ok(jobs.get(id).map(|entry| entry.record.clone()))
    }

    /// Takes back a record from [`StatusStore::begin`] whose job could not be started.
    ///
    /// An untouched record nobody else joined is removed. A joined one fails with `reason`
    /// so the other submitters see why. Records that already moved on are left alone.
    /// Returns whether the record was removed.
    pub fn withdraw(&self, id: &str, reason: &str) -> anyhow::Result<bool> {
        let mut jobs = self.jobs.write().map_err(|_| anyhow!(STORE_WRITE_ERR))?;
        let Some(entry) = jobs.get_mut(id) else {
            return Ok(false);
        };
        if entry.record.state != JobState::Starting {
            return Ok(false);
        }
        if entry.joined {
            entry.apply(JobUpdate::failed(reason));
            return Ok(false);
        }
        jobs.remove(id);
        Ok(true)
    }

    pub fn counts(&self) -> anyhow::Result<StoreCounts> {
        let jobs = self.jobs.read().map_err(|_| anyhow!(STORE_READ_ERR))?;
        let finished = jobs.values().filter(|entry| entry.finished_at.is_some()).count();
        Ok(StoreCounts {
            active: jobs.len() - finished,
            finished,
        })
    }

    /// Evicts finished records older than the retention window, then the oldest
    /// finished records above the cap. Returns the number of evicted records.
    pub fn prune(&self, now: Instant) -> anyhow::Result<usize> {
        let mut jobs = self.jobs.write().map_err(|_| anyhow!(STORE_WRITE_ERR))?;
        let before = jobs.len();
        jobs.retain(|_, entry| match entry.finished_at {
            None => true,
            Some(finished_at) => now.saturating_duration_since(finished_at) < self.retention,
        });

        let mut finished: Vec<(Instant, Arc<str>)> = jobs.iter()
            .filter_map(|(id, entry)| Some((entry.finished_at?, id.clone())))
            .collect();
        if finished.len() > self.max_finished {
            finished.sort_unstable_by_key(|(finished_at, _)| *finished_at);
            let excess = finished.len() - self.max_finished;
            for (_, id) in finished.into_iter().take(excess) {
                jobs.remove(&id);
            }
        }
        Ok(before - jobs.len())
    }

    /// Periodically calls [`StatusStore::prune`] on the current tokio runtime
    pub fn spawn_sweeper(store: Arc<StatusStore>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match store.prune(Instant::now()) {
                    Ok(0) => {},
                    Ok(evicted) => debug!("Evicted {evicted} finished jobs from the status store"),
                    Err(e) => warn!("Failed to prune the status store: {e:?}"),
                }
            }
        })
    }
}
