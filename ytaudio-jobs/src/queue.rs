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
use std::{fmt::{Display, Formatter}, sync::Arc};

use futures::{future::BoxFuture, lock::Mutex};
use log::{debug, error};
use tokio::sync::mpsc::{self, error::TrySendError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub id: Arc<str>,
    pub url: String,
}

/// Returned by [`JobQueue::submit`], hands the rejected job back
#[derive(Debug)]
pub enum SubmitError {
    Full(Job),
    Closed(Job),
}

impl SubmitError {
    pub fn into_job(self) -> Job {
        match self {
            SubmitError::Full(job) | SubmitError::Closed(job) => job,
        }
    }
}

impl Display for SubmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::Full(job)   => write!(f, "The job queue is full, rejected job {}", job.id),
            SubmitError::Closed(job) => write!(f, "The job queue is shut down, rejected job {}", job.id),
        }
    }
}

impl std::error::Error for SubmitError {}

/// A fixed set of workers pulling jobs from a bounded queue.
///
/// Each job runs in its own task, so a panicking handler only takes that job down.
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
    workers: usize,
}

impl JobQueue {
    /// Spawns the workers on the current tokio runtime
    pub fn start<F>(workers: usize, capacity: usize, handler: F) -> JobQueue
    where
        F: Fn(Job) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);

        for worker in 0..workers {
            let receiver = receiver.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                loop {
                    let Some(job) = receiver.lock().await.recv().await else {
                        break;
                    };
                    let id = job.id.clone();
                    debug!("Worker {worker} picked up job {id}");
                    if let Err(e) = tokio::spawn(handler(job)).await {
                        error!("Job {id} did not finish cleanly: {e}");
                    }
                }
                debug!("Worker {worker} stopped: the job queue was closed");
            });
        }

        JobQueue { sender, workers }
    }

    /// Enqueues a job without waiting for space
    pub fn submit(&self, job: Job) -> Result<(), SubmitError> {
        self.sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job)   => SubmitError::Full(job),
            TrySendError::Closed(job) => SubmitError::Closed(job),
        })
    }

    /// Jobs waiting for a free worker
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use futures::FutureExt;
    use tokio::sync::Semaphore;

    use super::*;

    fn job(id: &str) -> Job {
        Job { id: id.into(), url: format!("https://youtu.be/{id}") }
    }

    #[tokio::test]
    async fn all_submitted_jobs_are_processed() {
        let (done, mut done_rx) = mpsc::unbounded_channel();
        let queue = JobQueue::start(2, 8, move |job: Job| {
            let done = done.clone();
            async move {
                done.send(job.id).ok();
            }.boxed()
        });
        for id in ["a", "b", "c"] {
            queue.submit(job(id)).unwrap();
        }
        let mut seen = HashSet::new();
        for _ in 0..3 {
            seen.insert(done_rx.recv().await.unwrap());
        }
        assert_eq!(seen, HashSet::from(["a".into(), "b".into(), "c".into()]));
    }

    #[tokio::test]
    async fn full_queue_rejects_submissions() {
        let (started, mut started_rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(0));
        let handler_gate = gate.clone();
        let queue = JobQueue::start(1, 1, move |job: Job| {
            let started = started.clone();
            let gate = handler_gate.clone();
            async move {
                started.send(job.id).ok();
                let _permit = gate.acquire().await;
            }.boxed()
        });

        queue.submit(job("running")).unwrap();
        assert_eq!(started_rx.recv().await.unwrap(), "running".into());
        queue.submit(job("queued")).unwrap();
        assert_eq!(queue.pending(), 1);

        let rejected = queue.submit(job("rejected")).unwrap_err();
        assert!(matches!(rejected, SubmitError::Full(_)));
        assert_eq!(rejected.into_job().id, "rejected".into());

        gate.add_permits(8);
        assert_eq!(started_rx.recv().await.unwrap(), "queued".into());
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn panicking_jobs_do_not_kill_the_worker() {
        let (done, mut done_rx) = mpsc::unbounded_channel();
        let queue = JobQueue::start(1, 4, move |job: Job| {
            let done = done.clone();
            async move {
                assert_ne!(&*job.id, "boom", "handler failure");
                done.send(job.id).ok();
            }.boxed()
        });
        queue.submit(job("boom")).unwrap();
        queue.submit(job("fine")).unwrap();
        assert_eq!(done_rx.recv().await.unwrap(), "fine".into());
    }
}
