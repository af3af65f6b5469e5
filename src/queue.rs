use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::{BatchProgress, Job, JobStatus};

/// Receives human-readable progress lines while a job runs.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, line: String);
}

/// Runs one job's pipeline. The engine treats the result uniformly: a
/// failure is logged and counted as processed, never retried.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &Job, log: &dyn ProgressSink) -> anyhow::Result<()>;
}

struct EngineState {
    queue: VecDeque<Job>,
    /// Held by the consumer from claiming a job until the queue drains,
    /// including the cooldown gap between jobs.
    in_flight: bool,
}

/// Single-consumer FIFO batch engine. Jobs run strictly in arrival order,
/// one at a time, with aggregate progress published on a watch channel.
pub struct QueueEngine {
    state: Mutex<EngineState>,
    progress: watch::Sender<BatchProgress>,
    runner: Arc<dyn JobRunner>,
    cooldown: Duration,
    cancel: CancellationToken,
}

impl QueueEngine {
    pub fn new(
        runner: Arc<dyn JobRunner>,
        cooldown: Duration,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (progress, _) = watch::channel(BatchProgress::default());
        Arc::new(Self {
            state: Mutex::new(EngineState {
                queue: VecDeque::new(),
                in_flight: false,
            }),
            progress,
            runner,
            cooldown,
            cancel,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> BatchProgress {
        self.progress.borrow().clone()
    }

    /// Append jobs to the queue and start the consumer if idle. While a
    /// batch is active, new jobs merge into it (total grows); otherwise
    /// progress resets and a fresh batch begins.
    pub async fn enqueue(self: &Arc<Self>, jobs: Vec<Job>) {
        if jobs.is_empty() {
            return;
        }
        let count = jobs.len();

        let fresh = {
            let mut state = self.state.lock().await;
            let fresh = state.queue.is_empty() && !state.in_flight;
            state.queue.extend(jobs);
            fresh
        };

        self.progress.send_modify(|p| {
            if fresh {
                *p = BatchProgress::default();
                p.active = true;
            }
            p.total += count;
            p.log.push(stamp(&format!("queued {count} job(s)")));
        });

        self.pump();
    }

    /// Kick the consumer. A no-op while one is already active.
    fn pump(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.drive().await });
    }

    async fn drive(self: Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            if state.in_flight || state.queue.is_empty() {
                return;
            }
            state.in_flight = true;
        }

        loop {
            if self.cancel.is_cancelled() {
                // Finalize under the state lock so a concurrent enqueue
                // cannot start a fresh batch in between and have its
                // progress clobbered here.
                let mut state = self.state.lock().await;
                state.in_flight = false;
                let dropped = state.queue.len();
                state.queue.clear();
                self.progress.send_modify(|p| {
                    p.active = false;
                    p.current = None;
                    p.log.push(stamp(&format!("batch stopped, {dropped} job(s) dropped")));
                });
                return;
            }

            let job = {
                let mut state = self.state.lock().await;
                match state.queue.front_mut() {
                    Some(job) => {
                        job.status = JobStatus::Processing;
                        Some(job.clone())
                    }
                    None => {
                        state.in_flight = false;
                        self.progress.send_modify(|p| {
                            p.active = false;
                            p.current = None;
                            p.log.push(stamp("batch complete"));
                        });
                        None
                    }
                }
            };

            let Some(job) = job else {
                return;
            };

            self.progress.send_modify(|p| {
                p.current = Some(job.keyword.clone());
                p.log.push(stamp(&format!("processing \"{}\"", job.keyword)));
            });

            let sink = WatchSink {
                progress: &self.progress,
            };
            match self.runner.run(&job, &sink).await {
                Ok(()) => {
                    info!(keyword = %job.keyword, "job finished");
                    self.progress.send_modify(|p| {
                        p.log.push(stamp(&format!("finished \"{}\"", job.keyword)));
                    });
                }
                Err(e) => {
                    // A failed job is counted as processed like any other;
                    // the batch keeps going.
                    error!(keyword = %job.keyword, error = %format!("{e:#}"), "job failed");
                    self.progress.send_modify(|p| {
                        p.log.push(stamp(&format!("error on \"{}\": {e:#}", job.keyword)));
                    });
                }
            }

            let more = {
                let mut state = self.state.lock().await;
                state.queue.pop_front();
                !state.queue.is_empty()
            };

            self.progress.send_modify(|p| {
                p.processed += 1;
                p.current = None;
            });

            // Rate-limit gap before the next job; skipped for the last one
            // and in demo mode (zero cooldown).
            if more && !self.cooldown.is_zero() {
                tokio::time::sleep(self.cooldown).await;
            }
        }
    }

    /// Wait until no batch is active. Returns immediately if idle.
    pub async fn wait_idle(&self) {
        let mut rx = self.progress.subscribe();
        while rx.borrow_and_update().active {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Clear the progress snapshot. Refused while a batch is running so
    /// closing the panel never drops data.
    pub async fn dismiss(&self) -> bool {
        {
            let state = self.state.lock().await;
            if state.in_flight || !state.queue.is_empty() {
                return false;
            }
        }
        self.progress.send_modify(|p| *p = BatchProgress::default());
        true
    }
}

struct WatchSink<'a> {
    progress: &'a watch::Sender<BatchProgress>,
}

impl ProgressSink for WatchSink<'_> {
    fn emit(&self, line: String) {
        self.progress.send_modify(|p| p.log.push(stamp(&line)));
    }
}

fn stamp(message: &str) -> String {
    format!("[{}] {}", chrono::Utc::now().format("%H:%M:%S"), message)
}
