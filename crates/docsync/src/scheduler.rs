//! Periodic sync rounds.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use docsync_core::{StartNextSyncEvent, SyncEvent};
use docsync_sync::SyncEventQueue;

/// Commands for the scheduler task.
#[derive(Debug)]
enum SchedulerCommand {
    Pause,
    Resume,
    Stop,
}

/// Enqueues a `StartNextSync` event every poll interval.
///
/// A round is a full sync when a handler asked for one with
/// [`SyncEventQueue::request_full_sync_later`], incremental otherwise.
/// Rounds are skipped while the previous one is still being dispatched.
pub struct SyncScheduler {
    sender: mpsc::UnboundedSender<SchedulerCommand>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    /// Start the scheduler. With `initial_full_sync` a full sync is queued
    /// right away.
    pub fn start(queue: SyncEventQueue, poll_interval: Duration, initial_full_sync: bool) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        if initial_full_sync {
            queue.add_event(SyncEvent::StartNextSync(StartNextSyncEvent::full()));
        }

        let task = tokio::spawn(async move {
            let mut ticker = interval(poll_interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            let mut paused = false;

            loop {
                tokio::select! {
                    cmd = receiver.recv() => match cmd {
                        Some(SchedulerCommand::Pause) => {
                            tracing::info!("sync paused");
                            paused = true;
                        }
                        Some(SchedulerCommand::Resume) => {
                            tracing::info!("sync resumed");
                            paused = false;
                        }
                        Some(SchedulerCommand::Stop) | None => break,
                    },
                    _ = ticker.tick() => {
                        if !paused {
                            next_round(&queue);
                        }
                    }
                }
            }

            tracing::debug!("scheduler stopped");
        });

        Self { sender, task }
    }

    /// Stop enqueuing rounds until [`SyncScheduler::resume`].
    pub fn pause(&self) {
        let _ = self.sender.send(SchedulerCommand::Pause);
    }

    pub fn resume(&self) {
        let _ = self.sender.send(SchedulerCommand::Resume);
    }

    pub async fn stop(self) {
        let _ = self.sender.send(SchedulerCommand::Stop);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "scheduler task failed");
        }
    }
}

fn next_round(queue: &SyncEventQueue) {
    if queue.pending() > 0 {
        tracing::trace!(pending = queue.pending(), "previous round still running, skipped");
        return;
    }
    let event = if queue.take_full_sync_request() {
        tracing::info!("full sync requested by a previous failure");
        StartNextSyncEvent::full()
    } else {
        StartNextSyncEvent::incremental()
    };
    queue.add_event(SyncEvent::StartNextSync(event));
}
