// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Periodic background work
//!
//! Each [`BackgroundTask`] owns a dedicated thread driving a current-thread
//! tokio runtime. The task ticks on a fixed period and holds only a weak
//! reference to its target, so a dropped manager ends the loop on its own.

use crate::error::{SessionError, SessionResult};
use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Periodic task running on its own thread
pub struct BackgroundTask {
    name: String,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Run `work` against `target` every `period`, starting one period from now
    pub fn spawn<T, F>(
        name: impl Into<String>,
        period: Duration,
        target: Weak<T>,
        work: F,
    ) -> SessionResult<Self>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) + Send + 'static,
    {
        let name = name.into();
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| {
                SessionError::Lifecycle(format!("failed to build runtime for '{}': {}", name, e))
            })?;

        let thread_name = name.clone();
        let loop_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                runtime.block_on(async move {
                    let start = tokio::time::Instant::now() + period;
                    let mut ticker = tokio::time::interval_at(start, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                let Some(target) = target.upgrade() else {
                                    log::debug!("Target of '{}' dropped", loop_name);
                                    break;
                                };
                                work(&*target);
                            }
                            changed = shutdown_rx.changed() => {
                                if changed.is_err() || *shutdown_rx.borrow() {
                                    break;
                                }
                            }
                        }
                    }
                });
                log::debug!("Background task '{}' exited", thread_name);
            })
            .map_err(|e| {
                SessionError::Lifecycle(format!("failed to spawn thread '{}': {}", name, e))
            })?;

        log::info!("Background task '{}' started, period {:?}", name, period);
        Ok(Self {
            name,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Signal shutdown and wait up to `timeout` for the thread to finish.
    /// Returns false if the thread had to be left running detached.
    pub fn stop(mut self, timeout: Duration) -> bool {
        let _ = self.shutdown.send(true);
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                log::error!(
                    "Background task '{}' did not stop within {:?}; detaching",
                    self.name,
                    timeout
                );
                return false;
            }
            std::thread::sleep(JOIN_POLL);
        }

        if handle.join().is_err() {
            log::error!("Background task '{}' panicked", self.name);
        }
        log::info!("Background task '{}' stopped", self.name);
        true
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl std::fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_ticks_until_stopped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = BackgroundTask::spawn(
            "test-ticker",
            Duration::from_millis(20),
            Arc::downgrade(&counter),
            |c: &AtomicUsize| {
                c.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(200));
        assert!(task.is_running());
        assert!(task.stop(Duration::from_secs(2)));

        let ticks = counter.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected several ticks, got {}", ticks);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(counter.load(Ordering::SeqCst), ticks);
    }

    #[test]
    fn test_stop_interrupts_long_period() {
        let target = Arc::new(());
        let task = BackgroundTask::spawn(
            "test-idle",
            Duration::from_secs(3600),
            Arc::downgrade(&target),
            |_: &()| {},
        )
        .unwrap();

        let started = Instant::now();
        assert!(task.stop(Duration::from_secs(2)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_exits_when_target_dropped() {
        let target = Arc::new(AtomicUsize::new(0));
        let task = BackgroundTask::spawn(
            "test-orphan",
            Duration::from_millis(10),
            Arc::downgrade(&target),
            |_: &AtomicUsize| {},
        )
        .unwrap();

        drop(target);
        std::thread::sleep(Duration::from_millis(100));
        assert!(!task.is_running());
    }

    #[test]
    fn test_stuck_work_is_detached() {
        let target = Arc::new(());
        let task = BackgroundTask::spawn(
            "test-stuck",
            Duration::from_millis(5),
            Arc::downgrade(&target),
            |_: &()| std::thread::sleep(Duration::from_millis(500)),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert!(!task.stop(Duration::from_millis(50)));
    }
}
