//! Timer service built on tokio tasks.
//!
//! Each live timer is one spawned task that sleeps for the interval and then
//! runs the callback.  Callbacks only post events, so they are cheap and never
//! touch cooperate state.
//!
//! Limits:
//! - at most [`MAX_TIMERS`] live timers; ids are taken from the lowest free slot;
//! - intervals are clamped to [`MIN_INTERVAL_MS`]..=[`MAX_INTERVAL_MS`];
//! - a repeat count of `0` or less repeats forever.
//!
//! `reset_timer` aborts the running task and starts a fresh countdown.  Each
//! countdown carries a generation number so a task that was already past its
//! sleep when it got aborted cannot fire a stale callback.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::collaborators::{TimerCallback, TimerId, TimerService};
use crate::application::error::TimerError;

pub const MAX_TIMERS: usize = 64;
pub const MIN_INTERVAL_MS: u64 = 50;
pub const MAX_INTERVAL_MS: u64 = 10_000;

struct TimerEntry {
    interval: Duration,
    repeat: i32,
    callback: TimerCallback,
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct TimerTable {
    timers: BTreeMap<TimerId, TimerEntry>,
    next_generation: u64,
    shut_down: bool,
}

pub struct TimerManager {
    handle: Handle,
    table: Arc<Mutex<TimerTable>>,
}

fn lock(table: &Mutex<TimerTable>) -> MutexGuard<'_, TimerTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TimerManager {
    /// Creates a manager spawning its countdowns on `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            table: Arc::new(Mutex::new(TimerTable::default())),
        }
    }

    /// The interval actually used for `timer_id`, after clamping.
    pub fn interval_of(&self, timer_id: TimerId) -> Option<Duration> {
        lock(&self.table).timers.get(&timer_id).map(|t| t.interval)
    }

    pub fn len(&self) -> usize {
        lock(&self.table).timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels every timer.  Later `add_timer` calls fail.
    pub fn shutdown(&self) {
        let mut table = lock(&self.table);
        table.shut_down = true;
        for (_, entry) in std::mem::take(&mut table.timers) {
            entry.task.abort();
        }
    }

    fn spawn_countdown(&self, timer_id: TimerId, interval: Duration, generation: u64) -> JoinHandle<()> {
        let table = Arc::clone(&self.table);
        self.handle.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let (callback, last) = {
                    let mut table = lock(&table);
                    let Some(entry) = table.timers.get_mut(&timer_id) else {
                        return;
                    };
                    if entry.generation != generation {
                        return;
                    }
                    let callback = Arc::clone(&entry.callback);
                    let last = entry.repeat == 1;
                    if last {
                        table.timers.remove(&timer_id);
                    } else if entry.repeat > 1 {
                        entry.repeat -= 1;
                    }
                    (callback, last)
                };
                callback();
                if last {
                    return;
                }
            }
        })
    }
}

impl TimerService for TimerManager {
    fn add_timer(
        &self,
        interval_ms: u64,
        repeat: i32,
        callback: TimerCallback,
    ) -> Result<TimerId, TimerError> {
        let interval =
            Duration::from_millis(interval_ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS));
        let mut table = lock(&self.table);
        if table.shut_down {
            return Err(TimerError::ShutDown);
        }
        if table.timers.len() >= MAX_TIMERS {
            warn!("timer limit of {MAX_TIMERS} reached");
            return Err(TimerError::TooManyTimers(MAX_TIMERS));
        }
        let timer_id = (0..)
            .find(|id| !table.timers.contains_key(id))
            .ok_or(TimerError::TooManyTimers(MAX_TIMERS))?;
        let generation = table.next_generation;
        table.next_generation += 1;
        let task = self.spawn_countdown(timer_id, interval, generation);
        table.timers.insert(
            timer_id,
            TimerEntry {
                interval,
                repeat,
                callback,
                generation,
                task,
            },
        );
        debug!("timer {timer_id} armed for {interval:?} x{repeat}");
        Ok(timer_id)
    }

    fn remove_timer(&self, timer_id: TimerId) -> Result<(), TimerError> {
        let entry = lock(&self.table)
            .timers
            .remove(&timer_id)
            .ok_or(TimerError::NotFound(timer_id))?;
        entry.task.abort();
        Ok(())
    }

    fn reset_timer(&self, timer_id: TimerId) -> Result<(), TimerError> {
        let mut table = lock(&self.table);
        let generation = table.next_generation;
        let interval = {
            let entry = table
                .timers
                .get_mut(&timer_id)
                .ok_or(TimerError::NotFound(timer_id))?;
            entry.task.abort();
            entry.generation = generation;
            entry.interval
        };
        table.next_generation += 1;
        let task = self.spawn_countdown(timer_id, interval, generation);
        if let Some(entry) = table.timers.get_mut(&timer_id) {
            entry.task = task;
        }
        Ok(())
    }

    fn is_exist(&self, timer_id: TimerId) -> bool {
        lock(&self.table).timers.contains_key(&timer_id)
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, TimerCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        let callback: TimerCallback = Arc::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test]
    async fn test_one_shot_timer_fires_once_and_is_removed() {
        // Arrange
        let timers = TimerManager::new(Handle::current());
        let (count, callback) = counter();

        // Act
        let id = timers.add_timer(50, 1, callback).expect("timer");
        sleep_ms(250).await;

        // Assert
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timers.is_exist(id));
    }

    #[tokio::test]
    async fn test_repeat_count_limits_firings() {
        let timers = TimerManager::new(Handle::current());
        let (count, callback) = counter();
        timers.add_timer(50, 3, callback).expect("timer");
        sleep_ms(500).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(timers.is_empty());
    }

    #[tokio::test]
    async fn test_removed_timer_never_fires() {
        // Arrange
        let timers = TimerManager::new(Handle::current());
        let (count, callback) = counter();
        let id = timers.add_timer(100, 1, callback).expect("timer");

        // Act
        timers.remove_timer(id).expect("remove");
        sleep_ms(250).await;

        // Assert
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(timers.remove_timer(id), Err(TimerError::NotFound(id)));
    }

    #[tokio::test]
    async fn test_reset_restarts_the_countdown() {
        // Arrange
        let timers = TimerManager::new(Handle::current());
        let (count, callback) = counter();
        let id = timers.add_timer(300, 1, callback).expect("timer");

        // Act
        sleep_ms(200).await;
        timers.reset_timer(id).expect("reset");
        sleep_ms(200).await;
        let before_deadline = count.load(Ordering::SeqCst);
        sleep_ms(300).await;

        // Assert
        assert_eq!(before_deadline, 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ids_reuse_lowest_free_slot() {
        let timers = TimerManager::new(Handle::current());
        let ids: Vec<TimerId> = (0..3)
            .map(|_| timers.add_timer(10_000, 1, counter().1).expect("timer"))
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
        timers.remove_timer(1).expect("remove");
        assert_eq!(timers.add_timer(10_000, 1, counter().1), Ok(1));
    }

    #[tokio::test]
    async fn test_limit_of_live_timers_is_enforced() {
        // Arrange
        let timers = TimerManager::new(Handle::current());
        for _ in 0..MAX_TIMERS {
            timers.add_timer(10_000, 1, counter().1).expect("timer");
        }

        // Act
        let result = timers.add_timer(10_000, 1, counter().1);

        // Assert
        assert_eq!(result, Err(TimerError::TooManyTimers(MAX_TIMERS)));
    }

    #[tokio::test]
    async fn test_interval_is_clamped() {
        let timers = TimerManager::new(Handle::current());
        let short = timers.add_timer(1, 1, counter().1).expect("timer");
        let long = timers.add_timer(60_000, 1, counter().1).expect("timer");
        assert_eq!(timers.interval_of(short), Some(Duration::from_millis(MIN_INTERVAL_MS)));
        assert_eq!(timers.interval_of(long), Some(Duration::from_millis(MAX_INTERVAL_MS)));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_everything() {
        let timers = TimerManager::new(Handle::current());
        let (count, callback) = counter();
        timers.add_timer(50, 0, callback).expect("timer");
        timers.shutdown();
        sleep_ms(150).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(timers.add_timer(50, 1, counter().1), Err(TimerError::ShutDown));
    }
}
