// Random Queue — time-sliced, randomized delay queue
//
// A ring of `rounds` time slices covers a rolling window of
// `rounds * granularity` seconds. Producers drop messages into the slice of
// their send time; a single logical reader drains one slice per tick. A slice
// is reused once per window, so its capacity tracks steady-state load.

use crate::crypto::random::{random_u64, RandomError, SecureRandomSource, SharedRandom};
use crate::privacy::slice::TimeSlice;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Upper bound on the number of slices in one queue.
pub const MAX_ROUNDS: u64 = 1 << 20;

/// Upper bound on the initial per-slice allocation.
pub const MAX_SLICE_CAPACITY_HINT: usize = 1 << 16;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Granularity must be greater than 0")]
    ZeroGranularity,
    #[error("Window of {window_size}s is shorter than one {granularity}s slice")]
    WindowTooSmall { window_size: u64, granularity: u64 },
    #[error("Window of {window_size}s is not a multiple of the {granularity}s granularity")]
    UnevenWindow { window_size: u64, granularity: u64 },
    #[error("Too many slices ({0}, max {max})", max = MAX_ROUNDS)]
    TooManySlices(u64),
    #[error("Random source error: {0}")]
    Random(#[from] RandomError),
}

/// Queue geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Length of the rolling window in seconds
    pub window_size_secs: u64,
    /// Length of one slice in seconds
    pub granularity_secs: u64,
    /// Expected message volume per window, used to pre-size slices
    pub messages_per_window: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            window_size_secs: 3600,
            granularity_secs: 10,
            messages_per_window: 3600,
        }
    }
}

impl QueueConfig {
    pub fn new(window_size_secs: u64, granularity_secs: u64, messages_per_window: u64) -> Self {
        Self {
            window_size_secs,
            granularity_secs,
            messages_per_window,
        }
    }

    /// Validate the queue geometry
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.granularity_secs == 0 {
            return Err(QueueError::ZeroGranularity);
        }
        if self.window_size_secs < self.granularity_secs {
            return Err(QueueError::WindowTooSmall {
                window_size: self.window_size_secs,
                granularity: self.granularity_secs,
            });
        }
        if self.window_size_secs % self.granularity_secs != 0 {
            return Err(QueueError::UnevenWindow {
                window_size: self.window_size_secs,
                granularity: self.granularity_secs,
            });
        }
        let rounds = self.rounds();
        if rounds > MAX_ROUNDS {
            return Err(QueueError::TooManySlices(rounds));
        }
        Ok(())
    }

    /// Number of slices; 0 when the granularity is 0.
    pub fn rounds(&self) -> u64 {
        self.window_size_secs
            .checked_div(self.granularity_secs)
            .unwrap_or(0)
    }

    fn slice_capacity_hint(&self) -> usize {
        let per_slice = self
            .messages_per_window
            .checked_div(self.rounds())
            .unwrap_or(0);
        usize::try_from(per_slice)
            .unwrap_or(usize::MAX)
            .min(MAX_SLICE_CAPACITY_HINT)
    }
}

#[derive(Debug, Default)]
struct ReaderState {
    read_pos: u64,
    started: bool,
}

/// Time-sliced queue that releases messages in random order.
///
/// `add` may be called from any number of threads. `get_send_queue` and
/// `get_due_queue` are serialized behind one reader lock.
pub struct RandomQueue<M> {
    config: QueueConfig,
    rounds: u64,
    /// Fixed after construction; only read-locked to fetch slice handles.
    slices: RwLock<Vec<Arc<TimeSlice<M>>>>,
    random: SharedRandom,
    reader: Mutex<ReaderState>,
}

impl<M> RandomQueue<M> {
    /// Queue over a `window_size`-second window cut into `granularity`-second
    /// slices, seeded from the operating system.
    pub fn new(
        window_size: u64,
        granularity: u64,
        messages_per_window: u64,
    ) -> Result<Self, QueueError> {
        Self::from_config(QueueConfig::new(
            window_size,
            granularity,
            messages_per_window,
        ))
    }

    pub fn from_config(config: QueueConfig) -> Result<Self, QueueError> {
        config.validate()?;
        Self::with_random_source(config, SecureRandomSource::from_os()?)
    }

    /// Queue drawing all of its randomness from `random`. Every slice gets its
    /// own sub-stream seeded from it.
    pub fn with_random_source(
        config: QueueConfig,
        random: SecureRandomSource,
    ) -> Result<Self, QueueError> {
        config.validate()?;
        let rounds = config.rounds();
        let capacity = config.slice_capacity_hint();
        let random = random.into_shared();

        let slices = (0..rounds)
            .map(|_| -> Result<Arc<TimeSlice<M>>, QueueError> {
                let sub_stream = SecureRandomSource::child_of(&random)?;
                Ok(Arc::new(TimeSlice::new(capacity, sub_stream)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            window_size = config.window_size_secs,
            granularity = config.granularity_secs,
            rounds,
            capacity,
            "Random queue created"
        );

        Ok(Self {
            config,
            rounds,
            slices: RwLock::new(slices),
            random,
            reader: Mutex::new(ReaderState::default()),
        })
    }

    /// Queue `message` for `send_time` (Unix seconds).
    ///
    /// `now == 0` reads the wall clock. A send time in the past is replaced
    /// by `now` plus a random 64-bit offset (wrapping), so late or
    /// unscheduled messages land in an unpredictable slice instead of the
    /// next one out.
    pub fn add(&self, send_time: u64, message: M, now: u64) -> Result<(), QueueError> {
        let now = resolve_now(now);
        let send_time = if send_time < now {
            let offset = random_u64(&mut *self.random.lock())?;
            now.wrapping_add(offset)
        } else {
            send_time
        };

        let slice = self.slice(self.slice_index(send_time));
        slice.add(message)?;
        Ok(())
    }

    /// Messages to send now. `now == 0` reads the wall clock.
    ///
    /// The first call anchors the read cursor at the current tick; every
    /// later call advances it by exactly one slice, however much time has
    /// passed. A tick at or before the cursor yields nothing and leaves the
    /// cursor alone. Callers must poll at least once per granularity;
    /// [`RandomQueue::get_due_queue`] catches up instead.
    pub fn get_send_queue(&self, now: u64) -> Vec<M> {
        let mut reader = self.reader.lock();
        let tick = resolve_now(now) / self.config.granularity_secs;

        if reader.started && tick <= reader.read_pos {
            tracing::trace!(tick, read_pos = reader.read_pos, "Tick already served");
            return Vec::new();
        }

        if reader.started {
            reader.read_pos += 1;
        } else {
            reader.started = true;
            reader.read_pos = tick;
        }
        self.slice(self.ring_index(reader.read_pos)).drain()
    }

    /// Like [`RandomQueue::get_send_queue`], but drains every slice between
    /// the cursor and the current tick (at most one full window) and moves
    /// the cursor to the current tick.
    pub fn get_due_queue(&self, now: u64) -> Vec<M> {
        let mut reader = self.reader.lock();
        let tick = resolve_now(now) / self.config.granularity_secs;

        if reader.started && tick <= reader.read_pos {
            tracing::trace!(tick, read_pos = reader.read_pos, "Tick already served");
            return Vec::new();
        }

        let first = if reader.started {
            reader.read_pos + 1
        } else {
            tick
        };
        let due = (tick - first).saturating_add(1);
        if due > 1 {
            tracing::warn!(
                skipped = due - 1,
                "Send queue reader fell behind, draining all due slices"
            );
        }

        reader.started = true;
        reader.read_pos = tick;

        let span = due.min(self.rounds);
        let mut batch = Vec::new();
        for pos in (tick - (span - 1))..=tick {
            batch.append(&mut self.slice(self.ring_index(pos)).drain());
        }
        batch
    }

    /// Messages currently queued across all slices.
    pub fn len(&self) -> usize {
        self.slices.read().iter().map(|slice| slice.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn granularity(&self) -> u64 {
        self.config.granularity_secs
    }

    pub fn window_size(&self) -> u64 {
        self.config.window_size_secs
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Last tick served, or `None` before the first read.
    pub fn read_position(&self) -> Option<u64> {
        let reader = self.reader.lock();
        reader.started.then_some(reader.read_pos)
    }

    fn slice_index(&self, send_time: u64) -> usize {
        self.ring_index(send_time / self.config.granularity_secs)
    }

    fn ring_index(&self, tick: u64) -> usize {
        // rounds <= MAX_ROUNDS, so the remainder always fits
        (tick % self.rounds) as usize
    }

    fn slice(&self, index: usize) -> Arc<TimeSlice<M>> {
        Arc::clone(&self.slices.read()[index])
    }
}

/// Current Unix time in seconds.
pub fn unix_time_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

fn resolve_now(now: u64) -> u64 {
    if now == 0 {
        unix_time_now()
    } else {
        now
    }
}
