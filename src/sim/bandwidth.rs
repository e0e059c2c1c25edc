//! Default-memory bandwidth sharing between concurrent transfers.
//!
//! # Model
//!
//! Default memory is a single channel of `bytes_per_second`. In-flight
//! asynchronous copies wait in two FIFO queues, one per direction:
//!
//! ```text
//!   read queue  (default -> alternate):  [cs0 | cs2 | cs5]
//!   write queue (alternate -> default):  [cs1 | cs4]
//! ```
//!
//! Whenever traffic flows in both directions at once, each side gets
//! exactly half of the channel, regardless of transfer sizes. As soon as
//! one side runs dry the other gets the full channel.
//!
//! [`RemainingBytes`] tracks how much of each queued copy is still to move.
//! An entry is removed, and its copy popped from its queue, the moment its
//! remaining size reaches zero or below.

use std::collections::{HashMap, VecDeque};

use crate::program::OpId;

/// FIFO of in-flight copy-starts for one direction.
pub type TransferQueue = VecDeque<OpId>;

/// Bytes still to move for each in-flight copy-start.
#[derive(Debug, Clone, Default)]
pub struct RemainingBytes {
    bytes: HashMap<OpId, f64>,
}

impl RemainingBytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, copy_start: OpId, bytes: f64) {
        self.bytes.insert(copy_start, bytes);
    }

    pub fn get(&self, copy_start: OpId) -> Option<f64> {
        self.bytes.get(&copy_start).copied()
    }

    pub fn contains(&self, copy_start: OpId) -> bool {
        self.bytes.contains_key(&copy_start)
    }

    pub fn remove(&mut self, copy_start: OpId) -> Option<f64> {
        self.bytes.remove(&copy_start)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Remaining bytes of a queued copy.
    ///
    /// # Panics
    ///
    /// Panics if `copy_start` is not tracked: every queued copy must have
    /// an entry, so a miss means the queue and table went out of sync.
    pub(crate) fn at(&self, copy_start: OpId) -> f64 {
        self.get(copy_start).unwrap_or_else(|| {
            panic!("in-flight copy {} missing from remaining-bytes table", copy_start)
        })
    }

    /// Subtract `bytes` from a queued copy.
    ///
    /// Returns true (and drops the entry) once nothing remains.
    pub(crate) fn consume(&mut self, copy_start: OpId, bytes: f64) -> bool {
        let remaining = self.bytes.get_mut(&copy_start).unwrap_or_else(|| {
            panic!("in-flight copy {} missing from remaining-bytes table", copy_start)
        });
        *remaining -= bytes;
        if *remaining <= 0.0 {
            self.bytes.remove(&copy_start);
            true
        } else {
            false
        }
    }
}

/// Time to move `bytes_to_transfer` bytes while sharing the channel with
/// the copies in `queue_to_share`.
///
/// While the queue is non-empty both sides run at half bandwidth; the front
/// copy advances by the same number of bytes and is popped once finished.
/// Whatever is left after the queue drains moves at full bandwidth.
///
/// `bytes_per_second` must be positive.
pub fn simulate_async_copy_transfer(
    bytes_to_transfer: f64,
    queue_to_share: &mut TransferQueue,
    remaining: &mut RemainingBytes,
    bytes_per_second: f64,
) -> f64 {
    let shared_bytes_per_second = 0.5 * bytes_per_second;
    let mut remaining_bytes = bytes_to_transfer;
    let mut elapsed = 0.0;

    while remaining_bytes > 0.0 {
        let Some(&front) = queue_to_share.front() else {
            break;
        };
        let moved = remaining_bytes.min(remaining.at(front));
        elapsed += moved / shared_bytes_per_second;
        remaining_bytes -= moved;
        if remaining.consume(front, moved) {
            queue_to_share.pop_front();
        }
    }

    if remaining_bytes > 0.0 {
        elapsed += remaining_bytes / bytes_per_second;
    }
    elapsed
}

/// Advance queued copies through a window of `time_window` seconds during
/// which nothing else uses default memory.
///
/// Both queue fronts share the channel while both queues are non-empty;
/// a lone queue gets the full channel. Stops when the window is used up
/// or both queues are empty. A copy cut off by the end of the window keeps
/// its reduced remaining size.
pub fn process_async_copies_in_time_window(
    time_window: f64,
    read_queue: &mut TransferQueue,
    write_queue: &mut TransferQueue,
    remaining: &mut RemainingBytes,
    bytes_per_second: f64,
) {
    let shared_bytes_per_second = 0.5 * bytes_per_second;
    let mut time_left = time_window;

    loop {
        match (read_queue.front().copied(), write_queue.front().copied()) {
            (None, None) => return,
            _ if time_left <= 0.0 => return,
            (Some(read_front), Some(write_front)) => {
                let mut moved = remaining.at(read_front).min(remaining.at(write_front));
                let mut required_time = moved / shared_bytes_per_second;
                if required_time > time_left {
                    required_time = time_left;
                    moved = required_time * shared_bytes_per_second;
                }
                time_left -= required_time;
                if remaining.consume(read_front, moved) {
                    read_queue.pop_front();
                }
                if remaining.consume(write_front, moved) {
                    write_queue.pop_front();
                }
            }
            (Some(front), None) | (None, Some(front)) => {
                let queue = if read_queue.is_empty() {
                    &mut *write_queue
                } else {
                    &mut *read_queue
                };
                let required_time = (remaining.at(front) / bytes_per_second).min(time_left);
                time_left -= required_time;
                if remaining.consume(front, required_time * bytes_per_second) {
                    queue.pop_front();
                }
            }
        }
    }
}
