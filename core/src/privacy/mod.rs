// Privacy — traffic analysis resistance for outgoing hop traffic
//
// Provides the time-sliced random delay queue and its slices.

pub mod queue;
pub mod slice;

pub use queue::{unix_time_now, QueueConfig, QueueError, RandomQueue};
pub use slice::TimeSlice;
