// Time Slice — one bucket of the randomized delay queue
//
// Insertion shuffles the new message in with two random residents, so the
// order inside a slice says nothing about arrival order.

use crate::crypto::random::{random_permutation, random_u64_max, RandomError, SecureRandomSource};
use parking_lot::Mutex;

/// Below this occupancy there is nothing meaningful to shuffle with.
const MIN_RANDOMIZED_LEN: usize = 3;

struct SliceState<M> {
    messages: Vec<M>,
    random: SecureRandomSource,
}

/// Messages scheduled to leave during one granularity interval.
pub struct TimeSlice<M> {
    state: Mutex<SliceState<M>>,
}

impl<M> TimeSlice<M> {
    pub fn new(capacity: usize, random: SecureRandomSource) -> Self {
        Self {
            state: Mutex::new(SliceState {
                messages: Vec::with_capacity(capacity),
                random,
            }),
        }
    }

    /// Insert `message` at a random position.
    ///
    /// With at least three residents, two distinct residents `a` and `b` are
    /// picked and the three items {a, b, new} are spread over a, b and a new
    /// tail slot in random order. Randomness is drawn before the slice is
    /// touched, so a failing source leaves the slice unchanged.
    pub fn add(&self, message: M) -> Result<(), RandomError> {
        let mut state = self.state.lock();
        let SliceState { messages, random } = &mut *state;

        let count = messages.len();
        if count < MIN_RANDOMIZED_LEN {
            messages.push(message);
            return Ok(());
        }

        let first = random_u64_max(random, count as u64)? as usize;
        let second = loop {
            let candidate = random_u64_max(random, count as u64)? as usize;
            if candidate != first {
                break candidate;
            }
        };
        let order = random_permutation(random, 3)?;

        messages.push(message);
        scatter(messages, [first, second, count], &order);
        Ok(())
    }

    /// Take every queued message, leaving an empty slice sized ~10% above
    /// what was just removed.
    pub fn drain(&self) -> Vec<M> {
        let mut state = self.state.lock();
        let spare = state.messages.len() * 11 / 10;
        std::mem::replace(&mut state.messages, Vec::with_capacity(spare))
    }

    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().messages.capacity()
    }
}

/// Rearrange so that `messages[positions[k]]` ends up holding the item that
/// was at `positions[order[k]]`.
fn scatter<M>(messages: &mut [M], positions: [usize; 3], order: &[usize]) {
    // held[k]: which original item currently sits at positions[k]
    let mut held = [0usize, 1, 2];
    for slot in 0..positions.len() {
        let wanted = order[slot];
        if let Some(at) = (slot..positions.len()).find(|&i| held[i] == wanted) {
            if at != slot {
                messages.swap(positions[slot], positions[at]);
                held.swap(slot, at);
            }
        }
    }
}
