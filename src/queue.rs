use std::collections::VecDeque;

use crate::error::QueueError;
use crate::types::Step;

/// Steps of one resolved gesture waiting to be sent, one at a time.
///
/// Contract:
/// - `enqueue` fills the queue once; it fails while steps are still pending.
/// - `drain_next` hands out a step only when nothing is in flight.
/// - `acknowledge` marks the in-flight step as confirmed by the server.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientMoveQueue {
    pending: VecDeque<Step>,
    in_flight: Option<Step>,
}

impl ClientMoveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, steps: Vec<Step>) -> Result<(), QueueError> {
        if steps.is_empty() {
            return Err(QueueError::Empty);
        }
        if self.is_active() {
            return Err(QueueError::Busy {
                pending: self.pending.len() + usize::from(self.in_flight.is_some()),
            });
        }
        self.pending = steps.into();
        Ok(())
    }

    pub fn drain_next(&mut self) -> Option<Step> {
        if self.in_flight.is_some() {
            return None;
        }
        let step = self.pending.pop_front()?;
        self.in_flight = Some(step);
        Some(step)
    }

    /// Confirms the in-flight step, returning it.
    pub fn acknowledge(&mut self) -> Option<Step> {
        self.in_flight.take()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight = None;
    }

    pub fn in_flight(&self) -> Option<Step> {
        self.in_flight
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// True while any step of the current gesture is pending or unconfirmed.
    pub fn is_active(&self) -> bool {
        self.in_flight.is_some() || !self.pending.is_empty()
    }
}
