//! Buffered domain events released on transaction outcome.
//!
//! Aggregates raise events while a unit of work is in flight. The events are
//! only handed to a publisher once the surrounding transaction commits; a
//! rollback drops them.

use crate::error::ConduitResult;

/// How the surrounding unit of work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Changes were committed; buffered events are published.
    Committed,
    /// Changes were rolled back; buffered events are discarded.
    RolledBack,
}

/// Receives events released by an [`EventBuffer`].
pub trait EventPublisher<E>: Send + Sync {
    /// Publishes one event.
    fn publish(&self, event: E) -> ConduitResult<()>;
}

impl<E, F> EventPublisher<E> for F
where
    F: Fn(E) -> ConduitResult<()> + Send + Sync,
{
    fn publish(&self, event: E) -> ConduitResult<()> {
        self(event)
    }
}

/// Events raised during a unit of work, in raise order.
///
/// # Example
///
/// ```
/// use conduit_core::events::{EventBuffer, TransactionOutcome};
/// use conduit_core::ConduitResult;
/// use std::sync::Mutex;
///
/// let published = Mutex::new(Vec::new());
/// let mut buffer = EventBuffer::new();
/// buffer.raise("user_created");
/// buffer.raise("email_queued");
///
/// let count = buffer
///     .settle(TransactionOutcome::Committed, &|e: &'static str| -> ConduitResult<()> {
///         published.lock().unwrap().push(e);
///         Ok(())
///     })
///     .unwrap();
///
/// assert_eq!(count, 2);
/// assert_eq!(*published.lock().unwrap(), vec!["user_created", "email_queued"]);
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct EventBuffer<E> {
    events: Vec<E>,
}

impl<E> EventBuffer<E> {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Buffers an event.
    pub fn raise(&mut self, event: E) {
        self.events.push(event);
    }

    /// Events raised so far, in raise order.
    #[must_use]
    pub fn pending(&self) -> &[E] {
        &self.events
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Releases or discards the buffered events.
    ///
    /// On commit, events are published in raise order and the number
    /// published is returned. Publishing stops at the first failure; that
    /// event and the ones after it are dropped. On rollback, events are
    /// discarded and `Ok(0)` is returned. The buffer is empty afterwards in
    /// both cases.
    pub fn settle<P>(&mut self, outcome: TransactionOutcome, publisher: &P) -> ConduitResult<usize>
    where
        P: EventPublisher<E> + ?Sized,
    {
        let events = std::mem::take(&mut self.events);
        match outcome {
            TransactionOutcome::RolledBack => {
                tracing::debug!(discarded = events.len(), "rollback discarded buffered events");
                Ok(0)
            }
            TransactionOutcome::Committed => {
                let total = events.len();
                for (published, event) in events.into_iter().enumerate() {
                    if let Err(error) = publisher.publish(event) {
                        tracing::warn!(published, total, error = %error, "event publication failed");
                        return Err(error);
                    }
                }
                tracing::debug!(published = total, "buffered events published");
                Ok(total)
            }
        }
    }
}

impl<E> Default for EventBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConduitError;
    use parking_lot::Mutex;

    #[test]
    fn test_rollback_discards() {
        let published = Mutex::new(Vec::new());
        let mut buffer = EventBuffer::new();
        buffer.raise(1);
        buffer.raise(2);

        let count = buffer
            .settle(TransactionOutcome::RolledBack, &|e: i32| -> ConduitResult<()> {
                published.lock().push(e);
                Ok(())
            })
            .unwrap();

        assert_eq!(count, 0);
        assert!(published.lock().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_commit_publishes_in_order() {
        let published = Mutex::new(Vec::new());
        let mut buffer = EventBuffer::new();
        for i in 0..5 {
            buffer.raise(i);
        }
        assert_eq!(buffer.pending(), &[0, 1, 2, 3, 4]);

        buffer
            .settle(TransactionOutcome::Committed, &|e: i32| -> ConduitResult<()> {
                published.lock().push(e);
                Ok(())
            })
            .unwrap();

        assert_eq!(*published.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_commit_stops_at_first_failure() {
        let published = Mutex::new(Vec::new());
        let mut buffer = EventBuffer::new();
        buffer.raise("a");
        buffer.raise("bad");
        buffer.raise("c");

        let result = buffer.settle(TransactionOutcome::Committed, &|e: &'static str| -> ConduitResult<()> {
            if e == "bad" {
                return Err(ConduitError::transient("bus unavailable"));
            }
            published.lock().push(e);
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(*published.lock(), vec!["a"]);
        assert!(buffer.is_empty());
    }
}
