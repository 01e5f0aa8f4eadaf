//! Unbounded FIFO of clients waiting for a worker.

use crate::metrics::SalesMetrics;
use airsales_core::Client;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Queue shared by the [`ClientFactory`](crate::factory::ClientFactory)
/// and the workers. Cloning shares the same queue.
///
/// Dequeue is a non-blocking poll: each client is handed to exactly one
/// caller.
#[derive(Debug, Clone, Default)]
pub struct ClientQueue {
    queue: Arc<Mutex<VecDeque<Client>>>,
}

impl ClientQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `client`.
    pub fn push(&self, client: Client) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.push_back(client);
        SalesMetrics::record_queue_depth(queue.len());
    }

    /// Take the oldest client, if any.
    pub fn try_pop(&self) -> Option<Client> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let client = queue.pop_front();
        if client.is_some() {
            SalesMetrics::record_queue_depth(queue.len());
        }
        client
    }

    /// Clients waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when nobody is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airsales_core::ClientSequence;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn pops_in_arrival_order() {
        let sequence = ClientSequence::new();
        let queue = ClientQueue::new();
        queue.push(sequence.next_client());
        queue.push(sequence.next_client());

        assert_eq!(queue.try_pop().map(|c| c.id().value()), Some(1));
        assert_eq!(queue.try_pop().map(|c| c.id().value()), Some(2));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn concurrent_consumers_never_share_a_client() {
        let sequence = ClientSequence::new();
        let queue = ClientQueue::new();
        for _ in 0..1_000 {
            queue.push(sequence.next_client());
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(client) = queue.try_pop() {
                        taken.push(client.id().value());
                    }
                    taken
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap_or_default() {
                assert!(seen.insert(id), "client {id} delivered twice");
            }
        }
        assert_eq!(seen.len(), 1_000);
        assert!(queue.is_empty());
    }
}
