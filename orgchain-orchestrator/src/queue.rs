//! Per-agent priority queue

use orgchain_core::{Message, Priority};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

/// Heap wrapper: higher priority first, then lower sequence (older message).
#[derive(Debug)]
struct HeapEntry {
    priority: Priority,
    sequence: u64,
    message: Message,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other => other,
        }
    }
}

/// Unbounded priority queue feeding one agent's dispatch worker.
///
/// Yields the highest priority message first and, among equal priorities,
/// the one enqueued earliest. Safe to share between the producers calling
/// [`enqueue`](Self::enqueue) and the single consuming worker.
#[derive(Debug, Default)]
pub struct MessageQueue {
    heap: Mutex<BinaryHeap<HeapEntry>>,
    next_sequence: AtomicU64,
    available: Notify,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn heap(&self) -> MutexGuard<'_, BinaryHeap<HeapEntry>> {
        // The heap is never left half-modified, so a poisoned lock is still usable.
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a message. Never fails.
    pub fn enqueue(&self, message: Message) {
        let sequence = self.next_sequence.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap().push(HeapEntry {
            priority: message.priority,
            sequence,
            message,
        });
        self.available.notify_one();
    }

    /// Pop the next message without waiting.
    pub fn try_dequeue(&self) -> Option<Message> {
        self.heap().pop().map(|entry| entry.message)
    }

    /// Pop the next message, waiting up to `timeout` for one to arrive.
    /// Returns `None` on timeout.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a concurrent enqueue
            // cannot slip between the check and the wait.
            let notified = self.available.notified();
            if let Some(message) = self.try_dequeue() {
                return Some(message);
            }
            if timeout_at(deadline, notified).await.is_err() {
                return self.try_dequeue();
            }
        }
    }

    /// Current depth.
    pub fn size(&self) -> usize {
        self.heap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Remove and return every pending message in delivery order.
    pub fn drain(&self) -> Vec<Message> {
        let mut heap = self.heap();
        let mut drained = Vec::with_capacity(heap.len());
        while let Some(entry) = heap.pop() {
            drained.push(entry.message);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgchain_core::{MessageType, Payload};
    use std::sync::Arc;

    fn msg(priority: i64, tag: usize) -> Message {
        let mut content = Payload::new();
        content.insert("tag".to_string(), serde_json::json!(tag));
        Message::to("a", "b", MessageType::Notification, content).with_priority(priority)
    }

    fn tag(message: &Message) -> u64 {
        message.content["tag"].as_u64().unwrap_or(u64::MAX)
    }

    #[test]
    fn test_priority_then_fifo() {
        let queue = MessageQueue::new();
        for (i, p) in [1, 5, 3, 5, 2].into_iter().enumerate() {
            queue.enqueue(msg(p, i));
        }
        assert_eq!(queue.size(), 5);

        let order: Vec<(u8, u64)> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|m| (m.priority.value(), tag(&m)))
            .collect();
        assert_eq!(order, vec![(5, 1), (5, 3), (3, 2), (2, 4), (1, 0)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_returns_delivery_order() {
        let queue = MessageQueue::new();
        queue.enqueue(msg(1, 0));
        queue.enqueue(msg(4, 1));
        let drained: Vec<u64> = queue.drain().iter().map(tag).collect();
        assert_eq!(drained, vec![1, 0]);
        assert_eq!(queue.size(), 0);
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let queue = MessageQueue::new();
        let started = Instant::now();
        assert!(queue.dequeue(Duration::from_millis(30)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_dequeue_returns_immediately_when_available() {
        let queue = MessageQueue::new();
        queue.enqueue(msg(2, 7));
        let got = queue.dequeue(Duration::from_secs(5)).await;
        assert_eq!(got.as_ref().map(tag), Some(7));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(MessageQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(msg(3, 9));

        let got = consumer.await.ok().flatten();
        assert_eq!(got.as_ref().map(tag), Some(9));
    }
}
