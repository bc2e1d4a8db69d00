use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Why a submission could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The queue is at capacity; the caller should reject the submission.
    Saturated,
    /// The submission is already queued or in flight. One judging task per
    /// submission id, enforced here rather than by every caller.
    Duplicate,
}

struct Inner {
    queue: VecDeque<String>,
    in_flight: HashSet<String>,
}

/// Bounded dispatch queue feeding the judging workers.
///
/// Backpressure is explicit: `try_push` fails when the queue is saturated
/// instead of growing without bound. A submission id stays tracked from push
/// until its worker calls `finish`, so it can never be dispatched twice.
pub struct JobQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                in_flight: HashSet::new(),
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn try_push(&self, submission_id: String) -> Result<(), PushError> {
        {
            let mut inner = self.inner.lock();
            if inner.queue.contains(&submission_id) || inner.in_flight.contains(&submission_id) {
                return Err(PushError::Duplicate);
            }
            if inner.queue.len() >= self.capacity {
                return Err(PushError::Saturated);
            }
            inner.queue.push_back(submission_id);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Waits for the next submission id. The id is held as in-flight until
    /// `finish` releases it.
    pub async fn pop(&self) -> String {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(id) = inner.queue.pop_front() {
                    inner.in_flight.insert(id.clone());
                    return id;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Releases the in-flight slot once the judging task reached its
    /// terminal write.
    pub fn finish(&self, submission_id: &str) {
        self.inner.lock().in_flight.remove(submission_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_in_submission_order() {
        let queue = JobQueue::new(8);
        queue.try_push("a".to_string()).unwrap();
        queue.try_push("b".to_string()).unwrap();
        queue.try_push("c".to_string()).unwrap();

        assert_eq!(queue.pop().await, "a");
        assert_eq!(queue.pop().await, "b");
        assert_eq!(queue.pop().await, "c");
    }

    #[tokio::test]
    async fn saturation_rejects_new_submissions() {
        let queue = JobQueue::new(2);
        queue.try_push("a".to_string()).unwrap();
        queue.try_push("b".to_string()).unwrap();
        assert_eq!(queue.try_push("c".to_string()), Err(PushError::Saturated));

        // Capacity frees up once a queued id is consumed
        let _ = queue.pop().await;
        queue.try_push("c".to_string()).unwrap();
    }

    #[tokio::test]
    async fn in_flight_ids_cannot_be_redispatched() {
        let queue = JobQueue::new(8);
        queue.try_push("a".to_string()).unwrap();
        assert_eq!(queue.try_push("a".to_string()), Err(PushError::Duplicate));

        let id = queue.pop().await;
        assert_eq!(id, "a");
        // Still in flight, still not re-dispatchable
        assert_eq!(queue.try_push("a".to_string()), Err(PushError::Duplicate));

        queue.finish(&id);
        queue.try_push("a".to_string()).unwrap();
    }

    #[tokio::test]
    async fn pop_wakes_up_on_push() {
        let queue = std::sync::Arc::new(JobQueue::new(8));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::task::yield_now().await;
        queue.try_push("wake".to_string()).unwrap();
        assert_eq!(waiter.await.unwrap(), "wake");
    }
}
