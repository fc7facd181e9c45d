//! Ordered request queue with a send cursor.
//!
//! ```text
//!  front                               back
//!  [ written | written | unsent | unsent ]
//!                        ^ cursor
//! ```
//!
//! Requests before the cursor have been written and await their response.
//! Requests at or after the cursor have not been written. Insertion order is
//! never changed; settled requests leave from the front, dropped requests
//! leave from the cursor.

use std::collections::VecDeque;

use crate::dispatch::request::Request;

#[derive(Debug, Default)]
pub struct RequestQueue {
    items: VecDeque<Request>,
    cursor: usize,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: Request) {
        self.items.push_back(request);
    }

    /// All requests owned by the queue, written or not.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Written requests still waiting for their response.
    pub fn running(&self) -> usize {
        self.cursor
    }

    /// Requests not yet written.
    pub fn pending(&self) -> usize {
        self.items.len() - self.cursor
    }

    /// The next request eligible to be written.
    pub fn next_unsent(&self) -> Option<&Request> {
        self.items.get(self.cursor)
    }

    /// Mark the request at the cursor as written.
    pub fn advance(&mut self) {
        debug_assert!(self.cursor < self.items.len());
        self.cursor += 1;
    }

    /// Remove the request at the cursor without writing it.
    /// The following request shifts into its slot.
    pub fn remove_unsent(&mut self) -> Option<Request> {
        self.items.remove(self.cursor)
    }

    /// The oldest written request.
    pub fn oldest_running(&self) -> Option<&Request> {
        if self.cursor == 0 {
            return None;
        }
        self.items.front()
    }

    /// Remove the oldest written request once its response has settled.
    pub fn settle_oldest(&mut self) -> Option<Request> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.items.pop_front()
    }

    /// Remove every written request, oldest first.
    pub fn take_running(&mut self) -> Vec<Request> {
        let running = self.items.drain(..self.cursor).collect();
        self.cursor = 0;
        running
    }

    /// Remove every request, written or not, oldest first.
    pub fn take_all(&mut self) -> Vec<Request> {
        self.cursor = 0;
        self.items.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(n: usize) -> RequestQueue {
        let mut queue = RequestQueue::new();
        for i in 0..n {
            queue.push(Request::new(format!("req {i}")));
        }
        queue
    }

    #[test]
    fn cursor_partitions_running_and_pending() {
        let mut queue = queue_of(3);
        assert_eq!((queue.running(), queue.pending()), (0, 3));

        queue.advance();
        queue.advance();
        assert_eq!((queue.running(), queue.pending()), (2, 1));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn remove_unsent_shifts_next_into_slot() {
        let mut queue = queue_of(3);
        let ids: Vec<_> = queue.iter().map(Request::id).collect();
        queue.advance();

        let removed = queue.remove_unsent().unwrap();
        assert_eq!(removed.id(), ids[1]);
        assert_eq!(queue.cursor(), 1);
        assert_eq!(queue.next_unsent().map(Request::id), Some(ids[2]));
    }

    #[test]
    fn settle_oldest_requires_written_request() {
        let mut queue = queue_of(2);
        assert!(queue.settle_oldest().is_none());

        queue.advance();
        let first = queue.oldest_running().map(Request::id);
        assert_eq!(queue.settle_oldest().map(|r| r.id()), first);
        assert_eq!((queue.len(), queue.cursor()), (1, 0));
    }

    #[test]
    fn take_running_keeps_unsent() {
        let mut queue = queue_of(3);
        queue.advance();
        queue.advance();

        assert_eq!(queue.take_running().len(), 2);
        assert_eq!((queue.len(), queue.cursor()), (1, 0));
    }
}
