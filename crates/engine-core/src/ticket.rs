use crate::error::TicketError;
use std::collections::BTreeMap;

/// Sequence number of a batch, assigned once at the head of a stage.
pub type Ticket = u64;

/// Holds finished batches until every lower ticket has been released, so that
/// out-of-order completion turns into in-order delivery.
#[derive(Debug)]
pub struct TicketTracker<T> {
    next: Ticket,
    held: BTreeMap<Ticket, T>,
}

impl<T> Default for TicketTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TicketTracker<T> {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: Ticket) -> Self {
        TicketTracker {
            next: first,
            held: BTreeMap::new(),
        }
    }

    pub fn next_expected(&self) -> Ticket {
        self.next
    }

    /// Number of finished batches waiting for a lower ticket.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    pub fn is_drained(&self) -> bool {
        self.held.is_empty()
    }

    /// Registers a finished batch and returns the run of batches that can now
    /// be released, in ticket order. Empty when `ticket` is ahead of the next
    /// expected one.
    pub fn offer(&mut self, ticket: Ticket, item: T) -> Result<Vec<(Ticket, T)>, TicketError> {
        if ticket < self.next || self.held.contains_key(&ticket) {
            return Err(TicketError {
                ticket,
                expected: self.next,
            });
        }

        if ticket != self.next {
            self.held.insert(ticket, item);
            return Ok(Vec::new());
        }

        let mut ready = vec![(ticket, item)];
        self.next += 1;
        while let Some(item) = self.held.remove(&self.next) {
            ready.push((self.next, item));
            self.next += 1;
        }
        Ok(ready)
    }

    /// Drops everything still held. Used when a pipeline is torn down.
    pub fn clear(&mut self) {
        self.held.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_contiguous_runs() {
        let mut tracker = TicketTracker::new();

        assert!(tracker.offer(2, "c").unwrap().is_empty());
        assert!(tracker.offer(1, "b").unwrap().is_empty());
        assert_eq!(tracker.held(), 2);

        let ready = tracker.offer(0, "a").unwrap();
        assert_eq!(ready, vec![(0, "a"), (1, "b"), (2, "c")]);
        assert_eq!(tracker.next_expected(), 3);
        assert!(tracker.is_drained());
    }

    #[test]
    fn stops_at_first_gap() {
        let mut tracker = TicketTracker::new();
        tracker.offer(1, 1).unwrap();
        tracker.offer(3, 3).unwrap();

        let ready = tracker.offer(0, 0).unwrap();
        assert_eq!(ready, vec![(0, 0), (1, 1)]);
        assert_eq!(tracker.next_expected(), 2);
        assert_eq!(tracker.held(), 1);
    }

    #[test]
    fn rejects_duplicates() {
        let mut tracker = TicketTracker::new();
        tracker.offer(0, ()).unwrap();
        tracker.offer(5, ()).unwrap();

        assert_eq!(
            tracker.offer(0, ()).unwrap_err(),
            TicketError {
                ticket: 0,
                expected: 1
            }
        );
        assert!(tracker.offer(5, ()).is_err());
    }
}
