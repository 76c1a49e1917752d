use log::debug;
use std::collections::{HashSet, VecDeque};

pub const MAX_EVENT_IDS: usize = 1000;

/// The most recent event ids a store has applied, bounded FIFO (not LRU).
#[derive(Debug, Default)]
pub struct RecentEventIds {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentEventIds {
    /// True the first time `event_id` is offered; it is then remembered.
    /// Events that carry no id cannot be deduplicated and always pass.
    pub fn first_sighting(&mut self, event_id: Option<&str>) -> bool {
        let Some(event_id) = event_id else {
            return true;
        };
        if self.seen.contains(event_id) {
            debug!("dropping duplicate event {}", event_id);
            return false;
        }

        self.seen.insert(event_id.to_owned());
        self.order.push_back(event_id.to_owned());
        if self.order.len() > MAX_EVENT_IDS {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_sighting_is_rejected() {
        let mut ids = RecentEventIds::default();
        assert!(ids.first_sighting(Some("e-1")));
        assert!(!ids.first_sighting(Some("e-1")));
        assert!(ids.first_sighting(Some("e-2")));
        assert!(ids.first_sighting(None));
        assert!(ids.first_sighting(None));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn evicts_the_oldest_id_first() {
        let mut ids = RecentEventIds::default();
        for n in 0..MAX_EVENT_IDS {
            assert!(ids.first_sighting(Some(&format!("e-{}", n))));
        }
        assert_eq!(ids.len(), MAX_EVENT_IDS);

        assert!(ids.first_sighting(Some("overflow")));
        assert_eq!(ids.len(), MAX_EVENT_IDS);
        // e-0 fell out of the window, e-1 did not.
        assert!(!ids.first_sighting(Some("e-1")));
        assert!(ids.first_sighting(Some("e-0")));
    }
}
