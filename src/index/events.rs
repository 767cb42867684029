//! Append notifications for streaming queries

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::models::DocId;
use crate::segment::SegmentRef;

#[derive(Clone)]
pub(crate) enum IndexEvent {
    /// Docs `[from, to)` were added to `segment`
    Appended {
        segment: SegmentRef,
        from: DocId,
        to: DocId,
    },
}

/// Broadcast of index events to every live subscriber
#[derive(Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<Sender<IndexEvent>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self) -> Receiver<IndexEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Send to all subscribers, dropping those whose receiver is gone
    pub(crate) fn publish(&self, event: IndexEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldRegistry;
    use crate::segment::{MutableSegment, SegmentId};
    use std::sync::Arc;

    fn event() -> IndexEvent {
        let segment: SegmentRef = Arc::new(MutableSegment::new(
            SegmentId(0),
            0,
            Arc::new(FieldRegistry::default()),
            false,
        ));
        IndexEvent::Appended {
            segment,
            from: 0,
            to: 1,
        }
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::default();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        bus.publish(event());
        assert_eq!(bus.subscriber_count(), 1);
        assert!(matches!(kept.try_recv(), Ok(IndexEvent::Appended { to: 1, .. })));
    }
}
