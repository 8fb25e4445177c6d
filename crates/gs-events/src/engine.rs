//! Registration-ordered event queue.

use gs_core::{EventId, IdAllocator};
use tracing::{debug, warn};

use crate::event::Event;
use crate::target::{ChangeCode, TargetResolver};

/// Owns every scheduled event of a simulation.
///
/// Events due at the same instant are applied in registration order. An
/// event whose next trigger is still due after firing (repeated series
/// timestamps) fires again before the next event is considered.
#[derive(Debug, Clone, Default)]
pub struct EventEngine {
    events: Vec<Event>,
    ids: IdAllocator,
}

impl EventEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `event` and return its id.
    pub fn add(&mut self, mut event: Event) -> EventId {
        let id = self.ids.allocate();
        event.set_id(id);
        debug!(event = %event, id = %id, "event registered");
        self.events.push(event);
        id
    }

    pub fn remove(&mut self, id: EventId) -> Option<Event> {
        let pos = self.events.iter().position(|e| e.id() == Some(id))?;
        Some(self.events.remove(pos))
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|e| e.id() == Some(id))
    }

    pub fn get_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.events.iter_mut().find(|e| e.id() == Some(id))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Event> {
        self.events.iter_mut()
    }

    /// Earliest trigger time among armed events.
    pub fn next_event_time(&self) -> Option<f64> {
        self.events
            .iter()
            .filter(|e| e.is_armed())
            .map(Event::trigger_time)
            .min_by(f64::total_cmp)
    }

    /// True if any armed event is due at `time`.
    pub fn has_due(&self, time: f64) -> bool {
        self.events.iter().any(|e| e.is_due(time))
    }

    /// Apply every event due at `time`.
    ///
    /// Returns the most significant outcome: any failure wins over a
    /// change, any change over nothing.
    pub fn execute(&mut self, time: f64, resolver: &mut dyn TargetResolver) -> ChangeCode {
        let mut summary = ChangeCode::NotTriggered;
        for event in &mut self.events {
            while event.is_due(time) {
                let (before, cursor) = (event.trigger_time(), event.cursor());
                let code = event.trigger(time, resolver);
                summary = summary.max(code);
                // Same-instant series entries advance the cursor only; any
                // other non-advancing trigger stops here.
                let stalled = event.trigger_time() < before
                    || (event.trigger_time() == before && event.cursor() <= cursor);
                if event.is_armed() && stalled {
                    warn!(event = %event, time, "event did not advance, deferring");
                    break;
                }
            }
        }
        summary
    }

    /// Drop events that can never fire again. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.events.len();
        self.events.retain(|e| !e.is_finished());
        before - self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
