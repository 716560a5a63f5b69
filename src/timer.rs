// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::HashMap;

#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct EventId(u64);

impl EventId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// A scheduler to schedule and cancel timeouts.
pub trait Scheduler {
    /// Requests to schedule an event. Returns a unique ID used to cancel the
    /// scheduled event.
    fn schedule(&mut self, deadline_nanos: i64) -> EventId;
    /// Cancels a previously scheduled event. Once this returns the event can
    /// no longer fire.
    fn cancel(&mut self, id: EventId);
}

/// A timer to schedule and cancel timeouts and retrieve triggered events.
pub struct Timer<E> {
    events: HashMap<EventId, E>,
    scheduler: Box<dyn Scheduler + Send>,
}

impl<E> Timer<E> {
    pub fn new(scheduler: Box<dyn Scheduler + Send>) -> Self {
        Self { events: HashMap::default(), scheduler }
    }

    pub fn triggered(&mut self, event_id: &EventId) -> Option<E> {
        self.events.remove(event_id)
    }

    pub fn schedule_event(&mut self, deadline_nanos: i64, event: E) -> EventId {
        let event_id = self.scheduler.schedule(deadline_nanos);
        self.events.insert(event_id, event);
        event_id
    }

    /// Cancels a pending event. The cancellation is synchronous: after this
    /// returns the event is guaranteed not to trigger. Returns the pending
    /// event if one was still scheduled.
    pub fn cancel_event(&mut self, event_id: EventId) -> Option<E> {
        let event = self.events.remove(&event_id);
        self.scheduler.cancel(event_id);
        event
    }

    pub fn cancel_all(&mut self) {
        for event_id in self.events.keys() {
            self.scheduler.cancel(*event_id);
        }
        self.events.clear();
    }
}

#[cfg(test)]
pub use test_utils::*;
