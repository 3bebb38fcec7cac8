//! Global cycle scheduler.
//!
//! Devices register their callbacks once at init and receive an [`EventId`];
//! deferred work is queued with [`Scheduler::add_event`]. The drain itself is
//! driven from [`crate::bus::Bus::process_events`] so that callbacks can
//! borrow the whole machine.

use crate::bus::Bus;

/// Event callbacks take the machine, the event parameter and the (non-positive)
/// cycle residual at fire time.
pub type EventFn = fn(&mut Bus, i32, i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventId(usize);

#[derive(Clone, Copy, Debug)]
struct Event {
    id: EventId,
    param: i32,
    cycles_until_event: i64,
    /// Set on insertion; an event queued from inside a callback is ignored by
    /// the sweep of the drain that is currently running.
    is_new: bool,
}

/// An event that expired during a sweep, ready to be dispatched.
pub(crate) struct Fired {
    pub func: EventFn,
    pub param: i32,
    pub residual: i64,
}

pub struct Scheduler {
    registered: Vec<EventFn>,
    events: Vec<Event>,
    pub cycle_count: i64,
    pub cycles_until_next_event: i64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            registered: Vec::new(),
            events: Vec::new(),
            cycle_count: 0,
            cycles_until_next_event: i64::MAX,
        }
    }

    /// Registers an event callback, returns its ID.
    pub fn register_event(&mut self, func: EventFn) -> EventId {
        self.registered.push(func);

        EventId(self.registered.len() - 1)
    }

    /// Queues an event `cycles` from now.
    pub fn add_event(&mut self, id: EventId, param: i32, cycles: i64, reschedule: bool) {
        debug_assert!(cycles > 0);

        self.events.push(Event { id, param, cycles_until_event: cycles, is_new: true });

        if reschedule {
            self.reschedule();
        }
    }

    /// Recomputes the time of the nearest pending event.
    pub fn reschedule(&mut self) {
        self.cycles_until_next_event = self
            .events
            .iter()
            .map(|event| event.cycles_until_event)
            .min()
            .unwrap_or(i64::MAX);
    }

    /// Marks the start of a drain. Everything queued up to this point ages
    /// normally; only events inserted by callbacks of this drain keep their
    /// just-inserted flag.
    pub(crate) fn begin_drain(&mut self) {
        for event in &mut self.events {
            event.is_new = false;
        }
    }

    /// One sweep of the event set: ages every non-new event by the current
    /// cycle count and extracts the ones that expired. The caller dispatches
    /// them, rebases `cycle_count` and calls [`Self::reschedule`].
    pub(crate) fn sweep(&mut self) -> Vec<Fired> {
        let mut fired = Vec::new();

        let cycle_count = self.cycle_count;
        let registered = &self.registered;

        self.events.retain_mut(|event| {
            if !event.is_new {
                event.cycles_until_event -= cycle_count;
            }

            event.is_new = false;

            if event.cycles_until_event <= 0 {
                fired.push(Fired {
                    func: registered[event.id.0],
                    param: event.param,
                    residual: event.cycles_until_event,
                });

                false
            } else {
                true
            }
        });

        fired
    }

    /// Cycles the main loop may run before the next event is due.
    pub fn until_next_event(&self) -> i64 {
        (self.cycles_until_next_event - self.cycle_count).max(1)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop(_: &mut Bus, _: i32, _: i64) {}

    #[test]
    fn add_event_with_reschedule_tracks_minimum() {
        let mut sched = Scheduler::new();
        let id = sched.register_event(nop);

        sched.add_event(id, 0, 300, true);
        assert_eq!(sched.cycles_until_next_event, 300);

        sched.add_event(id, 0, 100, true);
        assert_eq!(sched.cycles_until_next_event, 100);

        // Not rescheduled: the minimum is stale until the next drain.
        sched.add_event(id, 0, 10, false);
        assert_eq!(sched.cycles_until_next_event, 100);

        sched.reschedule();
        assert_eq!(sched.cycles_until_next_event, 10);
    }

    #[test]
    fn sweep_extracts_expired_events_with_residual() {
        let mut sched = Scheduler::new();
        let id = sched.register_event(nop);

        sched.add_event(id, 7, 100, true);
        sched.add_event(id, 8, 250, true);

        // Drain pass at 120 elapsed cycles.
        sched.cycle_count = 120;
        sched.begin_drain();

        let fired = sched.sweep();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].param, 7);
        assert_eq!(fired[0].residual, -20);

        sched.reschedule();
        assert_eq!(sched.cycles_until_next_event, 130);
    }

    #[test]
    fn callback_inserted_events_survive_the_running_drain() {
        let mut sched = Scheduler::new();
        let id = sched.register_event(nop);

        sched.add_event(id, 0, 50, true);

        sched.cycle_count = 50;
        sched.begin_drain();

        assert_eq!(sched.sweep().len(), 1);

        // A periodic callback re-queues itself mid-drain; the same drain must
        // not age it again.
        sched.add_event(id, 0, 50, false);
        assert!(sched.sweep().is_empty());

        sched.cycle_count = 0;
        sched.reschedule();
        assert_eq!(sched.cycles_until_next_event, 50);
    }
}
