use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;
use std::cmp::Ordering;
use log::{debug, trace};

use super::changelog::{Change, ChangeConsumer, ChangeKind, ChangeLog};
use super::error::SimulationError;
use super::event::{EventId, EventKind, EventStatus, TimelineEvent};
use crate::input::staticinfrastructure::{StaticInfrastructure, SwitchId};
use crate::railway::{self, infrastructure::InfraState, TrainId};

#[derive(Eq, PartialEq, Debug)]
pub struct QueuedEvent {
    pub time: OrderedFloat<f64>,
    pub event: EventId,
}

impl Ord for QueuedEvent {
    fn cmp(&self, other :&QueuedEvent) -> Ordering {
        // Note that the order is flipped on purpose -- to turn
        // the (maximum) BinaryHeap into a minimum heap.
        other.time.cmp(&self.time).
            then_with(|| other.event.cmp(&self.event))
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self,other :&QueuedEvent) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The timeline: every event ever scheduled, and a queue of the pending
/// ones ordered by `(time, insertion sequence)`.
#[derive(Default)]
pub struct Scheduler {
    time: OrderedFloat<f64>,
    events: Vec<TimelineEvent>,
    queue: BinaryHeap<QueuedEvent>,
    pending: usize,
    /// Popped event whose handler is running.
    current: Option<EventId>,
}

impl Scheduler {
    pub fn new(start_time: f64) -> Self {
        Scheduler { time: OrderedFloat(start_time), ..Default::default() }
    }

    pub fn time(&self) -> f64 {
        self.time.0
    }

    pub fn event(&self, id: EventId) -> Option<&TimelineEvent> {
        self.events.get(id)
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    fn insert(&mut self, time: f64, kind: EventKind) -> Result<EventId, SimulationError> {
        if !(time >= self.time.0) {
            return Err(SimulationError::InvalidTime { time, now: self.time.0 });
        }
        let id = self.events.len();
        self.events.push(TimelineEvent { id, time, status: EventStatus::Pending, kind });
        self.queue.push(QueuedEvent { time: OrderedFloat(time), event: id });
        self.pending += 1;
        trace!("scheduled event {} at {}", id, time);
        Ok(id)
    }

    fn cancel(&mut self, id: EventId) -> Result<EventKind, SimulationError> {
        let event = self.events.get_mut(id).ok_or(SimulationError::UnknownEvent { event: id })?;
        if !event.is_pending() || self.current == Some(id) {
            return Err(SimulationError::EventNotPending { event: id });
        }
        // The queue entry stays behind and is skipped when popped.
        event.status = EventStatus::Cancelled;
        self.pending -= 1;
        Ok(event.kind.clone())
    }

    fn drop_cancelled(&mut self) {
        while let Some(&QueuedEvent { event, .. }) = self.queue.peek() {
            if self.events[event].is_pending() {
                break;
            }
            self.queue.pop();
        }
    }

    fn peek(&mut self) -> Option<&TimelineEvent> {
        self.drop_cancelled();
        match self.queue.peek() {
            Some(qe) => Some(&self.events[qe.event]),
            None => None,
        }
    }

    /// Removes the next pending event and moves the clock to it. The event
    /// stays pending, but cannot be cancelled, until `mark_happened`.
    fn pop(&mut self) -> Option<TimelineEvent> {
        self.drop_cancelled();
        let qe = self.queue.pop()?;
        debug!("changing the simulation clock from {} to {}", self.time.0, qe.time.0);
        self.time = qe.time;
        self.pending -= 1;
        self.current = Some(qe.event);
        Some(self.events[qe.event].clone())
    }

    fn mark_happened(&mut self, id: EventId) {
        self.events[id].status = EventStatus::Happened;
        self.current = None;
    }
}

/// The simulation kernel. Owns the timeline, the change log and the
/// dynamic infrastructure state; the static infrastructure is borrowed.
pub struct Simulation<'a> {
    pub infra: &'a StaticInfrastructure,
    pub state: InfraState,
    pub scheduler: Scheduler,
    log: ChangeLog,
}

impl<'a> Simulation<'a> {
    pub fn new(infra: &'a StaticInfrastructure) -> Self {
        Self::with_successions(infra, 0.0, &[])
    }

    /// Creates a simulation starting at `start_time`, with the given
    /// initial train order on some switches.
    pub fn with_successions(infra: &'a StaticInfrastructure,
                            start_time: f64,
                            successions: &[(SwitchId, Vec<TrainId>)]) -> Self {
        let mut state = InfraState::new(infra);
        for (sw, order) in successions {
            state.successions[*sw] = railway::succession::TrainSuccessionTable::new(order.iter().cloned());
        }
        Simulation {
            infra,
            state,
            scheduler: Scheduler::new(start_time),
            log: ChangeLog::new(),
        }
    }

    pub fn time(&self) -> f64 {
        self.scheduler.time()
    }

    pub fn add_consumer(&mut self, consumer: Box<dyn ChangeConsumer>) {
        self.log.add_consumer(consumer);
    }

    pub fn changes(&self) -> &[Change] {
        self.log.changes()
    }

    pub fn publish_change(&mut self, kind: ChangeKind) -> Result<(), SimulationError> {
        let change = Change { time: self.time(), kind };
        self.log.publish(change)
    }

    pub fn schedule_event(&mut self, time: f64, kind: EventKind) -> Result<EventId, SimulationError> {
        let id = self.scheduler.insert(time, kind.clone())?;
        self.publish_change(ChangeKind::EventCreated { event: id, scheduled_time: time, kind })?;
        Ok(id)
    }

    pub fn cancel_event(&mut self, id: EventId) -> Result<(), SimulationError> {
        let kind = self.scheduler.cancel(id)?;
        self.publish_change(ChangeKind::EventCancelled { event: id })?;
        self.on_cancellation(id, &kind);
        Ok(())
    }

    pub fn is_simulation_over(&self) -> bool {
        self.scheduler.pending() == 0
    }

    pub fn peek_next_event(&mut self) -> Option<&TimelineEvent> {
        self.scheduler.peek()
    }

    /// Executes the next event: runs its handler, then marks it as happened
    /// and publishes `EventOccurred`, so the handler's changes come first in
    /// the log. A handler error is returned as is, the event is marked as
    /// happened but its occurrence is not published.
    pub fn step(&mut self) -> Result<Option<TimelineEvent>, SimulationError> {
        let mut event = match self.scheduler.pop() {
            Some(ev) => ev,
            None => return Ok(None),
        };
        let outcome = self.on_occurrence(event.id, &event.kind);
        self.scheduler.mark_happened(event.id);
        outcome?;
        event.status = EventStatus::Happened;
        self.publish_change(ChangeKind::EventOccurred { event: event.id })?;
        Ok(Some(event))
    }

    pub fn run(&mut self) -> Result<(), SimulationError> {
        while let Some(_) = self.step()? {}
        Ok(())
    }

    /// Executes every event scheduled at or before `time`.
    pub fn run_until(&mut self, time: f64) -> Result<(), SimulationError> {
        loop {
            match self.peek_next_event() {
                Some(ev) if ev.time <= time => {}
                _ => return Ok(()),
            }
            self.step()?;
        }
    }

    /// Lets the change consumers flush or verify what they received.
    pub fn finish(&mut self) -> Result<(), SimulationError> {
        self.log.finish()
    }

    fn on_occurrence(&mut self, id: EventId, kind: &EventKind) -> Result<(), SimulationError> {
        match *kind {
            EventKind::SwitchMove { switch, group } =>
                railway::switch::on_move_finished(self, switch, group, id),
            EventKind::RouteRequestRetry { route } =>
                railway::route::retry_request(self, route, id),
            EventKind::Dispatch(ref action) =>
                railway::perform(self, action),
            EventKind::Probe(ref expectation) =>
                railway::check(self, expectation),
        }
    }

    fn on_cancellation(&mut self, id: EventId, kind: &EventKind) {
        match *kind {
            EventKind::SwitchMove { switch, .. } => {
                let state = &mut self.state.switches[switch];
                if state.pending_move.map(|m| m.event) == Some(id) {
                    state.pending_move = None;
                }
            }
            EventKind::RouteRequestRetry { route } => {
                let state = &mut self.state.routes[route];
                if state.retry == Some(id) {
                    state.retry = None;
                }
            }
            EventKind::Dispatch(_) | EventKind::Probe(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::dispatch::{DispatchAction, Expectation};
    use crate::input::staticinfrastructure::InfrastructureBuilder;

    fn probe() -> EventKind {
        EventKind::Probe(Expectation::TvdOccupied { tvd: 0, occupied: false })
    }

    fn empty() -> StaticInfrastructure {
        let mut b = InfrastructureBuilder::new();
        let a = b.waypoint("a", crate::input::staticinfrastructure::WaypointKind::BufferStop).unwrap();
        b.tvd_section("t", &[a]).unwrap();
        b.build().0
    }

    #[test]
    fn test_ordering() {
        let mut p = BinaryHeap::new();
        p.push(QueuedEvent { time: OrderedFloat::from(123.0), event: 0 });
        p.push(QueuedEvent { time: OrderedFloat::from(0.0), event: 1 });
        p.push(QueuedEvent { time: OrderedFloat::from(122.0), event: 2 });
        p.push(QueuedEvent { time: OrderedFloat::from(0.0), event: 3 });
        assert_eq!(p.pop().unwrap().event, 1);
        assert_eq!(p.pop().unwrap().event, 3);
        assert_eq!(p.pop().unwrap().time.0, 122.0);
        assert_eq!(p.pop().unwrap().time.0, 123.0);
    }

    #[test]
    fn events_at_same_time_keep_insertion_order() {
        let inf = empty();
        let mut sim = Simulation::new(&inf);
        let a = sim.schedule_event(5.0, probe()).unwrap();
        let b = sim.schedule_event(1.0, probe()).unwrap();
        let c = sim.schedule_event(5.0, probe()).unwrap();
        let order: Vec<EventId> = std::iter::from_fn(|| sim.step().unwrap()).map(|e| e.id).collect();
        assert_eq!(order, vec![b, a, c]);
        assert_eq!(sim.time(), 5.0);
        assert!(sim.is_simulation_over());
    }

    #[test]
    fn rejects_events_in_the_past() {
        let inf = empty();
        let mut sim = Simulation::with_successions(&inf, 10.0, &[]);
        match sim.schedule_event(9.0, probe()) {
            Err(SimulationError::InvalidTime { .. }) => {}
            x => panic!("unexpected {:?}", x),
        }
        assert!(sim.schedule_event(10.0, probe()).is_ok());
        assert!(sim.schedule_event(std::f64::NAN, probe()).is_err());
    }

    #[test]
    fn cancelled_events_never_happen() {
        let inf = empty();
        let mut sim = Simulation::new(&inf);
        let a = sim.schedule_event(1.0, probe()).unwrap();
        let b = sim.schedule_event(2.0, probe()).unwrap();
        sim.cancel_event(a).unwrap();
        assert!(sim.cancel_event(a).is_err());
        assert_eq!(sim.step().unwrap().map(|e| e.id), Some(b));
        assert!(sim.cancel_event(b).is_err());
        assert!(sim.step().unwrap().is_none());
        assert_eq!(sim.scheduler.event(a).unwrap().status, EventStatus::Cancelled);
        assert_eq!(sim.scheduler.event(b).unwrap().status, EventStatus::Happened);

        let kinds: Vec<_> = sim.changes().iter().map(|c| c.kind.entity()).collect();
        assert_eq!(kinds, vec![("event", a), ("event", b), ("event", a), ("event", b)]);
    }

    #[test]
    fn run_until_stops_at_bound() {
        let inf = empty();
        let mut sim = Simulation::new(&inf);
        sim.schedule_event(1.0, probe()).unwrap();
        sim.schedule_event(3.0, probe()).unwrap();
        sim.run_until(2.0).unwrap();
        assert_eq!(sim.time(), 1.0);
        assert!(!sim.is_simulation_over());
        sim.run().unwrap();
        assert_eq!(sim.time(), 3.0);
    }

    #[test]
    fn handler_changes_precede_occurrence() {
        let inf = empty();
        let mut sim = Simulation::new(&inf);
        let id = sim.schedule_event(1.0, EventKind::Dispatch(DispatchAction::Occupy { tvd: 0 })).unwrap();
        let event = sim.step().unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Happened);
        assert_eq!(sim.scheduler.event(id).unwrap().status, EventStatus::Happened);
        let kinds: Vec<_> = sim.changes().iter().map(|c| c.kind.clone()).collect();
        assert_eq!(kinds[1..].to_vec(), vec![
            ChangeKind::TvdOccupancy { tvd: 0, occupied: true },
            ChangeKind::EventOccurred { event: id },
        ]);
    }

    #[test]
    fn handler_errors_propagate() {
        let inf = empty();
        let mut sim = Simulation::new(&inf);
        sim.schedule_event(1.0, EventKind::Probe(Expectation::TvdOccupied { tvd: 0, occupied: true })).unwrap();
        sim.schedule_event(2.0, probe()).unwrap();
        match sim.step() {
            Err(SimulationError::ExpectationFailed { .. }) => {}
            x => panic!("unexpected {:?}", x),
        }
        assert!(!sim.is_simulation_over());
    }
}
