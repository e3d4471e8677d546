use super::error::SimulationError;
use super::event::{EventId, EventKind};
use crate::input::staticinfrastructure::{GroupId, RouteId, SwitchId, TvdSectionId};
use crate::railway::route::RouteStatus;
use crate::railway::TrainId;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// One recorded state mutation. Never modified after publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub time: f64,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChangeKind {
    EventCreated { event: EventId, scheduled_time: f64, kind: EventKind },
    EventOccurred { event: EventId },
    EventCancelled { event: EventId },
    RouteStatus { route: RouteId, status: RouteStatus },
    RouteTrainCount { route: RouteId, count: u32 },
    TvdReservation { tvd: TvdSectionId, count: u32 },
    TvdOccupancy { tvd: TvdSectionId, occupied: bool },
    SwitchGroup { switch: SwitchId, group: Option<GroupId> },
    SuccessionOrder { switch: SwitchId, order: Vec<TrainId> },
    SuccessionAccepted { switch: SwitchId, train: TrainId },
}

impl ChangeKind {
    /// The kind and index of the entity this change is about.
    pub fn entity(&self) -> (&'static str, usize) {
        match *self {
            ChangeKind::EventCreated { event, .. }
            | ChangeKind::EventOccurred { event }
            | ChangeKind::EventCancelled { event } => ("event", event),
            ChangeKind::RouteStatus { route, .. } | ChangeKind::RouteTrainCount { route, .. } => ("route", route),
            ChangeKind::TvdReservation { tvd, .. } | ChangeKind::TvdOccupancy { tvd, .. } => ("tvd", tvd),
            ChangeKind::SwitchGroup { switch, .. } => ("switch", switch),
            ChangeKind::SuccessionOrder { switch, .. }
            | ChangeKind::SuccessionAccepted { switch, .. } => ("succession", switch),
        }
    }
}

/// Receives every change as it is published, in publication order.
pub trait ChangeConsumer {
    fn consume(&mut self, change: &Change) -> Result<(), SimulationError>;

    /// Called once the simulation is done.
    fn finish(&mut self) -> Result<(), SimulationError> {
        Ok(())
    }
}

/// The append-only log owned by the simulation, forwarding to consumers
/// in registration order.
#[derive(Default)]
pub struct ChangeLog {
    changes: Vec<Change>,
    consumers: Vec<Box<dyn ChangeConsumer>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_consumer(&mut self, consumer: Box<dyn ChangeConsumer>) {
        self.consumers.push(consumer);
    }

    pub fn publish(&mut self, change: Change) -> Result<(), SimulationError> {
        debug!("change published @{} {:?}", change.time, change.kind);
        self.changes.push(change);
        let change = &self.changes[self.changes.len() - 1];
        for consumer in self.consumers.iter_mut() {
            consumer.consume(change)?;
        }
        Ok(())
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn finish(&mut self) -> Result<(), SimulationError> {
        for consumer in self.consumers.iter_mut() {
            consumer.finish()?;
        }
        Ok(())
    }
}

/// In-memory array of changes, shared with whoever holds a clone.
#[derive(Clone, Default)]
pub struct ArrayChangeLog {
    changes: Rc<RefCell<Vec<Change>>>,
}

impl ArrayChangeLog {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.changes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.borrow().is_empty()
    }

    pub fn to_vec(&self) -> Vec<Change> {
        self.changes.borrow().clone()
    }

    pub fn take(&self) -> Vec<Change> {
        self.changes.replace(Vec::new())
    }
}

impl ChangeConsumer for ArrayChangeLog {
    fn consume(&mut self, change: &Change) -> Result<(), SimulationError> {
        self.changes.borrow_mut().push(change.clone());
        Ok(())
    }
}

/// Compares each published change with a previously recorded log.
/// Any difference means the kernel is not deterministic.
pub struct ChangeReplayChecker {
    expected: Vec<Change>,
    position: usize,
}

impl ChangeReplayChecker {
    pub fn new(expected: Vec<Change>) -> Self {
        ChangeReplayChecker { expected, position: 0 }
    }
}

impl ChangeConsumer for ChangeReplayChecker {
    fn consume(&mut self, change: &Change) -> Result<(), SimulationError> {
        let index = self.position;
        match self.expected.get(index) {
            Some(expected) if expected == change => {
                self.position += 1;
                Ok(())
            }
            Some(expected) => Err(SimulationError::ReplayMismatch {
                index,
                expected: format!("{:?}", expected),
                actual: format!("{:?}", change),
            }),
            None => Err(SimulationError::ReplayMismatch {
                index,
                expected: "end of log".to_string(),
                actual: format!("{:?}", change),
            }),
        }
    }

    fn finish(&mut self) -> Result<(), SimulationError> {
        if self.position != self.expected.len() {
            return Err(SimulationError::ReplayIncomplete {
                consumed: self.position,
                expected: self.expected.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupancy(time: f64, tvd: usize, occupied: bool) -> Change {
        Change { time, kind: ChangeKind::TvdOccupancy { tvd, occupied } }
    }

    #[test]
    fn consumers_see_changes_in_order() {
        let array = ArrayChangeLog::new();
        let mut log = ChangeLog::new();
        log.add_consumer(Box::new(array.clone()));
        log.publish(occupancy(0.0, 1, true)).unwrap();
        log.publish(occupancy(1.0, 1, false)).unwrap();
        assert_eq!(array.to_vec(), log.changes().to_vec());
        assert_eq!(array.len(), 2);
    }

    #[test]
    fn replay_checker_detects_divergence() {
        let mut checker = ChangeReplayChecker::new(vec![occupancy(0.0, 1, true), occupancy(1.0, 1, false)]);
        checker.consume(&occupancy(0.0, 1, true)).unwrap();
        match checker.consume(&occupancy(1.0, 2, false)) {
            Err(SimulationError::ReplayMismatch { index: 1, .. }) => {}
            x => panic!("unexpected {:?}", x),
        }
        match checker.finish() {
            Err(SimulationError::ReplayIncomplete { consumed: 1, expected: 2 }) => {}
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn replay_checker_rejects_extra_changes() {
        let mut checker = ChangeReplayChecker::new(vec![]);
        assert!(checker.consume(&occupancy(0.0, 0, true)).is_err());
    }

    #[test]
    fn change_serializes_flat() {
        let change = Change { time: 3.0, kind: ChangeKind::RouteStatus { route: 2, status: RouteStatus::Conflict } };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["type"], "RouteStatus");
        assert_eq!(json["route"], 2);
        assert_eq!(json["time"], 3.0);
        let back: Change = serde_json::from_value(json).unwrap();
        assert_eq!(back, change);
    }
}
