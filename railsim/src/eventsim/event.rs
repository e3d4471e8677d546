use crate::input::dispatch::{DispatchAction, Expectation};
use crate::input::staticinfrastructure::{GroupId, RouteId, SwitchId};
use serde::{Deserialize, Serialize};

/// Dense index of a timeline event. Events are numbered in scheduling
/// order, so the id doubles as the insertion sequence used to break ties
/// between events scheduled at the same time.
pub type EventId = usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Pending,
    Happened,
    Cancelled,
}

/// Everything that can happen on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// A switch finishes moving to `group`.
    SwitchMove { switch: SwitchId, group: GroupId },
    /// A route retries its pending request after a succession table changed.
    RouteRequestRetry { route: RouteId },
    /// A top-level request issued by a train controller or dispatcher.
    Dispatch(DispatchAction),
    /// A check of the infrastructure state, failing the step on mismatch.
    Probe(Expectation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: EventId,
    pub time: f64,
    pub status: EventStatus,
    pub kind: EventKind,
}

impl TimelineEvent {
    pub fn is_pending(&self) -> bool {
        self.status == EventStatus::Pending
    }
}
