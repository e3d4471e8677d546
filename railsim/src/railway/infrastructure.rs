use super::route::{RouteState, RouteStatus};
use super::succession::TrainSuccessionTable;
use super::switch::SwitchState;
use super::tvdsection::TvdSectionState;
use crate::eventsim::{Change, ChangeKind};
use crate::input::staticinfrastructure::{GroupId, StaticInfrastructure};
use serde::{Deserialize, Serialize};

/// Dynamic state of every infrastructure element, indexed like the
/// static infrastructure it was created from.
#[derive(Debug, Clone, PartialEq)]
pub struct InfraState {
    pub routes: Vec<RouteState>,
    pub tvd_sections: Vec<TvdSectionState>,
    pub switches: Vec<SwitchState>,
    pub successions: Vec<TrainSuccessionTable>,
}

impl InfraState {
    /// Everything free and clear. Switches start in their first group,
    /// succession tables impose no order.
    pub fn new(infra: &StaticInfrastructure) -> Self {
        InfraState {
            routes: vec![RouteState::default(); infra.routes.len()],
            tvd_sections: vec![TvdSectionState::default(); infra.tvd_sections.len()],
            switches: infra.switches.iter()
                .map(|_| SwitchState { group: Some(0), pending_move: None })
                .collect(),
            successions: vec![TrainSuccessionTable::default(); infra.switches.len()],
        }
    }

    pub fn snapshot(&self) -> InfraSnapshot {
        InfraSnapshot {
            routes: self.routes.iter()
                .map(|r| RouteSnapshot { status: r.status, reserving_train_count: r.reserving_train_count() })
                .collect(),
            tvd_sections: self.tvd_sections.clone(),
            switches: self.switches.iter().map(|s| s.group).collect(),
            successions: self.successions.clone(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub status: RouteStatus,
    pub reserving_train_count: u32,
}

/// The observable part of `InfraState`, which is exactly what the change
/// log describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraSnapshot {
    pub routes: Vec<RouteSnapshot>,
    pub tvd_sections: Vec<TvdSectionState>,
    pub switches: Vec<Option<GroupId>>,
    pub successions: Vec<TrainSuccessionTable>,
}

impl InfraSnapshot {
    pub fn apply(&mut self, change: &Change) {
        match change.kind {
            ChangeKind::EventCreated { .. } | ChangeKind::EventOccurred { .. } | ChangeKind::EventCancelled { .. } => {}
            ChangeKind::RouteStatus { route, status } => self.routes[route].status = status,
            ChangeKind::RouteTrainCount { route, count } => self.routes[route].reserving_train_count = count,
            ChangeKind::TvdReservation { tvd, count } => self.tvd_sections[tvd].reservation_count = count,
            ChangeKind::TvdOccupancy { tvd, occupied } => self.tvd_sections[tvd].occupied = occupied,
            ChangeKind::SwitchGroup { switch, group } => self.switches[switch] = group,
            ChangeKind::SuccessionOrder { switch, ref order } => self.successions[switch].set_order(order),
            ChangeKind::SuccessionAccepted { switch, train } => {
                self.successions[switch].accept(train);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventsim::{EventKind, Simulation};
    use crate::input::dispatch::DispatchAction;
    use crate::input::staticinfrastructure::*;
    use smallvec::SmallVec;

    #[test]
    fn folding_changes_gives_final_snapshot() {
        let mut b = InfrastructureBuilder::new();
        let a = b.waypoint("a", WaypointKind::BufferStop).unwrap();
        let z = b.waypoint("z", WaypointKind::BufferStop).unwrap();
        let t = b.tvd_section("t", &[a, z]).unwrap();
        let groups = vec![
            SwitchGroup { name: "A".to_string(), connections: SmallVec::from_slice(&[(0, 1)]) },
            SwitchGroup { name: "B".to_string(), connections: SmallVec::from_slice(&[(0, 2)]) },
        ];
        let s = b.switch("s", &["base", "a", "b"], groups, 2.0).unwrap();
        let path = [TvdSectionPath { start: a, end: z, tvd_section: t }];
        let r = b.route("r", &path, &[(s, 1)]).unwrap();
        let (inf, _) = b.build();

        let mut sim = Simulation::with_successions(&inf, 0.0, &[(s, vec![3, 4])]);
        let initial = sim.state.snapshot();
        let actions = vec![
            (1.0, DispatchAction::CbtcReserve { route: r, train: 3 }),
            (2.0, DispatchAction::CbtcReserve { route: r, train: 4 }),
            (4.0, DispatchAction::Occupy { tvd: t }),
            (5.0, DispatchAction::Unoccupy { tvd: t }),
        ];
        for (time, action) in actions {
            sim.schedule_event(time, EventKind::Dispatch(action)).unwrap();
        }
        sim.run().unwrap();

        let mut folded = initial;
        for change in sim.changes() {
            folded.apply(change);
        }
        assert_eq!(folded, sim.state.snapshot());
        assert_eq!(folded.routes[r].reserving_train_count, 1);
        assert_eq!(folded.successions[s].accepted(), &[3, 4]);
    }
}
