use super::{route, Sim};
use crate::eventsim::{ChangeKind, EventId, EventKind, SimulationError};
use crate::input::staticinfrastructure::{GroupId, SwitchId};
use log::debug;

/// An in-flight move. There is never more than one per switch.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PendingMove {
    pub event: EventId,
    pub group: GroupId,
    pub arrival: f64,
}

/// `Fixed(group)` when `group` is set, `Moving` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchState {
    pub group: Option<GroupId>,
    pub pending_move: Option<PendingMove>,
}

impl SwitchState {
    pub fn is_moving(&self) -> bool {
        self.group.is_none()
    }
}

fn check_group(sim: &Sim, switch: SwitchId, group: GroupId) -> Result<(), SimulationError> {
    if group >= sim.infra.switches[switch].groups.len() {
        return Err(SimulationError::UnknownGroup { switch, group });
    }
    Ok(())
}

/// A switch cannot leave the group a holding route requires.
fn check_unlocked(sim: &Sim, switch: SwitchId, group: GroupId) -> Result<(), SimulationError> {
    let infra = sim.infra;
    for &route in infra.routes_requiring(switch) {
        if sim.state.routes[route].is_holding() && infra.routes[route].required_group(switch) != Some(group) {
            return Err(SimulationError::SwitchLocked { switch, route });
        }
    }
    Ok(())
}

fn set_current(sim: &mut Sim, switch: SwitchId, group: Option<GroupId>) -> Result<(), SimulationError> {
    if sim.state.switches[switch].group == group {
        return Ok(());
    }
    sim.state.switches[switch].group = group;
    sim.publish_change(ChangeKind::SwitchGroup { switch, group })
}

/// Places the switch instantly, dropping any move in flight. Meant for
/// the initial setup of a scenario.
pub fn set_group(sim: &mut Sim, switch: SwitchId, group: GroupId) -> Result<(), SimulationError> {
    check_group(sim, switch, group)?;
    check_unlocked(sim, switch, group)?;
    if let Some(m) = sim.state.switches[switch].pending_move {
        sim.cancel_event(m.event)?;
    }
    set_current(sim, switch, Some(group))?;
    notify_routes(sim, switch)
}

/// Asks the switch to move to `group`. Returns `true` when it already is
/// there, otherwise the switch is (or stays) moving and the routes
/// requiring it are notified when it arrives.
///
/// A request for another group while a move is in flight replaces the
/// in-flight move: the new target arrives at the time the old one would
/// have, the remaining delay is neither restarted nor extended.
///
/// Fails with `SwitchLocked` while a holding route requires another group.
pub fn request_group(sim: &mut Sim, switch: SwitchId, group: GroupId) -> Result<bool, SimulationError> {
    check_group(sim, switch, group)?;
    if sim.state.switches[switch].group == Some(group) {
        return Ok(true);
    }
    check_unlocked(sim, switch, group)?;

    let pending = sim.state.switches[switch].pending_move;
    match pending {
        Some(m) if m.group == group => {}
        Some(m) => {
            debug!("switch {} redirected from group {} to {}", switch, m.group, group);
            sim.cancel_event(m.event)?;
            let event = sim.schedule_event(m.arrival, EventKind::SwitchMove { switch, group })?;
            sim.state.switches[switch].pending_move = Some(PendingMove { event, group, arrival: m.arrival });
        }
        None => {
            let arrival = sim.time() + sim.infra.switches[switch].group_change_delay;
            debug!("switch {} moving to group {}, arrival at {}", switch, group, arrival);
            set_current(sim, switch, None)?;
            let event = sim.schedule_event(arrival, EventKind::SwitchMove { switch, group })?;
            sim.state.switches[switch].pending_move = Some(PendingMove { event, group, arrival });
        }
    }
    Ok(false)
}

/// Handler of `EventKind::SwitchMove`.
pub fn on_move_finished(sim: &mut Sim, switch: SwitchId, group: GroupId, event: EventId) -> Result<(), SimulationError> {
    let state = &mut sim.state.switches[switch];
    if state.pending_move.map(|m| m.event) == Some(event) {
        state.pending_move = None;
    }
    set_current(sim, switch, Some(group))?;
    notify_routes(sim, switch)
}

fn notify_routes(sim: &mut Sim, switch: SwitchId) -> Result<(), SimulationError> {
    let infra = sim.infra;
    for &r in infra.routes_requiring(switch) {
        route::on_switch_moved(sim, r, switch)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventsim::Simulation;
    use crate::input::staticinfrastructure::*;
    use smallvec::SmallVec;

    fn one_switch(delay: f64) -> StaticInfrastructure {
        let mut b = InfrastructureBuilder::new();
        let groups = vec![
            SwitchGroup { name: "LEFT".to_string(), connections: SmallVec::from_slice(&[(0, 1)]) },
            SwitchGroup { name: "RIGHT".to_string(), connections: SmallVec::from_slice(&[(0, 2)]) },
        ];
        b.switch("s", &["base", "left", "right"], groups, delay).unwrap();
        b.build().0
    }

    #[test]
    fn switch_is_moving_for_the_whole_delay() {
        let inf = one_switch(10.0);
        let mut sim = Simulation::new(&inf);
        assert_eq!(sim.state.switches[0].group, Some(0));
        sim.schedule_event(4.0, EventKind::Dispatch(crate::input::dispatch::DispatchAction::RequestGroup {
            switch: 0, group: 1,
        })).unwrap();
        sim.run_until(4.0).unwrap();
        assert!(sim.state.switches[0].is_moving());
        sim.run_until(13.9).unwrap();
        assert_eq!(sim.state.switches[0].group, None);
        sim.run_until(14.0).unwrap();
        assert_eq!(sim.state.switches[0].group, Some(1));
        assert_eq!(sim.time(), 14.0);
        assert!(sim.state.switches[0].pending_move.is_none());
    }

    #[test]
    fn request_for_current_group_is_immediate() {
        let inf = one_switch(10.0);
        let mut sim = Simulation::new(&inf);
        assert!(request_group(&mut sim, 0, 0).unwrap());
        assert!(sim.is_simulation_over());
        assert!(request_group(&mut sim, 0, 5).is_err());
    }

    #[test]
    fn redirect_keeps_first_arrival() {
        let inf = one_switch(10.0);
        let mut sim = Simulation::new(&inf);
        set_group(&mut sim, 0, 1).unwrap();
        assert!(!request_group(&mut sim, 0, 0).unwrap());
        let first = sim.state.switches[0].pending_move.unwrap();
        assert_eq!(first.arrival, 10.0);

        // same target again: nothing new is scheduled
        assert!(!request_group(&mut sim, 0, 0).unwrap());
        assert_eq!(sim.state.switches[0].pending_move, Some(first));

        // a different target replaces the in-flight move
        assert!(!request_group(&mut sim, 0, 1).unwrap());
        let second = sim.state.switches[0].pending_move.unwrap();
        assert_ne!(second.event, first.event);
        assert_eq!(second.arrival, 10.0);
        assert_eq!(sim.scheduler.pending(), 1);

        sim.run().unwrap();
        assert_eq!(sim.state.switches[0].group, Some(1));
        assert_eq!(sim.time(), 10.0);
    }

    #[test]
    fn held_route_locks_its_switch() {
        let mut b = InfrastructureBuilder::new();
        let a = b.waypoint("a", WaypointKind::BufferStop).unwrap();
        let z = b.waypoint("z", WaypointKind::BufferStop).unwrap();
        let t = b.tvd_section("t", &[a, z]).unwrap();
        let groups = vec![
            SwitchGroup { name: "LEFT".to_string(), connections: SmallVec::from_slice(&[(0, 1)]) },
            SwitchGroup { name: "RIGHT".to_string(), connections: SmallVec::from_slice(&[(0, 2)]) },
        ];
        let s = b.switch("s", &["base", "left", "right"], groups, 10.0).unwrap();
        let r = b.route("r", &[TvdSectionPath { start: a, end: z, tvd_section: t }], &[(s, 1)]).unwrap();
        let (inf, _) = b.build();
        let mut sim = Simulation::new(&inf);

        route::reserve(&mut sim, r, 0).unwrap();
        // on its way to RIGHT, cannot be sent back
        match request_group(&mut sim, s, 0) {
            Err(SimulationError::SwitchLocked { switch: 0, route: 0 }) => {}
            x => panic!("unexpected {:?}", x),
        }
        assert!(set_group(&mut sim, s, 0).is_err());
        assert!(!request_group(&mut sim, s, 1).unwrap());

        sim.run().unwrap();
        assert_eq!(sim.state.switches[s].group, Some(1));
        assert_eq!(sim.state.routes[r].status, route::RouteStatus::Reserved);
        assert!(request_group(&mut sim, s, 0).is_err());
        assert!(request_group(&mut sim, s, 1).unwrap());
    }

    #[test]
    fn set_group_cancels_move_in_flight() {
        let inf = one_switch(10.0);
        let mut sim = Simulation::new(&inf);
        request_group(&mut sim, 0, 1).unwrap();
        set_group(&mut sim, 0, 0).unwrap();
        assert!(sim.state.switches[0].pending_move.is_none());
        assert!(sim.is_simulation_over());
        assert_eq!(sim.state.switches[0].group, Some(0));
    }
}
