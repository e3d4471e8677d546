use super::{succession, switch, tvdsection, Sim, TrainId};
use crate::eventsim::{ChangeKind, EventId, EventKind, SimulationError};
use crate::input::staticinfrastructure::{RouteId, SwitchId, TvdSectionId};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStatus {
    Free,
    Requested,
    Reserved,
    Occupied,
    Conflict,
    CbtcRequested,
    CbtcReserved,
    CbtcOccupied,
}

impl Default for RouteStatus {
    fn default() -> Self {
        RouteStatus::Free
    }
}

impl RouteStatus {
    pub fn is_cbtc(self) -> bool {
        match self {
            RouteStatus::CbtcRequested | RouteStatus::CbtcReserved | RouteStatus::CbtcOccupied => true,
            _ => false,
        }
    }

    fn name(self) -> &'static str {
        match self {
            RouteStatus::Free => "free",
            RouteStatus::Requested => "requested",
            RouteStatus::Reserved => "reserved",
            RouteStatus::Occupied => "occupied",
            RouteStatus::Conflict => "conflict",
            RouteStatus::CbtcRequested => "cbtc-requested",
            RouteStatus::CbtcReserved => "cbtc-reserved",
            RouteStatus::CbtcOccupied => "cbtc-occupied",
        }
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for RouteStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        use self::RouteStatus::*;
        [Free, Requested, Reserved, Occupied, Conflict, CbtcRequested, CbtcReserved, CbtcOccupied]
            .iter()
            .cloned()
            .find(|st| st.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationMode {
    Classic,
    Cbtc,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// A TVD section or a switch of the route is held by another route.
    Conflict,
    /// The succession table of `switch` wants `next` to go first.
    Succession { switch: SwitchId, next: TrainId },
}

/// Outcome of a reservation request that did not violate any contract.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reservation {
    Reserved,
    /// Sections are held, switches are still moving.
    Requested,
    Denied(DenialReason),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub train: TrainId,
    pub mode: ReservationMode,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteState {
    pub status: RouteStatus,
    /// Trains holding the reservation, oldest first. More than one only
    /// under CBTC.
    pub holders: SmallVec<[TrainId; 2]>,
    pub awaiting_switches: SmallVec<[SwitchId; 2]>,
    /// Holders that entered the route. They all leave once its sections
    /// are clear.
    pub entered: u32,
    /// A request denied by a succession table, retried when it changes.
    pub pending: Option<PendingRequest>,
    pub retry: Option<EventId>,
}

impl RouteState {
    pub fn is_holding(&self) -> bool {
        !self.holders.is_empty()
    }

    pub fn reserving_train_count(&self) -> u32 {
        if self.status.is_cbtc() { self.holders.len() as u32 } else { 0 }
    }
}

fn set_status(sim: &mut Sim, route: RouteId, status: RouteStatus) -> Result<(), SimulationError> {
    if sim.state.routes[route].status == status {
        return Ok(());
    }
    sim.state.routes[route].status = status;
    sim.publish_change(ChangeKind::RouteStatus { route, status })
}

/// Classic reservation, valid only on a free route.
pub fn reserve(sim: &mut Sim, route: RouteId, train: TrainId) -> Result<Reservation, SimulationError> {
    request(sim, route, train, ReservationMode::Classic)
}

/// CBTC reservation. Several trains may hold the same route, but never
/// together with a classic reservation.
pub fn cbtc_reserve(sim: &mut Sim, route: RouteId, train: TrainId) -> Result<Reservation, SimulationError> {
    request(sim, route, train, ReservationMode::Cbtc)
}

fn request(sim: &mut Sim, route: RouteId, train: TrainId, mode: ReservationMode)
           -> Result<Reservation, SimulationError> {
    let state = &sim.state.routes[route];
    match (mode, state.status) {
        (_, RouteStatus::Conflict) => {
            info!("route {} request by train {} denied: conflict", route, train);
            return Ok(Reservation::Denied(DenialReason::Conflict));
        }
        (_, RouteStatus::Free) => {}
        (ReservationMode::Classic, s) if s.is_cbtc() =>
            return Err(SimulationError::IncompatibleReservation { route }),
        (ReservationMode::Classic, _) =>
            return Err(SimulationError::AlreadyReserved { route }),
        (ReservationMode::Cbtc, s) if !s.is_cbtc() =>
            return Err(SimulationError::IncompatibleReservation { route }),
        (ReservationMode::Cbtc, _) => {
            if state.holders.contains(&train) || state.pending.map(|p| p.train) == Some(train) {
                return Err(SimulationError::AlreadyReserved { route });
            }
        }
    }
    attempt(sim, route, train, mode)
}

fn attempt(sim: &mut Sim, route: RouteId, train: TrainId, mode: ReservationMode)
           -> Result<Reservation, SimulationError> {
    let infra = sim.infra;
    let r = &infra.routes[route];

    for &(sw, _) in &r.switch_groups {
        if let Some(next) = sim.state.successions[sw].peek_train() {
            if next != train {
                info!("route {} request by train {} waits for train {} at switch {}", route, train, next, sw);
                record_pending(sim, route, train, mode)?;
                return Ok(Reservation::Denied(DenialReason::Succession { switch: sw, next }));
            }
        }
    }

    // Nothing below can be denied.
    {
        let state = &mut sim.state.routes[route];
        if state.pending.map(|p| p.train) == Some(train) {
            state.pending = None;
        }
    }
    let was_holding = sim.state.routes[route].is_holding();
    for &(sw, _) in &r.switch_groups {
        succession::try_accept_request(sim, sw, train)?;
    }
    for &tvd in &r.sections {
        tvdsection::reserve(sim, tvd)?;
    }
    if !was_holding {
        push_conflicts(sim, route)?;
    }
    sim.state.routes[route].holders.push(train);
    if mode == ReservationMode::Cbtc {
        let count = sim.state.routes[route].holders.len() as u32;
        sim.publish_change(ChangeKind::RouteTrainCount { route, count })?;
    }

    if was_holding {
        info!("route {} shared with train {}", route, train);
        return Ok(if sim.state.routes[route].awaiting_switches.is_empty() {
            Reservation::Reserved
        } else {
            Reservation::Requested
        });
    }

    let mut awaiting = SmallVec::new();
    for &(sw, group) in &r.switch_groups {
        if !switch::request_group(sim, sw, group)? {
            awaiting.push(sw);
        }
    }
    let moving = !awaiting.is_empty();
    sim.state.routes[route].awaiting_switches = awaiting;
    let status = match (mode, moving) {
        (ReservationMode::Classic, true) => RouteStatus::Requested,
        (ReservationMode::Classic, false) => RouteStatus::Reserved,
        (ReservationMode::Cbtc, true) => RouteStatus::CbtcRequested,
        (ReservationMode::Cbtc, false) => RouteStatus::CbtcReserved,
    };
    set_status(sim, route, status)?;
    info!("route {} {} for train {}", route, status, train);
    Ok(if moving { Reservation::Requested } else { Reservation::Reserved })
}

fn record_pending(sim: &mut Sim, route: RouteId, train: TrainId, mode: ReservationMode)
                  -> Result<(), SimulationError> {
    let state = &mut sim.state.routes[route];
    match state.pending {
        Some(p) if p.train != train => return Ok(()),
        _ => state.pending = Some(PendingRequest { train, mode }),
    }
    if !state.is_holding() {
        let status = match mode {
            ReservationMode::Classic => RouteStatus::Requested,
            ReservationMode::Cbtc => RouteStatus::CbtcRequested,
        };
        set_status(sim, route, status)?;
    }
    Ok(())
}

/// Puts a pending request back on the timeline, unless it is already
/// there or the route is in conflict.
pub fn schedule_retry(sim: &mut Sim, route: RouteId) -> Result<(), SimulationError> {
    let state = &sim.state.routes[route];
    if state.pending.is_none() || state.retry.is_some() || state.status == RouteStatus::Conflict {
        return Ok(());
    }
    let event = sim.schedule_event(sim.time(), EventKind::RouteRequestRetry { route })?;
    sim.state.routes[route].retry = Some(event);
    Ok(())
}

/// Handler of `EventKind::RouteRequestRetry`.
pub fn retry_request(sim: &mut Sim, route: RouteId, event: EventId) -> Result<(), SimulationError> {
    let state = &mut sim.state.routes[route];
    if state.retry == Some(event) {
        state.retry = None;
    }
    let pending = match state.pending {
        Some(p) if state.status != RouteStatus::Conflict => p,
        _ => return Ok(()),
    };
    let outcome = attempt(sim, route, pending.train, pending.mode)?;
    debug!("route {} retried for train {}: {:?}", route, pending.train, outcome);
    Ok(())
}

fn resume_pending(sim: &mut Sim, route: RouteId) -> Result<bool, SimulationError> {
    let pending = match sim.state.routes[route].pending {
        Some(p) => p,
        None => return Ok(false),
    };
    let status = match pending.mode {
        ReservationMode::Classic => RouteStatus::Requested,
        ReservationMode::Cbtc => RouteStatus::CbtcRequested,
    };
    set_status(sim, route, status)?;
    schedule_retry(sim, route)?;
    Ok(true)
}

fn push_conflicts(sim: &mut Sim, route: RouteId) -> Result<(), SimulationError> {
    let infra = sim.infra;
    for &other in infra.conflicting_routes(route) {
        let state = &sim.state.routes[other];
        if state.is_holding() {
            continue;
        }
        match state.status {
            RouteStatus::Free | RouteStatus::Requested | RouteStatus::CbtcRequested => {
                debug!("route {} in conflict with route {}", other, route);
                set_status(sim, other, RouteStatus::Conflict)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn clear_conflicts(sim: &mut Sim, route: RouteId) -> Result<(), SimulationError> {
    let infra = sim.infra;
    for &other in infra.conflicting_routes(route) {
        if sim.state.routes[other].status != RouteStatus::Conflict {
            continue;
        }
        let blocked = infra.conflicting_routes(other).iter()
            .any(|&r| sim.state.routes[r].is_holding());
        if blocked {
            continue;
        }
        if !resume_pending(sim, other)? {
            set_status(sim, other, RouteStatus::Free)?;
        }
    }
    Ok(())
}

/// A train entered the route. Under CBTC a following train is counted
/// when it enters through the first section.
pub fn on_tvd_section_occupied(sim: &mut Sim, route: RouteId, tvd: TvdSectionId) -> Result<(), SimulationError> {
    let infra = sim.infra;
    let state = &sim.state.routes[route];
    let next = match state.status {
        RouteStatus::Reserved => RouteStatus::Occupied,
        RouteStatus::CbtcReserved => RouteStatus::CbtcOccupied,
        RouteStatus::CbtcOccupied if infra.routes[route].sections.first() == Some(&tvd)
            && (state.entered as usize) < state.holders.len() => RouteStatus::CbtcOccupied,
        RouteStatus::Occupied | RouteStatus::CbtcOccupied => return Ok(()),
        _ => return Err(SimulationError::NotReserved { route }),
    };
    sim.state.routes[route].entered += 1;
    debug!("route {} occupied at tvd section {}, {} trains in", route, tvd, sim.state.routes[route].entered);
    set_status(sim, route, next)
}

/// Releases the holders that entered once every section of the route is
/// clear. Holders still to come keep the route reserved.
pub fn on_tvd_section_unoccupied(sim: &mut Sim, route: RouteId, tvd: TvdSectionId) -> Result<(), SimulationError> {
    let state = &sim.state.routes[route];
    let status = state.status;
    if status != RouteStatus::Occupied && status != RouteStatus::CbtcOccupied {
        return Ok(());
    }
    if !state.is_holding() {
        return Err(SimulationError::NotReserved { route });
    }
    let infra = sim.infra;
    let r = &infra.routes[route];
    if r.sections.iter().any(|&s| sim.state.tvd_sections[s].occupied) {
        return Ok(());
    }

    let released = (state.entered as usize).max(1).min(state.holders.len());
    for _ in 0..released {
        for &s in &r.sections {
            tvdsection::free(sim, s)?;
        }
    }
    let state = &mut sim.state.routes[route];
    let trains: SmallVec<[TrainId; 2]> = state.holders.drain(..released).collect();
    state.entered = 0;
    let remaining = state.holders.len() as u32;
    if status.is_cbtc() {
        sim.publish_change(ChangeKind::RouteTrainCount { route, count: remaining })?;
    }
    info!("route {} released by trains {:?} after tvd section {}", route, trains, tvd);
    if remaining > 0 {
        return set_status(sim, route, RouteStatus::CbtcReserved);
    }

    sim.state.routes[route].awaiting_switches.clear();
    if !resume_pending(sim, route)? {
        set_status(sim, route, RouteStatus::Free)?;
    }
    clear_conflicts(sim, route)
}

/// A switch awaited by this route reached the group it requires.
pub fn on_switch_moved(sim: &mut Sim, route: RouteId, sw: SwitchId) -> Result<(), SimulationError> {
    let infra = sim.infra;
    let r = &infra.routes[route];
    if !sim.state.routes[route].awaiting_switches.contains(&sw)
        || sim.state.switches[sw].group != r.required_group(sw) {
        return Ok(());
    }

    sim.state.routes[route].awaiting_switches.retain(|s| *s != sw);
    if !sim.state.routes[route].awaiting_switches.is_empty() {
        return Ok(());
    }

    let next = match sim.state.routes[route].status {
        RouteStatus::Requested => RouteStatus::Reserved,
        RouteStatus::CbtcRequested => RouteStatus::CbtcReserved,
        _ => return Err(SimulationError::UnexpectedSwitchMove { route, switch: sw }),
    };
    info!("route {} switches in position", route);
    set_status(sim, route, next)
}
