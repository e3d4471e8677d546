use super::{route, Sim};
use crate::eventsim::{ChangeKind, SimulationError};
use crate::input::staticinfrastructure::TvdSectionId;
use serde::{Deserialize, Serialize};

/// Reservation counter and physical occupancy of one detection section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TvdSectionState {
    pub reservation_count: u32,
    pub occupied: bool,
}

impl TvdSectionState {
    pub fn is_reserved(&self) -> bool {
        self.reservation_count > 0
    }
}

pub fn reserve(sim: &mut Sim, tvd: TvdSectionId) -> Result<(), SimulationError> {
    let state = &mut sim.state.tvd_sections[tvd];
    state.reservation_count += 1;
    let count = state.reservation_count;
    sim.publish_change(ChangeKind::TvdReservation { tvd, count })
}

pub fn free(sim: &mut Sim, tvd: TvdSectionId) -> Result<(), SimulationError> {
    let state = &mut sim.state.tvd_sections[tvd];
    if state.reservation_count == 0 {
        return Err(SimulationError::TvdNotReserved { tvd });
    }
    state.reservation_count -= 1;
    let count = state.reservation_count;
    sim.publish_change(ChangeKind::TvdReservation { tvd, count })
}

/// A train entered the section. Every route holding a reservation over
/// it is told, in ascending route order.
pub fn occupy(sim: &mut Sim, tvd: TvdSectionId) -> Result<(), SimulationError> {
    if sim.state.tvd_sections[tvd].occupied {
        return Ok(());
    }
    sim.state.tvd_sections[tvd].occupied = true;
    sim.publish_change(ChangeKind::TvdOccupancy { tvd, occupied: true })?;

    let infra = sim.infra;
    for &r in infra.routes_crossing(tvd) {
        if sim.state.routes[r].is_holding() {
            route::on_tvd_section_occupied(sim, r, tvd)?;
        }
    }
    Ok(())
}

/// The section became clear. Clearing an already clear section does
/// nothing, as the tracker may report exits late.
pub fn unoccupy(sim: &mut Sim, tvd: TvdSectionId) -> Result<(), SimulationError> {
    if !sim.state.tvd_sections[tvd].occupied {
        return Ok(());
    }
    sim.state.tvd_sections[tvd].occupied = false;
    sim.publish_change(ChangeKind::TvdOccupancy { tvd, occupied: false })?;

    let infra = sim.infra;
    for &r in infra.routes_crossing(tvd) {
        if sim.state.routes[r].is_holding() {
            route::on_tvd_section_unoccupied(sim, r, tvd)?;
        }
    }
    Ok(())
}
