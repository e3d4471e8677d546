//! Interlocking state machines: TVD sections, switches, succession tables
//! and routes. Every operation is a free function taking the simulation,
//! so that a state change can publish to the change log and schedule
//! follow-up events.

pub mod infrastructure;
pub mod route;
pub mod succession;
pub mod switch;
pub mod tvdsection;

use crate::eventsim::{self, SimulationError};
use crate::input::dispatch::{DispatchAction, Expectation};
use self::route::Reservation;
use log::info;

pub type TrainId = usize;
type Sim<'a> = eventsim::Simulation<'a>;

/// Executes a top-level request. Denied reservations are logged and
/// otherwise ignored; the dispatcher is expected to ask again.
pub fn perform(sim: &mut Sim, action: &DispatchAction) -> Result<(), SimulationError> {
    match *action {
        DispatchAction::Reserve { route, train } => {
            let outcome = route::reserve(sim, route, train)?;
            report(sim, route, train, outcome);
            Ok(())
        }
        DispatchAction::CbtcReserve { route, train } => {
            let outcome = route::cbtc_reserve(sim, route, train)?;
            report(sim, route, train, outcome);
            Ok(())
        }
        DispatchAction::Occupy { tvd } => tvdsection::occupy(sim, tvd),
        DispatchAction::Unoccupy { tvd } => tvdsection::unoccupy(sim, tvd),
        DispatchAction::RouteOccupied { route, tvd } => route::on_tvd_section_occupied(sim, route, tvd),
        DispatchAction::RouteUnoccupied { route, tvd } => route::on_tvd_section_unoccupied(sim, route, tvd),
        DispatchAction::SetGroup { switch, group } => switch::set_group(sim, switch, group),
        DispatchAction::RequestGroup { switch, group } => switch::request_group(sim, switch, group).map(|_| ()),
        DispatchAction::ChangeTrainOrder { switch, ref order } =>
            succession::change_train_order(sim, switch, order.clone()),
    }
}

fn report(sim: &Sim, route: usize, train: TrainId, outcome: Reservation) {
    if let Reservation::Denied(reason) = outcome {
        info!("@{} reservation of route {} by train {} denied: {:?}", sim.time(), route, train, reason);
    }
}

/// The same expectation, filled in with the current state.
pub fn observe(sim: &Sim, expectation: &Expectation) -> Expectation {
    let state = &sim.state;
    match *expectation {
        Expectation::RouteStatus { route, .. } =>
            Expectation::RouteStatus { route, status: state.routes[route].status },
        Expectation::RouteTrainCount { route, .. } =>
            Expectation::RouteTrainCount { route, count: state.routes[route].reserving_train_count() },
        Expectation::SwitchGroup { switch, .. } =>
            Expectation::SwitchGroup { switch, group: state.switches[switch].group },
        Expectation::TvdReservation { tvd, .. } =>
            Expectation::TvdReservation { tvd, count: state.tvd_sections[tvd].reservation_count },
        Expectation::TvdOccupied { tvd, .. } =>
            Expectation::TvdOccupied { tvd, occupied: state.tvd_sections[tvd].occupied },
        Expectation::NextTrain { switch, .. } =>
            Expectation::NextTrain { switch, train: state.successions[switch].peek_train() },
    }
}

pub fn check(sim: &Sim, expectation: &Expectation) -> Result<(), SimulationError> {
    let actual = observe(sim, expectation);
    if actual != *expectation {
        return Err(SimulationError::ExpectationFailed {
            time: sim.time(),
            expected: format!("{:?}", expectation),
            actual: format!("{:?}", actual),
        });
    }
    Ok(())
}
