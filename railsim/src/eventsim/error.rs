use super::event::EventId;
use crate::input::staticinfrastructure::{GroupId, RouteId, SwitchId, TvdSectionId};

/// Contract violations and fatal kernel failures.
///
/// A request that is merely denied (route in conflict, succession table
/// waiting for another train) is not an error, see
/// `railway::route::Reservation`.
#[derive(Debug, Fail)]
pub enum SimulationError {
    #[fail(display = "cannot schedule an event at {} before the current time {}", time, now)]
    InvalidTime { time: f64, now: f64 },
    #[fail(display = "event {} is not pending", event)]
    EventNotPending { event: EventId },
    #[fail(display = "unknown event {}", event)]
    UnknownEvent { event: EventId },
    #[fail(display = "route {} is already reserved", route)]
    AlreadyReserved { route: RouteId },
    #[fail(display = "route {} is held by a reservation of the other mode (cbtc/classic)", route)]
    IncompatibleReservation { route: RouteId },
    #[fail(display = "route {} is not reserved", route)]
    NotReserved { route: RouteId },
    #[fail(display = "tvd section {} has no reservation to free", tvd)]
    TvdNotReserved { tvd: TvdSectionId },
    #[fail(display = "switch {} has no group {}", switch, group)]
    UnknownGroup { switch: SwitchId, group: GroupId },
    #[fail(display = "switch {} is locked by route {}", switch, route)]
    SwitchLocked { switch: SwitchId, route: RouteId },
    #[fail(display = "route {} was notified of switch {} while not requested", route, switch)]
    UnexpectedSwitchMove { route: RouteId, switch: SwitchId },
    #[fail(display = "expectation failed at {}: {} (actual: {})", time, expected, actual)]
    ExpectationFailed { time: f64, expected: String, actual: String },
    #[fail(display = "replay diverged at change {}: expected {}, got {}", index, expected, actual)]
    ReplayMismatch { index: usize, expected: String, actual: String },
    #[fail(display = "replay stopped after {} of {} recorded changes", consumed, expected)]
    ReplayIncomplete { consumed: usize, expected: usize },
    #[fail(display = "change output failed: {}", _0)]
    Output(String),
}
