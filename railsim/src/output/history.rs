use crate::eventsim::{Change, ChangeKind};
use crate::input::staticinfrastructure::StaticInfrastructure;
use crate::railway::TrainId;

fn train_name(names: &[String], t: TrainId) -> String {
    names.get(t).cloned().unwrap_or_else(|| format!("#{}", t))
}

/// Prints one change per line on the following format:
/// `time kind name value`. Timeline bookkeeping (event created, occurred,
/// cancelled) is left out unless `events` is set.
pub fn summary(inf: &StaticInfrastructure, train_names: &[String], changes: &[Change], events: bool)
               -> Result<String, failure::Error> {
    use std::fmt::Write;
    let mut s = String::new();
    for change in changes {
        let t = change.time;
        match change.kind {
            ChangeKind::EventCreated { event, scheduled_time, ref kind } => if events {
                writeln!(s, "{} event {} created for {}: {:?}", t, event, scheduled_time, kind)?;
            },
            ChangeKind::EventOccurred { event } => if events {
                writeln!(s, "{} event {} occurred", t, event)?;
            },
            ChangeKind::EventCancelled { event } => if events {
                writeln!(s, "{} event {} cancelled", t, event)?;
            },
            ChangeKind::RouteStatus { route, status } =>
                writeln!(s, "{} route {} {}", t, inf.routes[route].name, status)?,
            ChangeKind::RouteTrainCount { route, count } =>
                writeln!(s, "{} route {} trains {}", t, inf.routes[route].name, count)?,
            ChangeKind::TvdReservation { tvd, count } =>
                writeln!(s, "{} tvd {} reservations {}", t, inf.tvd_sections[tvd].name, count)?,
            ChangeKind::TvdOccupancy { tvd, occupied } =>
                writeln!(s, "{} tvd {} {}", t, inf.tvd_sections[tvd].name,
                         if occupied { "occupied" } else { "clear" })?,
            ChangeKind::SwitchGroup { switch, group } => {
                let sw = &inf.switches[switch];
                let group = group.and_then(|g| sw.groups.get(g)).map(|g| g.name.as_str()).unwrap_or("moving");
                writeln!(s, "{} switch {} {}", t, sw.name, group)?;
            }
            ChangeKind::SuccessionOrder { switch, ref order } => {
                let order: Vec<String> = order.iter().map(|&tr| train_name(train_names, tr)).collect();
                writeln!(s, "{} succession {} order {}", t, inf.switches[switch].name, order.join(" "))?;
            }
            ChangeKind::SuccessionAccepted { switch, train } =>
                writeln!(s, "{} succession {} accepted {}", t, inf.switches[switch].name,
                         train_name(train_names, train))?,
        }
    }
    Ok(s)
}
