use crate::eventsim::{Change, ChangeConsumer, SimulationError};
use crate::input::staticinfrastructure::StaticInfrastructure;
use crate::railway::infrastructure::{InfraSnapshot, RouteSnapshot};
use crate::railway::tvdsection::TvdSectionState;
use failure::Error;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;

/// Writes every change as one JSON object per line.
pub struct ChangeSerializer<W: io::Write> {
    writer: W,
}

impl<W: io::Write> ChangeSerializer<W> {
    pub fn new(writer: W) -> Self {
        ChangeSerializer { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn output_error<E: std::fmt::Display>(e: E) -> SimulationError {
    SimulationError::Output(e.to_string())
}

impl<W: io::Write> ChangeConsumer for ChangeSerializer<W> {
    fn consume(&mut self, change: &Change) -> Result<(), SimulationError> {
        serde_json::to_writer(&mut self.writer, change).map_err(output_error)?;
        writeln!(self.writer).map_err(output_error)
    }

    fn finish(&mut self) -> Result<(), SimulationError> {
        self.writer.flush().map_err(output_error)
    }
}

#[derive(Serialize)]
struct NamedSuccession<'a> {
    queue: Vec<&'a str>,
    accepted: Vec<&'a str>,
}

#[derive(Serialize)]
struct NamedSnapshot<'a> {
    time: f64,
    routes: BTreeMap<&'a str, &'a RouteSnapshot>,
    tvd_sections: BTreeMap<&'a str, &'a TvdSectionState>,
    switches: BTreeMap<&'a str, Option<&'a str>>,
    successions: BTreeMap<&'a str, NamedSuccession<'a>>,
}

/// The snapshot keyed by element names, as pretty-printed JSON.
pub fn json_snapshot<W: io::Write>(inf: &StaticInfrastructure,
                                   train_names: &[String],
                                   snapshot: &InfraSnapshot,
                                   time: f64,
                                   f: &mut W)
                                   -> Result<(), Error> {
    let train = |t: &usize| train_names.get(*t).map(|n| n.as_str()).unwrap_or("?");
    let named = NamedSnapshot {
        time,
        routes: inf.routes.iter().map(|r| r.name.as_str()).zip(snapshot.routes.iter()).collect(),
        tvd_sections: inf.tvd_sections.iter().map(|t| t.name.as_str()).zip(snapshot.tvd_sections.iter()).collect(),
        switches: inf.switches.iter().zip(snapshot.switches.iter())
            .map(|(sw, g)| (sw.name.as_str(), g.and_then(|g| sw.groups.get(g)).map(|g| g.name.as_str())))
            .collect(),
        successions: inf.switches.iter().zip(snapshot.successions.iter())
            .filter(|(_, table)| !table.queue().is_empty() || !table.accepted().is_empty())
            .map(|(sw, table)| (sw.name.as_str(), NamedSuccession {
                queue: table.queue().iter().map(train).collect(),
                accepted: table.accepted().iter().map(train).collect(),
            }))
            .collect(),
    };
    serde_json::to_writer_pretty(&mut *f, &named)?;
    writeln!(f)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventsim::ChangeKind;

    #[test]
    fn one_change_per_line() {
        let mut out = ChangeSerializer::new(Vec::new());
        out.consume(&Change { time: 1.0, kind: ChangeKind::TvdOccupancy { tvd: 0, occupied: true } }).unwrap();
        out.consume(&Change { time: 2.0, kind: ChangeKind::TvdReservation { tvd: 0, count: 1 } }).unwrap();
        out.finish().unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["type"], "TvdReservation");
        assert_eq!(second["count"], 1);
    }
}
