use crate::eventsim::EventKind;
use crate::input::staticinfrastructure::*;
use crate::railway::route::RouteStatus;
use crate::railway::TrainId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

/// A top-level request, as issued by a train controller, a dispatcher or
/// a train detection system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DispatchAction {
    Reserve { route: RouteId, train: TrainId },
    CbtcReserve { route: RouteId, train: TrainId },
    Occupy { tvd: TvdSectionId },
    Unoccupy { tvd: TvdSectionId },
    RouteOccupied { route: RouteId, tvd: TvdSectionId },
    RouteUnoccupied { route: RouteId, tvd: TvdSectionId },
    SetGroup { switch: SwitchId, group: GroupId },
    RequestGroup { switch: SwitchId, group: GroupId },
    ChangeTrainOrder { switch: SwitchId, order: Vec<TrainId> },
}

/// An expected value of one piece of infrastructure state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expectation {
    RouteStatus { route: RouteId, status: RouteStatus },
    RouteTrainCount { route: RouteId, count: u32 },
    /// `None` while the switch is moving.
    SwitchGroup { switch: SwitchId, group: Option<GroupId> },
    TvdReservation { tvd: TvdSectionId, count: u32 },
    TvdOccupied { tvd: TvdSectionId, occupied: bool },
    NextTrain { switch: SwitchId, train: Option<TrainId> },
}

#[derive(Debug, Fail)]
pub enum ParseError {
    #[fail(display = "error in regular expression: {}", _0)]
    RegexError(String),
    #[fail(display = "error converting number")]
    NumberError,
    #[fail(display = "unknown {}: {}", _0, _1)]
    UnknownName(&'static str, String),
    #[fail(display = "unrecognized scenario line: {}", _0)]
    Unrecognized(String),
    #[fail(display = "invalid infrastructure: {}", _0)]
    Infra(#[cause] InfraError),
}

impl From<InfraError> for ParseError {
    fn from(e: InfraError) -> Self {
        ParseError::Infra(e)
    }
}

/// A small infrastructure together with timed requests and checks.
#[derive(Debug)]
pub struct Scenario {
    pub infra: StaticInfrastructure,
    pub names: InfNames,
    pub train_names: Vec<String>,
    pub successions: Vec<(SwitchId, Vec<TrainId>)>,
    pub dispatch: Vec<(f64, EventKind)>,
}

#[derive(Default)]
struct Trains {
    names: Vec<String>,
    ids: HashMap<String, TrainId>,
}

impl Trains {
    fn id(&mut self, name: &str) -> TrainId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }
}

fn lookup(map: &NameMap, kind: &'static str, name: &str) -> Result<usize, ParseError> {
    map.get(name).cloned().ok_or_else(|| ParseError::UnknownName(kind, name.to_string()))
}

fn number<T: std::str::FromStr>(s: &str) -> Result<T, ParseError> {
    s.parse::<T>().map_err(|_e| ParseError::NumberError)
}

fn group(b: &InfrastructureBuilder, sw: SwitchId, name: &str) -> Result<GroupId, ParseError> {
    b.switch_group(sw, name).ok_or_else(|| ParseError::UnknownName("switch group", name.to_string()))
}

/// Parses the scenario format. Names must be declared before use, train
/// names are declared on first mention.
///
/// * detector D1
/// * bufferstop A
/// * tvd T1 A D1
/// * switch S1 delay=10 ports=base,left,right groups=LEFT:base-left,RIGHT:base-right
/// * route R1 path=A-D1@T1,D1-B@T2 switches=S1:LEFT
/// * train t1
/// * succession S1 t1 t2
/// * at 10 reserve R1 t1
/// * at 10 cbtc R1 t1
/// * at 12 occupy T1 / at 14 unoccupy T1
/// * at 12 route-occupied R1 T1 / at 14 route-unoccupied R1 T1
/// * at 0 setgroup S1 LEFT / at 0 requestgroup S1 RIGHT
/// * at 5 order S1 t2 t1
/// * at 11 expect route R1 conflict
/// * at 11 expect count R1 2
/// * at 11 expect switch S1 LEFT (or `moving`)
/// * at 11 expect tvd T1 reserved 2 (or `occupied`, `clear`)
/// * at 11 expect next S1 t1 (or `none`)
///
/// Everything after `#` on an otherwise empty line is a comment.
pub fn parse_scenario(input: &str) -> Result<Scenario, ParseError> {
    let regex = |s: &str| Regex::new(s).map_err(|e| ParseError::RegexError(format!("{:?}", e)));
    let blank_re = regex(r"^\s*(#.*)?$")?;
    let waypoint_re = regex(r"^\s*(detector|bufferstop)\s+(\w+)\s*$")?;
    let tvd_re = regex(r"^\s*tvd\s+(\w+)((?:\s+\w+)*)\s*$")?;
    let switch_re = regex(r"(?x) ^ \s* switch \s+ (?P<name>\w+) \s+
            delay \s* = \s* (?P<delay>[\d\.]+) \s+
            ports \s* = \s* (?P<ports>[\w,]+) \s+
            groups \s* = \s* (?P<groups>[\w,:+\-]+) \s*
            $")?;
    let route_re = regex(r"(?x) ^ \s* route \s+ (?P<name>\w+) \s+
            path \s* = \s* (?P<path>[\w,@\-]+)
            (?: \s+ switches \s* = \s* (?P<switches>[\w,:]+) )? \s*
            $")?;
    let train_re = regex(r"^\s*train\s+(\w+)\s*$")?;
    let succession_re = regex(r"^\s*succession\s+(\w+)((?:\s+\w+)*)\s*$")?;
    let at_re = regex(r"^\s*at\s+([\d\.]+)\s+(.*?)\s*$")?;

    let mut b = InfrastructureBuilder::new();
    let mut trains = Trains::default();
    let mut successions = Vec::new();
    let mut dispatch = Vec::new();

    for line in input.lines() {
        if blank_re.is_match(line) {
            continue;
        }
        if let Some(groups) = waypoint_re.captures(line) {
            let kind = if &groups[1] == "detector" { WaypointKind::Detector } else { WaypointKind::BufferStop };
            b.waypoint(&groups[2], kind)?;
            continue;
        }
        if let Some(groups) = tvd_re.captures(line) {
            let waypoints = groups[2].split_whitespace()
                .map(|w| lookup(&b.names().waypoint_names, "waypoint", w))
                .collect::<Result<Vec<_>, _>>()?;
            b.tvd_section(&groups[1], &waypoints)?;
            continue;
        }
        if let Some(groups) = switch_re.captures(line) {
            let ports: Vec<&str> = groups["ports"].split(',').collect();
            let port = |p: &str| ports.iter().position(|x| *x == p)
                .ok_or_else(|| ParseError::UnknownName("port", p.to_string()));
            let mut switch_groups = Vec::new();
            for g in groups["groups"].split(',') {
                let mut parts = g.splitn(2, ':');
                let name = parts.next().unwrap_or("");
                let conns = parts.next().ok_or_else(|| ParseError::Unrecognized(line.to_string()))?;
                let mut connections = SmallVec::new();
                for conn in conns.split('+') {
                    let mut ends = conn.splitn(2, '-');
                    match (ends.next(), ends.next()) {
                        (Some(x), Some(y)) => connections.push((port(x)?, port(y)?)),
                        _ => return Err(ParseError::Unrecognized(line.to_string())),
                    }
                }
                switch_groups.push(SwitchGroup { name: name.to_string(), connections });
            }
            b.switch(&groups["name"], &ports, switch_groups, number(&groups["delay"])?)?;
            continue;
        }
        if let Some(groups) = route_re.captures(line) {
            let mut path = Vec::new();
            for step in groups["path"].split(',') {
                let mut at = step.splitn(2, '@');
                let (ends, tvd) = match (at.next(), at.next()) {
                    (Some(e), Some(t)) => (e, t),
                    _ => return Err(ParseError::Unrecognized(line.to_string())),
                };
                let mut ends = ends.splitn(2, '-');
                let (start, end) = match (ends.next(), ends.next()) {
                    (Some(s), Some(e)) => (s, e),
                    _ => return Err(ParseError::Unrecognized(line.to_string())),
                };
                let names = b.names();
                path.push(TvdSectionPath {
                    start: lookup(&names.waypoint_names, "waypoint", start)?,
                    end: lookup(&names.waypoint_names, "waypoint", end)?,
                    tvd_section: lookup(&names.tvd_names, "tvd section", tvd)?,
                });
            }
            let mut switch_groups = Vec::new();
            if let Some(switches) = groups.name("switches") {
                for sg in switches.as_str().split(',') {
                    let mut parts = sg.splitn(2, ':');
                    match (parts.next(), parts.next()) {
                        (Some(sw), Some(g)) => {
                            let sw = lookup(&b.names().switch_names, "switch", sw)?;
                            switch_groups.push((sw, group(&b, sw, g)?));
                        }
                        _ => return Err(ParseError::Unrecognized(line.to_string())),
                    }
                }
            }
            b.route(&groups["name"], &path, &switch_groups)?;
            continue;
        }
        if let Some(groups) = train_re.captures(line) {
            trains.id(&groups[1]);
            continue;
        }
        if let Some(groups) = succession_re.captures(line) {
            let sw = lookup(&b.names().switch_names, "switch", &groups[1])?;
            let order: Vec<TrainId> = groups[2].split_whitespace().map(|t| trains.id(t)).collect();
            successions.push((sw, order));
            continue;
        }
        if let Some(groups) = at_re.captures(line) {
            let time = number::<f64>(&groups[1])?;
            let words: Vec<&str> = groups[2].split_whitespace().collect();
            let event = timed_event(&b, &mut trains, &words)?
                .ok_or_else(|| ParseError::Unrecognized(line.to_string()))?;
            dispatch.push((time, event));
            continue;
        }
        return Err(ParseError::Unrecognized(line.to_string()));
    }

    let (infra, names) = b.build();
    Ok(Scenario { infra, names, train_names: trains.names, successions, dispatch })
}

fn timed_event(b: &InfrastructureBuilder, trains: &mut Trains, words: &[&str])
               -> Result<Option<EventKind>, ParseError> {
    let names = b.names();
    let route = |n: &str| lookup(&names.route_names, "route", n);
    let tvd = |n: &str| lookup(&names.tvd_names, "tvd section", n);
    let switch = |n: &str| lookup(&names.switch_names, "switch", n);

    let action = match *words {
        ["reserve", r, t] => DispatchAction::Reserve { route: route(r)?, train: trains.id(t) },
        ["cbtc", r, t] => DispatchAction::CbtcReserve { route: route(r)?, train: trains.id(t) },
        ["occupy", t] => DispatchAction::Occupy { tvd: tvd(t)? },
        ["unoccupy", t] => DispatchAction::Unoccupy { tvd: tvd(t)? },
        ["route-occupied", r, t] => DispatchAction::RouteOccupied { route: route(r)?, tvd: tvd(t)? },
        ["route-unoccupied", r, t] => DispatchAction::RouteUnoccupied { route: route(r)?, tvd: tvd(t)? },
        ["setgroup", s, g] => {
            let sw = switch(s)?;
            DispatchAction::SetGroup { switch: sw, group: group(b, sw, g)? }
        }
        ["requestgroup", s, g] => {
            let sw = switch(s)?;
            DispatchAction::RequestGroup { switch: sw, group: group(b, sw, g)? }
        }
        ["order", s, ref order @ ..] => DispatchAction::ChangeTrainOrder {
            switch: switch(s)?,
            order: order.iter().map(|t| trains.id(t)).collect(),
        },
        ["expect", ref what @ ..] => return Ok(expectation(b, trains, what)?.map(EventKind::Probe)),
        _ => return Ok(None),
    };
    Ok(Some(EventKind::Dispatch(action)))
}

fn expectation(b: &InfrastructureBuilder, trains: &mut Trains, words: &[&str])
               -> Result<Option<Expectation>, ParseError> {
    let names = b.names();
    let exp = match *words {
        ["route", r, status] => Expectation::RouteStatus {
            route: lookup(&names.route_names, "route", r)?,
            status: status.parse().map_err(|s| ParseError::UnknownName("route status", s))?,
        },
        ["count", r, n] => Expectation::RouteTrainCount {
            route: lookup(&names.route_names, "route", r)?,
            count: number(n)?,
        },
        ["switch", s, g] => {
            let sw = lookup(&names.switch_names, "switch", s)?;
            let group = if g == "moving" { None } else { Some(group(b, sw, g)?) };
            Expectation::SwitchGroup { switch: sw, group }
        }
        ["tvd", t, "reserved", n] => Expectation::TvdReservation {
            tvd: lookup(&names.tvd_names, "tvd section", t)?,
            count: number(n)?,
        },
        ["tvd", t, state @ "occupied"] | ["tvd", t, state @ "clear"] => Expectation::TvdOccupied {
            tvd: lookup(&names.tvd_names, "tvd section", t)?,
            occupied: state == "occupied",
        },
        ["next", s, t] => Expectation::NextTrain {
            switch: lookup(&names.switch_names, "switch", s)?,
            train: if t == "none" { None } else { Some(trains.id(t)) },
        },
        _ => return Ok(None),
    };
    Ok(Some(exp))
}

#[cfg(test)]
mod tests {
    use super::*;

    const JUNCTION: &str = "
        # one switch, two routes through it
        bufferstop A
        detector D
        bufferstop B
        bufferstop C
        tvd T1 A D
        tvd T2 D B C
        switch S delay=5 ports=base,left,right groups=LEFT:base-left,RIGHT:base-right
        route R1 path=A-D@T1,D-B@T2 switches=S:LEFT
        route R2 path=A-D@T1,D-C@T2 switches=S:RIGHT
        succession S second first
        at 1 reserve R2 first
        at 2.5 expect route R2 requested
        at 3 expect switch S moving
        at 4 order S first
        at 9 expect next S none
    ";

    #[test]
    fn parses_declarations() {
        let s = parse_scenario(JUNCTION).unwrap();
        assert_eq!(s.infra.routes.len(), 2);
        assert_eq!(s.infra.routes[1].switch_groups.as_slice(), &[(0, 1)]);
        assert_eq!(s.infra.tvd_sections[1].waypoints.as_slice(), &[1, 2, 3]);
        assert_eq!(s.infra.switches[0].group_change_delay, 5.0);
        assert_eq!(s.train_names, vec!["second".to_string(), "first".to_string()]);
        assert_eq!(s.successions, vec![(0, vec![0, 1])]);
    }

    #[test]
    fn parses_timed_lines() {
        let s = parse_scenario(JUNCTION).unwrap();
        let times: Vec<f64> = s.dispatch.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![1.0, 2.5, 3.0, 4.0, 9.0]);
        assert_eq!(s.dispatch[0].1, EventKind::Dispatch(DispatchAction::Reserve { route: 1, train: 1 }));
        assert_eq!(s.dispatch[1].1,
                   EventKind::Probe(Expectation::RouteStatus { route: 1, status: RouteStatus::Requested }));
        assert_eq!(s.dispatch[2].1, EventKind::Probe(Expectation::SwitchGroup { switch: 0, group: None }));
        assert_eq!(s.dispatch[3].1,
                   EventKind::Dispatch(DispatchAction::ChangeTrainOrder { switch: 0, order: vec![1] }));
    }

    #[test]
    fn reports_bad_lines() {
        match parse_scenario("detector A\nat 1 occupy T9") {
            Err(ParseError::UnknownName("tvd section", ref n)) if n == "T9" => {}
            x => panic!("unexpected {:?}", x),
        }
        match parse_scenario("at 1 fly away") {
            Err(ParseError::Unrecognized(_)) => {}
            x => panic!("unexpected {:?}", x),
        }
        match parse_scenario("detector A\ndetector A") {
            Err(ParseError::Infra(InfraError::DuplicateName(..))) => {}
            x => panic!("unexpected {:?}", x),
        }
    }
}
