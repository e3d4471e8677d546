use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};

pub type WaypointId = usize;
pub type TvdSectionId = usize;
pub type SwitchId = usize;
pub type GroupId = usize;
pub type PortId = usize;
pub type RouteId = usize;

pub type NameMap = HashMap<String, usize>;

#[derive(Debug, Fail)]
pub enum InfraError {
    #[fail(display = "duplicate {} name: {}", _0, _1)]
    DuplicateName(&'static str, String),
    #[fail(display = "unknown {} index {}", _0, _1)]
    UnknownIndex(&'static str, usize),
    #[fail(display = "switch {} has no group {}", _0, _1)]
    UnknownGroup(SwitchId, GroupId),
    #[fail(display = "switch {} has no port {}", _0, _1)]
    UnknownPort(SwitchId, PortId),
    #[fail(display = "switch {} has a negative group change delay", _0)]
    InvalidDelay(SwitchId),
    #[fail(display = "switch {} has no groups", _0)]
    NoGroups(String),
    #[fail(display = "route {} has an empty path", _0)]
    EmptyRoute(String),
    #[fail(display = "route {} requires switch {} more than once", _0, _1)]
    RepeatedSwitch(String, SwitchId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaypointKind {
    Detector,
    BufferStop,
}

#[derive(Debug, Clone)]
pub struct Waypoint {
    pub name: String,
    pub kind: WaypointKind,
}

/// A detection circuit bounded by waypoints.
#[derive(Debug, Clone)]
pub struct TvdSection {
    pub name: String,
    pub waypoints: SmallVec<[WaypointId; 4]>,
}

/// A feasible connection pattern between the ports of a switch.
#[derive(Debug, Clone)]
pub struct SwitchGroup {
    pub name: String,
    pub connections: SmallVec<[(PortId, PortId); 2]>,
}

#[derive(Debug, Clone)]
pub struct Switch {
    pub name: String,
    pub ports: SmallVec<[String; 3]>,
    pub groups: SmallVec<[SwitchGroup; 2]>,
    pub group_change_delay: f64,
}

impl Switch {
    pub fn group_index(&self, name: &str) -> Option<GroupId> {
        self.groups.iter().position(|g| g.name == name)
    }
}

/// One segment of a route, inside a single TVD section.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TvdSectionPath {
    pub start: WaypointId,
    pub end: WaypointId,
    pub tvd_section: TvdSectionId,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub path: SmallVec<[TvdSectionPath; 4]>,
    pub switch_groups: SmallVec<[(SwitchId, GroupId); 2]>,
    /// Unique TVD sections of the path, in path order.
    pub sections: SmallVec<[TvdSectionId; 4]>,
}

impl Route {
    pub fn required_group(&self, sw: SwitchId) -> Option<GroupId> {
        self.switch_groups.iter().find(|&&(s, _)| s == sw).map(|&(_, g)| g)
    }
}

#[derive(Debug, Default)]
pub struct InfNames {
    pub waypoint_names: NameMap,
    pub tvd_names: NameMap,
    pub switch_names: NameMap,
    pub route_names: NameMap,
}

/// Read-only infrastructure, indexed densely. Dynamic state lives in
/// `railway::infrastructure::InfraState`, indexed identically.
#[derive(Debug)]
pub struct StaticInfrastructure {
    pub waypoints: Vec<Waypoint>,
    pub tvd_sections: Vec<TvdSection>,
    pub switches: Vec<Switch>,
    pub routes: Vec<Route>,
    tvd_routes: Vec<Vec<RouteId>>,
    switch_routes: Vec<Vec<RouteId>>,
    conflicting_routes: Vec<Vec<RouteId>>,
}

impl StaticInfrastructure {
    /// Routes whose path crosses the section, ascending.
    pub fn routes_crossing(&self, tvd: TvdSectionId) -> &[RouteId] {
        &self.tvd_routes[tvd]
    }

    /// Routes requiring a position of the switch, ascending.
    pub fn routes_requiring(&self, sw: SwitchId) -> &[RouteId] {
        &self.switch_routes[sw]
    }

    /// Other routes sharing a TVD section with `route`, or requiring another
    /// group of one of its switches, ascending.
    pub fn conflicting_routes(&self, route: RouteId) -> &[RouteId] {
        &self.conflicting_routes[route]
    }
}

#[derive(Debug, Default)]
pub struct InfrastructureBuilder {
    waypoints: Vec<Waypoint>,
    tvd_sections: Vec<TvdSection>,
    switches: Vec<Switch>,
    routes: Vec<Route>,
    names: InfNames,
}

fn insert_name(map: &mut NameMap, kind: &'static str, name: &str, idx: usize) -> Result<(), InfraError> {
    if map.contains_key(name) {
        return Err(InfraError::DuplicateName(kind, name.to_string()));
    }
    map.insert(name.to_string(), idx);
    Ok(())
}

impl InfrastructureBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Group lookup on an already added switch.
    pub fn switch_group(&self, sw: SwitchId, name: &str) -> Option<GroupId> {
        self.switches.get(sw).and_then(|s| s.group_index(name))
    }

    pub fn names(&self) -> &InfNames {
        &self.names
    }

    pub fn waypoint(&mut self, name: &str, kind: WaypointKind) -> Result<WaypointId, InfraError> {
        let idx = self.waypoints.len();
        insert_name(&mut self.names.waypoint_names, "waypoint", name, idx)?;
        self.waypoints.push(Waypoint { name: name.to_string(), kind });
        Ok(idx)
    }

    pub fn tvd_section(&mut self, name: &str, waypoints: &[WaypointId]) -> Result<TvdSectionId, InfraError> {
        for &w in waypoints {
            if w >= self.waypoints.len() {
                return Err(InfraError::UnknownIndex("waypoint", w));
            }
        }
        let idx = self.tvd_sections.len();
        insert_name(&mut self.names.tvd_names, "tvd section", name, idx)?;
        self.tvd_sections.push(TvdSection {
            name: name.to_string(),
            waypoints: waypoints.iter().cloned().collect(),
        });
        Ok(idx)
    }

    pub fn switch(&mut self, name: &str, ports: &[&str], groups: Vec<SwitchGroup>, group_change_delay: f64)
                  -> Result<SwitchId, InfraError> {
        let idx = self.switches.len();
        if !(group_change_delay >= 0.0) {
            return Err(InfraError::InvalidDelay(idx));
        }
        if groups.is_empty() {
            return Err(InfraError::NoGroups(name.to_string()));
        }
        for g in &groups {
            for &(a, b) in &g.connections {
                if a >= ports.len() { return Err(InfraError::UnknownPort(idx, a)); }
                if b >= ports.len() { return Err(InfraError::UnknownPort(idx, b)); }
            }
        }
        insert_name(&mut self.names.switch_names, "switch", name, idx)?;
        self.switches.push(Switch {
            name: name.to_string(),
            ports: ports.iter().map(|p| p.to_string()).collect(),
            groups: groups.into_iter().collect(),
            group_change_delay,
        });
        Ok(idx)
    }

    pub fn route(&mut self, name: &str, path: &[TvdSectionPath], switch_groups: &[(SwitchId, GroupId)])
                 -> Result<RouteId, InfraError> {
        if path.is_empty() {
            return Err(InfraError::EmptyRoute(name.to_string()));
        }
        for p in path {
            if p.tvd_section >= self.tvd_sections.len() {
                return Err(InfraError::UnknownIndex("tvd section", p.tvd_section));
            }
            for &w in &[p.start, p.end] {
                if w >= self.waypoints.len() {
                    return Err(InfraError::UnknownIndex("waypoint", w));
                }
            }
        }
        for (i, &(sw, group)) in switch_groups.iter().enumerate() {
            if switch_groups[..i].iter().any(|&(other, _)| other == sw) {
                return Err(InfraError::RepeatedSwitch(name.to_string(), sw));
            }
            let switch = self.switches.get(sw).ok_or(InfraError::UnknownIndex("switch", sw))?;
            if group >= switch.groups.len() {
                return Err(InfraError::UnknownGroup(sw, group));
            }
        }

        let mut sections: SmallVec<[TvdSectionId; 4]> = SmallVec::new();
        for p in path {
            if !sections.contains(&p.tvd_section) {
                sections.push(p.tvd_section);
            }
        }

        let idx = self.routes.len();
        insert_name(&mut self.names.route_names, "route", name, idx)?;
        self.routes.push(Route {
            name: name.to_string(),
            path: path.iter().cloned().collect(),
            switch_groups: switch_groups.iter().cloned().collect(),
            sections,
        });
        Ok(idx)
    }

    pub fn build(self) -> (StaticInfrastructure, InfNames) {
        let mut tvd_routes = vec![Vec::new(); self.tvd_sections.len()];
        let mut switch_routes = vec![Vec::new(); self.switches.len()];
        for (idx, route) in self.routes.iter().enumerate() {
            for &tvd in &route.sections {
                tvd_routes[tvd].push(idx);
            }
            for &(sw, _) in &route.switch_groups {
                if !switch_routes[sw].contains(&idx) {
                    switch_routes[sw].push(idx);
                }
            }
        }

        let routes = &self.routes;
        let conflicting_routes = routes.iter().enumerate()
            .map(|(idx, route)| {
                let by_section = route.sections.iter()
                    .flat_map(|&tvd| tvd_routes[tvd].iter().cloned());
                let by_switch = route.switch_groups.iter()
                    .flat_map(|&(sw, group)| switch_routes[sw].iter().cloned()
                        .filter(move |&other| routes[other].required_group(sw) != Some(group)));
                let set: BTreeSet<RouteId> = by_section.chain(by_switch)
                    .filter(|&other| other != idx)
                    .collect();
                set.into_iter().collect()
            })
            .collect();

        let inf = StaticInfrastructure {
            waypoints: self.waypoints,
            tvd_sections: self.tvd_sections,
            switches: self.switches,
            routes: self.routes,
            tvd_routes,
            switch_routes,
            conflicting_routes,
        };
        (inf, self.names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> InfrastructureBuilder {
        let mut b = InfrastructureBuilder::new();
        let a = b.waypoint("a", WaypointKind::BufferStop).unwrap();
        let d = b.waypoint("d", WaypointKind::Detector).unwrap();
        let e = b.waypoint("e", WaypointKind::BufferStop).unwrap();
        b.tvd_section("t1", &[a, d]).unwrap();
        b.tvd_section("t2", &[d, e]).unwrap();
        b
    }

    #[test]
    fn builds_indices() {
        let mut b = line();
        let p1 = TvdSectionPath { start: 0, end: 1, tvd_section: 0 };
        let p2 = TvdSectionPath { start: 1, end: 2, tvd_section: 1 };
        b.route("r1", &[p1, p2], &[]).unwrap();
        b.route("r2", &[p2], &[]).unwrap();
        b.route("r3", &[p1], &[]).unwrap();
        let (inf, names) = b.build();

        assert_eq!(inf.routes_crossing(0), &[0, 2]);
        assert_eq!(inf.routes_crossing(1), &[0, 1]);
        assert_eq!(inf.conflicting_routes(0), &[1, 2]);
        assert!(inf.conflicting_routes(1).iter().all(|&r| r == 0));
        assert_eq!(names.route_names["r3"], 2);
    }

    #[test]
    fn switch_groups_make_routes_conflict() {
        let mut b = line();
        let groups = vec![
            SwitchGroup { name: "LEFT".to_string(), connections: SmallVec::from_slice(&[(0, 1)]) },
            SwitchGroup { name: "RIGHT".to_string(), connections: SmallVec::from_slice(&[(0, 2)]) },
        ];
        let s = b.switch("s", &["base", "left", "right"], groups, 5.0).unwrap();
        let p1 = TvdSectionPath { start: 0, end: 1, tvd_section: 0 };
        let p2 = TvdSectionPath { start: 1, end: 2, tvd_section: 1 };
        b.route("left", &[p1], &[(s, 0)]).unwrap();
        b.route("right", &[p2], &[(s, 1)]).unwrap();
        b.route("also_left", &[p2], &[(s, 0)]).unwrap();
        let (inf, _) = b.build();

        assert_eq!(inf.routes_requiring(s), &[0, 1, 2]);
        assert_eq!(inf.conflicting_routes(0), &[1]);
        assert_eq!(inf.conflicting_routes(1), &[0, 2]);
        assert_eq!(inf.conflicting_routes(2), &[1]);
    }

    #[test]
    fn repeated_section_counted_once() {
        let mut b = line();
        let p1 = TvdSectionPath { start: 0, end: 1, tvd_section: 0 };
        let p1b = TvdSectionPath { start: 1, end: 0, tvd_section: 0 };
        let r = b.route("loop", &[p1, p1b], &[]).unwrap();
        let (inf, _) = b.build();
        assert_eq!(inf.routes[r].sections.len(), 1);
        assert_eq!(inf.routes[r].path.len(), 2);
    }

    #[test]
    fn rejects_bad_references() {
        let mut b = line();
        assert!(b.route("empty", &[], &[]).is_err());
        let bad = TvdSectionPath { start: 0, end: 1, tvd_section: 7 };
        assert!(b.route("bad", &[bad], &[]).is_err());
        assert!(b.waypoint("a", WaypointKind::Detector).is_err());
        let group = SwitchGroup { name: "x".to_string(), connections: SmallVec::from_slice(&[(0, 5)]) };
        assert!(b.switch("s", &["base", "left"], vec![group], 1.0).is_err());
        match b.switch("s", &["base", "left"], Vec::new(), 1.0) {
            Err(InfraError::NoGroups(ref name)) if name == "s" => {}
            x => panic!("unexpected {:?}", x),
        }
        assert!(b.names().switch_names.is_empty());
    }
}
