#[macro_use]
extern crate failure_derive;

pub mod eventsim;
pub mod input;
pub mod output;
pub mod railway;


use crate::eventsim::{Change, ChangeConsumer, ChangeReplayChecker, Simulation, SimulationError};
use crate::input::dispatch::{parse_scenario, Scenario};
use crate::railway::infrastructure::InfraSnapshot;
use log::info;
use std::path::Path;

pub type AppResult<T> = Result<T, failure::Error>;

pub fn read_file(f: &Path) -> AppResult<String> {
    use std::fs::File;
    use std::io::prelude::*;
    use std::io::BufReader;

    let file = File::open(f)?;
    let mut file = BufReader::new(&file);
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

pub fn get_scenario(f: &Path) -> AppResult<Scenario> {
    let contents = read_file(f)?;
    let scenario = parse_scenario(&contents)?;
    Ok(scenario)
}

#[derive(Debug)]
pub struct RunResult {
    pub changes: Vec<Change>,
    pub snapshot: InfraSnapshot,
    pub end_time: f64,
}

/// Schedules the scenario's requests and checks, then runs them, all of
/// them or only those at or before `until`.
pub fn run_scenario(scenario: &Scenario,
                    until: Option<f64>,
                    consumers: Vec<Box<dyn ChangeConsumer>>)
                    -> Result<RunResult, SimulationError> {
    let mut sim = Simulation::with_successions(&scenario.infra, 0.0, &scenario.successions);
    for consumer in consumers {
        sim.add_consumer(consumer);
    }
    for (time, event) in &scenario.dispatch {
        sim.schedule_event(*time, event.clone())?;
    }
    match until {
        Some(t) => sim.run_until(t)?,
        None => sim.run()?,
    }
    sim.finish()?;
    info!("scenario finished at {} with {} changes", sim.time(), sim.changes().len());
    Ok(RunResult {
        changes: sim.changes().to_vec(),
        snapshot: sim.state.snapshot(),
        end_time: sim.time(),
    })
}

/// Runs the scenario again, failing on the first change that differs
/// from `expected`.
pub fn check_replay(scenario: &Scenario, until: Option<f64>, expected: &[Change]) -> Result<(), SimulationError> {
    let checker: Vec<Box<dyn ChangeConsumer>> = vec![Box::new(ChangeReplayChecker::new(expected.to_vec()))];
    run_scenario(scenario, until, checker)?;
    Ok(())
}
