use railsim::*;
use env_logger::{Builder, Env};
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use structopt::StructOpt;

/// Railsim -- interlocking and route reservation simulation
#[derive(StructOpt, Debug)]
#[structopt(name = "railsim")]
struct Opt {
    /// Verbose mode (-v, -vv, -vvv)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    /// Scenario file: infrastructure, timed requests and checks
    #[structopt(parse(from_os_str))]
    scenario: PathBuf,

    /// Output the change log as JSON lines
    #[structopt(short = "j", long = "json", parse(from_os_str))]
    json: Option<PathBuf>,

    /// Output the final infrastructure state as JSON
    #[structopt(short = "s", long = "summary", parse(from_os_str))]
    summary: Option<PathBuf>,

    /// Stop after this simulated time
    #[structopt(short = "u", long = "until")]
    until: Option<f64>,

    /// Run the scenario twice and fail if the change logs differ
    #[structopt(long = "check-replay")]
    check_replay: bool,
}

fn run(opt: &Opt) -> AppResult<()> {
    let scenario = get_scenario(&opt.scenario)?;
    info!("{} routes, {} tvd sections, {} switches, {} timed lines",
          scenario.infra.routes.len(), scenario.infra.tvd_sections.len(),
          scenario.infra.switches.len(), scenario.dispatch.len());

    let mut consumers: Vec<Box<dyn eventsim::ChangeConsumer>> = Vec::new();
    if let Some(ref json) = opt.json {
        let file = File::create(json)?;
        consumers.push(Box::new(output::json::ChangeSerializer::new(BufWriter::new(file))));
    }
    let result = run_scenario(&scenario, opt.until, consumers)?;

    println!("# Infrastructure history:");
    print!("{}", output::history::summary(&scenario.infra, &scenario.train_names,
                                           &result.changes, opt.verbose >= 1)?);

    if let Some(ref summary) = opt.summary {
        let file = File::create(summary)?;
        let mut writer = BufWriter::new(file);
        output::json::json_snapshot(&scenario.infra, &scenario.train_names,
                                    &result.snapshot, result.end_time, &mut writer)?;
    }

    if opt.check_replay {
        check_replay(&scenario, opt.until, &result.changes)?;
        println!("# Replay identical ({} changes)", result.changes.len());
    }

    Ok(())
}

pub fn main() {
    let opt = Opt::from_args();
    let level = match opt.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    Builder::from_env(Env::default().default_filter_or(level)).init();
    match run(&opt) {
        Ok(()) => {}
        Err(e) => {
            println!("Error:\n{}", e.as_fail());
            std::process::exit(1);
        }
    }
}
