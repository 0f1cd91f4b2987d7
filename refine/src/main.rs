#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::LevelFilter;
use miette::{NamedSource, Report};

use refine_verify::{Session, SolverConf, Z3Process};

mod input;
mod manifest;

#[derive(Parser, Debug)]
#[command(name = "refine", version, about = "Refinement contract verifier")]
struct Cli {
    /// More logging (`-v`: solver transcript, `-vv`: every command and answer).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Verify the contracts of a typed expression (JSON)
    Check {
        /// Input .json file
        input: PathBuf,

        /// Solver executable. Overrides `refine.toml`.
        #[arg(long)]
        solver: Option<String>,

        /// Solver argument (repeatable). Replaces the configured arguments.
        #[arg(long = "solver-arg", allow_hyphen_values = true)]
        solver_args: Vec<String>,

        /// Mirror every solver command into this file.
        #[arg(long)]
        tee: Option<PathBuf>,
    },

    /// Print the signatures every program starts with
    Builtins,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn solver_conf(
    input: &Path,
    solver: Option<String>,
    solver_args: Vec<String>,
    tee: Option<PathBuf>,
) -> miette::Result<SolverConf> {
    let mut conf = manifest::load_solver_conf(input)?;
    if let Some(command) = solver {
        conf = conf.with_command(command);
    }
    if !solver_args.is_empty() {
        conf = conf.with_args(solver_args);
    }
    if let Some(tee) = tee {
        conf = conf.with_tee(tee);
    }
    Ok(conf)
}

fn check(input: PathBuf, conf: SolverConf) -> miette::Result<()> {
    let program = input::load_program(&input)?;
    let env = program.env();

    let mut session: Session<Z3Process> = Session::z3(conf);
    let proved = refine_verify::prove(&mut session, &env, &program.expr);
    let stopped = session.stop();

    let summary = proved.map_err(|e| {
        let report = Report::new(e);
        match &program.source {
            Some(src) => report.with_source_code(NamedSource::new(
                input.display().to_string(),
                src.clone(),
            )),
            None => report,
        }
    })?;
    stopped?;

    println!(
        "verified: {} obligation(s) discharged, {} fresh variable(s)",
        summary.obligations, summary.fresh
    );
    Ok(())
}

fn builtins() {
    for (name, sig) in refine_stdlib::prelude().iter() {
        let origin = format!("{:?}", sig.origin).to_lowercase();
        println!("{origin:<13} {name:<7} : {}", sig.ty);
    }
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.cmd {
        Cmd::Check {
            input,
            solver,
            solver_args,
            tee,
        } => {
            let conf = solver_conf(&input, solver, solver_args, tee)?;
            check(input, conf)
        }
        Cmd::Builtins => {
            builtins();
            Ok(())
        }
    }
}
