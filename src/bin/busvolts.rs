use anyhow::{Context, Result};
use busvolts::opt::{SolveOpt, DEFAULT_TIME};
use busvolts::{snapshot, Engine, Scenario, Session};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Per-bus voltage snapshots of distribution circuits.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve once and write mean bus voltages to CSV
    Voltages(VoltageArgs),

    /// List the node names of a circuit
    Nodes(NodeArgs),
}

#[derive(Args)]
struct VoltageArgs {
    /// The circuit model
    #[arg(default_value = "Master.dss")]
    model: PathBuf,

    /// Simulated time of the solve (hours).
    #[arg(long, default_value_t = DEFAULT_TIME)]
    time: f64,

    /// Scenario identifiers, `<feeder>--<case>`. Defaults to the name of
    /// the directory holding the model.
    #[arg(long)]
    scenario: Option<Scenario>,

    /// Directory the CSV file is written to.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Termination tolerance on the per unit voltage update.
    #[arg(long)]
    tol: Option<f64>,

    /// Maximum number of iterations.
    #[arg(long)]
    max_it: Option<usize>,
}

#[derive(Args)]
struct NodeArgs {
    /// The circuit model
    #[arg(default_value = "Master.dss")]
    model: PathBuf,
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_level(false)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match execute(&cli) {
        Ok(_) => {
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(2);
        }
    }
}

fn execute(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Voltages(args) => voltages(args),
        Commands::Nodes(args) => {
            let mut session = Session::default();
            session.compile(&args.model)?;
            for name in session.all_node_names()? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn voltages(args: &VoltageArgs) -> Result<()> {
    let mut opt = SolveOpt::default();
    if let Some(tol) = args.tol {
        opt.tolerance = tol;
    }
    if let Some(max_it) = args.max_it {
        opt.max_iterations = max_it;
    }

    let scenario = match &args.scenario {
        Some(s) => s.clone(),
        None => Scenario::from_dir(&model_dir(&args.model)?)?,
    };

    let mut session = Session::new(opt);
    let path = snapshot(
        &mut session,
        &args.model,
        args.time,
        &scenario,
        &args.output_dir,
    )?;
    println!("{}", path.display());

    Ok(())
}

fn model_dir(model: &Path) -> Result<PathBuf> {
    let model = model
        .canonicalize()
        .with_context(|| format!("cannot open {}", model.display()))?;
    Ok(model
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default())
}
