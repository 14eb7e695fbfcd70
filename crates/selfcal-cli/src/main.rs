use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use selfcal_core::{
    AttributeView, CorrelationMatrix, CriticalityFunctionParameters, EngineConfig,
    FnAttribute, FnWritableAttribute, ObjectiveSpec, Sign, World,
};
use std::cell::RefCell;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "selfcal_core=info,selfcal=info";

#[derive(Parser)]
#[command(name = "selfcal")]
#[command(about = "Self-calibrating parameter engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate the built-in demo plant with an engine config file
    Run {
        /// Path to engine config file (JSON); defaults are used when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for results (optional)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Number of engine cycles to run
        #[arg(long, default_value_t = 200)]
        steps: usize,

        /// Record a sample every N cycles
        #[arg(long, default_value_t = 10)]
        sample_every: usize,
    },
    /// Dump the default engine configuration to stdout
    DumpDefaultConfig,
}

/// Toy heating plant: a heater warms the room, a fan cools it and moves air.
#[derive(Debug)]
struct Plant {
    heater: f64,
    fan: f64,
}

impl Plant {
    fn temperature(&self) -> f64 {
        15.0 + 2.0 * self.heater - 1.5 * self.fan
    }

    fn airflow(&self) -> f64 {
        self.fan
    }

    fn energy(&self) -> f64 {
        self.heater + 0.5 * self.fan
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let file = File::open(path).context("failed to open config file")?;
    let config: EngineConfig =
        serde_json::from_reader(BufReader::new(file)).context("failed to parse config")?;
    config.validate().context("config validation error")?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}

fn band(t: [f64; 6]) -> Result<CriticalityFunctionParameters> {
    CriticalityFunctionParameters::new(t[0], t[1], t[2], t[3], t[4], t[5])
        .context("invalid comfort thresholds")
}

fn build_world(config: EngineConfig, plant: &Rc<RefCell<Plant>>) -> Result<World> {
    let mut world = World::new(config).context("failed to create engine")?;

    let (r, w) = (Rc::clone(plant), Rc::clone(plant));
    world.add_parameter(AttributeView::new(
        "heater",
        0.0,
        10.0,
        FnWritableAttribute::new(move || r.borrow().heater, move |v| w.borrow_mut().heater = v),
    )?)?;
    let (r, w) = (Rc::clone(plant), Rc::clone(plant));
    world.add_parameter(AttributeView::new(
        "fan",
        0.0,
        10.0,
        FnWritableAttribute::new(move || r.borrow().fan, move |v| w.borrow_mut().fan = v),
    )?)?;

    let r = Rc::clone(plant);
    world.add_measure(AttributeView::new(
        "temperature",
        -50.0,
        100.0,
        FnAttribute::new(move || r.borrow().temperature()),
    )?)?;
    let r = Rc::clone(plant);
    world.add_measure(AttributeView::new(
        "airflow",
        0.0,
        10.0,
        FnAttribute::new(move || r.borrow().airflow()),
    )?)?;
    let r = Rc::clone(plant);
    world.add_output(AttributeView::new(
        "energy",
        0.0,
        20.0,
        FnAttribute::new(move || r.borrow().energy()),
    )?)?;

    world.add_objective(
        "comfortable-temperature",
        ObjectiveSpec::Comfort {
            parameters: band([10.0, 18.0, 20.0, 22.0, 24.0, 35.0])?,
            relative_agent: "temperature".into(),
        },
    )?;
    world.add_objective(
        "gentle-airflow",
        ObjectiveSpec::Comfort {
            parameters: band([0.0, 2.0, 3.0, 5.0, 7.0, 10.0])?,
            relative_agent: "airflow".into(),
        },
    )?;

    let mut correlation = CorrelationMatrix::new();
    correlation
        .link("temperature", "heater", Sign::Positive)
        .link("temperature", "fan", Sign::Negative)
        .link("airflow", "fan", Sign::Positive);
    world.set_correlation_matrix(correlation)?;
    world.setup().context("engine setup failed")?;
    Ok(world)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    match cli.command {
        Commands::DumpDefaultConfig => {
            let config = EngineConfig::default();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Run {
            config,
            out,
            steps,
            sample_every,
        } => {
            let config = load_config(config.as_ref())?;
            let plant = Rc::new(RefCell::new(Plant {
                heater: 0.0,
                fan: 5.0,
            }));
            let mut world = build_world(config, &plant)?;
            info!(steps, sample_every, "calibrating demo plant");
            let summary = world.run(steps, sample_every).context("engine cycle failed")?;

            if let Some(out_dir) = out {
                std::fs::create_dir_all(&out_dir).context("failed to create output directory")?;
                let summary_path = out_dir.join("summary.json");
                let file = File::create(summary_path).context("failed to create summary file")?;
                serde_json::to_writer_pretty(file, &summary).context("failed to write summary")?;
                println!("Run complete. Results saved to {:?}", out_dir);
            } else {
                let plant = plant.borrow();
                println!(
                    "Run complete. heater={:.3} fan={:.3} temperature={:.2} converged_at={:?}",
                    plant.heater,
                    plant.fan,
                    plant.temperature(),
                    summary.converged_at
                );
            }
        }
    }
    Ok(())
}
