// SPDX-License-Identifier: AGPL-3.0-only

//! Pre-cracked plate under displacement loading.
//!
//! Loads a `SimConfig` (TOML file or the built-in `crack_plate_2d`),
//! builds a rectangular plate with an edge crack, and runs it on the
//! chosen backend. With `--output` every checkpoint is written as
//! `<key>.json` into that directory, along with the load history; with
//! `--resume` the run continues from a checkpoint already stored there.
//!
//! Falls back to the sequential backend when the requested one is
//! unavailable on this host.

use anyhow::{bail, Context};
use clap::Parser;
use peridyn::pd::backend::BackendKind;
use peridyn::pd::config::{crack_plate_2d, ramped_plate_2d};
use peridyn::pd::geometry::{pull_apart_tags, vertical_crack, Geometry};
use peridyn::pd::observables::{damage_stats, strain_energy};
use peridyn::pd::store::{ArrayStore, JsonDirStore};
use peridyn::pd::{Model, ModelCallbacks, SimConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crack_plate")]
#[command(about = "Bond-based peridynamics: pre-cracked plate pulled apart", long_about = None)]
struct Cli {
    /// Config TOML file (defaults to the built-in crack plate)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the smooth displacement ramp preset instead of a constant rate
    #[arg(long, conflicts_with = "config")]
    ramped: bool,

    /// Backend override: sequential, parallel or gpu
    #[arg(short, long, value_parser = parse_backend)]
    backend: Option<BackendKind>,

    /// Step count override
    #[arg(short, long)]
    steps: Option<usize>,

    /// Plate extent per axis (two values for 2D, three for 3D)
    #[arg(long, num_args = 2..=3, default_values_t = [1.0, 0.5])]
    extent: Vec<f64>,

    /// Particle spacing
    #[arg(long, default_value_t = 0.025)]
    spacing: f64,

    /// Width of the displacement-loaded bands at both ends
    #[arg(long, default_value_t = 0.15)]
    band: f64,

    /// Crack length from the lower edge, at mid-plate
    #[arg(long, default_value_t = 0.25)]
    crack_length: f64,

    /// Checkpoint directory (JSON arrays + load_history_<step>.json)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Resume from the checkpoint at this step in `--output`
    #[arg(long, requires = "output")]
    resume: Option<usize>,
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    match s {
        "sequential" => Ok(BackendKind::Sequential),
        "parallel" => Ok(BackendKind::Parallel),
        "gpu" => Ok(BackendKind::Gpu),
        other => Err(format!(
            "unknown backend '{other}' (expected sequential, parallel or gpu)"
        )),
    }
}

fn callbacks(cli: &Cli) -> ModelCallbacks {
    let length = cli.extent[0];
    let band = cli.band;
    ModelCallbacks::new()
        .with_classifier(pull_apart_tags(length, band))
        .with_crack(vertical_crack(length / 2.0, 0.0, cli.crack_length))
        .with_tip(move |x: &[f64]| x[0] > length - band)
}

fn build_model(cli: &Cli, mut config: SimConfig) -> anyhow::Result<Model> {
    let geometry = Geometry::rectangular_grid(&cli.extent, cli.spacing)
        .context("building plate geometry")?;
    match Model::new(config.clone(), geometry.clone(), callbacks(cli)) {
        Ok(model) => Ok(model),
        Err(e) if e.is_backend_unavailable() => {
            log::warn!("{} backend unavailable ({e}); falling back to sequential", config.backend);
            config.backend = BackendKind::Sequential;
            Model::new(config, geometry, callbacks(cli)).context("building model")
        }
        Err(e) => Err(e).context("building model"),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if cli.ramped => ramped_plate_2d(),
        None => crack_plate_2d(),
    };
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(steps) = cli.steps {
        config.steps = steps;
    }
    if cli.extent.len() != config.dimensions {
        bail!(
            "--extent has {} values but the config is {}D",
            cli.extent.len(),
            config.dimensions
        );
    }

    let mut model = build_model(&cli, config)?;
    let mut store = match &cli.output {
        Some(dir) => Some(JsonDirStore::create(dir).context("opening checkpoint directory")?),
        None => None,
    };

    if let (Some(step), Some(store)) = (cli.resume, store.as_ref()) {
        let restored = model
            .restore_checkpoint(store, step)
            .with_context(|| format!("restoring step {step}"))?;
        if !restored {
            bail!("no complete checkpoint for step {step} in {}", store.dir().display());
        }
    }

    let steps = model.config().steps;
    let outcome = model.simulate(
        steps,
        store.as_mut().map(|s| s as &mut dyn ArrayStore),
    )?;

    let stats = damage_stats(&outcome.damage);
    let energy = strain_energy(model.topology(), model.geometry(), &outcome.displacement);
    println!(
        "{}: steps {}..={} on {} backend",
        model.config().label,
        outcome.first_step,
        outcome.last_step,
        model.backend_kind()
    );
    println!(
        "  {} particles, {} bonds ({} pre-cut), {} broken",
        model.geometry().len(),
        model.topology().bond_count(),
        model.topology().pre_cut_count(),
        outcome.broken_bonds
    );
    println!(
        "  damage max={:.3} mean={:.4} ({} particles damaged)",
        stats.max, stats.mean, stats.damaged
    );
    println!("  strain energy {energy:.6e}");
    println!(
        "  {:.2}s wall, {:.1} steps/s",
        outcome.wall_time_s, outcome.steps_per_sec
    );

    if let Some(store) = &store {
        let path = store
            .dir()
            .join(format!("load_history_{}.json", outcome.last_step));
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, &outcome.load_history)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("  load history: {}", path.display());
    }
    Ok(())
}
