use std::{path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use prism_analysis::analyze_scene;
use prism_assets::AssetServer;
use prism_batch::{BatchEvent, BatchProcessor, BatchState};
use prism_core::{
    Error, OptimizationProfile, ProfilePreset, Result,
    runtime::{RuntimeConfig, build_runtimes},
};

#[derive(Parser)]
#[command(name = "prism", version, about = "Analyze and optimize 3D scene files")]
struct Cli {
    /// More log output; repeat for trace. RUST_LOG still wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Worker threads for mesh and material passes (0 = one per core).
    #[arg(long, default_value_t = 0, global = true)]
    threads: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize scene files into an `Optimized` folder next to each input.
    Optimize {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Print hierarchy, mesh and material reports for one scene.
    Analyze {
        path: PathBuf,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Print the resolved profile as JSON.
    Profile {
        #[command(flatten)]
        profile: ProfileArgs,
    },
}

#[derive(Args)]
struct ProfileArgs {
    /// JSON profile file. Overrides --preset.
    #[arg(long)]
    profile: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Preset::Desktop)]
    preset: Preset,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Desktop,
    Mobile,
    Archive,
}

impl ProfileArgs {
    fn resolve(&self) -> Result<OptimizationProfile> {
        match &self.profile {
            Some(path) => OptimizationProfile::load_from_file(path),
            None => {
                let preset = match self.preset {
                    Preset::Desktop => ProfilePreset::Desktop,
                    Preset::Mobile => ProfilePreset::Mobile,
                    Preset::Archive => ProfilePreset::Archive,
                };
                Ok(OptimizationProfile::preset(preset))
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str())).init();

    if let Err(e) = run(cli) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let runtime = build_runtimes(RuntimeConfig {
        compute_threads: cli.threads,
        ..Default::default()
    })?;

    match cli.command {
        Command::Optimize { paths, profile } => {
            let profile = profile.resolve()?;
            runtime.block_on(optimize(paths, profile))
        }
        Command::Analyze { path, profile } => {
            let profile = profile.resolve()?;
            let mut scene = AssetServer::new().load_scene(&path)?;
            let analysis = analyze_scene(&scene, &profile)?;
            println!("{:#?}", analysis);
            println!("{:#?}", scene.refresh_statistics());
            Ok(())
        }
        Command::Profile { profile } => {
            let profile = profile.resolve()?;
            let json = serde_json::to_string_pretty(&profile)
                .map_err(|e| Error::invalid_argument(e.to_string()))?;
            println!("{json}");
            Ok(())
        }
    }
}

async fn optimize(paths: Vec<PathBuf>, profile: OptimizationProfile) -> Result<()> {
    let (processor, mut events) = BatchProcessor::new(Arc::new(AssetServer::new()));

    let control = processor.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping after the current scene");
            control.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                BatchEvent::Progress(fraction) => println!("[{:>3.0}%]", fraction * 100.0),
                BatchEvent::SceneProcessed { name } => println!("optimized '{name}'"),
                BatchEvent::Completed => println!("batch completed"),
                BatchEvent::Error(message) => eprintln!("batch error: {message}"),
            }
        }
    });

    let summary = processor.run(&paths, &profile).await?;
    // Closes the event channel so the printer drains and exits.
    drop(processor);
    if let Err(e) = printer.await {
        log::warn!("Event printer stopped early: {e}");
    }

    for output in &summary.exported {
        println!("wrote {}", output.display());
    }
    for failure in &summary.failures {
        eprintln!("failed {}: {}", failure.path.display(), failure.message);
    }

    match summary.state {
        BatchState::Failed => Err(Error::optimization_failure("batch aborted")),
        BatchState::Cancelled => {
            log::warn!("Batch cancelled with {} of {} scenes exported", summary.exported.len(), paths.len());
            Ok(())
        }
        _ => Ok(()),
    }
}
