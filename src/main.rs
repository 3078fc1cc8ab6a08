// src/main.rs
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sign_trainer::{
    EngineConfig, EngineEvent, FileStore, FrameSource, GestureEngine, ReplaySource, SampleStore,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file (defaults apply when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory holding samples and models
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record one sample of a gesture from a JSON array of frames
    Collect { label: String, frames: PathBuf },
    /// Train a model on every collected sample
    Train {
        #[arg(long, default_value = "model")]
        name: String,
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// List saved models
    Models,
    /// Select the model used for recognition
    Activate { id: String },
    /// Score a saved model (the active one by default) on the collected samples
    Evaluate { id: Option<String> },
    /// Replay frames through recognition
    Recognize { frames: PathBuf },
    /// Write a gesture's samples as CSV
    Export { label: String, out: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Command::Train {
        epochs: Some(epochs),
        ..
    } = &args.command
    {
        config.trainer.epochs = *epochs;
    }
    info!("Data directory: {}", config.data_dir.display());

    let samples = SampleStore::new(config.samples_dir()).context("opening sample store")?;
    let store = FileStore::new(config.registry_dir()).context("opening model store")?;

    let mut engine = GestureEngine::new(config, store)?.with_sample_store(samples)?;
    run(&mut engine, args.command).await
}

async fn run(engine: &mut GestureEngine<FileStore>, command: Command) -> Result<()> {
    match command {
        Command::Collect { label, frames } => {
            let mut source = ReplaySource::from_json_file(&frames)
                .with_context(|| format!("reading frames {}", frames.display()))?;
            let mut last_ms = 0;
            let mut started = false;

            while let Some(frame) = source.next_frame() {
                last_ms = frame.timestamp_ms;
                if !started {
                    engine.start_collection(&label, frame.timestamp_ms)?;
                    started = true;
                }
                if let EngineEvent::Collected(collected) = engine.on_frame(frame)? {
                    report_sample(&collected);
                    return Ok(());
                }
            }
            if !started {
                bail!("{} contains no frames", frames.display());
            }

            // Stream ended early: flush as if the timeout elapsed.
            let deadline = last_ms.saturating_add(engine.config().collector.timeout_ms);
            match engine.poll(deadline)? {
                Some(collected) => report_sample(&collected),
                None => bail!("collection did not finish"),
            }
        }
        Command::Train { name, .. } => {
            let mut task = engine.spawn_training(&name)?;
            while let Some(metrics) = task.next_epoch().await {
                info!(
                    "epoch {:>3}  loss {:.4}  accuracy {:.3}",
                    metrics.epoch, metrics.loss, metrics.accuracy
                );
            }
            let model = task.join().await?;
            let id = engine.register_model(&model)?;
            println!(
                "Saved {} ({} gestures, accuracy {:.3})",
                id,
                model.gesture_labels.len(),
                model.metadata.accuracy
            );
        }
        Command::Models => {
            let active = engine.registry().get_active().map(|m| m.id.clone());
            for summary in engine.registry().list() {
                let marker = if Some(&summary.id) == active.as_ref() { "*" } else { " " };
                println!(
                    "{} {}  {}  [{}]  acc {:.3}  {} epochs  {}",
                    marker,
                    summary.id,
                    summary.name,
                    summary.gesture_labels.join(", "),
                    summary.accuracy,
                    summary.epochs,
                    summary.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Command::Activate { id } => {
            engine.set_active_model(&id)?;
            println!("Active model: {}", id);
        }
        Command::Evaluate { id } => {
            let model = match id {
                Some(id) => engine.registry().load(&id)?,
                None => engine
                    .registry()
                    .load_active()?
                    .context("no active model; train or activate one first")?,
            };
            let report = model.evaluate(engine.library())?;
            println!(
                "{} examples  loss {:.4}  accuracy {:.3}",
                report.examples, report.loss, report.accuracy
            );
            for (class, row) in report.per_class.iter().zip(&report.confusion) {
                println!(
                    "{:<16} precision {:.3}  recall {:.3}  f1 {:.3}  support {:>3}  {:?}",
                    class.label, class.precision, class.recall, class.f1, class.support, row
                );
            }
        }
        Command::Recognize { frames } => {
            let mut source = ReplaySource::from_json_file(&frames)
                .with_context(|| format!("reading frames {}", frames.display()))?;
            engine.arm()?;
            while let Some(frame) = source.next_frame() {
                if let EngineEvent::Recognized(r) = engine.on_frame(frame)? {
                    println!("{:>8} ms  {}  ({:.2}, {:?})", r.timestamp_ms, r.label, r.score, r.source);
                }
            }
        }
        Command::Export { label, out } => {
            let store = engine
                .sample_store()
                .context("no sample store configured")?;
            let rows = store.export_csv(&label, &out)?;
            println!("Wrote {} rows to {}", rows, out.display());
        }
    }
    Ok(())
}

fn report_sample(collected: &sign_trainer::CollectedSample) {
    match &collected.warning {
        Some(warning) => println!("Kept {}", warning),
        None => println!(
            "Collected '{}' ({} frames)",
            collected.label,
            collected.sample.len()
        ),
    }
}
