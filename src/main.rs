use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use ticket_classifier::api::{self, AppState, PredictBackend};
use ticket_classifier::artifacts::ArtifactStore;
use ticket_classifier::config::{GatewayArgs, LogArgs, LogFormat, RetrainArgs, ServeArgs, TrainArgs};
use ticket_classifier::feedback::FeedbackLog;
use ticket_classifier::retrain::RetrainTrigger;
use ticket_classifier::serving::ModelHandle;
use ticket_classifier::trainer::{train_artifacts, SubprocessTrainer, TrainingOptions};
use ticket_classifier::upstream::UpstreamClient;
use ticket_classifier::watcher::ModelWatcher;

#[derive(Parser)]
#[command(version, about = "Support ticket classifier with a feedback-driven retrain loop")]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Serve /predict and /feedback from an in-process, hot-reloaded model
    Serve(ServeArgs),
    /// Serve /predict and /feedback, forwarding predictions to an inference service
    Gateway(GatewayArgs),
    /// Watch the feedback log, merge it into the dataset and retrain on threshold
    Retrain(RetrainArgs),
    /// Fit and write a matched vectorizer/classifier pair from the dataset
    Train(TrainArgs),
}

fn init_tracing(args: &LogArgs) -> Result<()> {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (&args.log_file, args.log_format) {
        (Some(path), format) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let builder = builder.with_writer(Mutex::new(file)).with_ansi(false);
            match format {
                LogFormat::Json => builder.json().init(),
                LogFormat::Text => builder.init(),
            }
        }
        (None, LogFormat::Json) => builder.json().init(),
        (None, LogFormat::Text) => builder.init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))
}

async fn serve(args: ServeArgs) -> Result<()> {
    let handle = ModelHandle::new();
    let mut watcher = ModelWatcher::new(
        ArtifactStore::new(&args.model.artifact_dir),
        args.model.label_set(),
        handle.clone(),
    );
    // Load before accepting traffic so a healthy pair serves from the first request.
    let outcome = watcher.tick().await;
    tracing::info!(?outcome, "Initial model load");
    tokio::spawn(watcher.run(args.watch_interval()));

    let state = AppState {
        backend: PredictBackend::Local(handle),
        feedback: FeedbackLog::new(&args.feedback_log),
    };
    api::run(bind(&args.bind).await?, state, shutdown_signal()).await
}

async fn gateway(args: GatewayArgs) -> Result<()> {
    let upstream = UpstreamClient::new(&args.upstream_url, Duration::from_secs(args.upstream_timeout_secs))?;
    tracing::info!(upstream = upstream.predict_url(), "Forwarding predictions");
    let state = AppState {
        backend: PredictBackend::Remote(upstream),
        feedback: FeedbackLog::new(&args.feedback_log),
    };
    api::run(bind(&args.bind).await?, state, shutdown_signal()).await
}

async fn retrain(args: RetrainArgs) -> Result<()> {
    let trainer = match &args.train_command {
        Some(command) => SubprocessTrainer::from_command_line(command)?,
        None => SubprocessTrainer::current_exe()?,
    }
    .env("TICKET_ARTIFACT_DIR", args.artifact_dir.to_string_lossy());

    let mut trigger = RetrainTrigger::new(
        FeedbackLog::new(&args.feedback_log),
        &args.dataset,
        args.threshold,
        trainer,
    );
    if args.once {
        let outcome = trigger.tick().await;
        tracing::info!(?outcome, "Retrain tick complete");
        return Ok(());
    }

    tokio::select! {
        _ = trigger.run(args.interval()) => {}
        _ = shutdown_signal() => {}
    }
    Ok(())
}

fn train(args: TrainArgs) -> Result<()> {
    let options = TrainingOptions {
        max_features: args.max_features,
        ..TrainingOptions::default()
    };
    let report = train_artifacts(
        &args.dataset,
        &ArtifactStore::new(&args.model.artifact_dir),
        &args.model.label_set(),
        &options,
    )?;
    tracing::info!(
        fit_id = %report.fit_id,
        rows = report.rows_used,
        accuracy = report.accuracy,
        "Model and vectorizer saved"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log)?;
    tracing::info!(version = ticket_classifier::VERSION, "Ticket classifier starting");

    match cli.cmd {
        Cmd::Serve(args) => serve(args).await?,
        Cmd::Gateway(args) => gateway(args).await?,
        Cmd::Retrain(args) => retrain(args).await?,
        Cmd::Train(args) => train(args)?,
    }
    Ok(())
}
