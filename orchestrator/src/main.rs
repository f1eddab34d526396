use clap::Parser;
use judge_orchestrator::{
    config::OrchestratorConfig,
    judge::HttpJudgeClient,
    orchestrator::{Orchestrator, SubmitError, SubmitRequest},
    prelude::{CancellationToken, FlowSnake},
    store::FsStore,
};
use std::{
    process::exit,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod opt;

static CTRL_C: AtomicBool = AtomicBool::new(false);
static CTRL_C_TWICE: AtomicBool = AtomicBool::new(false);

#[tokio::main]
async fn main() {
    let opt = opt::Opts::parse();
    init_logging();

    let cfg = match load_config(&opt.opt).await {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            tracing::error!("Invalid configuration: {:?}", e);
            exit(1);
        }
    };

    let orchestrator = match build_orchestrator(cfg) {
        Ok(o) => o,
        Err(e) => {
            tracing::error!("Failed to set up the judge client: {}", e);
            exit(1);
        }
    };

    let shutdown = orchestrator.shutdown_token();
    ctrlc::set_handler(move || handle_ctrl_c(&shutdown))
        .expect("Failed to set termination handler!");

    let res = match opt.cmd {
        opt::SubCmd::Submit(cmd) => submit(&orchestrator, cmd).await,
        opt::SubCmd::Show(cmd) => show(&orchestrator, cmd).await,
    };
    if let Err(e) = res {
        eprintln!("error {}: {}", e.status_code(), e.public_message());
        if let SubmitError::ExternalService { details, .. } = &e {
            eprintln!("{}", details);
        }
        exit(1);
    }
}

fn init_logging() {
    tracing_log::LogTracer::init().expect("Failed to bridge log records");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set up logger");
}

async fn load_config(opt: &opt::GlobalOpts) -> anyhow::Result<OrchestratorConfig> {
    let mut cfg = OrchestratorConfig::load(opt.config.as_deref()).await?;
    if let Some(url) = &opt.judge_url {
        cfg.judge.base_url = url.clone();
    }
    if opt.api_key.is_some() {
        cfg.judge.api_key = opt.api_key.clone();
    }
    if opt.api_host.is_some() {
        cfg.judge.api_host = opt.api_host.clone();
    }
    if opt.auth_token.is_some() {
        cfg.judge.auth_token = opt.auth_token.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn build_orchestrator(cfg: Arc<OrchestratorConfig>) -> Result<Orchestrator, SubmitError> {
    let judge = Arc::new(HttpJudgeClient::new(cfg.judge.clone())?);
    let store = Arc::new(FsStore::new(cfg.data_dir.clone()));
    tracing::debug!("Using data directory {}", cfg.data_dir.display());
    Ok(Orchestrator::new(cfg, judge, store.clone(), store))
}

async fn submit(orchestrator: &Orchestrator, cmd: opt::SubmitSubCmd) -> Result<(), SubmitError> {
    let code = tokio::fs::read_to_string(&cmd.file).await.map_err(|e| {
        SubmitError::Validation(format!("cannot read {}: {}", cmd.file.display(), e))
    })?;
    let outcome = orchestrator
        .submit(SubmitRequest {
            problem_id: cmd.problem,
            language: cmd.language,
            code,
            author_id: cmd.author,
        })
        .await?;
    print_json(&outcome)
}

async fn show(orchestrator: &Orchestrator, cmd: opt::ShowSubCmd) -> Result<(), SubmitError> {
    let id = FlowSnake::parse(&cmd.id)
        .map_err(|_| SubmitError::Validation(format!("`{}` is not a submission id", cmd.id)))?;
    let submission = orchestrator.submission(id).await?;
    print_json(&submission)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), SubmitError> {
    let out = serde_json::to_string_pretty(value).map_err(|e| SubmitError::Server(e.to_string()))?;
    println!("{}", out);
    Ok(())
}

fn handle_ctrl_c(shutdown: &CancellationToken) {
    if !CTRL_C.load(Ordering::SeqCst) {
        tracing::warn!("Cancelling running judging... Press Ctrl-C again to force quit.");
        CTRL_C.store(true, Ordering::SeqCst);
        shutdown.cancel();
    } else if !CTRL_C_TWICE.load(Ordering::SeqCst) {
        tracing::error!("Force quit!");
        CTRL_C_TWICE.store(true, Ordering::SeqCst);
        exit(101);
    }
}
