use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use common::{HttpControlPlane, JobControl, JobRun, PipelineConfig, SqliteRetryLedger};
use std::{io::Read, path::PathBuf, time::Duration};
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::pipeline::{run_pipeline, PipelineOutcome, PipelinePlan};
use crate::retry::{handle_event, report_controller_error, RetryPlan};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Dispara el pipeline ETL de taxis y sus reintentos")]
struct Cli {
    /// URL del plano de control (si no, CONTROL_PLANE_URL)
    #[arg(long, global = true)]
    control_plane: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawler crudo -> job ETL -> crawler procesado
    Pipeline {
        /// Fecha de la partición (YYYY-MM-DD). Por defecto, hoy.
        #[arg(long, value_name = "FECHA")]
        date: Option<NaiveDate>,

        /// Límite de espera del job en segundos (por defecto sin límite)
        #[arg(long)]
        job_timeout_secs: Option<u64>,
    },
    /// Procesa una alarma de fallo y reintenta el job si corresponde
    Retry {
        /// Archivo con el evento JSON, o "-" para stdin
        #[arg(value_name = "EVENTO", default_value = "-")]
        event: String,

        /// Base del contador de reintentos (si no, RETRY_LEDGER_PATH)
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
    /// Consulta el estado de una corrida del job
    Status {
        #[arg(value_name = "RUN_ID")]
        run_id: String,
    },
    /// Lista las corridas más recientes del job
    Runs {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("orchestrator=info,common=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn read_event(source: &str) -> Result<String> {
    if source == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("leyendo el evento desde stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("leyendo el evento {}", source))
    }
}

fn print_run(run: &JobRun) {
    println!("Corrida:");
    println!("  id: {}", run.id);
    println!("  estado: {}", run.state);
    if let Some(started) = run.started_on {
        println!("  iniciada: {}", started);
    }
    if !run.arguments.is_empty() {
        let mut args: Vec<_> = run.arguments.iter().collect();
        args.sort();
        for (k, v) in args {
            println!("  {} = {}", k, v);
        }
    }
}

pub async fn run() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = PipelineConfig::from_env();

    let base_url = cli
        .control_plane
        .clone()
        .unwrap_or_else(|| cfg.control_plane_url.clone());
    let cp = HttpControlPlane::new(base_url);

    // Cada invocación lleva su propio id para seguirla en los logs.
    let request_id = Uuid::new_v4();
    let span = info_span!("invocation", request_id = %request_id);
    dispatch(cli.command, cfg, cp).instrument(span).await
}

async fn dispatch(command: Commands, cfg: PipelineConfig, cp: HttpControlPlane) -> Result<()> {
    info!("plano de control en {}", cp.base_url());

    match command {
        Commands::Pipeline {
            date,
            job_timeout_secs,
        } => {
            let date = date
                .unwrap_or_else(|| Local::now().date_naive())
                .format("%Y-%m-%d")
                .to_string();
            let mut plan = PipelinePlan::from_config(&cfg, &date);
            if let Some(secs) = job_timeout_secs {
                plan.job_poller.max_wait = Some(Duration::from_secs(secs));
            }

            let outcome = run_pipeline(&cp, &plan)
                .await
                .with_context(|| format!("pipeline para {}", date))?;

            match outcome {
                PipelineOutcome::Completed { run_id } => {
                    println!("Pipeline completo para {} (corrida {})", date, run_id);
                }
                PipelineOutcome::JobFailed { run_id, state } => {
                    println!("El job {} terminó con estado {}", run_id, state);
                }
                PipelineOutcome::JobUnresolved { run_id, last_state } => {
                    println!(
                        "El job {} no terminó a tiempo (último estado {})",
                        run_id, last_state
                    );
                }
            }
        }

        Commands::Retry { event, ledger } => {
            let plan = RetryPlan::from_config(&cfg);
            let path = ledger.unwrap_or(cfg.retry_ledger_path);

            let decision = match (read_event(&event), SqliteRetryLedger::open(&path)) {
                (Ok(raw), Ok(ledger)) => handle_event(&cp, &ledger, &plan, &raw).await,
                (Err(e), _) => {
                    let e: Box<dyn std::error::Error> = e.into();
                    report_controller_error(&cp, &plan.topic, e.as_ref()).await
                }
                (_, Err(e)) => report_controller_error(&cp, &plan.topic, &e).await,
            };
            println!("Decisión: {:?}", decision);
        }

        Commands::Status { run_id } => {
            let run = cp
                .get_run(&cfg.job_name, &run_id)
                .await
                .with_context(|| format!("consultando la corrida {}", run_id))?;
            print_run(&run);
        }

        Commands::Runs { limit } => {
            if limit == 0 {
                bail!("--limit debe ser mayor que 0");
            }
            let runs = cp.list_runs(&cfg.job_name, limit).await?;
            if runs.is_empty() {
                println!("No hay corridas del job {}.", cfg.job_name);
            }
            for run in runs {
                print_run(&run);
                println!();
            }
        }
    }

    Ok(())
}
