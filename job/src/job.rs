use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use common::{
    lake::run_job, DataFormat, DataLake, DateWindow, PipelineConfig,
};
use std::{path::PathBuf, time::Instant};
use sysinfo::{System, SystemExt};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "etl-job")]
#[command(about = "Limpia y enriquece la partición diaria de viajes de taxi")]
struct Args {
    /// Fecha de la partición (YYYY-MM-DD). Por defecto, hoy.
    #[arg(long, value_name = "FECHA")]
    date: Option<NaiveDate>,

    /// Raíz del data lake (si no, LAKE_ROOT)
    #[arg(long)]
    lake_root: Option<PathBuf>,

    /// parquet | csv | jsonl (si no, OUTPUT_FORMAT)
    #[arg(long)]
    format: Option<DataFormat>,

    /// Inicio de la ventana de fechas de recogida
    #[arg(long)]
    window_start: Option<NaiveDate>,

    /// Fin (inclusivo) de la ventana de fechas de recogida
    #[arg(long)]
    window_end: Option<NaiveDate>,

    /// Quién lanzó la corrida, ej: LambdaRetry
    #[arg(long = "triggered_by")]
    triggered_by: Option<String>,

    /// Corrida original si esta es un reintento
    #[arg(long = "retry_of")]
    retry_of: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("etl_job=info,common=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn used_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.used_memory()
}

/// Una corrida del job:
/// - resuelve fecha, lake y ventana (flags > env > defaults)
/// - ingesta -> transformación -> publicación
/// - cualquier error termina el proceso con código != 0
pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = PipelineConfig::from_env();

    let date = args
        .date
        .unwrap_or_else(|| Local::now().date_naive())
        .format("%Y-%m-%d")
        .to_string();

    let lake = DataLake::new(
        args.lake_root.unwrap_or(cfg.lake_root),
        args.format.unwrap_or(cfg.format),
    );

    // La ventana se valida dentro de la transformación; si está invertida
    // la corrida falla sin publicar.
    let default_window = DateWindow::default();
    let window = DateWindow {
        start: args.window_start.unwrap_or(default_window.start),
        end: args.window_end.unwrap_or(default_window.end),
    };

    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    info!(
        "job iniciado en {} para la partición {} (formato={}, triggered_by={}, retry_of={})",
        hostname,
        date,
        lake.format(),
        args.triggered_by.as_deref().unwrap_or("-"),
        args.retry_of.as_deref().unwrap_or("-"),
    );
    info!("memoria usada al iniciar: {} bytes", used_memory());

    let started = Instant::now();
    let res = run_job(&lake, &date, &window);

    match res {
        Ok((report, stats)) => {
            info!(
                "job terminado en {:?}: {} filas publicadas en {} (iniciales={}, tras limpieza={}, descartadas={})",
                started.elapsed(),
                report.rows,
                report.output_dir,
                stats.initial,
                stats.cleaned,
                stats.dropped_by_cleaning(),
            );
            info!("memoria usada al terminar: {} bytes", used_memory());
            Ok(())
        }
        Err(e) => {
            error!("job fallido para la partición {}: {}", date, e);
            Err(e).with_context(|| format!("corrida del job para {}", date))
        }
    }
}
