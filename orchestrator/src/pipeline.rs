//! Secuencia diaria: crawler crudo -> job ETL -> crawler procesado.

use std::collections::HashMap;

use common::{
    lake::{processed_uri, raw_uri},
    poller::{CRAWLER_POLLER, PIPELINE_JOB_POLLER},
    ControlError, CrawlerControl, JobControl, JobRunState, PipelineConfig, PollOutcome, RunId,
    StatusPoller,
};
use tracing::{error, info, warn};

/// Todo lo que necesita una corrida del pipeline.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    pub date: String,
    pub lake_uri: String,
    pub job_name: String,
    pub raw_crawler: String,
    pub processed_crawler: String,
    pub crawler_poller: StatusPoller,
    pub job_poller: StatusPoller,
}

impl PipelinePlan {
    pub fn from_config(cfg: &PipelineConfig, date: &str) -> Self {
        Self {
            date: date.to_string(),
            lake_uri: cfg.lake_uri.clone(),
            job_name: cfg.job_name.clone(),
            raw_crawler: cfg.raw_crawler.clone(),
            processed_crawler: cfg.processed_crawler.clone(),
            crawler_poller: CRAWLER_POLLER,
            job_poller: PIPELINE_JOB_POLLER,
        }
    }

    pub fn processed_table_prefix(&self) -> String {
        format!("processed_nyc_taxi_{}", self.date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// El job terminó bien y se catalogó la salida.
    Completed { run_id: RunId },
    /// El job terminó en un estado distinto de SUCCEEDED.
    JobFailed { run_id: RunId, state: JobRunState },
    /// Se venció la espera acotada del job; lleva el último estado visto.
    JobUnresolved { run_id: RunId, last_state: JobRunState },
}

/// Apunta el crawler a `path`, lo arranca y espera a que vuelva a READY.
/// "Ya está corriendo" no es error; la espera vencida solo se registra.
async fn discover<C: CrawlerControl>(
    cp: &C,
    name: &str,
    path: &str,
    table_prefix: Option<&str>,
    poller: &StatusPoller,
) -> Result<(), ControlError> {
    cp.update_target(name, path, table_prefix).await?;
    info!("crawler {} apuntado a {}", name, path);

    match cp.start_crawler(name).await {
        Ok(()) => info!("crawler {} iniciado", name),
        Err(ControlError::AlreadyRunning(_)) => {
            warn!("el crawler {} ya está corriendo, se espera igual", name)
        }
        Err(e) => {
            error!("no se pudo iniciar el crawler {}: {}", name, e);
            return Err(e);
        }
    }

    let label = format!("crawler {}", name);
    let outcome = poller
        .wait_crawler(&label, move || cp.crawler_state(name))
        .await?;

    if let PollOutcome::TimedOut(state) = outcome {
        warn!(
            "el crawler {} no terminó a tiempo (último estado {:?}); se continúa",
            name, state
        );
    }
    Ok(())
}

/// Corre la secuencia completa para `plan.date`. Solo devuelve `Err` si
/// falla una llamada al plano de control; un job fallido es un resultado.
pub async fn run_pipeline<C>(cp: &C, plan: &PipelinePlan) -> Result<PipelineOutcome, ControlError>
where
    C: JobControl + CrawlerControl,
{
    info!("pipeline iniciado para la partición {}", plan.date);

    discover(
        cp,
        &plan.raw_crawler,
        &raw_uri(&plan.lake_uri, &plan.date),
        None,
        &plan.crawler_poller,
    )
    .await?;

    let run_id = cp
        .start_run(&plan.job_name, HashMap::new())
        .await
        .map_err(|e| {
            error!("no se pudo iniciar el job {}: {}", plan.job_name, e);
            e
        })?;
    info!("job {} iniciado, corrida {}", plan.job_name, run_id);

    let job_name = plan.job_name.as_str();
    let rid = run_id.as_str();
    let label = format!("corrida {}", run_id);
    let outcome = plan
        .job_poller
        .wait_job(&label, move || async move {
            cp.get_run(job_name, rid).await.map(|r| r.state)
        })
        .await?;

    match outcome {
        PollOutcome::Terminal(JobRunState::Succeeded) => {
            info!("job terminado, catalogando la salida procesada");
            discover(
                cp,
                &plan.processed_crawler,
                &processed_uri(&plan.lake_uri, &plan.date),
                Some(&plan.processed_table_prefix()),
                &plan.crawler_poller,
            )
            .await?;
            info!("pipeline completo para {}", plan.date);
            Ok(PipelineOutcome::Completed { run_id })
        }
        PollOutcome::Terminal(state) => {
            error!("el job {} terminó con estado {}", run_id, state);
            Ok(PipelineOutcome::JobFailed { run_id, state })
        }
        PollOutcome::TimedOut(last_state) => {
            error!(
                "el job {} no terminó dentro del límite (último estado {})",
                run_id, last_state
            );
            Ok(PipelineOutcome::JobUnresolved { run_id, last_state })
        }
    }
}
