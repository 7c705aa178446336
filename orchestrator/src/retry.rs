//! Reintento del job ETL ante una alarma de fallo.
//!
//! Como mucho `retry_limit` reintentos por episodio de fallo. El episodio es
//! la corrida original: un reintento que vuelve a fallar no abre uno nuevo.

use std::{collections::HashMap, time::Duration};

use common::{
    job::{RETRY_OF_ARG, TRIGGERED_BY_ARG, TRIGGERED_BY_RETRY},
    poller::RETRY_JOB_POLLER,
    AlarmEvent, AlarmPayload, JobControl, JobRunState, Notifier, PipelineConfig, PollOutcome,
    RetryError, RetryLedger, RunId, StatusPoller,
};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Pausa antes de reenviar el job, para que el scheduler asiente la falla.
pub const SETTLE_DELAY: Duration = Duration::from_secs(60);

pub const SUBJECT_SUCCEEDED: &str = "ETL job retry succeeded";
pub const SUBJECT_FAILED: &str = "ETL job retry failed";
pub const SUBJECT_UNRESOLVED: &str = "ETL job retry did not finish";
pub const SUBJECT_CONTROLLER_ERROR: &str = "Retry controller error";

#[derive(Debug, Clone)]
pub struct RetryPlan {
    pub job_name: String,
    pub topic: String,
    pub retry_limit: u32,
    pub settle_delay: Duration,
    pub poller: StatusPoller,
}

impl RetryPlan {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            job_name: cfg.job_name.clone(),
            topic: cfg.notify_topic.clone(),
            retry_limit: cfg.retry_limit,
            settle_delay: SETTLE_DELAY,
            poller: RETRY_JOB_POLLER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded,
    Failed(JobRunState),
    /// Se venció la espera; lleva el último estado visto.
    Unresolved(JobRunState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// La última corrida sigue en curso; no se hace nada.
    SkippedRunning { run_id: RunId },
    /// El episodio ya usó su presupuesto.
    BudgetExhausted { episode: String },
    Retried {
        episode: String,
        run_id: RunId,
        outcome: RetryOutcome,
    },
    /// Algo falló; ya se notificó con `SUBJECT_CONTROLLER_ERROR`.
    ControllerError(String),
}

/// Punto de entrada del controlador. Nunca devuelve error: cualquier fallo
/// se publica en el topic de notificaciones.
pub async fn handle_event<C, L>(cp: &C, ledger: &L, plan: &RetryPlan, raw_event: &str) -> RetryDecision
where
    C: JobControl + Notifier,
    L: RetryLedger,
{
    match try_retry(cp, ledger, plan, raw_event).await {
        Ok(decision) => decision,
        Err(e) => report_controller_error(cp, &plan.topic, &e).await,
    }
}

/// Publica un fallo del controlador. Si la publicación también falla solo
/// queda en el log.
pub async fn report_controller_error<N, E>(notifier: &N, topic: &str, err: &E) -> RetryDecision
where
    N: Notifier,
    E: std::error::Error + ?Sized,
{
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }

    error!("el controlador de reintentos falló: {}", detail);
    let message = format!("The retry controller failed to retry the ETL job: {}", detail);
    if let Err(e) = notifier
        .publish(topic, SUBJECT_CONTROLLER_ERROR, &message)
        .await
    {
        error!("tampoco se pudo notificar el error: {}", e);
    }
    RetryDecision::ControllerError(detail)
}

async fn try_retry<C, L>(
    cp: &C,
    ledger: &L,
    plan: &RetryPlan,
    raw_event: &str,
) -> Result<RetryDecision, RetryError>
where
    C: JobControl + Notifier,
    L: RetryLedger,
{
    let alarm = AlarmEvent::from_json(raw_event)?;
    info!(
        "alarma recibida: {} (asunto {})",
        alarm.payload.alarm_name(),
        alarm.subject.as_deref().unwrap_or("-")
    );
    info!("motivo: {}", alarm.payload.reason());
    if let AlarmPayload::Opaque(raw) = &alarm.payload {
        warn!("mensaje de alarma sin estructura: {}", raw);
    }

    let last = cp
        .list_runs(&plan.job_name, 1)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| RetryError::NoRuns(plan.job_name.clone()))?;
    info!("última corrida {}: {}", last.id, last.state);

    if last.state == JobRunState::Running {
        info!("la corrida {} sigue en curso, no se reintenta", last.id);
        return Ok(RetryDecision::SkippedRunning { run_id: last.id });
    }

    let episode = last.episode_id().to_string();
    if !ledger.try_claim(&episode, plan.retry_limit)? {
        warn!(
            "el episodio {} ya agotó sus {} reintento(s), no se reintenta",
            episode, plan.retry_limit
        );
        return Ok(RetryDecision::BudgetExhausted { episode });
    }
    info!(
        "reintento reclamado para el episodio {} ({} de {})",
        episode,
        ledger.retries_for(&episode)?,
        plan.retry_limit
    );

    sleep(plan.settle_delay).await;

    let arguments = HashMap::from([
        (TRIGGERED_BY_ARG.to_string(), TRIGGERED_BY_RETRY.to_string()),
        (RETRY_OF_ARG.to_string(), episode.clone()),
    ]);
    let run_id = match cp.start_run(&plan.job_name, arguments).await {
        Ok(id) => id,
        Err(e) => {
            // el reintento no salió: se devuelve al presupuesto del episodio
            if let Err(le) = ledger.release(&episode) {
                error!("no se pudo devolver el reintento de {}: {}", episode, le);
            }
            return Err(e.into());
        }
    };
    info!("job {} reenviado, corrida {}", plan.job_name, run_id);

    let job_name = plan.job_name.as_str();
    let rid = run_id.as_str();
    let label = format!("reintento {}", run_id);
    let polled = plan
        .poller
        .wait_job(&label, move || async move {
            cp.get_run(job_name, rid).await.map(|r| r.state)
        })
        .await?;

    let (outcome, subject, message) = match polled {
        PollOutcome::Terminal(JobRunState::Succeeded) => (
            RetryOutcome::Succeeded,
            SUBJECT_SUCCEEDED,
            format!(
                "The retried ETL job finished successfully.\nJobRunId: {}\nRetry of: {}",
                run_id, episode
            ),
        ),
        PollOutcome::Terminal(state) => (
            RetryOutcome::Failed(state),
            SUBJECT_FAILED,
            format!(
                "The retried ETL job failed again with state {}. Manual intervention required.\nJobRunId: {}\nRetry of: {}",
                state, run_id, episode
            ),
        ),
        PollOutcome::TimedOut(state) => (
            RetryOutcome::Unresolved(state),
            SUBJECT_UNRESOLVED,
            format!(
                "The retried ETL job did not reach a final state within {:?} (last state {}).\nJobRunId: {}\nRetry of: {}",
                plan.poller.max_wait.unwrap_or_default(),
                state,
                run_id,
                episode
            ),
        ),
    };

    info!("resultado del reintento {}: {:?}", run_id, outcome);
    cp.publish(&plan.topic, subject, &message).await?;

    Ok(RetryDecision::Retried {
        episode,
        run_id,
        outcome,
    })
}
