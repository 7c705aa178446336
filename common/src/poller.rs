//! Espera acotada sobre una operación externa asíncrona (crawler, corrida de job).

use std::{fmt::Debug, future::Future, time::Duration};

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::job::{CrawlerState, JobRunState};

/// Resultado de una espera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<S> {
    /// Se llegó a uno de los estados terminales.
    Terminal(S),
    /// Se venció `max_wait`; lleva el último estado observado.
    TimedOut(S),
}

/// Poller con intervalo fijo, sin backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPoller {
    pub interval: Duration,
    /// `None` = espera sin límite.
    pub max_wait: Option<Duration>,
}

/// Crawler: hasta READY, cada 45 s, máximo 5 minutos.
pub const CRAWLER_POLLER: StatusPoller = StatusPoller {
    interval: Duration::from_secs(45),
    max_wait: Some(Duration::from_secs(300)),
};

/// Corrida del pipeline: cada 100 s, sin límite.
pub const PIPELINE_JOB_POLLER: StatusPoller = StatusPoller {
    interval: Duration::from_secs(100),
    max_wait: None,
};

/// Corrida de reintento: cada 20 s, máximo 10 minutos.
pub const RETRY_JOB_POLLER: StatusPoller = StatusPoller {
    interval: Duration::from_secs(20),
    max_wait: Some(Duration::from_secs(600)),
};

pub const CRAWLER_TERMINAL: [CrawlerState; 1] = [CrawlerState::Ready];

impl StatusPoller {
    pub fn new(interval: Duration, max_wait: Option<Duration>) -> Self {
        Self { interval, max_wait }
    }

    /// Consulta el estado con `fetch` hasta que caiga en `terminal` o se
    /// venza `max_wait`. Los errores de `fetch` se propagan tal cual.
    ///
    /// El plazo se revisa después de cada pausa: nunca se consulta en
    /// `t >= max_wait`, así que con 20 s / 600 s hay 30 consultas (0..=580).
    pub async fn wait<S, E, F, Fut>(
        &self,
        label: &str,
        terminal: &[S],
        mut fetch: F,
    ) -> Result<PollOutcome<S>, E>
    where
        S: PartialEq + Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S, E>>,
    {
        info!("esperando a {}...", label);
        let started = Instant::now();

        loop {
            let state = fetch().await?;
            info!("{} estado: {:?}", label, state);

            if terminal.contains(&state) {
                return Ok(PollOutcome::Terminal(state));
            }

            sleep(self.interval).await;

            if let Some(max_wait) = self.max_wait {
                if started.elapsed() >= max_wait {
                    warn!(
                        "tiempo máximo de espera ({:?}) superado para {}",
                        max_wait, label
                    );
                    return Ok(PollOutcome::TimedOut(state));
                }
            }
        }
    }

    pub async fn wait_job<E, F, Fut>(
        &self,
        label: &str,
        fetch: F,
    ) -> Result<PollOutcome<JobRunState>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<JobRunState, E>>,
    {
        self.wait(label, &JobRunState::TERMINAL, fetch).await
    }

    pub async fn wait_crawler<E, F, Fut>(
        &self,
        label: &str,
        fetch: F,
    ) -> Result<PollOutcome<CrawlerState>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CrawlerState, E>>,
    {
        self.wait(label, &CRAWLER_TERMINAL, fetch).await
    }
}
