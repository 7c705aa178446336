use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RunId = String;

/// Argumento con el que se marca una corrida lanzada por el reintento.
pub const TRIGGERED_BY_ARG: &str = "--triggered_by";
pub const TRIGGERED_BY_RETRY: &str = "LambdaRetry";
/// Corrida fallida original a la que pertenece un reintento (episodio).
pub const RETRY_OF_ARG: &str = "--retry_of";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobRunState {
    Starting,
    Running,
    Succeeded,
    Failed,
    Stopped,
    Timeout,
}

impl JobRunState {
    /// Estados desde los que el scheduler ya no transiciona solo.
    pub const TERMINAL: [JobRunState; 4] = [
        JobRunState::Succeeded,
        JobRunState::Failed,
        JobRunState::Stopped,
        JobRunState::Timeout,
    ];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunState::Starting => "STARTING",
            JobRunState::Running => "RUNNING",
            JobRunState::Succeeded => "SUCCEEDED",
            JobRunState::Failed => "FAILED",
            JobRunState::Stopped => "STOPPED",
            JobRunState::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for JobRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlerState {
    Ready,
    Running,
    Stopping,
}

/// Corrida de un job, tal como la reporta el scheduler externo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: RunId,
    pub state: JobRunState,

    #[serde(default)]
    pub arguments: HashMap<String, String>,

    #[serde(default)]
    pub started_on: Option<DateTime<Utc>>,
}

impl JobRun {
    /// Episodio de fallo al que pertenece esta corrida: la corrida original
    /// si esta es un reintento, o ella misma si no.
    pub fn episode_id(&self) -> &str {
        self.arguments
            .get(RETRY_OF_ARG)
            .map(String::as_str)
            .unwrap_or(&self.id)
    }
}

/* --------- Cuerpos del protocolo HTTP del plano de control --------- */

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRunRequest {
    pub arguments: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunResponse {
    pub run_id: RunId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerTargetRequest {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerInfo {
    pub name: String,
    pub state: CrawlerState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub subject: String,
    pub message: String,
}
