//! Clientes del plano de control: scheduler de jobs, crawlers del catálogo y
//! notificaciones. Los controladores dependen de los traits; el binario usa
//! `HttpControlPlane`.

#![allow(async_fn_in_trait)]

use std::collections::HashMap;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ControlError;
use crate::job::{
    CrawlerInfo, CrawlerState, CrawlerTargetRequest, JobRun, PublishRequest, RunId,
    StartRunRequest, StartRunResponse,
};

pub trait JobControl {
    async fn start_run(
        &self,
        job_name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<RunId, ControlError>;

    async fn get_run(&self, job_name: &str, run_id: &str) -> Result<JobRun, ControlError>;

    /// Corridas más recientes primero.
    async fn list_runs(&self, job_name: &str, limit: usize) -> Result<Vec<JobRun>, ControlError>;
}

pub trait CrawlerControl {
    async fn update_target(
        &self,
        name: &str,
        path: &str,
        table_prefix: Option<&str>,
    ) -> Result<(), ControlError>;

    /// Devuelve `ControlError::AlreadyRunning` si el crawler ya está corriendo.
    async fn start_crawler(&self, name: &str) -> Result<(), ControlError>;

    async fn crawler_state(&self, name: &str) -> Result<CrawlerState, ControlError>;
}

pub trait Notifier {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), ControlError>;
}

/// Cliente HTTP del plano de control.
/// - Local: http://localhost:8080
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    base_url: String,
}

impl HttpControlPlane {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }
}

/// Convierte status no-2xx en errores tipados.
async fn check(resp: Response, what: &str) -> Result<Response, ControlError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ControlError::NotFound(what.to_string()));
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ControlError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn json_body<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T, ControlError> {
    let resp = check(resp, what).await?;
    Ok(resp.json().await?)
}

impl JobControl for HttpControlPlane {
    async fn start_run(
        &self,
        job_name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<RunId, ControlError> {
        let url = self.url(&format!("/jobs/{}/runs", job_name));
        debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .json(&StartRunRequest { arguments })
            .send()
            .await?;
        let body: StartRunResponse = json_body(resp, job_name).await?;
        Ok(body.run_id)
    }

    async fn get_run(&self, job_name: &str, run_id: &str) -> Result<JobRun, ControlError> {
        let url = self.url(&format!("/jobs/{}/runs/{}", job_name, run_id));
        debug!("GET {}", url);
        let resp = self.client.get(&url).send().await?;
        json_body(resp, run_id).await
    }

    async fn list_runs(&self, job_name: &str, limit: usize) -> Result<Vec<JobRun>, ControlError> {
        let url = self.url(&format!("/jobs/{}/runs", job_name));
        debug!("GET {} limit={}", url, limit);
        let resp = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;
        json_body(resp, job_name).await
    }
}

impl CrawlerControl for HttpControlPlane {
    async fn update_target(
        &self,
        name: &str,
        path: &str,
        table_prefix: Option<&str>,
    ) -> Result<(), ControlError> {
        let url = self.url(&format!("/crawlers/{}/target", name));
        debug!("PUT {} path={}", url, path);
        let resp = self
            .client
            .put(&url)
            .json(&CrawlerTargetRequest {
                path: path.to_string(),
                table_prefix: table_prefix.map(str::to_string),
            })
            .send()
            .await?;
        check(resp, name).await?;
        Ok(())
    }

    async fn start_crawler(&self, name: &str) -> Result<(), ControlError> {
        let url = self.url(&format!("/crawlers/{}/start", name));
        debug!("POST {}", url);
        let resp = self.client.post(&url).send().await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(ControlError::AlreadyRunning(name.to_string()));
        }
        check(resp, name).await?;
        Ok(())
    }

    async fn crawler_state(&self, name: &str) -> Result<CrawlerState, ControlError> {
        let url = self.url(&format!("/crawlers/{}", name));
        let resp = self.client.get(&url).send().await?;
        let info: CrawlerInfo = json_body(resp, name).await?;
        Ok(info.state)
    }
}

impl Notifier for HttpControlPlane {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), ControlError> {
        let url = self.url(&format!("/topics/{}/messages", topic));
        debug!("POST {} subject={}", url, subject);
        let resp = self
            .client
            .post(&url)
            .json(&PublishRequest {
                subject: subject.to_string(),
                message: message.to_string(),
            })
            .send()
            .await?;
        check(resp, topic).await?;
        Ok(())
    }
}
