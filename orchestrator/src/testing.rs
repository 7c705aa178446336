//! Plano de control falso para los tests del orquestador: estados
//! guionados por cola y registro de todas las llamadas.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use common::{
    ControlError, CrawlerControl, CrawlerState, JobControl, JobRun, JobRunState, Notifier, RunId,
};

#[derive(Default)]
pub struct FakePlane {
    pub calls: RefCell<Vec<String>>,
    /// Resultado de cada `start_crawler`, en orden; vacío = Ok.
    pub crawler_starts: RefCell<VecDeque<Result<(), ControlError>>>,
    /// Estados devueltos por `crawler_state`; vacío = READY.
    pub crawler_states: RefCell<VecDeque<CrawlerState>>,
    /// Estados devueltos por `get_run`; al vaciarse repite el último.
    pub job_states: RefCell<VecDeque<JobRunState>>,
    pub runs: RefCell<Vec<JobRun>>,
    pub started_args: RefCell<Vec<HashMap<String, String>>>,
    pub fail_start_run: Cell<bool>,
    pub fail_publish: Cell<bool>,
    pub published: RefCell<Vec<(String, String, String)>>,
    next_run: Cell<u32>,
    last_job_state: Cell<Option<JobRunState>>,
}

impl FakePlane {
    pub fn with_job_states(states: &[JobRunState]) -> Self {
        let plane = Self::default();
        plane.job_states.borrow_mut().extend(states.iter().copied());
        plane
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.published
            .borrow()
            .iter()
            .map(|(_, subject, _)| subject.clone())
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

pub fn run(id: &str, state: JobRunState, retry_of: Option<&str>) -> JobRun {
    let mut arguments = HashMap::new();
    if let Some(original) = retry_of {
        arguments.insert(common::job::RETRY_OF_ARG.to_string(), original.to_string());
    }
    JobRun {
        id: id.to_string(),
        state,
        arguments,
        started_on: None,
    }
}

impl JobControl for FakePlane {
    async fn start_run(
        &self,
        job_name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<RunId, ControlError> {
        self.record(format!("start_run {}", job_name));
        if self.fail_start_run.get() {
            return Err(ControlError::Status {
                status: 500,
                body: "scheduler caído".to_string(),
            });
        }
        self.started_args.borrow_mut().push(arguments);
        let n = self.next_run.get() + 1;
        self.next_run.set(n);
        Ok(format!("jr_new_{}", n))
    }

    async fn get_run(&self, job_name: &str, run_id: &str) -> Result<JobRun, ControlError> {
        self.record(format!("get_run {} {}", job_name, run_id));
        let state = match self.job_states.borrow_mut().pop_front() {
            Some(s) => s,
            None => self.last_job_state.get().unwrap_or(JobRunState::Succeeded),
        };
        self.last_job_state.set(Some(state));
        Ok(run(run_id, state, None))
    }

    async fn list_runs(&self, job_name: &str, limit: usize) -> Result<Vec<JobRun>, ControlError> {
        self.record(format!("list_runs {} {}", job_name, limit));
        Ok(self.runs.borrow().iter().take(limit).cloned().collect())
    }
}

impl CrawlerControl for FakePlane {
    async fn update_target(
        &self,
        name: &str,
        path: &str,
        table_prefix: Option<&str>,
    ) -> Result<(), ControlError> {
        self.record(format!(
            "update_target {} {} {}",
            name,
            path,
            table_prefix.unwrap_or("-")
        ));
        Ok(())
    }

    async fn start_crawler(&self, name: &str) -> Result<(), ControlError> {
        self.record(format!("start_crawler {}", name));
        self.crawler_starts.borrow_mut().pop_front().unwrap_or(Ok(()))
    }

    async fn crawler_state(&self, name: &str) -> Result<CrawlerState, ControlError> {
        self.record(format!("crawler_state {}", name));
        Ok(self
            .crawler_states
            .borrow_mut()
            .pop_front()
            .unwrap_or(CrawlerState::Ready))
    }
}

impl Notifier for FakePlane {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), ControlError> {
        self.record(format!("publish {} {}", topic, subject));
        if self.fail_publish.get() {
            return Err(ControlError::Status {
                status: 503,
                body: "topic no disponible".to_string(),
            });
        }
        self.published.borrow_mut().push((
            topic.to_string(),
            subject.to_string(),
            message.to_string(),
        ));
        Ok(())
    }
}
