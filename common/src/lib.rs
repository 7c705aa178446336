pub mod columnar;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod event;
pub mod job;
pub mod lake;
pub mod ledger;
pub mod poller;
pub mod results;
pub mod transform;
pub mod trip;

pub use config::PipelineConfig;
pub use control::{CrawlerControl, HttpControlPlane, JobControl, Notifier};
pub use error::{
    ControlError, EventError, IngestError, JobError, LedgerError, LoadError, PublishError,
    RetryError, TransformError,
};
pub use event::{AlarmEvent, AlarmPayload};
pub use job::{CrawlerState, JobRun, JobRunState, RunId};
pub use lake::{DataFormat, DataLake};
pub use ledger::{RetryLedger, SqliteRetryLedger};
pub use poller::{PollOutcome, StatusPoller};
pub use results::PublishReport;
pub use transform::{DateWindow, TransformStats};
pub use trip::{ProcessedTrip, RawTrip, TripCategory};
