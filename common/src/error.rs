//! Errores tipados de cada etapa.
//!
//! Los binarios los envuelven con `anyhow`; aquí se distinguen por variante,
//! nunca por el texto del mensaje.

use std::io;

use arrow::error::ArrowError;
use chrono::NaiveDate;
use parquet::errors::ParquetError;

/// Fallo del lector de particiones (colaborador de almacenamiento).
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("la ruta no existe: {0}")]
    PathNotFound(String),

    #[error("error de E/S leyendo {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("CSV inválido en {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("JSON inválido en {path} (línea {line}): {source}")]
    Json {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("parquet inválido en {path}: {source}")]
    Parquet {
        path: String,
        #[source]
        source: ParquetError,
    },

    #[error("columna incompatible en {path}: {source}")]
    Arrow {
        path: String,
        #[source]
        source: ArrowError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Partición inexistente o sin filas.
    #[error("no hay datos de entrada en {0}: la ruta falta o está vacía")]
    EmptyInput(String),

    /// Estructura inesperada o formato no soportado.
    #[error("esquema inválido o formato no soportado en la partición cruda")]
    Schema(#[source] LoadError),
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("ventana de fechas invertida: {start} > {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// La etapa anterior falló; no se escribe nada.
    #[error("no se publica: la transformación falló")]
    Transform(#[from] TransformError),

    #[error("error de E/S escribiendo {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("error serializando CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("error serializando JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("error escribiendo parquet: {0}")]
    Parquet(#[from] ParquetError),

    #[error("error armando el lote columnar: {0}")]
    Arrow(#[from] ArrowError),
}

/// Error de una corrida completa del job (ingesta -> transformación -> publicación).
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Errores del plano de control (jobs, crawlers, notificaciones).
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("el crawler {0} ya está corriendo")]
    AlreadyRunning(String),

    #[error("recurso no encontrado: {0}")]
    NotFound(String),

    #[error("el plano de control respondió {status}: {body}")]
    Status { status: u16, body: String },

    #[error("error HTTP: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("error de sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("error de E/S: {0}")]
    Io(#[from] io::Error),

    #[error("lock del ledger envenenado")]
    LockPoisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("evento no es JSON válido: {0}")]
    Json(#[from] serde_json::Error),

    #[error("el evento no trae registros de notificación")]
    NoRecords,
}

/// Cualquier fallo dentro del controlador de reintentos. Nunca sale del
/// controlador: se convierte en una notificación.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("el job {0} no tiene corridas")]
    NoRuns(String),
}
