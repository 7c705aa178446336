//! Data lake local: rutas de particiones diarias, ingesta y publicación.
//!
//! Layout:
//!   <root>/raw/nyc_taxi/<YYYY-MM-DD>/*.{parquet,csv,jsonl}
//!   <root>/processed/nyc_taxi/<YYYY-MM-DD>/part-00000.{parquet,csv,jsonl}

use std::{
    fmt, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::columnar::{read_parquet_trips, write_parquet_trips};
use crate::engine::{
    read_csv_to_records, read_jsonl_to_records, write_records_to_csv, write_records_to_jsonl,
};
use crate::error::{IngestError, JobError, LoadError, PublishError, TransformError};
use crate::results::PublishReport;
use crate::transform::{transform, DateWindow, TransformStats};
use crate::trip::{ProcessedTrips, RawTrips};

pub const RAW_PREFIX: &str = "raw/nyc_taxi";
pub const PROCESSED_PREFIX: &str = "processed/nyc_taxi";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Parquet,
    Csv,
    Jsonl,
}

impl DataFormat {
    /// Extensión con la que se escribe la salida.
    pub fn extension(&self) -> &'static str {
        match self {
            DataFormat::Parquet => "parquet",
            DataFormat::Csv => "csv",
            DataFormat::Jsonl => "jsonl",
        }
    }

    /// Extensiones que se aceptan al leer.
    fn read_extensions(&self) -> &'static [&'static str] {
        match self {
            DataFormat::Parquet => &["parquet"],
            DataFormat::Csv => &["csv"],
            DataFormat::Jsonl => &["jsonl", "json"],
        }
    }
}

impl FromStr for DataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parquet" => Ok(DataFormat::Parquet),
            "csv" => Ok(DataFormat::Csv),
            "jsonl" | "json" => Ok(DataFormat::Jsonl),
            other => Err(format!("formato no soportado: {other}")),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// URI de la partición cruda que se le pasa al crawler, ej:
/// "s3://bucket/raw/nyc_taxi/2024-05-01/"
pub fn raw_uri(lake_uri: &str, date: &str) -> String {
    format!("{}/{}/{}/", lake_uri.trim_end_matches('/'), RAW_PREFIX, date)
}

pub fn processed_uri(lake_uri: &str, date: &str) -> String {
    format!("{}/{}/{}/", lake_uri.trim_end_matches('/'), PROCESSED_PREFIX, date)
}

#[derive(Debug, Clone)]
pub struct DataLake {
    root: PathBuf,
    format: DataFormat,
}

impl DataLake {
    pub fn new(root: impl Into<PathBuf>, format: DataFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    pub fn format(&self) -> DataFormat {
        self.format
    }

    pub fn raw_dir(&self, date: &str) -> PathBuf {
        self.root.join(RAW_PREFIX).join(date)
    }

    pub fn processed_dir(&self, date: &str) -> PathBuf {
        self.root.join(PROCESSED_PREFIX).join(date)
    }

    /// Archivos de la partición con extensión del formato configurado,
    /// ordenados por nombre.
    pub fn list_partition_files(&self, dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
        let dir_str = dir.to_string_lossy().to_string();
        if !dir.is_dir() {
            return Err(LoadError::PathNotFound(dir_str));
        }

        let mut files = Vec::new();
        for ext in self.format.read_extensions() {
            let pattern = format!("{}/*.{}", glob::Pattern::escape(&dir_str), ext);
            let entries = glob::glob(&pattern).map_err(|e| LoadError::Io {
                path: dir_str.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
            })?;

            for entry in entries {
                let path = entry.map_err(|e| LoadError::Io {
                    path: dir_str.clone(),
                    source: e.into(),
                })?;
                if path.is_file() {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Carga todos los registros de la partición cruda de `date`.
    pub fn load_raw(&self, date: &str) -> Result<RawTrips, LoadError> {
        let dir = self.raw_dir(date);
        let mut out = Vec::new();

        for path in self.list_partition_files(&dir)? {
            let path_str = path.to_string_lossy().to_string();
            let mut recs: RawTrips = match self.format {
                DataFormat::Parquet => read_parquet_trips(&path_str)?,
                DataFormat::Csv => read_csv_to_records(&path_str)?,
                DataFormat::Jsonl => read_jsonl_to_records(&path_str)?,
            };
            info!("leídos {} registros de {}", recs.len(), path_str);
            out.append(&mut recs);
        }

        Ok(out)
    }
}

/// Etapa de ingesta: carga la partición y exige al menos una fila.
pub fn ingest(lake: &DataLake, date: &str) -> Result<RawTrips, IngestError> {
    let dir = lake.raw_dir(date).to_string_lossy().to_string();

    match lake.load_raw(date) {
        Ok(recs) if recs.is_empty() => {
            error!("no hay archivos de entrada en {}: la ruta está vacía", dir);
            Err(IngestError::EmptyInput(dir))
        }
        Ok(recs) => {
            info!("ingesta de {}: {} registros", dir, recs.len());
            Ok(recs)
        }
        Err(LoadError::PathNotFound(path)) => {
            error!("ruta de entrada inexistente: {}", path);
            Err(IngestError::EmptyInput(path))
        }
        Err(e) => {
            error!(
                error = ?e,
                "esquema inválido o formato no soportado en la partición {}",
                dir
            );
            Err(IngestError::Schema(e))
        }
    }
}

/// Etapa de publicación. Recibe el resultado de la transformación tal cual:
/// si es un error no escribe nada.
pub fn publish(
    lake: &DataLake,
    date: &str,
    transformed: Result<ProcessedTrips, TransformError>,
) -> Result<PublishReport, PublishError> {
    let rows = match transformed {
        Ok(rows) => rows,
        Err(e) => {
            warn!("no se publica la partición {}: {}", date, e);
            return Err(e.into());
        }
    };

    let dir = lake.processed_dir(date);
    let file_name = format!("part-00000.{}", lake.format.extension());
    let path = dir.join(&file_name);
    let path_str = path.to_string_lossy().to_string();

    match lake.format {
        DataFormat::Parquet => write_parquet_trips(&rows, &path_str)?,
        DataFormat::Csv => write_records_to_csv(&rows, &path_str)?,
        DataFormat::Jsonl => write_records_to_jsonl(&rows, &path_str)?,
    }

    info!("publicadas {} filas en {}", rows.len(), path_str);

    Ok(PublishReport {
        date: date.to_string(),
        output_dir: dir.to_string_lossy().to_string(),
        files: vec![file_name],
        rows: rows.len(),
    })
}

/// Una corrida completa del job: ingesta -> transformación -> publicación.
pub fn run_job(
    lake: &DataLake,
    date: &str,
    window: &DateWindow,
) -> Result<(PublishReport, TransformStats), JobError> {
    let raw = ingest(lake, date)?;

    let transformed = transform(&raw, window);
    let stats = transformed
        .as_ref()
        .map(|(_, stats)| *stats)
        .unwrap_or_default();

    let report = publish(lake, date, transformed.map(|(rows, _)| rows))?;
    Ok((report, stats))
}
