use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Fila cruda tal como viene de la partición diaria.
/// Todas las columnas pueden venir nulas; una celda numérica que no se
/// puede parsear se lee como nula en vez de romper la carga.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTrip {
    #[serde(rename = "vendorid", alias = "VendorID", default, deserialize_with = "csv::invalid_option")]
    pub vendor_id: Option<i64>,

    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub passenger_count: Option<f64>,

    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub trip_distance: Option<f64>,

    /// Timestamps sin zona horaria, p.ej. "2024-02-01 10:00:00".
    #[serde(rename = "tpep_pickup_datetime", default)]
    pub pickup: Option<String>,

    #[serde(rename = "tpep_dropoff_datetime", default)]
    pub dropoff: Option<String>,

    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub total_amount: Option<f64>,

    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub payment_type: Option<i64>,
}

pub type RawTrips = Vec<RawTrip>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripCategory {
    Short,
    Medium,
    Long,
}

impl TripCategory {
    /// Short si <= 10 min, Medium si <= 30 min, Long en otro caso.
    pub fn from_duration(minutes: f64) -> Self {
        if minutes <= 10.0 {
            TripCategory::Short
        } else if minutes <= 30.0 {
            TripCategory::Medium
        } else {
            TripCategory::Long
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TripCategory::Short => "Short",
            TripCategory::Medium => "Medium",
            TripCategory::Long => "Long",
        }
    }
}

/// Columnas de salida, en orden.
pub const OUTPUT_COLUMNS: [&str; 12] = [
    "vendorid",
    "passenger_count",
    "trip_distance",
    "payment_type",
    "total_amount",
    "trip_duration",
    "trip_category",
    "pickup_hour",
    "pickup_date",
    "pickup_month",
    "cost_per_minute",
    "cost_per_km",
];

/// Fila final publicada. El orden de los campos es el de `OUTPUT_COLUMNS`
/// y no lleva ninguna columna timestamp sin zona horaria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTrip {
    #[serde(rename = "vendorid")]
    pub vendor_id: i64,
    pub passenger_count: f64,
    pub trip_distance: f64,
    pub payment_type: Option<i64>,
    pub total_amount: f64,
    pub trip_duration: f64,
    pub trip_category: TripCategory,
    pub pickup_hour: u32,
    pub pickup_date: NaiveDate,
    pub pickup_month: u32,
    /// Nulo si trip_duration == 0.
    pub cost_per_minute: Option<f64>,
    pub cost_per_km: Option<f64>,
}

pub type ProcessedTrips = Vec<ProcessedTrip>;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parsea un timestamp sin zona. Devuelve None si está vacío o no se reconoce.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
