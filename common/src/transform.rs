//! Limpieza y enriquecimiento de viajes.
//!
//! `transform` es una función pura: recibe la partición cruda por referencia
//! y devuelve una colección nueva. Correrla dos veces sobre la misma entrada
//! da exactamente la misma salida.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use tracing::info;

use crate::engine::{op_filter, op_filter_map, op_map};
use crate::error::TransformError;
use crate::trip::{parse_timestamp, ProcessedTrip, RawTrip, TripCategory};

/// Rango cerrado de fechas de recogida que se conservan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TransformError> {
        if start > end {
            return Err(TransformError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl Default for DateWindow {
    /// Primer trimestre de 2024.
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap_or_default(),
        }
    }
}

/// Conteos de la corrida, para logs y para el reporte del job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub initial: usize,
    pub cleaned: usize,
    pub output: usize,
}

impl TransformStats {
    pub fn dropped_by_cleaning(&self) -> usize {
        self.initial - self.cleaned
    }
}

/// Fila después de parsear timestamps y calcular la duración (pasos 1-2).
#[derive(Debug, Clone)]
struct TimedTrip {
    vendor_id: Option<i64>,
    passenger_count: Option<f64>,
    trip_distance: Option<f64>,
    pickup: Option<NaiveDateTime>,
    total_amount: Option<f64>,
    payment_type: Option<i64>,
    trip_duration: Option<f64>,
}

/// Fila sin nulos en las columnas obligatorias (paso 3).
#[derive(Debug, Clone)]
struct CleanTrip {
    vendor_id: i64,
    passenger_count: f64,
    trip_distance: f64,
    pickup: NaiveDateTime,
    total_amount: f64,
    payment_type: Option<i64>,
    trip_duration: f64,
}

/// Fila con todas las columnas derivadas (pasos 4-6). Todavía lleva el
/// timestamp de recogida, que no puede salir en el formato de destino.
#[derive(Debug, Clone)]
struct EnrichedTrip {
    clean: CleanTrip,
    cost_per_minute: Option<f64>,
    cost_per_km: Option<f64>,
    trip_category: TripCategory,
    pickup_hour: u32,
    pickup_date: NaiveDate,
    pickup_month: u32,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// División que da nulo con divisor cero, igual que el motor distribuido.
fn safe_div(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

/// Minutos entre recogida y bajada, sobre segundos enteros.
/// Puede ser negativo si los timestamps vienen cruzados.
fn duration_minutes(pickup: NaiveDateTime, dropoff: NaiveDateTime) -> f64 {
    let secs = dropoff.and_utc().timestamp() - pickup.and_utc().timestamp();
    round2(secs as f64 / 60.0)
}

fn with_duration(raw: &RawTrip) -> TimedTrip {
    let pickup = raw.pickup.as_deref().and_then(parse_timestamp);
    let dropoff = raw.dropoff.as_deref().and_then(parse_timestamp);

    let trip_duration = match (pickup, dropoff) {
        (Some(p), Some(d)) => Some(duration_minutes(p, d)),
        _ => None,
    };

    TimedTrip {
        vendor_id: raw.vendor_id,
        passenger_count: raw.passenger_count,
        trip_distance: raw.trip_distance,
        pickup,
        total_amount: raw.total_amount,
        payment_type: raw.payment_type,
        trip_duration,
    }
}

fn drop_nulls(t: TimedTrip) -> Option<CleanTrip> {
    Some(CleanTrip {
        vendor_id: t.vendor_id?,
        passenger_count: t.passenger_count?,
        trip_distance: t.trip_distance?,
        total_amount: t.total_amount?,
        trip_duration: t.trip_duration?,
        // trip_duration no nulo implica recogida no nula
        pickup: t.pickup?,
        payment_type: t.payment_type,
    })
}

fn enrich(c: CleanTrip) -> EnrichedTrip {
    EnrichedTrip {
        cost_per_minute: safe_div(c.total_amount, c.trip_duration),
        cost_per_km: safe_div(c.total_amount, c.trip_distance),
        trip_category: TripCategory::from_duration(c.trip_duration),
        pickup_hour: c.pickup.hour(),
        pickup_date: c.pickup.date(),
        pickup_month: c.pickup.month(),
        clean: c,
    }
}

/// Descarta los timestamps y proyecta al conjunto fijo de columnas de salida.
fn project(e: EnrichedTrip) -> ProcessedTrip {
    ProcessedTrip {
        vendor_id: e.clean.vendor_id,
        passenger_count: e.clean.passenger_count,
        trip_distance: e.clean.trip_distance,
        payment_type: e.clean.payment_type,
        total_amount: e.clean.total_amount,
        trip_duration: e.clean.trip_duration,
        trip_category: e.trip_category,
        pickup_hour: e.pickup_hour,
        pickup_date: e.pickup_date,
        pickup_month: e.pickup_month,
        cost_per_minute: e.cost_per_minute,
        cost_per_km: e.cost_per_km,
    }
}

/// Pipeline completo sobre una partición cruda:
///
/// 1. descarta trip_distance <= 0 (o nula)
/// 2. calcula trip_duration en minutos, redondeada a 2 decimales
/// 3. descarta filas con nulos en vendorid, passenger_count, trip_distance,
///    total_amount o trip_duration
/// 4. cost_per_minute, cost_per_km
/// 5. trip_category
/// 6. pickup_hour, pickup_date, pickup_month
/// 7. filtra pickup_date dentro de `window`
/// 8. y 9. quita timestamps y proyecta a `OUTPUT_COLUMNS`
pub fn transform(
    input: &[RawTrip],
    window: &DateWindow,
) -> Result<(Vec<ProcessedTrip>, TransformStats), TransformError> {
    let window = DateWindow::new(window.start, window.end)?;
    let initial = input.len();

    let positive: Vec<&RawTrip> = op_filter(input.iter().collect(), |r| {
        r.trip_distance.is_some_and(|d| d > 0.0)
    });
    let timed = op_map(positive, with_duration);
    let clean = op_filter_map(timed, drop_nulls);

    let cleaned = clean.len();
    info!("filas iniciales: {}", initial);
    info!("filas después de limpiar: {}", cleaned);
    info!("filas descartadas: {}", initial - cleaned);

    let enriched = op_map(clean, enrich);
    let in_window = op_filter(enriched, |e| window.contains(e.pickup_date));
    let out = op_map(in_window, project);

    let stats = TransformStats {
        initial,
        cleaned,
        output: out.len(),
    };
    info!("filas de salida dentro de la ventana: {}", stats.output);

    Ok((out, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(distance: Option<f64>, pickup: &str, dropoff: &str, total: Option<f64>) -> RawTrip {
        RawTrip {
            vendor_id: Some(1),
            passenger_count: Some(1.0),
            trip_distance: distance,
            pickup: Some(pickup.to_string()),
            dropoff: Some(dropoff.to_string()),
            total_amount: total,
            payment_type: Some(1),
        }
    }

    fn run(input: &[RawTrip]) -> Vec<ProcessedTrip> {
        transform(input, &DateWindow::default()).unwrap().0
    }

    #[test]
    fn escenario_viaje_medio_calcula_columnas_derivadas() {
        let input = vec![raw(
            Some(5.0),
            "2024-02-01 10:00:00",
            "2024-02-01 10:15:00",
            Some(20.0),
        )];

        let out = run(&input);
        assert_eq!(out.len(), 1);

        let t = &out[0];
        assert_eq!(t.trip_duration, 15.0);
        assert!((t.cost_per_minute.unwrap() - 1.33).abs() < 0.01);
        assert_eq!(t.cost_per_km, Some(4.0));
        assert_eq!(t.trip_category, TripCategory::Medium);
        assert_eq!(t.pickup_hour, 10);
        assert_eq!(t.pickup_month, 2);
        assert_eq!(t.pickup_date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn distancia_cero_negativa_o_nula_se_descarta() {
        let input = vec![
            raw(Some(0.0), "2024-02-01 10:00:00", "2024-02-01 10:15:00", Some(20.0)),
            raw(Some(-1.5), "2024-02-01 10:00:00", "2024-02-01 10:15:00", Some(20.0)),
            raw(None, "2024-02-01 10:00:00", "2024-02-01 10:15:00", Some(20.0)),
        ];

        assert!(run(&input).is_empty());
    }

    #[test]
    fn nulos_obligatorios_se_descartan() {
        let mut sin_vendor = raw(Some(1.0), "2024-02-01 10:00:00", "2024-02-01 10:05:00", Some(8.0));
        sin_vendor.vendor_id = None;
        let mut sin_pasajeros = sin_vendor.clone();
        sin_pasajeros.vendor_id = Some(2);
        sin_pasajeros.passenger_count = None;
        let sin_total = raw(Some(1.0), "2024-02-01 10:00:00", "2024-02-01 10:05:00", None);
        let sin_duracion = raw(Some(1.0), "2024-02-01 10:00:00", "", Some(8.0));
        let mut sin_payment = raw(Some(1.0), "2024-02-01 10:00:00", "2024-02-01 10:05:00", Some(8.0));
        sin_payment.payment_type = None;

        let input = vec![sin_vendor, sin_pasajeros, sin_total, sin_duracion, sin_payment];
        let (out, stats) = transform(&input, &DateWindow::default()).unwrap();

        // payment_type no es obligatorio
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payment_type, None);
        assert_eq!(stats.initial, 5);
        assert_eq!(stats.cleaned, 1);
        assert_eq!(stats.dropped_by_cleaning(), 4);
    }

    #[test]
    fn duracion_cero_deja_costo_por_minuto_nulo_y_conserva_fila() {
        let input = vec![raw(
            Some(2.0),
            "2024-01-10 08:00:00",
            "2024-01-10 08:00:00",
            Some(10.0),
        )];

        let out = run(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].trip_duration, 0.0);
        assert_eq!(out[0].cost_per_minute, None);
        assert_eq!(out[0].cost_per_km, Some(5.0));
        assert_eq!(out[0].trip_category, TripCategory::Short);
    }

    #[test]
    fn duracion_negativa_se_conserva() {
        let input = vec![raw(
            Some(2.0),
            "2024-01-10 08:30:00",
            "2024-01-10 08:00:00",
            Some(10.0),
        )];

        let out = run(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].trip_duration, -30.0);
        assert_eq!(out[0].trip_category, TripCategory::Short);
    }

    #[test]
    fn duracion_se_redondea_a_dos_decimales() {
        // 100 s = 1.6666.. min
        let input = vec![raw(
            Some(1.0),
            "2024-01-10 08:00:00",
            "2024-01-10 08:01:40",
            Some(10.0),
        )];

        let out = run(&input);
        assert_eq!(out[0].trip_duration, 1.67);
    }

    #[test]
    fn categorias_en_los_bordes() {
        let input = vec![
            raw(Some(1.0), "2024-01-10 08:00:00", "2024-01-10 08:10:00", Some(10.0)),
            raw(Some(1.0), "2024-01-10 08:00:00", "2024-01-10 08:30:00", Some(10.0)),
            raw(Some(1.0), "2024-01-10 08:00:00", "2024-01-10 08:31:00", Some(10.0)),
        ];

        let cats: Vec<TripCategory> = run(&input).iter().map(|t| t.trip_category).collect();
        assert_eq!(
            cats,
            vec![TripCategory::Short, TripCategory::Medium, TripCategory::Long]
        );
    }

    #[test]
    fn ventana_de_fechas_es_inclusiva() {
        let input = vec![
            raw(Some(1.0), "2023-12-31 23:59:59", "2024-01-01 00:10:00", Some(10.0)),
            raw(Some(1.0), "2024-01-01 00:00:00", "2024-01-01 00:10:00", Some(10.0)),
            raw(Some(1.0), "2024-03-31 23:50:00", "2024-04-01 00:10:00", Some(10.0)),
            raw(Some(1.0), "2024-04-01 00:00:00", "2024-04-01 00:10:00", Some(10.0)),
        ];

        let out = run(&input);
        let dates: Vec<String> = out.iter().map(|t| t.pickup_date.to_string()).collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-03-31"]);
        assert!(out.iter().all(|t| DateWindow::default().contains(t.pickup_date)));
    }

    #[test]
    fn ventana_invertida_es_error() {
        let window = DateWindow {
            start: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        };

        let res = transform(&[], &window);
        assert!(matches!(res, Err(TransformError::InvalidWindow { .. })));
    }

    #[test]
    fn transform_es_idempotente_y_no_muta_la_entrada() {
        let input = vec![
            raw(Some(5.0), "2024-02-01 10:00:00", "2024-02-01 10:15:00", Some(20.0)),
            raw(Some(0.0), "2024-02-01 10:00:00", "2024-02-01 10:15:00", Some(20.0)),
            raw(Some(3.2), "2024-03-05 22:10:00", "2024-03-05 23:01:00", Some(41.7)),
        ];
        let copia = input.clone();

        let a = run(&input);
        let b = run(&input);

        assert_eq!(a, b);
        assert_eq!(input, copia);
    }
}
