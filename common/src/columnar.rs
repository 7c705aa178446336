//! Particiones en parquet: lectura de viajes crudos y escritura de la salida.
//!
//! La lectura busca las columnas por nombre (sin distinguir mayúsculas) y las
//! castea al tipo esperado; una celda que no castea queda nula, igual que en
//! CSV. Los timestamps se pasan a texto sin zona para reusar el mismo parseo.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, AsArray, Date32Array, Float64Array, Int32Array, Int64Array, RecordBatch,
    StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Field, Float64Type, Int64Type, Schema, SchemaRef, TimeUnit,
    TimestampMicrosecondType,
};
use arrow::error::ArrowError;
use chrono::{DateTime, Datelike, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::engine::{create_file_for_write, open_for_read};
use crate::error::{LoadError, PublishError};
use crate::trip::{ProcessedTrip, RawTrip, RawTrips};

/// Días desde 0001-01-01 hasta 1970-01-01 (Date32 cuenta desde la época Unix).
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const TIMESTAMP_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/* =========================
   Lectura
   ========================= */

pub fn read_parquet_trips(path: &str) -> Result<RawTrips, LoadError> {
    let file = open_for_read(path)?;
    let parquet_err = |e| LoadError::Parquet {
        path: path.to_string(),
        source: e,
    };
    let arrow_err = |e| LoadError::Arrow {
        path: path.to_string(),
        source: e,
    };

    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(parquet_err)?
        .build()
        .map_err(parquet_err)?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.map_err(arrow_err)?;
        out.extend(raw_trips_from_batch(&batch).map_err(arrow_err)?);
    }
    Ok(out)
}

fn find_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a ArrayRef> {
    batch
        .schema()
        .fields()
        .iter()
        .position(|f| f.name().eq_ignore_ascii_case(name))
        .map(|idx| batch.column(idx))
}

fn cast_error(name: &str, to: &DataType) -> ArrowError {
    ArrowError::CastError(format!("la columna {} no se pudo leer como {}", name, to))
}

fn i64_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<i64>>, ArrowError> {
    let Some(col) = find_column(batch, name) else {
        return Ok(vec![None; batch.num_rows()]);
    };
    let casted = cast(col, &DataType::Int64)?;
    let arr = casted
        .as_primitive_opt::<Int64Type>()
        .ok_or_else(|| cast_error(name, &DataType::Int64))?;
    Ok(arr.iter().collect())
}

fn f64_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<f64>>, ArrowError> {
    let Some(col) = find_column(batch, name) else {
        return Ok(vec![None; batch.num_rows()]);
    };
    let casted = cast(col, &DataType::Float64)?;
    let arr = casted
        .as_primitive_opt::<Float64Type>()
        .ok_or_else(|| cast_error(name, &DataType::Float64))?;
    Ok(arr.iter().collect())
}

/// Timestamp (de cualquier unidad) o texto, como texto sin zona.
fn timestamp_text_column(
    batch: &RecordBatch,
    name: &str,
) -> Result<Vec<Option<String>>, ArrowError> {
    let Some(col) = find_column(batch, name) else {
        return Ok(vec![None; batch.num_rows()]);
    };

    match col.data_type() {
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => {
            let micros_type = DataType::Timestamp(TimeUnit::Microsecond, None);
            let casted = cast(col, &micros_type)?;
            let arr = casted
                .as_primitive_opt::<TimestampMicrosecondType>()
                .ok_or_else(|| cast_error(name, &micros_type))?;
            Ok(arr
                .iter()
                .map(|v| {
                    v.and_then(DateTime::<Utc>::from_timestamp_micros)
                        .map(|dt| dt.naive_utc().format(TIMESTAMP_TEXT_FORMAT).to_string())
                })
                .collect())
        }
        _ => {
            let casted = cast(col, &DataType::Utf8)?;
            let arr = casted
                .as_string_opt::<i32>()
                .ok_or_else(|| cast_error(name, &DataType::Utf8))?;
            Ok(arr.iter().map(|v| v.map(str::to_string)).collect())
        }
    }
}

fn raw_trips_from_batch(batch: &RecordBatch) -> Result<RawTrips, ArrowError> {
    let vendor = i64_column(batch, "vendorid")?;
    let passengers = f64_column(batch, "passenger_count")?;
    let distance = f64_column(batch, "trip_distance")?;
    let pickup = timestamp_text_column(batch, "tpep_pickup_datetime")?;
    let dropoff = timestamp_text_column(batch, "tpep_dropoff_datetime")?;
    let total = f64_column(batch, "total_amount")?;
    let payment = i64_column(batch, "payment_type")?;

    let mut pickup = pickup.into_iter();
    let mut dropoff = dropoff.into_iter();

    Ok((0..batch.num_rows())
        .map(|i| RawTrip {
            vendor_id: vendor[i],
            passenger_count: passengers[i],
            trip_distance: distance[i],
            pickup: pickup.next().flatten(),
            dropoff: dropoff.next().flatten(),
            total_amount: total[i],
            payment_type: payment[i],
        })
        .collect())
}

/* =========================
   Escritura
   ========================= */

/// Esquema de la partición procesada, en el orden de `OUTPUT_COLUMNS`.
pub fn processed_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("vendorid", DataType::Int64, false),
        Field::new("passenger_count", DataType::Float64, false),
        Field::new("trip_distance", DataType::Float64, false),
        Field::new("payment_type", DataType::Int64, true),
        Field::new("total_amount", DataType::Float64, false),
        Field::new("trip_duration", DataType::Float64, false),
        Field::new("trip_category", DataType::Utf8, false),
        Field::new("pickup_hour", DataType::Int32, false),
        Field::new("pickup_date", DataType::Date32, false),
        Field::new("pickup_month", DataType::Int32, false),
        Field::new("cost_per_minute", DataType::Float64, true),
        Field::new("cost_per_km", DataType::Float64, true),
    ]))
}

fn processed_batch(rows: &[ProcessedTrip]) -> Result<RecordBatch, ArrowError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.vendor_id))),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| r.passenger_count),
        )),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| r.trip_distance),
        )),
        Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.payment_type))),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| r.total_amount),
        )),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| r.trip_duration),
        )),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.trip_category.as_str()),
        )),
        Arc::new(Int32Array::from_iter_values(
            rows.iter().map(|r| r.pickup_hour as i32),
        )),
        Arc::new(Date32Array::from_iter_values(rows.iter().map(|r| {
            r.pickup_date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
        }))),
        Arc::new(Int32Array::from_iter_values(
            rows.iter().map(|r| r.pickup_month as i32),
        )),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.cost_per_minute))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.cost_per_km))),
    ];

    RecordBatch::try_new(processed_schema(), columns)
}

/// Escribe la partición procesada como un único archivo parquet (snappy).
pub fn write_parquet_trips(rows: &[ProcessedTrip], output_path: &str) -> Result<(), PublishError> {
    let batch = processed_batch(rows)?;
    let file = create_file_for_write(output_path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Escribe un parquet crudo con los tipos que usa el origen de datos
/// (VendorID Int32, timestamps en microsegundos, columnas extra).
#[cfg(test)]
pub(crate) fn write_raw_parquet_fixture(path: &str, rows: &[(i32, f64, &str, &str, f64)]) {
    use arrow::array::TimestampMicrosecondArray;

    let micros = |s: &str| {
        crate::trip::parse_timestamp(s)
            .unwrap()
            .and_utc()
            .timestamp_micros()
    };
    let schema = Arc::new(Schema::new(vec![
        Field::new("VendorID", DataType::Int32, true),
        Field::new(
            "tpep_pickup_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
        Field::new(
            "tpep_dropoff_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
        Field::new("passenger_count", DataType::Int64, true),
        Field::new("trip_distance", DataType::Float64, true),
        Field::new("store_and_fwd_flag", DataType::Utf8, true),
        Field::new("payment_type", DataType::Int64, true),
        Field::new("total_amount", DataType::Float64, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.0))),
        Arc::new(TimestampMicrosecondArray::from_iter_values(
            rows.iter().map(|r| micros(r.2)),
        )),
        Arc::new(TimestampMicrosecondArray::from_iter_values(
            rows.iter().map(|r| micros(r.3)),
        )),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|_| 1))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.1))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|_| "N"))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|_| 1))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.4))),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();

    let file = create_file_for_write(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::{TripCategory, OUTPUT_COLUMNS};
    use arrow::array::Array;
    use chrono::NaiveDate;
    use std::{env, fs, path::PathBuf};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("columnar_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    #[test]
    fn lee_parquet_crudo_casteando_tipos_y_timestamps() {
        let dir = temp_dir("raw");
        let path = dir.join("part-00000.snappy.parquet");
        let path = path.to_str().unwrap();
        write_raw_parquet_fixture(
            path,
            &[
                (1, 5.0, "2024-02-01 10:00:00", "2024-02-01 10:15:00", 20.0),
                (2, 0.0, "2024-02-01 11:00:00", "2024-02-01 11:30:30", 12.5),
            ],
        );

        let trips = read_parquet_trips(path).unwrap();
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].vendor_id, Some(1));
        assert_eq!(trips[0].passenger_count, Some(1.0));
        assert_eq!(trips[0].trip_distance, Some(5.0));
        assert_eq!(trips[1].total_amount, Some(12.5));
        assert_eq!(trips[0].payment_type, Some(1));

        let pickup = crate::trip::parse_timestamp(trips[0].pickup.as_deref().unwrap());
        assert_eq!(pickup, crate::trip::parse_timestamp("2024-02-01 10:00:00"));
        let dropoff = crate::trip::parse_timestamp(trips[1].dropoff.as_deref().unwrap());
        assert_eq!(dropoff, crate::trip::parse_timestamp("2024-02-01 11:30:30"));
    }

    #[test]
    fn columna_faltante_se_lee_como_nula() {
        let dir = temp_dir("missing_col");
        let path = dir.join("part-0.parquet");
        let path = path.to_str().unwrap();

        let schema = Arc::new(Schema::new(vec![
            Field::new("vendorid", DataType::Int64, true),
            Field::new("trip_distance", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![Some(7), None])),
                Arc::new(StringArray::from(vec!["3.5", "n/a"])),
            ],
        )
        .unwrap();
        let file = create_file_for_write(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let trips = read_parquet_trips(path).unwrap();
        assert_eq!(trips[0].vendor_id, Some(7));
        assert_eq!(trips[1].vendor_id, None);
        assert_eq!(trips[0].trip_distance, Some(3.5));
        assert_eq!(trips[1].trip_distance, None);
        assert!(trips.iter().all(|t| t.total_amount.is_none() && t.pickup.is_none()));
    }

    #[test]
    fn archivo_que_no_es_parquet_es_error_de_parquet() {
        let dir = temp_dir("garbage");
        let path = dir.join("part-0.parquet");
        fs::write(&path, "no soy parquet").unwrap();

        let res = read_parquet_trips(path.to_str().unwrap());
        assert!(matches!(res, Err(LoadError::Parquet { .. })));
    }

    #[test]
    fn salida_parquet_conserva_columnas_y_nulos() {
        let dir = temp_dir("processed");
        let path = dir.join("part-00000.parquet");
        let rows = vec![ProcessedTrip {
            vendor_id: 1,
            passenger_count: 1.0,
            trip_distance: 5.0,
            payment_type: None,
            total_amount: 20.0,
            trip_duration: 0.0,
            trip_category: TripCategory::Short,
            pickup_hour: 10,
            pickup_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            pickup_month: 2,
            cost_per_minute: None,
            cost_per_km: Some(4.0),
        }];

        write_parquet_trips(&rows, path.to_str().unwrap()).unwrap();

        let file = fs::File::open(&path).unwrap();
        let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batch = reader.next().unwrap().unwrap();

        let names: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, OUTPUT_COLUMNS);
        assert_eq!(batch.num_rows(), 1);

        let category = batch.column(6).as_string::<i32>();
        assert_eq!(category.value(0), "Short");
        let date = batch.column(8).as_primitive::<arrow::datatypes::Date32Type>();
        // 2024-02-01 son 19754 días desde 1970-01-01
        assert_eq!(date.value(0), 19754);
        assert!(batch.column(3).is_null(0));
        assert!(batch.column(10).is_null(0));
        assert_eq!(batch.column(11).as_primitive::<Float64Type>().value(0), 4.0);
    }
}
