use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{LoadError, PublishError};

/* =========================
   Operadores genéricos
   ========================= */

/// map: aplica una función a cada registro y devuelve una nueva colección.
pub fn op_map<T, U, F>(input: Vec<T>, f: F) -> Vec<U>
where
    F: Fn(T) -> U,
{
    input.into_iter().map(f).collect()
}

/// filter: deja pasar sólo los registros que cumplan el predicado.
pub fn op_filter<T, F>(input: Vec<T>, f: F) -> Vec<T>
where
    F: Fn(&T) -> bool,
{
    let mut out = Vec::with_capacity(input.len());
    for rec in input.into_iter() {
        if f(&rec) {
            out.push(rec);
        }
    }
    out
}

/// filter_map: cada registro genera cero o un registro nuevo.
/// Se usa para descartar nulos y a la vez estrechar el tipo.
pub fn op_filter_map<T, U, F>(input: Vec<T>, f: F) -> Vec<U>
where
    F: Fn(T) -> Option<U>,
{
    let mut out = Vec::new();
    for rec in input.into_iter() {
        if let Some(u) = f(rec) {
            out.push(u);
        }
    }
    out
}

/* =========================
   Lectura de particiones
   ========================= */

pub(crate) fn open_for_read(path: &str) -> Result<File, LoadError> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LoadError::PathNotFound(path.to_string()),
        _ => LoadError::Io {
            path: path.to_string(),
            source: e,
        },
    })
}

/// Lee un CSV con encabezados. Las columnas que no conoce el tipo destino se ignoran.
pub fn read_csv_to_records<T: DeserializeOwned>(path: &str) -> Result<Vec<T>, LoadError> {
    let file = open_for_read(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let mut out = Vec::new();
    for row in reader.deserialize() {
        let rec: T = row.map_err(|e| LoadError::Csv {
            path: path.to_string(),
            source: e,
        })?;
        out.push(rec);
    }

    Ok(out)
}

/// Lee un JSONL: un objeto por línea, las líneas vacías se saltan.
pub fn read_jsonl_to_records<T: DeserializeOwned>(path: &str) -> Result<Vec<T>, LoadError> {
    let file = open_for_read(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();

    for (idx, line_res) in reader.lines().enumerate() {
        let line = line_res.map_err(|e| LoadError::Io {
            path: path.to_string(),
            source: e,
        })?;
        // Limpia BOM por si viene de Excel/Windows
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }
        let rec: T = serde_json::from_str(line).map_err(|e| LoadError::Json {
            path: path.to_string(),
            line: idx + 1,
            source: e,
        })?;
        out.push(rec);
    }

    Ok(out)
}

/* =========================
   Escritura de particiones
   ========================= */

/// Crea el archivo de salida y sus directorios padre.
pub(crate) fn create_file_for_write(output_path: &str) -> Result<File, PublishError> {
    let io_err = |e: io::Error| PublishError::Io {
        path: output_path.to_string(),
        source: e,
    };

    if let Some(parent) = Path::new(output_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    File::create(output_path).map_err(io_err)
}

fn create_for_write(output_path: &str) -> Result<BufWriter<File>, PublishError> {
    Ok(BufWriter::new(create_file_for_write(output_path)?))
}

/// Escribe los registros como CSV con encabezado (derivado de los campos del tipo).
pub fn write_records_to_csv<T: Serialize>(
    records: &[T],
    output_path: &str,
) -> Result<(), PublishError> {
    let out = create_for_write(output_path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(out);

    for rec in records {
        writer.serialize(rec)?;
    }

    writer.flush().map_err(|e| PublishError::Io {
        path: output_path.to_string(),
        source: e,
    })?;
    Ok(())
}

/// Escribe los registros como JSONL.
pub fn write_records_to_jsonl<T: Serialize>(
    records: &[T],
    output_path: &str,
) -> Result<(), PublishError> {
    let mut writer = create_for_write(output_path)?;
    let io_err = |e: io::Error| PublishError::Io {
        path: output_path.to_string(),
        source: e,
    };

    for rec in records {
        serde_json::to_writer(&mut writer, rec)?;
        writer.write_all(b"\n").map_err(io_err)?;
    }

    writer.flush().map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::RawTrip;
    use serde::Deserialize;
    use std::{env, path::PathBuf};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("engine_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Fila {
        nombre: String,
        edad: Option<u32>,
    }

    /* ============
       OPERADORES
       ============ */

    #[test]
    fn op_map_aplica_funcion_a_cada_registro() {
        let out = op_map(vec![1, 2, 3], |x| x * 10);
        assert_eq!(out, vec![10, 20, 30]);
    }

    #[test]
    fn op_filter_filtra_por_predicado() {
        let out = op_filter(vec![1, 2, 3], |x| x % 2 == 1);
        assert_eq!(out, vec![1, 3]);
    }

    #[test]
    fn op_filter_map_descarta_none() {
        let out = op_filter_map(vec![Some(1), None, Some(3)], |x| x.map(|v| v * 2));
        assert_eq!(out, vec![2, 6]);
    }

    /* =========================
       IO: CSV / JSONL
       ========================= */

    #[test]
    fn read_csv_to_records_lee_encabezados_y_valores() {
        let tmp = temp_dir("read_csv");
        let csv_path = tmp.join("data.csv");
        let mut f = File::create(&csv_path).unwrap();

        writeln!(f, "nombre,edad").unwrap();
        writeln!(f, "Ana,30").unwrap();
        writeln!(f, "Bob,").unwrap();

        let recs: Vec<Fila> = read_csv_to_records(csv_path.to_str().unwrap()).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].nombre, "Ana");
        assert_eq!(recs[0].edad, Some(30));
        assert_eq!(recs[1].edad, None);
    }

    #[test]
    fn read_csv_de_viajes_tolera_celdas_invalidas() {
        let tmp = temp_dir("read_csv_trips");
        let csv_path = tmp.join("trips.csv");
        let mut f = File::create(&csv_path).unwrap();

        writeln!(f, "VendorID,passenger_count,trip_distance,tpep_pickup_datetime,tpep_dropoff_datetime,total_amount,payment_type,extra").unwrap();
        writeln!(f, "1,1.0,n/a,2024-02-01 10:00:00,2024-02-01 10:15:00,20.0,1,x").unwrap();

        let recs: Vec<RawTrip> = read_csv_to_records(csv_path.to_str().unwrap()).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].vendor_id, Some(1));
        assert_eq!(recs[0].trip_distance, None);
        assert_eq!(recs[0].pickup.as_deref(), Some("2024-02-01 10:00:00"));
    }

    #[test]
    fn read_csv_inexistente_es_path_not_found() {
        let tmp = temp_dir("read_csv_missing");
        let path = tmp.join("no_existe.csv");

        let res: Result<Vec<Fila>, _> = read_csv_to_records(path.to_str().unwrap());
        assert!(matches!(res, Err(LoadError::PathNotFound(_))));
    }

    #[test]
    fn read_jsonl_to_records_lee_un_objeto_por_linea() {
        let tmp = temp_dir("read_jsonl");
        let jsonl_path = tmp.join("data.jsonl");
        let mut f = File::create(&jsonl_path).unwrap();

        writeln!(f, "{}", r#"{"nombre":"Ana","edad":30}"#).unwrap();
        writeln!(f).unwrap();
        writeln!(f, "{}", r#"{"nombre":"Bob"}"#).unwrap();

        let recs: Vec<Fila> = read_jsonl_to_records(jsonl_path.to_str().unwrap()).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].edad, None);
    }

    #[test]
    fn read_jsonl_invalido_reporta_linea() {
        let tmp = temp_dir("read_jsonl_bad");
        let jsonl_path = tmp.join("data.jsonl");
        let mut f = File::create(&jsonl_path).unwrap();

        writeln!(f, "{}", r#"{"nombre":"Ana"}"#).unwrap();
        writeln!(f, "no es json").unwrap();

        let res: Result<Vec<Fila>, _> = read_jsonl_to_records(jsonl_path.to_str().unwrap());
        match res {
            Err(LoadError::Json { line, .. }) => assert_eq!(line, 2),
            other => panic!("se esperaba LoadError::Json, llegó {other:?}"),
        }
    }

    #[test]
    fn write_csv_crea_directorios_y_encabezado() {
        let tmp = temp_dir("write_csv");
        let out = tmp.join("a").join("b").join("out.csv");

        let rows = vec![
            Fila { nombre: "Ana".into(), edad: Some(30) },
            Fila { nombre: "Bob".into(), edad: None },
        ];
        write_records_to_csv(&rows, out.to_str().unwrap()).unwrap();

        let content = fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["nombre,edad", "Ana,30", "Bob,"]);
    }

    #[test]
    fn write_jsonl_escribe_un_objeto_por_linea() {
        let tmp = temp_dir("write_jsonl");
        let out = tmp.join("out.jsonl");

        let rows = vec![Fila { nombre: "Ana".into(), edad: Some(30) }];
        write_records_to_jsonl(&rows, out.to_str().unwrap()).unwrap();

        let back: Vec<Fila> = read_jsonl_to_records(out.to_str().unwrap()).unwrap();
        assert_eq!(back, rows);
    }
}
