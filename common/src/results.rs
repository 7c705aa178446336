/// Resultado de publicar una partición procesada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Fecha de la partición, "YYYY-MM-DD"
    pub date: String,
    /// Directorio donde quedaron los outputs
    pub output_dir: String,
    /// Nombres de archivos de salida dentro de output_dir
    pub files: Vec<String>,
    pub rows: usize,
}
