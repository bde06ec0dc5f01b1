//! Settings Module
//! Column names, partition labels and output names, optionally overridden from TOML.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// How identifiers are compared when cross-referencing the two datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdMatching {
    /// Raw value equality: `"A1"` and `" a1"` are different identifiers.
    #[default]
    Exact,
    /// Trim, upper-case and render integral numbers without decimals before comparing.
    Normalized,
}

/// Sheet names of the two uploaded workbooks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Partitions {
    pub dto: String,
    pub pcl: String,
    pub courier: String,
    pub messenger: String,
}

impl Default for Partitions {
    fn default() -> Self {
        Self {
            dto: "DTO".to_string(),
            pcl: "PCL".to_string(),
            courier: "COURIER".to_string(),
            messenger: "MENSAJERO".to_string(),
        }
    }
}

/// Column names referenced by the pipelines.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Columns {
    pub visa_date: String,
    pub terms: String,
    pub general_id: String,
    pub courier_id: String,
    pub report_status: String,
    pub classification: String,
    pub notifier: String,
    pub annotations: Vec<String>,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            visa_date: "FECHA_VISADO".to_string(),
            terms: "TERMINOS".to_string(),
            general_id: "ID_FURAT_FUREP".to_string(),
            courier_id: "ID DEL SINIESTRO".to_string(),
            report_status: "ESTADO_INFORME".to_string(),
            classification: "CALIFICACION".to_string(),
            notifier: "NOTIFICADOR".to_string(),
            annotations: vec![
                "OPORTUNIDAD FINAL".to_string(),
                "OBSERVACIÓN".to_string(),
                "DEFINICIÓN".to_string(),
            ],
        }
    }
}

/// Status literals used by the term filter and the report-status rewrite.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Terms {
    pub out_of_term: String,
    pub pending: String,
    pub pending_guide: String,
}

impl Default for Terms {
    fn default() -> Self {
        Self {
            out_of_term: "FUERA DE TERMINOS".to_string(),
            pending: "PENDIENTE".to_string(),
            pending_guide: "PENDIENTE ENTREGA DE GUIA".to_string(),
        }
    }
}

/// File names offered for the produced workbooks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    pub date_filtered: String,
    pub date_term_filtered: String,
    pub courier_export: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            date_filtered: "general.xlsx".to_string(),
            date_term_filtered: "filtrado_fechas_fuera_termino.xlsx".to_string(),
            courier_export: "fuera_de_termino.xlsx".to_string(),
        }
    }
}

/// One column of the per-notifier export: source name and presentation label.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExportColumn {
    pub source: String,
    pub label: String,
}

impl ExportColumn {
    fn new(source: &str, label: &str) -> Self {
        Self {
            source: source.to_string(),
            label: label.to_string(),
        }
    }
}

/// Layout of the per-notifier sheets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportLayout {
    pub row_number_label: String,
    pub columns: Vec<ExportColumn>,
}

impl Default for ExportLayout {
    fn default() -> Self {
        Self {
            row_number_label: "Nº".to_string(),
            columns: vec![
                ExportColumn::new("ID_FURAT_FUREP", "ID DEL SINIESTRO"),
                ExportColumn::new("FECHA_VISADO", "FECHA VISADO"),
                ExportColumn::new("NOMBRE_COMITE", "NOMBRE COMITE"),
                ExportColumn::new("ID_TRABAJADOR", "ID TRABAJADOR"),
                ExportColumn::new("FECHA_NOTIFICACION", "FECHA NOTIFICACION"),
                ExportColumn::new("RADICADO_SALIDA", "RAD DE SALIDA"),
                ExportColumn::new("FECHA_RADICACION", "FECHA RADICACION"),
                ExportColumn::new("NOTIFICADOR", "NOTIFICADOR"),
                ExportColumn::new("EMPRESA", "EMPRESA"),
                ExportColumn::new("DIAS TRANSCURRIDOS HABILES", "DIAS TRANSCURRIDOS HABILES"),
                ExportColumn::new("ESTADO_INFORME", "ESTADO INFORME"),
                ExportColumn::new("CALIFICACION", "CALIFICACION"),
                ExportColumn::new("OPORTUNIDAD FINAL", "OPORTUNIDAD FINAL"),
                ExportColumn::new("OBSERVACIÓN", "OBSERVACIÓN"),
                ExportColumn::new("DEFINICIÓN", "DEFINICIÓN"),
            ],
        }
    }
}

/// Run settings; every field falls back to the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub partitions: Partitions,
    pub columns: Columns,
    pub terms: Terms,
    pub outputs: OutputNames,
    pub export: ExportLayout,
    pub id_matching: IdMatching,
}

impl Settings {
    /// Load settings from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_source_literals() {
        let settings = Settings::default();
        assert_eq!(settings.partitions.messenger, "MENSAJERO");
        assert_eq!(settings.columns.courier_id, "ID DEL SINIESTRO");
        assert_eq!(settings.terms.pending_guide, "PENDIENTE ENTREGA DE GUIA");
        assert_eq!(settings.columns.annotations.len(), 3);
        assert_eq!(settings.export.columns.len(), 15);
        assert_eq!(settings.export.columns[0].label, "ID DEL SINIESTRO");
        assert_eq!(settings.export.columns[5].label, "RAD DE SALIDA");
        assert_eq!(settings.id_matching, IdMatching::Exact);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let settings = Settings::from_toml(
            r#"
            id_matching = "normalized"

            [columns]
            notifier = "MENSAJERO_ASIGNADO"
            "#,
        )
        .unwrap();

        assert_eq!(settings.id_matching, IdMatching::Normalized);
        assert_eq!(settings.columns.notifier, "MENSAJERO_ASIGNADO");
        assert_eq!(settings.columns.terms, "TERMINOS");
        assert_eq!(settings.partitions.dto, "DTO");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[terms]\nout_of_term = \"VENCIDO\"").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.terms.out_of_term, "VENCIDO");
        assert_eq!(settings.terms.pending, "PENDIENTE");
    }

    #[test]
    fn test_load_without_path_is_default() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.outputs.courier_export, "fuera_de_termino.xlsx");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id_matching = 3").unwrap();

        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
