use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub paths: PathsConfig,
    pub cleaning: CleaningConfig,
    pub profiling: ProfilingConfig,
    pub transform: TransformConfig,
    pub load: LoadConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,
    pub description: String,
    pub version: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "healthcare-etl".to_string(),
            description: "Synthetic healthcare data cleaning and star-schema transform".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

/// Every path is relative to `base_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub base_dir: String,
    pub raw_dir: String,
    pub clean_dir: String,
    pub processed_dir: String,
    pub report_path: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: ".".to_string(),
            raw_dir: "data/raw".to_string(),
            clean_dir: "data/clean".to_string(),
            processed_dir: "data/processed".to_string(),
            report_path: "docs/data_quality_report.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub null_tokens: Vec<String>,
    pub trim_whitespace: bool,
    pub collapse_whitespace: bool,
    pub date_formats: Vec<String>,
    pub tables: Vec<TableRules>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            null_tokens: ["", " ", "NA", "N/A", "NULL", "null", "None", "-", "nan", "NaN"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trim_whitespace: true,
            collapse_whitespace: true,
            date_formats: [
                "%Y-%m-%d",
                "%Y/%m/%d",
                "%d/%m/%Y",
                "%d-%m-%Y",
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%dT%H:%M:%S",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            tables: TableRules::healthcare_defaults(),
        }
    }
}

impl CleaningConfig {
    pub fn table_rules(&self, name: &str) -> Option<&TableRules> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Declarative cleaning rules for one raw table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRules {
    pub name: String,
    /// Raw file name; `<name>.csv` when empty.
    pub file: String,
    pub dedupe_on: Vec<String>,
    pub required: Vec<String>,
    pub non_negative: Vec<String>,
    pub date_columns: Vec<String>,
    pub uppercase: Vec<String>,
    pub title_case: Vec<String>,
    pub allowed_values: BTreeMap<String, Vec<String>>,
    pub fill_missing: BTreeMap<String, String>,
}

impl TableRules {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn raw_file(&self) -> String {
        if self.file.is_empty() {
            format!("{}.csv", self.name)
        } else {
            self.file.clone()
        }
    }

    pub fn clean_file(&self) -> String {
        format!("{}_clean.csv", self.name)
    }

    pub fn healthcare_defaults() -> Vec<TableRules> {
        vec![
            TableRules {
                dedupe_on: strings(&["department_id"]),
                required: strings(&["department_id", "department_name"]),
                non_negative: strings(&["floor_number"]),
                ..TableRules::named("departments")
            },
            TableRules {
                dedupe_on: strings(&["doctor_id"]),
                required: strings(&["doctor_id"]),
                non_negative: strings(&["years_experience"]),
                allowed_values: BTreeMap::from([(
                    "status".to_string(),
                    strings(&["Active", "On Leave"]),
                )]),
                ..TableRules::named("doctors")
            },
            TableRules {
                dedupe_on: strings(&["patient_id"]),
                required: strings(&["patient_id"]),
                non_negative: strings(&["age"]),
                title_case: strings(&["city"]),
                allowed_values: BTreeMap::from([
                    ("gender".to_string(), strings(&["Male", "Female"])),
                    (
                        "insurance_type".to_string(),
                        strings(&["BPJS", "Private", "Uninsured"]),
                    ),
                ]),
                fill_missing: BTreeMap::from([(
                    "insurance_type".to_string(),
                    "Uninsured".to_string(),
                )]),
                ..TableRules::named("patients")
            },
            TableRules {
                dedupe_on: strings(&["diagnosis_code"]),
                required: strings(&["diagnosis_code", "diagnosis_id"]),
                uppercase: strings(&["diagnosis_code"]),
                ..TableRules::named("diagnoses")
            },
            TableRules {
                dedupe_on: strings(&["date_id"]),
                required: strings(&["date_id", "date"]),
                date_columns: strings(&["date"]),
                ..TableRules::named("dates")
            },
            TableRules {
                dedupe_on: strings(&["visit_id"]),
                required: strings(&["visit_id", "patient_id", "doctor_id"]),
                date_columns: strings(&["visit_date"]),
                uppercase: strings(&["diagnosis_code"]),
                non_negative: strings(&[
                    "visit_duration_days",
                    "total_cost",
                    "insurance_coverage",
                    "patient_payment",
                    "satisfaction_rating",
                ]),
                allowed_values: BTreeMap::from([(
                    "visit_type".to_string(),
                    strings(&["Rawat Jalan", "Rawat Inap", "IGD"]),
                )]),
                ..TableRules::named("visits")
            },
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    pub sample_rows: usize,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self { sample_rows: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    pub source: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupSpec {
    pub dimension: String,
    pub on: String,
    pub take: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactSpec {
    pub name: String,
    pub source: String,
    pub date_column: String,
    #[serde(default = "default_date_key")]
    pub date_key: String,
    #[serde(default)]
    pub lookups: Vec<LookupSpec>,
    pub columns: Vec<String>,
}

fn default_date_key() -> String {
    "date_id".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub dimensions: Vec<DimensionSpec>,
    pub fact: FactSpec,
}

impl Default for TransformConfig {
    fn default() -> Self {
        let dim = |name: &str, source: &str, columns: &[&str]| DimensionSpec {
            name: name.to_string(),
            source: source.to_string(),
            columns: strings(columns),
        };
        let lookup = |dimension: &str, on: &str, take: &str| LookupSpec {
            dimension: dimension.to_string(),
            on: on.to_string(),
            take: take.to_string(),
        };

        Self {
            dimensions: vec![
                dim(
                    "dim_patients",
                    "patients",
                    &["patient_id", "patient_name", "gender", "age", "city", "insurance_type"],
                ),
                dim(
                    "dim_doctors",
                    "doctors",
                    &[
                        "doctor_id",
                        "doctor_name",
                        "department_name",
                        "specialization",
                        "status",
                        "years_experience",
                    ],
                ),
                dim(
                    "dim_departments",
                    "departments",
                    &["department_id", "department_name", "head_doctor", "floor_number"],
                ),
                dim(
                    "dim_diagnoses",
                    "diagnoses",
                    &["diagnosis_id", "diagnosis_name", "diagnosis_code"],
                ),
                dim(
                    "dim_dates",
                    "dates",
                    &["date_id", "date", "year", "month", "day", "quarter", "day_name"],
                ),
            ],
            fact: FactSpec {
                name: "fact_visits".to_string(),
                source: "visits".to_string(),
                date_column: "visit_date".to_string(),
                date_key: default_date_key(),
                lookups: vec![
                    lookup("dim_diagnoses", "diagnosis_code", "diagnosis_id"),
                    lookup("dim_doctors", "doctor_id", "department_name"),
                    lookup("dim_departments", "department_name", "department_id"),
                ],
                columns: strings(&[
                    "visit_id",
                    "patient_id",
                    "doctor_id",
                    "department_id",
                    "diagnosis_id",
                    "date_id",
                    "visit_type",
                    "visit_duration_days",
                    "total_cost",
                    "insurance_coverage",
                    "patient_payment",
                    "satisfaction_rating",
                ]),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub archive: bool,
    pub archive_filename: String,
    pub write_summary: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            archive: false,
            archive_filename: "healthcare_processed.zip".to_string(),
            write_summary: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unset variables stay literal.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;

        validation::validate_path("paths.base_dir", &self.paths.base_dir)?;
        validation::validate_path("paths.raw_dir", &self.paths.raw_dir)?;
        validation::validate_path("paths.clean_dir", &self.paths.clean_dir)?;
        validation::validate_path("paths.processed_dir", &self.paths.processed_dir)?;
        validation::validate_path("paths.report_path", &self.paths.report_path)?;

        validation::validate_positive_number(
            "profiling.sample_rows",
            self.profiling.sample_rows,
            1,
        )?;

        if self.cleaning.tables.is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "cleaning.tables".to_string(),
            });
        }
        for table in &self.cleaning.tables {
            validation::validate_non_empty_string("cleaning.tables.name", &table.name)?;
            validation::validate_file_extension("cleaning.tables.file", &table.raw_file(), &["csv"])?;
        }
        validation::validate_unique_names(
            "cleaning.tables",
            self.cleaning.tables.iter().map(|t| t.name.as_str()),
        )?;

        validation::validate_unique_names(
            "transform.dimensions",
            self.transform
                .dimensions
                .iter()
                .map(|d| d.name.as_str())
                .chain(std::iter::once(self.transform.fact.name.as_str())),
        )?;
        for lookup in &self.transform.fact.lookups {
            if !self
                .transform
                .dimensions
                .iter()
                .any(|d| d.name == lookup.dimension)
            {
                return Err(EtlError::InvalidConfigValueError {
                    field: "transform.fact.lookups.dimension".to_string(),
                    value: lookup.dimension.clone(),
                    reason: "Lookup refers to an undeclared dimension".to_string(),
                });
            }
        }

        validation::validate_file_extension(
            "load.archive_filename",
            &self.load.archive_filename,
            &["zip"],
        )?;

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.enabled
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
