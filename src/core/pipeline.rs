use crate::config::cli::join;
use crate::config::toml_config::{TableRules, TomlConfig};
use crate::core::cleaning::Cleaner;
use crate::core::modeling::Modeler;
use crate::core::profiling::{self, Profiler};
use crate::core::tabular::{read_table, write_table};
use crate::core::{CleaningReport, ModelReport, Pipeline, Storage, Table, TransformResult};
use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    pipeline: &'a str,
    version: &'a str,
    generated_at: String,
    cleaning: &'a [CleaningReport],
    model: &'a [ModelReport],
}

/// The report halves of a summary left by an earlier stage.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredSummary {
    cleaning: Vec<CleaningReport>,
    model: Vec<ModelReport>,
}

/// Cleans raw healthcare tables and models them into a star schema.
pub struct HealthcarePipeline<S: Storage> {
    storage: S,
    config: TomlConfig,
}

impl<S: Storage> HealthcarePipeline<S> {
    pub fn new(storage: S, config: TomlConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &TomlConfig {
        &self.config
    }

    /// Profiles every CSV in the raw directory and writes the quality report.
    pub async fn profile(&self) -> Result<String> {
        let raw_dir = &self.config.paths.raw_dir;
        let files = self.storage.list_files(raw_dir, "csv").await?;
        if files.is_empty() {
            return Err(EtlError::EmptyInput {
                path: raw_dir.clone(),
            });
        }

        let cleaning = &self.config.cleaning;
        let profiler = Profiler::new(
            &cleaning.null_tokens,
            &cleaning.date_formats,
            self.config.profiling.sample_rows,
        );

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut report = profiling::report_header(&timestamp);

        for file in &files {
            let name = file.trim_end_matches(".csv");
            let parsed = match self.storage.read_file(&join(raw_dir, file)).await {
                Ok(data) => read_table(name, &data),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(table) => {
                    let profile = profiler.profile(file, &table);
                    tracing::info!(
                        "🔎 Profiled {}: {} rows, {} duplicates",
                        file,
                        profile.rows,
                        profile.duplicate_rows
                    );
                    report.push_str(&profiling::render_profile(&profile));
                }
                Err(e) => {
                    tracing::warn!("⚠️ Could not profile {}: {}", file, e);
                    report.push_str(&profiling::render_error(file, &e));
                }
            }
        }
        report.push_str(profiling::report_footer());

        let report_path = &self.config.paths.report_path;
        self.storage.write_file(report_path, report.as_bytes()).await?;
        tracing::info!("📝 Quality report written to {}", report_path);

        Ok(join(&self.config.paths.base_dir, report_path))
    }

    /// Cleans the raw tables and writes `<table>_clean.csv` files.
    pub async fn clean(&self) -> Result<Vec<CleaningReport>> {
        let raw = self.extract().await?;
        let cleaner = Cleaner::new(&self.config.cleaning);
        let (tables, reports) = cleaner.clean_all(raw)?;
        self.write_clean(&tables).await?;
        self.write_summary(Some(&reports), None).await?;
        Ok(reports)
    }

    /// Builds dimension and fact tables from the clean directory.
    pub async fn model(&self) -> Result<Vec<ModelReport>> {
        let clean = self.read_clean().await?;
        let modeler = Modeler::new(&self.config.transform, &self.config.cleaning.date_formats);
        let (dimensions, facts, reports) = modeler.model(&clean)?;
        self.write_processed(&dimensions, &facts).await?;
        self.write_summary(None, Some(&reports)).await?;
        Ok(reports)
    }

    async fn read_tables(&self, dir: &str, file_of: impl Fn(&TableRules) -> String) -> Result<Vec<Table>> {
        let mut tables = Vec::with_capacity(self.config.cleaning.tables.len());

        for rules in &self.config.cleaning.tables {
            let path = join(dir, &file_of(rules));
            if !self.storage.exists(&path).await {
                tracing::warn!("⚠️ {} not found, skipping table {}", path, rules.name);
                continue;
            }
            let data = self.storage.read_file(&path).await?;
            let table = read_table(&rules.name, &data)?;
            tracing::debug!("Read {} ({} rows, {} columns)", path, table.len(), table.columns.len());
            tables.push(table);
        }

        Ok(tables)
    }

    async fn read_clean(&self) -> Result<Vec<Table>> {
        self.read_tables(&self.config.paths.clean_dir, TableRules::clean_file)
            .await
    }

    async fn write_clean(&self, tables: &[Table]) -> Result<()> {
        for table in tables {
            let file = match self.config.cleaning.table_rules(&table.name) {
                Some(rules) => rules.clean_file(),
                None => TableRules::named(&table.name).clean_file(),
            };
            let path = join(&self.config.paths.clean_dir, &file);
            self.storage.write_file(&path, &write_table(table)?).await?;
            tracing::info!("✅ Saved {} ({} rows)", path, table.len());
        }
        Ok(())
    }

    async fn write_processed(&self, dimensions: &[Table], facts: &[Table]) -> Result<()> {
        let dir = &self.config.paths.processed_dir;
        let mut files = Vec::with_capacity(dimensions.len() + facts.len());

        for table in dimensions.iter().chain(facts) {
            let file_name = format!("{}.csv", table.name);
            let data = write_table(table)?;
            self.storage.write_file(&join(dir, &file_name), &data).await?;
            tracing::info!("✅ {} created ({} rows)", file_name, table.len());
            files.push((file_name, data));
        }

        if self.config.load.archive {
            let archive = build_archive(&files)?;
            let path = join(dir, &self.config.load.archive_filename);
            tracing::debug!("Writing archive ({} bytes) with {} files", archive.len(), files.len());
            self.storage.write_file(&path, &archive).await?;
            tracing::info!("📦 Archive saved to {}", path);
        }

        Ok(())
    }

    /// Writes `run_summary.json`. A half passed as `None` is carried over from
    /// the summary already on disk, so single-stage runs keep earlier reports.
    async fn write_summary(
        &self,
        cleaning: Option<&[CleaningReport]>,
        model: Option<&[ModelReport]>,
    ) -> Result<()> {
        if !self.config.load.write_summary {
            return Ok(());
        }

        let path = join(&self.config.paths.processed_dir, SUMMARY_FILE);
        let previous = if cleaning.is_none() || model.is_none() {
            self.previous_summary(&path).await
        } else {
            StoredSummary::default()
        };

        let summary = RunSummary {
            pipeline: &self.config.pipeline.name,
            version: &self.config.pipeline.version,
            generated_at: chrono::Local::now().to_rfc3339(),
            cleaning: cleaning.unwrap_or(previous.cleaning.as_slice()),
            model: model.unwrap_or(previous.model.as_slice()),
        };
        let json = serde_json::to_vec_pretty(&summary)?;
        self.storage.write_file(&path, &json).await?;
        tracing::debug!("Summary written to {}", path);
        Ok(())
    }

    async fn previous_summary(&self, path: &str) -> StoredSummary {
        if !self.storage.exists(path).await {
            return StoredSummary::default();
        }
        let parsed = match self.storage.read_file(path).await {
            Ok(data) => serde_json::from_slice(&data).map_err(EtlError::from),
            Err(e) => Err(e),
        };
        parsed.unwrap_or_else(|e| {
            tracing::warn!("⚠️ Ignoring unreadable {}: {}", path, e);
            StoredSummary::default()
        })
    }
}

fn build_archive(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in files {
        zip.start_file(name.as_str(), SimpleFileOptions::default())?;
        zip.write_all(data)?;
    }
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for HealthcarePipeline<S> {
    async fn extract(&self) -> Result<Vec<Table>> {
        let tables = self
            .read_tables(&self.config.paths.raw_dir, TableRules::raw_file)
            .await?;
        if tables.is_empty() {
            return Err(EtlError::EmptyInput {
                path: self.config.paths.raw_dir.clone(),
            });
        }
        Ok(tables)
    }

    async fn transform(&self, data: Vec<Table>) -> Result<TransformResult> {
        let cleaner = Cleaner::new(&self.config.cleaning);
        let (clean_tables, cleaning_reports) = cleaner.clean_all(data)?;

        let modeler = Modeler::new(&self.config.transform, &self.config.cleaning.date_formats);
        let (dimensions, facts, model_reports) = modeler.model(&clean_tables)?;

        Ok(TransformResult {
            clean_tables,
            cleaning_reports,
            dimensions,
            facts,
            model_reports,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        self.write_clean(&result.clean_tables).await?;
        self.write_processed(&result.dimensions, &result.facts).await?;
        self.write_summary(Some(&result.cleaning_reports), Some(&result.model_reports))
            .await?;

        Ok(join(&self.config.paths.base_dir, &self.config.paths.processed_dir))
    }
}
