//! Human-readable views of a configuration for `check-config` and `run --dry-run`.

use crate::config::toml_config::TomlConfig;
use crate::core::pipeline::SUMMARY_FILE;
use std::fmt::{self, Write};

pub fn config_summary(config: &TomlConfig) -> String {
    let mut out = String::new();
    let _ = write_summary(&mut out, config);
    out
}

fn write_summary(out: &mut String, config: &TomlConfig) -> fmt::Result {
    writeln!(out, "📋 Configuration Summary:")?;
    writeln!(out, "  Pipeline: {} v{}", config.pipeline.name, config.pipeline.version)?;
    writeln!(out, "  Base dir: {}", config.paths.base_dir)?;
    writeln!(out, "  Raw: {}", config.paths.raw_dir)?;
    writeln!(out, "  Clean: {}", config.paths.clean_dir)?;
    writeln!(out, "  Processed: {}", config.paths.processed_dir)?;
    writeln!(out, "  Report: {}", config.paths.report_path)?;
    writeln!(out)
}

/// Describes what a run would do without touching any file.
pub fn dry_run_plan(config: &TomlConfig) -> String {
    let mut out = String::new();
    let _ = write_plan(&mut out, config);
    out
}

fn write_plan(out: &mut String, config: &TomlConfig) -> fmt::Result {
    writeln!(out, "🔍 Dry Run Analysis:")?;
    writeln!(out)?;

    writeln!(out, "🧹 Cleaning:")?;
    writeln!(out, "  Null tokens: {:?}", config.cleaning.null_tokens)?;
    for rules in &config.cleaning.tables {
        writeln!(out, "  {} ({} -> {})", rules.name, rules.raw_file(), rules.clean_file())?;
        if !rules.dedupe_on.is_empty() {
            writeln!(out, "    dedupe on: {}", rules.dedupe_on.join(", "))?;
        }
        if !rules.required.is_empty() {
            writeln!(out, "    required: {}", rules.required.join(", "))?;
        }
        if !rules.non_negative.is_empty() {
            writeln!(out, "    non-negative: {}", rules.non_negative.join(", "))?;
        }
        if !rules.date_columns.is_empty() {
            writeln!(out, "    dates: {}", rules.date_columns.join(", "))?;
        }
        for (column, allowed) in &rules.allowed_values {
            writeln!(out, "    {} in [{}]", column, allowed.join(", "))?;
        }
        for (column, value) in &rules.fill_missing {
            writeln!(out, "    {} defaults to {}", column, value)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "📐 Transform:")?;
    for dim in &config.transform.dimensions {
        writeln!(out, "  {} <- {} ({} columns)", dim.name, dim.source, dim.columns.len())?;
    }
    let fact = &config.transform.fact;
    writeln!(
        out,
        "  {} <- {} (date key from {})",
        fact.name, fact.source, fact.date_column
    )?;
    for lookup in &fact.lookups {
        writeln!(out, "    {} via {} from {}", lookup.take, lookup.on, lookup.dimension)?;
    }

    writeln!(out)?;
    writeln!(out, "💾 Output:")?;
    if config.load.archive {
        writeln!(out, "  Archive: {}", config.load.archive_filename)?;
    }
    if config.load.write_summary {
        writeln!(out, "  Summary: {}", SUMMARY_FILE)?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "✅ Dry run analysis complete. Use --verbose for more details during actual run."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_summary_lists_paths() {
        let mut config = TomlConfig::default();
        config.paths.base_dir = "/srv/healthcare".to_string();

        let summary = config_summary(&config);

        assert!(summary.starts_with("📋 Configuration Summary:\n"));
        assert!(summary.contains("  Pipeline: healthcare-etl v1.0.0\n"));
        assert!(summary.contains("  Base dir: /srv/healthcare\n"));
        assert!(summary.contains("  Report: docs/data_quality_report.txt\n"));
    }

    #[test]
    fn test_dry_run_plan_covers_every_stage() {
        let config = TomlConfig::default();

        let plan = dry_run_plan(&config);

        assert!(plan.contains("  visits (visits.csv -> visits_clean.csv)\n"));
        assert!(plan.contains("    dedupe on: visit_id\n"));
        assert!(plan.contains("  dim_patients <- patients"));
        assert!(plan.contains("  fact_visits <- visits (date key from visit_date)\n"));
        assert!(plan.contains("    diagnosis_id via diagnosis_code from dim_diagnoses\n"));
        assert!(plan.contains("    department_id via department_name from dim_departments\n"));
        assert!(plan.contains("    visit_type in [Rawat Jalan, Rawat Inap, IGD]\n"));
        assert!(plan.contains("    insurance_type defaults to Uninsured\n"));
        assert!(plan.contains("  Summary: run_summary.json\n"));
        assert!(!plan.contains("Archive:"));
        assert!(plan.trim_end().ends_with("during actual run."));
    }

    #[test]
    fn test_dry_run_plan_shows_archive_when_enabled() {
        let mut config = TomlConfig::default();
        config.load.archive = true;
        config.load.write_summary = false;

        let plan = dry_run_plan(&config);

        assert!(plan.contains("  Archive: healthcare_processed.zip\n"));
        assert!(!plan.contains("Summary:"));
    }
}
