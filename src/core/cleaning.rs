use crate::config::toml_config::{CleaningConfig, TableRules};
use crate::domain::model::{Cell, CleaningReport, Table};
use crate::utils::error::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Parses a date with the first matching format, then RFC 3339.
pub fn parse_date(value: &str, formats: &[String]) -> Option<NaiveDate> {
    for format in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.date_naive())
}

fn title_case(value: &str) -> String {
    value
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Applies [`TableRules`] to raw tables.
pub struct Cleaner<'a> {
    config: &'a CleaningConfig,
    null_tokens: HashSet<&'a str>,
}

impl<'a> Cleaner<'a> {
    pub fn new(config: &'a CleaningConfig) -> Self {
        Self {
            config,
            null_tokens: config.null_tokens.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_null_token(&self, value: &str) -> bool {
        self.null_tokens.contains(value)
    }

    /// Cleans every table, using the configured rules when the name matches.
    pub fn clean_all(&self, tables: Vec<Table>) -> Result<(Vec<Table>, Vec<CleaningReport>)> {
        let mut cleaned = Vec::with_capacity(tables.len());
        let mut reports = Vec::with_capacity(tables.len());

        for table in tables {
            let fallback;
            let rules = match self.config.table_rules(&table.name) {
                Some(rules) => rules,
                None => {
                    tracing::warn!("No cleaning rules for '{}', applying defaults only", table.name);
                    fallback = TableRules::named(&table.name);
                    &fallback
                }
            };
            let (table, report) = self.clean(table, rules)?;
            cleaned.push(table);
            reports.push(report);
        }

        Ok((cleaned, reports))
    }

    pub fn clean(&self, mut table: Table, rules: &TableRules) -> Result<(Table, CleaningReport)> {
        self.check_columns(&table, rules)?;

        let mut report = CleaningReport {
            table: table.name.clone(),
            rows_in: table.len(),
            ..Default::default()
        };

        self.trim(&mut table, &mut report);
        self.standardize_missing(&mut table, &mut report);
        self.normalize_case(&mut table, rules)?;
        self.restrict_categories(&mut table, rules, &mut report)?;
        self.normalize_dates(&mut table, rules, &mut report)?;
        self.clip_non_negative(&mut table, rules, &mut report)?;
        self.fill_missing(&mut table, rules, &mut report)?;
        self.drop_missing_required(&mut table, rules, &mut report)?;
        self.dedupe(&mut table, rules, &mut report)?;

        report.rows_out = table.len();

        tracing::info!(
            "🧹 {}: {} -> {} rows ({} duplicates, {} missing required, {} nulls standardized)",
            report.table,
            report.rows_in,
            report.rows_out,
            report.duplicates_removed,
            report.rows_missing_required,
            report.nulls_standardized
        );
        tracing::debug!(?report, "cleaning report");

        Ok((table, report))
    }

    fn check_columns(&self, table: &Table, rules: &TableRules) -> Result<()> {
        let referenced = rules
            .dedupe_on
            .iter()
            .chain(&rules.required)
            .chain(&rules.non_negative)
            .chain(&rules.date_columns)
            .chain(&rules.uppercase)
            .chain(&rules.title_case)
            .chain(rules.allowed_values.keys())
            .chain(rules.fill_missing.keys());

        for column in referenced {
            table.require_column(column)?;
        }
        Ok(())
    }

    fn trim(&self, table: &mut Table, report: &mut CleaningReport) {
        if !self.config.trim_whitespace && !self.config.collapse_whitespace {
            return;
        }

        for cell in table.rows.iter_mut().flatten() {
            let Some(value) = cell else { continue };
            let mut cleaned = if self.config.trim_whitespace {
                value.trim().to_string()
            } else {
                value.clone()
            };
            if self.config.collapse_whitespace {
                cleaned = WHITESPACE_RUN.replace_all(&cleaned, " ").into_owned();
            }
            if cleaned != *value {
                *value = cleaned;
                report.values_trimmed += 1;
            }
        }
    }

    fn standardize_missing(&self, table: &mut Table, report: &mut CleaningReport) {
        for cell in table.rows.iter_mut().flatten() {
            if cell.as_deref().is_some_and(|v| self.is_null_token(v)) {
                *cell = None;
                report.nulls_standardized += 1;
            }
        }
    }

    fn normalize_case(&self, table: &mut Table, rules: &TableRules) -> Result<()> {
        for column in &rules.uppercase {
            let idx = table.require_column(column)?;
            for row in &mut table.rows {
                if let Some(v) = &mut row[idx] {
                    *v = v.to_uppercase();
                }
            }
        }
        for column in &rules.title_case {
            let idx = table.require_column(column)?;
            for row in &mut table.rows {
                if let Some(v) = &mut row[idx] {
                    *v = title_case(v);
                }
            }
        }
        Ok(())
    }

    fn restrict_categories(
        &self,
        table: &mut Table,
        rules: &TableRules,
        report: &mut CleaningReport,
    ) -> Result<()> {
        for (column, allowed) in &rules.allowed_values {
            let idx = table.require_column(column)?;
            for row in &mut table.rows {
                let Some(value) = &row[idx] else { continue };
                let canonical = allowed
                    .iter()
                    .find(|a| a.to_lowercase() == value.to_lowercase())
                    .cloned();
                if canonical.is_none() {
                    tracing::debug!("Invalid {} value in {}: {:?}", column, table.name, value);
                    report.invalid_categories += 1;
                }
                row[idx] = canonical;
            }
        }
        Ok(())
    }

    fn normalize_dates(
        &self,
        table: &mut Table,
        rules: &TableRules,
        report: &mut CleaningReport,
    ) -> Result<()> {
        for column in &rules.date_columns {
            let idx = table.require_column(column)?;
            for row in &mut table.rows {
                let Some(value) = &row[idx] else { continue };
                match parse_date(value, &self.config.date_formats) {
                    Some(date) => row[idx] = Some(date.format("%Y-%m-%d").to_string()),
                    None => {
                        report.invalid_dates += 1;
                        row[idx] = None;
                    }
                }
            }
        }
        Ok(())
    }

    fn clip_non_negative(
        &self,
        table: &mut Table,
        rules: &TableRules,
        report: &mut CleaningReport,
    ) -> Result<()> {
        for column in &rules.non_negative {
            let idx = table.require_column(column)?;
            for row in &mut table.rows {
                let parsed = row[idx]
                    .as_deref()
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|n| n.is_finite());
                match parsed {
                    Some(n) if n < 0.0 => {
                        report.negatives_clipped += 1;
                        row[idx] = Some("0".to_string());
                    }
                    // -0 and -0.0
                    Some(n) if n == 0.0 && n.is_sign_negative() => {
                        row[idx] = Some("0".to_string());
                    }
                    Some(_) => {}
                    None => {
                        report.non_numeric_zeroed += 1;
                        row[idx] = Some("0".to_string());
                    }
                }
            }
        }
        Ok(())
    }

    fn fill_missing(
        &self,
        table: &mut Table,
        rules: &TableRules,
        report: &mut CleaningReport,
    ) -> Result<()> {
        for (column, default) in &rules.fill_missing {
            let idx = table.require_column(column)?;
            for row in &mut table.rows {
                if row[idx].is_none() {
                    row[idx] = Some(default.clone());
                    report.missing_filled += 1;
                }
            }
        }
        Ok(())
    }

    fn drop_missing_required(
        &self,
        table: &mut Table,
        rules: &TableRules,
        report: &mut CleaningReport,
    ) -> Result<()> {
        let indices = rules
            .required
            .iter()
            .map(|c| table.require_column(c))
            .collect::<Result<Vec<_>>>()?;

        let before = table.len();
        table
            .rows
            .retain(|row| indices.iter().all(|&i| row[i].is_some()));
        report.rows_missing_required = before - table.len();
        Ok(())
    }

    /// Keeps the first row for each key; the key is the whole row when `dedupe_on` is empty.
    fn dedupe(&self, table: &mut Table, rules: &TableRules, report: &mut CleaningReport) -> Result<()> {
        let indices = if rules.dedupe_on.is_empty() {
            (0..table.columns.len()).collect()
        } else {
            rules
                .dedupe_on
                .iter()
                .map(|c| table.require_column(c))
                .collect::<Result<Vec<_>>>()?
        };

        let before = table.len();
        let mut seen: HashSet<Vec<Cell>> = HashSet::with_capacity(before);
        table.rows.retain(|row| {
            let key: Vec<Cell> = indices.iter().map(|&i| row[i].clone()).collect();
            seen.insert(key)
        });
        report.duplicates_removed = before - table.len();

        if report.duplicates_removed > 0 {
            tracing::debug!(
                "Removed {} duplicates from {} ({})",
                report.duplicates_removed,
                table.name,
                if rules.dedupe_on.is_empty() {
                    "all columns".to_string()
                } else {
                    rules.dedupe_on.join(", ")
                }
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tabular::read_table;
    use crate::utils::error::EtlError;
    use std::collections::BTreeMap;

    fn config() -> CleaningConfig {
        CleaningConfig::default()
    }

    fn table(name: &str, csv: &str) -> Table {
        read_table(name, csv.as_bytes()).unwrap()
    }

    fn column(table: &Table, name: &str) -> Vec<Option<String>> {
        let idx = table.column_index(name).unwrap();
        table.rows.iter().map(|r| r[idx].clone()).collect()
    }

    #[test]
    fn test_null_tokens_become_missing() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let raw = table("t", "id,city\n1,NA\n2,  null \n3,-\n4,Bandung\n5,N/A\n");

        let (clean, report) = cleaner.clean(raw, &TableRules::named("t")).unwrap();

        assert_eq!(
            column(&clean, "city"),
            vec![None, None, None, Some("Bandung".to_string()), None]
        );
        assert_eq!(report.nulls_standardized, 4);
        assert_eq!(report.values_trimmed, 1);
    }

    #[test]
    fn test_whitespace_is_trimmed_and_collapsed() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let raw = table("t", "id,name\n1,\"  Siti   Rahayu \"\n");

        let (clean, _) = cleaner.clean(raw, &TableRules::named("t")).unwrap();
        assert_eq!(clean.get(0, "name"), Some("Siti Rahayu"));
    }

    #[test]
    fn test_clip_non_negative() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let raw = table("visits", "visit_id,total_cost\n1,150000.5\n2,-300\n3,abc\n4,\n5,0\n");
        let rules = TableRules {
            non_negative: vec!["total_cost".to_string()],
            ..TableRules::named("visits")
        };

        let (clean, report) = cleaner.clean(raw, &rules).unwrap();

        assert_eq!(
            column(&clean, "total_cost"),
            vec![
                Some("150000.5".to_string()),
                Some("0".to_string()),
                Some("0".to_string()),
                Some("0".to_string()),
                Some("0".to_string()),
            ]
        );
        assert_eq!(report.negatives_clipped, 1);
        assert_eq!(report.non_numeric_zeroed, 2);
    }

    #[test]
    fn test_signed_zero_becomes_plain_zero() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let raw = table("t", "id,floor_number\n1,-0\n2,-0.0\n3,0.0\n");
        let rules = TableRules {
            non_negative: vec!["floor_number".to_string()],
            ..TableRules::named("t")
        };

        let (clean, report) = cleaner.clean(raw, &rules).unwrap();

        assert_eq!(
            column(&clean, "floor_number"),
            vec![
                Some("0".to_string()),
                Some("0".to_string()),
                Some("0.0".to_string()),
            ]
        );
        assert_eq!(report.negatives_clipped, 0);
        assert_eq!(report.non_numeric_zeroed, 0);
    }

    #[test]
    fn test_nan_text_is_not_a_number() {
        let mut config = config();
        config.null_tokens.clear();
        let cleaner = Cleaner::new(&config);
        let raw = table("t", "id,age\n1,NaN\n2,inf\n");
        let rules = TableRules {
            non_negative: vec!["age".to_string()],
            ..TableRules::named("t")
        };

        let (clean, report) = cleaner.clean(raw, &rules).unwrap();
        assert_eq!(column(&clean, "age"), vec![Some("0".to_string()), Some("0".to_string())]);
        assert_eq!(report.non_numeric_zeroed, 2);
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let raw = table(
            "patients",
            "patient_id,name\n1,Ayu\n2,Budi\n1,Ayu Lestari\n3,Citra\n2,Budi\n",
        );
        let rules = TableRules {
            dedupe_on: vec!["patient_id".to_string()],
            ..TableRules::named("patients")
        };

        let (clean, report) = cleaner.clean(raw, &rules).unwrap();

        assert_eq!(
            column(&clean, "name"),
            vec![
                Some("Ayu".to_string()),
                Some("Budi".to_string()),
                Some("Citra".to_string())
            ]
        );
        assert_eq!(report.duplicates_removed, 2);
        assert_eq!(report.rows_in, 5);
        assert_eq!(report.rows_out, 3);
    }

    #[test]
    fn test_dedupe_whole_row_by_default() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let raw = table("t", "a,b\n1,x\n1,y\n1,x\n");

        let (clean, report) = cleaner.clean(raw, &TableRules::named("t")).unwrap();
        assert_eq!(clean.len(), 2);
        assert_eq!(report.duplicates_removed, 1);
    }

    #[test]
    fn test_rows_missing_required_are_dropped() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let raw = table("visits", "visit_id,patient_id\n1,10\nNULL,11\n3,\n4,12\n");
        let rules = TableRules {
            required: vec!["visit_id".to_string(), "patient_id".to_string()],
            ..TableRules::named("visits")
        };

        let (clean, report) = cleaner.clean(raw, &rules).unwrap();
        assert_eq!(
            column(&clean, "visit_id"),
            vec![Some("1".to_string()), Some("4".to_string())]
        );
        assert_eq!(report.rows_missing_required, 2);
    }

    #[test]
    fn test_dates_are_normalized() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let raw = table(
            "visits",
            "visit_id,visit_date\n1,2024-03-05\n2,2024/03/06\n3,07/03/2024\n4,2024-03-08 14:30:00\n5,yesterday\n6,2024-02-30\n",
        );
        let rules = TableRules {
            date_columns: vec!["visit_date".to_string()],
            ..TableRules::named("visits")
        };

        let (clean, report) = cleaner.clean(raw, &rules).unwrap();
        assert_eq!(
            column(&clean, "visit_date"),
            vec![
                Some("2024-03-05".to_string()),
                Some("2024-03-06".to_string()),
                Some("2024-03-07".to_string()),
                Some("2024-03-08".to_string()),
                None,
                None,
            ]
        );
        assert_eq!(report.invalid_dates, 2);
    }

    #[test]
    fn test_categories_and_fill_missing() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let raw = table(
            "patients",
            "patient_id,gender,insurance_type\n1,male,BPJS\n2,FEMALE,None\n3,unknown,private\n4,Male,Gold\n",
        );
        let rules = TableRules {
            allowed_values: BTreeMap::from([
                ("gender".to_string(), vec!["Male".to_string(), "Female".to_string()]),
                (
                    "insurance_type".to_string(),
                    vec!["BPJS".to_string(), "Private".to_string(), "Uninsured".to_string()],
                ),
            ]),
            fill_missing: BTreeMap::from([("insurance_type".to_string(), "Uninsured".to_string())]),
            ..TableRules::named("patients")
        };

        let (clean, report) = cleaner.clean(raw, &rules).unwrap();

        assert_eq!(
            column(&clean, "gender"),
            vec![
                Some("Male".to_string()),
                Some("Female".to_string()),
                None,
                Some("Male".to_string())
            ]
        );
        assert_eq!(
            column(&clean, "insurance_type"),
            vec![
                Some("BPJS".to_string()),
                Some("Uninsured".to_string()),
                Some("Private".to_string()),
                Some("Uninsured".to_string())
            ]
        );
        assert_eq!(report.invalid_categories, 2);
        assert_eq!(report.missing_filled, 2);
    }

    #[test]
    fn test_case_normalization() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let raw = table("t", "code,city\ni10,SURABAYA\ne11,yogyakarta\n");
        let rules = TableRules {
            uppercase: vec!["code".to_string()],
            title_case: vec!["city".to_string()],
            ..TableRules::named("t")
        };

        let (clean, _) = cleaner.clean(raw, &rules).unwrap();
        assert_eq!(column(&clean, "code"), vec![Some("I10".to_string()), Some("E11".to_string())]);
        assert_eq!(
            column(&clean, "city"),
            vec![Some("Surabaya".to_string()), Some("Yogyakarta".to_string())]
        );
    }

    #[test]
    fn test_rule_on_unknown_column_fails() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let raw = table("patients", "patient_id\n1\n");
        let rules = TableRules {
            non_negative: vec!["age".to_string()],
            ..TableRules::named("patients")
        };

        let err = cleaner.clean(raw, &rules).unwrap_err();
        assert!(matches!(err, EtlError::MissingColumn { ref column, .. } if column == "age"));
    }

    #[test]
    fn test_clean_all_uses_rules_by_name() {
        let config = config();
        let cleaner = Cleaner::new(&config);
        let diagnoses = table(
            "diagnoses",
            "diagnosis_code,diagnosis_name,diagnosis_id\ni10,Hypertension,1\nI10,Hypertension,1\nE11,Type 2 Diabetes Mellitus,2\n",
        );

        let (tables, reports) = cleaner.clean_all(vec![diagnoses]).unwrap();
        assert_eq!(tables[0].len(), 2);
        assert_eq!(reports[0].table, "diagnoses");
        assert_eq!(reports[0].duplicates_removed, 1);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("jakarta selatan"), "Jakarta Selatan");
        assert_eq!(title_case("MEDAN"), "Medan");
        assert_eq!(title_case(""), "");
    }
}
