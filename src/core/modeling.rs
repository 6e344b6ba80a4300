use crate::config::toml_config::{FactSpec, LookupSpec, TransformConfig};
use crate::core::cleaning::parse_date;
use crate::domain::model::{LookupReport, ModelReport, Table};
use crate::utils::error::{EtlError, Result};
use std::collections::HashMap;

/// Integer `YYYYMMDD` key used to join against the date dimension.
pub fn make_date_id(value: &str, formats: &[String]) -> Option<String> {
    parse_date(value, formats).map(|d| d.format("%Y%m%d").to_string())
}

fn find_table<'t>(tables: &'t [Table], name: &str) -> Result<&'t Table> {
    tables
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| EtlError::MissingTable {
            name: name.to_string(),
        })
}

/// Builds the star schema (dimensions plus one fact table) from cleaned tables.
pub struct Modeler<'a> {
    config: &'a TransformConfig,
    date_formats: &'a [String],
}

impl<'a> Modeler<'a> {
    pub fn new(config: &'a TransformConfig, date_formats: &'a [String]) -> Self {
        Self {
            config,
            date_formats,
        }
    }

    pub fn model(&self, clean: &[Table]) -> Result<(Vec<Table>, Vec<Table>, Vec<ModelReport>)> {
        let dimensions = self.build_dimensions(clean)?;
        let (fact, report) = self.build_fact(clean, &dimensions, &self.config.fact)?;
        Ok((dimensions, vec![fact], vec![report]))
    }

    pub fn build_dimensions(&self, clean: &[Table]) -> Result<Vec<Table>> {
        self.config
            .dimensions
            .iter()
            .map(|spec| {
                let source = find_table(clean, &spec.source)?;
                let dim = source.select(&spec.name, &spec.columns)?;
                tracing::info!("📐 {} built from {} ({} rows)", dim.name, spec.source, dim.len());
                Ok(dim)
            })
            .collect()
    }

    pub fn build_fact(
        &self,
        clean: &[Table],
        dimensions: &[Table],
        spec: &FactSpec,
    ) -> Result<(Table, ModelReport)> {
        let mut fact = find_table(clean, &spec.source)?.clone();
        let mut report = ModelReport {
            fact: spec.name.clone(),
            ..Default::default()
        };

        let date_idx = fact.require_column(&spec.date_column)?;
        let key_idx = fact.ensure_column(&spec.date_key);
        for row in &mut fact.rows {
            let date_id = row[date_idx]
                .as_deref()
                .and_then(|v| make_date_id(v, self.date_formats));
            if date_id.is_none() {
                report.invalid_dates += 1;
            }
            row[key_idx] = date_id;
        }
        if report.invalid_dates > 0 {
            tracing::warn!(
                "{} rows of {} have no usable {}",
                report.invalid_dates,
                spec.source,
                spec.date_column
            );
        }

        for lookup in &spec.lookups {
            let dimension = find_table(dimensions, &lookup.dimension)?;
            let lookup_report = apply_lookup(&mut fact, dimension, lookup)?;
            if lookup_report.unmatched > 0 {
                tracing::warn!(
                    "{} rows of {} found no {} in {}",
                    lookup_report.unmatched,
                    spec.name,
                    lookup.take,
                    lookup.dimension
                );
            }
            report.lookups.push(lookup_report);
        }

        let fact = fact.select(&spec.name, &spec.columns)?;
        report.rows = fact.len();
        tracing::info!("📐 {} built from {} ({} rows)", fact.name, spec.source, fact.len());

        Ok((fact, report))
    }
}

/// Left join that only fills missing values of `lookup.take`. The first
/// dimension row wins when a key repeats.
fn apply_lookup(fact: &mut Table, dimension: &Table, lookup: &LookupSpec) -> Result<LookupReport> {
    let dim_key = dimension.require_column(&lookup.on)?;
    let dim_value = dimension.require_column(&lookup.take)?;
    let fact_key = fact.require_column(&lookup.on)?;

    let mut report = LookupReport {
        dimension: lookup.dimension.clone(),
        on: lookup.on.clone(),
        take: lookup.take.clone(),
        ..Default::default()
    };

    let mut index: HashMap<&str, Option<&str>> = HashMap::with_capacity(dimension.len());
    for row in &dimension.rows {
        let Some(key) = row[dim_key].as_deref() else { continue };
        if index.contains_key(key) {
            report.duplicate_keys += 1;
        } else {
            index.insert(key, row[dim_value].as_deref());
        }
    }

    let target = fact.ensure_column(&lookup.take);
    for row in &mut fact.rows {
        if row[target].is_some() {
            report.kept += 1;
            continue;
        }
        let found = row[fact_key]
            .as_deref()
            .and_then(|k| index.get(k).copied().flatten());
        match found {
            Some(value) => {
                row[target] = Some(value.to_string());
                report.matched += 1;
            }
            None => report.unmatched += 1,
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::toml_config::{CleaningConfig, DimensionSpec};
    use crate::core::tabular::read_table;

    fn table(name: &str, csv: &str) -> Table {
        read_table(name, csv.as_bytes()).unwrap()
    }

    fn clean_tables() -> Vec<Table> {
        vec![
            table(
                "patients",
                "patient_id,patient_name,gender,age,city,insurance_type\n1,Ayu,Female,34,Jakarta,BPJS\n",
            ),
            table(
                "doctors",
                "doctor_id,doctor_name,department_name,specialization,years_experience,status\n\
                 1,Dr. Budi,Cardiology,Cardiology,12,Active\n\
                 2,Dr. Citra,Neurology,Neurology,5,On Leave\n",
            ),
            table(
                "departments",
                "department_id,department_name,floor_number,head_doctor\n\
                 5,Cardiology,4,Dr. Dewi\n\
                 6,Neurology,4,Dr. Eko\n",
            ),
            table(
                "diagnoses",
                "diagnosis_code,diagnosis_name,diagnosis_id\nI10,Hypertension,1\nE11,Type 2 Diabetes Mellitus,2\n",
            ),
            table(
                "dates",
                "date_id,date,year,month,day,quarter,day_name\n1,2024-01-01,2024,1,1,1,Monday\n",
            ),
            table(
                "visits",
                "visit_id,patient_id,doctor_id,department_name,diagnosis_code,visit_date,visit_type,visit_duration_days,total_cost,insurance_coverage,patient_payment,satisfaction_rating\n\
                 1,1,1,Cardiology,I10,2024-03-05,Rawat Jalan,1.5,500000,300000,200000,4\n\
                 2,1,2,,E11,2024-03-06,IGD,0.5,800000,400000,400000,5\n\
                 3,1,1,Cardiology,X99,,Rawat Inap,3.0,900000,600000,300000,3\n",
            ),
        ]
    }

    #[test]
    fn test_make_date_id() {
        let formats = CleaningConfig::default().date_formats;
        assert_eq!(make_date_id("2024-03-05", &formats), Some("20240305".to_string()));
        assert_eq!(make_date_id("31/12/2025", &formats), Some("20251231".to_string()));
        assert_eq!(make_date_id("not a date", &formats), None);
    }

    #[test]
    fn test_dimensions_are_projections() {
        let config = TransformConfig::default();
        let formats = CleaningConfig::default().date_formats;
        let modeler = Modeler::new(&config, &formats);

        let dims = modeler.build_dimensions(&clean_tables()).unwrap();
        let names: Vec<_> = dims.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["dim_patients", "dim_doctors", "dim_departments", "dim_diagnoses", "dim_dates"]
        );

        let departments = &dims[2];
        assert_eq!(
            departments.columns,
            vec!["department_id", "department_name", "head_doctor", "floor_number"]
        );
        assert_eq!(departments.get(0, "head_doctor"), Some("Dr. Dewi"));
    }

    #[test]
    fn test_fact_keys_and_lookups() {
        let config = TransformConfig::default();
        let formats = CleaningConfig::default().date_formats;
        let modeler = Modeler::new(&config, &formats);

        let (dims, facts, reports) = modeler.model(&clean_tables()).unwrap();
        assert_eq!(dims.len(), 5);
        let fact = &facts[0];

        assert_eq!(fact.name, "fact_visits");
        assert_eq!(fact.columns, config.fact.columns);
        assert_eq!(fact.len(), 3);

        assert_eq!(fact.get(0, "date_id"), Some("20240305"));
        assert_eq!(fact.get(0, "diagnosis_id"), Some("1"));
        assert_eq!(fact.get(0, "department_id"), Some("5"));

        // department_name was blank on the visit, so it came from the doctor.
        assert_eq!(fact.get(1, "department_id"), Some("6"));
        assert_eq!(fact.get(1, "diagnosis_id"), Some("2"));

        assert_eq!(fact.get(2, "date_id"), None);
        assert_eq!(fact.get(2, "diagnosis_id"), None);
        assert_eq!(fact.get(2, "department_id"), Some("5"));

        let report = &reports[0];
        assert_eq!(report.rows, 3);
        assert_eq!(report.invalid_dates, 1);
        assert_eq!(report.lookups[0].matched, 2);
        assert_eq!(report.lookups[0].unmatched, 1);
        assert_eq!(report.lookups[1].kept, 2);
        assert_eq!(report.lookups[1].matched, 1);
        assert_eq!(report.lookups[2].matched, 3);
    }

    #[test]
    fn test_lookup_never_overwrites_existing_values() {
        let mut fact = table("visits", "visit_id,doctor_id,department_name\n1,1,Surgery\n");
        let dim = table("dim_doctors", "doctor_id,department_name\n1,Cardiology\n");
        let lookup = LookupSpec {
            dimension: "dim_doctors".to_string(),
            on: "doctor_id".to_string(),
            take: "department_name".to_string(),
        };

        let report = apply_lookup(&mut fact, &dim, &lookup).unwrap();
        assert_eq!(fact.get(0, "department_name"), Some("Surgery"));
        assert_eq!(report.kept, 1);
        assert_eq!(report.matched, 0);
    }

    #[test]
    fn test_lookup_first_duplicate_key_wins() {
        let mut fact = table("visits", "visit_id,diagnosis_code\n1,I10\n");
        let dim = table(
            "dim_diagnoses",
            "diagnosis_code,diagnosis_id\nI10,1\nI10,99\n",
        );
        let lookup = LookupSpec {
            dimension: "dim_diagnoses".to_string(),
            on: "diagnosis_code".to_string(),
            take: "diagnosis_id".to_string(),
        };

        let report = apply_lookup(&mut fact, &dim, &lookup).unwrap();
        assert_eq!(fact.get(0, "diagnosis_id"), Some("1"));
        assert_eq!(report.duplicate_keys, 1);
    }

    #[test]
    fn test_missing_source_table() {
        let config = TransformConfig {
            dimensions: vec![DimensionSpec {
                name: "dim_rooms".to_string(),
                source: "rooms".to_string(),
                columns: vec!["room_id".to_string()],
            }],
            ..TransformConfig::default()
        };
        let formats = CleaningConfig::default().date_formats;
        let modeler = Modeler::new(&config, &formats);

        let err = modeler.build_dimensions(&clean_tables()).unwrap_err();
        assert!(matches!(err, EtlError::MissingTable { ref name } if name == "rooms"));
    }
}
