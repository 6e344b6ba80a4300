use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::time::Instant;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting ETL process");
        if self.monitor.is_enabled() {
            tracing::info!("🔍 System monitoring enabled");
        }
        let started = Instant::now();

        // Extract
        let raw_data = self.pipeline.extract().await?;
        let raw_rows: usize = raw_data.iter().map(|t| t.len()).sum();
        tracing::info!("Extracted {} tables ({} rows)", raw_data.len(), raw_rows);
        self.monitor.log_stage("extract");

        // Transform
        let result = self.pipeline.transform(raw_data).await?;
        let removed: usize = result
            .cleaning_reports
            .iter()
            .map(|r| r.rows_in - r.rows_out)
            .sum();
        tracing::info!(
            "Cleaned {} tables ({} rows removed), built {} dimensions and {} facts",
            result.clean_tables.len(),
            removed,
            result.dimensions.len(),
            result.facts.len()
        );
        self.monitor.log_stage("transform");

        // Load
        let output_path = self.pipeline.load(result).await?;
        self.monitor.log_stage("load");

        tracing::info!("Output saved to {} in {:?}", output_path, started.elapsed());
        self.monitor.log_final();

        Ok(output_path)
    }
}
