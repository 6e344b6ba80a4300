use anyhow::Context;
use clap::Parser;
use healthcare_etl::config::plan;
use healthcare_etl::utils::{logger, validation::Validate};
use healthcare_etl::{
    CliConfig, Command, EtlEngine, EtlError, HealthcarePipeline, LocalStorage, TomlConfig,
};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose, cli.log_format, cli.log_file.as_deref().map(Path::new))
        .context("failed to initialise logging")?;

    tracing::info!("Starting healthcare-etl");
    tracing::debug!("CLI config: {:?}", cli);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path);
            TomlConfig::from_file(path)
                .with_context(|| format!("failed to load config file '{}'", path))?
        }
        None => TomlConfig::default(),
    };

    // 應用命令列覆蓋設定
    if let Some(base_dir) = &cli.base_dir {
        config.paths.base_dir = base_dir.clone();
    }
    if let Command::Run { archive: true, .. } = cli.command {
        config.load.archive = true;
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let monitor_enabled = cli.monitor || config.monitoring_enabled();

    let storage = LocalStorage::new(config.paths.base_dir.clone());
    let pipeline = HealthcarePipeline::new(storage, config);

    let outcome = match cli.command {
        Command::CheckConfig => {
            print!("{}", plan::config_summary(pipeline.config()));
            println!("✅ Configuration is valid");
            return Ok(());
        }
        Command::Run { dry_run: true, .. } => {
            print!("{}", plan::config_summary(pipeline.config()));
            print!("{}", plan::dry_run_plan(pipeline.config()));
            return Ok(());
        }
        Command::Profile => pipeline.profile().await.map(|path| {
            println!("✅ Data profiling completed. Report saved to {}", path);
        }),
        Command::Clean => pipeline.clean().await.map(|reports| {
            for r in &reports {
                println!(
                    "✅ {}: {} -> {} rows ({} duplicates removed)",
                    r.table, r.rows_in, r.rows_out, r.duplicates_removed
                );
            }
        }),
        Command::Transform => pipeline.model().await.map(|reports| {
            for r in &reports {
                println!("✅ {} created ({} rows)", r.fact, r.rows);
            }
        }),
        Command::Run { .. } => {
            let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);
            engine.run().await.map(|output_path| {
                println!("✅ ETL process completed successfully!");
                println!("📁 Output saved to: {}", output_path);
            })
        }
    };

    if let Err(e) = outcome {
        exit_with(e);
    }

    Ok(())
}

fn exit_with(e: EtlError) {
    tracing::error!(
        "❌ ETL process failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = e.severity().exit_code();

    if exit_code > 0 {
        std::process::exit(exit_code);
    }
}
