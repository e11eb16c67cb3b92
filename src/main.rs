use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use etc_apply::cli::{commands, Cli};
use etc_apply::config::{config, EtcApplyConfig};
use etc_apply::http::HttpBackendClient;
use etc_apply::observability::backend_metrics;
use etc_apply::telemetry::init_telemetry;
use etc_apply::workflow::EnrollmentWorkflow;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let _ = EtcApplyConfig::load_env_file();
            EtcApplyConfig::load_from(Path::new("."), Some(path))?
        }
        None => config()?.clone(),
    };
    if let Some(base_url) = cli.base_url {
        config.backend.base_url = base_url;
    }

    init_telemetry(&config.observability)?;

    let client = HttpBackendClient::new(&config.backend)?
        .with_metrics(config.observability.metrics_enabled);
    let workflow = EnrollmentWorkflow::new(Arc::new(client), config.workflow.settings());

    let result = commands::run(cli.command, workflow).await;

    if config.observability.metrics_enabled {
        backend_metrics().log_stats();
    }
    result
}
