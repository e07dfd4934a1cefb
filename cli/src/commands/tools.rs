//! Tool catalog listing command

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use toolgate_core::ToolGateway;

/// Show the tool catalog grouped by provider
pub async fn tools_command(config_path: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(config_path).await?;

    info!("Connecting to {} provider(s)", config.providers.len());

    let gateway = Arc::new(ToolGateway::new());
    gateway.start(&config.providers).await?;

    println!("🛠️  Available Tools\n");

    let groups = gateway.describe_providers().await;
    let mut provider_ids: Vec<&String> = groups.keys().collect();
    provider_ids.sort();

    for provider_id in provider_ids {
        println!("📦 {}", provider_id);
        for tool in &groups[provider_id] {
            println!("   {}", tool);
        }
        println!();
    }

    if gateway.is_degraded() {
        println!("⚠️  No providers yielded any tools; check the provider configuration.");
    }

    gateway.shutdown().await;
    Ok(())
}
