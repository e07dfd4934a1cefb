//! Single conversation turn command

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use toolgate_core::{
    ConversationLoop, InferenceClient, OpenAiCompatClient, SessionPersistence, SessionStore,
    ToolGateway,
};

/// Run one conversation turn and print the outcome
pub async fn run_command(
    message: String,
    config_path: Option<PathBuf>,
    session_id: Option<String>,
    owner: String,
) -> Result<()> {
    let config = super::load_config(config_path).await?;

    let store = Arc::new(SessionStore::new(config.session.clone()));
    store.start_sweeper().await;

    let persistence = Arc::new(SessionPersistence::new(
        Arc::clone(&store),
        config.persistence.clone(),
    ));
    let restored = persistence.initialize().await?;
    debug!("restored {} persisted session(s)", restored);

    let gateway = Arc::new(ToolGateway::new());
    gateway.start(&config.providers).await?;
    if gateway.is_degraded() {
        info!("no tools available; answering without tools");
    }

    let session_id = match session_id {
        Some(id) => {
            if store.get(&id).await.is_none() {
                anyhow::bail!("session {} not found", id);
            }
            id
        }
        None => {
            let session = store.create(owner, Default::default()).await;
            debug!("created session {}", session.id);
            session.id
        }
    };

    let inference = Arc::new(OpenAiCompatClient::new(&config.inference)?);
    info!("🤖 Using model: {}", inference.model_name());

    let conversation = ConversationLoop::new(
        inference,
        Arc::clone(&gateway),
        Arc::clone(&store),
        config.conversation.clone(),
    );

    let outcome = conversation.run(&session_id, &message).await;

    // Tear down in reverse order; the outcome is reported afterwards so
    // a failed run still flushes sessions and stops providers.
    if let Err(e) = persistence.shutdown().await {
        tracing::warn!("final session flush failed: {}", e);
    }
    gateway.shutdown().await;
    store.stop_sweeper().await;

    let outcome = outcome?;

    if !outcome.tool_results.is_empty() {
        println!("🛠️  Tool calls\n");
        for record in &outcome.tool_results {
            let status = if record.outcome.is_success() {
                "ok"
            } else {
                "failed"
            };
            println!(
                "  {}/{} {} [{}] ({})",
                record.sequence,
                record.total_steps,
                record.tool_name,
                record.provider_id.as_deref().unwrap_or("unknown"),
                status
            );
        }
        println!();
    }

    println!("{}", outcome.final_response);
    println!("\n📎 Session: {}", session_id);

    Ok(())
}
