//! One-shot ingestion of a local file.

use std::path::Path;

use console::style;

use crate::config::Settings;
use crate::server::AppState;

/// Run a file through the ingestion pipeline and print the preview.
pub async fn cmd_ingest(settings: &Settings, file: &Path) -> anyhow::Result<()> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid file path: {}", file.display()))?;
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    let content = tokio::fs::read(file)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;

    settings.ensure_directories()?;
    let state = AppState::new(settings).await?;
    state.db.init_schema().await?;

    eprintln!(
        "{} Ingesting {} ({} bytes)",
        style("→").cyan(),
        filename,
        content.len()
    );
    let preview = state.pipeline.ingest(&content, filename, extension).await?;
    eprintln!(
        "  {} {} with {} steps",
        style("✓").green(),
        preview.protocol.protocol_name,
        preview.protocol_steps.len()
    );

    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}
