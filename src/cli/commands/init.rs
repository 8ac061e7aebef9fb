//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::repository::util::redact_url_password;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let ctx = settings.create_db_context()?;
    ctx.init_schema().await?;

    println!(
        "{} Initialized database at {}",
        style("✓").green(),
        redact_url_password(&settings.database_url())
    );
    if !settings.gemini.is_configured() {
        println!(
            "{} GEMINI_API_KEY is not set; ingestion and voice turns will fail",
            style("!").yellow()
        );
    }

    Ok(())
}
