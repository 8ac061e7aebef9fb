//! Web server command.

use console::style;

use crate::config::Settings;

/// Start the web server.
pub async fn cmd_serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let bind = parse_bind_address(bind);

    println!("{} Running database migrations...", style("→").cyan());
    let ctx = settings.create_db_context()?;
    match ctx.init_schema().await {
        Ok(()) => {
            println!("  {} Database ready", style("✓").green());
        }
        Err(e) => {
            eprintln!("  {} Migration failed: {}", style("✗").red(), e);
            return Err(anyhow::anyhow!("Database migration failed: {}", e));
        }
    }

    println!(
        "{} Starting Protocol Copilot API at http://{}",
        style("→").cyan(),
        bind
    );
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings, &bind).await
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

/// Parse a bind address that can be:
/// - Just a port: "8000" -> 0.0.0.0:8000
/// - Just a host: "127.0.0.1" -> 127.0.0.1:8000
/// - Host and port: "127.0.0.1:9000"
fn parse_bind_address(bind: &str) -> String {
    if let Ok(port) = bind.parse::<u16>() {
        return format!("{}:{}", DEFAULT_HOST, port);
    }

    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if port_str.parse::<u16>().is_ok() {
            return format!("{}:{}", host, port_str);
        }
    }

    format!("{}:{}", bind, DEFAULT_PORT)
}
