//! relaybot setup.
//!
//! Without flags: runs an interactive terminal wizard that writes
//! `config.toml` to the project root.
//!
//! With `--register <public-url>`: reads the existing config (and the
//! environment) and points the Telegram webhook at
//! `<public-url>/webhook/<token>`, passing the webhook secret if one is set.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    tg_token: &'a str,
    webhook_secret: &'a str,
    api_key: &'a str,
    model: &'a str,
    max_tokens: u32,
    chat_filter: &'a str,
    search_key: &'a str,
    port: u16,
}

/// Quotes a value as a TOML string, escaping as needed.
fn toml_str(value: &str) -> String {
    toml::Value::String(value.to_owned()).to_string()
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let secret_line = if p.webhook_secret.is_empty() {
        "# webhook_secret = \"long-random-string\"".to_owned()
    } else {
        format!("webhook_secret = {}", toml_str(p.webhook_secret))
    };

    let search_section = if p.search_key.is_empty() {
        "# [search]\n# api_key = \"...\"".to_owned()
    } else {
        format!("[search]\napi_key = {}\nnum_results = 3", toml_str(p.search_key))
    };

    let tg_token = toml_str(p.tg_token);
    let api_key = toml_str(p.api_key);
    let model = toml_str(p.model);
    let max_tokens = p.max_tokens;
    let chat_filter = toml_str(p.chat_filter);
    let port = p.port;

    format!(
        r#"[telegram]
bot_token = {tg_token}
{secret_line}
chat_filter = {chat_filter}

[llm]
provider = "openai"
api_key = {api_key}
model = {model}
max_tokens = {max_tokens}
temperature = 0.2

{search_section}

[server]
port = {port}
"#
    )
}

// ── Webhook registration ───────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct PartialConfig {
    #[serde(default)]
    telegram: PartialTelegram,
}

#[derive(Deserialize, Default)]
struct PartialTelegram {
    #[serde(default)]
    bot_token: String,
    #[serde(default)]
    webhook_secret: Option<String>,
    #[serde(default)]
    api_base_url: Option<String>,
}

fn webhook_url(public_url: &str, token: &str) -> String {
    format!("{}/webhook/{}", public_url.trim_end_matches('/'), token)
}

async fn register_webhook(project_root: &Path, public_url: &str) -> Result<()> {
    let config_path = project_root.join("config.toml");
    let partial: PartialConfig = match std::fs::read_to_string(&config_path) {
        Ok(content) => toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?,
        Err(_) => PartialConfig::default(),
    };

    let token = std::env::var("TELEGRAM_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
        .unwrap_or(partial.telegram.bot_token);
    if token.is_empty() {
        anyhow::bail!("No bot token: set TELEGRAM_TOKEN or telegram.bot_token in config.toml");
    }
    let secret = std::env::var("WEBHOOK_SECRET")
        .ok()
        .or(partial.telegram.webhook_secret)
        .filter(|s| !s.is_empty());
    let api_base = partial
        .telegram
        .api_base_url
        .unwrap_or_else(|| "https://api.telegram.org".to_string());

    let mut body = json!({
        "url": webhook_url(public_url, &token),
        "allowed_updates": ["message", "edited_message", "channel_post"],
    });
    if let Some(secret) = secret {
        body["secret_token"] = json!(secret);
    }

    let response = reqwest::Client::new()
        .post(format!("{}/bot{}/setWebhook", api_base.trim_end_matches('/'), token))
        .json(&body)
        .send()
        .await
        .map_err(|e| e.without_url())
        .context("setWebhook request failed")?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("setWebhook error {}: {}", status, text);
    }

    println!("✓  Webhook registered at {}/webhook/<token>", public_url.trim_end_matches('/'));
    Ok(())
}

// ── CLI mode ───────────────────────────────────────────────────────────────────

fn run_cli(project_root: &Path) -> Result<()> {
    use std::io::{self, Write};

    println!("=== relaybot setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let tg_token = read_line("Telegram bot token: ")?;
    let webhook_secret = read_line("Webhook secret (optional): ")?;
    let api_key = read_line("OpenAI API key: ")?;
    let model = or_default(read_line("Model [gpt-4o-mini]: ")?, "gpt-4o-mini");
    let chat_filter = or_default(read_line("Answer in which chats? (all/private) [all]: ")?, "all");
    let search_key = read_line("Search API key (optional, enables web search): ")?;
    let port: u16 = or_default(read_line("Port [8080]: ")?, "8080")
        .parse()
        .context("Port must be a number")?;

    let config = format_config(&ConfigParams {
        tg_token: &tg_token,
        webhook_secret: &webhook_secret,
        api_key: &api_key,
        model: &model,
        max_tokens: 1024,
        chat_filter: &chat_filter,
        search_key: &search_key,
        port,
    });

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the relay with:  cargo run --bin relaybot");
    println!("   Then register it:    cargo run --bin relaybot-setup -- --register https://your.host");
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    // Resolve project root: prefer RELAYBOT_ROOT env, fall back to cwd.
    let project_root =
        PathBuf::from(std::env::var("RELAYBOT_ROOT").unwrap_or_else(|_| ".".to_string()));

    if let Some(pos) = args.iter().position(|a| a == "--register") {
        let public_url = args
            .get(pos + 1)
            .context("--register needs the public base URL, e.g. https://bot.example.com")?;
        return register_webhook(&project_root, public_url).await;
    }

    run_cli(&project_root)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
