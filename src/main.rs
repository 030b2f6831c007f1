use std::sync::Arc;

use leadflow::bot::Bot;
use leadflow::channels::{ChatApi, TelegramApi};
use leadflow::config::{Config, SharedDocumentUrl, load_env_file};
use leadflow::followup::{FollowupEngine, ReminderPolicy};
use leadflow::sheets::{NullMirror, SheetMirror, SheetsClient};
use leadflow::store::{LeadStore, LibSqlStore};

/// Interval between liveness probes against the Bot API.
const HEALTH_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_env_file("environment.ini");

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  Required: BOT_TOKEN, CHANNEL_ID, DOCUMENT_URL");
        std::process::exit(1);
    });

    eprintln!("📨 Leadflow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Channel: {}", config.channel_id);
    eprintln!("   Document: {}", config.document_filename);
    eprintln!(
        "   Reminders: every {}d, max {} attempts",
        config.reminder.interval_days, config.reminder.max_attempts
    );

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn LeadStore> = Arc::new(
        LibSqlStore::new_local(std::path::Path::new(&config.db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.db_path);

    // ── Telegram ─────────────────────────────────────────────────────────
    let telegram = Arc::new(TelegramApi::new(
        config.bot_token.clone(),
        config.channel_id,
    ));
    match telegram.get_me().await {
        Ok(username) => eprintln!("   Bot: @{username}"),
        Err(e) => {
            eprintln!("Error: Telegram startup check failed: {e}");
            std::process::exit(1);
        }
    }

    // ── Spreadsheet mirror ──────────────────────────────────────────────
    let sheets: Arc<dyn SheetMirror> = match &config.sheets {
        Some(sheet_config) => {
            eprintln!("   Sheet mirror: {}", sheet_config.sheet_id);
            Arc::new(SheetsClient::new(sheet_config))
        }
        None => {
            eprintln!("   Sheet mirror: disabled");
            Arc::new(NullMirror)
        }
    };

    // ── Follow-up engine + startup recovery ─────────────────────────────
    let engine = FollowupEngine::new(
        ReminderPolicy::new(&config.reminder),
        Arc::clone(&store),
        telegram.clone() as Arc<dyn ChatApi>,
        Arc::clone(&sheets),
        config.manager_contact.clone(),
    );
    let recovered = engine.recover().await;
    if recovered > 0 {
        eprintln!("   Recovered {recovered} outstanding follow-ups from DB");
    }

    // Hourly liveness probe against the Bot API; failures go to the admin
    // chat when one is configured.
    {
        let telegram = Arc::clone(&telegram);
        let admin_chat_id = config.admin_chat_id;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match telegram.get_me().await {
                    Ok(_) => tracing::debug!("Health check ok"),
                    Err(e) => {
                        tracing::warn!("Health check failed: {e}");
                        if let Some(admin) = admin_chat_id {
                            let text = format!("⚠️ Health check failed: {e}");
                            if let Err(e) = telegram.send_text(admin, &text, &[]).await {
                                tracing::warn!("Could not notify admin: {e}");
                            }
                        }
                    }
                }
            }
        });
    }

    // ── Bot ─────────────────────────────────────────────────────────────
    let document_url = SharedDocumentUrl::new(config.document_url.clone());
    let bot = Arc::new(Bot::new(
        store,
        telegram.clone() as Arc<dyn ChatApi>,
        sheets,
        engine,
        &config,
        document_url,
    ));

    let updates = telegram.start_polling();
    bot.run(updates).await;

    Ok(())
}
