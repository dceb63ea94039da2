use anyhow::{Context as _, Result};
use dotenvy::dotenv;
use log::{error, info, warn};
use serenity::async_trait;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nudge::core::{split_message, Config};
use nudge::features::reminders::ScheduleCompiler;
use nudge::{
    ChatId, ConversationHandler, CronCompiler, DiscordDispatcher, NotificationDispatcher,
    ReminderScheduler, ReminderStore,
};

struct Handler {
    conversations: Arc<ConversationHandler>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    admin_chat: Option<ChatId>,
    /// Set after the first Ready event so reconnects don't re-announce
    announced: AtomicBool,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let Ok(chat) = ChatId::try_from(msg.channel_id.0) else {
            warn!("Ignoring message from unsupported channel id {}", msg.channel_id.0);
            return;
        };

        let reply = self.conversations.handle_text(chat, &msg.content).await;
        for part in split_message(&reply) {
            if let Err(why) = msg.channel_id.say(&ctx.http, part).await {
                error!("Failed to reply in chat {chat}: {why}");
                break;
            }
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🎉 {} is connected and ready!", ready.user.name);
        info!("📡 Connected to {} guilds", ready.guilds.len());

        if self.announced.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(admin) = self.admin_chat {
            let notice = format!("Reminder bot v{} is up and running.", env!("CARGO_PKG_VERSION"));
            if let Err(e) = self.dispatcher.send(admin, &notice).await {
                warn!("Failed to send startup notice to chat {admin}: {e:#}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting reminder bot...");

    let store = Arc::new(ReminderStore::open(&config.store_path).with_context(|| {
        format!("failed to open reminder store {}", config.store_path.display())
    })?);

    let http = Arc::new(Http::new(&config.discord_token));
    let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(DiscordDispatcher::new(http));
    let compiler: Arc<dyn ScheduleCompiler> = Arc::new(CronCompiler);
    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        compiler.clone(),
        dispatcher.clone(),
    ));

    let report = scheduler.reconcile().await?;
    info!(
        "⏰ Scheduled {} reminders from {}",
        report.started.len(),
        config.store_path.display()
    );

    let conversations = Arc::new(ConversationHandler::new(
        store,
        compiler,
        scheduler.clone(),
        dispatcher.clone(),
        config.admin_chat_id,
    ));

    let handler = Handler {
        conversations,
        dispatcher,
        admin_chat: config.admin_chat_id,
        announced: AtomicBool::new(false),
    };

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");

    let result = client.start().await;
    scheduler.shutdown().await;

    if let Err(why) = result {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
