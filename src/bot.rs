use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, ReplyParameters, User};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::mention;
use crate::registry::Registry;
use crate::sync::GitSync;

/// Fixed literal that triggers a group-wide mention when it appears anywhere
/// in a message (case-insensitive).
pub const TRIGGER_TOKEN: &str = "@all";

const HELP_TEXT: &str = "📖 How this bot works:\n\n\
     • Write @all anywhere in a message and every remembered member gets mentioned\n\
     • The bot remembers members automatically when they write messages or join\n\
     • Members without a username are mentioned by name\n\n\
     Commands:\n\
     /start - short intro\n\
     /help - this help\n\
     /members - list remembered members\n\
     /cleanup - clear this chat's member list (admins only)\n\
     /sync - push the member store to the configured remote";

const START_TEXT: &str = "🤖 Mention-everyone bot!\n\n\
     Write @all in any message and the bot will mention every chat member it\n\
     has seen so far. See /help for the full command list.";

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub registry: Registry,
    pub sync: GitSync,
}

impl AppState {
    pub fn new(config: Config, registry: Registry, sync: GitSync) -> Self {
        Self {
            config,
            registry,
            sync,
        }
    }
}

/// Start the Telegram bot and block until shutdown (ctrl-c).
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let bot = Bot::new(&state.config.telegram.bot_token);

    info!("Starting Telegram bot...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("bot"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

/// Outermost handler: route the update and turn any escaped error into a log
/// line plus a best-effort generic notice. The update is dropped either way.
async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Err(e) = dispatch(&bot, &msg, &state).await {
        error!("Failed to handle update in chat {}: {:#}", msg.chat.id, e);
        bot.send_message(
            msg.chat.id,
            "Something went wrong while handling that. Please try again.",
        )
        .await
        .ok();
    }
    Ok(())
}

async fn dispatch(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    if let Some(joiners) = msg.new_chat_members() {
        return handle_new_members(bot, msg, state, joiners).await;
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    if let Some(command) = parse_command(text) {
        return handle_command(bot, msg, state, &command).await;
    }

    handle_text(bot, msg, state, text).await
}

/// Plain text: remember the sender, then broadcast if the trigger is present.
async fn handle_text(bot: &Bot, msg: &Message, state: &AppState, text: &str) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let chat_id = msg.chat.id.0;

    state
        .registry
        .upsert(
            chat_id,
            user.id.0,
            user.username.as_deref(),
            Some(&user.first_name),
            user.is_bot,
        )
        .await?;

    if !contains_trigger(text) {
        return Ok(());
    }

    info!("Mention trigger from user {} in chat {}", user.id, chat_id);

    let members = state.registry.list_for_chat(chat_id).await;
    if members.is_empty() {
        bot.send_message(msg.chat.id, mention::NO_MEMBERS_PLACEHOLDER)
            .await?;
        return Ok(());
    }

    bot.send_message(msg.chat.id, mention::render_mentions(&members))
        .parse_mode(ParseMode::MarkdownV2)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
    Ok(())
}

/// Membership join: remember the humans, welcome them, and call out bots as
/// excluded from future mentions.
async fn handle_new_members(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    joiners: &[User],
) -> Result<()> {
    let chat_id = msg.chat.id.0;
    let (humans, bots): (Vec<&User>, Vec<&User>) = joiners.iter().partition(|user| !user.is_bot);

    for user in &humans {
        state
            .registry
            .upsert(
                chat_id,
                user.id.0,
                user.username.as_deref(),
                Some(&user.first_name),
                user.is_bot,
            )
            .await?;
    }

    if !humans.is_empty() {
        let names = mention::joiner_names(&name_pairs(&humans));
        bot.send_message(
            msg.chat.id,
            format!(
                "👋 Welcome, {}!\n\nYou are now on the {} mention list.",
                names, TRIGGER_TOKEN
            ),
        )
        .await?;
    }

    if !bots.is_empty() {
        let names = mention::joiner_names(&name_pairs(&bots));
        bot.send_message(
            msg.chat.id,
            format!(
                "🤖 {} joined as a bot and will not be included in {} mentions.",
                names, TRIGGER_TOKEN
            ),
        )
        .await?;
    }

    Ok(())
}

async fn handle_command(bot: &Bot, msg: &Message, state: &AppState, command: &str) -> Result<()> {
    match command {
        "start" => {
            bot.send_message(msg.chat.id, START_TEXT).await?;
        }
        "help" => {
            bot.send_message(msg.chat.id, HELP_TEXT).await?;
        }
        "members" => {
            let members = state.registry.list_for_chat(msg.chat.id.0).await;
            bot.send_message(msg.chat.id, mention::render_member_list(&members))
                .await?;
        }
        "cleanup" => {
            handle_cleanup(bot, msg, state).await?;
        }
        "sync" => {
            handle_sync(bot, msg, state).await?;
        }
        other => {
            debug!("Ignoring unknown command /{}", other);
        }
    }
    Ok(())
}

/// Admin-only: clear this chat's member list and report how many were removed.
async fn handle_cleanup(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let member = bot.get_chat_member(msg.chat.id, user.id).await?;
    if !member.kind.is_privileged() {
        bot.send_message(
            msg.chat.id,
            "🚫 Only chat administrators can clear the member list.",
        )
        .await?;
        return Ok(());
    }

    let removed = state.registry.clear_chat(msg.chat.id.0).await?;
    info!(
        "Admin {} cleared {} member record(s) in chat {}",
        user.id, removed, msg.chat.id
    );
    bot.send_message(
        msg.chat.id,
        format!("🧹 Cleared {} member record(s) for this chat.", removed),
    )
    .await?;
    Ok(())
}

/// On-demand sync: push local member store changes, then pull the remote.
/// Sync failures are reported to the chat but never propagated.
async fn handle_sync(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    if !state.sync.enabled() {
        bot.send_message(msg.chat.id, "Sync is not configured for this bot.")
            .await?;
        return Ok(());
    }

    let reply = match state.sync.push_if_changed().await {
        Ok(true) => "✅ Member store pushed to the remote.".to_string(),
        Ok(false) => "Member store already up to date, nothing to push.".to_string(),
        Err(e) => {
            error!("Manual sync push failed: {:#}", e);
            format!("⚠️ Sync failed: {}", e)
        }
    };
    if let Err(e) = state.sync.pull().await {
        error!("Manual sync pull failed: {:#}", e);
    }

    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

fn contains_trigger(text: &str) -> bool {
    text.to_lowercase().contains(TRIGGER_TOKEN)
}

/// Extract the command word from a `/command[@BotName] args` message.
fn parse_command(text: &str) -> Option<String> {
    let first = text.split_whitespace().next()?;
    let stripped = first.strip_prefix('/')?;
    let command = stripped.split('@').next().unwrap_or(stripped);
    if command.is_empty() {
        return None;
    }
    Some(command.to_ascii_lowercase())
}

fn name_pairs(users: &[&User]) -> Vec<(Option<String>, String)> {
    users
        .iter()
        .map(|user| (user.username.clone(), user.first_name.clone()))
        .collect()
}
