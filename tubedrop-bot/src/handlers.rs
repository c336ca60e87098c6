use std::sync::Arc;

use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::{debug, info, warn};

use tubedrop::link::extract_video_url;
use tubedrop::{
    CallbackData, DownloadRequest, Intent, LinkRegistry, LinkToken, Orchestrator, Outcome, Progress,
    QualityTier, UserId,
};

use crate::telegram::TelegramDelivery;

/// Shared by every handler invocation.
pub struct BotState {
    pub orchestrator: Orchestrator,
    pub links: LinkRegistry,
    pub max_upload_mb: u64,
}

pub async fn on_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let user = UserId(chat_id.0 as u64);

    let mut words = text.split_whitespace();
    let first = words.next().unwrap_or_default();
    let argument = words.next();

    if let Some(command) = first.strip_prefix('/') {
        let command = command.split('@').next().unwrap_or_default();
        debug!(%user, command, "command received");
        return match command {
            "start" => send(&bot, chat_id, welcome_text(&state)).await,
            "help" => send(&bot, chat_id, help_text(&state)).await,
            "stats" => send(&bot, chat_id, stats_text(&state, user)).await,
            "video" => offer(&bot, chat_id, &state, user, argument, Menu::VideoTiers).await,
            "audio" => offer(&bot, chat_id, &state, user, argument, Menu::Audio).await,
            _ => send(&bot, chat_id, "❓ Unknown command. Try /help".to_string()).await,
        };
    }

    match extract_video_url(text) {
        Some(_) => offer(&bot, chat_id, &state, user, Some(text), Menu::Full).await,
        None => send(&bot, chat_id, "❌ Please send a valid YouTube URL".to_string()).await,
    }
}

pub async fn on_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;

    let user = UserId(q.from.id.0);
    let chat_id = ChatId(q.from.id.0 as i64);
    let Some(payload) = q.data.as_deref() else {
        return Ok(());
    };

    let decoded = CallbackData::decode(payload)
        .and_then(|data| state.links.resolve(&data.token).map(|url| (data.intent, url)));
    let (intent, url) = match decoded {
        Ok(pair) => pair,
        Err(e) => {
            warn!(%user, payload, error = %e, "unusable callback");
            return send(&bot, chat_id, format!("❌ {e}")).await;
        }
    };
    info!(%user, ?intent, %url, "request accepted");

    let first_stage = match intent {
        Intent::Info => Progress::FetchingInfo,
        _ => Progress::Starting,
    };
    let delivery = TelegramDelivery::begin(bot, chat_id, first_stage).await?;
    let request = DownloadRequest { user, url, intent };

    // Requests from the same user run independently of each other.
    tokio::spawn(async move {
        let report = state.orchestrator.run(&request, &delivery).await;
        delivery.finish(&report.outcome).await;
    });
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Menu {
    Full,
    VideoTiers,
    Audio,
}

impl Menu {
    fn prompt(self) -> &'static str {
        match self {
            Menu::Full => "🎬 Choose download option:",
            Menu::VideoTiers => "🎬 Choose video quality:",
            Menu::Audio => "🎵 Download audio?",
        }
    }

    fn usage(self) -> &'static str {
        match self {
            Menu::Audio => "❌ Please provide a YouTube URL:\n/audio https://youtube.com/watch?v=...",
            _ => "❌ Please provide a YouTube URL:\n/video https://youtube.com/watch?v=...",
        }
    }

    fn keyboard(self, token: &LinkToken) -> InlineKeyboardMarkup {
        let button = |label: &str, intent: Intent| {
            InlineKeyboardButton::callback(label, CallbackData::new(intent, token.clone()).encode())
        };
        let tiers = vec![
            button("🎥 Video (High)", Intent::Video(QualityTier::Highest)),
            button("🎥 Video (Low)", Intent::Video(QualityTier::Lowest)),
        ];
        let rows = match self {
            Menu::Full => vec![
                tiers,
                vec![button("🎵 Audio", Intent::Audio)],
                vec![button("📊 Video Info", Intent::Info)],
            ],
            Menu::VideoTiers => vec![tiers],
            Menu::Audio => vec![vec![button("🎵 Download Audio", Intent::Audio)]],
        };
        InlineKeyboardMarkup::new(rows)
    }
}

async fn offer(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
    user: UserId,
    text: Option<&str>,
    menu: Menu,
) -> ResponseResult<()> {
    let Some(text) = text else {
        return send(bot, chat_id, menu.usage().to_string()).await;
    };
    let Some(url) = extract_video_url(text) else {
        return send(bot, chat_id, "❌ Invalid YouTube URL".to_string()).await;
    };

    let quota = state.orchestrator.quota();
    if !quota.check(user) {
        debug!(%user, "menu withheld, daily limit reached");
        let notice = Outcome::LimitReached {
            daily_limit: quota.daily_limit(),
        };
        return send(bot, chat_id, notice.message()).await;
    }

    let token = state.links.register(&url);
    bot.send_message(chat_id, menu.prompt())
        .reply_markup(menu.keyboard(&token))
        .await?;
    Ok(())
}

async fn send(bot: &Bot, chat_id: ChatId, text: String) -> ResponseResult<()> {
    bot.send_message(chat_id, text).await?;
    Ok(())
}

fn limit_line(state: &BotState) -> String {
    match state.orchestrator.quota().daily_limit() {
        0 => "Limits: unlimited downloads".to_string(),
        n => format!("Limits: {n} downloads/day (free)\nPremium: unlimited downloads"),
    }
}

fn welcome_text(state: &BotState) -> String {
    format!(
        "🎬 YouTube Downloader Bot Started!\n\n\
         Commands:\n\
         📥 Send any YouTube link to download\n\
         /video <url> - Download as video\n\
         /audio <url> - Download audio only\n\
         /stats - Your download stats\n\
         /help - Help guide\n\n\
         {}\n\n\
         Quick Start:\n\
         1. Send YouTube link\n\
         2. Choose format\n\
         3. Download your file!",
        limit_line(state)
    )
}

fn help_text(state: &BotState) -> String {
    format!(
        "📖 Bot Help Guide\n\n\
         How to Download:\n\
         1. Copy YouTube video URL\n\
         2. Send it to this bot\n\
         3. Choose video or audio\n\
         4. Wait for download\n\n\
         Supported Links:\n\
         • https://youtube.com/watch?v=...\n\
         • https://youtu.be/...\n\
         • YouTube shorts\n\
         • YouTube music\n\n\
         File Limits:\n\
         • Max {}MB per file\n\
         • Shorter videos work better",
        state.max_upload_mb
    )
}

fn stats_text(state: &BotState, user: UserId) -> String {
    let quota = state.orchestrator.quota();
    let premium = if quota.is_premium(user) {
        "⭐ Premium: Active"
    } else {
        "💎 Premium: Inactive"
    };
    format!(
        "📊 Your Stats\n\n🆔 User: {user}\n📥 Remaining: {}\n{premium}",
        quota.remaining(user)
    )
}
