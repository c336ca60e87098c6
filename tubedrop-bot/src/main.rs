mod handlers;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use teloxide::prelude::*;
use tracing::{info, warn};

use tubedrop::mux::FfmpegMuxer;
use tubedrop::ytdlp::YtDlpResolver;
use tubedrop::{LinkRegistry, Orchestrator, QuotaStore, ResetScheduler, Settings};

use crate::handlers::BotState;

#[derive(Parser)]
#[command(name = "tubedrop-bot", about = "Telegram bot that turns video links into downloadable files")]
struct Cli {
    /// Directory for temporary downloads (overrides TUBEDROP_WORK_DIR).
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Verify yt-dlp and ffmpeg are installed, then exit.
    #[arg(long)]
    check_tools: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tubedrop=info,tubedrop_bot=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.check_tools {
        let tools = tubedrop::ToolPaths::from_env();
        match tubedrop::tools::check_tools(&tools).await {
            Ok(()) => println!("yt-dlp and ffmpeg are available"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let mut settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if let Some(dir) = cli.work_dir {
        settings = settings.work_dir(dir);
    }

    if let Err(e) = tubedrop::tools::check_tools(&settings.tools).await {
        warn!(error = %e, "external tool missing, downloads will fail until it is installed");
    }

    let quota = Arc::new(QuotaStore::new(settings.daily_limit));
    for user in &settings.premium_users {
        quota.set_premium(*user, true);
    }
    let scheduler = ResetScheduler::new();
    scheduler.start(Arc::clone(&quota));

    let orchestrator = Orchestrator::new(
        &settings,
        Arc::clone(&quota),
        Arc::new(YtDlpResolver::new(&settings.tools.ytdlp)),
        Arc::new(FfmpegMuxer::new(&settings.tools.ffmpeg)),
    );
    let state = Arc::new(BotState {
        orchestrator,
        links: LinkRegistry::default(),
        max_upload_mb: settings.max_upload_bytes / (1024 * 1024),
    });

    info!(
        daily_limit = settings.daily_limit,
        max_upload_bytes = settings.max_upload_bytes,
        premium_users = settings.premium_users.len(),
        work_dir = %settings.resolve_work_dir().display(),
        "bot starting"
    );

    let bot = Bot::new(settings.token.expose());
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::on_message))
        .branch(Update::filter_callback_query().endpoint(handlers::on_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    scheduler.stop();
    info!("bot stopped");
}
