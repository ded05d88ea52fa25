use std::sync::Arc;

use coursechat::chat::MarkdownRenderer;
use coursechat::settings::SettingsStore;
use coursechat::terminal::{self, BLOCK_ID_ENV, TerminalSurface, USER_ID_ENV};
use coursechat::{ChatSurface, SessionResult, SessionServices};
use coursechat_history::{BlockId, UserId};

/// Terminal entry point.
///
/// Identity comes from two positional arguments or the `COURSECHAT_USER_ID` and
/// `COURSECHAT_BLOCK_ID` variables. Logs go to stderr so they do not interleave with
/// streamed replies.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    if let Err(error) = run().await {
        tracing::error!(error = %error, "coursechat exited with an error");
        eprintln!("coursechat: {error}");
        std::process::exit(1);
    }
}

async fn run() -> SessionResult<()> {
    let mut args = std::env::args().skip(1);
    let user_id = terminal::identity_value(args.next(), USER_ID_ENV, "user id")?;
    let block_id = terminal::identity_value(args.next(), BLOCK_ID_ENV, "block id")?;
    let (user_id, block_id) = (UserId::new(user_id), BlockId::new(block_id));

    let store = SettingsStore::load();
    tracing::info!(config_path = ?store.config_path(), "settings loaded");
    let services = SessionServices::from_settings(store.settings())?;

    // Terminal output shows markdown source, so no HTML renderer.
    let surface: Arc<dyn ChatSurface> = Arc::new(TerminalSurface::new());
    let renderer: Option<Arc<dyn MarkdownRenderer>> = None;
    let mut controller = services
        .open_session(&user_id, &block_id, surface.clone(), renderer)
        .await?;

    terminal::run(&mut controller, surface).await
}
