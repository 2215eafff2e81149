pub mod anthropic;
pub mod assistant;
pub mod config;
pub mod consent;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod prompts;
pub mod route;
pub mod session;
pub mod settings;
pub mod topics;

#[cfg(feature = "desktop")]
mod commands;

pub use anthropic::{AnthropicClient, CompletionClient, SystemContext};
pub use assistant::Assistant;
pub use config::AppConfig;
pub use consent::{ConsentGate, ConsentState, ContextResolution};
pub use context::{extract_context, ContextField, ContextMap};
pub use db::{Agent, Conversation, ConversationStore, Message, SenderType, SqliteStore};
pub use error::{ChatError, Result};
pub use route::Route;
pub use session::{ChatSession, CompletionRequest, PreparedSend, SendOutcome, SessionController, SessionView};
pub use settings::{Settings, SettingsSource};
pub use topics::Topic;

// ============ Run ============

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use tauri::Manager;

    tauri::Builder::default()
        .setup(|app| {
            let config = AppConfig::load()?;

            if let Err(e) = logging::init_logging(&config.log_dir) {
                eprintln!("Failed to initialize logging: {}", e);
            }

            // Clean up old log files (keep last 7 days)
            let _ = logging::cleanup_old_logs();

            let store = SqliteStore::open(&config.db_path)?.for_user(&config.user_id);
            logging::log_session(None, &format!("Store opened at {}", config.db_path.display()));
            if config.anthropic_key.is_none() {
                logging::log_agent(None, "No Anthropic API key configured yet");
            }

            app.manage(commands::AppState::new(config, store)?);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::open_agent_chat,
            commands::list_topics,
            commands::select_topic,
            commands::send_message,
            commands::resolve_consent,
            commands::new_conversation,
            commands::get_session,
            commands::list_conversations,
            commands::delete_conversation,
            commands::save_settings,
            commands::validate_api_key,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
