//! # abode-cli
//!
//! `abode` binary: a terminal inbox that drives the messaging facade against
//! a local `SQLite` database.

#![deny(unsafe_code)]

mod render;

use std::path::Path;
use std::sync::Arc;

use abode_core::{
    ConversationFilters, ConversationId, ConversationStatus, InitialMessage, MessageId,
    MessageType, PropertyId, SearchFilters, UserId,
};
use abode_messaging::{
    ConversationDraft, MessageDraft, MessagingConfig, MessagingFacade, MessagingStore,
};
use abode_settings::AbodeSettings;
use abode_store::{ConnectionConfig, SqliteConversationRepository};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;

/// Abode marketplace inbox.
#[derive(Parser, Debug)]
#[command(name = "abode", about = "Abode marketplace inbox")]
struct Cli {
    /// Act as this user (falls back to `session.userId` / `ABODE_USER_ID`).
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List conversations, most recently updated first.
    Inbox {
        /// Only conversations about this listing.
        #[arg(long)]
        property: Option<String>,
        /// Only conversations with this status (active, archived, blocked).
        #[arg(long)]
        status: Option<ConversationStatus>,
    },
    /// Show a conversation's messages and mark them read.
    Thread {
        conversation: String,
        /// Number of pages to load.
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Send a text message.
    Send { conversation: String, text: String },
    /// Start a conversation (or reuse a matching one).
    Start {
        /// Other participants.
        #[arg(long = "with", required = true)]
        with: Vec<String>,
        /// Listing the conversation is about.
        #[arg(long)]
        property: Option<String>,
        text: String,
    },
    /// Mark a conversation read.
    Read { conversation: String },
    /// Archive a conversation.
    Archive { conversation: String },
    /// Block a conversation.
    Block { conversation: String },
    /// Delete one of a conversation's messages.
    Delete { conversation: String, message: String },
    /// Search a conversation.
    Search {
        conversation: String,
        query: String,
        /// Restrict to these message types.
        #[arg(long = "type")]
        types: Vec<MessageType>,
    },
}

/// The acting user: `--user`, then settings/env.
fn resolve_user(flag: Option<String>, settings: &AbodeSettings) -> Result<UserId> {
    flag.or_else(|| settings.session.user_id.clone())
        .filter(|u| !u.trim().is_empty())
        .map(UserId::from)
        .context("No user given: pass --user or set ABODE_USER_ID")
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn open_facade(settings: &AbodeSettings, user: UserId) -> Result<MessagingFacade> {
    let db_path = Path::new(&settings.storage.database_path);
    ensure_parent_dir(db_path)?;
    let connection = ConnectionConfig {
        pool_size: settings.storage.pool_size,
        busy_timeout_ms: settings.storage.busy_timeout_ms,
    };
    let repository =
        SqliteConversationRepository::open_file(&settings.storage.database_path, &connection)
            .context("Failed to open database")?;
    debug!(path = %db_path.display(), user = %user, "database ready");

    let config = MessagingConfig::from(&settings.messaging);
    let store = MessagingStore::new(Arc::new(repository), user, config);
    Ok(MessagingFacade::new(Arc::new(store)))
}

/// Load the inbox, then archived conversations if `id` is not in it.
async fn load_conversation(facade: &MessagingFacade, id: &ConversationId) -> Result<()> {
    facade.fetch_conversations(None).await;
    if let Some(err) = facade.view().conversation_error.clone() {
        return Err(err).context("Failed to load conversations");
    }
    if facade.store().read(|s| s.conversation(id).is_some()) {
        return Ok(());
    }
    let archived = ConversationFilters {
        participant_id: Some(facade.store().current_user().clone()),
        status: Some(ConversationStatus::Archived),
        ..ConversationFilters::default()
    };
    facade.fetch_conversations(Some(archived)).await;
    if facade.store().read(|s| s.conversation(id).is_none()) {
        bail!("No conversation {id} for this user");
    }
    Ok(())
}

#[allow(clippy::too_many_lines)]
async fn run(facade: &MessagingFacade, command: Command) -> Result<()> {
    let me = facade.store().current_user().clone();
    match command {
        Command::Inbox { property, status } => {
            let filters = ConversationFilters {
                property_id: property.map(PropertyId::from),
                participant_id: Some(me.clone()),
                status,
            };
            facade.fetch_conversations(Some(filters)).await;
            let view = facade.view();
            if let Some(err) = view.conversation_error.clone() {
                return Err(err).context("Failed to load conversations");
            }
            if view.conversations.is_empty() {
                println!("No conversations.");
            }
            for conversation in &view.conversations {
                println!("{}", render::conversation_line(conversation, &me));
            }
            println!("{} unread", view.total_unread_count);
        }
        Command::Thread {
            conversation,
            pages,
        } => {
            let id = ConversationId::from(conversation);
            load_conversation(facade, &id).await?;
            facade.set_active_conversation(Some(id)).await;
            for _ in 1..pages {
                if !facade.load_more_messages().await {
                    break;
                }
            }
            let view = facade.view();
            if let Some(err) = view.message_error.clone() {
                return Err(err).context("Failed to load messages");
            }
            for message in &view.active_messages {
                println!("{}", render::message_line(message, &me));
            }
            if view.active_pagination.is_some_and(|p| p.has_more) {
                println!("(older messages available, use --pages)");
            }
        }
        Command::Send { conversation, text } => {
            let id = ConversationId::from(conversation);
            load_conversation(facade, &id).await?;
            let sent = facade
                .send_message(MessageDraft::text(id, text))
                .await
                .context("Failed to send message")?;
            println!("{}", render::message_line(&sent, &me));
        }
        Command::Start {
            with,
            property,
            text,
        } => {
            facade.fetch_conversations(None).await;
            let draft = ConversationDraft {
                participant_ids: with.into_iter().map(UserId::from).collect(),
                property_id: property.map(PropertyId::from),
                initial_message: InitialMessage {
                    content: text,
                    ..InitialMessage::default()
                },
            };
            let conversation = facade
                .open_conversation(draft)
                .await
                .context("Failed to start conversation")?;
            println!("{}", render::conversation_line(&conversation, &me));
        }
        Command::Read { conversation } => {
            let id = ConversationId::from(conversation);
            load_conversation(facade, &id).await?;
            facade
                .mark_messages_as_read(&id)
                .await
                .context("Failed to mark conversation read")?;
            println!("Marked {id} read.");
        }
        Command::Archive { conversation } => {
            let id = ConversationId::from(conversation);
            load_conversation(facade, &id).await?;
            facade
                .archive_conversation(&id)
                .await
                .context("Failed to archive conversation")?;
            println!("Archived {id}.");
        }
        Command::Block { conversation } => {
            let id = ConversationId::from(conversation);
            load_conversation(facade, &id).await?;
            facade
                .block_conversation(&id)
                .await
                .context("Failed to block conversation")?;
            println!("Blocked {id}.");
        }
        Command::Delete {
            conversation,
            message,
        } => {
            let id = ConversationId::from(conversation);
            load_conversation(facade, &id).await?;
            facade
                .delete_message(&MessageId::from(message), &id)
                .await
                .context("Failed to delete message")?;
            println!("Deleted.");
        }
        Command::Search {
            conversation,
            query,
            types,
        } => {
            let id = ConversationId::from(conversation);
            let filters = SearchFilters {
                query: Some(query),
                message_types: types,
                ..SearchFilters::default()
            };
            let hits = facade
                .search_messages(&id, &filters)
                .await
                .context("Search failed")?;
            for message in &hits {
                println!("{}", render::message_line(message, &me));
            }
            println!("{} match(es)", hits.len());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = abode_settings::load_settings().context("Failed to load settings")?;
    abode_core::logging::init_subscriber(&settings.logging.level);

    let user = resolve_user(cli.user, &settings)?;
    let facade = open_facade(&settings, user)?;
    run(&facade, cli.command).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use abode_settings::SessionSettings;

    fn settings_with(user: Option<&str>, db: &Path) -> AbodeSettings {
        let mut settings = AbodeSettings {
            session: SessionSettings {
                user_id: user.map(str::to_string),
            },
            ..AbodeSettings::default()
        };
        settings.storage.database_path = db.to_string_lossy().into_owned();
        settings
    }

    #[test]
    fn user_flag_wins_over_settings() {
        let settings = settings_with(Some("from-settings"), Path::new("unused.db"));
        let user = resolve_user(Some("from-flag".into()), &settings).unwrap();
        assert_eq!(user.as_str(), "from-flag");
        let user = resolve_user(None, &settings).unwrap();
        assert_eq!(user.as_str(), "from-settings");
    }

    #[test]
    fn refuses_to_run_without_user() {
        let settings = settings_with(None, Path::new("unused.db"));
        assert!(resolve_user(None, &settings).is_err());
        assert!(resolve_user(Some("  ".into()), &settings).is_err());
    }

    #[test]
    fn parses_start_command() {
        let cli = Cli::try_parse_from([
            "abode", "--user", "buyer", "start", "--with", "seller", "--with", "agent",
            "--property", "p1", "hello",
        ])
        .unwrap();
        assert_eq!(cli.user.as_deref(), Some("buyer"));
        match cli.command {
            Command::Start {
                with,
                property,
                text,
            } => {
                assert_eq!(with, ["seller", "agent"]);
                assert_eq!(property.as_deref(), Some("p1"));
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_search_types_and_inbox_status() {
        let cli = Cli::try_parse_from([
            "abode", "search", "c1", "kitchen", "--type", "image", "--type", "text",
        ])
        .unwrap();
        match cli.command {
            Command::Search { types, .. } => {
                assert_eq!(types, [MessageType::Image, MessageType::Text]);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["abode", "inbox", "--status", "archived"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Inbox {
                status: Some(ConversationStatus::Archived),
                ..
            }
        ));
        assert!(Cli::try_parse_from(["abode", "inbox", "--status", "muted"]).is_err());
    }

    #[tokio::test]
    async fn start_send_and_read_against_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("messages.db");

        let buyer = open_facade(&settings_with(None, &db), UserId::from("buyer")).unwrap();
        run(
            &buyer,
            Command::Start {
                with: vec!["seller".into()],
                property: Some("p1".into()),
                text: "Still available?".into(),
            },
        )
        .await
        .unwrap();
        let id = buyer.conversations()[0].id.clone();
        drop(buyer);

        let seller = open_facade(&settings_with(None, &db), UserId::from("seller")).unwrap();
        run(
            &seller,
            Command::Send {
                conversation: id.to_string(),
                text: "Yes".into(),
            },
        )
        .await
        .unwrap();
        run(
            &seller,
            Command::Read {
                conversation: id.to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(seller.total_unread_count(), 0);

        let err = run(
            &seller,
            Command::Archive {
                conversation: "missing".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("No conversation missing"));
    }
}
