use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

use crate::assistant::Assistant;
use crate::error::{ChatError, Result};
use crate::settings::{Settings, SettingsSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    User,
    Agent,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::User => "user",
            SenderType::Agent => "agent",
        }
    }

    pub fn from_str(s: &str) -> Option<SenderType> {
        match s {
            "user" => Some(SenderType::User),
            "agent" => Some(SenderType::Agent),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Agent {
    pub id: String,
    pub assistant: Assistant,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub title: String,
    pub topic_id: Option<String>,
    pub system_instruction: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_type: SenderType,
    pub content: String,
    pub timestamp: String,
}

/// Remote-style CRUD surface the session controller talks to.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, user_id: &str, agent_id: &str, title: &str) -> Result<Conversation>;

    async fn add_message(&self, conversation_id: &str, sender_type: SenderType, content: &str) -> Result<Message>;

    async fn get_messages_by_conversation_id(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Fails with `ChatError::AgentNotFound` for unknown ids.
    async fn get_agent_by_id(&self, agent_id: &str) -> Result<Agent>;

    /// `None` when nothing was ever saved for the agent.
    async fn get_agent_settings(&self, agent_id: &str) -> Result<Option<Settings>>;

    async fn save_agent_settings(&self, settings: &Settings) -> Result<()>;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    async fn set_conversation_topic(&self, conversation_id: &str, topic_id: &str, system_instruction: &str) -> Result<()>;

    async fn get_recent_conversations(&self, agent_id: &str, limit: usize) -> Result<Vec<Conversation>>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()>;
}

/// User the store is scoped to when none is given.
pub const LOCAL_USER_ID: &str = "local-user";

/// SQLite-backed store. Settings reads and writes are scoped to one user.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    user_id: String,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChatError::store(format!("Failed to create data dir: {}", e)))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            user_id: LOCAL_USER_ID.to_string(),
        })
    }

    pub fn for_user(mut self, user_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ChatError::store("Database lock poisoned"))?;
        Ok(f(&conn)?)
    }
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| Ok(row.get::<_, i64>(0)? > 0),
    )
    .unwrap_or(false)
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        -- Assistants the user can open a chat with
        CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL
        );

        -- Conversation sessions, one assistant each
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (agent_id) REFERENCES agents(id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            sender_type TEXT NOT NULL,
            content TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            FOREIGN KEY (conversation_id) REFERENCES conversations(id)
        );

        -- Settings shared by every assistant (custom instructions, source)
        CREATE TABLE IF NOT EXISTS agent_settings_meta (
            user_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            custom_instructions TEXT,
            source TEXT NOT NULL DEFAULT 'user',
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, agent_id)
        );
        ",
    )?;

    // Migration: topic columns were added after the first release
    if !column_exists(conn, "conversations", "topic_id") {
        conn.execute("ALTER TABLE conversations ADD COLUMN topic_id TEXT", [])?;
    }
    if !column_exists(conn, "conversations", "system_instruction") {
        conn.execute("ALTER TABLE conversations ADD COLUMN system_instruction TEXT", [])?;
    }

    for assistant in Assistant::ALL {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                user_id TEXT NOT NULL,
                field_key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, field_key)
            );",
            assistant.settings_table()
        ))?;

        conn.execute(
            "INSERT OR IGNORE INTO agents (id, kind, name, description) VALUES (?1, ?2, ?3, ?4)",
            params![
                assistant.as_str(),
                assistant.as_str(),
                assistant.display_name(),
                assistant.role_description()
            ],
        )?;
    }

    Ok(())
}

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        agent_id: row.get(2)?,
        title: row.get(3)?,
        topic_id: row.get(4)?,
        system_instruction: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const CONVERSATION_COLUMNS: &str =
    "id, user_id, agent_id, title, topic_id, system_instruction, created_at, updated_at";

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(&self, user_id: &str, agent_id: &str, title: &str) -> Result<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id, agent_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, user_id, agent_id, title, now, now],
            )?;
            Ok(Conversation {
                id: id.clone(),
                user_id: user_id.to_string(),
                agent_id: agent_id.to_string(),
                title: title.to_string(),
                topic_id: None,
                system_instruction: None,
                created_at: now.clone(),
                updated_at: now.clone(),
            })
        })
        .map_err(|e| ChatError::ConversationCreate(e.to_string()))
    }

    async fn add_message(&self, conversation_id: &str, sender_type: SenderType, content: &str) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_type,
            content: content.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_type, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id,
                    message.conversation_id,
                    message.sender_type.as_str(),
                    message.content,
                    message.timestamp
                ],
            )?;
            conn.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![message.timestamp, conversation_id],
            )?;
            Ok(())
        })?;
        Ok(message)
    }

    async fn get_messages_by_conversation_id(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_type, content, timestamp
                 FROM messages WHERE conversation_id = ?1 ORDER BY rowid ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id], |row| {
                let sender: String = row.get(2)?;
                Ok(Message {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    sender_type: SenderType::from_str(&sender).unwrap_or(SenderType::Agent),
                    content: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?;
            rows.collect()
        })
        .map_err(|e| ChatError::HistoryLoad(e.to_string()))
    }

    async fn get_agent_by_id(&self, agent_id: &str) -> Result<Agent> {
        let row: Option<(String, String, String, String)> = self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, kind, name, description FROM agents WHERE id = ?1",
                params![agent_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
        })?;

        let (id, kind, name, description) =
            row.ok_or_else(|| ChatError::AgentNotFound(agent_id.to_string()))?;
        let assistant = Assistant::from_str(&kind)
            .ok_or_else(|| ChatError::store(format!("Agent {} has unknown kind '{}'", id, kind)))?;

        Ok(Agent {
            id,
            assistant,
            name,
            description,
        })
    }

    async fn get_agent_settings(&self, agent_id: &str) -> Result<Option<Settings>> {
        let assistant = self.get_agent_by_id(agent_id).await?.assistant;
        let table = assistant.settings_table();

        self.with_connection(|conn| {
            let meta: Option<(Option<String>, String, String)> = conn
                .query_row(
                    "SELECT custom_instructions, source, updated_at FROM agent_settings_meta
                     WHERE user_id = ?1 AND agent_id = ?2",
                    params![self.user_id, agent_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let mut stmt = conn.prepare(&format!(
                "SELECT field_key, value, updated_at FROM {} WHERE user_id = ?1 ORDER BY field_key",
                table
            ))?;
            let values: Vec<(String, String, String)> = stmt
                .query_map(params![self.user_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<rusqlite::Result<_>>()?;

            if meta.is_none() && values.is_empty() {
                return Ok(None);
            }

            let latest_value_update = values.iter().map(|(_, _, at)| at.clone()).max();
            let (custom_instructions, source, meta_updated) = meta.unwrap_or((None, "user".to_string(), String::new()));
            let updated_at = latest_value_update
                .into_iter()
                .chain(std::iter::once(meta_updated))
                .max()
                .unwrap_or_default();

            Ok(Some(Settings {
                agent_id: agent_id.to_string(),
                values: values.into_iter().map(|(k, v, _)| (k, v)).collect(),
                custom_instructions,
                source: SettingsSource::from_str(&source),
                updated_at,
            }))
        })
        .map_err(|e| ChatError::SettingsLoad(e.to_string()))
    }

    async fn save_agent_settings(&self, settings: &Settings) -> Result<()> {
        let assistant = self.get_agent_by_id(&settings.agent_id).await?.assistant;
        let table = assistant.settings_table();
        let now = Utc::now().to_rfc3339();

        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                &format!("DELETE FROM {} WHERE user_id = ?1", table),
                params![self.user_id],
            )?;
            for (key, value) in &settings.values {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (user_id, field_key, value, updated_at) VALUES (?1, ?2, ?3, ?4)",
                        table
                    ),
                    params![self.user_id, key, value, now],
                )?;
            }
            tx.execute(
                "INSERT INTO agent_settings_meta (user_id, agent_id, custom_instructions, source, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, agent_id) DO UPDATE SET
                    custom_instructions = excluded.custom_instructions,
                    source = excluded.source,
                    updated_at = excluded.updated_at",
                params![
                    self.user_id,
                    settings.agent_id,
                    settings.custom_instructions,
                    settings.source.as_str(),
                    now
                ],
            )?;
            tx.commit()
        })
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS),
                params![conversation_id],
                row_to_conversation,
            )
            .optional()
        })
    }

    async fn set_conversation_topic(&self, conversation_id: &str, topic_id: &str, system_instruction: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.with_connection(|conn| {
            conn.execute(
                "UPDATE conversations SET topic_id = ?1, system_instruction = ?2, updated_at = ?3 WHERE id = ?4",
                params![topic_id, system_instruction, now, conversation_id],
            )
        })?;
        if updated == 0 {
            return Err(ChatError::store(format!("Conversation {} not found", conversation_id)));
        }
        Ok(())
    }

    async fn get_recent_conversations(&self, agent_id: &str, limit: usize) -> Result<Vec<Conversation>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM conversations WHERE agent_id = ?1 ORDER BY updated_at DESC, rowid DESC LIMIT ?2",
                CONVERSATION_COLUMNS
            ))?;
            let rows = stmt.query_map(params![agent_id, limit as i64], row_to_conversation)?;
            rows.collect()
        })
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM messages WHERE conversation_id = ?1", params![conversation_id])?;
            tx.execute("DELETE FROM conversations WHERE id = ?1", params![conversation_id])?;
            tx.commit()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_agents_are_seeded() {
        let store = SqliteStore::open_in_memory().unwrap();
        for assistant in Assistant::ALL {
            let agent = store.get_agent_by_id(assistant.as_str()).await.unwrap();
            assert_eq!(agent.assistant, assistant);
            assert_eq!(agent.name, assistant.display_name());
        }
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.get_agent_by_id("cto").await.unwrap_err();
        assert_eq!(err, ChatError::AgentNotFound("cto".to_string()));
    }

    #[tokio::test]
    async fn test_messages_keep_insertion_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conv = store.create_conversation("u1", "cfo", "Cashflow").await.unwrap();

        store.add_message(&conv.id, SenderType::Agent, "intro").await.unwrap();
        store.add_message(&conv.id, SenderType::User, "question").await.unwrap();
        store.add_message(&conv.id, SenderType::Agent, "answer").await.unwrap();

        let messages = store.get_messages_by_conversation_id(&conv.id).await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["intro", "question", "answer"]);
        assert_eq!(messages[1].sender_type, SenderType::User);
    }

    #[tokio::test]
    async fn test_add_message_to_missing_conversation_fails() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.add_message("nope", SenderType::User, "hi").await.is_err());
    }

    #[tokio::test]
    async fn test_conversation_with_unknown_agent_fails_to_create() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.create_conversation("u1", "cto", "x").await.unwrap_err();
        assert!(matches!(err, ChatError::ConversationCreate(_)));
    }

    #[tokio::test]
    async fn test_settings_round_trip_per_assistant() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_agent_settings("cfo").await.unwrap(), None);

        let mut settings = Settings::new("cfo").with_value("funding", "bootstrapped");
        settings.custom_instructions = Some("Use EUR".to_string());
        settings.source = SettingsSource::Admin;
        store.save_agent_settings(&settings).await.unwrap();

        let loaded = store.get_agent_settings("cfo").await.unwrap().unwrap();
        assert_eq!(loaded.get("funding"), Some("bootstrapped"));
        assert_eq!(loaded.custom_instructions.as_deref(), Some("Use EUR"));
        assert_eq!(loaded.source, SettingsSource::Admin);

        // other assistants keep their own tables
        assert_eq!(store.get_agent_settings("cmo").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_saving_settings_replaces_values() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_agent_settings(&Settings::new("coo").with_value("team_size", "12"))
            .await
            .unwrap();
        store
            .save_agent_settings(&Settings::new("coo").with_value("tools", "Linear"))
            .await
            .unwrap();

        let loaded = store.get_agent_settings("coo").await.unwrap().unwrap();
        assert_eq!(loaded.get("team_size"), None);
        assert_eq!(loaded.get("tools"), Some("Linear"));
    }

    #[tokio::test]
    async fn test_topic_is_stored_with_conversation() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conv = store.create_conversation("u1", "cfo", "Cashflow").await.unwrap();
        store
            .set_conversation_topic(&conv.id, "cashflow", "TOPIC GUIDANCE")
            .await
            .unwrap();

        let loaded = store.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.topic_id.as_deref(), Some("cashflow"));
        assert_eq!(loaded.system_instruction.as_deref(), Some("TOPIC GUIDANCE"));

        assert!(store.set_conversation_topic("missing", "cashflow", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_recent_conversations_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.create_conversation("u1", "cmo", "Positioning").await.unwrap();
        let second = store.create_conversation("u1", "cmo", "Campaign").await.unwrap();
        store.create_conversation("u1", "cfo", "Cashflow").await.unwrap();
        store.add_message(&first.id, SenderType::User, "hi").await.unwrap();

        let recent = store.get_recent_conversations("cmo", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, first.id);

        store.delete_conversation(&first.id).await.unwrap();
        let recent = store.get_recent_conversations("cmo", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, second.id);
        assert!(store.get_messages_by_conversation_id(&first.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_settings_save_keeps_previous_values() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_agent_settings(&Settings::new("cfo").with_value("funding", "bootstrapped"))
            .await
            .unwrap();

        store
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_boom BEFORE INSERT ON cfo_settings
                     WHEN NEW.value = 'boom'
                     BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                )
            })
            .unwrap();

        let replacement = Settings::new("cfo")
            .with_value("company", "Acme")
            .with_value("funding", "boom");
        assert!(store.save_agent_settings(&replacement).await.is_err());

        let loaded = store.get_agent_settings("cfo").await.unwrap().unwrap();
        assert_eq!(loaded.get("funding"), Some("bootstrapped"));
        assert_eq!(loaded.get("company"), None);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_messages() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conv = store.create_conversation("u1", "cmo", "Positioning").await.unwrap();
        store.add_message(&conv.id, SenderType::User, "hi").await.unwrap();

        store
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER keep_conversations BEFORE DELETE ON conversations
                     BEGIN SELECT RAISE(ABORT, 'locked'); END;",
                )
            })
            .unwrap();

        assert!(store.delete_conversation(&conv.id).await.is_err());
        assert_eq!(store.get_messages_by_conversation_id(&conv.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_are_scoped_per_user() {
        let path = std::env::temp_dir().join(format!("boardroom-{}.db", Uuid::new_v4()));
        let alice = SqliteStore::open(&path).unwrap().for_user("alice");
        let bob = SqliteStore::open(&path).unwrap().for_user("bob");

        alice
            .save_agent_settings(&Settings::new("cfo").with_value("funding", "seed"))
            .await
            .unwrap();
        bob
            .save_agent_settings(&Settings::new("cfo").with_value("funding", "series-a"))
            .await
            .unwrap();

        let loaded = alice.get_agent_settings("cfo").await.unwrap().unwrap();
        assert_eq!(loaded.get("funding"), Some("seed"));
        let loaded = bob.get_agent_settings("cfo").await.unwrap().unwrap();
        assert_eq!(loaded.get("funding"), Some("series-a"));

        let carol = SqliteStore::open(&path).unwrap().for_user("carol");
        assert_eq!(carol.get_agent_settings("cfo").await.unwrap(), None);
        assert_eq!(carol.user_id(), "carol");

        drop((alice, bob, carol));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_schema_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert!(column_exists(&conn, "conversations", "system_instruction"));
    }
}
