//! Reading and writing chat history rows.
//!
//! Nothing in the request path calls these yet.
#![allow(dead_code)]

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::HistoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: i64,
    pub chat_id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryStore {
    /// Append one message to a chat's history, returning its row id
    pub async fn append(&self, chat_id: i64, role: Role, content: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chat_history (chat_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![chat_id, role.as_str(), content, Utc::now()],
        )
        .context("Failed to save history entry")?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent entries for a chat, newest first
    pub async fn recent(&self, chat_id: i64, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, role, content, created_at
             FROM chat_history
             WHERE chat_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;

        let entries = stmt
            .query_map(rusqlite::params![chat_id, limit as i64], |row| {
                let role: String = row.get(2)?;
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    role: Role::parse(&role).unwrap_or(Role::User),
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to load history")?;

        Ok(entries)
    }
}
