//! CRUD operations for [`Notification`] records.

use rusqlite::params;
use rusqlite::types::Type;
use uuid::Uuid;

use skein_shared::types::{BlockId, PeerId};

use crate::database::{conversion_err, format_ts, parse_peer_id, parse_ts, Database};
use crate::error::Result;
use crate::models::{Notification, NotificationKind};

impl Database {
    /// Insert a notification.
    pub fn add_notification(&self, notification: &Notification) -> Result<()> {
        self.conn().execute(
            "INSERT INTO notifications (id, date, actor_id, subject_id, block_id, kind, body, read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                notification.id.to_string(),
                format_ts(&notification.date),
                notification.actor_id.to_base58(),
                notification.subject_id,
                notification.block_id.as_ref().map(BlockId::as_str),
                notification.kind.as_str(),
                notification.body,
                notification.read,
            ],
        )?;
        Ok(())
    }

    /// List notifications, newest first.
    pub fn list_notifications(&self, limit: usize) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, date, actor_id, subject_id, block_id, kind, body, read
             FROM notifications
             ORDER BY date DESC
             LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], row_to_notification)?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    /// Delete notifications originating from a block.
    pub fn delete_notifications_by_block(&self, block_id: &BlockId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM notifications WHERE block_id = ?1",
            params![block_id.as_str()],
        )?;
        Ok(affected)
    }

    /// Delete notifications caused by a peer.
    pub fn delete_notifications_by_actor(&self, actor_id: &PeerId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM notifications WHERE actor_id = ?1",
            params![actor_id.to_base58()],
        )?;
        Ok(affected)
    }

    /// Delete notifications about a subject (e.g. a thread).
    pub fn delete_notifications_by_subject(&self, subject_id: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM notifications WHERE subject_id = ?1",
            params![subject_id],
        )?;
        Ok(affected)
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let id_str: String = row.get(0)?;
    let date_str: String = row.get(1)?;
    let actor_str: String = row.get(2)?;
    let subject_id: String = row.get(3)?;
    let block_id: Option<String> = row.get(4)?;
    let kind_str: String = row.get(5)?;
    let body: String = row.get(6)?;
    let read: bool = row.get(7)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| conversion_err(0, e))?;
    let kind = NotificationKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            format!("unknown notification kind: {kind_str}").into(),
        )
    })?;

    Ok(Notification {
        id,
        date: parse_ts(1, &date_str)?,
        actor_id: parse_peer_id(2, &actor_str)?,
        subject_id,
        block_id: block_id.map(BlockId::from),
        kind,
        body,
        read,
    })
}
