//! CRUD operations for [`Thread`] records and their HEAD.

use rusqlite::{params, OptionalExtension};

use skein_shared::types::ThreadId;

use crate::database::{conversion_err, format_ts, parse_thread_id, parse_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::Thread;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a thread. Fails if the thread already exists.
    pub fn add_thread(&self, thread: &Thread) -> Result<()> {
        self.conn().execute(
            "INSERT INTO threads (id, name, secret_key, head, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                thread.id.to_base58(),
                thread.name,
                hex::encode(thread.secret_key),
                thread.head,
                format_ts(&thread.created_at),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single thread, if present.
    pub fn get_thread(&self, id: &ThreadId) -> Result<Option<Thread>> {
        let thread = self
            .conn()
            .query_row(
                "SELECT id, name, secret_key, head, created_at
                 FROM threads
                 WHERE id = ?1",
                params![id.to_base58()],
                row_to_thread,
            )
            .optional()?;
        Ok(thread)
    }

    /// List all threads, oldest first.
    pub fn list_threads(&self) -> Result<Vec<Thread>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, secret_key, head, created_at
             FROM threads
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map([], row_to_thread)?;

        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        Ok(threads)
    }

    /// Read a thread's HEAD.
    pub fn thread_head(&self, id: &ThreadId) -> Result<String> {
        self.conn()
            .query_row(
                "SELECT head FROM threads WHERE id = ?1",
                params![id.to_base58()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace a thread's HEAD.
    pub fn update_thread_head(&self, id: &ThreadId, head: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE threads SET head = ?2 WHERE id = ?1",
            params![id.to_base58(), head],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a thread. Returns `true` if a row was deleted.
    pub fn delete_thread(&self, id: &ThreadId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM threads WHERE id = ?1", params![id.to_base58()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<Thread> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let secret_hex: String = row.get(2)?;
    let head: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    let id = parse_thread_id(0, &id_str)?;

    let mut secret_key = [0u8; 32];
    hex::decode_to_slice(&secret_hex, &mut secret_key).map_err(|e| conversion_err(2, e))?;

    let created_at = parse_ts(4, &created_str)?;

    Ok(Thread {
        id,
        name,
        secret_key,
        head,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn thread(seed: u8) -> Thread {
        Thread {
            id: ThreadId([seed; 32]),
            name: format!("thread-{seed}"),
            secret_key: [seed.wrapping_add(1); 32],
            head: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn add_get_delete() {
        let db = Database::open_in_memory().unwrap();
        let t = thread(1);
        db.add_thread(&t).unwrap();

        let loaded = db.get_thread(&t.id).unwrap().unwrap();
        assert_eq!(loaded.name, "thread-1");
        assert_eq!(loaded.secret_key, t.secret_key);
        assert!(loaded.head.is_empty());

        assert!(db.add_thread(&t).is_err());
        assert!(db.delete_thread(&t.id).unwrap());
        assert!(db.get_thread(&t.id).unwrap().is_none());
        assert!(!db.delete_thread(&t.id).unwrap());
    }

    #[test]
    fn head_updates() {
        let db = Database::open_in_memory().unwrap();
        let t = thread(2);
        db.add_thread(&t).unwrap();

        db.update_thread_head(&t.id, "abc").unwrap();
        assert_eq!(db.thread_head(&t.id).unwrap(), "abc");

        let missing = ThreadId([9; 32]);
        assert!(matches!(db.thread_head(&missing), Err(StoreError::NotFound)));
        assert!(matches!(
            db.update_thread_head(&missing, "x"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn list_in_creation_order() {
        let db = Database::open_in_memory().unwrap();
        let mut first = thread(3);
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        db.add_thread(&thread(4)).unwrap();
        db.add_thread(&first).unwrap();

        let ids: Vec<_> = db.list_threads().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![ThreadId([3; 32]), ThreadId([4; 32])]);
    }
}
