//! CRUD operations for [`ThreadPeer`] records.

use rusqlite::params;

use skein_shared::types::{PeerId, ThreadId};

use crate::database::{parse_peer_id, parse_thread_id, Database};
use crate::error::Result;
use crate::models::ThreadPeer;

impl Database {
    /// Record a thread member. Returns `false` if already known.
    pub fn add_thread_peer(&self, peer: &ThreadPeer) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO thread_peers (id, thread_id, welcomed)
             VALUES (?1, ?2, ?3)",
            params![peer.id.to_base58(), peer.thread_id.to_base58(), peer.welcomed],
        )?;
        Ok(affected > 0)
    }

    /// List the known members of a thread.
    pub fn list_thread_peers(&self, thread_id: &ThreadId) -> Result<Vec<ThreadPeer>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, thread_id, welcomed
             FROM thread_peers
             WHERE thread_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![thread_id.to_base58()], row_to_peer)?;

        let mut peers = Vec::new();
        for row in rows {
            peers.push(row?);
        }
        Ok(peers)
    }

    /// Mark a member as having received our HEAD.
    pub fn set_thread_peer_welcomed(&self, id: &PeerId, thread_id: &ThreadId) -> Result<()> {
        self.conn().execute(
            "UPDATE thread_peers SET welcomed = 1 WHERE id = ?1 AND thread_id = ?2",
            params![id.to_base58(), thread_id.to_base58()],
        )?;
        Ok(())
    }

    /// Remove one member. Returns `true` if a row was deleted.
    pub fn delete_thread_peer(&self, id: &PeerId, thread_id: &ThreadId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM thread_peers WHERE id = ?1 AND thread_id = ?2",
            params![id.to_base58(), thread_id.to_base58()],
        )?;
        Ok(affected > 0)
    }

    /// Remove every member of a thread.
    pub fn delete_thread_peers_by_thread(&self, thread_id: &ThreadId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM thread_peers WHERE thread_id = ?1",
            params![thread_id.to_base58()],
        )?;
        Ok(affected)
    }
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadPeer> {
    let id_str: String = row.get(0)?;
    let thread_str: String = row.get(1)?;
    let welcomed: bool = row.get(2)?;

    Ok(ThreadPeer {
        id: parse_peer_id(0, &id_str)?,
        thread_id: parse_thread_id(1, &thread_str)?,
        welcomed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(seed: u8, thread: u8) -> ThreadPeer {
        ThreadPeer {
            id: PeerId([seed; 32]),
            thread_id: ThreadId([thread; 32]),
            welcomed: false,
        }
    }

    #[test]
    fn add_is_insert_or_ignore() {
        let db = Database::open_in_memory().unwrap();
        let p = peer(1, 9);

        assert!(db.add_thread_peer(&p).unwrap());
        assert!(!db.add_thread_peer(&p).unwrap());
        assert_eq!(db.list_thread_peers(&p.thread_id).unwrap(), vec![p]);
    }

    #[test]
    fn welcome_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let p = peer(1, 9);
        db.add_thread_peer(&p).unwrap();
        db.add_thread_peer(&peer(2, 9)).unwrap();
        db.add_thread_peer(&peer(1, 8)).unwrap();

        db.set_thread_peer_welcomed(&p.id, &p.thread_id).unwrap();
        let listed = db.list_thread_peers(&p.thread_id).unwrap();
        assert!(listed.iter().find(|x| x.id == p.id).unwrap().welcomed);

        assert!(db.delete_thread_peer(&p.id, &p.thread_id).unwrap());
        assert_eq!(db.list_thread_peers(&p.thread_id).unwrap().len(), 1);

        assert_eq!(db.delete_thread_peers_by_thread(&p.thread_id).unwrap(), 1);
        assert_eq!(db.list_thread_peers(&ThreadId([8; 32])).unwrap().len(), 1);
    }
}
