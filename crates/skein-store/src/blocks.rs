//! CRUD operations for [`Block`] index rows.

use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension};

use skein_shared::constants::IGNORE_PREFIX;
use skein_shared::types::{parents_from_head, BlockId, ThreadId};

use crate::database::{format_ts, parse_peer_id, parse_thread_id, parse_ts, Database};
use crate::error::Result;
use crate::models::{Block, BlockQuery, BlockType};

const BLOCK_COLUMNS: &str = "id, thread_id, author_id, date, parents, block_type,
     author_username_cipher, data_id, data_key_cipher, data_caption_cipher";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Index a block. Returns `false` (and changes nothing) if a block with
    /// the same id is already indexed.
    pub fn add_block(&self, block: &Block) -> Result<bool> {
        let parents = block
            .parents
            .iter()
            .map(BlockId::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO blocks (id, thread_id, author_id, date, parents, block_type,
                 author_username_cipher, data_id, data_key_cipher, data_caption_cipher)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                block.id.as_str(),
                block.thread_id.to_base58(),
                block.author_id.to_base58(),
                format_ts(&block.date),
                parents,
                block.block_type.as_str(),
                block.author_username_cipher,
                block.data_id,
                block.data_key_cipher,
                block.data_caption_cipher,
            ],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single block, if indexed.
    pub fn get_block(&self, id: &BlockId) -> Result<Option<Block>> {
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE id = ?1");
        let block = self
            .conn()
            .query_row(&sql, params![id.as_str()], row_to_block)
            .optional()?;
        Ok(block)
    }

    /// List a thread's blocks, newest first.
    ///
    /// When filtering by type, blocks targeted by an ignore block are hidden.
    pub fn list_blocks(&self, query: &BlockQuery) -> Result<Vec<Block>> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
        let thread_id = query.thread_id.to_base58();

        let mut blocks = Vec::new();
        match query.block_type {
            None => {
                let sql = format!(
                    "SELECT {BLOCK_COLUMNS} FROM blocks
                     WHERE thread_id = ?1
                     ORDER BY date DESC, id ASC
                     LIMIT ?2 OFFSET ?3"
                );
                let mut stmt = self.conn().prepare(&sql)?;
                let rows = stmt.query_map(params![thread_id, limit, offset], row_to_block)?;
                for row in rows {
                    blocks.push(row?);
                }
            }
            Some(block_type) => {
                let sql = format!(
                    "SELECT {BLOCK_COLUMNS} FROM blocks b
                     WHERE b.thread_id = ?1 AND b.block_type = ?4
                       AND NOT EXISTS (
                           SELECT 1 FROM blocks i
                           WHERE i.thread_id = b.thread_id
                             AND i.block_type = ?5
                             AND i.data_id = ?6 || b.id
                       )
                     ORDER BY b.date DESC, b.id ASC
                     LIMIT ?2 OFFSET ?3"
                );
                let mut stmt = self.conn().prepare(&sql)?;
                let rows = stmt.query_map(
                    params![
                        thread_id,
                        limit,
                        offset,
                        block_type.as_str(),
                        BlockType::Ignore.as_str(),
                        IGNORE_PREFIX,
                    ],
                    row_to_block,
                )?;
                for row in rows {
                    blocks.push(row?);
                }
            }
        }
        Ok(blocks)
    }

    /// Number of blocks indexed for a thread.
    pub fn count_blocks(&self, thread_id: &ThreadId) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM blocks WHERE thread_id = ?1",
            params![thread_id.to_base58()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// All blocks, across threads, that carry the given data id.
    pub fn blocks_by_data_id(&self, data_id: &str) -> Result<Vec<Block>> {
        let sql = format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks
             WHERE data_id = ?1
             ORDER BY date DESC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![data_id], row_to_block)?;

        let mut blocks = Vec::new();
        for row in rows {
            blocks.push(row?);
        }
        Ok(blocks)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete every block of a thread. Returns the number of rows removed.
    pub fn delete_blocks_by_thread(&self, thread_id: &ThreadId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM blocks WHERE thread_id = ?1",
            params![thread_id.to_base58()],
        )?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<Block> {
    let id: String = row.get(0)?;
    let thread_str: String = row.get(1)?;
    let author_str: String = row.get(2)?;
    let date_str: String = row.get(3)?;
    let parents: String = row.get(4)?;
    let type_str: String = row.get(5)?;

    let block_type = BlockType::parse(&type_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            format!("unknown block type: {type_str}").into(),
        )
    })?;

    Ok(Block {
        id: BlockId::from(id),
        thread_id: parse_thread_id(1, &thread_str)?,
        author_id: parse_peer_id(2, &author_str)?,
        block_type,
        date: parse_ts(3, &date_str)?,
        parents: parents_from_head(&parents),
        author_username_cipher: row.get(6)?,
        data_id: row.get(7)?,
        data_key_cipher: row.get(8)?,
        data_caption_cipher: row.get(9)?,
    })
}
