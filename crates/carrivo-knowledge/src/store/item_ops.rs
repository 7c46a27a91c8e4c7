//! Item CRUD and the [`KnowledgeSource`] implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use crate::error::{KnowledgeError, Result};
use crate::index::KnowledgeSource;
use crate::types::{Collection, FaqItem, ItemId, KnowledgeItem, KnowledgeRecord, RoadmapItem};
use crate::validation::validate_embedding_result;
use crate::vector::{self, decode_embedding, encode_embedding};

use super::KnowledgeStore;

pub(crate) const ROADMAP_COLUMNS: &str =
    "seq, id, title, description, url, category, slug, is_published, embedding, created_at";

pub(crate) const FAQ_COLUMNS: &str = "seq, id, question_ar, answer_ar, question_ar_eg, \
     answer_ar_eg, question_en, answer_en, category, is_active, embedding, created_at";

pub(crate) fn columns(collection: Collection) -> &'static str {
    match collection {
        Collection::Roadmaps => ROADMAP_COLUMNS,
        Collection::Faq => FAQ_COLUMNS,
    }
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Map a row selected with [`ROADMAP_COLUMNS`].
pub(crate) fn roadmap_from_row(row: &Row<'_>) -> rusqlite::Result<KnowledgeRecord> {
    let blob: Option<Vec<u8>> = row.get(8)?;
    Ok(KnowledgeRecord {
        position: row.get(0)?,
        id: ItemId(row.get(1)?),
        item: KnowledgeItem::Roadmap(RoadmapItem {
            title: row.get(2)?,
            description: row.get(3)?,
            url: row.get(4)?,
            category: row.get(5)?,
            slug: row.get(6)?,
        }),
        active: row.get(7)?,
        embedding: blob.as_deref().and_then(decode_embedding),
        created_at: parse_timestamp(9, row.get(9)?)?,
    })
}

/// Map a row selected with [`FAQ_COLUMNS`].
pub(crate) fn faq_from_row(row: &Row<'_>) -> rusqlite::Result<KnowledgeRecord> {
    let blob: Option<Vec<u8>> = row.get(10)?;
    Ok(KnowledgeRecord {
        position: row.get(0)?,
        id: ItemId(row.get(1)?),
        item: KnowledgeItem::Faq(FaqItem {
            question_ar: row.get(2)?,
            answer_ar: row.get(3)?,
            question_ar_eg: row.get(4)?,
            answer_ar_eg: row.get(5)?,
            question_en: row.get(6)?,
            answer_en: row.get(7)?,
            category: row.get(8)?,
        }),
        active: row.get(9)?,
        embedding: blob.as_deref().and_then(decode_embedding),
        created_at: parse_timestamp(11, row.get(11)?)?,
    })
}

pub(crate) fn record_from_row(
    collection: Collection,
) -> fn(&Row<'_>) -> rusqlite::Result<KnowledgeRecord> {
    match collection {
        Collection::Roadmaps => roadmap_from_row,
        Collection::Faq => faq_from_row,
    }
}

/// Run `sql` (which must select `columns(collection)`) and map every row.
pub(crate) fn query_records(
    conn: &Connection,
    collection: Collection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<KnowledgeRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, record_from_row(collection))?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

impl KnowledgeStore {
    /// Insert a new item, optionally with its embedding. Items start active.
    pub fn insert(&self, item: &KnowledgeItem, embedding: Option<&[f32]>) -> Result<ItemId> {
        if let Some(embedding) = embedding {
            validate_embedding_result(embedding, self.dims)?;
            self.ensure_vectors_fresh()?;
        }

        let id = ItemId::new();
        let created_at = Utc::now().to_rfc3339();
        let blob = embedding.map(encode_embedding);

        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        match item {
            KnowledgeItem::Roadmap(r) => {
                tx.execute(
                    "INSERT INTO roadmaps (id, title, description, url, category, slug, embedding, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        id.as_str(),
                        r.title,
                        r.description,
                        r.url,
                        r.category,
                        r.slug,
                        blob,
                        created_at
                    ],
                )?;
            }
            KnowledgeItem::Faq(f) => {
                tx.execute(
                    "INSERT INTO faq (id, question_ar, answer_ar, question_ar_eg, answer_ar_eg,
                                      question_en, answer_en, category, embedding, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        id.as_str(),
                        f.question_ar,
                        f.answer_ar,
                        f.question_ar_eg,
                        f.answer_ar_eg,
                        f.question_en,
                        f.answer_en,
                        f.category,
                        blob,
                        created_at
                    ],
                )?;
            }
        }
        if let Some(embedding) = embedding {
            vector::store_embedding(&tx, item.collection(), &id, embedding)?;
        }
        tx.commit()?;

        debug!(collection = %item.collection(), id = %id, "Inserted item");
        Ok(id)
    }

    /// Get one item by id.
    pub fn get(&self, collection: Collection, id: &ItemId) -> Result<Option<KnowledgeRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            columns(collection),
            collection.as_str()
        );
        Ok(conn
            .query_row(&sql, params![id.as_str()], record_from_row(collection))
            .optional()?)
    }

    /// Replace an item's embedding.
    pub fn set_embedding(&self, collection: Collection, id: &ItemId, embedding: &[f32]) -> Result<()> {
        validate_embedding_result(embedding, self.dims)?;
        self.ensure_vectors_fresh()?;

        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let (rows, active) = Self::write_embedding_blob(&tx, collection, id, embedding)?;
        if rows == 0 {
            return Err(KnowledgeError::NotFound(format!("{} {}", collection, id)));
        }
        if active {
            vector::store_embedding(&tx, collection, id, embedding)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Write the BLOB column; returns (rows updated, is active).
    pub(crate) fn write_embedding_blob(
        conn: &Connection,
        collection: Collection,
        id: &ItemId,
        embedding: &[f32],
    ) -> Result<(usize, bool)> {
        let rows = conn.execute(
            &format!(
                "UPDATE {} SET embedding = ?1 WHERE id = ?2",
                collection.as_str()
            ),
            params![encode_embedding(embedding), id.as_str()],
        )?;
        if rows == 0 {
            return Ok((0, false));
        }
        let active: bool = conn.query_row(
            &format!(
                "SELECT {} FROM {} WHERE id = ?1",
                collection.active_column(),
                collection.as_str()
            ),
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok((rows, active))
    }

    /// Publish or retire an item. Inactive items leave the vector index.
    pub fn set_active(&self, collection: Collection, id: &ItemId, active: bool) -> Result<()> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let rows = tx.execute(
            &format!(
                "UPDATE {} SET {} = ?1 WHERE id = ?2",
                collection.as_str(),
                collection.active_column()
            ),
            params![active, id.as_str()],
        )?;
        if rows == 0 {
            return Err(KnowledgeError::NotFound(format!("{} {}", collection, id)));
        }

        let stale = self.vectors_stale.lock().is_some();
        if !stale {
            if active {
                let blob: Option<Vec<u8>> = tx.query_row(
                    &format!("SELECT embedding FROM {} WHERE id = ?1", collection.as_str()),
                    params![id.as_str()],
                    |row| row.get(0),
                )?;
                if let Some(embedding) = blob.as_deref().and_then(decode_embedding) {
                    if embedding.len() == self.dims {
                        vector::store_embedding(&tx, collection, id, &embedding)?;
                    }
                }
            } else {
                vector::delete_embedding(&tx, collection, id)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Count items in a collection (active and inactive).
    pub fn count(&self, collection: Collection) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", collection.as_str()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Every item in a collection, in creation order.
    pub fn all_items(&self, collection: Collection) -> Result<Vec<KnowledgeRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY seq",
            columns(collection),
            collection.as_str()
        );
        query_records(&conn, collection, &sql, [])
    }

    /// Active items, in creation order, at most `limit`.
    pub fn active_items(&self, collection: Collection, limit: usize) -> Result<Vec<KnowledgeRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = 1 ORDER BY seq LIMIT ?1",
            columns(collection),
            collection.as_str(),
            collection.active_column()
        );
        query_records(&conn, collection, &sql, params![limit as i64])
    }

    /// Look up several ids at once.
    pub fn get_many(&self, collection: Collection, ids: &[ItemId]) -> Result<Vec<KnowledgeRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE id IN ({})",
            columns(collection),
            collection.as_str(),
            placeholders.join(", ")
        );
        let conn = self.conn.lock();
        query_records(
            &conn,
            collection,
            &sql,
            rusqlite::params_from_iter(ids.iter().map(|id| id.as_str())),
        )
    }
}

#[async_trait]
impl KnowledgeSource for KnowledgeStore {
    async fn fetch_active_items(
        &self,
        collection: Collection,
        limit: usize,
    ) -> Result<Vec<KnowledgeRecord>> {
        self.active_items(collection, limit)
    }

    async fn get_items(
        &self,
        collection: Collection,
        ids: &[ItemId],
    ) -> Result<Vec<KnowledgeRecord>> {
        self.get_many(collection, ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faq(q: &str) -> KnowledgeItem {
        KnowledgeItem::Faq(FaqItem {
            question_ar: format!("{} ar", q),
            answer_ar: "جواب".to_string(),
            question_ar_eg: None,
            answer_ar_eg: None,
            question_en: q.to_string(),
            answer_en: "answer".to_string(),
            category: None,
        })
    }

    #[test]
    fn test_insert_and_get() {
        let store = KnowledgeStore::open_in_memory(3).unwrap();
        let id = store.insert(&faq("q1"), Some(&[1.0, 0.0, 0.0])).unwrap();

        let record = store.get(Collection::Faq, &id).unwrap().unwrap();
        assert_eq!(record.item, faq("q1"));
        assert!(record.active);
        assert_eq!(record.embedding, Some(vec![1.0, 0.0, 0.0]));
        assert!(store.get(Collection::Roadmaps, &id).unwrap().is_none());
    }

    #[test]
    fn test_insert_rejects_wrong_dimension() {
        let store = KnowledgeStore::open_in_memory(3).unwrap();
        assert!(matches!(
            store.insert(&faq("q1"), Some(&[1.0, 0.0])),
            Err(KnowledgeError::InvalidData(_))
        ));
        assert_eq!(store.count(Collection::Faq).unwrap(), 0);
    }

    #[test]
    fn test_active_items_in_creation_order() {
        let store = KnowledgeStore::open_in_memory(3).unwrap();
        let a = store.insert(&faq("a"), None).unwrap();
        let b = store.insert(&faq("b"), None).unwrap();
        let c = store.insert(&faq("c"), None).unwrap();
        store.set_active(Collection::Faq, &b, false).unwrap();

        let active = store.active_items(Collection::Faq, 10).unwrap();
        let ids: Vec<_> = active.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![a.clone(), c]);
        assert!(active[0].position < active[1].position);

        assert_eq!(store.active_items(Collection::Faq, 1).unwrap().len(), 1);
        assert_eq!(store.all_items(Collection::Faq).unwrap().len(), 3);
    }

    #[test]
    fn test_get_many_skips_unknown() {
        let store = KnowledgeStore::open_in_memory(3).unwrap();
        let a = store.insert(&faq("a"), None).unwrap();

        let found = store
            .get_many(Collection::Faq, &[a.clone(), ItemId::from("missing")])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a);
        assert!(store.get_many(Collection::Faq, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_set_embedding_unknown_item() {
        let store = KnowledgeStore::open_in_memory(3).unwrap();
        assert!(matches!(
            store.set_embedding(Collection::Faq, &ItemId::from("nope"), &[0.0, 1.0, 0.0]),
            Err(KnowledgeError::NotFound(_))
        ));
    }
}
