//! Roadmap lookups used outside the retrieval cascade.

use rusqlite::{OptionalExtension, params};

use crate::error::Result;
use crate::types::{Collection, KnowledgeRecord};

use super::KnowledgeStore;
use super::item_ops::{ROADMAP_COLUMNS, query_records, roadmap_from_row};

impl KnowledgeStore {
    /// Published roadmap with the given slug.
    pub fn get_roadmap_by_slug(&self, slug: &str) -> Result<Option<KnowledgeRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {ROADMAP_COLUMNS} FROM roadmaps WHERE slug = ?1 AND is_published = 1"
        );
        Ok(conn
            .query_row(&sql, params![slug], roadmap_from_row)
            .optional()?)
    }

    /// Whether any roadmap, published or not, uses `slug`.
    pub fn roadmap_slug_exists(&self, slug: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM roadmaps WHERE slug = ?1",
                params![slug],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Published roadmaps, optionally restricted to one category, ordered by
    /// title.
    pub fn list_roadmaps(&self, category: Option<&str>) -> Result<Vec<KnowledgeRecord>> {
        let conn = self.conn.lock();
        match category {
            Some(category) => {
                let sql = format!(
                    "SELECT {ROADMAP_COLUMNS} FROM roadmaps
                     WHERE is_published = 1 AND category = ?1
                     ORDER BY title, seq"
                );
                query_records(&conn, Collection::Roadmaps, &sql, params![category])
            }
            None => {
                let sql = format!(
                    "SELECT {ROADMAP_COLUMNS} FROM roadmaps
                     WHERE is_published = 1
                     ORDER BY title, seq"
                );
                query_records(&conn, Collection::Roadmaps, &sql, [])
            }
        }
    }

    /// Distinct non-empty categories of published roadmaps, sorted.
    pub fn list_categories(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT category FROM roadmaps
             WHERE is_published = 1 AND category != ''
             ORDER BY category",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<String>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KnowledgeItem, RoadmapItem};

    fn roadmap(title: &str, slug: &str, category: &str) -> KnowledgeItem {
        KnowledgeItem::Roadmap(RoadmapItem {
            title: title.to_string(),
            description: format!("{} track", title),
            url: format!("https://roadmap.sh/{}", slug),
            category: category.to_string(),
            slug: slug.to_string(),
        })
    }

    fn seeded() -> KnowledgeStore {
        let store = KnowledgeStore::open_in_memory(3).unwrap();
        store.insert(&roadmap("Frontend", "frontend", "web"), None).unwrap();
        store.insert(&roadmap("Backend", "backend", "web"), None).unwrap();
        store.insert(&roadmap("AI Engineer", "ai-engineer", "ai"), None).unwrap();
        let hidden = store.insert(&roadmap("Legacy", "legacy", "old"), None).unwrap();
        store.set_active(Collection::Roadmaps, &hidden, false).unwrap();
        store
    }

    #[test]
    fn test_get_roadmap_by_slug() {
        let store = seeded();
        let found = store.get_roadmap_by_slug("backend").unwrap().unwrap();
        assert_eq!(found.item.title(), "Backend");
        assert!(store.get_roadmap_by_slug("legacy").unwrap().is_none());
        assert!(store.get_roadmap_by_slug("missing").unwrap().is_none());
        assert!(store.roadmap_slug_exists("legacy").unwrap());
        assert!(!store.roadmap_slug_exists("missing").unwrap());
    }

    #[test]
    fn test_list_roadmaps_by_category() {
        let store = seeded();
        let web: Vec<_> = store
            .list_roadmaps(Some("web"))
            .unwrap()
            .iter()
            .map(|r| r.item.title().to_string())
            .collect();
        assert_eq!(web, vec!["Backend", "Frontend"]);
        assert_eq!(store.list_roadmaps(None).unwrap().len(), 3);
    }

    #[test]
    fn test_list_categories_skips_unpublished() {
        let store = seeded();
        assert_eq!(store.list_categories().unwrap(), vec!["ai", "web"]);
    }
}
