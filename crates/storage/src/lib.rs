use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use sqlx::{Row, SqlitePool};
use tripkit_core::TripChecklist;

/// Persistence for generated checklists. `save` returns a storage
/// reference such as `memory://checklists/<id>`; `toggle_item` returns
/// the updated checklist, or `None` when either the checklist or the
/// named item does not exist.
pub trait ChecklistRepository: Send + Sync {
    async fn save(&self, checklist: &TripChecklist) -> Result<String>;
    async fn fetch(&self, id: &str) -> Result<Option<TripChecklist>>;
    async fn toggle_item(&self, id: &str, item_name: &str) -> Result<Option<TripChecklist>>;
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<TripChecklist>>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    checklists: Arc<RwLock<HashMap<String, TripChecklist>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChecklistRepository for MemoryStore {
    async fn save(&self, checklist: &TripChecklist) -> Result<String> {
        self.checklists
            .write()
            .insert(checklist.id.clone(), checklist.clone());
        Ok(format!("memory://checklists/{}", checklist.id))
    }

    async fn fetch(&self, id: &str) -> Result<Option<TripChecklist>> {
        Ok(self.checklists.read().get(id).cloned())
    }

    async fn toggle_item(&self, id: &str, item_name: &str) -> Result<Option<TripChecklist>> {
        let mut guard = self.checklists.write();
        let Some(checklist) = guard.get_mut(id) else {
            return Ok(None);
        };
        if checklist.toggle_item(item_name).is_none() {
            return Ok(None);
        }
        Ok(Some(checklist.clone()))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<TripChecklist>> {
        let mut out: Vec<TripChecklist> = self
            .checklists
            .read()
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checklists (
              id TEXT PRIMARY KEY,
              user_id TEXT NOT NULL,
              request_json TEXT NOT NULL,
              items_json TEXT NOT NULL,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_checklists_user ON checklists (user_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_checklist(row: &sqlx::sqlite::SqliteRow) -> Result<TripChecklist> {
        let request_json: String = row.get("request_json");
        let items_json: String = row.get("items_json");
        let created_at: String = row.get("created_at");

        Ok(TripChecklist {
            id: row.get("id"),
            user_id: row.get("user_id"),
            request: serde_json::from_str(&request_json).context("corrupt request_json")?,
            items: serde_json::from_str(&items_json).context("corrupt items_json")?,
            created_at: created_at
                .parse()
                .context("corrupt created_at timestamp")?,
        })
    }
}

impl ChecklistRepository for SqliteStore {
    async fn save(&self, checklist: &TripChecklist) -> Result<String> {
        let request_json = serde_json::to_string(&checklist.request)?;
        let items_json = serde_json::to_string(&checklist.items)?;

        sqlx::query(
            r#"
            INSERT INTO checklists (id, user_id, request_json, items_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
              user_id=excluded.user_id,
              request_json=excluded.request_json,
              items_json=excluded.items_json,
              created_at=excluded.created_at
            "#,
        )
        .bind(&checklist.id)
        .bind(&checklist.user_id)
        .bind(request_json)
        .bind(items_json)
        .bind(checklist.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(format!("sqlite://checklists/{}", checklist.id))
    }

    async fn fetch(&self, id: &str) -> Result<Option<TripChecklist>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, request_json, items_json, created_at
            FROM checklists
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Self::row_to_checklist(&row)?))
    }

    async fn toggle_item(&self, id: &str, item_name: &str) -> Result<Option<TripChecklist>> {
        let Some(mut checklist) = self.fetch(id).await? else {
            return Ok(None);
        };
        if checklist.toggle_item(item_name).is_none() {
            return Ok(None);
        }
        self.save(&checklist).await?;
        Ok(Some(checklist))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<TripChecklist>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, request_json, items_json, created_at
            FROM checklists
            WHERE user_id = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_checklist).collect()
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }
}

impl ChecklistRepository for Store {
    async fn save(&self, checklist: &TripChecklist) -> Result<String> {
        match self {
            Store::Memory(store) => store.save(checklist).await,
            Store::Sqlite(store) => store.save(checklist).await,
        }
    }

    async fn fetch(&self, id: &str) -> Result<Option<TripChecklist>> {
        match self {
            Store::Memory(store) => store.fetch(id).await,
            Store::Sqlite(store) => store.fetch(id).await,
        }
    }

    async fn toggle_item(&self, id: &str, item_name: &str) -> Result<Option<TripChecklist>> {
        match self {
            Store::Memory(store) => store.toggle_item(id, item_name).await,
            Store::Sqlite(store) => store.toggle_item(id, item_name).await,
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<TripChecklist>> {
        match self {
            Store::Memory(store) => store.list_for_user(user_id).await,
            Store::Sqlite(store) => store.list_for_user(user_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tripkit_core::{ChecklistItem, TripPurpose, TripRequest};

    fn sample_checklist(user_id: &str) -> TripChecklist {
        let start = Utc::now().date_naive() + Duration::days(30);
        let request = TripRequest::new(
            "Kanazawa",
            start,
            start + Duration::days(2),
            TripPurpose::Leisure,
            None,
            None,
        )
        .unwrap();

        TripChecklist {
            id: TripChecklist::derive_id(user_id, &request),
            user_id: user_id.to_string(),
            request,
            items: vec![
                ChecklistItem::base("Wallet", "essentials", 5),
                ChecklistItem::auto("Folding umbrella", "weather", 4, "Rain expected"),
            ],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_save_and_fetch_round_trip() {
        let store = MemoryStore::new();
        let checklist = sample_checklist("alice");

        let reference = store.save(&checklist).await.unwrap();
        assert_eq!(reference, format!("memory://checklists/{}", checklist.id));

        let fetched = store.fetch(&checklist.id).await.unwrap().unwrap();
        assert_eq!(fetched.items.len(), 2);
        assert!(store.fetch("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_toggle_flips_and_persists() {
        let store = MemoryStore::new();
        let checklist = sample_checklist("alice");
        store.save(&checklist).await.unwrap();

        let updated = store
            .toggle_item(&checklist.id, "Wallet")
            .await
            .unwrap()
            .unwrap();
        let wallet = updated.items.iter().find(|i| i.name == "Wallet").unwrap();
        assert!(wallet.checked);

        assert!(store
            .toggle_item(&checklist.id, "No such item")
            .await
            .unwrap()
            .is_none());
        assert!(store.toggle_item("missing", "Wallet").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_for_user_filters_and_sorts() {
        let store = MemoryStore::new();
        let mine = sample_checklist("alice");
        let theirs = sample_checklist("bob");
        store.save(&mine).await.unwrap();
        store.save(&theirs).await.unwrap();

        let listed = store.list_for_user("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_id, "alice");
    }
}
