use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ sea_query::OnConflict, ActiveValue, DatabaseConnection, EntityTrait };

use crate::db::entity::kv_entry;
use crate::error::Result;

use super::KeyValueStore;

/// Key-value documents in the `kv_entries` table.
#[derive(Clone)]
pub struct SeaOrmKeyValueStore {
    db: DatabaseConnection,
}

impl SeaOrmKeyValueStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyValueStore for SeaOrmKeyValueStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entry = kv_entry::Entity::find_by_id(key.to_string()).one(&self.db).await?;
        Ok(entry.map(|e| e.value))
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        let entry = kv_entry::ActiveModel {
            key: ActiveValue::Set(key.to_string()),
            value: ActiveValue::Set(value),
            updated_at: ActiveValue::Set(Utc::now()),
        };

        kv_entry::Entity
            ::insert(entry)
            .on_conflict(
                OnConflict::column(kv_entry::Column::Key)
                    .update_columns([kv_entry::Column::Value, kv_entry::Column::UpdatedAt])
                    .to_owned()
            )
            .exec(&self.db).await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        kv_entry::Entity::delete_by_id(key.to_string()).exec(&self.db).await?;
        Ok(())
    }
}
