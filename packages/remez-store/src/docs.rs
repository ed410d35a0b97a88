use serde_json::Value;

use crate::{Error, Result, db::Db};

/// Structured-document access keyed by collection + id. This is the only
/// persistence surface the pipeline writes through; all writes are expected
/// to arrive via the sync queue, which serializes them.
#[derive(Clone)]
pub struct PgDocStore {
	db: Db,
}

impl PgDocStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
		let row: Option<(Value,)> =
			sqlx::query_as("SELECT data FROM documents WHERE collection = $1 AND id = $2")
				.bind(collection)
				.bind(id)
				.fetch_optional(&self.db.pool)
				.await?;

		Ok(row.map(|(data,)| data))
	}

	pub async fn set(&self, collection: &str, id: &str, data: &Value) -> Result<()> {
		sqlx::query(
			"\
INSERT INTO documents (collection, id, data)
VALUES ($1, $2, $3)
ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
		)
		.bind(collection)
		.bind(id)
		.bind(data)
		.execute(&self.db.pool)
		.await?;

		Ok(())
	}

	/// Shallow-merges `data` into the stored document; fails when the target
	/// does not exist, matching update-vs-set semantics.
	pub async fn update(&self, collection: &str, id: &str, data: &Value) -> Result<()> {
		let result = sqlx::query(
			"\
UPDATE documents
SET data = data || $3, updated_at = now()
WHERE collection = $1 AND id = $2",
		)
		.bind(collection)
		.bind(id)
		.bind(data)
		.execute(&self.db.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(Error::NotFound(format!("{collection}/{id}")));
		}

		Ok(())
	}

	pub async fn delete(&self, collection: &str, id: &str) -> Result<()> {
		sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
			.bind(collection)
			.bind(id)
			.execute(&self.db.pool)
			.await?;

		Ok(())
	}
}
