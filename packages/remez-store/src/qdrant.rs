use std::collections::HashMap;

use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		Condition, DeletePointsBuilder, Document, Filter, PointStruct, Query, QueryPointsBuilder,
		ScoredPoint, UpsertPointsBuilder, Value as QdrantValue, Vector, value::Kind,
	},
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::Result;

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";

/// Payload key that partitions one collection into logical namespaces.
pub const NAMESPACE_KEY: &str = "namespace";
/// Payload key carrying the caller's logical id for a point.
pub const REF_ID_KEY: &str = "ref_id";
/// Payload key carrying the indexed passage text.
pub const TEXT_KEY: &str = "text";

#[derive(Clone, Debug)]
pub struct IndexMatch {
	pub id: String,
	pub score: f32,
	pub text: String,
	pub payload: Map<String, Value>,
}

pub struct QdrantIndex {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}

impl QdrantIndex {
	pub fn new(cfg: &remez_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn upsert(
		&self,
		namespace: &str,
		id: &str,
		vector: Vec<f32>,
		text: &str,
		metadata: Map<String, Value>,
	) -> Result<()> {
		let mut payload_map = HashMap::new();

		payload_map.insert(NAMESPACE_KEY.to_string(), QdrantValue::from(namespace.to_string()));
		payload_map.insert(REF_ID_KEY.to_string(), QdrantValue::from(id.to_string()));
		payload_map.insert(TEXT_KEY.to_string(), QdrantValue::from(text.to_string()));

		for (key, value) in metadata {
			payload_map.insert(key, QdrantValue::from(value));
		}

		let payload = Payload::from(payload_map);
		let mut vector_map = HashMap::new();

		vector_map.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(vector));
		vector_map.insert(
			BM25_VECTOR_NAME.to_string(),
			Vector::from(Document::new(text.to_string(), BM25_MODEL)),
		);

		let point = PointStruct::new(point_id(namespace, id).to_string(), vector_map, payload);
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	pub async fn query(
		&self,
		namespace: &str,
		vector: Vec<f32>,
		top_k: usize,
		field_filters: &[(&str, String)],
	) -> Result<Vec<IndexMatch>> {
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.filter(namespace_filter(namespace, field_filters))
			.limit(top_k as u64)
			.with_payload(true);
		let response = self.client.query(search).await?;

		Ok(response.result.into_iter().map(to_index_match).collect())
	}

	/// Lexical search over the sparse BM25 vector. Phrase-gap constraints are
	/// enforced by the caller against the returned text; BM25 itself has no
	/// phrase operator.
	pub async fn search_text(
		&self,
		namespace: &str,
		phrase: &str,
		top_k: usize,
		field_filters: &[(&str, String)],
	) -> Result<Vec<IndexMatch>> {
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(Document::new(phrase.to_string(), BM25_MODEL)))
			.using(BM25_VECTOR_NAME)
			.filter(namespace_filter(namespace, field_filters))
			.limit(top_k as u64)
			.with_payload(true);
		let response = self.client.query(search).await?;

		Ok(response.result.into_iter().map(to_index_match).collect())
	}

	pub async fn delete(&self, namespace: &str, id: &str) -> Result<()> {
		let filter = Filter::must([
			Condition::matches(NAMESPACE_KEY, namespace.to_string()),
			Condition::matches(REF_ID_KEY, id.to_string()),
		]);
		let delete = DeletePointsBuilder::new(self.collection.clone()).points(filter).wait(true);

		self.client.delete_points(delete).await?;

		Ok(())
	}
}

fn point_id(namespace: &str, id: &str) -> Uuid {
	let name = format!("{namespace}:{id}");

	Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

fn namespace_filter(namespace: &str, field_filters: &[(&str, String)]) -> Filter {
	let mut must = vec![Condition::matches(NAMESPACE_KEY, namespace.to_string())];

	for (field, value) in field_filters {
		must.push(Condition::matches(*field, value.clone()));
	}

	Filter::must(must)
}

fn to_index_match(point: ScoredPoint) -> IndexMatch {
	let payload: Map<String, Value> = point
		.payload
		.into_iter()
		.map(|(key, value)| (key, qdrant_value_to_json(value)))
		.collect();
	let id = payload
		.get(REF_ID_KEY)
		.and_then(|value| value.as_str())
		.unwrap_or_default()
		.to_string();
	let text = payload
		.get(TEXT_KEY)
		.and_then(|value| value.as_str())
		.unwrap_or_default()
		.to_string();

	IndexMatch { id, score: point.score, text, payload }
}

fn qdrant_value_to_json(value: QdrantValue) -> Value {
	match value.kind {
		Some(Kind::BoolValue(flag)) => Value::Bool(flag),
		Some(Kind::IntegerValue(number)) => Value::from(number),
		Some(Kind::DoubleValue(number)) => Value::from(number),
		Some(Kind::StringValue(text)) => Value::String(text),
		Some(Kind::ListValue(list)) =>
			Value::Array(list.values.into_iter().map(qdrant_value_to_json).collect()),
		Some(Kind::StructValue(fields)) => Value::Object(
			fields
				.fields
				.into_iter()
				.map(|(key, value)| (key, qdrant_value_to_json(value)))
				.collect(),
		),
		Some(Kind::NullValue(_)) | None => Value::Null,
	}
}
