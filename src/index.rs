use crate::context::CallContext;
use crate::errors::{CyborgError, Result};
use crate::index_config::IndexConfig;
use crate::key::EncryptionKey;
use crate::model::{decode_item, encode_item, GetField, TrainParams, VectorItem, WireItem};
use crate::query::{QueryInput, QueryRequest, QueryResponse};
use crate::transport::HttpTransport;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Handle to one encrypted index.
///
/// Name, key and config are fixed at construction. Every operation is a
/// single request; nothing is cached and failed calls are not retried.
#[derive(Debug, Clone)]
pub struct EncryptedIndex {
    transport: HttpTransport,
    name: String,
    key: EncryptionKey,
    config: IndexConfig,
    trained: bool,
}

/// Body prefix shared by every index-scoped request.
#[derive(Serialize)]
struct Scoped<'a, T: Serialize> {
    index_name: &'a str,
    index_key: &'a EncryptionKey,
    #[serde(flatten)]
    body: T,
}

#[derive(Serialize)]
struct UpsertBody {
    items: Vec<WireItem>,
}

#[derive(Serialize)]
struct GetBody<'a> {
    ids: &'a [&'a str],
    include: &'a [GetField],
}

#[derive(Serialize)]
struct DeleteBody<'a> {
    ids: &'a [&'a str],
}

#[derive(Serialize)]
struct NoBody {}

#[derive(Deserialize)]
struct GetResponse {
    results: Vec<WireItem>,
}

impl EncryptedIndex {
    pub(crate) fn new(
        transport: HttpTransport,
        name: String,
        key: EncryptionKey,
        config: IndexConfig,
        trained: bool,
    ) -> Self {
        Self {
            transport,
            name,
            key,
            config,
            trained,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn index_type(&self) -> &'static str {
        self.config.index_type()
    }

    pub fn dimension(&self) -> u32 {
        self.config.dimension()
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    fn scoped<T: Serialize>(&self, body: T) -> Scoped<'_, T> {
        Scoped {
            index_name: &self.name,
            index_key: &self.key,
            body,
        }
    }

    pub async fn upsert(&self, ctx: &CallContext, items: &[VectorItem]) -> Result<()> {
        let _timer = crate::measure_operation!("index.upsert");
        if items.is_empty() {
            return Err(CyborgError::InvalidItem("no items to upsert".into()));
        }
        let dimension = self.config.dimension() as usize;
        let mut wire_items = Vec::with_capacity(items.len());
        for item in items {
            if let Some(vector) = &item.vector {
                if vector.len() != dimension {
                    return Err(CyborgError::DimensionMismatch {
                        expected: dimension,
                        actual: vector.len(),
                    });
                }
            }
            wire_items.push(encode_item(item)?);
        }

        tracing::debug!("Upserting {} items into {}", wire_items.len(), self.name);
        let body = self.scoped(UpsertBody { items: wire_items });
        let _: Value = self
            .transport
            .post_json(ctx, &["indexes", self.name.as_str(), "upsert"], &body)
            .await?;
        Ok(())
    }

    pub async fn query(&self, ctx: &CallContext, request: &QueryRequest) -> Result<QueryResponse> {
        let _timer = crate::measure_operation!("index.query");
        let query_dimension = match request.input() {
            QueryInput::Single(vector) => Some(vector.len()),
            QueryInput::Batch(vectors) => vectors.first().map(Vec::len),
            QueryInput::Text(_) => None,
        };
        let dimension = self.config.dimension() as usize;
        if let Some(actual) = query_dimension.filter(|&n| n != dimension) {
            return Err(CyborgError::DimensionMismatch {
                expected: dimension,
                actual,
            });
        }

        let wire: Value = self
            .transport
            .post_json(
                ctx,
                &["indexes", self.name.as_str(), "query"],
                &request.to_wire(&self.name, &self.key),
            )
            .await?;
        request.decode_response(wire)
    }

    /// Fetch items by id. An empty `include` asks for every field.
    pub async fn get<S: AsRef<str>>(
        &self,
        ctx: &CallContext,
        ids: &[S],
        include: &[GetField],
    ) -> Result<Vec<VectorItem>> {
        let _timer = crate::measure_operation!("index.get");
        let ids = non_empty_ids(ids)?;
        let include = if include.is_empty() {
            GetField::ALL
        } else {
            include
        };

        let body = self.scoped(GetBody {
            ids: &ids,
            include,
        });
        let response: GetResponse = self
            .transport
            .post_json(ctx, &["indexes", self.name.as_str(), "get"], &body)
            .await?;

        response
            .results
            .into_iter()
            .map(|wire| {
                let mut item = decode_item(wire)?;
                if !include.contains(&GetField::Vector) {
                    item.vector = None;
                }
                if !include.contains(&GetField::Contents) {
                    item.contents = None;
                }
                if !include.contains(&GetField::Metadata) {
                    item.metadata = None;
                }
                Ok(item)
            })
            .collect()
    }

    pub async fn delete<S: AsRef<str>>(&self, ctx: &CallContext, ids: &[S]) -> Result<()> {
        let _timer = crate::measure_operation!("index.delete");
        let ids = non_empty_ids(ids)?;
        let body = self.scoped(DeleteBody { ids: &ids });
        let _: Value = self
            .transport
            .post_json(ctx, &["indexes", self.name.as_str(), "delete"], &body)
            .await?;
        Ok(())
    }

    /// Build the index's clusters. The handle records success locally.
    pub async fn train(&mut self, ctx: &CallContext, params: &TrainParams) -> Result<()> {
        let _timer = crate::measure_operation!("index.train");
        if params.n_lists == Some(0) || params.batch_size == Some(0) || params.max_iters == Some(0) {
            return Err(CyborgError::InvalidConfig(
                "train parameters must be > 0 when set".into(),
            ));
        }
        let body = self.scoped(params);
        let _: Value = self
            .transport
            .post_json(ctx, &["indexes", self.name.as_str(), "train"], &body)
            .await?;
        self.trained = true;
        tracing::info!("Trained index {}", self.name);
        Ok(())
    }

    /// Remove the index from the service. The handle is consumed.
    pub async fn delete_index(self, ctx: &CallContext) -> Result<()> {
        let _timer = crate::measure_operation!("index.delete_index");
        let body = self.scoped(NoBody {});
        let _: Value = self
            .transport
            .delete_json(ctx, &["indexes", self.name.as_str()], &body)
            .await?;
        tracing::info!("Deleted index {}", self.name);
        Ok(())
    }
}

fn non_empty_ids<S: AsRef<str>>(ids: &[S]) -> Result<Vec<&str>> {
    if ids.is_empty() {
        return Err(CyborgError::InvalidItem("no ids given".into()));
    }
    let ids: Vec<&str> = ids.iter().map(|id| id.as_ref()).collect();
    if ids.iter().any(|id| id.is_empty()) {
        return Err(CyborgError::InvalidItem("id must not be empty".into()));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ClientConfig;
    use serde_json::json;

    fn handle() -> EncryptedIndex {
        let transport = HttpTransport::new(&ClientConfig::default()).unwrap();
        EncryptedIndex::new(
            transport,
            "docs".into(),
            EncryptionKey::from([9u8; 32]),
            IndexConfig::ivf_flat(3),
            false,
        )
    }

    #[test]
    fn test_accessors() {
        let index = handle();
        assert_eq!(index.name(), "docs");
        assert_eq!(index.index_type(), "ivfflat");
        assert_eq!(index.dimension(), 3);
        assert!(!index.is_trained());
    }

    #[test]
    fn test_scoped_body_flattens() {
        let index = handle();
        let ids = ["a", "b"];
        let body = index.scoped(DeleteBody { ids: &ids });
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"index_name": "docs", "index_key": "09".repeat(32), "ids": ["a", "b"]})
        );

        let body = index.scoped(NoBody {});
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"index_name": "docs", "index_key": "09".repeat(32)})
        );
    }

    #[test]
    fn test_train_body_skips_unset_params() {
        let index = handle();
        let params = TrainParams {
            n_lists: Some(16),
            tolerance: Some(1e-5),
            ..Default::default()
        };
        let body = serde_json::to_value(index.scoped(&params)).unwrap();
        assert_eq!(body["n_lists"], json!(16));
        assert!(body.get("batch_size").is_none());
        assert!(body.get("max_memory").is_none());
    }

    #[test]
    fn test_ids_validated() {
        let empty: [&str; 0] = [];
        assert!(non_empty_ids(&empty).is_err());
        assert!(non_empty_ids(&["a", ""]).is_err());
        assert_eq!(non_empty_ids(&[String::from("a")]).unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_upsert_dimension_checked_locally() {
        let index = handle();
        let err = index
            .upsert(&CallContext::background(), &[VectorItem::new("a", vec![1.0, 2.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, CyborgError::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[tokio::test]
    async fn test_query_dimension_checked_locally() {
        let index = handle();
        let request = crate::query::QueryRequestBuilder::for_batch(vec![vec![1.0; 4], vec![2.0; 4]])
            .build()
            .unwrap();
        let err = index
            .query(&CallContext::background(), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, CyborgError::DimensionMismatch { expected: 3, actual: 4 }));
    }

    #[tokio::test]
    async fn test_empty_upsert_rejected() {
        let err = handle()
            .upsert(&CallContext::background(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CyborgError::InvalidItem(_)));
    }
}
