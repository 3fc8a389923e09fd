use crate::context::CallContext;
use crate::errors::{CyborgError, Result};
use crate::index::EncryptedIndex;
use crate::index_config::IndexConfig;
use crate::key::EncryptionKey;
use crate::model::{HealthStatus, IndexDescriptor};
use crate::transport::{ClientConfig, HttpTransport};
use serde::{Deserialize, Serialize};

/// Entry point to a CyborgDB service.
///
/// Holds only the transport; safe to clone and share across tasks.
#[derive(Debug, Clone)]
pub struct Client {
    transport: HttpTransport,
}

#[derive(Serialize)]
struct CreateIndexBody<'a> {
    index_name: &'a str,
    index_key: &'a EncryptionKey,
    index_config: &'a IndexConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    embedding_model: Option<&'a str>,
}

#[derive(Deserialize)]
struct ListIndexesResponse {
    indexes: Vec<String>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(&config)?,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn generate_key() -> EncryptionKey {
        EncryptionKey::generate()
    }

    pub async fn health(&self, ctx: &CallContext) -> Result<HealthStatus> {
        let _timer = crate::measure_operation!("client.health");
        self.transport.get_json(ctx, &["health"]).await
    }

    pub async fn list_indexes(&self, ctx: &CallContext) -> Result<Vec<String>> {
        let _timer = crate::measure_operation!("client.list_indexes");
        let response: ListIndexesResponse = self.transport.get_json(ctx, &["indexes"]).await?;
        Ok(response.indexes)
    }

    /// Create an index and return a handle bound to it.
    ///
    /// Name and config are checked before anything is sent.
    pub async fn create_index(
        &self,
        ctx: &CallContext,
        name: &str,
        key: EncryptionKey,
        config: IndexConfig,
        embedding_model: Option<&str>,
    ) -> Result<EncryptedIndex> {
        let _timer = crate::measure_operation!("client.create_index");
        check_index_name(name)?;
        config.validate()?;

        let body = CreateIndexBody {
            index_name: name,
            index_key: &key,
            index_config: &config,
            embedding_model,
        };
        let descriptor: IndexDescriptor = self.transport.post_json(ctx, &["indexes"], &body).await?;
        if descriptor.index_name != name {
            return Err(CyborgError::MalformedResponse(format!(
                "created index {} but service reported {}",
                name, descriptor.index_name
            )));
        }

        tracing::info!(
            "Created {} index {} ({} dims, {})",
            config.index_type(),
            name,
            config.dimension(),
            config.metric()
        );
        Ok(EncryptedIndex::new(
            self.transport.clone(),
            name.to_string(),
            key,
            config,
            descriptor.is_trained,
        ))
    }

    /// Bind a handle to an index that already exists. No request is made.
    ///
    /// The service is not asked about training state, so the handle starts
    /// with `is_trained() == false` even for an index trained earlier. Call
    /// `train` on it to set the flag.
    pub fn index(&self, name: &str, key: EncryptionKey, config: IndexConfig) -> Result<EncryptedIndex> {
        check_index_name(name)?;
        config.validate()?;
        Ok(EncryptedIndex::new(
            self.transport.clone(),
            name.to_string(),
            key,
            config,
            false,
        ))
    }
}

fn check_index_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CyborgError::InvalidConfig("index name must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_binding_is_local() {
        let client = Client::new(ClientConfig::default()).unwrap();
        let key = Client::generate_key();
        let index = client.index("docs", key.clone(), IndexConfig::ivf_flat(8)).unwrap();
        assert_eq!(index.name(), "docs");
        assert_eq!(index.key(), &key);
        // Training state is not known without asking the service.
        assert!(!index.is_trained());
    }

    #[test]
    fn test_index_binding_validates() {
        let client = Client::new(ClientConfig::default()).unwrap();
        let key = Client::generate_key();
        assert!(matches!(
            client.index("", key.clone(), IndexConfig::ivf(8)),
            Err(CyborgError::InvalidConfig(_))
        ));
        assert!(matches!(
            client.index("docs", key, IndexConfig::ivfpq(768, 800, 8)),
            Err(CyborgError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_create_body_shape() {
        let key = EncryptionKey::from([2u8; 32]);
        let config = IndexConfig::ivf(4).with_n_lists(2);
        let body = CreateIndexBody {
            index_name: "docs",
            index_key: &key,
            index_config: &config,
            embedding_model: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "index_name": "docs",
                "index_key": "02".repeat(32),
                "index_config": {"type": "ivf", "dimension": 4, "metric": "euclidean", "n_lists": 2}
            })
        );
    }
}
