use crate::errors::{CyborgError, Result};
use crate::index_config::IndexConfig;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Optional item contents: UTF-8 text or arbitrary bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    Text(String),
    Bytes(Bytes),
}

impl From<String> for Contents {
    fn from(text: String) -> Self {
        Contents::Text(text)
    }
}

impl From<&str> for Contents {
    fn from(text: &str) -> Self {
        Contents::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Contents {
    fn from(raw: Vec<u8>) -> Self {
        Contents::Bytes(Bytes::from(raw))
    }
}

impl From<Bytes> for Contents {
    fn from(raw: Bytes) -> Self {
        Contents::Bytes(raw)
    }
}

/// Read contents out of a loosely typed JSON value: strings are text, arrays
/// of byte-sized integers are bytes. Anything else is refused rather than
/// stringified.
impl TryFrom<Value> for Contents {
    type Error = CyborgError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(Contents::Text(text)),
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Contents::from)
                .ok_or_else(|| CyborgError::UnsupportedContents("array of non-byte values".into())),
            Value::Null => Err(CyborgError::UnsupportedContents("null".into())),
            Value::Bool(_) => Err(CyborgError::UnsupportedContents("bool".into())),
            Value::Number(_) => Err(CyborgError::UnsupportedContents("number".into())),
            Value::Object(_) => Err(CyborgError::UnsupportedContents("object".into())),
        }
    }
}

/// Text passes through unchanged, bytes become standard base64, absent stays
/// absent.
pub fn encode_contents(contents: Option<&Contents>) -> Option<String> {
    contents.map(|c| match c {
        Contents::Text(text) => text.clone(),
        Contents::Bytes(raw) => BASE64.encode(raw),
    })
}

/// The wire form always comes back as text. Bytes that were base64-encoded on
/// the way in are left for the caller to decode.
pub fn decode_contents(wire: Option<String>) -> Option<Contents> {
    wire.map(Contents::Text)
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorItem {
    pub id: String,
    pub vector: Option<Vec<f32>>,
    pub contents: Option<Contents>,
    pub metadata: Option<Value>,
}

impl VectorItem {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector: Some(vector),
            contents: None,
            metadata: None,
        }
    }

    /// Item without a vector; the service embeds the contents itself when the
    /// index was created with an embedding model.
    pub fn from_contents(id: impl Into<String>, contents: impl Into<Contents>) -> Self {
        Self {
            id: id.into(),
            vector: None,
            contents: Some(contents.into()),
            metadata: None,
        }
    }

    pub fn with_contents(mut self, contents: impl Into<Contents>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Item as it travels to and from the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

fn check_item(id: &str, vector: Option<&Vec<f32>>) -> Result<()> {
    if id.is_empty() {
        return Err(CyborgError::InvalidItem("id must not be empty".into()));
    }
    if vector.is_some_and(|v| v.is_empty()) {
        return Err(CyborgError::InvalidItem(format!(
            "vector for {} must not be empty",
            id
        )));
    }
    Ok(())
}

pub fn encode_item(item: &VectorItem) -> Result<WireItem> {
    check_item(&item.id, item.vector.as_ref())?;
    Ok(WireItem {
        id: item.id.clone(),
        vector: item.vector.clone(),
        contents: encode_contents(item.contents.as_ref()),
        metadata: item.metadata.clone(),
    })
}

pub fn decode_item(wire: WireItem) -> Result<VectorItem> {
    check_item(&wire.id, wire.vector.as_ref())?;
    Ok(VectorItem {
        id: wire.id,
        vector: wire.vector,
        contents: decode_contents(wire.contents),
        metadata: wire.metadata,
    })
}

/// Fields that can be requested from `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GetField {
    Vector,
    Contents,
    Metadata,
}

impl GetField {
    pub const ALL: &'static [GetField] = &[GetField::Vector, GetField::Contents, GetField::Metadata];
}

/// Optional knobs for `train`; unset values use the service defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iters: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_lists: Option<u32>,
}

/// Service reply to index creation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexDescriptor {
    pub index_name: String,
    #[serde(default)]
    pub is_trained: bool,
    #[serde(default)]
    pub index_config: Option<IndexConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_contents_pass_through() {
        let contents = Contents::from("hello world");
        assert_eq!(encode_contents(Some(&contents)), Some("hello world".to_string()));
    }

    #[test]
    fn test_binary_contents_base64() {
        let contents = Contents::from(vec![0x00, 0x01, 0xFF]);
        let wire = encode_contents(Some(&contents)).unwrap();
        assert_eq!(wire, "AAH/");
        assert_eq!(BASE64.decode(&wire).unwrap(), vec![0x00, 0x01, 0xFF]);

        // Coming back it is opaque text; decoding twice changes nothing.
        let once = decode_contents(Some(wire.clone()));
        assert_eq!(once, Some(Contents::Text(wire.clone())));
        let twice = decode_contents(encode_contents(once.as_ref()));
        assert_eq!(twice, once);
    }

    #[test]
    fn test_absent_contents_stay_absent() {
        assert_eq!(encode_contents(None), None);
        assert_eq!(decode_contents(None), None);

        let wire = encode_item(&VectorItem::new("a", vec![1.0])).unwrap();
        let value = serde_json::to_value(&wire).unwrap();
        assert!(value.get("contents").is_none());
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn test_contents_from_json_value() {
        assert_eq!(
            Contents::try_from(json!("abc")).unwrap(),
            Contents::Text("abc".into())
        );
        assert_eq!(
            Contents::try_from(json!([1, 2, 255])).unwrap(),
            Contents::Bytes(Bytes::from_static(&[1, 2, 255]))
        );
        assert!(matches!(
            Contents::try_from(json!(42)),
            Err(CyborgError::UnsupportedContents(_))
        ));
        assert!(matches!(
            Contents::try_from(json!([1, 256])),
            Err(CyborgError::UnsupportedContents(_))
        ));
        assert!(matches!(
            Contents::try_from(json!({"text": "x"})),
            Err(CyborgError::UnsupportedContents(_))
        ));
    }

    #[test]
    fn test_metadata_passes_through_untouched() {
        let metadata = json!({"owner": {"name": "John", "tags": ["a", "b"]}, "age": 31});
        let item = VectorItem::new("item-1", vec![0.1, 0.2])
            .with_contents("doc")
            .with_metadata(metadata.clone());
        let wire = encode_item(&item).unwrap();
        assert_eq!(wire.metadata, Some(metadata.clone()));

        let decoded = decode_item(wire).unwrap();
        assert_eq!(decoded.metadata, Some(metadata));
        assert_eq!(decoded.contents, Some(Contents::Text("doc".into())));
    }

    #[test]
    fn test_empty_id_rejected() {
        let err = encode_item(&VectorItem::new("", vec![1.0])).unwrap_err();
        assert!(matches!(err, CyborgError::InvalidItem(_)));
    }

    #[test]
    fn test_empty_vector_rejected() {
        let err = encode_item(&VectorItem::new("a", vec![])).unwrap_err();
        assert!(matches!(err, CyborgError::InvalidItem(_)));
    }

    #[test]
    fn test_item_without_vector_allowed() {
        let wire = encode_item(&VectorItem::from_contents("a", "text only")).unwrap();
        assert_eq!(wire.vector, None);
        assert_eq!(wire.contents.as_deref(), Some("text only"));
    }

    #[test]
    fn test_decode_item_from_partial_payload() {
        let wire: WireItem = serde_json::from_value(json!({"id": "x", "metadata": {"k": 1}})).unwrap();
        let item = decode_item(wire).unwrap();
        assert_eq!(item.vector, None);
        assert_eq!(item.contents, None);
        assert_eq!(item.metadata, Some(json!({"k": 1})));
    }

    #[test]
    fn test_train_params_skip_unset() {
        let params = TrainParams {
            max_iters: Some(50),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&params).unwrap(), json!({"max_iters": 50}));
    }

    #[test]
    fn test_descriptor_defaults() {
        let descriptor: IndexDescriptor =
            serde_json::from_value(json!({"index_name": "docs"})).unwrap();
        assert!(!descriptor.is_trained);
        assert!(descriptor.index_config.is_none());
    }
}
