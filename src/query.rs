use crate::defaults::DEFAULT_TOP_K;
use crate::errors::{CyborgError, Result};
use crate::key::EncryptionKey;
use crate::metadata_filter::MetadataFilter;
use crate::model::{decode_contents, Contents};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Result fields a query can ask for. `id` is always returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeField {
    Distance,
    Metadata,
    Vector,
    Contents,
}

impl IncludeField {
    pub const DEFAULT: [IncludeField; 2] = [IncludeField::Distance, IncludeField::Metadata];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncludeField::Distance => "distance",
            IncludeField::Metadata => "metadata",
            IncludeField::Vector => "vector",
            IncludeField::Contents => "contents",
        }
    }
}

impl FromStr for IncludeField {
    type Err = CyborgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "distance" => Ok(IncludeField::Distance),
            "metadata" => Ok(IncludeField::Metadata),
            "vector" => Ok(IncludeField::Vector),
            "contents" => Ok(IncludeField::Contents),
            other => Err(CyborgError::InvalidQuery(format!(
                "unknown include field: {}",
                other
            ))),
        }
    }
}

/// The one query input a request carries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    Single(Vec<f32>),
    Batch(Vec<Vec<f32>>),
    Text(String),
}

impl QueryInput {
    pub fn mode(&self) -> QueryMode {
        match self {
            QueryInput::Single(_) => QueryMode::Single,
            QueryInput::Batch(vectors) => QueryMode::Batch {
                count: vectors.len(),
            },
            QueryInput::Text(_) => QueryMode::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Single,
    Batch { count: usize },
    Text,
}

impl QueryMode {
    /// Number of result sets the service must return.
    pub fn expected_result_sets(&self) -> usize {
        match self {
            QueryMode::Single | QueryMode::Text => 1,
            QueryMode::Batch { count } => *count,
        }
    }
}

/// Collects query parameters and resolves them into a [`QueryRequest`].
///
/// Exactly one of vector, batch vectors or text must be non-empty at
/// [`build`](Self::build) time.
#[derive(Debug, Clone, Default)]
pub struct QueryRequestBuilder {
    vector: Option<Vec<f32>>,
    batch_vectors: Option<Vec<Vec<f32>>>,
    text: Option<String>,
    top_k: Option<u32>,
    include: Option<Vec<IncludeField>>,
    n_probes: Option<u32>,
    greedy: bool,
    filter: Option<MetadataFilter>,
}

impl QueryRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_vector(vector: Vec<f32>) -> Self {
        Self::new().vector(vector)
    }

    pub fn for_batch(vectors: Vec<Vec<f32>>) -> Self {
        Self::new().batch_vectors(vectors)
    }

    pub fn for_text(text: impl Into<String>) -> Self {
        Self::new().contents(text)
    }

    pub fn vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn batch_vectors(mut self, vectors: Vec<Vec<f32>>) -> Self {
        self.batch_vectors = Some(vectors);
        self
    }

    pub fn contents(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn include(mut self, fields: impl IntoIterator<Item = IncludeField>) -> Self {
        self.include = Some(fields.into_iter().collect());
        self
    }

    pub fn n_probes(mut self, n_probes: u32) -> Self {
        self.n_probes = Some(n_probes);
        self
    }

    pub fn greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    pub fn filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn build(self) -> Result<QueryRequest> {
        let mut inputs = Vec::with_capacity(1);
        if let Some(vector) = self.vector.filter(|v| !v.is_empty()) {
            inputs.push(QueryInput::Single(vector));
        }
        if let Some(vectors) = self.batch_vectors.filter(|v| !v.is_empty()) {
            inputs.push(QueryInput::Batch(vectors));
        }
        if let Some(text) = self.text.filter(|t| !t.is_empty()) {
            inputs.push(QueryInput::Text(text));
        }
        let input = match inputs.len() {
            0 => return Err(CyborgError::AmbiguousQueryInput),
            1 => inputs.remove(0),
            _ => return Err(CyborgError::ConflictingQueryInput),
        };

        match &input {
            QueryInput::Single(vector) => check_vector(vector)?,
            QueryInput::Batch(vectors) => {
                let dimension = vectors[0].len();
                for vector in vectors {
                    check_vector(vector)?;
                    if vector.len() != dimension {
                        return Err(CyborgError::DimensionMismatch {
                            expected: dimension,
                            actual: vector.len(),
                        });
                    }
                }
            }
            QueryInput::Text(_) => {}
        }

        let top_k = self.top_k.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            return Err(CyborgError::InvalidQuery("top_k must be > 0".into()));
        }
        if self.n_probes == Some(0) {
            return Err(CyborgError::InvalidQuery("n_probes must be > 0".into()));
        }
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }

        let mut include = Vec::new();
        for field in self.include.unwrap_or_else(|| IncludeField::DEFAULT.to_vec()) {
            if !include.contains(&field) {
                include.push(field);
            }
        }

        Ok(QueryRequest {
            input,
            top_k,
            include,
            n_probes: self.n_probes,
            greedy: self.greedy,
            filter: self.filter,
        })
    }
}

fn check_vector(vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(CyborgError::InvalidQuery("query vector must not be empty".into()));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(CyborgError::InvalidQuery(
            "query vector contains non-finite values".into(),
        ));
    }
    Ok(())
}

/// A validated query, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    input: QueryInput,
    top_k: u32,
    include: Vec<IncludeField>,
    n_probes: Option<u32>,
    greedy: bool,
    filter: Option<MetadataFilter>,
}

impl QueryRequest {
    pub fn input(&self) -> &QueryInput {
        &self.input
    }

    pub fn mode(&self) -> QueryMode {
        self.input.mode()
    }

    pub fn top_k(&self) -> u32 {
        self.top_k
    }

    pub fn include(&self) -> &[IncludeField] {
        &self.include
    }

    pub fn n_probes(&self) -> Option<u32> {
        self.n_probes
    }

    pub fn greedy(&self) -> bool {
        self.greedy
    }

    pub fn filter(&self) -> Option<&MetadataFilter> {
        self.filter.as_ref()
    }

    /// Request body for `POST /indexes/{name}/query`.
    pub fn to_wire<'a>(&'a self, index_name: &'a str, key: &'a EncryptionKey) -> WireQuery<'a> {
        let (query_vectors, query_contents) = match &self.input {
            QueryInput::Single(vector) => (Some(WireVectors::Single(vector)), None),
            QueryInput::Batch(vectors) => (Some(WireVectors::Batch(vectors)), None),
            QueryInput::Text(text) => (None, Some(text.as_str())),
        };
        WireQuery {
            index_name,
            index_key: key,
            query_vectors,
            query_contents,
            top_k: self.top_k,
            n_probes: self.n_probes,
            greedy: self.greedy,
            filters: self.filter.as_ref(),
            include: &self.include,
        }
    }

    /// Normalize the service reply for this request and drop any fields that
    /// were not asked for.
    pub fn decode_response(&self, wire: Value) -> Result<QueryResponse> {
        let mut response = normalize_response(wire, self.mode())?;
        for item in response.result_sets.iter_mut().flatten() {
            item.retain(&self.include);
        }
        Ok(response)
    }
}

#[derive(Debug, Serialize)]
pub struct WireQuery<'a> {
    index_name: &'a str,
    index_key: &'a EncryptionKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_vectors: Option<WireVectors<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_contents: Option<&'a str>,
    top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    n_probes: Option<u32>,
    greedy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<&'a MetadataFilter>,
    include: &'a [IncludeField],
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireVectors<'a> {
    Single(&'a [f32]),
    Batch(&'a [Vec<f32>]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResultItem {
    pub id: String,
    pub distance: Option<f32>,
    pub metadata: Option<Value>,
    pub vector: Option<Vec<f32>>,
    pub contents: Option<Contents>,
}

impl QueryResultItem {
    fn retain(&mut self, include: &[IncludeField]) {
        if !include.contains(&IncludeField::Distance) {
            self.distance = None;
        }
        if !include.contains(&IncludeField::Metadata) {
            self.metadata = None;
        }
        if !include.contains(&IncludeField::Vector) {
            self.vector = None;
        }
        if !include.contains(&IncludeField::Contents) {
            self.contents = None;
        }
    }
}

#[derive(Deserialize)]
struct WireResultItem {
    id: String,
    #[serde(default)]
    distance: Option<f32>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
    #[serde(default)]
    contents: Option<String>,
}

impl From<WireResultItem> for QueryResultItem {
    fn from(wire: WireResultItem) -> Self {
        Self {
            id: wire.id,
            distance: wire.distance,
            metadata: wire.metadata,
            vector: wire.vector,
            contents: decode_contents(wire.contents),
        }
    }
}

/// One result set per query vector, in input order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResponse {
    pub result_sets: Vec<Vec<QueryResultItem>>,
}

impl QueryResponse {
    pub fn len(&self) -> usize {
        self.result_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result_sets.is_empty()
    }

    pub fn first(&self) -> Option<&[QueryResultItem]> {
        self.result_sets.first().map(Vec::as_slice)
    }

    pub fn into_result_sets(self) -> Vec<Vec<QueryResultItem>> {
        self.result_sets
    }
}

/// Bring a `{"results": ...}` reply into list-of-result-sets shape.
///
/// A flat array is one result set; an array of arrays is one set per entry.
/// Single and text queries must end up with exactly one set, batch queries
/// with one per input vector.
pub fn normalize_response(wire: Value, mode: QueryMode) -> Result<QueryResponse> {
    let results = match wire {
        Value::Object(mut map) => map
            .remove("results")
            .ok_or_else(|| CyborgError::MalformedResponse("missing results".into()))?,
        other => {
            return Err(CyborgError::MalformedResponse(format!(
                "expected object, got {}",
                other
            )))
        }
    };
    let entries = match results {
        Value::Array(entries) => entries,
        other => {
            return Err(CyborgError::MalformedResponse(format!(
                "results must be an array, got {}",
                other
            )))
        }
    };

    let result_sets = if entries.iter().all(|e| !e.is_array()) {
        vec![parse_result_set(entries)?]
    } else {
        let mut sets = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Value::Array(items) => sets.push(parse_result_set(items)?),
                _ => {
                    return Err(CyborgError::MalformedResponse(
                        "results mix result sets and items".into(),
                    ))
                }
            }
        }
        sets
    };

    let expected = mode.expected_result_sets();
    if result_sets.len() != expected {
        return Err(CyborgError::ResultCountMismatch {
            expected,
            actual: result_sets.len(),
        });
    }
    Ok(QueryResponse { result_sets })
}

fn parse_result_set(items: Vec<Value>) -> Result<Vec<QueryResultItem>> {
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value::<WireResultItem>(item)
                .map(QueryResultItem::from)
                .map_err(|e| CyborgError::MalformedResponse(format!("bad result item: {}", e)))
        })
        .collect()
}
