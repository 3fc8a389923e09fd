use crate::defaults::DEFAULT_N_LISTS;
use crate::errors::{CyborgError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

const TAG_FIELD: &str = "type";
const IVF_TAG: &str = "ivf";
const IVF_FLAT_TAG: &str = "ivfflat";
const IVF_PQ_TAG: &str = "ivfpq";

const IVF_FIELDS: &[&str] = &["dimension", "metric", "n_lists"];
const IVF_PQ_FIELDS: &[&str] = &["dimension", "metric", "n_lists", "pq_dim", "pq_bits"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Cosine,
    InnerProduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::InnerProduct => "inner_product",
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = CyborgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            "inner_product" => Ok(DistanceMetric::InnerProduct),
            other => Err(CyborgError::InvalidConfig(format!(
                "unsupported metric: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index creation parameters. Fixed once the index exists; changing them
/// means deleting and recreating the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexConfig {
    Ivf {
        dimension: u32,
        metric: DistanceMetric,
        n_lists: u32,
    },
    IvfFlat {
        dimension: u32,
        metric: DistanceMetric,
        n_lists: u32,
    },
    IvfPq {
        dimension: u32,
        metric: DistanceMetric,
        n_lists: u32,
        pq_dim: u32,
        pq_bits: u32,
    },
}

impl IndexConfig {
    pub fn ivf(dimension: u32) -> Self {
        IndexConfig::Ivf {
            dimension,
            metric: DistanceMetric::default(),
            n_lists: DEFAULT_N_LISTS,
        }
    }

    pub fn ivf_flat(dimension: u32) -> Self {
        IndexConfig::IvfFlat {
            dimension,
            metric: DistanceMetric::default(),
            n_lists: DEFAULT_N_LISTS,
        }
    }

    pub fn ivfpq(dimension: u32, pq_dim: u32, pq_bits: u32) -> Self {
        IndexConfig::IvfPq {
            dimension,
            metric: DistanceMetric::default(),
            n_lists: DEFAULT_N_LISTS,
            pq_dim,
            pq_bits,
        }
    }

    pub fn with_metric(mut self, value: DistanceMetric) -> Self {
        match &mut self {
            IndexConfig::Ivf { metric, .. }
            | IndexConfig::IvfFlat { metric, .. }
            | IndexConfig::IvfPq { metric, .. } => *metric = value,
        }
        self
    }

    pub fn with_n_lists(mut self, value: u32) -> Self {
        match &mut self {
            IndexConfig::Ivf { n_lists, .. }
            | IndexConfig::IvfFlat { n_lists, .. }
            | IndexConfig::IvfPq { n_lists, .. } => *n_lists = value,
        }
        self
    }

    /// Wire discriminant for this variant.
    pub fn index_type(&self) -> &'static str {
        match self {
            IndexConfig::Ivf { .. } => IVF_TAG,
            IndexConfig::IvfFlat { .. } => IVF_FLAT_TAG,
            IndexConfig::IvfPq { .. } => IVF_PQ_TAG,
        }
    }

    pub fn dimension(&self) -> u32 {
        match self {
            IndexConfig::Ivf { dimension, .. }
            | IndexConfig::IvfFlat { dimension, .. }
            | IndexConfig::IvfPq { dimension, .. } => *dimension,
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        match self {
            IndexConfig::Ivf { metric, .. }
            | IndexConfig::IvfFlat { metric, .. }
            | IndexConfig::IvfPq { metric, .. } => *metric,
        }
    }

    pub fn n_lists(&self) -> u32 {
        match self {
            IndexConfig::Ivf { n_lists, .. }
            | IndexConfig::IvfFlat { n_lists, .. }
            | IndexConfig::IvfPq { n_lists, .. } => *n_lists,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension() == 0 {
            return Err(CyborgError::InvalidConfig("dimension must be > 0".into()));
        }
        if self.n_lists() == 0 {
            return Err(CyborgError::InvalidConfig("n_lists must be > 0".into()));
        }
        if let IndexConfig::IvfPq {
            dimension,
            pq_dim,
            pq_bits,
            ..
        } = self
        {
            if *pq_dim == 0 {
                return Err(CyborgError::InvalidConfig("pq_dim must be > 0".into()));
            }
            if *pq_bits == 0 {
                return Err(CyborgError::InvalidConfig("pq_bits must be > 0".into()));
            }
            if pq_dim > dimension {
                return Err(CyborgError::InvalidConfig(format!(
                    "pq_dim ({}) must not exceed dimension ({})",
                    pq_dim, dimension
                )));
            }
        }
        Ok(())
    }

    /// Encode as the wire map: the `type` tag plus exactly the fields of the
    /// active variant.
    pub fn to_wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(TAG_FIELD.into(), Value::from(self.index_type()));
        map.insert("dimension".into(), Value::from(self.dimension()));
        map.insert("metric".into(), Value::from(self.metric().as_str()));
        map.insert("n_lists".into(), Value::from(self.n_lists()));
        if let IndexConfig::IvfPq { pq_dim, pq_bits, .. } = self {
            map.insert("pq_dim".into(), Value::from(*pq_dim));
            map.insert("pq_bits".into(), Value::from(*pq_bits));
        }
        map
    }

    /// Strict decode of a wire map.
    ///
    /// A payload without a `type` tag is read as IVF. Fields not declared for
    /// the resolved variant are rejected, as are missing required fields.
    pub fn from_wire(map: &Map<String, Value>) -> Result<Self> {
        let tag = match map.get(TAG_FIELD) {
            None | Some(Value::Null) => IVF_TAG.to_string(),
            Some(Value::String(s)) => s.to_lowercase(),
            Some(other) => return Err(CyborgError::InvalidDiscriminant(other.to_string())),
        };

        let allowed = match tag.as_str() {
            IVF_TAG | IVF_FLAT_TAG => IVF_FIELDS,
            IVF_PQ_TAG => IVF_PQ_FIELDS,
            _ => return Err(CyborgError::InvalidDiscriminant(tag)),
        };

        if let Some(unknown) = map
            .keys()
            .find(|k| k.as_str() != TAG_FIELD && !allowed.contains(&k.as_str()))
        {
            return Err(CyborgError::UnknownField(unknown.clone()));
        }

        let dimension = required_u32(map, "dimension")?;
        let metric = required_metric(map)?;
        let n_lists = required_u32(map, "n_lists")?;

        let config = match tag.as_str() {
            IVF_TAG => IndexConfig::Ivf {
                dimension,
                metric,
                n_lists,
            },
            IVF_FLAT_TAG => IndexConfig::IvfFlat {
                dimension,
                metric,
                n_lists,
            },
            _ => IndexConfig::IvfPq {
                dimension,
                metric,
                n_lists,
                pq_dim: required_u32(map, "pq_dim")?,
                pq_bits: required_u32(map, "pq_bits")?,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn required<'a>(map: &'a Map<String, Value>, name: &str) -> Result<&'a Value> {
    match map.get(name) {
        None | Some(Value::Null) => Err(CyborgError::MissingRequiredField(name.to_string())),
        Some(value) => Ok(value),
    }
}

fn required_u32(map: &Map<String, Value>, name: &str) -> Result<u32> {
    required(map, name)?
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            CyborgError::InvalidConfig(format!("{} must be a non-negative 32-bit integer", name))
        })
}

fn required_metric(map: &Map<String, Value>) -> Result<DistanceMetric> {
    required(map, "metric")?
        .as_str()
        .ok_or_else(|| CyborgError::InvalidConfig("metric must be a string".into()))?
        .parse()
}

impl TryFrom<Value> for IndexConfig {
    type Error = CyborgError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => IndexConfig::from_wire(&map),
            other => Err(CyborgError::InvalidConfig(format!(
                "index config must be an object, got {}",
                other
            ))),
        }
    }
}

impl Serialize for IndexConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IndexConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        IndexConfig::try_from(value).map_err(serde::de::Error::custom)
    }
}
