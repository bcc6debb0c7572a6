use crate::chunking::Chunk;
use crate::config::{self, Lookup};
use crate::embeddings::Embedding;
use crate::error::{RagError, Result};
use log::{debug, info};
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointId, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use uuid::Uuid;

/// Payload key holding the chunk text; every other string key is metadata
const TEXT_KEY: &str = "text";

/// Configuration for Qdrant
#[derive(Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl QdrantConfig {
    pub fn from_lookup(lookup: Lookup) -> Result<Self> {
        Ok(QdrantConfig {
            url: config::string_or(lookup, "QDRANT_URL", "http://localhost:6334"),
            api_key: lookup("QDRANT_API_KEY").filter(|k| !k.is_empty()),
            collection: config::string_or(lookup, "RAG_COLLECTION", "documents"),
        })
    }
}

/// One stored entry: (id, embedding vector, chunk text, metadata map)
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

/// A chunk returned by a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub score: f32,
    pub chunk: Chunk,
}

/// Stores embedded chunks and answers nearest-neighbour queries.
///
/// Append-only: entries are never updated or removed individually.
#[allow(async_fn_in_trait)]
pub trait VectorIndex {
    /// Store chunks with their vectors, returning the generated ids in input order
    async fn insert(&self, chunks: Vec<Chunk>, vectors: Vec<Embedding>) -> Result<Vec<String>>;

    /// Top `k` entries ordered by similarity, closest first
    async fn query(&self, vector: &Embedding, k: usize) -> Result<Vec<ScoredChunk>>;
}

/// Pair chunks with vectors and assign fresh ids.
///
/// Fails without producing anything when the lengths differ or any vector does
/// not have `dimension` components.
pub fn build_entries(
    chunks: Vec<Chunk>,
    vectors: Vec<Embedding>,
    dimension: usize,
) -> Result<Vec<IndexedVector>> {
    if chunks.len() != vectors.len() {
        return Err(RagError::Index(format!(
            "got {} chunks but {} vectors",
            chunks.len(),
            vectors.len()
        )));
    }

    if let Some(bad) = vectors.iter().find(|v| v.dimension() != dimension) {
        return Err(RagError::Index(format!(
            "vector dimension mismatch: expected {}, got {}",
            dimension,
            bad.dimension()
        )));
    }

    Ok(chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, embedding)| IndexedVector {
            id: Uuid::new_v4().to_string(),
            vector: embedding.values,
            text: chunk.text,
            metadata: chunk.metadata,
        })
        .collect())
}

/// Vector index backed by a Qdrant collection
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantIndex {
    /// Create a new Qdrant-backed index for vectors of `dimension` components
    pub fn new(config: QdrantConfig, dimension: usize) -> Result<Self> {
        let builder = Qdrant::from_url(&config.url);
        let builder = if let Some(api_key) = config.api_key {
            builder.api_key(api_key)
        } else {
            builder
        };

        let client = builder
            .build()
            .map_err(|e| RagError::Index(format!("Failed to initialize Qdrant client: {}", e)))?;

        Ok(QdrantIndex {
            client,
            collection: config.collection,
            dimension,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Check if the collection exists
    pub async fn collection_exists(&self) -> Result<bool> {
        self.client
            .collection_exists(self.collection.clone())
            .await
            .map_err(|e| RagError::Index(format!("Failed to check collection existence: {}", e)))
    }

    /// Create the collection (cosine distance) unless it already exists
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.collection_exists().await? {
            debug!("Collection '{}' already exists", self.collection);
            return Ok(());
        }

        let create_collection = CreateCollectionBuilder::new(self.collection.clone())
            .vectors_config(VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine));

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| {
                RagError::Index(format!("Failed to create collection {}: {}", self.collection, e))
            })?;

        info!(
            "Created collection '{}' with {} dimensions",
            self.collection, self.dimension
        );
        Ok(())
    }

    /// Delete the collection and everything stored in it
    pub async fn delete_collection(&self) -> Result<()> {
        self.client
            .delete_collection(self.collection.clone())
            .await
            .map_err(|e| {
                RagError::Index(format!("Failed to delete collection {}: {}", self.collection, e))
            })?;

        info!("Deleted collection '{}'", self.collection);
        Ok(())
    }
}

impl VectorIndex for QdrantIndex {
    async fn insert(&self, chunks: Vec<Chunk>, vectors: Vec<Embedding>) -> Result<Vec<String>> {
        let entries = build_entries(chunks, vectors, self.dimension)?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        let points: Vec<PointStruct> = entries.into_iter().map(to_point).collect();

        // Upsert points in one batch
        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection.clone(), points).wait(true))
            .await
            .map_err(|e| {
                RagError::Index(format!(
                    "Failed to upsert points in collection {}: {}",
                    self.collection, e
                ))
            })?;

        debug!("Stored {} points in '{}'", ids.len(), self.collection);
        Ok(ids)
    }

    async fn query(&self, vector: &Embedding, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let search_request =
            SearchPointsBuilder::new(self.collection.clone(), vector.values.clone(), k as u64)
                .with_payload(true);

        let search_response = self
            .client
            .search_points(search_request)
            .await
            .map_err(|e| {
                RagError::Index(format!("Failed to search collection {}: {}", self.collection, e))
            })?;

        // Convert search results back to chunks; Qdrant returns them closest first
        Ok(search_response
            .result
            .into_iter()
            .filter_map(|point| {
                let chunk = chunk_from_payload(point.payload)?;
                Some(ScoredChunk {
                    id: point.id.map(point_id_to_string).unwrap_or_default(),
                    score: point.score,
                    chunk,
                })
            })
            .collect())
    }
}

fn to_point(entry: IndexedVector) -> PointStruct {
    let mut payload: HashMap<String, Value> = entry
        .metadata
        .into_iter()
        .map(|(key, value)| (key, Value::from(value)))
        .collect();
    payload.insert(TEXT_KEY.to_string(), Value::from(entry.text));

    PointStruct::new(entry.id, entry.vector, payload)
}

/// Rebuild a chunk from a stored payload; points without text are skipped
fn chunk_from_payload(payload: HashMap<String, Value>) -> Option<Chunk> {
    let text = payload.get(TEXT_KEY)?.as_str()?.to_string();

    let metadata = payload
        .iter()
        .filter(|(key, _)| key.as_str() != TEXT_KEY)
        .filter_map(|(key, value)| Some((key.clone(), value.as_str()?.to_string())))
        .collect();

    Some(Chunk { text, metadata })
}

fn point_id_to_string(id: PointId) -> String {
    match id.point_id_options {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}
