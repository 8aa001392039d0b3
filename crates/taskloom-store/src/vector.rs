use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One point ready for upsert.
#[derive(Debug, Clone)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    /// Flat string → scalar/array/null mapping, already sanitised.
    pub payload: Map<String, Value>,
}

/// Vector store boundary (external collaborator).
///
/// The pipeline needs exactly three capabilities; everything else the
/// store offers is out of scope.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if missing: given vector size, cosine
    /// distance, and a non-zero indexing-thread hint.
    async fn ensure_collection(&self, collection: &str, vector_size: usize) -> Result<()>;

    /// Upsert a batch. `wait` asks the store to block until the batch is
    /// searchable.
    async fn upsert(&self, collection: &str, points: Vec<Point>, wait: bool) -> Result<()>;

    /// Count points whose `field` equals `value`; counts everything when
    /// no filter is given.
    async fn count(&self, collection: &str, filter: Option<(&str, &str)>) -> Result<usize>;
}

/// Qdrant-backed store adapter.
pub struct QdrantStore {
    client: qdrant_client::Qdrant,
    /// Hint forwarded to HNSW index building; must be non-zero or the
    /// store may defer indexing indefinitely.
    max_indexing_threads: u64,
}

impl QdrantStore {
    pub fn connect(url: &str) -> Result<Self> {
        let client = qdrant_client::Qdrant::from_url(url)
            .build()
            .map_err(map_qdrant_error)?;
        Ok(Self {
            client,
            max_indexing_threads: 2,
        })
    }

    pub fn with_indexing_threads(mut self, threads: u64) -> Self {
        self.max_indexing_threads = threads.max(1);
        self
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, collection: &str, vector_size: usize) -> Result<()> {
        use qdrant_client::qdrant::{
            CreateCollectionBuilder, Distance, HnswConfigDiffBuilder, VectorParamsBuilder,
        };

        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(map_qdrant_error)?;
        if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(
                        vector_size as u64,
                        Distance::Cosine,
                    ))
                    .hnsw_config(
                        HnswConfigDiffBuilder::default()
                            .max_indexing_threads(self.max_indexing_threads),
                    ),
            )
            .await
            .map_err(map_qdrant_error)?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>, wait: bool) -> Result<()> {
        use qdrant_client::Payload;
        use qdrant_client::qdrant::{PointStruct, UpsertPointsBuilder};

        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|point| {
                let payload = Payload::try_from(Value::Object(point.payload))
                    .map_err(|err| Error::Validation(format!("payload rejected: {}", err)))?;
                Ok(PointStruct::new(point.id, point.vector, payload))
            })
            .collect::<Result<_>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(wait))
            .await
            .map_err(map_qdrant_error)?;
        Ok(())
    }

    async fn count(&self, collection: &str, filter: Option<(&str, &str)>) -> Result<usize> {
        use qdrant_client::qdrant::{Condition, CountPointsBuilder, Filter};

        let mut builder = CountPointsBuilder::new(collection).exact(true);
        if let Some((field, value)) = filter {
            builder = builder.filter(Filter::must([Condition::matches(
                field,
                value.to_string(),
            )]));
        }

        let response = self.client.count(builder).await.map_err(map_qdrant_error)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}

/// Map transport errors onto HTTP-like statuses so retry policy can tell
/// terminal rejections (400-class) from transient failures.
fn map_qdrant_error(err: qdrant_client::QdrantError) -> Error {
    match &err {
        qdrant_client::QdrantError::ResponseError { status } => {
            // gRPC InvalidArgument (3) is the 400 equivalent
            let code = status.code() as i32;
            let http_status = if code == 3 { Some(400) } else { None };
            Error::store(http_status, status.message().to_string())
        }
        other => Error::store(None, other.to_string()),
    }
}
