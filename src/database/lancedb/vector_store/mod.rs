
use super::{RecordMetadata, StoredRecord};
use crate::documents::Chunk;
use crate::embeddings::EmbeddingVector;
use crate::{RagError, Result, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, Table,
    query::{ExecutableQuery, QueryBase},
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Persistent collection of chunk embeddings backed by a LanceDB table
pub struct VectorStore {
    connection: Connection,
    storage_path: PathBuf,
    collection_name: String,
    dimension: usize,
}

/// A stored chunk returned by similarity search
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub content: String,
    pub metadata: RecordMetadata,
    /// L2 distance to the query; smaller is closer
    pub distance: f32,
}

impl VectorStore {
    /// Open the collection named in the configuration, creating it if needed
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open_or_create(
            config.store_path(),
            &config.store.collection,
            config.embedding.dimension as usize,
        )
        .await
    }

    /// Open or create a collection under `storage_path`
    ///
    /// # Arguments
    /// * `storage_path` - Directory holding the LanceDB data
    /// * `collection_name` - Table name
    /// * `dimension` - Vector length for a newly created collection
    ///
    /// An existing collection keeps the dimension recorded in its schema.
    #[inline]
    pub async fn open_or_create(
        storage_path: impl AsRef<Path>,
        collection_name: &str,
        dimension: usize,
    ) -> Result<Self> {
        let storage_path = storage_path.as_ref().to_path_buf();
        debug!("Initializing LanceDB at path: {:?}", storage_path);

        if dimension == 0 {
            return Err(RagError::StoreInit(
                "Vector dimension must be greater than zero".to_string(),
            ));
        }

        std::fs::create_dir_all(&storage_path).map_err(|e| {
            RagError::StoreInit(format!(
                "Failed to create storage directory {}: {}",
                storage_path.display(),
                e
            ))
        })?;
        let absolute = std::fs::canonicalize(&storage_path).map_err(|e| {
            RagError::StoreInit(format!(
                "Failed to resolve storage directory {}: {}",
                storage_path.display(),
                e
            ))
        })?;

        let uri = format!("file://{}", absolute.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::StoreInit(format!("Failed to connect to LanceDB: {}", e)))?;

        let mut store = Self {
            connection,
            storage_path,
            collection_name: collection_name.to_string(),
            dimension,
        };
        store.initialize_table().await?;

        info!(
            "Vector store '{}' ready ({} dimensions)",
            store.collection_name, store.dimension
        );
        Ok(store)
    }

    async fn initialize_table(&mut self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::StoreInit(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.collection_name) {
            let existing = self.detect_existing_dimension().await?;
            if existing != self.dimension {
                warn!(
                    "Collection '{}' has {} dimensions, configured {}; using {}",
                    self.collection_name, existing, self.dimension, existing
                );
            }
            self.dimension = existing;
            return Ok(());
        }

        info!(
            "Creating collection '{}' with {} dimensions",
            self.collection_name, self.dimension
        );
        self.create_table()
            .await
            .map_err(|e| RagError::StoreInit(format!("{:#}", e)))
    }

    async fn create_table(&self) -> anyhow::Result<()> {
        self.connection
            .create_empty_table(&self.collection_name, self.create_schema())
            .execute()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create table: {}", e))?;
        Ok(())
    }

    /// Read the vector length from the existing table's schema
    async fn detect_existing_dimension(&self) -> Result<usize> {
        let table = self
            .connection
            .open_table(&self.collection_name)
            .execute()
            .await
            .map_err(|e| RagError::StoreInit(format!("Failed to open existing table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::StoreInit(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    if let Ok(size) = usize::try_from(*size) {
                        return Ok(size);
                    }
                }
            }
        }

        Err(RagError::StoreInit(format!(
            "Collection '{}' has no usable vector column",
            self.collection_name
        )))
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("position", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Open the collection table, recreating it empty if it has gone missing
    async fn open_table(&self) -> Result<Table> {
        match self.connection.open_table(&self.collection_name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                warn!(
                    "Collection '{}' is missing; recreating it empty",
                    self.collection_name
                );
                self.create_table()
                    .await
                    .map_err(|e| RagError::Database(format!("{:#}", e)))?;
                self.connection
                    .open_table(&self.collection_name)
                    .execute()
                    .await
                    .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))
            }
            Err(e) => Err(RagError::Database(format!("Failed to open table: {}", e))),
        }
    }

    #[inline]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Append chunks with their embeddings
    ///
    /// # Arguments
    /// * `chunks` - Chunks to store
    /// * `vectors` - One embedding per chunk, in the same order
    ///
    /// Nothing is written unless every vector matches the collection dimension.
    #[inline]
    pub async fn insert(&mut self, chunks: &[Chunk], vectors: &[EmbeddingVector]) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(RagError::InvalidInput(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                vectors.len()
            )));
        }
        if chunks.is_empty() {
            debug!("No embeddings to store");
            return Ok(());
        }

        for vector in vectors {
            self.check_dimension(vector.len())?;
        }

        debug!("Storing batch of {} embeddings", chunks.len());

        let records: Vec<StoredRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| StoredRecord::from_chunk(chunk, vector.clone()))
            .collect();
        let record_batch = self.create_record_batch(&records)?;

        let table = self.open_table().await?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert embeddings: {}", e)))?;

        info!(
            "Stored {} embeddings in '{}'",
            records.len(),
            self.collection_name
        );
        Ok(())
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual == self.dimension {
            Ok(())
        } else {
            Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual,
            })
        }
    }

    fn create_record_batch(&self, records: &[StoredRecord]) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);
        let mut contents = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut positions = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            contents.push(record.content.as_str());
            sources.push(record.metadata.source.as_str());
            positions.push(record.metadata.position);
            created_ats.push(record.metadata.created_at.as_str());
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt32Array::from(positions)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Find the `k` stored chunks nearest to `query_vector`
    ///
    /// Results are ordered by increasing distance. An empty collection or
    /// `k == 0` gives an empty result.
    #[inline]
    pub async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.check_dimension(query_vector.len())?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;
        if rows == 0 {
            debug!("Collection '{}' is empty", self.collection_name);
            return Ok(Vec::new());
        }

        debug!("Searching for {} nearest neighbours", k);

        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = Self::parse_search_results_stream(results).await?;
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", hits.len());
        Ok(hits)
    }

    /// Number of records in the collection
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Remove every record, keeping the collection name and dimension
    #[inline]
    pub async fn clear(&mut self) -> Result<()> {
        warn!("Clearing collection '{}'", self.collection_name);

        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.collection_name) {
            self.connection
                .drop_table(&self.collection_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }

        if let Err(first) = self.create_table().await {
            warn!(
                "Recreating collection '{}' failed, retrying: {:#}",
                self.collection_name, first
            );
            if let Err(e) = self.create_table().await {
                error!(
                    "Collection '{}' was dropped but could not be recreated: {:#}",
                    self.collection_name, e
                );
                return Err(RagError::Database(format!("{:#}", e)));
            }
        }

        info!("Collection '{}' cleared", self.collection_name);
        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let contents = string_column(batch, "content")?;
    let sources = string_column(batch, "source")?;
    let created_ats = string_column(batch, "created_at")?;
    let positions = batch
        .column_by_name("position")
        .ok_or_else(|| RagError::Database("Missing position column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::Database("Invalid position column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .ok_or_else(|| RagError::Database("Missing _distance column".to_string()))?
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| RagError::Database("Invalid _distance column type".to_string()))?;

    (0..batch.num_rows())
        .map(|row| {
            if distances.is_null(row) {
                return Err(RagError::Database(format!("Null distance in result row {}", row)));
            }
            Ok(SearchHit {
                content: contents.value(row).to_string(),
                metadata: RecordMetadata {
                    source: sources.value(row).to_string(),
                    position: positions.value(row),
                    created_at: created_ats.value(row).to_string(),
                },
                distance: distances.value(row),
            })
        })
        .collect()
}
