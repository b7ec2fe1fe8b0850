
use super::{ChunkMetadata, DistanceMetric, EmbeddingRecord};
use crate::{RagError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: Option<usize>,
    placeholder_dimension: usize,
    metric: DistanceMetric,
}

/// A chunk returned by similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk_metadata: ChunkMetadata,
    /// Higher is more similar
    pub similarity_score: f32,
    /// Raw distance reported by the index under the store's metric
    pub distance: f32,
}

impl VectorStore {
    /// Open (or create) the store under the configured persist directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, RagError> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {e}"))
        })?;

        let uri = db_path.to_string_lossy().to_string();

        // Attempt to connect with corruption recovery
        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(&db_path)?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        RagError::Database(format!(
                            "Failed to connect to LanceDB after recovery: {e}"
                        ))
                    })?
                } else {
                    return Err(RagError::Database(format!(
                        "Failed to connect to LanceDB: {e}"
                    )));
                }
            }
        };

        let mut store = Self {
            connection,
            table_name: config.store.collection_name.clone(),
            vector_dimension: None,
            placeholder_dimension: config.embedding.embedding_dimension as usize,
            metric: config.retrieval.distance_metric,
        };

        store.initialize_table_with_recovery().await?;

        info!(
            "Vector store '{}' initialized ({} metric)",
            store.table_name, store.metric
        );
        Ok(store)
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[inline]
    pub fn vector_dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    /// Make sure the table exists and learn its vector dimension
    async fn initialize_table(&mut self) -> Result<(), RagError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {e}")))?;

        if table_names.contains(&self.table_name) {
            debug!("Table already exists, detecting vector dimension");
            match self.detect_existing_vector_dimension().await {
                Ok(dim) => {
                    self.vector_dimension = Some(dim);
                    info!("Detected existing vector dimension: {}", dim);
                }
                Err(e) => {
                    warn!(
                        "Could not detect vector dimension from existing table: {}",
                        e
                    );
                    self.vector_dimension = Some(self.placeholder_dimension);
                }
            }
            return Ok(());
        }

        // The real schema is created once the first batch reveals the
        // embedding width
        info!(
            "Creating table '{}' with placeholder dimension {}",
            self.table_name, self.placeholder_dimension
        );

        let schema = create_schema(self.placeholder_dimension);
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {e}")))?;

        self.vector_dimension = Some(self.placeholder_dimension);
        Ok(())
    }

    async fn detect_existing_vector_dimension(&self) -> Result<usize, RagError> {
        let table = self.open_table().await?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {e}")))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size).map_err(|_| {
                        RagError::Database(format!("Invalid vector dimension: {size}"))
                    });
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    /// Insert or overwrite records by id
    #[inline]
    pub async fn upsert_embeddings(&mut self, records: Vec<EmbeddingRecord>) -> Result<(), RagError> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(());
        }

        let vector_dim = records[0].vector.len();
        if vector_dim == 0 || records.iter().any(|r| r.vector.len() != vector_dim) {
            return Err(RagError::Database(
                "All embeddings in a batch must share a non-zero dimension".to_string(),
            ));
        }

        debug!("Upserting batch of {} embeddings", records.len());

        if self.vector_dimension != Some(vector_dim) {
            info!(
                "Vector dimension changed from {:?} to {}, recreating table",
                self.vector_dimension, vector_dim
            );
            self.recreate_table_with_dimension(vector_dim).await?;
            self.vector_dimension = Some(vector_dim);
        }

        let record_batch = create_record_batch(&records, vector_dim)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| RagError::Database(format!("Failed to upsert embeddings: {e}")))?;

        info!("Stored {} embeddings", records.len());
        Ok(())
    }

    async fn recreate_table_with_dimension(&self, vector_dim: usize) -> Result<(), RagError> {
        self.drop_table_if_exists().await?;

        let schema = create_schema(vector_dim);
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| {
                RagError::Database(format!("Failed to create table with new dimensions: {e}"))
            })?;

        info!(
            "Table recreated successfully with {} dimensions",
            vector_dim
        );
        Ok(())
    }

    /// Find the `limit` entries closest to `query_vector`, most similar
    /// first, optionally restricted to one source
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>, RagError> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if limit == 0 {
            return Ok(Vec::new());
        }

        if self.count_embeddings().await? == 0 {
            debug!("Store is empty, skipping search");
            return Ok(Vec::new());
        }

        if let Some(dim) = self.vector_dimension {
            if dim != query_vector.len() {
                return Err(RagError::Database(format!(
                    "Query vector has {} dimensions but the store holds {}",
                    query_vector.len(),
                    dim
                )));
            }
        }

        let table = self.open_table().await?;

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {e}")))?
            .column("vector")
            .distance_type(self.metric.distance_type())
            .limit(limit);

        if let Some(source) = source_filter {
            query = query.only_if(source_predicate(source));
        }

        let results = query
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {e}")))?;

        let mut search_results = self.parse_search_results_stream(results).await?;
        search_results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        search_results.truncate(limit);

        Ok(search_results)
    }

    async fn parse_search_results_stream(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>, RagError> {
        let mut search_results = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {e}")))?
        {
            search_results.extend(self.parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    fn parse_search_batch(&self, batch: &RecordBatch) -> Result<Vec<SearchResult>, RagError> {
        let sources = string_column(batch, "source")?;
        let titles = string_column(batch, "title")?;
        let contents = string_column(batch, "content")?;
        let created_ats = string_column(batch, "created_at")?;
        let chunk_indices = batch
            .column_by_name("chunk_index")
            .ok_or_else(|| RagError::Database("Missing chunk_index column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| RagError::Database("Invalid chunk_index column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut search_results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let chunk_metadata = ChunkMetadata {
                source: sources.value(row).to_string(),
                title: titles.value(row).to_string(),
                content: contents.value(row).to_string(),
                chunk_index: chunk_indices.value(row),
                created_at: created_ats.value(row).to_string(),
            };

            let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            search_results.push(SearchResult {
                chunk_metadata,
                similarity_score: self.metric.similarity(distance),
                distance,
            });
        }

        Ok(search_results)
    }

    /// Delete all embeddings of one source article
    #[inline]
    pub async fn delete_source_embeddings(&mut self, source: &str) -> Result<usize, RagError> {
        debug!("Deleting embeddings for source: {}", source);

        let before = self.count_for_source(source).await?;
        let table = self.open_table().await?;
        table
            .delete(&source_predicate(source))
            .await
            .map_err(|e| RagError::Database(format!("Failed to delete embeddings: {e}")))?;

        info!("Deleted {} embeddings for source: {}", before, source);
        Ok(before)
    }

    /// Total number of stored embeddings
    #[inline]
    pub async fn count_embeddings(&self) -> Result<usize, RagError> {
        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {e}")))
    }

    /// Number of stored embeddings belonging to `source`
    #[inline]
    pub async fn count_for_source(&self, source: &str) -> Result<usize, RagError> {
        let table = self.open_table().await?;
        table
            .count_rows(Some(source_predicate(source)))
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {e}")))
    }

    /// Compact files and prune old versions after large rewrites
    #[inline]
    pub async fn optimize(&mut self) -> Result<(), RagError> {
        debug!("Optimizing vector database");

        let table = self.open_table().await?;
        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| RagError::Database(format!("Failed to optimize table: {e}")))?;

        info!("Vector database optimization completed");
        Ok(())
    }

    /// True when the table can be listed, opened and counted
    #[inline]
    pub async fn validate_integrity(&self) -> Result<bool, RagError> {
        debug!("Validating database integrity");

        let table_names = match self.connection.table_names().execute().await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list tables during integrity check: {}", e);
                return Ok(false);
            }
        };

        if !table_names.contains(&self.table_name) {
            warn!("Table '{}' missing during integrity check", self.table_name);
            return Ok(false);
        }

        match self.connection.open_table(&self.table_name).execute().await {
            Ok(table) => match table.count_rows(None).await {
                Ok(count) => {
                    debug!("Database integrity check passed, {} rows found", count);
                    Ok(true)
                }
                Err(e) => {
                    error!("Failed to count rows during integrity check: {}", e);
                    Ok(false)
                }
            },
            Err(e) => {
                error!("Failed to open table during integrity check: {}", e);
                Ok(false)
            }
        }
    }

    async fn open_table(&self) -> Result<lancedb::Table, RagError> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {e}")))
    }

    fn attempt_corruption_recovery(db_path: &Path) -> Result<(), RagError> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path).map_err(|e| {
                RagError::Database(format!("Failed to remove corrupted database: {e}"))
            })?;
        }

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {e}"))
        })?;

        info!("Database corruption recovery completed");
        Ok(())
    }

    async fn initialize_table_with_recovery(&mut self) -> Result<(), RagError> {
        match self.initialize_table().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("schema")
                {
                    warn!("Table corruption detected during initialization: {}", e);

                    if let Err(drop_err) = self.drop_table_if_exists().await {
                        warn!("Failed to drop corrupted table: {}", drop_err);
                    }

                    self.initialize_table().await.map_err(|e| {
                        RagError::Database(format!(
                            "Failed to recreate table after corruption: {e}"
                        ))
                    })
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn drop_table_if_exists(&self) -> Result<(), RagError> {
        let table_names = self.connection.table_names().execute().await.map_err(|e| {
            RagError::Database(format!("Failed to list tables for drop: {e}"))
        })?;

        if table_names.contains(&self.table_name) {
            info!("Dropping existing table '{}'", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {e}")))?;
        }

        Ok(())
    }
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                i32::try_from(vector_dim).unwrap_or(i32::MAX),
            ),
            false,
        ),
        Field::new("source", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn create_record_batch(
    records: &[EmbeddingRecord],
    vector_dim: usize,
) -> Result<RecordBatch, RagError> {
    let len = records.len();

    let mut ids = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);
    let mut sources = Vec::with_capacity(len);
    let mut titles = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);

    for record in records {
        ids.push(record.id.as_str());
        flat_values.extend_from_slice(&record.vector);
        sources.push(record.metadata.source.as_str());
        titles.push(record.metadata.title.as_str());
        contents.push(record.metadata.content.as_str());
        chunk_indices.push(record.metadata.chunk_index);
        created_ats.push(record.metadata.created_at.as_str());
    }

    let dim = i32::try_from(vector_dim)
        .map_err(|_| RagError::Database(format!("Vector dimension too large: {vector_dim}")))?;
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, dim, Arc::new(Float32Array::from(flat_values)), None)
            .map_err(|e| RagError::Database(format!("Failed to create vector array: {e}")))?;

    let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(sources)),
        Arc::new(StringArray::from(titles)),
        Arc::new(StringArray::from(contents)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(create_schema(vector_dim), arrays)
        .map_err(|e| RagError::Database(format!("Failed to create record batch: {e}")))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {name} column type")))
}

/// SQL filter matching one source; quotes are doubled
fn source_predicate(source: &str) -> String {
    format!("source = '{}'", source.replace('\'', "''"))
}
