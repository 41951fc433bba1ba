
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use tracing::{debug, info, warn};

use crate::{RagError, Result};

const TABLE_PREFIX: &str = "schemas-";

/// LanceDB table holding the vectors of one build
#[inline]
pub fn table_name_for(build_id: &str) -> String {
    format!("{}{}", TABLE_PREFIX, build_id)
}

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Row position, shared with the metadata lists
    pub position: usize,
    pub table_name: String,
    pub build_id: String,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Flat L2 index over the schema embeddings of one build
///
/// Each build is a separate table inside the same LanceDB directory, so a
/// new build never touches the files of the one being read.
pub struct SchemaVectorIndex {
    table: Table,
    build_id: String,
    dimension: usize,
    rows: usize,
    path: PathBuf,
}

impl std::fmt::Debug for SchemaVectorIndex {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaVectorIndex")
            .field("path", &self.path)
            .field("build_id", &self.build_id)
            .field("dimension", &self.dimension)
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

fn schema_for(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("position", DataType::UInt32, false),
        Field::new("table_name", DataType::Utf8, false),
        Field::new("build_id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension as i32,
            ),
            false,
        ),
    ]))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn uri_for(path: &Path) -> String {
    format!("file://{}", path.display())
}

async fn connect(path: &Path) -> Result<Connection> {
    lancedb::connect(&uri_for(path))
        .execute()
        .await
        .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))
}

async fn list_builds(connection: &Connection) -> Result<Vec<String>> {
    let names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

    Ok(names
        .into_iter()
        .filter_map(|name| name.strip_prefix(TABLE_PREFIX).map(str::to_string))
        .collect())
}

impl SchemaVectorIndex {
    /// Write the vectors of build `build_id` into the LanceDB directory at `path`
    ///
    /// Row `i` is stored with position `i`. All vectors must share one
    /// non-zero dimension.
    #[inline]
    pub async fn create(path: &Path, build_id: &str, entries: &[(String, Vec<f32>)]) -> Result<Self> {
        let dimension = entries.first().map_or(0, |(_, v)| v.len());
        if dimension == 0 {
            return Err(RagError::Embedding(
                "cannot create an index without vectors".to_string(),
            ));
        }
        if let Some((name, vector)) = entries.iter().find(|(_, v)| v.len() != dimension) {
            return Err(RagError::Embedding(format!(
                "vector for {} has dimension {} but {} was expected",
                name,
                vector.len(),
                dimension
            )));
        }

        let mut index = Self::create_empty(path, build_id, dimension).await?;

        let batch = Self::record_batch(schema_for(dimension), build_id, dimension, entries)?;
        let batch_schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), batch_schema);
        index
            .table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert vectors: {}", e)))?;
        index.rows = entries.len();

        info!(
            "Stored {} vectors of dimension {} for build {} at {}",
            entries.len(),
            dimension,
            build_id,
            path.display()
        );

        Ok(index)
    }

    /// Create a zero-row table for build `build_id`
    #[inline]
    pub async fn create_empty(path: &Path, build_id: &str, dimension: usize) -> Result<Self> {
        debug!("Creating LanceDB table for build {} at {}", build_id, path.display());
        let connection = connect(path).await?;

        let table = connection
            .create_empty_table(table_name_for(build_id), schema_for(dimension))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        Ok(Self {
            table,
            build_id: build_id.to_string(),
            dimension,
            rows: 0,
            path: path.to_path_buf(),
        })
    }

    fn record_batch(
        schema: Arc<Schema>,
        build_id: &str,
        dimension: usize,
        entries: &[(String, Vec<f32>)],
    ) -> Result<RecordBatch> {
        let len = entries.len();
        let positions: Vec<u32> = (0..len as u32).collect();
        let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
        let build_ids = vec![build_id; len];

        let mut flat_values = Vec::with_capacity(len * dimension);
        for (_, vector) in entries {
            flat_values.extend_from_slice(vector);
        }
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vectors = FixedSizeListArray::try_new(
            field,
            dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(UInt32Array::from(positions)),
            Arc::new(StringArray::from(names)),
            Arc::new(StringArray::from(build_ids)),
            Arc::new(vectors),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Open the vectors of build `build_id`
    ///
    /// A missing or unreadable directory or table is [`RagError::IndexNotFound`].
    #[inline]
    pub async fn open(path: &Path, build_id: &str) -> Result<Self> {
        let not_found = |reason: String| RagError::IndexNotFound {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_dir() {
            return Err(not_found("vector index is missing".to_string()));
        }

        let connection = lancedb::connect(&uri_for(path))
            .execute()
            .await
            .map_err(|e| not_found(format!("vector index is unreadable: {}", e)))?;

        let table = connection
            .open_table(table_name_for(build_id))
            .execute()
            .await
            .map_err(|e| not_found(format!("vector table is unreadable: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| not_found(format!("vector table schema is unreadable: {}", e)))?;

        let dimension = schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| not_found("vector column is missing".to_string()))?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| not_found(format!("failed to count vectors: {}", e)))?;

        debug!(
            "Opened build {} at {} ({} vectors, dimension {})",
            build_id,
            path.display(),
            rows,
            dimension
        );

        Ok(Self {
            table,
            build_id: build_id.to_string(),
            dimension,
            rows,
            path: path.to_path_buf(),
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Row count as stored on disk
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Exact nearest-neighbour search by squared L2 distance
    ///
    /// Returns at most `k` hits ordered by distance, ties by position.
    #[inline]
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.rows == 0 {
            return Ok(Vec::new());
        }

        // Scan every row so ties at the cutoff resolve by position
        let stream = self
            .table
            .vector_search(query)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::L2)
            .limit(self.rows)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?;

        let mut neighbors = Vec::with_capacity(self.rows);
        for batch in &batches {
            neighbors.extend(Self::parse_neighbors(batch)?);
        }

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);

        debug!("Search returned {} neighbours", neighbors.len());
        Ok(neighbors)
    }

    fn parse_neighbors(batch: &RecordBatch) -> Result<Vec<Neighbor>> {
        let positions = column::<UInt32Array>(batch, "position")?;
        let names = column::<StringArray>(batch, "table_name")?;
        let build_ids = column::<StringArray>(batch, "build_id")?;
        let distances = column::<Float32Array>(batch, "_distance")?;

        Ok((0..batch.num_rows())
            .map(|row| Neighbor {
                position: positions.value(row) as usize,
                table_name: names.value(row).to_string(),
                build_id: build_ids.value(row).to_string(),
                distance: distances.value(row),
            })
            .collect())
    }

    /// Every stored vector, in position order
    #[inline]
    pub async fn reconstruct_all(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to scan vectors: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read vectors: {}", e)))?;

        let mut rows = Vec::with_capacity(self.rows);
        for batch in &batches {
            let positions = column::<UInt32Array>(batch, "position")?;
            let names = column::<StringArray>(batch, "table_name")?;
            let vectors = column::<FixedSizeListArray>(batch, "vector")?;

            for row in 0..batch.num_rows() {
                let values = vectors.value(row);
                let values = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| RagError::Database("Invalid vector item type".to_string()))?;
                rows.push((
                    positions.value(row),
                    names.value(row).to_string(),
                    values.values().to_vec(),
                ));
            }
        }

        rows.sort_by_key(|(position, _, _)| *position);
        Ok(rows
            .into_iter()
            .map(|(_, name, vector)| (name, vector))
            .collect())
    }

    /// Build ids with a vector table in the LanceDB directory at `path`
    #[inline]
    pub async fn builds(path: &Path) -> Result<Vec<String>> {
        if !path.is_dir() {
            return Ok(Vec::new());
        }
        list_builds(&connect(path).await?).await
    }

    /// Drop the vector table of one build, if present
    #[inline]
    pub async fn drop_build(path: &Path, build_id: &str) -> Result<()> {
        let connection = connect(path).await?;
        if !list_builds(&connection).await?.iter().any(|b| b == build_id) {
            return Ok(());
        }

        connection
            .drop_table(table_name_for(build_id))
            .await
            .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        debug!("Dropped vector table of build {}", build_id);
        Ok(())
    }

    /// Drop every build's table except those in `keep`, returning how many were dropped
    #[inline]
    pub async fn prune(path: &Path, keep: &[&str]) -> Result<usize> {
        let connection = connect(path).await?;
        let mut dropped = 0;

        for build_id in list_builds(&connection).await? {
            if keep.contains(&build_id.as_str()) {
                continue;
            }
            match connection.drop_table(table_name_for(&build_id)).await {
                Ok(()) => dropped += 1,
                Err(e) => warn!("Failed to drop vector table of build {}: {}", build_id, e),
            }
        }

        if dropped > 0 {
            info!("Pruned {} superseded vector tables", dropped);
        }
        Ok(dropped)
    }
}
