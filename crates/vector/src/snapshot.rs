//! On-disk snapshot of a built store
//!
//! A snapshot directory holds two files:
//! - `metadata.json`: the manifest (provider class, shape, schema, checksum)
//! - `vectors.json`: the columnar table, embeddings stored flat row-major
//!
//! Both files are written into a sibling staging directory that is renamed
//! into place once complete.

use codematch_common::{CodematchError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::types::{is_reserved_column, KnowledgeBase, MetaValue, MetadataSchema};

pub const MANIFEST_FILE: &str = "metadata.json";
pub const TABLE_FILE: &str = "vectors.json";

/// Keys every manifest must carry
pub const REQUIRED_MANIFEST_KEYS: [&str; 5] = [
    "vectoriser_class",
    "vector_shape",
    "num_vectors",
    "created_at",
    "meta_data",
];

/// Snapshot provenance and shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// `Vectoriser::class_name()` of the provider that built the store
    pub vectoriser_class: String,

    /// Embedding dimension
    pub vector_shape: usize,

    /// Row count
    pub num_vectors: usize,

    /// Seconds since the unix epoch
    pub created_at: f64,

    /// Declared metadata columns
    pub meta_data: MetadataSchema,

    /// SHA-256 of the table file, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Manifest {
    pub fn new(vectoriser_class: &str, kb: &KnowledgeBase, schema: &MetadataSchema) -> Self {
        let now = chrono::Utc::now();
        Self {
            vectoriser_class: vectoriser_class.to_string(),
            vector_shape: kb.dimension(),
            num_vectors: kb.len(),
            created_at: now.timestamp_micros() as f64 / 1_000_000.0,
            meta_data: schema.clone(),
            checksum: None,
        }
    }

    /// Parse a manifest, reporting the first missing required key
    pub fn from_json(data: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
            CodematchError::index_build(format!("Manifest is not valid JSON: {}", e))
        })?;

        let object = value
            .as_object()
            .ok_or_else(|| CodematchError::index_build("Manifest must be a JSON object"))?;
        if let Some(key) = REQUIRED_MANIFEST_KEYS
            .iter()
            .find(|key| !object.contains_key(**key))
        {
            return Err(CodematchError::configuration(format!(
                "Metadata file is missing required key: {}",
                key
            ))
            .with_context("key", key));
        }

        let manifest: Self = serde_json::from_value(value)
            .map_err(|e| CodematchError::index_build(format!("Malformed manifest: {}", e)))?;

        if let Some(column) = manifest.meta_data.keys().find(|c| is_reserved_column(c)) {
            return Err(CodematchError::index_build(format!(
                "Manifest declares metadata column '{}', which clashes with a response field",
                column
            ))
            .with_context("column", column));
        }

        Ok(manifest)
    }
}

/// Embedding column, flattened row-major
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingColumn {
    dim: usize,
    values: Vec<f32>,
}

/// Columnar table file; columns are optional on read so a missing one can be named
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotTable {
    id: Option<Vec<String>>,
    text: Option<Vec<String>>,
    uuid: Option<Vec<String>>,
    embeddings: Option<EmbeddingColumn>,
    #[serde(default)]
    meta_data: BTreeMap<String, Vec<MetaValue>>,
}

impl SnapshotTable {
    fn from_knowledge_base(kb: &KnowledgeBase) -> Self {
        Self {
            id: Some(kb.ids.clone()),
            text: Some(kb.texts.clone()),
            uuid: Some(kb.uuids.clone()),
            embeddings: Some(EmbeddingColumn {
                dim: kb.dimension(),
                values: kb.embeddings.iter().copied().collect(),
            }),
            meta_data: kb.metadata.clone(),
        }
    }

    fn into_knowledge_base(self, manifest: &Manifest) -> Result<KnowledgeBase> {
        let ids = required_column(self.id, "id")?;
        let texts = required_column(self.text, "text")?;
        let uuids = required_column(self.uuid, "uuid")?;
        let embeddings = required_column(self.embeddings, "embeddings")?;

        let n_rows = ids.len();
        if n_rows == 0 {
            return Err(CodematchError::index_build("Vectors file is empty"));
        }

        check_column_len("text", texts.len(), n_rows)?;
        check_column_len("uuid", uuids.len(), n_rows)?;

        let mut metadata = BTreeMap::new();
        let mut columns = self.meta_data;
        for (column, dtype) in &manifest.meta_data {
            let values = columns.remove(column).ok_or_else(|| {
                CodematchError::index_build(format!(
                    "Vectors file is missing required column: {}",
                    column
                ))
            })?;
            check_column_len(column, values.len(), n_rows)?;

            let values = values
                .iter()
                .enumerate()
                .map(|(row, v)| {
                    dtype.coerce(v).ok_or_else(|| {
                        CodematchError::index_build(format!(
                            "Column '{}' holds a value that is not {}",
                            column, dtype
                        ))
                        .with_context("row", row)
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            metadata.insert(column.clone(), values);
        }
        if !columns.is_empty() {
            debug!("Ignoring undeclared metadata columns: {:?}", columns.keys());
        }

        if embeddings.dim == 0 || embeddings.values.len() != n_rows * embeddings.dim {
            return Err(CodematchError::index_build(format!(
                "Embedding column holds {} values, expected {} rows of dimension {}",
                embeddings.values.len(),
                n_rows,
                embeddings.dim
            )));
        }
        let embeddings = Array2::from_shape_vec((n_rows, embeddings.dim), embeddings.values)
            .map_err(|e| CodematchError::index_build(format!("Bad embedding shape: {}", e)))?;

        Ok(KnowledgeBase {
            ids,
            texts,
            uuids,
            embeddings,
            metadata,
        })
    }
}

fn required_column<T>(column: Option<T>, name: &str) -> Result<T> {
    column.ok_or_else(|| {
        CodematchError::index_build(format!("Vectors file is missing required column: {}", name))
            .with_context("column", name)
    })
}

fn check_column_len(name: &str, len: usize, expected: usize) -> Result<()> {
    if len != expected {
        return Err(CodematchError::index_build(format!(
            "Column '{}' has {} rows, expected {}",
            name, len, expected
        ))
        .with_context("column", name));
    }
    Ok(())
}

/// Hex encoded SHA-256 of `data`
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Refuse an existing output directory unless overwriting was requested
pub fn check_output_dir(dir: &Path, overwrite: bool) -> Result<()> {
    if dir.exists() && !overwrite {
        return Err(CodematchError::configuration(format!(
            "Output directory {} already exists; pass overwrite to replace it",
            dir.display()
        ))
        .with_context("output_dir", dir.display()));
    }
    if dir.exists() && !dir.is_dir() {
        return Err(CodematchError::configuration(format!(
            "Output path {} is not a directory",
            dir.display()
        ))
        .with_context("output_dir", dir.display()));
    }
    Ok(())
}

/// Sibling path `<parent>/.<name>.<suffix>` next to a snapshot directory
fn sibling_dir(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let name = dir.file_name().ok_or_else(|| {
        CodematchError::configuration(format!(
            "Output path {} does not name a directory",
            dir.display()
        ))
        .with_context("output_dir", dir.display())
    })?;
    let parent = dir.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(format!(".{}.{}", name.to_string_lossy(), suffix)))
}

/// Clear whatever a crashed earlier run left at `path`
async fn remove_stale(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Move a fully written staging directory into place, keeping the previous
/// snapshot until the swap has succeeded
async fn swap_into_place(staging: &Path, dir: &Path) -> Result<()> {
    if !dir.exists() {
        tokio::fs::rename(staging, dir).await?;
        return Ok(());
    }

    warn!("Replacing existing snapshot at {}", dir.display());
    let previous = sibling_dir(dir, "previous")?;
    remove_stale(&previous).await?;
    tokio::fs::rename(dir, &previous).await?;

    if let Err(e) = tokio::fs::rename(staging, dir).await {
        // Put the old snapshot back before reporting
        if let Err(restore) = tokio::fs::rename(&previous, dir).await {
            error!(
                "Could not restore previous snapshot from {}: {}",
                previous.display(),
                restore
            );
        }
        return Err(e.into());
    }

    if let Err(e) = tokio::fs::remove_dir_all(&previous).await {
        warn!("Could not remove old snapshot {}: {}", previous.display(), e);
    }
    Ok(())
}

async fn write_files(staging: &Path, table: &[u8], manifest: &[u8]) -> Result<()> {
    remove_stale(staging).await?;
    tokio::fs::create_dir_all(staging).await?;
    tokio::fs::write(staging.join(TABLE_FILE), table).await?;
    tokio::fs::write(staging.join(MANIFEST_FILE), manifest).await?;
    Ok(())
}

/// Persist a knowledge base into `dir`, returning the manifest with its checksum.
///
/// Files are written to a sibling staging directory which then replaces
/// `dir`; callers check `overwrite` up front. A failed write leaves any
/// existing snapshot untouched.
pub async fn write_snapshot(dir: &Path, kb: &KnowledgeBase, manifest: Manifest) -> Result<Manifest> {
    let in_dir = |e: CodematchError| e.with_context("output_dir", dir.display());

    let table = serde_json::to_vec(&SnapshotTable::from_knowledge_base(kb))
        .map_err(|e| in_dir(e.into()))?;
    let manifest = Manifest {
        checksum: Some(checksum(&table)),
        ..manifest
    };
    let manifest_json = serde_json::to_vec_pretty(&manifest).map_err(|e| in_dir(e.into()))?;

    if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| in_dir(e.into()))?;
    }

    let staging = sibling_dir(dir, "staging")?;
    let written = match write_files(&staging, &table, &manifest_json).await {
        Ok(()) => swap_into_place(&staging, dir).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if staging.is_dir() {
            let _ = tokio::fs::remove_dir_all(&staging).await;
        }
        return Err(in_dir(e).with_context("staging_dir", staging.display()));
    }

    info!(
        "Snapshot written to {} ({} rows, dim {})",
        dir.display(),
        manifest.num_vectors,
        manifest.vector_shape
    );
    Ok(manifest)
}

fn snapshot_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(CodematchError::configuration(format!(
            "{} not found in {}",
            name,
            dir.display()
        ))
        .with_context("snapshot_dir", dir.display()));
    }
    Ok(path)
}

/// Read the manifest only
pub async fn read_manifest(dir: &Path) -> Result<Manifest> {
    if !dir.is_dir() {
        return Err(CodematchError::configuration(format!(
            "Snapshot directory {} does not exist",
            dir.display()
        ))
        .with_context("snapshot_dir", dir.display()));
    }

    let path = snapshot_file(dir, MANIFEST_FILE)?;
    let data = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| CodematchError::from(e).with_context("path", path.display()))?;
    Manifest::from_json(&data).map_err(|e| e.with_context("path", path.display()))
}

/// Read the table of a snapshot whose manifest was already read and checked
pub async fn read_table(dir: &Path, manifest: &Manifest) -> Result<KnowledgeBase> {
    let path = snapshot_file(dir, TABLE_FILE)?;
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| CodematchError::from(e).with_context("path", path.display()))?;

    match &manifest.checksum {
        Some(expected) => {
            let actual = checksum(&data);
            if &actual != expected {
                return Err(CodematchError::index_build(
                    "Vectors file checksum does not match the manifest",
                )
                .with_context("expected", expected)
                .with_context("actual", actual));
            }
        }
        None => debug!("Manifest carries no checksum, skipping verification"),
    }

    let table: SnapshotTable = serde_json::from_slice(&data).map_err(|e| {
        CodematchError::index_build(format!("Vectors file is malformed: {}", e))
            .with_context("path", path.display())
    })?;
    let kb = table.into_knowledge_base(manifest)?;

    if kb.len() != manifest.num_vectors {
        return Err(CodematchError::index_build(format!(
            "Vectors file holds {} rows, manifest says {}",
            kb.len(),
            manifest.num_vectors
        )));
    }
    if kb.dimension() != manifest.vector_shape {
        return Err(CodematchError::index_build(format!(
            "Vectors have dimension {}, manifest says {}",
            kb.dimension(),
            manifest.vector_shape
        )));
    }

    Ok(kb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnType, CorpusRecord};
    use ndarray::array;

    fn knowledge_base() -> (KnowledgeBase, MetadataSchema) {
        let mut schema = MetadataSchema::new();
        schema.insert("level".to_string(), ColumnType::Int);
        let records = vec![
            CorpusRecord::new("1111", "nurse").with_meta("level", MetaValue::Int(3)),
            CorpusRecord::new("2222", "baker").with_meta("level", MetaValue::Int(1)),
        ];
        let kb = KnowledgeBase::from_records(records, array![[1.0, 0.0], [0.0, 1.0]], &schema);
        (kb, schema)
    }

    #[test]
    fn test_manifest_missing_key() {
        let err = Manifest::from_json(
            r#"{"vectoriser_class": "X", "vector_shape": 2, "num_vectors": 1, "created_at": 1.0}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "configuration_error");
        assert_eq!(err.context().unwrap().get("key").unwrap(), "meta_data");
    }

    #[test]
    fn test_manifest_reserved_column_is_rejected() {
        let err = Manifest::from_json(
            r#"{"vectoriser_class": "X", "vector_shape": 2, "num_vectors": 1,
                "created_at": 1.0, "meta_data": {"rank": "int"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "index_build_error");
        assert_eq!(err.context().unwrap().get("column").unwrap(), "rank");
    }

    #[test]
    fn test_manifest_json_keys() {
        let (kb, schema) = knowledge_base();
        let manifest = Manifest::new("MockVectoriser", &kb, &schema);
        let json = serde_json::to_value(&manifest).unwrap();

        assert_eq!(json["vectoriser_class"], "MockVectoriser");
        assert_eq!(json["vector_shape"], 2);
        assert_eq!(json["num_vectors"], 2);
        assert_eq!(json["meta_data"]["level"], "int");
        assert!(json["created_at"].as_f64().unwrap() > 0.0);
        assert!(json.get("checksum").is_none());
    }

    #[test]
    fn test_check_output_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(check_output_dir(&tmp.path().join("new"), false).is_ok());

        let err = check_output_dir(tmp.path(), false).unwrap_err();
        assert_eq!(err.code(), "configuration_error");
        assert!(check_output_dir(tmp.path(), true).is_ok());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("store");
        let (kb, schema) = knowledge_base();

        let manifest = write_snapshot(&dir, &kb, Manifest::new("MockVectoriser", &kb, &schema))
            .await
            .unwrap();
        assert!(manifest.checksum.is_some());
        assert!(!tmp.path().join(".store.staging").exists());

        let read = read_manifest(&dir).await.unwrap();
        assert_eq!(read, manifest);

        let loaded = read_table(&dir, &read).await.unwrap();
        assert_eq!(loaded.ids, kb.ids);
        assert_eq!(loaded.uuids, kb.uuids);
        assert_eq!(loaded.embeddings, kb.embeddings);
        assert_eq!(loaded.metadata, kb.metadata);
    }

    #[tokio::test]
    async fn test_tampered_table_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("store");
        let (kb, schema) = knowledge_base();
        let manifest = write_snapshot(&dir, &kb, Manifest::new("MockVectoriser", &kb, &schema))
            .await
            .unwrap();

        let table_path = dir.join(TABLE_FILE);
        let data = std::fs::read_to_string(&table_path).unwrap();
        std::fs::write(&table_path, data.replace("nurse", "nurze")).unwrap();

        let err = read_table(&dir, &manifest).await.unwrap_err();
        assert_eq!(err.code(), "index_build_error");
        assert!(err.to_string().contains("checksum"));
    }

    #[tokio::test]
    async fn test_missing_column_is_named() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let (kb, schema) = knowledge_base();
        let manifest = Manifest::new("MockVectoriser", &kb, &schema);

        let table = serde_json::json!({
            "id": ["1111", "2222"],
            "text": ["nurse", "baker"],
            "embeddings": {"dim": 2, "values": [1.0, 0.0, 0.0, 1.0]},
            "meta_data": {"level": [3, 1]}
        });
        std::fs::write(dir.join(TABLE_FILE), table.to_string()).unwrap();

        let err = read_table(dir, &manifest).await.unwrap_err();
        assert_eq!(err.code(), "index_build_error");
        assert!(err.to_string().contains("uuid"));
    }

    #[tokio::test]
    async fn test_missing_directory_is_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_manifest(&tmp.path().join("absent")).await.unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }
}
