//! Annotation result storage in MongoDB.
//!
//! The sink is built once at startup when the configuration names a mongo
//! instance and then shared across workers; the driver pools connections
//! internally, so concurrent inserts need no extra coordination here.

use std::path::Path;

use mongodb::bson;
use mongodb::{Client, Collection};
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::MongoConfig;
use crate::error::ClientError;
use crate::paths::ANNOTATION_SUFFIX;

const COLLECTION: &str = "annotations";

/// Insert-only handle on the `annotations` collection.
pub struct AnnotationSink {
    collection: Collection<bson::Document>,
}

impl AnnotationSink {
    pub async fn connect(config: &MongoConfig) -> Result<Self, ClientError> {
        let client = Client::with_uri_str(&config.uri).await?;
        let collection = client.database(&config.database).collection(COLLECTION);
        Ok(Self { collection })
    }

    /// Insert one annotation artifact.
    pub async fn insert(&self, artifact: &Value) -> Result<(), ClientError> {
        let document = bson::to_document(artifact)?;
        let result = self.collection.insert_one(document).await?;
        debug!(inserted_id = %result.inserted_id, "stored annotation");
        Ok(())
    }

    /// Insert every annotation artifact found under `root`.
    ///
    /// Used to backfill a database from result files written by earlier
    /// runs. Returns how many documents were inserted.
    pub async fn load_directory(&self, root: &Path) -> Result<u64, ClientError> {
        let mut inserted = 0u64;
        for entry in WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if !entry
                .file_name()
                .to_string_lossy()
                .ends_with(ANNOTATION_SUFFIX)
            {
                continue;
            }

            let raw = std::fs::read_to_string(entry.path())?;
            let artifact: Value = serde_json::from_str(&raw)?;
            self.insert(&artifact).await?;
            inserted += 1;
        }
        Ok(inserted)
    }
}
