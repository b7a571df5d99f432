//! Per-document annotation pipeline.
//!
//! One invocation is one service call (plus overload retries), at most one
//! artifact write, at most one database insert, and exactly one state store
//! entry. Service failures are absorbed here and recorded as a failure
//! entry; they never reach the dispatcher, so one bad document cannot take
//! down its batch.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ServiceError, StoreError};
use crate::mongo::AnnotationSink;
use crate::service::AnnotationService;
use crate::sources::CandidateRecord;
use crate::state::{ProcessingStatus, StateStore};

pub struct Annotator {
    service: AnnotationService,
    store: Arc<StateStore>,
    sink: Option<AnnotationSink>,
}

impl Annotator {
    pub fn new(
        service: AnnotationService,
        store: Arc<StateStore>,
        sink: Option<AnnotationSink>,
    ) -> Self {
        Self {
            service,
            store,
            sink,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Annotate one candidate and durably record the terminal outcome.
    ///
    /// Only a state store failure propagates: without durable tracking the
    /// rest of the run would reprocess everything, so the run must stop.
    pub async fn process(&self, record: &CandidateRecord) -> Result<ProcessingStatus, StoreError> {
        let status = match self.annotate(record).await {
            Ok(()) => ProcessingStatus::Success,
            Err(err) => {
                warn!(
                    id = %record.id,
                    input = %record.input_path.display(),
                    error = %err,
                    "annotation failed"
                );
                ProcessingStatus::Failure
            }
        };
        self.store.put(&record.id, status)?;
        Ok(status)
    }

    async fn annotate(&self, record: &CandidateRecord) -> Result<(), ClientError> {
        let body = self.service.annotate_pdf(&record.input_path).await?;
        let Some(mentions) = body.get("mentions").and_then(Value::as_array) else {
            return Err(ServiceError::MalformedResponse(
                "response carries no mentions array".to_string(),
            )
            .into());
        };

        // A clean answer with nothing found is still a completed document;
        // no artifact is written for it.
        if mentions.is_empty() {
            debug!(id = %record.id, "no software mentions found");
            return Ok(());
        }

        let count = mentions.len();
        let artifact = build_artifact(body, record);
        if let Some(parent) = record.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&record.output_path, serde_json::to_string(&artifact)?)?;

        if let Some(sink) = &self.sink {
            sink.insert(&artifact).await?;
        }

        info!(id = %record.id, mentions = count, "annotated");
        Ok(())
    }
}

/// Merge tracking fields into the service response.
///
/// The harvester metadata is only attached when the record carries more
/// than the bare identifier.
fn build_artifact(mut body: Value, record: &CandidateRecord) -> Value {
    if let Some(fields) = body.as_object_mut() {
        fields.insert("id".to_string(), Value::String(record.id.clone()));
        if let Some(metadata) = &record.metadata {
            if metadata.as_object().is_some_and(|m| m.len() > 1) {
                fields.insert("metadata".to_string(), metadata.clone());
            }
        }
        fields.insert(
            "original_file_path".to_string(),
            Value::String(record.input_path.to_string_lossy().into_owned()),
        );
        fields.insert(
            "file_name".to_string(),
            Value::String(
                record
                    .input_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
        );
    }
    body
}
