//! Candidate enumeration.
//!
//! Both input variants produce a lazy sequence of [`CandidateRecord`]s and
//! apply the skip/reconcile filter before a candidate ever reaches the
//! dispatcher, so documents that are already done cost no HTTP call.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ClientError;
use crate::harvest::HarvestStore;
use crate::hash::sha1_of_file;
use crate::paths::{artifact_path_for, collection_artifact_path, collection_input_path, is_pdf};
use crate::state::{ProcessingStatus, StateStore};

/// In-flight description of one document, owned by a single batch.
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    /// Content hash of the document bytes.
    pub id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Harvester metadata (title, DOI, ...) when the candidate came from a
    /// record store; `None` for plain directory walks.
    pub metadata: Option<Value>,
}

/// Decide whether a candidate still needs processing.
///
/// An annotation artifact already on disk is authoritative evidence of a
/// prior successful run; if the store has no entry for it, the entry is
/// written before skipping so the document stays tracked across resets of
/// unrelated state. Otherwise only a recorded success skips: failures are
/// picked up again by the next run.
pub fn should_process(
    store: &StateStore,
    id: &str,
    artifact: &Path,
) -> Result<bool, ClientError> {
    if artifact.is_file() {
        if store.get(id)?.is_none() {
            debug!(id, "reconciling untracked annotation artifact");
            store.put(id, ProcessingStatus::Success)?;
        }
        return Ok(false);
    }

    match store.get(id)? {
        Some(ProcessingStatus::Success) => Ok(false),
        _ => Ok(true),
    }
}

/// Recursive walk over a directory of PDF documents.
///
/// Walk order is whatever the filesystem yields; resumability never depends
/// on it because skipping is keyed by content hash.
pub struct DirectoryCandidates<'a> {
    walker: walkdir::IntoIter,
    store: &'a StateStore,
}

impl<'a> DirectoryCandidates<'a> {
    pub fn new(root: &Path, store: &'a StateStore) -> Self {
        Self {
            walker: WalkDir::new(root).into_iter(),
            store,
        }
    }

    fn evaluate(&self, path: &Path) -> Result<Option<CandidateRecord>, ClientError> {
        let id = sha1_of_file(path)?;
        let output_path = artifact_path_for(path);
        if !should_process(self.store, &id, &output_path)? {
            return Ok(None);
        }
        Ok(Some(CandidateRecord {
            id,
            input_path: path.to_path_buf(),
            output_path,
            metadata: None,
        }))
    }
}

impl Iterator for DirectoryCandidates<'_> {
    type Item = Result<CandidateRecord, ClientError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err.into())),
            };
            if !entry.file_type().is_file() || !is_pdf(entry.path()) {
                continue;
            }
            match self.evaluate(entry.path()) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Page size for record-store enumeration. Bounds the lifetime of each read
/// transaction on the harvest store.
const PAGE_SIZE: usize = 512;

/// Enumeration over the harvester record store, in identifier order.
pub struct CollectionCandidates<'a> {
    harvest: &'a HarvestStore,
    store: &'a StateStore,
    data_dir: PathBuf,
    buffered: VecDeque<(String, String)>,
    cursor: Option<String>,
    exhausted: bool,
}

impl<'a> CollectionCandidates<'a> {
    pub fn new(harvest: &'a HarvestStore, store: &'a StateStore, data_dir: &Path) -> Self {
        Self {
            harvest,
            store,
            data_dir: data_dir.to_path_buf(),
            buffered: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    fn evaluate(&self, id: String, raw: String) -> Result<Option<CandidateRecord>, ClientError> {
        let input_path = collection_input_path(&self.data_dir, &id);
        let output_path = collection_artifact_path(&self.data_dir, &id);
        if !should_process(self.store, &id, &output_path)? {
            return Ok(None);
        }

        let mut metadata: Value =
            serde_json::from_str(&raw).map_err(|err| ClientError::BadRecord {
                id: id.clone(),
                reason: err.to_string(),
            })?;
        let Some(fields) = metadata.as_object_mut() else {
            return Err(ClientError::BadRecord {
                id,
                reason: "record is not a JSON object".to_string(),
            });
        };
        fields.insert("id".to_string(), Value::String(id.clone()));

        Ok(Some(CandidateRecord {
            id,
            input_path,
            output_path,
            metadata: Some(metadata),
        }))
    }
}

impl Iterator for CollectionCandidates<'_> {
    type Item = Result<CandidateRecord, ClientError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((id, raw)) = self.buffered.pop_front() {
                self.cursor = Some(id.clone());
                match self.evaluate(id, raw) {
                    Ok(Some(record)) => return Some(Ok(record)),
                    Ok(None) => continue,
                    Err(err) => return Some(Err(err)),
                }
            }

            if self.exhausted {
                return None;
            }
            match self.harvest.page_after(self.cursor.as_deref(), PAGE_SIZE) {
                Ok(page) => {
                    if page.len() < PAGE_SIZE {
                        self.exhausted = true;
                    }
                    if page.is_empty() {
                        return None;
                    }
                    self.buffered = page.into();
                }
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err.into()));
                }
            }
        }
    }
}

/// Rebuild candidates for every entry recorded as a failure.
///
/// Metadata is recovered from the harvester record store when one is
/// present in `data_dir`; entries the store no longer knows fall back to
/// identifier-only records with layout-derived paths.
pub fn failed_candidates(
    store: &StateStore,
    data_dir: &Path,
) -> Result<Vec<CandidateRecord>, ClientError> {
    let harvest = HarvestStore::open(data_dir).ok();
    if harvest.is_none() {
        debug!("no harvester record store found, reprocessing with identifier-only records");
    }

    let mut candidates = Vec::new();
    for (id, status) in store.scan()? {
        if status != ProcessingStatus::Failure {
            continue;
        }
        let output_path = collection_artifact_path(data_dir, &id);
        if !should_process(store, &id, &output_path)? {
            continue;
        }

        let metadata = harvest
            .as_ref()
            .and_then(|h| h.get(&id).ok().flatten())
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .and_then(|mut record| {
                let fields = record.as_object_mut()?;
                fields.insert("id".to_string(), Value::String(id.clone()));
                Some(record)
            });

        candidates.push(CandidateRecord {
            input_path: collection_input_path(data_dir, &id),
            output_path,
            id,
            metadata,
        });
    }
    Ok(candidates)
}
