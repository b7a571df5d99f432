//! Path layout for sharded document storage.
//!
//! Collections hold millions of documents keyed by content hash, so files
//! are fanned out under prefix directories instead of one flat directory.

use std::path::{Path, PathBuf};

/// Suffix of annotation result files, appended to the document stem.
pub const ANNOTATION_SUFFIX: &str = ".software.json";

/// Minimum identifier length required to derive a shard path.
const MIN_ID_LEN: usize = 8;

/// Split the first 8 hex characters of an identifier into four
/// 2-character directory levels: `123456789abc` -> `12/34/56/78`.
///
/// # Panics
/// Panics if `id` is shorter than 8 characters.
pub fn shard_path(id: &str) -> PathBuf {
    assert!(
        id.len() >= MIN_ID_LEN,
        "identifier too short ({} chars, need at least {}): '{}'",
        id.len(),
        MIN_ID_LEN,
        id,
    );
    PathBuf::from(&id[..2])
        .join(&id[2..4])
        .join(&id[4..6])
        .join(&id[6..8])
}

/// Location of a collection document under the harvester data directory.
pub fn collection_input_path(data_dir: &Path, id: &str) -> PathBuf {
    data_dir.join(shard_path(id)).join(format!("{id}.pdf"))
}

/// Location of a collection annotation result.
pub fn collection_artifact_path(data_dir: &Path, id: &str) -> PathBuf {
    data_dir
        .join(shard_path(id))
        .join(format!("{id}{ANNOTATION_SUFFIX}"))
}

/// Whether a file name carries the recognized document extension.
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Annotation result path for a directory-walk input: same directory,
/// extension replaced (`paper.pdf` -> `paper.software.json`).
pub fn artifact_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{ANNOTATION_SUFFIX}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_path_splits_prefix() {
        assert_eq!(shard_path("123456789abc"), PathBuf::from("12/34/56/78"));
    }

    #[test]
    #[should_panic(expected = "identifier too short")]
    fn shard_path_panics_on_short_id() {
        shard_path("1234567");
    }

    #[test]
    fn collection_paths_are_sharded() {
        let data = Path::new("/data");
        assert_eq!(
            collection_input_path(data, "abcdef0123456789"),
            PathBuf::from("/data/ab/cd/ef/01/abcdef0123456789.pdf")
        );
        assert_eq!(
            collection_artifact_path(data, "abcdef0123456789"),
            PathBuf::from("/data/ab/cd/ef/01/abcdef0123456789.software.json")
        );
    }

    #[test]
    fn pdf_extension_is_case_insensitive() {
        assert!(is_pdf(Path::new("a/paper.pdf")));
        assert!(is_pdf(Path::new("a/PAPER.PDF")));
        assert!(!is_pdf(Path::new("a/paper.txt")));
        assert!(!is_pdf(Path::new("a/paper")));
    }

    #[test]
    fn artifact_path_replaces_extension_in_place() {
        assert_eq!(
            artifact_path_for(Path::new("/docs/sub/paper.pdf")),
            PathBuf::from("/docs/sub/paper.software.json")
        );
        assert_eq!(
            artifact_path_for(Path::new("/docs/PAPER.PDF")),
            PathBuf::from("/docs/PAPER.software.json")
        );
    }
}
