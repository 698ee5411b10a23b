//! # File Index
//!
//! A one-shot lookup structure over the local document collection. Each file
//! is annotated with the same derived fields as a parsed citation (token set
//! plus optional year) so both sides of a comparison are symmetric. The index
//! is built once per run and read-only afterward.

use crate::citation::{extract_year, normalize_tokens};
use crate::types::{DocumentFile, IndexedFile};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    files: Vec<IndexedFile>,
}

impl FileIndex {
    /// Builds the index from a document listing. The filename is tokenized
    /// with its extension stripped, so `Smith_2019_Neural_Networks.pdf`
    /// indexes as the tokens of `Smith_2019_Neural_Networks`.
    pub fn build(documents: &[DocumentFile]) -> Self {
        let files = documents
            .iter()
            .map(|doc| {
                let stem = Path::new(&doc.filename)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(&doc.filename);
                IndexedFile {
                    path: doc.path.clone(),
                    tokens: normalize_tokens(stem),
                    year: extract_year(stem),
                }
            })
            .collect();
        Self { files }
    }

    pub fn files(&self) -> &[IndexedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
