//! # Document Source
//!
//! Flat directory listing for the local document collection. Only regular
//! files with a `.pdf` extension (any case) are returned; subdirectories are
//! not descended into. Results are sorted by filename so runs over the same
//! folder are reproducible.

use crate::types::DocumentFile;
use std::io;
use std::path::Path;

pub fn list_pdf_files(dir: &Path) -> io::Result<Vec<DocumentFile>> {
    let mut documents = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        documents.push(DocumentFile { filename, path });
    }
    documents.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(documents)
}
