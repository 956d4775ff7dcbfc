use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use anyhow::Context;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Main document part of a WordprocessingML package.
pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

/// Fully buffered zip container. Reading never touches the caller's bytes again and
/// writing always produces a fresh buffer.
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).context("read zip")?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .with_context(|| format!("read zip entry: {}", file.name()))?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn main_document(&self) -> anyhow::Result<&DocxEntry> {
        self.entry(MAIN_DOCUMENT_PART)
            .with_context(|| format!("missing part: {MAIN_DOCUMENT_PART}"))
    }

    pub fn to_bytes_with_replacements(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<Vec<u8>> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(ent.name.as_str(), opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        let cursor = zout.finish().context("finish zip")?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{DocxPackage, MAIN_DOCUMENT_PART};
    use crate::docx::testutil::{build_docx, paragraph};

    #[test]
    fn rewrite_keeps_entry_order_and_replaces_named_part() {
        let bytes = build_docx(&paragraph(&["hello"]));
        let pkg = DocxPackage::from_bytes(&bytes).expect("read");
        let names: Vec<String> = pkg.entries.iter().map(|e| e.name.clone()).collect();

        let mut replacements = HashMap::new();
        replacements.insert(MAIN_DOCUMENT_PART.to_string(), b"<x/>".to_vec());
        let out = pkg.to_bytes_with_replacements(&replacements).expect("write");

        let back = DocxPackage::from_bytes(&out).expect("reread");
        let back_names: Vec<String> = back.entries.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, back_names);
        assert_eq!(back.main_document().expect("main").data, b"<x/>");
    }

    #[test]
    fn garbage_is_not_a_package() {
        assert!(DocxPackage::from_bytes(b"not a zip").is_err());
    }
}
