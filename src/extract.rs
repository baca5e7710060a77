//! Multi-format text extraction for uploaded documents.
//!
//! Dispatches on the declared MIME type and returns plain UTF-8 text.
//! Extraction is pure — no network calls; the image branch reads embedded
//! metadata only (dimensions and format, a placeholder for future OCR).

use std::io::Read;

use crate::error::IngestError;

/// Supported MIME types for extraction.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_CSV: &str = "text/csv";
/// Legacy Excel label; browsers commonly attach it to CSV exports.
pub const MIME_XLS: &str = "application/vnd.ms-excel";

/// Maximum sheets to process in an xlsx workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extracts plain text from an upload's raw bytes.
///
/// Returns [`IngestError::UnsupportedFormat`] for MIME types outside the
/// supported set and [`IngestError::Extraction`] when a parser fails on a
/// supported type.
pub fn extract_text(bytes: &[u8], mime_type: &str) -> Result<String, IngestError> {
    match mime_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_XLSX => extract_xlsx(bytes),
        MIME_CSV | MIME_XLS => extract_csv(bytes),
        t if t.starts_with("image/") => extract_image_metadata(bytes),
        t if t.starts_with("text/") => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(IngestError::UnsupportedFormat {
            mime_type: other.to_string(),
        }),
    }
}

/// Whether `extract_text` would accept this MIME type at all. Used by the
/// upload boundary to reject disallowed types before any work begins.
pub fn is_supported(mime_type: &str) -> bool {
    matches!(mime_type, MIME_PDF | MIME_DOCX | MIME_XLSX | MIME_CSV | MIME_XLS)
        || mime_type.starts_with("text/")
        || mime_type.starts_with("image/")
}

fn extract_pdf(bytes: &[u8]) -> Result<String, IngestError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| IngestError::Extraction(e.to_string()))
}

fn extract_csv(bytes: &[u8]) -> Result<String, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| IngestError::Extraction(e.to_string()))?;
        lines.push(record.iter().collect::<Vec<_>>().join("\t"));
    }
    Ok(lines.join("\n"))
}

/// Descriptive metadata for images: dimensions and format only.
fn extract_image_metadata(bytes: &[u8]) -> Result<String, IngestError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| IngestError::Extraction(format!("image decode failed: {}", e)))?;
    let format = image::guess_format(bytes)
        .map(|f| format!("{:?}", f).to_lowercase())
        .unwrap_or_else(|_| "unknown".to_string());
    Ok(format!(
        "Image {}x{} ({})",
        img.width(),
        img.height(),
        format
    ))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, IngestError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| IngestError::Extraction(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| IngestError::Extraction(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(IngestError::Extraction(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, IngestError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| IngestError::Extraction(e.to_string()))?;
    let has_document = archive.by_name("word/document.xml").is_ok();
    if !has_document {
        return Err(IngestError::Extraction(
            "word/document.xml not found".to_string(),
        ));
    }
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    extract_text_runs(&doc_xml)
}

/// Collect `<w:t>` text runs, inserting a line break at each paragraph end.
fn extract_text_runs(xml: &[u8]) -> Result<String, IngestError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"p" => {
                        if !out.ends_with('\n') && !out.is_empty() {
                            out.push('\n');
                        }
                    }
                    _ => {}
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(IngestError::Extraction(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// Concatenate all worksheets as tab-separated cells and newline-separated
/// rows; sheets are joined with a blank line.
fn extract_xlsx(bytes: &[u8]) -> Result<String, IngestError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| IngestError::Extraction(e.to_string()))?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_names = list_worksheet_names(&archive);
    let mut sheets = Vec::new();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = extract_sheet_rows(&sheet_xml, &shared_strings)?;
        if !text.is_empty() {
            sheets.push(text);
        }
    }
    Ok(sheets.join("\n\n"))
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, IngestError> {
    // Workbooks with no string cells omit the entry entirely.
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                    current.clear();
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_si => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(IngestError::Extraction(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Walk one worksheet's XML, emitting rows of tab-joined cell values.
/// Shared-string cells are resolved through the workbook string table;
/// inline numeric values are emitted as-is.
fn extract_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, IngestError> {
    let mut rows: Vec<String> = Vec::new();
    let mut current_row: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut cell_is_shared = false;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => current_row.clear(),
                b"c" => {
                    cell_is_shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" => in_value = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if !value.is_empty() {
                    if cell_is_shared {
                        if let Ok(i) = value.parse::<usize>() {
                            if let Some(s) = shared_strings.get(i) {
                                current_row.push(s.clone());
                                cell_count += 1;
                            }
                        }
                    } else {
                        current_row.push(value.to_string());
                        cell_count += 1;
                    }
                }
                in_value = false;
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"c" => cell_is_shared = false,
                b"row" => {
                    if !current_row.is_empty() {
                        rows.push(current_row.join("\t"));
                        current_row.clear();
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(IngestError::Extraction(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows.join("\n"))
}
