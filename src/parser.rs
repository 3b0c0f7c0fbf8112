//! Parser registry and built-in format parsers.
//!
//! A [`DocumentParser`] turns one [`RawInput`] into zero or more
//! [`Document`]s. The [`ParserRegistry`] maps a discriminator (lower-cased
//! file extension or type tag) to a parser; supporting a new format means
//! registering one new entry, existing parsers are never touched.
//!
//! Parsers do not fail: malformed input is logged and yields an empty
//! sequence so the pipeline continues with partial results.

use std::collections::HashMap;
use std::io::Read;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, warn};

use crate::document::{Document, RawInput, RawPayload};
use crate::error::PipelineError;

/// Maximum decompressed bytes read from a single archive entry
/// (zip-bomb protection).
const MAX_ARCHIVE_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Worksheet cap per workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Cell cap per worksheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;

/// Parsing strategy for one format family.
pub trait DocumentParser: Send + Sync + std::fmt::Debug {
    /// Parse one raw input into documents. Implementations must not panic
    /// or error on malformed input; they log and return an empty Vec.
    fn parse(&self, input: &RawInput) -> Vec<Document>;
}

/// Discriminator → parser dispatch table, populated at process start.
#[derive(Debug)]
pub struct ParserRegistry {
    parsers: HashMap<String, Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registry with every built-in format registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("txt", Box::new(TextParser));
        registry.register("md", Box::new(TextParser));
        registry.register("csv", Box::new(CsvParser { delimiter: ',' }));
        registry.register("tsv", Box::new(CsvParser { delimiter: '\t' }));
        registry.register("pdf", Box::new(PdfParser));
        registry.register("docx", Box::new(DocxParser));
        registry.register("xlsx", Box::new(XlsxParser));
        registry.register("html", Box::new(HtmlParser));
        for ext in ["png", "jpg", "jpeg", "tiff", "bmp"] {
            registry.register(ext, Box::new(ImageParser));
        }
        registry
    }

    /// Register a parser for a discriminator, replacing any existing entry.
    pub fn register(&mut self, discriminator: impl Into<String>, parser: Box<dyn DocumentParser>) {
        self.parsers
            .insert(discriminator.into().to_ascii_lowercase(), parser);
    }

    /// Look up the parser for a discriminator. `None` means the format is
    /// unsupported and the input should be skipped.
    pub fn get(&self, discriminator: &str) -> Option<&dyn DocumentParser> {
        self.parsers
            .get(&discriminator.to_ascii_lowercase())
            .map(|p| p.as_ref())
    }

    /// Like [`get`](Self::get), but an unknown discriminator is a
    /// [`PipelineError::UnsupportedFormat`] the caller can count and skip.
    pub fn lookup(
        &self,
        discriminator: &str,
    ) -> std::result::Result<&dyn DocumentParser, PipelineError> {
        self.get(discriminator)
            .ok_or_else(|| PipelineError::UnsupportedFormat {
                discriminator: discriminator.to_string(),
            })
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read an input's content as bytes, logging and returning `None` on I/O
/// failure.
fn read_bytes(input: &RawInput) -> Option<Vec<u8>> {
    match &input.payload {
        RawPayload::File(path) => match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read file, skipping");
                None
            }
        },
        RawPayload::Inline(content) => Some(content.clone().into_bytes()),
    }
}

/// Read an input's content as (lossy) UTF-8 text.
fn read_text(input: &RawInput) -> Option<String> {
    match &input.payload {
        RawPayload::File(path) => match std::fs::read(path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read file, skipping");
                None
            }
        },
        RawPayload::Inline(content) => Some(content.clone()),
    }
}

// ============ Plain text ============

/// Whole-file parser for plain text and Markdown.
#[derive(Debug)]
pub struct TextParser;

impl DocumentParser for TextParser {
    fn parse(&self, input: &RawInput) -> Vec<Document> {
        let Some(content) = read_text(input) else {
            return Vec::new();
        };
        debug!(source = %input.source_id(), "parsed text input");
        vec![Document::new(content, input.metadata.clone())]
    }
}

// ============ Delimited tabular text ============

/// Parser for delimiter-separated tabular files. Rows become lines with
/// fields joined by single spaces; the header row is kept as the first
/// line.
#[derive(Debug)]
pub struct CsvParser {
    pub delimiter: char,
}

impl DocumentParser for CsvParser {
    fn parse(&self, input: &RawInput) -> Vec<Document> {
        let Some(content) = read_text(input) else {
            return Vec::new();
        };
        let text = content
            .lines()
            .map(|line| split_record(line, self.delimiter).join(" "))
            .collect::<Vec<_>>()
            .join("\n");
        vec![Document::new(text, input.metadata.clone())]
    }
}

/// Split one record, honoring double-quoted fields: a delimiter inside
/// quotes is literal and `""` inside a quoted field is an escaped quote.
fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else if c == '"' && field.trim().is_empty() {
            field.clear();
            in_quotes = true;
        } else if c == delimiter {
            fields.push(field.trim().to_string());
            field.clear();
        } else {
            field.push(c);
        }
    }
    fields.push(field.trim().to_string());
    fields
}

// ============ PDF ============

/// PDF parser; all pages concatenated into one document.
#[derive(Debug)]
pub struct PdfParser;

impl DocumentParser for PdfParser {
    fn parse(&self, input: &RawInput) -> Vec<Document> {
        let Some(bytes) = read_bytes(input) else {
            return Vec::new();
        };
        match pdf_extract::extract_text_from_mem(&bytes) {
            Ok(text) => vec![Document::new(text, input.metadata.clone())],
            Err(e) => {
                warn!(source = %input.source_id(), error = %e, "PDF extraction failed, skipping");
                Vec::new()
            }
        }
    }
}

// ============ Word (docx) ============

/// Word document parser: extracts `<w:t>` runs from `word/document.xml`,
/// one line per paragraph.
#[derive(Debug)]
pub struct DocxParser;

impl DocumentParser for DocxParser {
    fn parse(&self, input: &RawInput) -> Vec<Document> {
        let Some(bytes) = read_bytes(input) else {
            return Vec::new();
        };
        match extract_docx(&bytes) {
            Ok(text) => vec![Document::new(text, input.metadata.clone())],
            Err(e) => {
                warn!(source = %input.source_id(), error = %e, "docx extraction failed, skipping");
                Vec::new()
            }
        }
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let xml = read_archive_entry(&mut archive, "word/document.xml")?;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            quick_xml::events::Event::Start(e) if e.local_name().as_ref() == b"t" => {
                if let quick_xml::events::Event::Text(te) = reader.read_event_into(&mut buf)? {
                    out.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            quick_xml::events::Event::End(e) if e.local_name().as_ref() == b"p" => {
                if !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            quick_xml::events::Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

// ============ Excel (xlsx) ============

/// Workbook parser: one document per worksheet, with a `sheet_name`
/// metadata entry. Shared strings are resolved; numeric cell values are
/// kept verbatim.
#[derive(Debug)]
pub struct XlsxParser;

impl DocumentParser for XlsxParser {
    fn parse(&self, input: &RawInput) -> Vec<Document> {
        let Some(bytes) = read_bytes(input) else {
            return Vec::new();
        };
        match extract_xlsx_sheets(&bytes) {
            Ok(sheets) => sheets
                .into_iter()
                .map(|(name, text)| {
                    let mut metadata = input.metadata.clone();
                    metadata.insert("sheet_name".to_string(), name.into());
                    Document::new(text, metadata)
                })
                .collect(),
            Err(e) => {
                warn!(source = %input.source_id(), error = %e, "xlsx extraction failed, skipping");
                Vec::new()
            }
        }
    }
}

fn extract_xlsx_sheets(bytes: &[u8]) -> Result<Vec<(String, String)>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;

    let shared = match read_archive_entry(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => parse_shared_strings(&xml)?,
        // Workbooks with only inline/numeric cells have no sharedStrings part.
        Err(_) => Vec::new(),
    };

    let mut sheet_parts: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    sheet_parts.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut sheets = Vec::new();
    for part in sheet_parts.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_archive_entry(&mut archive, &part)?;
        let text = parse_sheet_cells(&xml, &shared)?;
        let name = part
            .trim_start_matches("xl/worksheets/")
            .trim_end_matches(".xml")
            .to_string();
        sheets.push((name, text));
    }
    Ok(sheets)
}

fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            quick_xml::events::Event::Start(e) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let quick_xml::events::Event::Text(te) = reader.read_event_into(&mut buf)? {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            quick_xml::events::Event::End(e) if e.local_name().as_ref() == b"si" => {
                in_si = false;
            }
            quick_xml::events::Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn parse_sheet_cells(xml: &[u8], shared: &[String]) -> Result<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut cell_is_shared = false;
    loop {
        if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf)? {
            quick_xml::events::Event::Start(e) => {
                if e.local_name().as_ref() == b"c" {
                    cell_is_shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                } else if e.local_name().as_ref() == b"v" {
                    in_value = true;
                }
            }
            quick_xml::events::Event::Text(te) if in_value => {
                let value = te.unescape().unwrap_or_default();
                let value = value.trim();
                if !value.is_empty() {
                    if cell_is_shared {
                        if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared.get(i)) {
                            cells.push(s.clone());
                        }
                    } else {
                        cells.push(value.to_string());
                    }
                }
                in_value = false;
            }
            quick_xml::events::Event::End(e) => {
                if e.local_name().as_ref() == b"v" {
                    in_value = false;
                } else if e.local_name().as_ref() == b"c" {
                    cell_is_shared = false;
                }
            }
            quick_xml::events::Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

fn read_archive_entry(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| anyhow!("archive entry {}: {}", name, e))?;
    let mut out = Vec::new();
    entry
        .take(MAX_ARCHIVE_ENTRY_BYTES)
        .read_to_end(&mut out)
        .with_context(|| format!("reading archive entry {}", name))?;
    if out.len() as u64 >= MAX_ARCHIVE_ENTRY_BYTES {
        return Err(anyhow!("archive entry {} exceeds size limit", name));
    }
    Ok(out)
}

// ============ Raster images ============

/// OCR parser for raster images, shelling out to the `tesseract` CLI.
/// A missing binary or failed extraction degrades to zero documents.
#[derive(Debug)]
pub struct ImageParser;

impl DocumentParser for ImageParser {
    fn parse(&self, input: &RawInput) -> Vec<Document> {
        match ocr_text(input) {
            Ok(text) if !text.trim().is_empty() => {
                vec![Document::new(
                    text.trim().to_string(),
                    input.metadata.clone(),
                )]
            }
            Ok(_) => {
                warn!(source = %input.source_id(), "OCR produced no text, skipping");
                Vec::new()
            }
            Err(e) => {
                warn!(source = %input.source_id(), error = %e, "OCR failed, skipping");
                Vec::new()
            }
        }
    }
}

fn ocr_text(input: &RawInput) -> Result<String> {
    // Tesseract wants a file path; inline payloads are staged through a
    // temporary file.
    let (path, _staged) = match &input.payload {
        RawPayload::File(p) => (p.clone(), None),
        RawPayload::Inline(content) => {
            let file =
                tempfile::NamedTempFile::new().context("failed to stage image for OCR")?;
            std::fs::write(file.path(), content.as_bytes())
                .context("failed to stage image for OCR")?;
            (file.path().to_path_buf(), Some(file))
        }
    };

    let output = std::process::Command::new("tesseract")
        .arg(&path)
        .arg("stdout")
        .output()
        .context("failed to run tesseract")?;
    if !output.status.success() {
        bail!(
            "tesseract failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ============ HTML ============

/// Tag-stripping HTML-to-text parser, used for wiki page bodies stored in
/// HTML markup.
#[derive(Debug)]
pub struct HtmlParser;

impl DocumentParser for HtmlParser {
    fn parse(&self, input: &RawInput) -> Vec<Document> {
        let Some(content) = read_text(input) else {
            return Vec::new();
        };
        vec![Document::new(html_to_text(&content), input.metadata.clone())]
    }
}

/// Strip tags and decode common entities. Block-level closing tags become
/// newlines; `<script>`/`<style>` content is dropped entirely.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        rest = &rest[open..];
        let Some(close) = rest.find('>') else {
            // Unterminated tag: drop the remainder.
            rest = "";
            break;
        };
        let tag = rest[1..close].trim().to_ascii_lowercase();
        rest = &rest[close + 1..];

        // Skip raw-content element bodies.
        for raw in ["script", "style"] {
            if tag == raw || tag.starts_with(&format!("{} ", raw)) {
                let end_tag = format!("</{}", raw);
                if let Some(end) = rest.to_ascii_lowercase().find(&end_tag) {
                    rest = &rest[end..];
                    if let Some(c) = rest.find('>') {
                        rest = &rest[c + 1..];
                    } else {
                        rest = "";
                    }
                } else {
                    rest = "";
                }
            }
        }

        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");
        if matches!(
            name,
            "p" | "div" | "br" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "table"
        ) && !out.ends_with('\n')
            && !out.is_empty()
        {
            out.push('\n');
        }
    }
    out.push_str(rest);

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    // Collapse runs of blank lines and trailing space per line.
    decoded
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
