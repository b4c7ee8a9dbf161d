//! Plain-text extraction for uploaded documents.
//!
//! Office formats are zip archives of XML parts; their text is recovered by
//! stripping markup rather than by a full OOXML parser.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;
use zip::ZipArchive;

use crate::error::DocumentError;

/// Extensions the chat service accepts for upload.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "txt", "md", "pdf", "csv", "xlsx", "docx", "cdr", "json", "pptx",
];

/// A document whose text has been extracted.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub name: String,
    pub content: String,
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

pub fn is_allowed(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Stem used when nothing of the original stem survives sanitizing.
const FALLBACK_STEM: &str = "upload";

fn keep_safe_chars(part: &str) -> String {
    part.chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => Some(c),
            _ => None,
        })
        .collect()
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Directory parts are dropped, spaces become `_`, and anything outside
/// `[A-Za-z0-9._-]` is removed. The extension is kept; a stem with nothing
/// left becomes `upload`. Returns `None` when neither stem nor extension
/// survives.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = Path::new(name.rsplit(['/', '\\']).next().unwrap_or(name));
    let stem = base
        .file_stem()
        .map(|s| keep_safe_chars(&s.to_string_lossy()))
        .unwrap_or_default();
    let stem = stem.trim_start_matches('.');
    let ext = base
        .extension()
        .map(|e| keep_safe_chars(&e.to_string_lossy()))
        .filter(|e| !e.is_empty());

    match (stem.is_empty(), ext) {
        (true, None) => None,
        (true, Some(ext)) => Some(format!("{}.{}", FALLBACK_STEM, ext)),
        (false, Some(ext)) => Some(format!("{}.{}", stem, ext)),
        (false, None) => Some(stem.to_string()),
    }
}

/// Load a document from disk and extract its text by extension.
pub fn load_document(path: &Path) -> Result<LoadedDocument, DocumentError> {
    if !path.exists() {
        return Err(DocumentError::NotFound(path.display().to_string()));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = extension_of(&name).unwrap_or_default();

    let content = match ext.as_str() {
        "txt" | "md" | "csv" => std::fs::read_to_string(path)?,
        "json" | "cdr" => load_call_records(path)?,
        "pdf" => load_pdf(path)?,
        "docx" => load_docx(path)?,
        "pptx" => load_pptx(path)?,
        "xlsx" => load_xlsx(path)?,
        _ => return Err(DocumentError::Unsupported(name)),
    };

    debug!(document = %name, chars = content.len(), "document text extracted");
    Ok(LoadedDocument { name, content })
}

#[derive(Deserialize)]
struct CallRecords {
    #[serde(default)]
    calls: Vec<CallRecord>,
}

#[derive(Deserialize)]
struct CallRecord {
    caller_id: Option<serde_json::Value>,
    receiver_id: Option<serde_json::Value>,
    duration: Option<serde_json::Value>,
}

fn display_value(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => "None".to_string(),
        Some(other) => other.to_string(),
    }
}

fn load_call_records(path: &Path) -> Result<String, DocumentError> {
    let records: CallRecords = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let mut text = String::new();
    for record in &records.calls {
        text.push_str(&format!(
            "Call Record: {} to {}, Duration: {} mins\n",
            display_value(&record.caller_id),
            display_value(&record.receiver_id),
            display_value(&record.duration),
        ));
    }
    Ok(text)
}

fn load_pdf(path: &Path) -> Result<String, DocumentError> {
    let bytes = std::fs::read(path)?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| DocumentError::Pdf(e.to_string()))
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let numeric = entity.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Decode named and numeric character references in one pass, so `&amp;lt;`
/// yields `&lt;`. Unknown references are left as written.
fn decode_xml_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// What a markup tag contributes to the extracted text.
fn tag_break(tag: &str) -> Option<char> {
    let name = tag
        .trim_end_matches('/')
        .split_whitespace()
        .next()
        .unwrap_or("");
    match name {
        "/w:p" | "/a:p" | "w:br" | "a:br" | "w:cr" => Some('\n'),
        "w:tab" => Some('\t'),
        _ => None,
    }
}

/// Strip markup from an OOXML part, keeping paragraph and line breaks.
fn xml_to_text(xml: &str) -> String {
    let mut raw = String::with_capacity(xml.len());
    let mut rest = xml;
    while let Some(open) = rest.find('<') {
        raw.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('>') else {
            rest = "";
            break;
        };
        if let Some(c) = tag_break(&rest[open + 1..open + close]) {
            raw.push(c);
        }
        rest = &rest[open + close + 1..];
    }
    raw.push_str(rest);

    decode_xml_entities(&raw)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, DocumentError> {
    let mut entry = archive.by_name(name)?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Entry names of the form `<prefix><n>.xml`, ordered by `n`.
fn numbered_entries<R: Read + std::io::Seek>(archive: &ZipArchive<R>, prefix: &str) -> Vec<String> {
    let mut entries: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name.strip_prefix(prefix)?.strip_suffix(".xml")?.parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    entries.sort();
    entries.into_iter().map(|(_, name)| name).collect()
}

fn load_docx(path: &Path) -> Result<String, DocumentError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    let mut text = xml_to_text(&xml);
    text.push('\n');
    Ok(text)
}

fn load_pptx(path: &Path) -> Result<String, DocumentError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut text = String::new();
    for slide in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_entry(&mut archive, &slide)?;
        // One line per shape, paragraphs inside a shape joined by newlines.
        for shape in xml.split("</p:sp>") {
            let shape_text = xml_to_text(shape);
            if !shape_text.is_empty() {
                text.push_str(&shape_text);
                text.push('\n');
            }
        }
    }
    Ok(text)
}

fn load_xlsx(path: &Path) -> Result<String, DocumentError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let patterns = SheetPatterns::new()?;

    let shared_strings = match read_entry(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => patterns.shared_strings(&xml),
        Err(DocumentError::Archive(zip::result::ZipError::FileNotFound)) => Vec::new(),
        Err(e) => return Err(e),
    };

    let mut text = String::new();
    for sheet in numbered_entries(&archive, "xl/worksheets/sheet") {
        let xml = read_entry(&mut archive, &sheet)?;
        for row in patterns.rows(&xml, &shared_strings) {
            text.push_str(&row.join("\t"));
            text.push('\n');
        }
    }
    Ok(text)
}

struct SheetPatterns {
    text_run: Regex,
    shared_string: Regex,
    row: Regex,
    cell: Regex,
    value: Regex,
}

impl SheetPatterns {
    fn new() -> Result<Self, DocumentError> {
        Ok(Self {
            text_run: Regex::new(r"(?s)<t(?:\s[^>]*)?>(.*?)</t>")?,
            shared_string: Regex::new(r"(?s)<si>(.*?)</si>")?,
            row: Regex::new(r"(?s)<row\b[^>]*?(?:/>|>(.*?)</row>)")?,
            cell: Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)")?,
            value: Regex::new(r"(?s)<v>(.*?)</v>")?,
        })
    }

    fn text_runs(&self, xml: &str) -> String {
        self.text_run
            .captures_iter(xml)
            .map(|c| decode_xml_entities(&c[1]))
            .collect()
    }

    fn shared_strings(&self, xml: &str) -> Vec<String> {
        self.shared_string
            .captures_iter(xml)
            .map(|c| self.text_runs(&c[1]))
            .collect()
    }

    /// Cell values per row; rows with no non-empty cell are skipped.
    fn rows(&self, xml: &str, shared_strings: &[String]) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        for row in self.row.captures_iter(xml) {
            let Some(body) = row.get(1) else { continue };
            let mut cells = Vec::new();
            for cell in self.cell.captures_iter(body.as_str()) {
                let attrs = &cell[1];
                let inner = cell.get(2).map(|m| m.as_str()).unwrap_or("");
                let raw = self
                    .value
                    .captures(inner)
                    .map(|v| decode_xml_entities(&v[1]))
                    .unwrap_or_default();

                let value = if attrs.contains(r#"t="s""#) {
                    raw.parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i).cloned())
                        .unwrap_or_default()
                } else if attrs.contains(r#"t="inlineStr""#) {
                    self.text_runs(inner)
                } else {
                    raw
                };
                cells.push(value);
            }
            if cells.iter().any(|c| !c.is_empty()) {
                rows.push(cells);
            }
        }
        rows
    }
}
