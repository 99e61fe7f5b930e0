//! File classification and preview helpers.
//!
//! Everything here is pure: the same input always yields the same output and
//! malformed URLs still produce a best-effort result.

use serde::{Deserialize, Serialize};

/// Viewer used to render office documents in the browser. The raw file URL
/// is appended as the `src` parameter.
pub const OFFICE_VIEWER_URL: &str = "https://view.officeapps.live.com/op/embed.aspx?src=";

const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Pdf,
    Document,
    Spreadsheet,
    Presentation,
    Image,
    Video,
    File,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::Presentation => "presentation",
            Self::Image => "image",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    /// Parse a category label such as the `fileType` reported by the upload
    /// endpoint.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "document" => Some(Self::Document),
            "spreadsheet" => Some(Self::Spreadsheet),
            "presentation" => Some(Self::Presentation),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    /// Office formats that need the external viewer to render.
    pub fn needs_office_viewer(&self) -> bool {
        matches!(self, Self::Document | Self::Spreadsheet | Self::Presentation)
    }
}

/// Payload of the `file preview` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePreview {
    pub url: String,
    pub file_name: String,
    pub file_type: FileCategory,
    pub viewer_url: String,
    pub message_text: String,
}

/// Lowercased extension of the last path element, dot included. Empty when
/// the name has no dot.
pub fn extension(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match base.rfind('.') {
        Some(idx) => base[idx..].to_ascii_lowercase(),
        None => String::new(),
    }
}

pub fn classify_file_type(filename: &str) -> FileCategory {
    match extension(filename).as_str() {
        ".pdf" => FileCategory::Pdf,
        ".doc" | ".docx" => FileCategory::Document,
        ".xls" | ".xlsx" => FileCategory::Spreadsheet,
        ".ppt" | ".pptx" => FileCategory::Presentation,
        ".jpg" | ".jpeg" | ".png" | ".gif" | ".webp" | ".svg" => FileCategory::Image,
        ".mp4" | ".webm" | ".ogg" | ".avi" | ".mov" | ".wmv" | ".flv" | ".mkv" => {
            FileCategory::Video
        }
        _ => FileCategory::File,
    }
}

pub fn is_document_like(filename: &str) -> bool {
    DOCUMENT_EXTENSIONS.contains(&extension(filename).as_str())
}

/// Last path segment of a URL, ignoring query string and fragment.
pub fn file_name_from_url(raw: &str) -> String {
    if let Ok(parsed) = url::Url::parse(raw) {
        if let Some(name) = parsed
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        {
            return name.to_string();
        }
    }

    // Relative or unparsable: strip query/fragment by hand.
    let path = raw.split(['?', '#']).next().unwrap_or(raw);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(raw)
        .to_string()
}

pub fn build_file_preview(url: &str, display_text: &str) -> FilePreview {
    let file_name = file_name_from_url(url);
    let file_type = classify_file_type(&file_name);

    let viewer_url = if file_type.needs_office_viewer() {
        format!("{}{}", OFFICE_VIEWER_URL, url)
    } else {
        url.to_string()
    };

    FilePreview {
        url: url.to_string(),
        file_name,
        file_type,
        viewer_url,
        message_text: display_text.to_string(),
    }
}
