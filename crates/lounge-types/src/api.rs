use serde::{Deserialize, Serialize};

// -- Uploads --

/// Descriptor returned by `POST /upload` and echoed back by clients in the
/// `file-uploaded` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Original name as chosen by the uploader.
    pub file_name: String,
    pub file_url: String,
    /// Category label, see [`crate::files::FileCategory`].
    pub file_type: String,
    pub file_size: u64,
}

// -- Rooms --

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}
