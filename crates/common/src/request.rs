//! Request input accepted from callers.

use serde::{Deserialize, Serialize};

/// Operating mode tag supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    Review,
    Implement,
    Test,
    Security,
    Optimize,
}

/// A free-form development-assistance request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRequest {
    /// Unique request ID
    #[serde(default = "new_request_id")]
    pub id: String,

    /// Request text as typed by the user
    pub content: String,

    /// Optional mode tag; fixes the intent when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<OperatingMode>,

    /// File the user currently has selected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_file: Option<String>,

    /// Additional selected files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_files: Vec<String>,
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4())
}

impl UserRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: new_request_id(),
            content: content.into(),
            mode: None,
            selected_file: None,
            selected_files: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_mode(mut self, mode: OperatingMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_selected_file(mut self, path: impl Into<String>) -> Self {
        self.selected_file = Some(path.into());
        self
    }

    pub fn with_selected_files(mut self, paths: Vec<String>) -> Self {
        self.selected_files = paths;
        self
    }

    /// Extension of the selected file, lowercased, if any.
    pub fn file_extension(&self) -> Option<String> {
        let path = self
            .selected_file
            .as_deref()
            .or_else(|| self.selected_files.first().map(String::as_str))?;
        std::path::Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(UserRequest::new("a").id, UserRequest::new("b").id);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: UserRequest =
            serde_json::from_str(r#"{"content": "review this", "mode": "review"}"#).unwrap();
        assert!(request.id.starts_with("req_"));
        assert_eq!(request.mode, Some(OperatingMode::Review));
        assert!(request.selected_file.is_none());
        assert!(request.selected_files.is_empty());
    }

    #[test]
    fn test_file_extension_prefers_selected_file() {
        let request = UserRequest::new("x")
            .with_selected_file("src/App.TSX")
            .with_selected_files(vec!["lib.rs".into()]);
        assert_eq!(request.file_extension().as_deref(), Some("tsx"));

        let request = UserRequest::new("x").with_selected_files(vec!["lib.rs".into()]);
        assert_eq!(request.file_extension().as_deref(), Some("rs"));

        assert!(UserRequest::new("x").file_extension().is_none());
    }
}
