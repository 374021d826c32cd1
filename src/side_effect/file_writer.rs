//! Side effect that writes `{path, content}` entries to disk.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::debug;

use super::SideEffect;
use crate::error::HyvError;
use crate::types::FileContentWithPath;

/// How file content is stored in the message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileEncoding {
    /// Content is the file's text.
    #[default]
    Utf8,
    /// Content is base64, as produced by image adapters.
    Base64,
}

/// Writes every entry of a `files` field below a base directory, creating
/// parent directories as needed.
///
/// Paths must be relative and may not climb out of the base directory.
#[derive(Debug, Clone)]
pub struct FileWriter {
    dir: PathBuf,
    prop: String,
    encoding: FileEncoding,
}

impl FileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prop: "files".to_string(),
            encoding: FileEncoding::Utf8,
        }
    }

    /// React to a field other than `files`.
    pub fn with_prop(mut self, prop: impl Into<String>) -> Self {
        self.prop = prop.into();
        self
    }

    pub fn with_encoding(mut self, encoding: FileEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target(&self, relative: &str) -> Result<PathBuf, HyvError> {
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || escapes {
            return Err(HyvError::InvalidArgument(format!(
                "refusing to write outside {}: `{relative}`",
                self.dir.display()
            )));
        }
        Ok(self.dir.join(path))
    }

    fn decode(&self, file: &FileContentWithPath) -> Result<Vec<u8>, HyvError> {
        match self.encoding {
            FileEncoding::Utf8 => Ok(file.content.clone().into_bytes()),
            FileEncoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(file.content.trim())
                .map_err(|e| {
                    HyvError::InvalidArgument(format!("`{}` is not valid base64: {e}", file.path))
                }),
        }
    }

    async fn write(&self, file: &FileContentWithPath) -> Result<(), HyvError> {
        let target = self.target(&file.path)?;
        let bytes = self.decode(file)?;

        let result = async {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, bytes).await
        }
        .await;

        result.map_err(|e| {
            HyvError::side_effect(
                self.prop.clone(),
                format!("Error writing file at path '{}': {e}", target.display()),
            )
        })?;
        debug!(path = %target.display(), "wrote file");
        Ok(())
    }
}

#[async_trait]
impl SideEffect for FileWriter {
    fn prop(&self) -> &str {
        &self.prop
    }

    async fn run(&self, value: Value) -> Result<(), HyvError> {
        let files: Vec<FileContentWithPath> = serde_json::from_value(value)?;
        try_join_all(files.iter().map(|file| self.write(file))).await?;
        Ok(())
    }
}
