//! Disk tools: draft file write/read and directory listing.
//!
//! All file access is confined to fixed folders under the data root
//! (`drafts` for written files; `plots` and `data` are listable). The
//! model supplies bare filenames, never paths.

use crate::tools::core::{Tool, ToolFuture};
use crate::{ToolDef, json_schema_for};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Folders the model is allowed to list.
pub const ALLOWED_DIRS: &[&str] = &["drafts", "plots", "data"];

/// Typed arguments for `write_file`.
#[derive(Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// Name of file to create/overwrite, including extension. No path.
    pub filename: String,
    /// Content to write to the file, UTF-8 encoded.
    pub text: String,
}

/// Typed arguments for `read_file`.
#[derive(Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// Name of file to read from the drafts folder, including extension.
    pub filename: String,
}

/// Typed arguments for `list_local_dir`.
#[derive(Deserialize, JsonSchema)]
pub struct ListLocalDirArgs {
    /// One of "drafts", "plots", "data".
    pub directory: String,
}

/// Reject anything that is not a bare filename.
fn checked_filename(filename: &str) -> Result<&str, String> {
    if filename.is_empty()
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
    {
        return Err(format!("Error, '{filename}' is not a plain filename"));
    }
    Ok(filename)
}

// ── WriteFile ───────────────────────────────────────────────────────

/// Create or overwrite a file in the drafts folder.
pub struct WriteFile {
    drafts_dir: PathBuf,
}

impl WriteFile {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            drafts_dir: root.as_ref().join("drafts"),
        }
    }
}

impl Tool for WriteFile {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "write_file",
            "Creates or overwrites a file in the drafts folder. Useful for safely \
             storing generated content. Include the proper extension in the filename. \
             Do not set any path, just the filename.",
            json_schema_for::<WriteFileArgs>(),
        )
    }

    fn invoke(&self, arguments: &serde_json::Value) -> ToolFuture<'_> {
        let arguments = arguments.clone();
        Box::pin(async move {
            let args: WriteFileArgs =
                serde_json::from_value(arguments).map_err(|e| format!("Error: {e}"))?;
            let filename = checked_filename(&args.filename)?;
            let path = self.drafts_dir.join(filename);

            info!("writing draft {filename}");
            match fs::write(&path, args.text).await {
                Ok(()) => Ok(format!("Success, data written to {filename}")),
                Err(e) => Err(format!("Error, cannot write to {filename}: {e}")),
            }
        })
    }
}

// ── ReadFile ────────────────────────────────────────────────────────

/// Retrieve a previously saved file from the drafts folder.
pub struct ReadFile {
    drafts_dir: PathBuf,
}

impl ReadFile {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            drafts_dir: root.as_ref().join("drafts"),
        }
    }
}

impl Tool for ReadFile {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "read_file",
            "Retrieves file contents from the drafts folder, useful to retrieve any \
             previously saved file. Do not set any path, just the filename.",
            json_schema_for::<ReadFileArgs>(),
        )
    }

    fn invoke(&self, arguments: &serde_json::Value) -> ToolFuture<'_> {
        let arguments = arguments.clone();
        Box::pin(async move {
            let args: ReadFileArgs =
                serde_json::from_value(arguments).map_err(|e| format!("Error: {e}"))?;
            let filename = checked_filename(&args.filename)?;
            let path = self.drafts_dir.join(filename);

            info!("reading draft {filename}");
            match fs::read_to_string(&path).await {
                Ok(content) => Ok(content),
                Err(e) => Err(format!("Error, cannot read from {filename}: {e}")),
            }
        })
    }
}

// ── ListLocalDir ────────────────────────────────────────────────────

/// List one of the allowed local folders.
pub struct ListLocalDir {
    root: PathBuf,
}

impl ListLocalDir {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl Tool for ListLocalDir {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "list_local_dir",
            "Returns a local disk directory listing, useful to check existing files. \
             Pick one of the allowed folders: drafts, plots or data.",
            json_schema_for::<ListLocalDirArgs>(),
        )
    }

    fn invoke(&self, arguments: &serde_json::Value) -> ToolFuture<'_> {
        let arguments = arguments.clone();
        Box::pin(async move {
            let args: ListLocalDirArgs =
                serde_json::from_value(arguments).map_err(|e| format!("Error: {e}"))?;
            if !ALLOWED_DIRS.contains(&args.directory.as_str()) {
                return Err(format!(
                    "Error, '{}' is not an allowed folder (pick one of: {})",
                    args.directory,
                    ALLOWED_DIRS.join(", ")
                ));
            }

            let mut entries = fs::read_dir(self.root.join(&args.directory))
                .await
                .map_err(|e| format!("Error, cannot list {}: {e}", args.directory))?;
            let mut names = Vec::new();
            while let Ok(Some(entry)) = entries.next_entry().await {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            names.sort();
            Ok(names.join("\n"))
        })
    }
}
