//! User commands queued from the stdin reader to the workflow loop.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use workflow::{DropEvent, FileSelection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowCommand {
    Load { path: PathBuf },
    Drop { paths: Vec<PathBuf> },
    Sample { sample_id: String },
    Samples,
    Clear,
    Remove,
    Download,
    Status,
    Help,
    Quit,
}

impl WorkflowCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Load { .. } => "load",
            Self::Drop { .. } => "drop",
            Self::Sample { .. } => "sample",
            Self::Samples => "samples",
            Self::Clear => "clear",
            Self::Remove => "remove",
            Self::Download => "download",
            Self::Status => "status",
            Self::Help => "help",
            Self::Quit => "quit",
        }
    }

    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let cmd = match verb.to_ascii_lowercase().as_str() {
            "" => return Ok(None),
            "load" | "open" if !rest.is_empty() => Self::Load {
                path: PathBuf::from(rest),
            },
            "drop" if !rest.is_empty() => Self::Drop {
                paths: rest.split_whitespace().map(PathBuf::from).collect(),
            },
            "sample" if !rest.is_empty() => Self::Sample {
                sample_id: rest.to_string(),
            },
            "load" | "open" | "drop" | "sample" => {
                return Err(format!("`{verb}` needs an argument; type `help`"))
            }
            "samples" => Self::Samples,
            "clear" | "x" => Self::Clear,
            "remove" => Self::Remove,
            "download" | "save" => Self::Download,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command `{other}`; type `help`")),
        };
        Ok(Some(cmd))
    }
}

pub const HELP: &str = "\
commands:
  load <path>        pick an image file
  drop <path>...     drop one or more files (only the first is used)
  sample <id>        use a preset sample image
  samples            list preset samples
  remove             remove the background of the loaded image
  download           save the result
  clear              discard the loaded image
  status             print the current state as JSON
  quit               exit";

/// Reads a file the way a picker hands it over: bytes plus a type guessed from the name.
pub async fn read_file_selection(path: &Path) -> Result<FileSelection> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image file: {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image")
        .to_string();
    let declared_mime = mime_guess::from_path(path).first_raw().map(str::to_string);
    Ok(FileSelection {
        file_name,
        declared_mime,
        bytes,
    })
}

/// Reads dropped files in order. The first file is the one that gets loaded, so the drop
/// fails when it cannot be read; later unreadable files are only logged.
pub async fn read_drop_event(paths: &[PathBuf]) -> Result<DropEvent> {
    let Some((first, rest)) = paths.split_first() else {
        bail!("nothing was dropped");
    };
    let mut files = vec![read_file_selection(first).await?];
    for path in rest {
        match read_file_selection(path).await {
            Ok(selection) => files.push(selection),
            Err(err) => tracing::debug!("ignoring unreadable extra dropped file: {err:#}"),
        }
    }
    Ok(DropEvent { files })
}
