//! Taskfile discovery and decoding
//!
//! A logical name such as `Taskfile` is looked up as `.yml`, then `.json`,
//! then `.toml`. The first file that exists wins; a malformed one is an
//! error rather than a reason to keep looking.

use crate::error::{TaskfileError, TaskfileResult};
use crate::taskfile::types::{Taskfile, Vars};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Logical name of the task catalog
pub const TASKFILE: &str = "Taskfile";

/// Logical name of the shared variable file
pub const TASKVARS: &str = "Taskvars";

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
    Toml,
}

impl Format {
    /// Lookup order for a logical name
    pub const SEARCH_ORDER: [Format; 3] = [Format::Yaml, Format::Json, Format::Toml];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Yaml => "yml",
            Format::Json => "json",
            Format::Toml => "toml",
        }
    }

    /// Format implied by a file's extension
    pub fn from_path(path: &Path) -> Option<Format> {
        match path.extension()?.to_str()? {
            "yml" | "yaml" => Some(Format::Yaml),
            "json" => Some(Format::Json),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }

    fn decode<T: DeserializeOwned + Default>(self, text: &str, path: &Path) -> TaskfileResult<T> {
        let parse_error = |message: String| TaskfileError::Parse {
            path: path.to_path_buf(),
            message,
        };
        match self {
            // an empty YAML document is an empty mapping, not a parse error
            Format::Yaml if text.trim().is_empty() => Ok(T::default()),
            Format::Yaml => serde_yaml::from_str(text).map_err(|e| parse_error(e.to_string())),
            Format::Json => serde_json::from_str(text).map_err(|e| parse_error(e.to_string())),
            Format::Toml => toml::from_str(text).map_err(|e| parse_error(e.to_string())),
        }
    }
}

/// `<base>.<ext>` for a logical base path
fn with_extension(base: &Path, format: Format) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

/// Read the first existing `<base>.{yml,json,toml}`.
///
/// Returns `Ok(None)` when no candidate exists.
fn read_first<T: DeserializeOwned + Default>(base: &Path) -> TaskfileResult<Option<(T, PathBuf)>> {
    for format in Format::SEARCH_ORDER {
        let path = with_extension(base, format);
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(path = %path.display(), "reading");
                let value = format.decode(&text, &path)?;
                return Ok(Some((value, path)));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(source) => return Err(TaskfileError::Io { path, source }),
        }
    }
    Ok(None)
}

/// Path of the file a logical base name resolves to, if any
pub fn locate(base: &Path) -> Option<PathBuf> {
    Format::SEARCH_ORDER
        .iter()
        .map(|format| with_extension(base, *format))
        .find(|path| path.is_file())
}

/// The platform overlay name for a logical base: `<base>_<os>`
pub fn overlay_base(base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push("_");
    name.push(std::env::consts::OS);
    PathBuf::from(name)
}

/// Decode one taskfile, anchoring its includes to the file's directory
fn read_document(base: &Path) -> TaskfileResult<Option<(Taskfile, PathBuf)>> {
    let Some((taskfile, path)) = read_first::<Taskfile>(base)? else {
        return Ok(None);
    };
    Ok(Some((anchor(taskfile, &path), path)))
}

fn anchor(mut taskfile: Taskfile, path: &Path) -> Taskfile {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    taskfile.includes = taskfile.includes.with_base_dir(dir);
    taskfile
}

/// Apply the `<base>_<os>` overlay, if one exists
fn apply_overlay(taskfile: &mut Taskfile, base: &Path) -> TaskfileResult<()> {
    let overlay = overlay_base(base);
    match read_document(&overlay)? {
        Some((overlay, path)) => {
            debug!(path = %path.display(), "merging platform overlay");
            taskfile.merge_overlay(overlay);
        }
        None => debug!(base = %overlay.display(), "no platform overlay"),
    }
    Ok(())
}

/// Load the catalog for a logical base name, with its platform overlay
pub fn load_catalog(base: &Path) -> TaskfileResult<Taskfile> {
    let (mut taskfile, _) = read_document(base)?.ok_or_else(|| TaskfileError::NotFound {
        base: base.to_path_buf(),
    })?;
    apply_overlay(&mut taskfile, base)?;
    Ok(taskfile)
}

/// Load a taskfile named by its full path, with its platform overlay
pub fn load_file(path: &Path) -> TaskfileResult<Taskfile> {
    let Some(format) = Format::from_path(path) else {
        return load_catalog(path);
    };
    let text = fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => TaskfileError::NotFound {
            base: path.to_path_buf(),
        },
        _ => TaskfileError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    debug!(path = %path.display(), "reading");
    let mut taskfile = anchor(format.decode(&text, path)?, path);
    apply_overlay(&mut taskfile, &path.with_extension(""))?;
    Ok(taskfile)
}

/// Load `Taskfile` from `dir`
pub fn read_taskfile(dir: &Path) -> TaskfileResult<Taskfile> {
    load_catalog(&dir.join(TASKFILE))
}

/// Load a shared variable file; a missing one yields an empty set
pub fn load_shared_vars(base: &Path) -> TaskfileResult<Vars> {
    Ok(read_first::<Vars>(base)?
        .map(|(vars, _)| vars)
        .unwrap_or_default())
}

/// Load `Taskvars` from `dir`
pub fn read_taskvars(dir: &Path) -> TaskfileResult<Vars> {
    load_shared_vars(&dir.join(TASKVARS))
}
