//! Include descriptors and the ordered include registry

use crate::error::{TaskfileError, TaskfileResult};
use crate::pathext;
use crate::shell;
use crate::taskfile::types::Vars;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One `includes:` entry
///
/// Decodes from a bare path or from a mapping with `taskfile`, `dir`,
/// `optional`, `internal`, `aliases` and `vars`. `advanced_import` records
/// which of the two forms was used.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "IncludeForm")]
pub struct IncludedTaskfile {
    pub taskfile: String,
    pub dir: String,
    pub optional: bool,
    pub internal: bool,
    pub aliases: IndexSet<String>,
    pub advanced_import: bool,
    pub vars: Option<Vars>,
    base_dir: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IncludeForm {
    Path(String),
    Expanded(ExpandedInclude),
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ExpandedInclude {
    taskfile: String,
    dir: String,
    optional: bool,
    internal: bool,
    aliases: IndexSet<String>,
    vars: Option<Vars>,
}

impl From<IncludeForm> for IncludedTaskfile {
    fn from(form: IncludeForm) -> Self {
        match form {
            IncludeForm::Path(taskfile) => IncludedTaskfile {
                taskfile,
                ..Default::default()
            },
            IncludeForm::Expanded(include) => IncludedTaskfile {
                taskfile: include.taskfile,
                dir: include.dir,
                optional: include.optional,
                internal: include.internal,
                aliases: include.aliases,
                advanced_import: true,
                vars: include.vars,
                base_dir: PathBuf::new(),
            },
        }
    }
}

impl IncludedTaskfile {
    /// A shorthand include of `taskfile`, declared by a file in `base_dir`
    pub fn new(taskfile: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        IncludedTaskfile {
            taskfile: taskfile.into(),
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Anchor a freshly decoded descriptor to the directory of the file
    /// that declared it
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Directory of the taskfile that declared this include
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// An independent copy sharing no storage with `self`
    pub fn deep_copy(&self) -> Self {
        IncludedTaskfile {
            taskfile: self.taskfile.clone(),
            dir: self.dir.clone(),
            optional: self.optional,
            internal: self.internal,
            aliases: self.aliases.clone(),
            advanced_import: self.advanced_import,
            vars: self.vars.clone(),
            base_dir: self.base_dir.clone(),
        }
    }

    /// Absolute path of the included taskfile
    pub fn full_taskfile_path(&self) -> TaskfileResult<PathBuf> {
        self.resolve_path(&self.taskfile)
    }

    /// Absolute working directory for the included tasks
    pub fn full_dir_path(&self) -> TaskfileResult<PathBuf> {
        self.resolve_path(&self.dir)
    }

    fn resolve_path(&self, path: &str) -> TaskfileResult<PathBuf> {
        let expanded = shell::expand(path)?;
        let candidate = Path::new(&expanded);
        if candidate.is_absolute() {
            return Ok(candidate.to_path_buf());
        }

        pathext::absolute(&pathext::smart_join(&self.base_dir, &expanded)).map_err(|source| {
            TaskfileError::PathResolution {
                path: expanded.clone(),
                base_dir: self.base_dir.clone(),
                source,
            }
        })
    }
}

/// Includes in first-declared order
///
/// `keys` and the key set of `mapping` are always the same.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludedTaskfiles {
    keys: Vec<String>,
    mapping: HashMap<String, IncludedTaskfile>,
}

impl IncludedTaskfiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its position
    pub fn set(&mut self, key: impl Into<String>, include: IncludedTaskfile) {
        let key = key.into();
        if !self.mapping.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.mapping.insert(key, include);
    }

    /// Fold `other` into `self`, in `other`'s order
    pub fn merge(&mut self, other: &IncludedTaskfiles) {
        for (key, include) in other.iter() {
            self.set(key, include.deep_copy());
        }
    }

    pub fn get(&self, key: &str) -> Option<&IncludedTaskfile> {
        self.mapping.get(key)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IncludedTaskfile)> {
        self.keys
            .iter()
            .filter_map(|key| self.mapping.get(key).map(|include| (key.as_str(), include)))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Anchor every entry to the directory of the file that declared them
    pub(crate) fn with_base_dir(self, base_dir: &Path) -> Self {
        let mut anchored = IncludedTaskfiles::new();
        let IncludedTaskfiles { keys, mut mapping } = self;
        for key in keys {
            if let Some(include) = mapping.remove(&key) {
                anchored.set(key, include.with_base_dir(base_dir));
            }
        }
        anchored
    }
}

impl<'de> Deserialize<'de> for IncludedTaskfiles {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Option::<IndexMap<String, IncludedTaskfile>>::deserialize(deserializer)?;
        let mut includes = IncludedTaskfiles::new();
        for (key, include) in entries.unwrap_or_default() {
            includes.set(key, include);
        }
        Ok(includes)
    }
}
