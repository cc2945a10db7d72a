//! Common test utilities

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Create a temporary directory with a Taskfile.yml
pub fn create_taskfile(content: &str) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    write_file(temp_dir.path(), "Taskfile.yml", content);
    temp_dir
}

/// Write `content` to `dir/name`, creating parent directories
pub fn write_file(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}
