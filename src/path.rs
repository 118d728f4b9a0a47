//! Locating the JDK module archive and the user's classpath (§6, external collaborator
//! "environment"; ambient configuration concern). Resolution order: an explicit
//! `OXJVM_MODULE_ARCHIVE` environment variable, a `JAVA_HOME`-relative fallback, then a
//! glob over a conventional install path.

use std::env;
use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::error::VmError;

pub fn find_module_archive() -> Result<PathBuf, VmError> {
    if let Ok(path) = env::var("OXJVM_MODULE_ARCHIVE") {
        debug!("using module archive from OXJVM_MODULE_ARCHIVE: {}", path);
        return Ok(PathBuf::from(path));
    }

    if let Ok(java_home) = env::var("JAVA_HOME") {
        let candidate = Path::new(&java_home).join("lib").join("modules");
        if candidate.is_file() {
            debug!("using module archive from JAVA_HOME: {}", candidate.display());
            return Ok(candidate);
        }
    }

    for base in ["/usr/lib/jvm", "/opt"] {
        let base = Path::new(base);
        if !base.is_dir() {
            continue;
        }
        for entry in WalkDir::new(base).max_depth(3).into_iter().filter_map(Result::ok) {
            if entry.file_name() == "modules" && entry.path().parent().and_then(|p| p.file_name()) == Some(std::ffi::OsStr::new("lib")) {
                info!("discovered module archive at {}", entry.path().display());
                return Ok(entry.path().to_path_buf());
            }
        }
    }

    Err(VmError::Format(
        "could not locate a JDK module archive (set OXJVM_MODULE_ARCHIVE or JAVA_HOME)".into(),
    ))
}

/// The directory a `.class` file lives in becomes the user classpath entry (§6 CLI
/// surface: a single positional `.class` path whose stem is the main-class name).
pub fn classpath_dir_for(class_file: &Path) -> PathBuf {
    class_file.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
}

pub fn main_class_name(class_file: &Path) -> Option<String> {
    class_file.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}
