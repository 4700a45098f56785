//! Allow-listed loader for file-backed script modules.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use tracing::debug;
use url::Url;

use crate::{
    application::modules::{FileLoadError, LoadedScript, ScriptFileLoader},
    config::WorkerSettings,
};

use super::error::InfraError;

const SCRIPT_EXTENSION: &str = ".js";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    prefix: String,
    root: PathBuf,
}

impl Mount {
    pub fn new(prefix: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            root: root.into(),
        }
    }
}

/// Serves script files from configured mounts, for URLs on allowed hosts only.
#[derive(Debug, Clone)]
pub struct AllowListedFiles {
    site_url: Url,
    allowed_hosts: Vec<String>,
    mounts: Vec<Mount>,
}

impl AllowListedFiles {
    pub fn new(site_url: Url, allowed_hosts: Vec<String>, mounts: Vec<Mount>) -> Self {
        Self {
            site_url,
            allowed_hosts,
            mounts,
        }
    }

    pub fn from_settings(worker: &WorkerSettings) -> Result<Self, InfraError> {
        let mut mounts = Vec::with_capacity(worker.mounts.len());
        for mount in &worker.mounts {
            let root = match fs::canonicalize(&mount.directory) {
                Ok(root) if root.is_dir() => root,
                Ok(root) => {
                    return Err(InfraError::configuration(format!(
                        "mount `{}` points at `{}`, which is not a directory",
                        mount.prefix,
                        root.display()
                    )));
                }
                // Missing directories surface as read errors when a module is loaded.
                Err(_) => mount.directory.clone(),
            };
            mounts.push(Mount::new(mount.prefix.clone(), root));
        }

        Ok(Self::new(
            worker.site_url.clone(),
            worker.allowed_hosts.clone(),
            mounts,
        ))
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf, FileLoadError> {
        let reference = reference.trim();
        let lowered = reference.to_ascii_lowercase();
        if reference.contains(['\\', '\0'])
            || ["%2e", "%5c", "%00"].iter().any(|seq| lowered.contains(seq))
            || reference
                .split(['/', '?', '#'])
                .any(|segment| segment == "..")
        {
            return Err(FileLoadError::Traversal {
                reference: reference.to_string(),
            });
        }

        let url = self
            .site_url
            .join(reference)
            .map_err(|err| FileLoadError::InvalidReference {
                reference: reference.to_string(),
                reason: err.to_string(),
            })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FileLoadError::InvalidReference {
                reference: reference.to_string(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }

        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if !self.allowed_hosts.iter().any(|allowed| *allowed == host) {
            return Err(FileLoadError::HostNotAllowed { host });
        }

        let path = url.path();
        if path.contains('%') {
            return Err(FileLoadError::InvalidReference {
                reference: reference.to_string(),
                reason: "percent-encoded paths are not supported".to_string(),
            });
        }

        let mount = self
            .mounts
            .iter()
            .filter(|mount| path.starts_with(&mount.prefix))
            .max_by_key(|mount| mount.prefix.len())
            .ok_or_else(|| FileLoadError::OutsideAllowedRoots {
                path: path.to_string(),
            })?;

        if !path.ends_with(SCRIPT_EXTENSION) {
            return Err(FileLoadError::NotScript {
                path: path.to_string(),
            });
        }

        let relative = Path::new(&path[mount.prefix.len()..]);
        if relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(FileLoadError::Traversal {
                reference: reference.to_string(),
            });
        }

        let io_error = |source: std::io::Error| FileLoadError::Io {
            path: path.to_string(),
            source,
        };
        let root = fs::canonicalize(&mount.root).map_err(io_error)?;
        let candidate = fs::canonicalize(root.join(relative)).map_err(io_error)?;
        if !candidate.starts_with(&root) {
            return Err(FileLoadError::OutsideAllowedRoots {
                path: path.to_string(),
            });
        }

        Ok(candidate)
    }
}

impl ScriptFileLoader for AllowListedFiles {
    fn load(&self, reference: &str) -> Result<LoadedScript, FileLoadError> {
        let location = self.resolve(reference)?;
        let contents = fs::read_to_string(&location).map_err(|source| FileLoadError::Io {
            path: location.display().to_string(),
            source,
        })?;
        debug!(
            target = "swbundle::files",
            reference = reference,
            location = %location.display(),
            bytes = contents.len(),
            "script file loaded",
        );
        Ok(LoadedScript { location, contents })
    }
}
