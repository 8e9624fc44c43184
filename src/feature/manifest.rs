// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Manifest sources and rendering into dynamic Kubernetes objects.
//!
//! A manifest is either a plain YAML file (possibly multi-document) or a
//! template, recognised by `.tmpl` in its path. Files with `.patch` in their
//! name are merge patches for objects that already exist. A reference naming
//! a directory expands to every file below it in lexical order.

use super::template;
use crate::error::{OperatorError, Result};
use kube::api::DynamicObject;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Read-only set of manifests compiled into the binary, keyed by relative path
pub struct EmbeddedBundle {
    files: &'static [(&'static str, &'static str)],
}

impl EmbeddedBundle {
    pub const fn new(files: &'static [(&'static str, &'static str)]) -> Self {
        Self { files }
    }
}

impl fmt::Debug for EmbeddedBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.files.iter().map(|(path, _)| path))
            .finish()
    }
}

/// Where manifests are read from
#[derive(Clone, Debug)]
pub enum ManifestSource {
    Embedded(&'static EmbeddedBundle),
    Directory(PathBuf),
}

impl ManifestSource {
    /// Relative paths of every file at or below `path`, sorted
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let path = path.trim_matches('/');
        let files = match self {
            ManifestSource::Embedded(bundle) => {
                let prefix = format!("{}/", path);
                let mut files: Vec<String> = bundle
                    .files
                    .iter()
                    .map(|(p, _)| *p)
                    .filter(|p| *p == path || path.is_empty() || p.starts_with(&prefix))
                    .map(str::to_string)
                    .collect();
                files.sort();
                files
            }
            ManifestSource::Directory(root) => {
                let full = root.join(path);
                if full.is_file() {
                    vec![path.to_string()]
                } else if full.is_dir() {
                    let mut files = Vec::new();
                    collect_files(root, &full, &mut files)?;
                    files.sort();
                    files
                } else {
                    Vec::new()
                }
            }
        };

        if files.is_empty() {
            return Err(OperatorError::ManifestNotFound(self.describe(path)));
        }
        Ok(files)
    }

    pub fn read(&self, path: &str) -> Result<String> {
        match self {
            ManifestSource::Embedded(bundle) => bundle
                .files
                .iter()
                .find(|(p, _)| *p == path)
                .map(|(_, content)| content.to_string())
                .ok_or_else(|| OperatorError::ManifestNotFound(self.describe(path))),
            ManifestSource::Directory(root) => fs::read_to_string(root.join(path))
                .map_err(|e| OperatorError::ManifestNotFound(format!("{}: {}", self.describe(path), e))),
        }
    }

    fn describe(&self, path: &str) -> String {
        match self {
            ManifestSource::Embedded(_) => format!("embedded:{}", path),
            ManifestSource::Directory(root) => root.join(path).display().to_string(),
        }
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| OperatorError::ManifestNotFound(format!("{}: {}", dir.display(), e)))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| OperatorError::ManifestNotFound(format!("{}: {}", dir.display(), e)))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

/// A manifest location attached to a feature
#[derive(Clone, Debug)]
pub struct ManifestRef {
    pub source: ManifestSource,
    pub path: String,
}

impl ManifestRef {
    pub fn new(source: ManifestSource, path: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }
}

pub fn is_template(path: &str) -> bool {
    path.contains(".tmpl")
}

pub fn is_patch(path: &str) -> bool {
    Path::new(path)
        .file_name()
        .is_some_and(|name| name.to_string_lossy().contains(".patch"))
}

/// Objects produced from one manifest file
#[derive(Clone, Debug)]
pub struct RenderedManifest {
    pub path: String,
    pub patch: bool,
    pub objects: Vec<DynamicObject>,
}

/// Render every file at `path` in `source` using `data` for templates.
pub fn render(
    source: &ManifestSource,
    path: &str,
    data: &Map<String, Value>,
) -> Result<Vec<RenderedManifest>> {
    source
        .list(path)?
        .into_iter()
        .map(|file| {
            let raw = source.read(&file)?;
            let text = if is_template(&file) {
                template::render(&file, &raw, data)?
            } else {
                raw
            };
            Ok(RenderedManifest {
                objects: parse_objects(&file, &text)?,
                patch: is_patch(&file),
                path: file,
            })
        })
        .collect()
}

/// Parse a multi-document YAML stream into dynamic objects, skipping empty documents
pub fn parse_objects(path: &str, text: &str) -> Result<Vec<DynamicObject>> {
    let invalid = |reason: String| OperatorError::InvalidManifest {
        path: path.to_string(),
        reason,
    };

    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document).map_err(|e| invalid(e.to_string()))?;
        if value.is_null() {
            continue;
        }

        for field in ["apiVersion", "kind"] {
            if value.get(field).and_then(Value::as_str).is_none_or(str::is_empty) {
                return Err(invalid(format!("document is missing {}", field)));
            }
        }
        if value.pointer("/metadata/name").and_then(Value::as_str).is_none() {
            return Err(invalid("document is missing metadata.name".to_string()));
        }

        objects.push(serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?);
    }
    Ok(objects)
}
