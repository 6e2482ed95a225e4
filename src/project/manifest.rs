use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{LazyLock, RwLock},
};
use thiserror::Error;

/// A successfully parsed `elm.json` and where it came from.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub project_folder: PathBuf,
    pub manifest_path: PathBuf,
    pub elm_version: String,
    /// Absolute paths, in declaration order.
    pub source_directories: Vec<PathBuf>,
    /// Direct dependencies only, in declaration order.
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone)]
pub struct Dependency {
    pub user: String,
    pub name: String,
    pub version: String,
}

impl Dependency {
    /// Where the pre-rendered documentation for this package lives.
    pub fn docs_path(&self, elm_version: &str) -> PathBuf {
        elm_home()
            .join(elm_version)
            .join("packages")
            .join(&self.user)
            .join(&self.name)
            .join(&self.version)
            .join("docs.json")
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(rename = "source-directories")]
    source_directories: Option<Vec<String>>,
    #[serde(rename = "elm-version")]
    elm_version: Option<String>,
    #[serde(default)]
    dependencies: serde_json::Value,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawManifest =
            serde_json::from_str(&content).map_err(|source| ManifestError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        let project_folder = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        // Package projects have no source-directories entry; src/ is implied.
        let source_directories = raw
            .source_directories
            .unwrap_or_else(|| vec!["src".to_string()])
            .into_iter()
            .map(|dir| {
                let dir = PathBuf::from(dir);
                if dir.is_absolute() {
                    dir
                } else {
                    project_folder.join(dir)
                }
            })
            .collect();

        // Package manifests state a range; docs live under its lower bound.
        let elm_version = raw
            .elm_version
            .as_deref()
            .and_then(|version| version.split_whitespace().next())
            .unwrap_or("0.19.1")
            .to_string();

        Ok(Self {
            project_folder,
            manifest_path: path.to_path_buf(),
            elm_version,
            source_directories,
            dependencies: parse_dependencies(&raw.dependencies),
        })
    }

    /// Translate a dotted module name to the file that defines it, probing
    /// each source directory in order. Package modules have no file.
    pub fn resolve_module_to_file(&self, module_name: &str) -> Option<PathBuf> {
        let mut relative = PathBuf::new();
        for part in module_name.split('.') {
            relative.push(part);
        }
        relative.set_extension("elm");
        self.source_directories
            .iter()
            .map(|dir| dir.join(&relative))
            .find(|candidate| candidate.is_file())
    }

    /// The dotted module name a source file would declare, judging by its
    /// path under one of the source directories.
    pub fn module_name_for_path(&self, path: &Path) -> Option<String> {
        for dir in &self.source_directories {
            if let Ok(relative) = path.strip_prefix(dir) {
                let mut parts = Vec::new();
                for component in relative.components() {
                    parts.push(component.as_os_str().to_str()?.to_string());
                }
                let last = parts.pop()?;
                parts.push(last.strip_suffix(".elm")?.to_string());
                return Some(parts.join("."));
            }
        }
        None
    }

    /// Every `.elm` file reachable from the source directories.
    pub fn source_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for dir in &self.source_directories {
            for entry in walkdir::WalkDir::new(dir)
                .into_iter()
                .filter_map(|entry| entry.ok())
            {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "elm") {
                    files.push(path.to_path_buf());
                }
            }
        }
        files
    }
}

fn parse_dependencies(value: &serde_json::Value) -> Vec<Dependency> {
    // Application manifests nest direct dependencies under "direct";
    // package manifests keep a flat table with version ranges.
    let table = match value.get("direct") {
        Some(direct) => direct,
        None => value,
    };
    let Some(entries) = table.as_object() else {
        return Vec::new();
    };
    let mut dependencies = Vec::new();
    for (package, version) in entries {
        let Some((user, name)) = package.split_once('/') else {
            continue;
        };
        let Some(version) = version.as_str() else {
            continue;
        };
        // A range like "1.0.0 <= v < 2.0.0" pins docs at its lower bound.
        let version = version.split_whitespace().next().unwrap_or(version);
        dependencies.push(Dependency {
            user: user.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        });
    }
    dependencies
}

/// ELM_HOME override, then ~/.elm, then the platform application-data dir.
pub fn elm_home() -> PathBuf {
    if let Ok(home) = std::env::var("ELM_HOME") {
        return PathBuf::from(home);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".elm");
    }
    if let Ok(appdata) = std::env::var("APPDATA") {
        return PathBuf::from(appdata).join("elm");
    }
    PathBuf::from(".elm")
}

static MANIFESTS: LazyLock<RwLock<HashMap<PathBuf, Manifest>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Walk parent directories (inclusive) looking for the nearest `elm.json`
/// that parses. Successful parses are cached per process.
pub fn find_manifest_for(file_path: &Path) -> Option<Manifest> {
    let start = if file_path.is_dir() {
        Some(file_path)
    } else {
        file_path.parent()
    };
    let mut current = start;
    while let Some(dir) = current {
        let candidate = dir.join("elm.json");
        if candidate.is_file() {
            if let Ok(cache) = MANIFESTS.read() {
                if let Some(found) = cache.get(&candidate) {
                    return Some(found.clone());
                }
            }
            if let Ok(manifest) = Manifest::load(&candidate) {
                if let Ok(mut cache) = MANIFESTS.write() {
                    cache.insert(candidate.clone(), manifest.clone());
                }
                return Some(manifest);
            }
        }
        current = dir.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, body: &str) {
        fs::write(dir.join("elm.json"), body).expect("write elm.json");
    }

    const APPLICATION: &str = r#"{
        "type": "application",
        "source-directories": ["src", "generated"],
        "elm-version": "0.19.1",
        "dependencies": {
            "direct": {
                "elm/core": "1.0.5",
                "elm/json": "1.1.3"
            },
            "indirect": {
                "elm/time": "1.0.0"
            }
        }
    }"#;

    #[test]
    fn application_manifests_list_direct_dependencies_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), APPLICATION);
        let manifest = Manifest::load(&dir.path().join("elm.json")).expect("load");
        assert_eq!(manifest.elm_version, "0.19.1");
        assert_eq!(manifest.source_directories.len(), 2);
        assert!(manifest.source_directories[0].is_absolute());
        let names: Vec<_> = manifest
            .dependencies
            .iter()
            .map(|dep| format!("{}/{}", dep.user, dep.name))
            .collect();
        assert_eq!(names, vec!["elm/core", "elm/json"]);
    }

    #[test]
    fn package_manifests_default_to_src_and_pin_range_lower_bounds() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        write_manifest(
            dir.path(),
            r#"{
                "type": "package",
                "elm-version": "0.19.0 <= v < 0.20.0",
                "dependencies": { "elm/core": "1.0.0 <= v < 2.0.0" }
            }"#,
        );
        let manifest = Manifest::load(&dir.path().join("elm.json")).expect("load");
        assert_eq!(manifest.source_directories.len(), 1);
        assert!(manifest.source_directories[0].ends_with("src"));
        assert_eq!(manifest.dependencies[0].version, "1.0.0");
    }

    #[test]
    fn module_resolution_probes_source_directories_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), APPLICATION);
        let manifest = Manifest::load(&dir.path().join("elm.json")).expect("load");
        fs::create_dir_all(dir.path().join("generated/Api")).expect("mkdir");
        fs::write(dir.path().join("generated/Api/Client.elm"), "").expect("write");
        let resolved = manifest
            .resolve_module_to_file("Api.Client")
            .expect("resolve");
        assert!(resolved.ends_with("generated/Api/Client.elm"));
        assert!(manifest.resolve_module_to_file("Json.Decode").is_none());
        assert_eq!(
            manifest.module_name_for_path(&resolved).as_deref(),
            Some("Api.Client")
        );
    }

    #[test]
    fn nearest_ancestor_manifest_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), APPLICATION);
        let nested = dir.path().join("src/Deep/Nested");
        fs::create_dir_all(&nested).expect("mkdir");
        let manifest = find_manifest_for(&nested.join("File.elm")).expect("manifest");
        assert_eq!(
            manifest.project_folder.canonicalize().ok(),
            dir.path().canonicalize().ok()
        );
    }

    #[test]
    fn docs_paths_follow_elm_home_layout() {
        let dep = Dependency {
            user: "elm".into(),
            name: "core".into(),
            version: "1.0.5".into(),
        };
        let path = dep.docs_path("0.19.1");
        let text = path.to_string_lossy().replace('\\', "/");
        assert!(text.ends_with("0.19.1/packages/elm/core/1.0.5/docs.json"));
    }
}
