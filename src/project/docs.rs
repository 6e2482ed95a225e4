use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock, RwLock},
};

/// One module's rendered documentation from a package's `docs.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleDocs {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub unions: Vec<UnionDocs>,
    #[serde(default)]
    pub aliases: Vec<AliasDocs>,
    #[serde(default)]
    pub values: Vec<ValueDocs>,
    #[serde(default)]
    pub binops: Vec<ValueDocs>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnionDocs {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Constructor name plus the rendered types of its arguments.
    #[serde(default)]
    pub cases: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AliasDocs {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(rename = "type")]
    pub tipe: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValueDocs {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(rename = "type")]
    pub tipe: String,
}

impl UnionDocs {
    pub fn case(&self, name: &str) -> Option<&(String, Vec<String>)> {
        self.cases.iter().find(|(case, _)| case == name)
    }
}

static DOCS: LazyLock<RwLock<HashMap<PathBuf, Arc<Vec<ModuleDocs>>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Read and decode a package's documentation list, memoized per process.
/// Any I/O or decode failure yields an empty list.
pub fn load_docs(docs_path: &Path) -> Arc<Vec<ModuleDocs>> {
    if let Ok(cache) = DOCS.read() {
        if let Some(found) = cache.get(docs_path) {
            return Arc::clone(found);
        }
    }
    let loaded = fs::read_to_string(docs_path)
        .ok()
        .and_then(|content| serde_json::from_str::<Vec<ModuleDocs>>(&content).ok());
    match loaded {
        Some(modules) => {
            let modules = Arc::new(modules);
            if let Ok(mut cache) = DOCS.write() {
                cache.insert(docs_path.to_path_buf(), Arc::clone(&modules));
            }
            modules
        }
        None => Arc::new(Vec::new()),
    }
}
