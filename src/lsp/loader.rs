use crate::language::ast::Ast;
use crate::lsp::backend::state::Documents;
use crate::lsp::parse_service::ParseService;
use crate::lsp::resolve::{IdentityOutcome, SymbolIdentity};
use crate::lsp::text::path_to_uri;
use crate::project::Manifest;
use std::{collections::HashMap, fs, path::Path, sync::Arc};
use tokio::sync::Mutex;
use tower_lsp_server::lsp_types::Uri;

#[derive(Clone)]
pub struct LoadedModule {
    pub uri: Uri,
    pub ast: Arc<Ast>,
}

/// Loads workspace modules by dotted name, preferring open-editor text
/// over the file on disk. Parses go through the batch side of the parse
/// service so sweeps never displace interactive requests.
pub struct ModuleLoader<'a> {
    manifest: Option<Manifest>,
    parse_service: &'a ParseService,
    documents: &'a Documents,
    cache: Mutex<HashMap<String, Option<LoadedModule>>>,
}

impl<'a> ModuleLoader<'a> {
    pub fn new(
        manifest: Option<Manifest>,
        parse_service: &'a ParseService,
        documents: &'a Documents,
    ) -> Self {
        Self {
            manifest,
            parse_service,
            documents,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// The current text of a file, from the editor if it is open.
    pub async fn text_for(&self, uri: &Uri, path: &Path) -> Option<String> {
        if let Some(doc) = self.documents.get(uri).await {
            return Some(doc.text);
        }
        fs::read_to_string(path).ok()
    }

    /// Parse one file through the batch channel.
    pub async fn parse_file(&self, path: &Path) -> Option<(Uri, Arc<Ast>)> {
        let uri = path_to_uri(path)?;
        let text = self.text_for(&uri, path).await?;
        let ast = self.parse_service.parse_batch(text).await?;
        Some((uri, ast))
    }

    /// Resolve a dotted module name to its workspace file and AST. Package
    /// modules (and anything unresolvable) yield `None`.
    pub async fn load(&self, module_name: &str) -> Option<LoadedModule> {
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(module_name) {
                return cached.clone();
            }
        }
        let loaded = self.load_uncached(module_name).await;
        self.cache
            .lock()
            .await
            .insert(module_name.to_string(), loaded.clone());
        loaded
    }

    async fn load_uncached(&self, module_name: &str) -> Option<LoadedModule> {
        let manifest = self.manifest.as_ref()?;
        let path = manifest.resolve_module_to_file(module_name)?;
        let (uri, ast) = self.parse_file(&path).await?;
        Some(LoadedModule { uri, ast })
    }

    /// Finish identity resolution: probe each candidate module's AST, in
    /// order, for a declaration or constructor with the name. First match
    /// wins.
    pub async fn settle_identity(&self, outcome: IdentityOutcome) -> Option<SymbolIdentity> {
        match outcome {
            IdentityOutcome::Found(identity) => Some(identity),
            IdentityOutcome::Unknown => None,
            IdentityOutcome::Probe {
                name,
                modules,
                kind,
            } => {
                for module in modules {
                    let Some(loaded) = self.load(&module).await else {
                        continue;
                    };
                    if loaded.ast.find_declaration(&name).is_some()
                        || loaded.ast.find_constructor(&name).is_some()
                    {
                        return Some(SymbolIdentity {
                            def_module: module,
                            name,
                            kind,
                        });
                    }
                }
                None
            }
        }
    }
}
