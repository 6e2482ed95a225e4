use crate::language::ast::Ast;
use crate::lsp::diagnostics::DiagnosticsScheduler;
use crate::lsp::imports::ImportTracker;
use crate::lsp::loader::ModuleLoader;
use crate::lsp::parse_service::ParseService;
use crate::lsp::resolve::{locate, resolve_identity, SymbolIdentity};
use crate::lsp::symbols::WorkspaceSymbolIndex;
use crate::lsp::text::uri_to_path;
use crate::project::find_manifest_for;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::RwLock;
use tower_lsp_server::lsp_types::{Position, Uri};
use tower_lsp_server::Client;

mod document_symbols;
mod server;
pub mod state;

pub use document_symbols::collect_document_symbols;
use state::{AstCache, Document, Documents, LastGoodSymbols};

pub struct Backend {
    client: Client,
    documents: Arc<Documents>,
    ast_cache: Arc<AstCache>,
    parse_service: Arc<ParseService>,
    symbol_index: Arc<WorkspaceSymbolIndex>,
    last_symbols: Arc<LastGoodSymbols>,
    diagnostics: Arc<DiagnosticsScheduler>,
    root: Arc<RwLock<Option<PathBuf>>>,
    shutting_down: Arc<AtomicBool>,
}

impl Backend {
    pub fn new(client: Client, shutting_down: Arc<AtomicBool>) -> Self {
        Self {
            client,
            documents: Arc::new(Documents::default()),
            ast_cache: Arc::new(AstCache::default()),
            parse_service: Arc::new(ParseService::default()),
            symbol_index: Arc::new(WorkspaceSymbolIndex::default()),
            last_symbols: Arc::new(LastGoodSymbols::default()),
            diagnostics: Arc::new(DiagnosticsScheduler::default()),
            root: Arc::new(RwLock::new(None)),
            shutting_down,
        }
    }

    fn note_shutting_down(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// The document's AST for its current version. Because the parse
    /// service is latest-wins, the store is re-read after parsing and the
    /// result is discarded if the buffer moved on meanwhile.
    async fn current_ast(&self, uri: &Uri) -> Option<(Document, Arc<Ast>)> {
        for _ in 0..3 {
            let doc = self.documents.get(uri).await?;
            if let Some(ast) = self.ast_cache.get(uri, doc.version).await {
                return Some((doc, ast));
            }
            let parsed = self.parse_service.parse(doc.text.clone()).await;
            let latest = self.documents.get(uri).await?;
            if latest.version != doc.version {
                continue;
            }
            let ast = parsed?;
            self.ast_cache
                .put(uri.clone(), doc.version, Arc::clone(&ast))
                .await;
            return Some((doc, ast));
        }
        None
    }

    /// Best-effort AST when the current buffer does not parse: the last
    /// cached version, whatever it was. Import lists rarely move during
    /// mid-expression typing, which is what completion needs.
    async fn last_good_ast(&self, uri: &Uri) -> Option<Arc<Ast>> {
        if let Some((_, ast)) = self.current_ast(uri).await {
            return Some(ast);
        }
        self.ast_cache.get_latest(uri).await
    }

    fn loader_for(&self, uri: &Uri) -> ModuleLoader<'_> {
        let manifest = uri_to_path(uri).and_then(|path| find_manifest_for(&path));
        ModuleLoader::new(manifest, &self.parse_service, &self.documents)
    }

    /// Identity of the symbol named at a wire position, probing open
    /// imports through the loader when the tracker alone cannot settle it.
    async fn identity_at(
        &self,
        uri: &Uri,
        position: Position,
    ) -> Option<(Arc<Ast>, SymbolIdentity)> {
        let (_, ast) = self.current_ast(uri).await?;
        let tracker = ImportTracker::new(&ast);
        let target = locate(&ast, crate::language::span::Position::from_lsp(position))?;
        let outcome = resolve_identity(&ast, &tracker, &target);
        let loader = self.loader_for(uri);
        let identity = loader.settle_identity(outcome).await?;
        Some((ast, identity))
    }

    fn schedule_diagnostics(&self, uri: Uri) {
        self.diagnostics.schedule(uri, self.client.clone());
    }
}
