use crate::language::ast::Ast;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock};
use tower_lsp_server::lsp_types::{DocumentSymbol, Uri};

#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub version: i32,
}

/// Open documents, keyed by URI. The latest version is authoritative.
#[derive(Default)]
pub struct Documents {
    inner: RwLock<HashMap<Uri, Document>>,
}

impl Documents {
    pub async fn open(&self, uri: Uri, text: String, version: i32) {
        self.inner
            .write()
            .await
            .insert(uri, Document { text, version });
    }

    pub async fn change(&self, uri: Uri, text: String, version: i32) {
        self.inner
            .write()
            .await
            .insert(uri, Document { text, version });
    }

    pub async fn close(&self, uri: &Uri) {
        self.inner.write().await.remove(uri);
    }

    pub async fn get(&self, uri: &Uri) -> Option<Document> {
        self.inner.read().await.get(uri).cloned()
    }

    pub async fn all(&self) -> Vec<(Uri, Document)> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(uri, doc)| (uri.clone(), doc.clone()))
            .collect()
    }
}

const AST_CACHE_CAPACITY: usize = 50;

struct CacheEntry {
    uri: Uri,
    version: i32,
    ast: Arc<Ast>,
}

/// LRU cache of parsed modules keyed by `(uri, version)`, one entry per
/// URI. Front is the coldest entry; reads and writes move to the back.
#[derive(Default)]
pub struct AstCache {
    entries: Mutex<Vec<CacheEntry>>,
}

impl AstCache {
    pub async fn get(&self, uri: &Uri, version: i32) -> Option<Arc<Ast>> {
        let mut entries = self.entries.lock().await;
        let index = entries.iter().position(|entry| &entry.uri == uri)?;
        if entries[index].version != version {
            return None;
        }
        let entry = entries.remove(index);
        let ast = Arc::clone(&entry.ast);
        entries.push(entry);
        Some(ast)
    }

    /// The cached AST regardless of version, without touching LRU order.
    /// Callers use this only as stale best-effort context.
    pub async fn get_latest(&self, uri: &Uri) -> Option<Arc<Ast>> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .find(|entry| &entry.uri == uri)
            .map(|entry| Arc::clone(&entry.ast))
    }

    pub async fn put(&self, uri: Uri, version: i32, ast: Arc<Ast>) {
        let mut entries = self.entries.lock().await;
        if let Some(index) = entries.iter().position(|entry| entry.uri == uri) {
            entries.remove(index);
        }
        entries.push(CacheEntry { uri, version, ast });
        if entries.len() > AST_CACHE_CAPACITY {
            entries.remove(0);
        }
    }
}

/// The last successful document-symbol answer per URI, served while the
/// current buffer fails to parse.
#[derive(Default)]
pub struct LastGoodSymbols {
    inner: RwLock<HashMap<Uri, Vec<DocumentSymbol>>>,
}

impl LastGoodSymbols {
    pub async fn remember(&self, uri: Uri, symbols: Vec<DocumentSymbol>) {
        self.inner.write().await.insert(uri, symbols);
    }

    pub async fn recall(&self, uri: &Uri) -> Option<Vec<DocumentSymbol>> {
        self.inner.read().await.get(uri).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse;
    use std::str::FromStr;

    fn ast() -> Arc<Ast> {
        Arc::new(parse("module X exposing (..)\n\nx = 1\n").expect("parse"))
    }

    fn uri(n: usize) -> Uri {
        Uri::from_str(&format!("file:///tmp/Module{n}.elm")).expect("uri")
    }

    #[tokio::test]
    async fn cache_entries_require_an_exact_version_match() {
        let cache = AstCache::default();
        cache.put(uri(1), 3, ast()).await;
        assert!(cache.get(&uri(1), 3).await.is_some());
        assert!(cache.get(&uri(1), 4).await.is_none());
        assert!(cache.get(&uri(1), 2).await.is_none());
    }

    #[tokio::test]
    async fn a_newer_version_replaces_the_older_entry() {
        let cache = AstCache::default();
        cache.put(uri(1), 1, ast()).await;
        cache.put(uri(1), 2, ast()).await;
        assert!(cache.get(&uri(1), 1).await.is_none());
        assert!(cache.get(&uri(1), 2).await.is_some());
    }

    #[tokio::test]
    async fn the_fifty_first_insert_evicts_the_least_recently_used() {
        let cache = AstCache::default();
        for n in 0..50 {
            cache.put(uri(n), 1, ast()).await;
        }
        // Touch the oldest entry so that uri(1) becomes the coldest.
        assert!(cache.get(&uri(0), 1).await.is_some());
        cache.put(uri(50), 1, ast()).await;

        assert!(cache.get(&uri(1), 1).await.is_none(), "coldest evicted");
        assert!(cache.get(&uri(0), 1).await.is_some(), "touched survives");
        let survivors = futures_count(&cache).await;
        assert_eq!(survivors, 50);
    }

    async fn futures_count(cache: &AstCache) -> usize {
        cache.entries.lock().await.len()
    }

    #[tokio::test]
    async fn documents_follow_the_wire_version() {
        let docs = Documents::default();
        let uri = uri(9);
        docs.open(uri.clone(), "a".into(), 1).await;
        docs.change(uri.clone(), "b".into(), 2).await;
        let doc = docs.get(&uri).await.expect("open");
        assert_eq!(doc.text, "b");
        assert_eq!(doc.version, 2);
        docs.close(&uri).await;
        assert!(docs.get(&uri).await.is_none());
    }
}
