use crate::lsp::text::path_to_uri;
use crate::project::Manifest;
use regex::Regex;
use std::{
    fs,
    path::PathBuf,
    sync::LazyLock,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tower_lsp_server::lsp_types::{Location, Position, Range, SymbolInformation, SymbolKind, Uri};

static TYPE_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^type\s+alias\s+([A-Z][A-Za-z0-9_]*)").expect("alias regex"));
static TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^type\s+([A-Z][A-Za-z0-9_]*)").expect("type regex"));
static PORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^port\s+([a-z][A-Za-z0-9_]*)").expect("port regex"));
static FUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z][A-Za-z0-9_]*)").expect("function regex"));

const RESERVED: &[&str] = &[
    "module", "import", "exposing", "as", "if", "then", "else", "case", "of", "let", "in",
    "type", "alias", "port", "where",
];

const CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct RawSymbol {
    name: String,
    kind: SymbolKind,
    uri: Uri,
    range: Range,
}

struct CachedIndex {
    project_folder: PathBuf,
    built_at: Instant,
    symbols: Vec<RawSymbol>,
}

/// Project-wide symbol search over raw text. Extraction is regex-seeded
/// for speed; the result set lives in a single slot invalidated five
/// seconds after it was built.
#[derive(Default)]
pub struct WorkspaceSymbolIndex {
    slot: Mutex<Option<CachedIndex>>,
}

impl WorkspaceSymbolIndex {
    pub async fn search(&self, query: &str, manifest: &Manifest) -> Vec<SymbolInformation> {
        let symbols = self.symbols_for(manifest).await;
        symbols
            .into_iter()
            .filter(|symbol| fuzzy_matches(&symbol.name, query))
            .map(|symbol| {
                #[allow(deprecated)]
                SymbolInformation {
                    name: symbol.name,
                    kind: symbol.kind,
                    location: Location::new(symbol.uri, symbol.range),
                    container_name: None,
                    deprecated: None,
                    tags: None,
                }
            })
            .collect()
    }

    async fn symbols_for(&self, manifest: &Manifest) -> Vec<RawSymbol> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.project_folder == manifest.project_folder
                && cached.built_at.elapsed() < CACHE_TTL
            {
                return cached.symbols.clone();
            }
        }
        let symbols = extract_workspace_symbols(manifest);
        *slot = Some(CachedIndex {
            project_folder: manifest.project_folder.clone(),
            built_at: Instant::now(),
            symbols: symbols.clone(),
        });
        symbols
    }
}

fn extract_workspace_symbols(manifest: &Manifest) -> Vec<RawSymbol> {
    let mut symbols = Vec::new();
    for path in manifest.source_files() {
        let Ok(text) = fs::read_to_string(&path) else {
            continue;
        };
        let Some(uri) = path_to_uri(&path) else {
            continue;
        };
        extract_file_symbols(&text, &uri, &mut symbols);
    }
    symbols
}

/// Extract one symbol per distinct name per file; the first occurrence
/// wins, which keeps a function's equation below its signature silent.
fn extract_file_symbols(text: &str, uri: &Uri, out: &mut Vec<RawSymbol>) {
    let mut seen: Vec<String> = Vec::new();
    for (line_index, line) in text.lines().enumerate() {
        let Some((name, kind, col)) = match_line(line) else {
            continue;
        };
        if seen.iter().any(|existing| existing == &name) {
            continue;
        }
        seen.push(name.clone());
        let start = Position::new(line_index as u32, col);
        let end = Position::new(line_index as u32, col + name.chars().count() as u32);
        out.push(RawSymbol {
            name,
            kind,
            uri: uri.clone(),
            range: Range::new(start, end),
        });
    }
}

fn match_line(line: &str) -> Option<(String, SymbolKind, u32)> {
    if let Some(captures) = TYPE_ALIAS_RE.captures(line) {
        let group = captures.get(1)?;
        return Some((
            group.as_str().to_string(),
            SymbolKind::OBJECT,
            group.start() as u32,
        ));
    }
    if let Some(captures) = TYPE_RE.captures(line) {
        let group = captures.get(1)?;
        return Some((
            group.as_str().to_string(),
            SymbolKind::ENUM,
            group.start() as u32,
        ));
    }
    if let Some(captures) = PORT_RE.captures(line) {
        let group = captures.get(1)?;
        return Some((
            group.as_str().to_string(),
            SymbolKind::FUNCTION,
            group.start() as u32,
        ));
    }
    let captures = FUNCTION_RE.captures(line)?;
    let group = captures.get(1)?;
    let name = group.as_str();
    if RESERVED.contains(&name) {
        return None;
    }
    Some((name.to_string(), SymbolKind::FUNCTION, group.start() as u32))
}

/// Case-insensitive subsequence match; the empty query matches everything.
fn fuzzy_matches(name: &str, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let mut name_chars = name.chars().flat_map(char::to_lowercase);
    query
        .chars()
        .flat_map(char::to_lowercase)
        .all(|needle| name_chars.any(|candidate| candidate == needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::str::FromStr;

    fn symbols_of(text: &str) -> Vec<(String, SymbolKind)> {
        let uri = Uri::from_str("file:///tmp/Test.elm").expect("uri");
        let mut out = Vec::new();
        extract_file_symbols(text, &uri, &mut out);
        out.into_iter()
            .map(|symbol| (symbol.name, symbol.kind))
            .collect()
    }

    #[test]
    fn extraction_maps_kinds_and_skips_keywords() {
        let text = "\
module Helpers exposing (..)

type alias Config =
    { retries : Int }

type Status
    = Ready
    | Waiting

port save : String -> Cmd msg

multiply : Int -> Int -> Int
multiply a b =
    a * b

let_this_not_be_skipped = 1
";
        let symbols = symbols_of(text);
        assert!(symbols.contains(&("Config".into(), SymbolKind::OBJECT)));
        assert!(symbols.contains(&("Status".into(), SymbolKind::ENUM)));
        assert!(symbols.contains(&("save".into(), SymbolKind::FUNCTION)));
        assert!(symbols.contains(&("multiply".into(), SymbolKind::FUNCTION)));
        assert!(symbols.contains(&("let_this_not_be_skipped".into(), SymbolKind::FUNCTION)));
        assert!(!symbols.iter().any(|(name, _)| name == "module"));
    }

    #[test]
    fn duplicate_names_within_a_file_appear_once() {
        let text = "multiply : Int -> Int -> Int\nmultiply a b =\n    a * b\n";
        let symbols = symbols_of(text);
        assert_eq!(symbols.len(), 1);
    }

    #[test]
    fn fuzzy_match_is_a_case_insensitive_subsequence() {
        assert!(fuzzy_matches("multiply", "mult"));
        assert!(fuzzy_matches("multiply", "mLy"));
        assert!(fuzzy_matches("multiply", ""));
        assert!(!fuzzy_matches("multiply", "multz"));
        assert!(!fuzzy_matches("add", "mult"));
    }

    #[tokio::test]
    async fn search_covers_every_source_directory_and_caches() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("elm.json"),
            r#"{ "type": "application", "source-directories": ["src"],
                 "elm-version": "0.19.1", "dependencies": { "direct": {} } }"#,
        )
        .expect("write elm.json");
        fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        fs::write(
            dir.path().join("src/Helpers.elm"),
            "module Helpers exposing (..)\n\nmultiply a b =\n    a * b\n",
        )
        .expect("write module");

        let manifest = crate::project::Manifest::load(&dir.path().join("elm.json"))
            .expect("manifest");
        let index = WorkspaceSymbolIndex::default();
        let hits = index.search("mult", &manifest).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "multiply");

        // A file created after the index was built is invisible until the
        // five-second slot expires.
        fs::write(
            dir.path().join("src/More.elm"),
            "module More exposing (..)\n\nmultiplex x =\n    x\n",
        )
        .expect("write module");
        let hits = index.search("mult", &manifest).await;
        assert_eq!(hits.len(), 1, "cached result is served inside the TTL");

        let everything = index.search("", &manifest).await;
        assert_eq!(everything.len(), 1, "empty query returns every symbol");
    }
}
