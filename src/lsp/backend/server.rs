use super::{collect_document_symbols, Backend};
use crate::language::span::Range;
use crate::lsp::imports::ImportTracker;
use crate::lsp::text::{full_document_range, slice_range, uri_to_path};
use crate::lsp::{completion, hover, navigation, references};
use crate::project::find_manifest_for;
use crate::tools::formatter::{run_formatter, FormatOutcome};
use tower_lsp_server::jsonrpc::Result as RpcResult;
use tower_lsp_server::lsp_types::{
    CompletionOptions, CompletionParams, CompletionResponse, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, DidSaveTextDocumentParams,
    DocumentFormattingParams, DocumentSymbolParams, DocumentSymbolResponse, GotoDefinitionParams,
    GotoDefinitionResponse, Hover, HoverParams, HoverProviderCapability, InitializeParams,
    InitializeResult, InitializedParams, MessageType, OneOf, PrepareRenameResponse,
    ReferenceParams, RenameOptions, RenameParams, SaveOptions, ServerCapabilities, ServerInfo,
    TextDocumentPositionParams, TextDocumentSyncCapability, TextDocumentSyncKind,
    TextDocumentSyncOptions, TextDocumentSyncSaveOptions, TextEdit, WorkspaceEdit,
    SymbolInformation, WorkspaceSymbol, WorkspaceSymbolParams,
};
use tower_lsp_server::LanguageServer;

impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> RpcResult<InitializeResult> {
        #[allow(deprecated)]
        if let Some(root_uri) = params.root_uri {
            if let Some(root_path) = uri_to_path(&root_uri) {
                *self.root.write().await = Some(root_path);
            }
        }
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                        ..Default::default()
                    },
                )),
                document_symbol_provider: Some(OneOf::Left(true)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: Default::default(),
                })),
                workspace_symbol_provider: Some(OneOf::Left(true)),
                document_formatting_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".into()]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "elm-ls".into(),
                version: Some(env!("CARGO_PKG_VERSION").into()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let _ = self
            .client
            .log_message(MessageType::INFO, "elm-ls ready")
            .await;
    }

    async fn shutdown(&self) -> RpcResult<()> {
        self.note_shutting_down();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents
            .open(
                uri.clone(),
                params.text_document.text,
                params.text_document.version,
            )
            .await;
        let _ = self.current_ast(&uri).await;
        self.schedule_diagnostics(uri);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        let uri = params.text_document.uri;
        self.documents
            .change(uri.clone(), change.text, params.text_document.version)
            .await;
        let _ = self.current_ast(&uri).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(text) = params.text {
            if let Some(doc) = self.documents.get(&uri).await {
                self.documents.change(uri.clone(), text, doc.version).await;
            }
        }
        self.schedule_diagnostics(uri);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.close(&params.text_document.uri).await;
        self.client
            .publish_diagnostics(params.text_document.uri, Vec::new(), None)
            .await;
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> RpcResult<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;
        match self.current_ast(&uri).await {
            Some((_, ast)) => {
                let symbols = collect_document_symbols(&ast);
                self.last_symbols.remember(uri, symbols.clone()).await;
                Ok(Some(DocumentSymbolResponse::Nested(symbols)))
            }
            None => Ok(self
                .last_symbols
                .recall(&uri)
                .await
                .map(DocumentSymbolResponse::Nested)),
        }
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> RpcResult<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some((_, ast)) = self.current_ast(&uri).await else {
            return Ok(None);
        };
        let tracker = ImportTracker::new(&ast);
        let loader = self.loader_for(&uri);
        let location = navigation::goto_definition(
            &ast,
            &tracker,
            &uri,
            crate::language::span::Position::from_lsp(position),
            &loader,
        )
        .await;
        Ok(location.map(GotoDefinitionResponse::Scalar))
    }

    async fn hover(&self, params: HoverParams) -> RpcResult<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some((_, ast)) = self.current_ast(&uri).await else {
            return Ok(None);
        };
        let tracker = ImportTracker::new(&ast);
        let loader = self.loader_for(&uri);
        Ok(hover::hover(
            &ast,
            &tracker,
            crate::language::span::Position::from_lsp(position),
            &loader,
        )
        .await)
    }

    async fn completion(&self, params: CompletionParams) -> RpcResult<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some(doc) = self.documents.get(&uri).await else {
            return Ok(None);
        };
        // Mid-word buffers rarely parse; stale imports still answer.
        let ast = self.last_good_ast(&uri).await;
        let tracker = ast.as_deref().map(ImportTracker::new);
        let loader = self.loader_for(&uri);
        let items = completion::completions(
            ast.as_deref(),
            tracker.as_ref(),
            &doc.text,
            position,
            &loader,
        )
        .await;
        if items.is_empty() {
            Ok(None)
        } else {
            Ok(Some(CompletionResponse::Array(items)))
        }
    }

    async fn references(&self, params: ReferenceParams) -> RpcResult<Option<Vec<tower_lsp_server::lsp_types::Location>>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some((_, identity)) = self.identity_at(&uri, position).await else {
            return Ok(None);
        };
        let loader = self.loader_for(&uri);
        let locations = references::find_references(
            &identity,
            &loader,
            params.context.include_declaration,
        )
        .await;
        if locations.is_empty() {
            Ok(None)
        } else {
            Ok(Some(locations))
        }
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> RpcResult<Option<PrepareRenameResponse>> {
        let uri = params.text_document.uri;
        let position = params.position;
        let Some(doc) = self.documents.get(&uri).await else {
            return Ok(None);
        };
        let Some((_, identity)) = self.identity_at(&uri, position).await else {
            return Ok(None);
        };
        let loader = self.loader_for(&uri);
        let locations = references::find_references(&identity, &loader, true).await;
        let cursor = crate::language::span::Position::from_lsp(position);
        let at_cursor = locations.into_iter().find(|location| {
            location.uri == uri && Range::from_lsp(location.range).contains(cursor)
        });
        let Some(location) = at_cursor else {
            return Ok(None);
        };
        let placeholder = slice_range(&doc.text, Range::from_lsp(location.range))
            .unwrap_or_else(|| identity.name.clone());
        Ok(Some(PrepareRenameResponse::RangeWithPlaceholder {
            range: location.range,
            placeholder,
        }))
    }

    async fn rename(&self, params: RenameParams) -> RpcResult<Option<WorkspaceEdit>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let new_name = params.new_name;
        if !is_valid_name(&new_name) {
            return Ok(None);
        }
        let Some((_, identity)) = self.identity_at(&uri, position).await else {
            return Ok(None);
        };
        let loader = self.loader_for(&uri);
        Ok(references::rename_edits(&identity, &loader, &new_name).await)
    }

    async fn symbol(
        &self,
        params: WorkspaceSymbolParams,
    ) -> RpcResult<Option<OneOf<Vec<SymbolInformation>, Vec<WorkspaceSymbol>>>> {
        let root = self.root.read().await.clone();
        let Some(root) = root else {
            return Ok(None);
        };
        let Some(manifest) = find_manifest_for(&root) else {
            return Ok(None);
        };
        let symbols = self.symbol_index.search(&params.query, &manifest).await;
        if symbols.is_empty() {
            Ok(None)
        } else {
            Ok(Some(OneOf::Left(symbols)))
        }
    }

    async fn formatting(
        &self,
        params: DocumentFormattingParams,
    ) -> RpcResult<Option<Vec<TextEdit>>> {
        let uri = params.text_document.uri;
        let Some(doc) = self.documents.get(&uri).await else {
            return Ok(None);
        };
        match run_formatter(&doc.text).await {
            FormatOutcome::Formatted(formatted) => Ok(Some(vec![TextEdit {
                range: full_document_range(&doc.text),
                new_text: formatted,
            }])),
            FormatOutcome::ToolMissing(binary) => {
                self.client
                    .show_message(
                        MessageType::WARNING,
                        format!("elm-ls: `{binary}` was not found; formatting is unavailable"),
                    )
                    .await;
                Ok(None)
            }
            FormatOutcome::Failed => Ok(None),
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
