use crate::lsp::text::{path_to_uri, uri_to_path};
use crate::project::find_manifest_for;
use crate::tools::compiler::{run_compiler, CompileOutcome};
use std::{collections::HashMap, sync::Mutex, time::Duration};
use tokio::task::JoinHandle;
use tower_lsp_server::lsp_types::{MessageType, Uri};
use tower_lsp_server::Client;

const DEBOUNCE: Duration = Duration::from_millis(300);

/// Per-URI debounce over external compiler runs: a new save within the
/// window cancels the pending run.
#[derive(Default)]
pub struct DiagnosticsScheduler {
    pending: Mutex<HashMap<Uri, JoinHandle<()>>>,
}

impl DiagnosticsScheduler {
    pub fn schedule(&self, uri: Uri, client: Client) {
        let handle = tokio::spawn(compile_and_publish(uri.clone(), client));
        let Ok(mut pending) = self.pending.lock() else {
            handle.abort();
            return;
        };
        if let Some(superseded) = pending.insert(uri, handle) {
            superseded.abort();
        }
    }
}

async fn compile_and_publish(uri: Uri, client: Client) {
    tokio::time::sleep(DEBOUNCE).await;
    let Some(path) = uri_to_path(&uri) else {
        return;
    };
    let Some(manifest) = find_manifest_for(&path) else {
        return;
    };
    match run_compiler(&path, &manifest.project_folder).await {
        CompileOutcome::Report(by_file) => {
            let saved = path.canonicalize().ok();
            let mut saved_mentioned = false;
            for (file, diagnostics) in by_file {
                if file.canonicalize().ok() == saved && saved.is_some() {
                    saved_mentioned = true;
                }
                let Some(file_uri) = path_to_uri(&file) else {
                    continue;
                };
                client.publish_diagnostics(file_uri, diagnostics, None).await;
            }
            // Clear stale diagnostics on the saved file when the report
            // moved on to other files.
            if !saved_mentioned {
                client.publish_diagnostics(uri, Vec::new(), None).await;
            }
        }
        CompileOutcome::NoReport => {
            client.publish_diagnostics(uri, Vec::new(), None).await;
        }
        CompileOutcome::ToolMissing(binary) => {
            client
                .show_message(
                    MessageType::WARNING,
                    format!("elm-ls: `{binary}` was not found; diagnostics are unavailable"),
                )
                .await;
        }
    }
}
