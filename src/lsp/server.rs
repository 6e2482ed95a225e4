use super::backend::Backend;
use std::error::Error;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::runtime::Runtime;
use tower_lsp_server::{LspService, Server};

/// Serve LSP over stdio until the client sends `exit`. Returns the
/// process exit code: 0 when `shutdown` was seen first, 1 otherwise.
pub fn serve_stdio() -> Result<i32, Box<dyn Error + Send + Sync>> {
    let runtime = Runtime::new()?;
    runtime.block_on(async {
        let shutting_down = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutting_down);
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        let (service, socket) =
            LspService::new(move |client| Backend::new(client, Arc::clone(&flag)));
        Server::new(stdin, stdout, socket).serve(service).await;
        Ok(if shutting_down.load(Ordering::SeqCst) {
            0
        } else {
            1
        })
    })
}
