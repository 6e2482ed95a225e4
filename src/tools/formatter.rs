use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub enum FormatOutcome {
    Formatted(String),
    Failed,
    ToolMissing(String),
}

pub fn formatter_binary() -> String {
    std::env::var("ELM_LS_FORMATTER").unwrap_or_else(|_| "elm-format".to_string())
}

/// Pipe the document through the external formatter and return the
/// whole formatted text.
pub async fn run_formatter(text: &str) -> FormatOutcome {
    let binary = formatter_binary();
    let spawned = Command::new(&binary)
        .arg("--stdin")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return FormatOutcome::ToolMissing(binary);
        }
        Err(_) => return FormatOutcome::Failed,
    };
    if let Some(stdin) = child.stdin.take() {
        let mut stdin = stdin;
        if stdin.write_all(text.as_bytes()).await.is_err() {
            return FormatOutcome::Failed;
        }
        drop(stdin);
    }
    let Ok(output) = child.wait_with_output().await else {
        return FormatOutcome::Failed;
    };
    if !output.status.success() {
        return FormatOutcome::Failed;
    }
    match String::from_utf8(output.stdout) {
        Ok(formatted) => FormatOutcome::Formatted(formatted),
        Err(_) => FormatOutcome::Failed,
    }
}
