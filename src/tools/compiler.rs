use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tower_lsp_server::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

/// What invoking the external compiler produced.
pub enum CompileOutcome {
    /// Problems per absolute file path.
    Report(HashMap<PathBuf, Vec<Diagnostic>>),
    /// Clean build, or a failure without a machine-readable report.
    NoReport,
    /// The binary could not be spawned at all.
    ToolMissing(String),
}

pub fn compiler_binary() -> String {
    std::env::var("ELM_LS_COMPILER").unwrap_or_else(|_| "elm".to_string())
}

/// `elm make --report=json` against one entry file, from the project
/// folder. The report arrives on stderr.
pub async fn run_compiler(file: &Path, project_folder: &Path) -> CompileOutcome {
    let binary = compiler_binary();
    let spawned = Command::new(&binary)
        .arg("make")
        .arg(file)
        .arg("--report=json")
        .arg("--output=/dev/null")
        .current_dir(project_folder)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;
    let output = match spawned {
        Ok(output) => output,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return CompileOutcome::ToolMissing(binary);
        }
        Err(_) => return CompileOutcome::NoReport,
    };
    if output.status.success() {
        return CompileOutcome::NoReport;
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    match serde_json::from_str::<Report>(stderr.trim()) {
        Ok(report) => CompileOutcome::Report(report.into_diagnostics(project_folder)),
        Err(_) => CompileOutcome::NoReport,
    }
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Report {
    #[serde(rename = "compile-errors")]
    CompileErrors { errors: Vec<FileErrors> },
    #[serde(rename = "error")]
    GeneralError {
        path: Option<String>,
        title: String,
        message: Vec<MessagePart>,
    },
}

#[derive(Deserialize)]
struct FileErrors {
    path: String,
    problems: Vec<Problem>,
}

#[derive(Deserialize)]
struct Problem {
    title: String,
    region: Region,
    message: Vec<MessagePart>,
}

#[derive(Deserialize)]
struct Region {
    start: ReportPosition,
    end: ReportPosition,
}

#[derive(Deserialize)]
struct ReportPosition {
    line: u32,
    column: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessagePart {
    Text(String),
    Styled { string: String },
}

impl Report {
    fn into_diagnostics(self, project_folder: &Path) -> HashMap<PathBuf, Vec<Diagnostic>> {
        let mut by_file: HashMap<PathBuf, Vec<Diagnostic>> = HashMap::new();
        match self {
            Report::CompileErrors { errors } => {
                for file in errors {
                    let path = absolute(project_folder, &file.path);
                    let diagnostics = by_file.entry(path).or_default();
                    for problem in file.problems {
                        diagnostics.push(Diagnostic {
                            range: problem.region.to_range(),
                            severity: Some(DiagnosticSeverity::ERROR),
                            source: Some("elm".into()),
                            message: format!(
                                "{}\n\n{}",
                                problem.title,
                                join_message(&problem.message)
                            ),
                            ..Default::default()
                        });
                    }
                }
            }
            Report::GeneralError {
                path,
                title,
                message,
            } => {
                if let Some(path) = path {
                    let path = absolute(project_folder, &path);
                    by_file.entry(path).or_default().push(Diagnostic {
                        range: Range::new(Position::new(0, 0), Position::new(0, 0)),
                        severity: Some(DiagnosticSeverity::ERROR),
                        source: Some("elm".into()),
                        message: format!("{}\n\n{}", title, join_message(&message)),
                        ..Default::default()
                    });
                }
            }
        }
        by_file
    }
}

impl Region {
    fn to_range(&self) -> Range {
        Range::new(
            Position::new(
                self.start.line.saturating_sub(1),
                self.start.column.saturating_sub(1),
            ),
            Position::new(
                self.end.line.saturating_sub(1),
                self.end.column.saturating_sub(1),
            ),
        )
    }
}

fn join_message(parts: &[MessagePart]) -> String {
    parts
        .iter()
        .map(|part| match part {
            MessagePart::Text(text) => text.as_str(),
            MessagePart::Styled { string } => string.as_str(),
        })
        .collect()
}

fn absolute(project_folder: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        project_folder.join(path)
    }
}
