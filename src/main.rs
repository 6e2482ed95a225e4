use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "elm-ls", version, about = "Language server for Elm projects")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the language server over stdio
    Lsp,
}

fn main() {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Lsp) {
        Commands::Lsp => match elm_ls::lsp::serve_stdio() {
            Ok(code) => std::process::exit(code),
            Err(err) => {
                eprintln!("elm-ls: {err}");
                std::process::exit(1);
            }
        },
    }
}
