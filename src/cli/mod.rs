//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lore",
    version,
    about = "Personal document question-answering from your own files",
    long_about = "Lore indexes your documents into a per-user in-memory index and answers \
                  natural-language questions from them, citing the documents it used. Relevance \
                  feedback you record is distilled into ranking preferences for future questions."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lore/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// User identifier the command operates on
    #[arg(short, long, global = true, default_value = "local")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a text file into the user's document index
    Index {
        /// File to index
        path: PathBuf,

        /// Content type tag; inferred from the file extension when omitted
        #[arg(short = 't', long)]
        content_type: Option<String>,

        /// Remove any previously indexed copy first
        #[arg(long)]
        replace: bool,
    },

    /// Ask a question against the indexed documents
    Ask {
        /// Question text
        question: String,
    },

    /// Remove a document's chunks from the index
    Remove {
        /// Document identifier used at indexing time
        document_id: String,
    },

    /// List indexed documents
    List,

    /// Show the conversation history
    History {
        /// Clear the history instead of showing it
        #[arg(long)]
        clear: bool,
    },

    /// Record relevance feedback for a document returned by an earlier question
    Feedback {
        /// The question the judged answer belonged to
        query: String,

        /// Document identifier being judged
        document_id: String,

        /// Content type of the document; inferred from the id when omitted
        #[arg(short = 't', long)]
        content_type: Option<String>,

        /// Mark the document as not relevant (default is relevant)
        #[arg(long)]
        irrelevant: bool,
    },

    /// Show recent learning insights derived from feedback
    Insights {
        /// Maximum number of insights to show
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the standard location)
        file: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Infer a content type tag from a file name's extension.
pub fn infer_content_type(name: &str) -> String {
    match name.rsplit('.').next().map(|e| e.to_lowercase()).as_deref() {
        Some("pdf") => "pdf".to_string(),
        Some("md" | "markdown") => "markdown".to_string(),
        Some("csv" | "tsv" | "xlsx") => "spreadsheet".to_string(),
        Some("html" | "htm") => "webpage".to_string(),
        Some("txt" | "text") => "text".to_string(),
        _ => "document".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_content_type() {
        assert_eq!(infer_content_type("report.PDF"), "pdf");
        assert_eq!(infer_content_type("notes.md"), "markdown");
        assert_eq!(infer_content_type("data.csv"), "spreadsheet");
        assert_eq!(infer_content_type("budget.txt"), "text");
        assert_eq!(infer_content_type("mystery"), "document");
    }
}
