//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// planmark - annotate markdown plans and track review cycles
#[derive(Parser, Debug)]
#[command(name = "pm", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root (default: discovered from the working directory)
    #[arg(long, global = true, env = "PLANMARK_PROJECT")]
    pub project: Option<PathBuf>,

    /// Output as JSON (default when stdout is not a terminal)
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize planmark in the current directory
    Init {
        /// Plan root relative to the project
        #[arg(long, default_value = "plan")]
        plan_root: String,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Index one document, or every document under the plan root
    Index {
        /// Document path relative to the project root
        path: Option<String>,
    },

    /// Show the heading outline of a document
    Outline {
        /// Document path relative to the project root
        path: String,
    },

    /// Locate a quote in a document
    Resolve(ResolveArgs),

    /// Annotation management
    Annotate {
        #[command(subcommand)]
        command: AnnotateCommands,
    },

    /// Review cycle management
    Cycle {
        #[command(subcommand)]
        command: CycleCommands,
    },

    /// Per-node UI state
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },

    /// Watch the plan root and stream change events as JSON lines
    Watch,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Quote plus optional disambiguation, shared by `resolve` and
/// `annotate create`.
#[derive(Args, Debug, Clone, Default)]
pub struct QuoteArgs {
    /// Restrict the search to this section (and its subsections)
    #[arg(long)]
    pub section: Option<String>,

    /// Text expected immediately before the quote
    #[arg(long)]
    pub prefix: Option<String>,

    /// Text expected immediately after the quote
    #[arg(long)]
    pub suffix: Option<String>,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Document path relative to the project root
    pub path: String,

    /// Exact text to find
    pub quote: String,

    #[command(flatten)]
    pub context: QuoteArgs,
}

// ============================================================================
// Annotate Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum AnnotateCommands {
    /// Create an annotation on a file, section or quoted selection
    Create(AnnotateCreateArgs),

    /// List annotations
    List {
        /// Only annotations on this document
        #[arg(long)]
        path: Option<String>,

        /// Filter by status ("active" for open/in_progress/blocked, "all")
        #[arg(short, long, default_value = "active")]
        status: String,

        /// Only annotations in this cycle
        #[arg(long)]
        cycle: Option<String>,
    },

    /// Show one annotation
    Show {
        /// Annotation ID
        id: String,
    },

    /// Update an annotation
    Update(AnnotateUpdateArgs),

    /// Relocate selection anchors in the current document text
    Reanchor {
        /// Annotation IDs
        ids: Vec<String>,

        /// Every active selection annotation
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },

    /// Archive annotations
    Archive {
        /// Annotation IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Args, Debug)]
pub struct AnnotateCreateArgs {
    /// Document path relative to the project root
    pub path: String,

    /// Annotation text
    pub body: String,

    /// Quoted text to anchor to (selection target)
    #[arg(long)]
    pub quote: Option<String>,

    // --section alone targets the section; with --quote it narrows the search
    #[command(flatten)]
    pub context: QuoteArgs,

    /// Annotation kind
    #[arg(short, long, value_enum, default_value_t = KindArg::Note)]
    pub kind: KindArg,

    /// Priority (low, medium, high, critical or P0-P3)
    #[arg(short, long)]
    pub priority: Option<String>,

    /// Tags (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Work link as LABEL=URL (repeatable)
    #[arg(long = "link")]
    pub links: Vec<String>,
}

#[derive(Args, Debug)]
pub struct AnnotateUpdateArgs {
    /// Annotation ID
    pub id: String,

    /// New text
    #[arg(long)]
    pub body: Option<String>,

    /// New status
    #[arg(short, long)]
    pub status: Option<String>,

    /// New priority
    #[arg(short, long)]
    pub priority: Option<String>,

    /// Replace tags (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Raw JSON merge patch applied after the other flags
    #[arg(long)]
    pub patch: Option<String>,
}

/// Annotation kinds accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Todo,
    Note,
    Risk,
}

// ============================================================================
// Cycle Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum CycleCommands {
    /// Open a new cycle
    Create {
        /// Cycle title
        title: String,
    },

    /// List cycles
    List {
        /// Include closed cycles
        #[arg(long)]
        all: bool,
    },

    /// Show one cycle with its annotations
    Show {
        /// Cycle ID
        id: String,
    },

    /// Add annotations to an open cycle
    Add {
        /// Cycle ID
        id: String,

        /// Annotation IDs
        #[arg(required = true)]
        annotations: Vec<String>,
    },

    /// Close a cycle
    Close {
        /// Cycle ID
        id: String,
    },

    /// Store a rendered bundle for a cycle
    Bundle {
        /// Cycle ID
        id: String,

        /// File holding the payload (default: stdin)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Payload format
        #[arg(long, value_enum, default_value_t = FormatArg::Markdown)]
        format: FormatArg,
    },

    /// Record a git commit against a cycle
    Revision {
        /// Cycle ID
        id: String,

        /// Commit to record
        #[arg(long, default_value = "HEAD")]
        commit: String,
    },
}

/// Bundle formats accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Markdown,
    Text,
    Json,
}

// ============================================================================
// Node Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum NodeCommands {
    /// Show the stored fields for a node
    Show {
        /// Node ID (e.g. plan/roadmap.md#risks)
        node: String,
    },

    /// Merge fields into a node's metadata
    Set {
        /// Node ID
        node: String,

        /// KEY=VALUE pairs; VALUE is parsed as JSON when possible
        #[arg(required = true)]
        fields: Vec<String>,
    },
}
