use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use strata_content::NodeType;
use strata_query::Property;
use strata_repo::RemoteKind;
use strata_types::{Author, Id};

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Strata: versioned pages, tables and assets for many tenants",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Directory holding one repository per tenant [default: .]
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[arg(long, global = true, default_value = "default")]
    pub tenant: String,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Author of the revisions, as `Name <email>` [default: from config]
    #[arg(long, global = true)]
    pub author: Option<Author>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the tenant's repository
    Init,
    /// Pages, tables and hybrids
    Node(NodeArgs),
    /// Records of a table
    Record(RecordArgs),
    /// Saved views of a table
    View(ViewArgs),
    /// Files attached to a node
    Asset(AssetArgs),
    /// Find pages and records by substring
    Search(SearchArgs),
    /// Manage remotes
    Remote(RemoteArgs),
    /// Push the tenant's history to a remote
    Push(SyncArgs),
    /// Pull and fast-forward from a remote
    Pull(SyncArgs),
    /// Show storage used against the configured quotas
    Usage,
}

// ---------------------------------------------------------------------------
// node
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct NodeArgs {
    #[command(subcommand)]
    pub action: NodeAction,
}

#[derive(Subcommand)]
pub enum NodeAction {
    List,
    Create {
        title: String,
        #[arg(long, default_value = "document")]
        kind: NodeType,
        #[arg(long)]
        parent: Option<Id>,
        #[arg(long, default_value = "")]
        content: String,
        /// Column as `name:type`, `!` after the type marks it required
        #[arg(long = "property")]
        properties: Vec<Property>,
    },
    Show {
        id: Id,
    },
    Update {
        id: Id,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        /// Comma-separated; an empty value clears the tags
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        cover: Option<String>,
        /// Replaces the whole schema when given at least once
        #[arg(long = "property")]
        properties: Vec<Property>,
    },
    Delete {
        id: Id,
    },
    History {
        id: Id,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    Version {
        id: Id,
        rev: String,
    },
    /// Changes to the page body since `rev`
    Diff {
        id: Id,
        rev: String,
    },
    /// Pages linking to the node
    Backlinks {
        id: Id,
    },
}

// ---------------------------------------------------------------------------
// record / view
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RecordArgs {
    #[command(subcommand)]
    pub action: RecordAction,
}

#[derive(Subcommand)]
pub enum RecordAction {
    Add {
        node: Id,
        /// JSON object of property values
        data: String,
    },
    List {
        node: Id,
        #[arg(long)]
        view: Option<Id>,
        /// JSON filter or array of filters
        #[arg(long)]
        filter: Option<String>,
        /// JSON sort or array of sorts
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, default_value = "0")]
        offset: usize,
        /// Zero lists everything
        #[arg(long, default_value = "0")]
        limit: usize,
        /// Bucket by the view's group property
        #[arg(long)]
        grouped: bool,
    },
    Update {
        node: Id,
        id: Id,
        data: String,
    },
    Delete {
        node: Id,
        id: Id,
    },
}

#[derive(Args)]
pub struct ViewArgs {
    #[command(subcommand)]
    pub action: ViewAction,
}

#[derive(Subcommand)]
pub enum ViewAction {
    Create {
        node: Id,
        name: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        /// Property to group by
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        default: bool,
    },
    Delete {
        node: Id,
        view: Id,
    },
}

// ---------------------------------------------------------------------------
// asset / search / remote
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct AssetArgs {
    #[command(subcommand)]
    pub action: AssetAction,
}

#[derive(Subcommand)]
pub enum AssetAction {
    Add {
        node: Id,
        path: PathBuf,
        /// Stored name, defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
    List {
        node: Id,
    },
    Delete {
        node: Id,
        name: String,
    },
}

#[derive(Args)]
pub struct SearchArgs {
    pub query: String,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long)]
    pub title: bool,
    #[arg(long)]
    pub body: bool,
    #[arg(long)]
    pub fields: bool,
}

#[derive(Args)]
pub struct RemoteArgs {
    #[command(subcommand)]
    pub action: RemoteAction,
}

#[derive(Subcommand)]
pub enum RemoteAction {
    /// Add or change a remote; an empty url removes it
    Set {
        name: String,
        url: String,
        #[arg(long)]
        token: Option<String>,
        #[arg(long, default_value = "generic")]
        kind: RemoteKind,
    },
}

#[derive(Args)]
pub struct SyncArgs {
    #[arg(default_value = "origin")]
    pub remote: String,
    /// Defaults to the current branch
    pub branch: Option<String>,
}
