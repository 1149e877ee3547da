use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "routesale")]
#[command(about = "Route sales orders and offline sync from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the engine configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Business to act in (or ROUTESALE_BUSINESS_ID)
    #[arg(long, global = true, value_name = "ID")]
    pub business: Option<String>,

    /// Acting user (or ROUTESALE_USER_ID)
    #[arg(long, global = true, value_name = "ID")]
    pub user: Option<String>,

    /// Role of the acting user (or ROUTESALE_ROLE)
    #[arg(long, global = true, value_name = "ROLE")]
    pub role: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Server side of the sync protocol
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Manage delivery orders
    Order {
        #[command(subcommand)]
        command: OrderCommands,
    },
    /// Manage the device operation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Process a batch of operations (JSON array)
    Push {
        /// Batch file (stdin when omitted)
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// Show changes processed after a point in time
    Changes {
        /// RFC 3339 cursor from a previous page
        #[arg(long)]
        since: Option<String>,
        /// Page size
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// Create a draft order from a JSON request
    Create {
        /// Request file (stdin when omitted)
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// Show one order
    Show {
        /// Order ID
        id: String,
    },
    /// List orders
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Filter by seller
        #[arg(long)]
        seller: Option<String>,
        /// Filter by delivery date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
        /// Number of orders to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Number of orders to skip
        #[arg(long, default_value = "0")]
        offset: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the event history of an order
    Events {
        /// Order ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Patch a draft order from a JSON patch
    Update {
        /// Order ID
        id: String,
        #[command(flatten)]
        guard: GuardArgs,
        /// Patch file (stdin when omitted)
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// Confirm a draft order
    Confirm {
        /// Order ID
        id: String,
        #[command(flatten)]
        guard: GuardArgs,
    },
    /// Cancel an order
    Cancel {
        /// Order ID
        id: String,
        #[command(flatten)]
        guard: GuardArgs,
    },
    /// Change the quantity of an order line
    ModifyItem {
        /// Order ID
        id: String,
        /// Order item ID
        item: String,
        /// New quantity
        #[arg(short, long)]
        quantity: i64,
        #[command(flatten)]
        guard: GuardArgs,
    },
    /// Add a line to an order
    AddItem {
        /// Order ID
        id: String,
        /// Product variant
        #[arg(long)]
        variant: String,
        /// Quantity
        #[arg(short, long)]
        quantity: i64,
        /// Unit price
        #[arg(short, long)]
        price: i64,
        #[command(flatten)]
        guard: GuardArgs,
    },
    /// Remove a line from an order
    RemoveItem {
        /// Order ID
        id: String,
        /// Order item ID
        item: String,
        #[command(flatten)]
        guard: GuardArgs,
    },
    /// Set the final unit price of an order line
    Reprice {
        /// Order ID
        id: String,
        /// Order item ID
        item: String,
        /// Final unit price
        #[arg(short, long)]
        price: i64,
        #[command(flatten)]
        guard: GuardArgs,
    },
    /// Deliver a confirmed order and record its sale
    Deliver {
        /// Order ID
        id: String,
        #[command(flatten)]
        guard: GuardArgs,
        /// Delivered lines as JSON (all lines in full when omitted)
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued operations
    List {
        /// Only operations whose last push failed
        #[arg(long)]
        failed: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Queue a local mutation
    Enqueue {
        /// Entity collection (customers, sales, payments, distributions)
        #[arg(long)]
        entity: String,
        /// insert, update or delete
        #[arg(long)]
        action: String,
        /// Target id (a new temporary id when omitted)
        #[arg(long)]
        entity_id: Option<String>,
        /// Payload file (stdin when omitted)
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// Push the queue, then pull remote changes
    Flush {
        /// Skip pulling the change feed
        #[arg(long)]
        no_pull: bool,
    },
    /// Drop every queued operation
    Clear,
}

/// Optimistic concurrency arguments shared by order mutations
#[derive(Clone, Debug, clap::Args)]
pub struct GuardArgs {
    /// Version the change was based on
    #[arg(long, value_name = "N")]
    pub base_version: i64,
    /// Client event id for safe retries
    #[arg(long, value_name = "KEY")]
    pub event_id: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
