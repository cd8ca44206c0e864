//! # WordTree CLI Entry Point
//!
//! Main binary for WordTree. Starts a root or a worker node and prints every
//! count the node computes locally as one JSON object per line.
//!
//! ## Usage
//!
//! ```bash
//! # Start the root, give workers 10s to join, then count words.txt
//! wordtree root --file words.txt --wait-secs 10
//!
//! # Join the tree whose root is at 10.0.0.1 (redirects place the node deeper)
//! wordtree worker --coordinator 10.0.0.1
//!
//! # Pin the address a node announces (else WORDTREE_HOST, else auto-detect)
//! wordtree worker --coordinator 10.0.0.1 --host 10.0.0.7
//! ```
//!
//! Every node of one tree must use the same `--base-port`, and a worker must
//! name the root as its `--coordinator`: a worker starts one level below the
//! node it names, so only the root listens on the ports its join goes to.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use wordtree_cli::{read_words, render_counts, resolve_host};
use wordtree_node::{Node, NodeConfig};

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// WordTree - distributed word counting over a tree of peer nodes
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Root(RootArgs),
    Worker(WorkerArgs),
}

/// Settings shared by both roles.
struct TreeOptions {
    host: Option<IpAddr>,
    base_port: u16,
    max_workers: usize,
    unit: usize,
}

impl TreeOptions {
    fn config(&self) -> NodeConfig {
        NodeConfig::default()
            .with_base_port(self.base_port)
            .with_max_workers_per_branch(self.max_workers)
            .with_min_fragment_unit(self.unit)
    }
}

/// Arguments for starting the root of a tree.
///
/// # Example
///
/// ```bash
/// wordtree root -f words.txt -w 5
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "root")]
/// start the root node and count a text file
struct RootArgs {
    /// text file whose whitespace-separated words form the job
    #[argh(option, short = 'f')]
    file: PathBuf,

    /// seconds to wait for workers to join before injecting the job
    #[argh(option, short = 'w', default = "5")]
    wait_secs: u64,

    /// address this node announces and listens on
    #[argh(option)]
    host: Option<IpAddr>,

    /// first port of the root's namespace (every node of a tree must agree)
    #[argh(option, default = "wordtree_node::config::DEFAULT_BASE_PORT")]
    base_port: u16,

    /// direct workers accepted before joiners are redirected
    #[argh(option, default = "wordtree_node::config::DEFAULT_MAX_WORKERS_PER_BRANCH")]
    max_workers: usize,

    /// words per unit of worker capacity
    #[argh(option, default = "wordtree_node::config::DEFAULT_MIN_FRAGMENT_UNIT")]
    unit: usize,
}

/// Arguments for joining a tree as a worker.
#[derive(FromArgs)]
#[argh(subcommand, name = "worker")]
/// start a worker node under a coordinator
struct WorkerArgs {
    /// address of the tree's root; joins are redirected down from there
    #[argh(option, short = 'c')]
    coordinator: IpAddr,

    /// address this node announces and listens on
    #[argh(option)]
    host: Option<IpAddr>,

    /// first port of the root's namespace (every node of a tree must agree)
    #[argh(option, default = "wordtree_node::config::DEFAULT_BASE_PORT")]
    base_port: u16,

    /// direct workers accepted before joiners are redirected
    #[argh(option, default = "wordtree_node::config::DEFAULT_MAX_WORKERS_PER_BRANCH")]
    max_workers: usize,

    /// words per unit of worker capacity
    #[argh(option, default = "wordtree_node::config::DEFAULT_MIN_FRAGMENT_UNIT")]
    unit: usize,
}

impl RootArgs {
    fn options(&self) -> TreeOptions {
        TreeOptions {
            host: self.host,
            base_port: self.base_port,
            max_workers: self.max_workers,
            unit: self.unit,
        }
    }
}

impl WorkerArgs {
    fn options(&self) -> TreeOptions {
        TreeOptions {
            host: self.host,
            base_port: self.base_port,
            max_workers: self.max_workers,
            unit: self.unit,
        }
    }
}

/// Prints counts as they come in until ctrl-c, then shuts the node down.
async fn print_counts_until_interrupted(node: &Node) -> Result<()> {
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            result = &mut interrupted => {
                result?;
                tracing::info!("Interrupted, shutting down");
                break;
            }
            counts = node.poll_result() => {
                if let Some(counts) = counts {
                    println!("{}", render_counts(&counts)?);
                }
            }
        }
    }

    node.shutdown().await;
    Ok(())
}

async fn run_root(args: RootArgs) -> Result<()> {
    let options = args.options();
    let own_addr = resolve_host(options.host)?;
    let words = read_words(&args.file)?;

    let node = Node::start(options.config(), own_addr, None)?;
    tracing::info!("Root started at {}, ports {:?}", own_addr, node.ports());

    tracing::info!("Waiting {}s for workers to join", args.wait_secs);
    tokio::time::sleep(Duration::from_secs(args.wait_secs)).await;

    tracing::info!(
        "Injecting job of {} words from {} ({} workers)",
        words.len(),
        args.file.display(),
        node.model().worker_count()
    );
    node.submit_job(words);

    print_counts_until_interrupted(&node).await
}

async fn run_worker(args: WorkerArgs) -> Result<()> {
    let options = args.options();
    let own_addr = resolve_host(options.host)?;

    let node = Node::start(options.config(), own_addr, Some(args.coordinator))?;
    tracing::info!(
        "Worker {} joining {}, ports {:?}",
        own_addr,
        args.coordinator,
        node.ports()
    );

    print_counts_until_interrupted(&node).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Set default log level to INFO, but allow RUST_LOG env var to override.
    // Logs go to stderr so stdout carries only counts.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Root(args) => run_root(args).await,
        Commands::Worker(args) => run_worker(args).await,
    }
}
