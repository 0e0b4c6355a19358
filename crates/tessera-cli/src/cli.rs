use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tessera", about = "Tessera, a multi-tenant content server", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve every site over HTTP
    Serve(ServeArgs),
    /// List discovered sites and their modules
    Sites(SitesArgs),
    /// Load every site and report configuration errors
    Check(SitesArgs),
    /// Render one path of one site to stdout
    Render(RenderArgs),
}

/// Where sites and shared modules live.
#[derive(Args, Clone)]
pub struct SiteRoots {
    /// Server configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Directory with one subdirectory per site
    #[arg(long)]
    pub sites: Option<PathBuf>,
    /// Extra module directory, searched after each site's own
    #[arg(long = "modules")]
    pub module_roots: Vec<PathBuf>,
}

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub roots: SiteRoots,
    #[arg(short, long)]
    pub bind: Option<String>,
    #[arg(long)]
    pub cors: bool,
}

#[derive(Args)]
pub struct SitesArgs {
    #[command(flatten)]
    pub roots: SiteRoots,
}

#[derive(Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub roots: SiteRoots,
    /// Site name
    pub site: String,
    /// Request path
    #[arg(default_value = "/")]
    pub path: String,
}
