//! bpm command-line tool.
//!
//! Adds, updates, scans, installs and removes dependencies that live as
//! git submodules under the current package.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use bpm_core::config::BpmConfig;
use bpm_core::installer::installer_for;
use bpm_core::manifest::DependencySpec;
use bpm_core::remote::RemoteUrl;
use bpm_core::resolver::{record_walk, CheckoutState};
use bpm_core::runner::ProcessRunner;
use bpm_core::{
    DependencyNode, GitCli, JsonManifestStore, Manifest, ManifestStore, ModuleCache, Resolver,
    ResolverOptions,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Package manager whose dependencies are git submodules.
#[derive(Parser, Debug)]
#[command(name = "bpm", version, about = "Manage dependencies as nested git checkouts")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "bpm.toml")]
    config: PathBuf,

    /// Remote of the root repository dependencies are pulled from.
    #[arg(long = "remotename", global = true)]
    remote_name: Option<String>,

    /// Base URL that bare dependency names are resolved against.
    #[arg(long = "remoteurl", global = true)]
    remote_url: Option<String>,

    /// Directory holding local working copies that override dependencies.
    #[arg(long = "local", global = true)]
    local_path: Option<PathBuf>,

    /// Package manager used by `install`: npm or yarn.
    #[arg(long = "pkgm", global = true)]
    package_manager: Option<String>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a dependency and check it out.
    Add {
        /// Repository URL or bare name of the dependency.
        url: String,

        /// Dependency name. Defaults to the repository name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Synchronize dependencies with their sources.
    Update {
        /// Only update this dependency.
        name: Option<String>,

        /// Re-synchronize every descendant, not just the named dependencies.
        #[arg(long)]
        deep: bool,
    },

    /// Show the commit every dependency is checked out at.
    Scan,

    /// Hand the newest version of every dependency to the package manager.
    Install,

    /// List the dependencies declared by this package.
    Ls,

    /// Drop a dependency from the manifest and delete its checkout.
    Remove {
        /// Name of the dependency to remove.
        name: String,
    },

    /// Show dependency checkouts with uncommitted changes.
    Status,

    /// Delete the modules directory and every checkout in it.
    Clean,

    /// Print the bpm version.
    Version,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Version = cli.command {
        println!("bpm {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let root = std::env::current_dir().context("failed to determine working directory")?;
    let config = load_config(&cli, &root)?;
    let ctx = Workspace::new(config, root);

    match cli.command {
        Commands::Add { url, name } => cmd_add(&ctx, &url, name),
        Commands::Update { name, deep } => cmd_update(&ctx, name.as_deref(), deep),
        Commands::Scan => cmd_scan(&ctx),
        Commands::Install => cmd_install(&ctx),
        Commands::Ls => cmd_ls(&ctx),
        Commands::Remove { name } => cmd_remove(&ctx, &name),
        Commands::Status => cmd_status(&ctx),
        Commands::Clean => cmd_clean(&ctx),
        Commands::Version => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(cli: &Cli, root: &Path) -> Result<BpmConfig> {
    let mut config = BpmConfig::load_or_default(&cli.config).context("failed to load configuration file")?;

    if let Some(name) = &cli.remote_name {
        config.resolver.remote_name = name.clone();
    }
    if let Some(url) = &cli.remote_url {
        config.resolver.remote_url = Some(url.clone());
    }
    if let Some(local) = &cli.local_path {
        config.resolver.local_path = Some(local.clone());
    }
    if let Some(pkgm) = &cli.package_manager {
        config.install.package_manager = pkgm.clone();
    }

    config.resolve_paths(root);
    config.validate().context("invalid configuration")?;
    debug!(?config, "configuration loaded");
    Ok(config)
}

/// Everything a command needs: config, the root package and its adapters.
struct Workspace {
    config: BpmConfig,
    root: PathBuf,
    git: GitCli,
    manifests: JsonManifestStore,
}

impl Workspace {
    fn new(config: BpmConfig, root: PathBuf) -> Self {
        let manifests = JsonManifestStore::new(config.resolver.manifest_file.clone());
        Self {
            config,
            root,
            git: GitCli::new(),
            manifests,
        }
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(
            &self.git,
            &self.manifests,
            ResolverOptions::from_config(&self.config.resolver, &self.root),
        )
    }

    fn load_manifest(&self) -> Result<Manifest> {
        self.manifests.load(&self.root).with_context(|| {
            format!(
                "failed to load {} in {}",
                self.manifests.file_name(),
                self.root.display()
            )
        })
    }

    /// Record a finished walk in the root manifest: commit pins and, when
    /// anything moved, a patch version bump.
    fn save_pins(&self, manifest: &mut Manifest, cache: &ModuleCache) -> Result<()> {
        if record_walk(manifest, cache).context("failed to bump manifest version")? {
            self.save_manifest(manifest)?;
            info!(version = %manifest.version, "updated dependency commits in manifest");
        }
        Ok(())
    }

    fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        self.manifests
            .save(&self.root, manifest)
            .context("failed to save manifest")
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_add(ctx: &Workspace, url: &str, name: Option<String>) -> Result<()> {
    let mut manifest = ctx.load_manifest()?;
    let name = match name {
        Some(n) => n,
        None => RemoteUrl::parse(url)
            .context("invalid dependency URL")?
            .bare_name()
            .to_string(),
    };
    if name.is_empty() {
        bail!("cannot derive a dependency name from '{}', pass --name", url);
    }

    let spec = DependencySpec::new(url);
    let resolver = ctx.resolver();
    let node = resolver
        .node(&name, &spec, &ctx.root)
        .with_context(|| format!("failed to resolve dependency '{}'", name))?;
    manifest.dependencies.insert(name.clone(), spec);

    let mut cache = ModuleCache::new();
    resolver
        .add(&node, &mut cache)
        .with_context(|| format!("failed to add '{}'", name))?;

    record_walk(&mut manifest, &cache).context("failed to bump manifest version")?;
    ctx.save_manifest(&manifest)?;

    println!("{}", style::success(&format!("added {} ({})", name, node.source)));
    Ok(())
}

fn cmd_update(ctx: &Workspace, name: Option<&str>, deep: bool) -> Result<()> {
    let mut manifest = ctx.load_manifest()?;
    let resolver = ctx.resolver();
    let nodes = select_nodes(resolver.root_nodes(&manifest)?, name)?;

    let mut cache = ModuleCache::new();
    for node in &nodes {
        resolver
            .update(node, deep, &mut cache)
            .with_context(|| format!("failed to update '{}'", node.name))?;
    }
    ctx.save_pins(&mut manifest, &cache)?;

    print_cache("Updated", &cache);
    Ok(())
}

fn cmd_scan(ctx: &Workspace) -> Result<()> {
    let manifest = ctx.load_manifest()?;
    let resolver = ctx.resolver();

    let mut cache = ModuleCache::new();
    for node in resolver.root_nodes(&manifest)? {
        resolver
            .scan(&node, &mut cache)
            .with_context(|| format!("failed to scan '{}'", node.name))?;
    }

    print_cache("Dependencies", &cache);
    Ok(())
}

fn cmd_install(ctx: &Workspace) -> Result<()> {
    let manifest = ctx.load_manifest()?;
    let resolver = ctx.resolver();

    let mut cache = ModuleCache::new();
    for node in resolver.root_nodes(&manifest)? {
        resolver
            .install(&node, &mut cache)
            .with_context(|| format!("failed to resolve '{}' for install", node.name))?;
    }

    let runner = ProcessRunner;
    let installer = installer_for(&ctx.config.install, &runner, &ctx.root)?;
    let count = installer.install(&cache).context("package install failed")?;

    println!("{}", style::success(&format!("installed {} module(s)", count)));
    Ok(())
}

fn cmd_ls(ctx: &Workspace) -> Result<()> {
    let manifest = ctx.load_manifest()?;
    if manifest.dependencies.is_empty() {
        println!("No dependencies declared.");
        return Ok(());
    }

    println!();
    println!("{}", style::header(&format!("{} {}", manifest.name, manifest.version)));
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "URL", "Commit"]);
    for (name, spec) in &manifest.dependencies {
        let commit = if spec.commit.is_empty() {
            style::dim("unpinned")
        } else {
            style::short_commit(&spec.commit).to_string()
        };
        table.add_row(vec![Cell::new(name), Cell::new(&spec.url), Cell::new(commit)]);
    }
    println!("{}", table);
    Ok(())
}

fn cmd_remove(ctx: &Workspace, name: &str) -> Result<()> {
    let mut manifest = ctx.load_manifest()?;
    let Some(spec) = manifest.dependencies.get(name) else {
        bail!("'{}' is not a declared dependency", name);
    };

    let resolver = ctx.resolver();
    let node = resolver
        .node(name, spec, &ctx.root)
        .with_context(|| format!("failed to resolve dependency '{}'", name))?;
    let mut cache = ModuleCache::new();
    let removed = resolver
        .remove(&node, &mut cache)
        .with_context(|| format!("failed to remove '{}'", name))?;

    manifest.dependencies.remove(name);
    ctx.save_manifest(&manifest)?;

    if removed {
        println!("{}", style::success(&format!("removed {}", name)));
    } else {
        println!("{}", style::success(&format!("removed {} (no checkout)", name)));
    }
    Ok(())
}

fn cmd_status(ctx: &Workspace) -> Result<()> {
    let manifest = ctx.load_manifest()?;
    let resolver = ctx.resolver();

    let mut statuses = Vec::new();
    for node in resolver.root_nodes(&manifest)? {
        resolver
            .status(&node, &mut statuses)
            .with_context(|| format!("failed to read status of '{}'", node.name))?;
    }

    let dirty: Vec<_> = statuses
        .iter()
        .filter(|s| s.state != CheckoutState::Clean)
        .collect();
    if dirty.is_empty() {
        println!("{}", style::success("all dependencies are clean"));
        return Ok(());
    }

    println!();
    println!("{}", style::header("Status"));
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "State", "Path"]);
    for status in dirty {
        let state = match status.state {
            CheckoutState::Modified => "modified".to_string(),
            CheckoutState::Missing => style::dim("missing"),
            CheckoutState::Clean => "clean".to_string(),
        };
        table.add_row(vec![
            Cell::new(&status.name),
            Cell::new(state),
            Cell::new(status.checkout_path.display()),
        ]);
    }
    println!("{}", table);
    println!();
    Ok(())
}

fn cmd_clean(ctx: &Workspace) -> Result<()> {
    let resolver = ctx.resolver();
    let modules = ctx.root.join(&resolver.options().modules_dir);
    if resolver.clean().context("failed to clean modules directory")? {
        println!("{}", style::success(&format!("removed {}", modules.display())));
    } else {
        println!("Nothing to clean.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn select_nodes(nodes: Vec<DependencyNode>, name: Option<&str>) -> Result<Vec<DependencyNode>> {
    let Some(name) = name else {
        return Ok(nodes);
    };
    let selected: Vec<_> = nodes.into_iter().filter(|n| n.name == name).collect();
    if selected.is_empty() {
        bail!("'{}' is not a declared dependency", name);
    }
    Ok(selected)
}

fn print_cache(title: &str, cache: &ModuleCache) {
    if cache.is_empty() {
        println!("No dependencies.");
        return;
    }

    println!();
    println!("{}", style::header(title));
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Commit", "Path"]);
    for item in cache.iter() {
        table.add_row(vec![
            Cell::new(&item.name),
            Cell::new(item.commit.as_deref().map(style::short_commit).unwrap_or("-")),
            Cell::new(item.checkout_path.display()),
        ]);
    }
    println!("{}", table);
    println!();
}
