// src/main.rs

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Arc;
use tapdex::{
    Aggregator, CacheStore, Catalog, CatalogHandle, CommandEvent, CommandExecutor,
    CommandRequest, Config, Filter, Package, PackageKind, Reconciler, StreamKind, Verb,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "tapdex")]
#[command(author, version, about = "Package catalog engine for Homebrew formulae and casks", long_about = None)]
struct Cli {
    /// Configuration file (default: built-in settings)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ignore cached feeds for this run
    #[arg(long, global = true)]
    refresh: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog entries
    List {
        /// Filter predicates, e.g. `formula,installed` (default: config)
        #[arg(short, long, value_delimiter = ',')]
        filter: Option<Vec<String>>,
    },
    /// List installed entries with a newer declared version
    Outdated,
    /// Show one entry
    Info {
        name: String,
        /// Look up a cask rather than a formula
        #[arg(long)]
        cask: bool,
        /// Also look up the latest upstream release
        #[arg(long)]
        release: bool,
    },
    /// Dependencies that would be installed alongside an entry
    Deps { name: String },
    /// Installed entries that depend on an entry
    Dependents { name: String },
    /// Run a package command and update the catalog
    Run {
        /// install, uninstall, upgrade, reinstall, pin or unpin
        verb: Verb,
        name: String,
        #[arg(long)]
        cask: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn kind_of(cask: bool) -> PackageKind {
    if cask {
        PackageKind::Cask
    } else {
        PackageKind::Formula
    }
}

fn print_row(package: &Package) {
    let mut flags = Vec::new();
    if package.installed {
        flags.push("installed");
    }
    if package.outdated {
        flags.push("outdated");
    }
    if package.pinned {
        flags.push("pinned");
    }
    if package.deprecated {
        flags.push("deprecated");
    }
    println!(
        "{:<32} {:<6} {:<16} {}",
        package.name,
        package.kind,
        package.full_version(),
        flags.join(",")
    );
}

fn print_info(package: &Package) {
    println!("{} ({}) {}", package.name, package.kind, package.full_version());
    println!("  tap:         {}", package.tap);
    println!("  description: {}", package.description);
    println!("  homepage:    {}", package.homepage);
    if let Some(license) = &package.license {
        println!("  license:     {}", license);
    }
    println!("  downloads:   {} (90 days)", package.downloads_90d);
    if !package.dependencies.is_empty() {
        println!("  depends on:  {}", package.dependencies.join(", "));
    }
    if !package.dependents.is_empty() {
        println!("  used by:     {}", package.dependents.join(", "));
    }
    if let Some(installed) = package.installed_full_version() {
        println!("  installed:   {}", installed);
        if let Some(on) = package.installed_on {
            println!("  installed on {}", on.format("%Y-%m-%d %H:%M"));
        }
        if let Some(size) = package.size {
            println!("  size:        {} KiB", size / 1024);
        }
    }
    if !package.install_supported {
        println!("  not installable on this platform");
    }
    if let Some(release) = &package.latest_release {
        println!("  upstream:    {} ({})", release.tag_name, release.html_url);
    }
}

fn lookup<'a>(catalog: &'a Catalog, name: &str, kind: PackageKind) -> Result<&'a Package> {
    catalog
        .get_kind(name, kind)
        .with_context(|| format!("no {kind} named '{name}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "tapdex", &mut std::io::stdout());
        return Ok(());
    }

    let config = Config::load_or_default(cli.config.as_deref())?;
    let default_filter = config.filter()?;

    let cache = Arc::new(CacheStore::new(config.cache.dir.clone(), config.cache.ttl()));
    if cli.refresh {
        cache.invalidate();
    }

    let aggregator = Aggregator::new(&config, Arc::clone(&cache))?;
    let handle = CatalogHandle::new(aggregator.load().await?);

    match cli.command {
        Commands::List { filter } => {
            let filter = match filter {
                Some(names) => Filter::parse(&names)?,
                None => default_filter,
            };
            let catalog = handle.read().await;
            for package in catalog.filtered(filter) {
                print_row(package);
            }
        }
        Commands::Outdated => {
            let catalog = handle.read().await;
            for package in catalog.outdated() {
                println!(
                    "{} ({}) < {}",
                    package.name,
                    package.installed_full_version().unwrap_or_default(),
                    package.full_version()
                );
            }
        }
        Commands::Info {
            name,
            cask,
            release,
        } => {
            let kind = kind_of(cask);
            if release {
                let package = lookup(&*handle.read().await, &name, kind)?.clone();
                let latest = aggregator.feeds().latest_release(&package).await?;
                handle
                    .write()
                    .await
                    .set_latest_release(&name, kind, latest)?;
            }
            print_info(lookup(&*handle.read().await, &name, kind)?);
        }
        Commands::Deps { name } => {
            for dep in handle.read().await.missing_dependencies(&name) {
                println!("{}", dep);
            }
        }
        Commands::Dependents { name } => {
            for dependent in handle.read().await.installed_dependents(&name) {
                println!("{}", dependent);
            }
        }
        Commands::Run { verb, name, cask } => {
            let kind = kind_of(cask);
            let request = CommandRequest::new(verb, name, kind);
            if handle.read().await.get_kind(&request.name, kind).is_none() {
                bail!("no {kind} named '{}'", request.name);
            }

            let executor = CommandExecutor::new(&config);
            let mut events = executor.spawn(&request)?;
            let mut success = false;
            while let Some(event) = events.recv().await {
                match event {
                    CommandEvent::Started { command } => info!("Running {}", command),
                    CommandEvent::Output {
                        stream: StreamKind::Stdout,
                        line,
                    } => println!("{}", line),
                    CommandEvent::Output {
                        stream: StreamKind::Stderr,
                        line,
                    } => eprintln!("{}", line),
                    CommandEvent::Finished { success: ok, code } => {
                        success = ok;
                        if !ok {
                            let command = executor.command_line(&request);
                            match code {
                                Some(code) => bail!("{command} failed with exit code {code}"),
                                None => bail!("{command} was terminated by a signal"),
                            }
                        }
                    }
                }
            }

            if success {
                Reconciler::new(&config).apply(&handle, &request).await?;
                if let Some(package) = handle.read().await.get_kind(&request.name, kind) {
                    print_row(package);
                }
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
