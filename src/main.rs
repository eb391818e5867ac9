// src/main.rs

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use cupertino::config::{self, Config, Layout};
use cupertino::db::PackageStore;
use cupertino::installer::{self, Confirm, InstallAction, InstallReport, Installer, UninstallOutcome};
use cupertino::package::MANIFEST_FILE;
use cupertino::publish::{self, InitAnswers};
use cupertino::repository::{Registry, RegistryClient};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "cupertino")]
#[command(author, version, about = "Local package manager with constraint-based dependency resolution", long_about = None)]
struct Cli {
    /// Assume yes to all confirmation prompts
    #[arg(short = 'y', long = "yes", global = true)]
    yes: bool,

    /// Install root directory
    #[arg(long, value_name = "PATH", env = config::ROOT_ENV, default_value = config::DEFAULT_ROOT, global = true)]
    root: PathBuf,

    /// Registry base URL
    #[arg(long, value_name = "URL", env = config::REGISTRY_ENV, default_value = config::DEFAULT_REGISTRY, global = true)]
    registry: String,

    /// API key used by `publish`
    #[arg(long = "api-key", env = config::API_KEY_ENV, hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package from the registry (name[@version]) or a local .tar.gz
    Install {
        /// Package spec or path to a package archive
        target: String,
    },
    /// Uninstall a package
    Uninstall {
        /// Package name
        name: String,
    },
    /// Search the registry
    Search {
        /// Search query
        query: String,
    },
    /// Show registry details for a package
    Info {
        /// Package name
        name: String,
    },
    /// Upgrade one package, or every installed package
    Upgrade {
        /// Package name (upgrades all if omitted)
        name: Option<String>,
    },
    /// List installed packages
    List,
    /// Create a package.json in the current directory
    Init,
    /// Publish the package in the current directory
    Publish {
        /// Validate without uploading
        #[arg(long)]
        dry_run: bool,
    },
    /// Print version information
    Version,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            layout: Layout::new(&self.root),
            registry_url: self.registry.clone(),
            api_key: self.api_key.clone().filter(|k| !k.is_empty()),
            assume_yes: self.yes,
        }
    }
}

/// Confirmation on the controlling terminal
struct TerminalPrompt {
    assume_yes: bool,
}

impl Confirm for TerminalPrompt {
    fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }

        print!("{} (y/N): ", message);
        let _ = io::stdout().flush();

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        is_yes(&line)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Ask for a value, falling back to `default` on an empty answer
fn ask(label: &str, default: &str) -> Result<String> {
    if default.is_empty() {
        print!("{}: ", label);
    } else {
        print!("{} ({}): ", label, default);
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    let answer = line.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}

fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 2 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    let units = ["KB", "MB", "GB"];
    format!("{:.1} {}", bytes as f64 / div as f64, units[exp])
}

fn open_store(layout: &Layout) -> Result<PackageStore> {
    Ok(PackageStore::open(&layout.database_path())?)
}

/// Open the store only when it already exists
fn existing_store(layout: &Layout) -> Result<Option<PackageStore>> {
    if !layout.database_path().exists() {
        return Ok(None);
    }
    open_store(layout).map(Some)
}

fn print_report(report: &InstallReport, layout: &Layout) {
    let mut linked = false;

    for step in &report.steps {
        match (&step.action, &step.installed) {
            (InstallAction::Skip, _) => {
                println!("{} v{}: {}", step.package.name, step.package.version, step.action.reason());
            }
            (action, Some(installed)) => {
                if let Some(from) = action.replaces() {
                    println!(
                        "{} {} -> {} ({})",
                        installed.name(),
                        from,
                        installed.version(),
                        action.reason()
                    );
                }
                println!(
                    "Installed {} v{} ({} files)",
                    installed.name(),
                    installed.version(),
                    installed.installed_files.len()
                );
                for link in &step.links {
                    println!("  linked {}", link.display());
                }
                linked |= !step.links.is_empty();
            }
            (_, None) => {}
        }
    }

    if linked {
        print_path_hint(&layout.bin_dir());
    }
}

fn print_path_hint(bin_dir: &Path) {
    let path_env = std::env::var_os("PATH").unwrap_or_default();
    if std::env::split_paths(&path_env).any(|p| p == bin_dir) {
        return;
    }

    println!("\nTo use installed programs, add this to your shell profile:");
    println!("  export PATH=\"{}:$PATH\"", bin_dir.display());
}

fn main() -> Result<()> {
    // Library logs go to stderr; user-facing output is printed directly
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    let prompt = TerminalPrompt {
        assume_yes: config.assume_yes,
    };

    match cli.command {
        Some(Commands::Install { target }) => {
            let client = RegistryClient::new(&config.registry_url)?;
            let mut store = open_store(&config.layout)?;
            let mut installer = Installer::new(&config.layout, &mut store, &client);

            let report = if installer::is_local_archive(&target) {
                info!("Installing local archive {}", target);
                installer.install_archive(Path::new(&target))?
            } else {
                let (name, _) = installer::parse_package_spec(&target);
                println!("Fetching package info for {}...", name);
                let release = installer::find_release(&client, &target)?;
                println!("Found {} v{} ({})", release.name, release.version, format_bytes(release.size));
                installer.install_release(&release)?
            };

            print_report(&report, &config.layout);
            Ok(())
        }
        Some(Commands::Uninstall { name }) => {
            let mut store = open_store(&config.layout)?;

            match installer::uninstall(&config.layout, &mut store, &name, &prompt)? {
                UninstallOutcome::Removed {
                    package,
                    files_removed,
                } => {
                    println!(
                        "Successfully uninstalled {} v{} ({} files)",
                        package.name(),
                        package.version(),
                        files_removed
                    );
                }
                UninstallOutcome::Cancelled => println!("Uninstall cancelled."),
            }
            Ok(())
        }
        Some(Commands::Search { query }) => {
            let client = RegistryClient::new(&config.registry_url)?;
            let results = client.search(&query)?;

            if results.is_empty() {
                println!("No packages found for '{}'", query);
            }
            for pkg in &results {
                println!("  {:<20} {:<10} {}", pkg.name, pkg.latest, pkg.description);
            }
            Ok(())
        }
        Some(Commands::Info { name }) => {
            let client = RegistryClient::new(&config.registry_url)?;
            let pkg_info = client.package_info(&name)?;

            println!("{}", pkg_info.name);
            if !pkg_info.description.is_empty() {
                println!("  {}", pkg_info.description);
            }
            println!();
            println!("  latest:    {}", pkg_info.latest);
            println!("  downloads: {}", pkg_info.downloads);
            if !pkg_info.license.is_empty() {
                println!("  license:   {}", pkg_info.license);
            }
            if !pkg_info.homepage.is_empty() {
                println!("  homepage:  {}", pkg_info.homepage);
            }
            println!("\n  versions:  {}", pkg_info.versions.join(", "));

            if let Some(store) = existing_store(&config.layout)? {
                if store.has_any_version(&name)? {
                    println!("\n  installed: {}", store.installed_version(&name)?);
                }
            }
            Ok(())
        }
        Some(Commands::Upgrade { name }) => {
            let client = RegistryClient::new(&config.registry_url)?;
            let mut store = open_store(&config.layout)?;

            if name.is_none() && store.list()?.is_empty() {
                println!("No packages installed");
                return Ok(());
            }

            let plan = installer::plan_upgrades(&store, &client, name.as_deref())?;
            if plan.is_empty() {
                match &name {
                    Some(name) => println!(
                        "{} is already up to date (v{})",
                        name,
                        store.installed_version(name)?
                    ),
                    None => println!("All packages are up to date"),
                }
                return Ok(());
            }

            println!("{} package(s) can be upgraded:", plan.len());
            for upgrade in &plan {
                println!("  {:<20} {} -> {}", upgrade.name, upgrade.from, upgrade.to);
            }

            let question = if name.is_some() { "Upgrade?" } else { "Upgrade all?" };
            if !prompt.confirm(question) {
                println!("Upgrade cancelled.");
                return Ok(());
            }

            let mut installer = Installer::new(&config.layout, &mut store, &client);
            for upgrade in &plan {
                println!("\nUpgrading {}...", upgrade.name);
                match installer.install_spec(&upgrade.spec()) {
                    Ok(report) => print_report(&report, &config.layout),
                    Err(e) => println!("Error upgrading {}: {}", upgrade.name, e),
                }
            }
            Ok(())
        }
        Some(Commands::List) => {
            let packages = match existing_store(&config.layout)? {
                Some(store) => store.list()?,
                None => Vec::new(),
            };

            if packages.is_empty() {
                println!("No packages installed");
                return Ok(());
            }

            println!("Installed packages ({} total):", packages.len());
            for pkg in &packages {
                println!(
                    "  {:<20} {:<10} (installed {})",
                    pkg.name(),
                    pkg.version(),
                    pkg.installed_at.format("%Y-%m-%d")
                );
                if !pkg.package.description.is_empty() {
                    println!("    {}", pkg.package.description);
                }
            }
            Ok(())
        }
        Some(Commands::Init) => {
            let cwd = std::env::current_dir()?;
            if cwd.join(MANIFEST_FILE).exists() {
                println!("{} already exists in this directory", MANIFEST_FILE);
                return Ok(());
            }

            println!("Creating a new cupertino package\n");
            let default_name = cwd
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let answers = InitAnswers {
                name: ask("name", &default_name)?,
                version: ask("version", "1.0.0")?,
                description: ask("description", "")?,
                license: ask("license", "MIT")?,
                homepage: ask("homepage", "")?,
            };

            let mut files = publish::scan_bin_files(&cwd)?;
            for path in files.keys() {
                println!("  found {}", path);
            }
            if files.is_empty() {
                println!("\nNo files found in bin/. You can add files manually to {}.", MANIFEST_FILE);
                let path = ask("file path (or leave empty)", "")?;
                if !path.is_empty() {
                    files.insert(path.clone(), path);
                }
            }

            let pkg = publish::init_manifest(&cwd, answers, files)?;
            println!("\nCreated {} for {} v{}", MANIFEST_FILE, pkg.name, pkg.version);
            Ok(())
        }
        Some(Commands::Publish { dry_run }) => {
            let cwd = std::env::current_dir()?;
            let pkg = publish::load_for_publish(&cwd)?;

            println!("Package: {} v{}", pkg.name, pkg.version);
            println!("Description: {}", pkg.description);
            println!("Files:");
            for (src, dest) in &pkg.files {
                println!("  {} -> {}", src, dest);
            }

            if dry_run {
                println!("\n(dry run) Package is valid and ready to publish");
                return Ok(());
            }

            let api_key = config.api_key.as_deref().ok_or_else(|| {
                anyhow!("{} environment variable is required", config::API_KEY_ENV)
            })?;

            if !prompt.confirm(&format!("Publish {} v{}?", pkg.name, pkg.version)) {
                println!("Publish cancelled.");
                return Ok(());
            }

            println!("\nBuilding {}...", publish::tarball_name(&pkg));
            let tarball = publish::build_tarball(&cwd, &pkg, &cwd)?;

            let client = RegistryClient::new(&config.registry_url)?;
            println!("Publishing to {}...", client.base_url());
            let result = client.publish(&pkg, &tarball, api_key);
            let _ = fs::remove_file(&tarball);
            result?;

            println!("Published {} v{}", pkg.name, pkg.version);
            Ok(())
        }
        Some(Commands::Version) => {
            println!("cupertino {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            println!("Cupertino Package Manager v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'cupertino --help' for usage information");
            Ok(())
        }
    }
}
