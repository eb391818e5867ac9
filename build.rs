// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("cupertino")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Cupertino Contributors")
        .about("Local package manager with constraint-based dependency resolution")
        .subcommand_required(false)
        .arg(
            Arg::new("yes")
                .short('y')
                .long("yes")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Assume yes to all confirmation prompts"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("PATH")
                .env("CUPERTINO_ROOT")
                .default_value("/opt/cupertino")
                .global(true)
                .help("Install root directory"),
        )
        .arg(
            Arg::new("registry")
                .long("registry")
                .value_name("URL")
                .env("CUPERTINO_REGISTRY")
                .default_value("http://localhost:8080")
                .global(true)
                .help("Registry base URL"),
        )
        .arg(
            Arg::new("api_key")
                .long("api-key")
                .env("CUPERTINO_API_KEY")
                .hide_env_values(true)
                .global(true)
                .help("API key used by publish"),
        )
        .subcommand(
            Command::new("install")
                .about("Install a package from the registry (name[@version]) or a local .tar.gz")
                .arg(
                    Arg::new("target")
                        .required(true)
                        .help("Package spec or path to a package archive"),
                ),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Uninstall a package")
                .arg(Arg::new("name").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("search")
                .about("Search the registry")
                .arg(Arg::new("query").required(true).help("Search query")),
        )
        .subcommand(
            Command::new("info")
                .about("Show registry details for a package")
                .arg(Arg::new("name").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade one package, or every installed package")
                .arg(Arg::new("name").help("Package name (upgrades all if omitted)")),
        )
        .subcommand(Command::new("list").about("List installed packages"))
        .subcommand(Command::new("init").about("Create a package.json in the current directory"))
        .subcommand(
            Command::new("publish")
                .about("Publish the package in the current directory")
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Validate without uploading"),
                ),
        )
        .subcommand(Command::new("version").about("Print version information"))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("cupertino.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
