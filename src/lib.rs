// src/lib.rs

//! Cupertino Package Manager
//!
//! Local package manager that installs versioned packages from a registry
//! or from local archives.
//!
//! # Architecture
//!
//! - Versions are strict `MAJOR.MINOR.PATCH` triples with `*`, `=`, `>=`,
//!   `^` and `~` constraints
//! - Dependencies resolve depth-first into a dependency-first install order,
//!   with cycle detection
//! - Installed packages, their files, dependency edges and lifecycle scripts
//!   live in SQLite and are written in one transaction per package
//! - Archives are extracted only after every entry name is checked to stay
//!   inside the destination
//! - Each release installs into `<root>/packages/<name>/<version>`, with
//!   executables linked into `<root>/bin`

pub mod config;
pub mod db;
mod error;
pub mod filesystem;
pub mod installer;
pub mod package;
pub mod publish;
pub mod repository;
pub mod resolver;
pub mod version;

pub use error::{Error, Result};
