// src/db/schema.rs

//! Database schema definitions and migrations for Cupertino
//!
//! This module defines the SQLite schema for the package store and provides
//! a migration system to evolve the schema over time.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::InitError(format!(
            "Unknown migration version: {}",
            version
        ))),
    }
}

/// Initial schema - Version 1
///
/// - packages: one row per installed package name
/// - package_files: files written for a package
/// - dependencies: declared dependency edges (name + constraint)
/// - package_scripts: lifecycle scripts carried over from the manifest
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE packages (
            name TEXT PRIMARY KEY,
            version TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            homepage TEXT,
            license TEXT,
            install_path TEXT NOT NULL,
            install_date TEXT NOT NULL
        );

        CREATE TABLE package_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            FOREIGN KEY (package_name) REFERENCES packages(name) ON DELETE CASCADE
        );

        CREATE TABLE dependencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_name TEXT NOT NULL,
            dependency_name TEXT NOT NULL,
            version_constraint TEXT NOT NULL DEFAULT '*',
            UNIQUE(package_name, dependency_name),
            FOREIGN KEY (package_name) REFERENCES packages(name) ON DELETE CASCADE
        );

        CREATE TABLE package_scripts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_name TEXT NOT NULL,
            script_type TEXT NOT NULL CHECK(script_type IN ('pre_install', 'post_install', 'pre_remove', 'post_remove')),
            script_content TEXT NOT NULL,
            FOREIGN KEY (package_name) REFERENCES packages(name) ON DELETE CASCADE
        );
        ",
    )?;

    info!("Schema version 1 created successfully");
    Ok(())
}

/// Schema Version 2: Indexes for reverse-dependency and file lookups
fn migrate_v2(conn: &Connection) -> Result<()> {
    debug!("Migrating to schema version 2");

    conn.execute_batch(
        "
        CREATE INDEX idx_package_files_package ON package_files(package_name);
        CREATE INDEX idx_package_files_path ON package_files(file_path);
        CREATE INDEX idx_dependencies_package ON dependencies(package_name);
        CREATE INDEX idx_dependencies_depends_on ON dependencies(dependency_name);
        CREATE INDEX idx_package_scripts_package ON package_scripts(package_name);
        ",
    )?;

    info!("Schema version 2 applied successfully");
    Ok(())
}
