// src/db/models.rs

//! Data models for Cupertino database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading and deleting records.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Package metadata row, one per installed package name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub description: String,
    pub homepage: Option<String>,
    pub license: Option<String>,
    pub install_path: String,
    pub install_date: String,
}

impl PackageRecord {
    /// Insert this record, replacing any existing row with the same name
    ///
    /// Callers that replace a package must clear its child rows first; see
    /// `delete_children`.
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO packages
             (name, version, description, homepage, license, install_path, install_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &self.name,
                &self.version,
                &self.description,
                &self.homepage,
                &self.license,
                &self.install_path,
                &self.install_date,
            ],
        )?;
        Ok(())
    }

    /// Find a package by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT name, version, description, homepage, license, install_path, install_date
             FROM packages WHERE name = ?1",
        )?;

        let record = stmt.query_row([name], Self::from_row).optional()?;

        Ok(record)
    }

    /// List all packages ordered by name
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT name, version, description, homepage, license, install_path, install_date
             FROM packages ORDER BY name",
        )?;

        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    /// Check whether a row exists for this name
    pub fn exists(conn: &Connection, name: &str) -> Result<bool> {
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM packages WHERE name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Version string of the installed package, if any
    pub fn find_version(conn: &Connection, name: &str) -> Result<Option<String>> {
        let version = conn
            .query_row(
                "SELECT version FROM packages WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    /// Names of packages that declare a dependency edge on `dependency_name`
    pub fn find_dependent_names(conn: &Connection, dependency_name: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT p.name FROM packages p
             JOIN dependencies d ON p.name = d.package_name
             WHERE d.dependency_name = ?1
             ORDER BY p.name",
        )?;

        let names = stmt
            .query_map([dependency_name], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(names)
    }

    /// Delete the file, dependency and script rows owned by a package
    pub fn delete_children(conn: &Connection, name: &str) -> Result<()> {
        FileEntry::delete_by_package(conn, name)?;
        DependencyEntry::delete_by_package(conn, name)?;
        ScriptEntry::delete_by_package(conn, name)?;
        Ok(())
    }

    /// Delete a package row (owned rows cascade)
    pub fn delete(conn: &Connection, name: &str) -> Result<usize> {
        let deleted = conn.execute("DELETE FROM packages WHERE name = ?1", [name])?;
        Ok(deleted)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            version: row.get(1)?,
            description: row.get(2)?,
            homepage: row.get(3)?,
            license: row.get(4)?,
            install_path: row.get(5)?,
            install_date: row.get(6)?,
        })
    }
}

/// An installed file owned by a package
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: Option<i64>,
    pub package_name: String,
    pub file_path: String,
}

impl FileEntry {
    /// Create a new FileEntry
    pub fn new(package_name: String, file_path: String) -> Self {
        Self {
            id: None,
            package_name,
            file_path,
        }
    }

    /// Insert this file into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO package_files (package_name, file_path) VALUES (?1, ?2)",
            params![&self.package_name, &self.file_path],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find all files belonging to a package, in insertion order
    pub fn find_by_package(conn: &Connection, package_name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_name, file_path FROM package_files
             WHERE package_name = ?1 ORDER BY id",
        )?;

        let files = stmt
            .query_map([package_name], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(files)
    }

    /// Delete all files recorded for a package
    pub fn delete_by_package(conn: &Connection, package_name: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM package_files WHERE package_name = ?1",
            [package_name],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package_name: row.get(1)?,
            file_path: row.get(2)?,
        })
    }
}

/// Dependency edge: `package_name` requires `dependency_name` within `version_constraint`
#[derive(Debug, Clone)]
pub struct DependencyEntry {
    pub id: Option<i64>,
    pub package_name: String,
    pub dependency_name: String,
    pub version_constraint: String,
}

impl DependencyEntry {
    /// Create a new DependencyEntry
    pub fn new(package_name: String, dependency_name: String, version_constraint: String) -> Self {
        Self {
            id: None,
            package_name,
            dependency_name,
            version_constraint,
        }
    }

    /// Insert this dependency into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO dependencies (package_name, dependency_name, version_constraint)
             VALUES (?1, ?2, ?3)",
            params![
                &self.package_name,
                &self.dependency_name,
                &self.version_constraint,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find all dependency edges declared by a package
    pub fn find_by_package(conn: &Connection, package_name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_name, dependency_name, version_constraint
             FROM dependencies WHERE package_name = ?1 ORDER BY dependency_name",
        )?;

        let deps = stmt
            .query_map([package_name], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(deps)
    }

    /// Delete all dependencies for a package
    pub fn delete_by_package(conn: &Connection, package_name: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM dependencies WHERE package_name = ?1",
            [package_name],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package_name: row.get(1)?,
            dependency_name: row.get(2)?,
            version_constraint: row.get(3)?,
        })
    }
}

/// Lifecycle script phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    PreInstall,
    PostInstall,
    PreRemove,
    PostRemove,
}

impl ScriptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::PreInstall => "pre_install",
            ScriptType::PostInstall => "post_install",
            ScriptType::PreRemove => "pre_remove",
            ScriptType::PostRemove => "post_remove",
        }
    }
}

impl FromStr for ScriptType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pre_install" => Ok(ScriptType::PreInstall),
            "post_install" => Ok(ScriptType::PostInstall),
            "pre_remove" => Ok(ScriptType::PreRemove),
            "post_remove" => Ok(ScriptType::PostRemove),
            _ => Err(format!("Invalid script type: {}", s)),
        }
    }
}

/// A lifecycle script recorded with its package
#[derive(Debug, Clone)]
pub struct ScriptEntry {
    pub id: Option<i64>,
    pub package_name: String,
    pub script_type: ScriptType,
    pub script_content: String,
}

impl ScriptEntry {
    /// Create a new ScriptEntry
    pub fn new(package_name: String, script_type: ScriptType, script_content: String) -> Self {
        Self {
            id: None,
            package_name,
            script_type,
            script_content,
        }
    }

    /// Insert this script into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO package_scripts (package_name, script_type, script_content)
             VALUES (?1, ?2, ?3)",
            params![
                &self.package_name,
                self.script_type.as_str(),
                &self.script_content,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find all scripts for a package, in insertion order
    pub fn find_by_package(conn: &Connection, package_name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_name, script_type, script_content
             FROM package_scripts WHERE package_name = ?1 ORDER BY id",
        )?;

        let scripts = stmt
            .query_map([package_name], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(scripts)
    }

    /// Delete all scripts for a package
    pub fn delete_by_package(conn: &Connection, package_name: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM package_scripts WHERE package_name = ?1",
            [package_name],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let type_str: String = row.get(2)?;
        let script_type = type_str.parse::<ScriptType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            package_name: row.get(1)?,
            script_type,
            script_content: row.get(3)?,
        })
    }
}
