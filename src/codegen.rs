//! Scaffolding for new database-backed models.
//!
//! Rendering is pure; only [`generate_model`] and [`generate_migration`] touch the
//! filesystem. Migration files are named `<timestamp>_<description>.sql` where the
//! timestamp is `YYYYMMDDHHMMSSmmm` in UTC, and a `_1`, `_2`, ... suffix is appended to
//! the description when a file with that name already exists.

use std::{
    fmt::Write as _,
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Columns every generated table gets; attribute names may not reuse them.
const RESERVED: [&str; 3] = ["id", "created_at", "updated_at"];

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("model name `{0}` must start with a letter and contain only letters and digits")]
    InvalidModelName(String),
    #[error("migration name `{0}` must contain only letters, digits and underscores")]
    InvalidMigrationName(String),
    #[error("attribute `{0}` must look like `name:type`")]
    MalformedAttribute(String),
    #[error("attribute name `{0}` must be snake_case")]
    InvalidAttributeName(String),
    #[error("attribute `{0}` is generated automatically")]
    ReservedAttribute(String),
    #[error("attribute `{name}` has unknown type `{ty}`")]
    UnknownType { name: String, ty: String },
    #[error("at least one attribute is required")]
    NoAttributes,
    #[error("{} already exists", .0.display())]
    ModelExists(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Text,
    Integer,
    BigInt,
    Boolean,
    Float,
    Date,
    UserRole,
    Gender,
}

impl FromStr for AttributeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "text" => Self::Text,
            "integer" | "int" => Self::Integer,
            "bigint" => Self::BigInt,
            "boolean" | "bool" => Self::Boolean,
            "float" | "double" => Self::Float,
            "date" | "datetime" => Self::Date,
            "userrole" | "role" => Self::UserRole,
            "gender" => Self::Gender,
            _ => return Err(()),
        };
        Ok(ty)
    }
}

impl AttributeType {
    fn rust_type(self) -> &'static str {
        match self {
            Self::String | Self::Text | Self::UserRole | Self::Gender => "String",
            Self::Integer => "i32",
            Self::BigInt => "i64",
            Self::Boolean => "bool",
            Self::Float => "f64",
            Self::Date => "DateTime<Utc>",
        }
    }

    fn sql_type(self) -> &'static str {
        match self {
            Self::String | Self::Text | Self::UserRole | Self::Gender => "TEXT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Boolean => "BOOLEAN",
            Self::Float => "DOUBLE PRECISION",
            Self::Date => "TIMESTAMPTZ",
        }
    }

    /// Allowed values for enumerated columns, enforced with a CHECK constraint.
    fn allowed_values(self) -> Option<&'static [&'static str]> {
        match self {
            Self::UserRole => Some(&["admin", "user"]),
            Self::Gender => Some(&["male", "female", "other"]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub ty: AttributeType,
}

/// Parses `name:type,other:type`.
pub fn parse_attributes(input: &str) -> Result<Vec<Attribute>, CodegenError> {
    let attributes = input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (name, ty) = part
                .split_once(':')
                .ok_or_else(|| CodegenError::MalformedAttribute(part.to_string()))?;
            let (name, ty) = (name.trim(), ty.trim());

            if !is_snake_case(name) {
                return Err(CodegenError::InvalidAttributeName(name.to_string()));
            }
            if RESERVED.contains(&name) {
                return Err(CodegenError::ReservedAttribute(name.to_string()));
            }
            let ty = ty.parse().map_err(|_| CodegenError::UnknownType {
                name: name.to_string(),
                ty: ty.to_string(),
            })?;

            Ok(Attribute {
                name: name.to_string(),
                ty,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if attributes.is_empty() {
        return Err(CodegenError::NoAttributes);
    }
    Ok(attributes)
}

fn is_snake_case(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn validate_model_name(name: &str) -> Result<(), CodegenError> {
    let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(CodegenError::InvalidModelName(name.to_string()))
    }
}

/// `BlogPost` → `blog_post`, `HTTPServer` → `http_server`.
///
/// An underscore goes before an uppercase letter that follows a lowercase letter or
/// digit, or that ends a run of capitals and starts a new word.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let word_start = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower);
            if word_start && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// `blogPost` → `BlogPost`.
fn to_type_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

pub fn table_name(model: &str) -> String {
    format!("{}s", to_snake_case(model))
}

pub fn migration_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S%3f").to_string()
}

/// Renders a `sqlx::FromRow` struct for `model`.
pub fn render_model(model: &str, attributes: &[Attribute]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "use chrono::{{DateTime, Utc}};");
    let _ = writeln!(out, "use serde::{{Deserialize, Serialize}};");
    let _ = writeln!(out, "use sqlx::FromRow;");
    let _ = writeln!(out);
    let _ = writeln!(out, "/// Row of the `{}` table.", table_name(model));
    let _ = writeln!(out, "#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]");
    let _ = writeln!(out, "pub struct {} {{", to_type_name(model));
    let _ = writeln!(out, "    pub id: i64,");
    for attr in attributes {
        if let Some(values) = attr.ty.allowed_values() {
            let _ = writeln!(out, "    // One of: {}.", values.join(", "));
        }
        let _ = writeln!(out, "    pub {}: {},", attr.name, attr.ty.rust_type());
    }
    let _ = writeln!(out, "    pub created_at: DateTime<Utc>,");
    let _ = writeln!(out, "    pub updated_at: DateTime<Utc>,");
    let _ = writeln!(out, "}}");
    out
}

/// Renders the `CREATE TABLE` migration for `model`.
pub fn render_create_migration(model: &str, attributes: &[Attribute]) -> String {
    let mut columns = vec!["    id BIGSERIAL PRIMARY KEY".to_string()];
    for attr in attributes {
        let mut column = format!("    {} {} NOT NULL", attr.name, attr.ty.sql_type());
        if let Some(values) = attr.ty.allowed_values() {
            let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
            let _ = write!(column, " CHECK ({} IN ({}))", attr.name, quoted.join(", "));
        }
        columns.push(column);
    }
    columns.push("    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()".to_string());
    columns.push("    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()".to_string());

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
        table_name(model),
        columns.join(",\n")
    )
}

pub fn render_empty_migration(name: &str) -> String {
    format!("-- Migration: {}\n", name)
}

/// First of `<stem>.sql`, `<stem>_1.sql`, `<stem>_2.sql`, ... that does not exist in `dir`.
pub fn unique_migration_path(dir: &Path, stem: &str) -> PathBuf {
    let mut path = dir.join(format!("{}.sql", stem));
    let mut counter = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}.sql", stem, counter));
        counter += 1;
    }
    path
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedModel {
    pub model_path: PathBuf,
    pub migration_path: PathBuf,
}

/// Writes `src/models/<model>.rs` and a create-table migration under `root`.
/// An existing model file is never overwritten, and a failed run leaves neither file.
pub fn generate_model(
    root: &Path,
    model: &str,
    attributes: &str,
    now: DateTime<Utc>,
) -> Result<GeneratedModel, CodegenError> {
    validate_model_name(model)?;
    let attributes = parse_attributes(attributes)?;

    let models_dir = root.join("src").join("models");
    let model_path = models_dir.join(format!("{}.rs", to_snake_case(model)));
    if model_path.exists() {
        return Err(CodegenError::ModelExists(model_path));
    }

    let migrations_dir = root.join("migrations");
    fs::create_dir_all(&migrations_dir)?;
    let stem = format!(
        "{}_create_{}",
        migration_timestamp(now),
        table_name(model)
    );
    let migration_path = unique_migration_path(&migrations_dir, &stem);
    fs::write(&migration_path, render_create_migration(model, &attributes))?;

    let written = fs::create_dir_all(&models_dir)
        .and_then(|_| fs::write(&model_path, render_model(model, &attributes)));
    if let Err(err) = written {
        let _ = fs::remove_file(&migration_path);
        return Err(err.into());
    }

    Ok(GeneratedModel {
        model_path,
        migration_path,
    })
}

/// Writes an empty migration named `<timestamp>_<name>.sql` under `root/migrations`.
pub fn generate_migration(
    root: &Path,
    name: &str,
    now: DateTime<Utc>,
) -> Result<PathBuf, CodegenError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(CodegenError::InvalidMigrationName(name.to_string()));
    }
    let description = to_snake_case(name);

    let migrations_dir = root.join("migrations");
    fs::create_dir_all(&migrations_dir)?;
    let stem = format!("{}_{}", migration_timestamp(now), description);
    let path = unique_migration_path(&migrations_dir, &stem);
    fs::write(&path, render_empty_migration(&description))?;
    Ok(path)
}
