//! Handler configuration.
//!
//! A config file maps handler names to the variants produced for every image
//! submitted to that handler. Each handler lists size constraints, output
//! formats and stores; the cross product of the three is the set of jobs run
//! per upload.
//!
//! ## Config File Format
//!
//! ```toml
//! [android-tablets]
//! sizes = [{ max_width = 500 }, { max = 1000 }]
//! formats = ["jpeg"]
//! store = [{ local = "/mnt/gallery" }]
//!
//! [avatars]
//! sizes = [{ square = 80 }, { square = 200 }]
//! formats = ["png", "webp"]
//! stores = [{ local = "/mnt/avatars" }]
//! ```
//!
//! - `sizes`: single-key tables; key ∈ `square`, `max`, `max_width`,
//!   `max_height`; value is a positive pixel count.
//! - `formats`: `jpg`/`jpeg`, `png`, `webp`.
//! - `store`/`stores`: single-key tables naming a backend and its
//!   parameter. Only `local` (a directory) is built in.
//!
//! Loading stops at the first invalid token in document order and names it
//! in the error.
//! Duplicate entries are dropped, keeping first-seen order. Unknown keys are
//! rejected to catch typos early.

use crate::imaging::{Format, SizeConstraint, SizeError};
use crate::store::StoreDescriptor;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    MalformedDocument(String),
    #[error("invalid size in config: {0}")]
    InvalidSizeKind(String),
    #[error("size {kind} in config must be a positive integer, got {value}")]
    NonPositiveSize { kind: String, value: i64 },
    #[error("invalid format in config: {0}")]
    InvalidFormat(String),
    #[error(
        "unknown store backend in config: {0} (expected one of: {known})",
        known = StoreDescriptor::BACKENDS.join(", ")
    )]
    UnknownStore(String),
    #[error("no handler named {0}")]
    UnknownHandler(String),
}

/// One variant to produce: a single cell of a handler's cross product.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobSpec {
    pub size: SizeConstraint,
    pub format: Format,
    pub store: StoreDescriptor,
}

impl std::fmt::Display for JobSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} → {}", self.size, self.format, self.store)
    }
}

/// A validated handler. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    pub name: String,
    pub sizes: Vec<SizeConstraint>,
    pub formats: Vec<Format>,
    pub stores: Vec<StoreDescriptor>,
}

impl Handler {
    /// Cross product `sizes × formats × stores`, sizes varying slowest.
    pub fn jobs(&self) -> Vec<JobSpec> {
        let mut jobs = Vec::with_capacity(self.job_count());
        for &size in &self.sizes {
            for &format in &self.formats {
                for store in &self.stores {
                    jobs.push(JobSpec {
                        size,
                        format,
                        store: store.clone(),
                    });
                }
            }
        }
        jobs
    }

    pub fn job_count(&self) -> usize {
        self.sizes.len() * self.formats.len() * self.stores.len()
    }
}

/// All handlers from one config document, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub handlers: BTreeMap<String, Handler>,
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config document. Handlers, and the fields
    /// within each, are validated in the order they are written.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let document: toml::Table = toml::from_str(content).map_err(malformed)?;

        let mut handlers = BTreeMap::new();
        for (name, value) in document {
            let written: Vec<String> = value
                .as_table()
                .map(|table| table.keys().cloned().collect())
                .unwrap_or_default();
            let raw: RawHandler = value.try_into().map_err(malformed)?;
            let handler = raw.validate(&name, &written)?;
            handlers.insert(name, handler);
        }
        Ok(Self { handlers })
    }

    pub fn handler(&self, name: &str) -> Result<&Handler, ConfigError> {
        self.handlers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownHandler(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Handler as written in the document, before token validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHandler {
    #[serde(default)]
    sizes: Vec<BTreeMap<String, i64>>,
    #[serde(default)]
    formats: Vec<String>,
    #[serde(default, alias = "store")]
    stores: Vec<BTreeMap<String, String>>,
}

impl RawHandler {
    /// `written` is the handler's field names in document order.
    fn validate(&self, name: &str, written: &[String]) -> Result<Handler, ConfigError> {
        let mut sizes = Vec::new();
        let mut formats = Vec::new();
        let mut stores = Vec::new();
        for field in written {
            match field.as_str() {
                "sizes" => sizes = self.sizes(name)?,
                "formats" => formats = self.formats()?,
                "store" | "stores" => stores = self.stores(name)?,
                _ => {}
            }
        }

        for (what, empty) in [
            ("sizes", sizes.is_empty()),
            ("formats", formats.is_empty()),
            ("stores", stores.is_empty()),
        ] {
            if empty {
                return Err(ConfigError::MalformedDocument(format!(
                    "handler '{name}' declares no {what}"
                )));
            }
        }

        Ok(Handler {
            name: name.to_string(),
            sizes,
            formats,
            stores,
        })
    }

    fn sizes(&self, name: &str) -> Result<Vec<SizeConstraint>, ConfigError> {
        let mut sizes = Vec::new();
        for entry in &self.sizes {
            let (kind, value) = single_entry(name, "size", entry)?;
            let size = SizeConstraint::parse(kind, *value).map_err(|e| match e {
                SizeError::InvalidConstraintKind(token) => ConfigError::InvalidSizeKind(token),
                SizeError::NonPositiveValue(value) => ConfigError::NonPositiveSize {
                    kind: kind.clone(),
                    value,
                },
            })?;
            push_unique(&mut sizes, size);
        }
        Ok(sizes)
    }

    fn formats(&self) -> Result<Vec<Format>, ConfigError> {
        let mut formats = Vec::new();
        for token in &self.formats {
            let format =
                Format::from_token(token).ok_or_else(|| ConfigError::InvalidFormat(token.clone()))?;
            push_unique(&mut formats, format);
        }
        Ok(formats)
    }

    fn stores(&self, name: &str) -> Result<Vec<StoreDescriptor>, ConfigError> {
        let mut stores = Vec::new();
        for entry in &self.stores {
            let (backend, param) = single_entry(name, "store", entry)?;
            let store = StoreDescriptor::from_token(backend, param)
                .ok_or_else(|| ConfigError::UnknownStore(backend.clone()))?;
            push_unique(&mut stores, store);
        }
        Ok(stores)
    }
}

fn malformed(e: impl std::fmt::Display) -> ConfigError {
    ConfigError::MalformedDocument(e.to_string())
}

/// Size and store entries are `{ key = value }` tables with exactly one key.
fn single_entry<'a, V>(
    handler: &str,
    what: &str,
    entry: &'a BTreeMap<String, V>,
) -> Result<(&'a String, &'a V), ConfigError> {
    let mut iter = entry.iter();
    match (iter.next(), iter.next()) {
        (Some(pair), None) => Ok(pair),
        _ => Err(ConfigError::MalformedDocument(format!(
            "handler '{handler}': each {what} entry must have exactly one key, got {}",
            entry.len()
        ))),
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// A documented sample config, printed by `imgpress gen-config`.
pub fn stock_config_toml() -> &'static str {
    r#"# imgpress handler configuration
#
# Each table is a handler. Every image submitted to a handler is rendered
# once per (size, format, store) combination.
#
# sizes:   square    center-crop to a square, then shrink to N x N
#          max       shrink so the longer edge is N
#          max_width shrink so the width is N
#          max_height shrink so the height is N
#          Images already within bounds are stored unresized.
# formats: jpg (or jpeg), png, webp
# stores:  local = "<directory>"
#
# Output names: {size}-{value}-{sha256 of the upload}.{ext}

[gallery]
sizes = [{ max = 2048 }, { max = 1024 }, { square = 200 }]
formats = ["jpg", "webp"]
stores = [{ local = "gallery" }]

[avatars]
sizes = [{ square = 80 }]
formats = ["png"]
stores = [{ local = "avatars" }]
"#
}
