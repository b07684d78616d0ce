//! Layered configuration.
//!
//! Values are resolved from three layers, later ones winning:
//!
//! 1. built-in defaults (below)
//! 2. a TOML file: `$GMONAD_CONFIG`, or `./config.toml` when it exists
//! 3. environment variables named `GMONAD_<SECTION>_<KEY>`, e.g.
//!    `GMONAD_LOG_LEVEL=debug` overrides `log.level`
//!
//! Configuration is read once at startup. There is no reload.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::{Table, Value};

use crate::error::Error;

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "GMONAD_CONFIG";

const ENV_PREFIX: &str = "GMONAD_";
const DEFAULT_PATH: &str = "config.toml";

const DEFAULTS: &str = r#"
[server]
addr = "0.0.0.0:8080"

[log]
file = ""
level = "info"
format = "text"

[cors]
allowed_origins = ["*"]
allowed_methods = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
allowed_headers = ["Origin", "Content-Type", "Content-Length", "Accept", "Authorization", "X-Requested-With"]
exposed_headers = ["Content-Length"]
allow_credentials = true
max_age_secs = 43200
"#;

// ── Typed view ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub log: LogSettings,
    pub cors: CorsSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerSettings {
    pub addr: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LogSettings {
    /// Empty or `stdout` for standard output, `stderr`, or a file path.
    pub file: String,
    pub level: String,
    /// `text` or `json`.
    #[serde(default)]
    pub format: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CorsSettings {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    #[serde(default)]
    pub exposed_headers: Vec<String>,
    #[serde(default)]
    pub allow_credentials: bool,
    pub max_age_secs: Option<u64>,
}

// ── Config ────────────────────────────────────────────────────────────────────

/// The merged key-value tree.
#[derive(Clone, Debug)]
pub struct Config {
    root: Table,
}

impl Config {
    /// Built-in defaults only.
    pub fn defaults() -> Result<Self, Error> {
        Ok(Self { root: toml::from_str(DEFAULTS)? })
    }

    /// Defaults, then the config file, then the process environment.
    pub fn load() -> Result<Self, Error> {
        let mut config = Self::defaults()?;
        match std::env::var_os(CONFIG_PATH_VAR) {
            Some(path) => config.merge_file(Path::new(&path))?,
            None if Path::new(DEFAULT_PATH).is_file() => config.merge_file(Path::new(DEFAULT_PATH))?,
            None => {}
        }
        config.apply_env(std::env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        }));
        Ok(config)
    }

    pub fn merge_file(&mut self, path: &Path) -> Result<(), Error> {
        let source = std::fs::read_to_string(path).map_err(|source| Error::ConfigFile {
            path: PathBuf::from(path),
            source,
        })?;
        self.merge_str(&source)
    }

    /// Deep-merges a TOML document over the current tree.
    pub fn merge_str(&mut self, source: &str) -> Result<(), Error> {
        let layer: Table = toml::from_str(source)?;
        merge(&mut self.root, layer);
        Ok(())
    }

    /// Applies `GMONAD_*` overrides. Only keys that already exist can be
    /// overridden; the new value is coerced to the type of the old one.
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut keys = Vec::new();
        leaf_keys(&self.root, "", &mut keys);

        for (name, raw) in vars {
            let Some(suffix) = name.strip_prefix(ENV_PREFIX) else { continue };
            let suffix = suffix.to_ascii_lowercase();
            let Some(key) = keys.iter().find(|k| k.replace('.', "_") == suffix) else {
                continue;
            };
            if let Some(slot) = lookup_mut(&mut self.root, key) {
                *slot = coerce(slot, &raw);
            }
        }
    }

    /// Looks up a dotted key such as `log.level`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let mut value = self.root.get(parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        Some(value)
    }

    /// Scalar lookup rendered as a string. Tables and arrays yield `None`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Datetime(d) => Some(d.to_string()),
            Value::Array(_) | Value::Table(_) => None,
        }
    }

    pub fn settings(&self) -> Result<Settings, Error> {
        let settings: Settings = Value::Table(self.root.clone()).try_into()?;
        Ok(settings)
    }
}

fn merge(base: &mut Table, layer: Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => merge(existing, incoming),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn leaf_keys(table: &Table, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in table {
        let full = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
        match value {
            Value::Table(inner) => leaf_keys(inner, &full, out),
            _ => out.push(full),
        }
    }
}

fn lookup_mut<'a>(table: &'a mut Table, key: &str) -> Option<&'a mut Value> {
    let (head, rest) = match key.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (key, None),
    };
    let value = table.get_mut(head)?;
    match rest {
        None => Some(value),
        Some(rest) => lookup_mut(value.as_table_mut()?, rest),
    }
}

/// Strings that do not parse as the target type stay strings, so the typed
/// view reports them as a deserialization error.
fn coerce(current: &Value, raw: &str) -> Value {
    let trimmed = raw.trim();
    let parsed = match current {
        Value::Boolean(_) => trimmed.parse().ok().map(Value::Boolean),
        Value::Integer(_) => trimmed.parse().ok().map(Value::Integer),
        Value::Float(_) => trimmed.parse().ok().map(Value::Float),
        Value::Array(_) => Some(Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_owned()))
                .collect(),
        )),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::String(raw.to_owned()))
}
