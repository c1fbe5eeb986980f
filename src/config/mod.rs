/// Configuration system for the VoltGuard client.
///
/// Provides a layered configuration hierarchy:
///
/// 1. **Built-in defaults** — hardcoded in [`schema::VoltGuardConfig::default()`]
/// 2. **User global config** — `~/.voltguard/config.toml`
/// 3. **Project local config** — `.voltguard.toml` in the current working directory
/// 4. **Environment variables** — `VOLTGUARD_*` overrides (highest precedence)
///
/// Later layers override earlier ones key by key: a file only replaces the
/// keys it sets, so a project file can change one value and keep the rest
/// of the global config.
///
/// # Usage
///
/// ```rust,ignore
/// use voltguard::config;
///
/// let cfg = config::load();
/// let channel = SocketChannel::connect(&cfg.socket)?;
/// ```
pub mod schema;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub use schema::VoltGuardConfig;

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the fully resolved configuration.
///
/// Merges all layers in order: defaults → global TOML → project TOML → env
/// vars.
pub fn load() -> VoltGuardConfig {
    // Layer 2: user global config (~/.voltguard/config.toml)
    // Layer 3: project local config (.voltguard.toml)
    let layers = [global_config_path(), project_config_path()]
        .into_iter()
        .filter_map(load_toml_file);
    let mut config = resolve_layers(layers);

    // Layer 4: environment variable overrides
    apply_env_overrides(&mut config);

    config
}

/// Load a TOML config file from the given path (if it exists).
///
/// Returns `None` if the path is `None`, the file doesn't exist, or the
/// content is malformed. A broken config file never stops the client from
/// starting; `voltguard health` reports it instead.
fn load_toml_file(path: Option<PathBuf>) -> Option<toml::Table> {
    let path = path?;
    let content = fs::read_to_string(&path).ok()?;
    toml::from_str(&content).ok()
}

/// Fold TOML layers over the built-in defaults, in order.
///
/// A layer whose values don't fit the schema (e.g. a string where a number
/// belongs) is skipped as a whole.
pub fn resolve_layers(layers: impl IntoIterator<Item = toml::Table>) -> VoltGuardConfig {
    let mut merged = toml::Value::try_from(VoltGuardConfig::default())
        .unwrap_or_else(|_| toml::Value::Table(toml::Table::new()));
    for layer in layers {
        let mut candidate = merged.clone();
        merge_toml(&mut candidate, toml::Value::Table(layer));
        if candidate.clone().try_into::<VoltGuardConfig>().is_ok() {
            merged = candidate;
        }
    }
    merged.try_into().unwrap_or_default()
}

/// Merge `overlay` into `base`. Tables merge key by key; any other value
/// (arrays included) replaces what was there.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Check whether a config file exists but fails to parse.
pub fn file_is_malformed(path: &PathBuf) -> bool {
    match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<VoltGuardConfig>(&content).is_err(),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// File paths
// ---------------------------------------------------------------------------

/// Path to the user global config: `~/.voltguard/config.toml`.
fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".voltguard").join("config.toml"))
}

/// Path to the project local config: `.voltguard.toml` in the current directory.
fn project_config_path() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .map(|cwd| cwd.join(".voltguard.toml"))
}

/// Return the path to the global config file for display/init purposes.
pub fn global_config_file() -> Option<PathBuf> {
    global_config_path()
}

/// Return the path to the project config file for display purposes.
pub fn project_config_file() -> Option<PathBuf> {
    project_config_path()
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir().map(|home| home.join(rest))
    } else if path == "~" {
        dirs::home_dir()
    } else {
        Some(PathBuf::from(path))
    }
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides (highest precedence layer).
///
/// Supported variables:
/// - `VOLTGUARD_SOCKET_URL` — backend base URL
/// - `VOLTGUARD_TRANSPORTS` — comma-separated transport order
/// - `VOLTGUARD_COMPLETION_URL` — completion endpoint base URL
/// - `VOLTGUARD_MODEL` — completion model name
/// - `VOLTGUARD_API_KEY` — completion bearer token
/// - `VOLTGUARD_TOOLS_URL` — tool server URL
/// - `VOLTGUARD_TOOLS_TRANSPORT` — `sse` or `streamable-http`
/// - `VOLTGUARD_LOG` — event logging on/off
fn apply_env_overrides(config: &mut VoltGuardConfig) {
    // Socket
    if let Ok(val) = std::env::var("VOLTGUARD_SOCKET_URL")
        && !val.is_empty()
    {
        config.socket.url = val;
    }
    if let Ok(val) = std::env::var("VOLTGUARD_TRANSPORTS")
        && let Some(order) = parse_transports(&val)
    {
        config.socket.transports = order;
    }

    // Completion
    if let Ok(val) = std::env::var("VOLTGUARD_COMPLETION_URL")
        && !val.is_empty()
    {
        config.completion.base_url = val;
    }
    if let Ok(val) = std::env::var("VOLTGUARD_MODEL")
        && !val.is_empty()
    {
        config.completion.model = val;
    }
    if let Ok(val) = std::env::var("VOLTGUARD_API_KEY") {
        config.completion.api_key = val;
    }

    // Tools
    if let Ok(val) = std::env::var("VOLTGUARD_TOOLS_URL")
        && !val.is_empty()
    {
        config.tools.url = val;
    }
    if let Ok(val) = std::env::var("VOLTGUARD_TOOLS_TRANSPORT")
        && let Some(kind) = parse_mcp_transport(&val)
    {
        config.tools.transport = kind;
    }

    // Logging
    if let Ok(val) = std::env::var("VOLTGUARD_LOG") {
        config.logging.enabled = is_truthy(&val);
    }
}

/// Check if a string value represents a truthy boolean.
fn is_truthy(val: &str) -> bool {
    matches!(
        val.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse a comma-separated transport order. Unknown names reject the whole list.
fn parse_transports(val: &str) -> Option<Vec<schema::TransportKind>> {
    let order: Option<Vec<_>> = val
        .split(',')
        .map(|s| match s.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Some(schema::TransportKind::Websocket),
            "polling" => Some(schema::TransportKind::Polling),
            _ => None,
        })
        .collect();
    order.filter(|o| !o.is_empty())
}

/// Parse an MCP transport name.
fn parse_mcp_transport(val: &str) -> Option<schema::McpTransportKind> {
    match val.to_ascii_lowercase().as_str() {
        "sse" => Some(schema::McpTransportKind::Sse),
        "streamable-http" | "streamable_http" | "http" => {
            Some(schema::McpTransportKind::StreamableHttp)
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Config init / set / reset
// ---------------------------------------------------------------------------

/// Write the default annotated config to `~/.voltguard/config.toml`.
///
/// Creates the `~/.voltguard/` directory if it doesn't exist. Returns an
/// error if the file already exists (use `force = true` to overwrite).
pub fn init_config(force: bool) -> Result<PathBuf> {
    let path = global_config_path().context("could not determine home directory")?;

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create ~/.voltguard/ directory")?;
    }

    fs::write(&path, VoltGuardConfig::default_toml()).context("failed to write config file")?;

    Ok(path)
}

/// Set a single config key to a value in the global config file.
///
/// Reads the current global config (or defaults), updates the specified key,
/// and writes the result back. Supports dotted keys like `socket.url`.
pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let path = global_config_path().context("could not determine home directory")?;

    let content = if path.exists() {
        fs::read_to_string(&path).context("failed to read config file")?
    } else {
        toml::to_string_pretty(&VoltGuardConfig::default())
            .context("failed to serialize default config")?
    };

    let mut value_table: toml::Value =
        toml::from_str(&content).context("failed to parse config as TOML value")?;
    set_toml_value(&mut value_table, key, value)?;

    // Reject edits that would leave the file unloadable.
    let output =
        toml::to_string_pretty(&value_table).context("failed to serialize updated config")?;
    toml::from_str::<VoltGuardConfig>(&output)
        .with_context(|| format!("'{value}' is not a valid value for '{key}'"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    fs::write(&path, output).context("failed to write config file")?;

    Ok(())
}

/// Set a value in a TOML value tree using a dotted key path.
fn set_toml_value(root: &mut toml::Value, key: &str, raw_value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        anyhow::bail!("empty config key segment in '{key}'");
    }

    // Navigate to the parent table
    let mut current = root;
    for &part in &parts[..parts.len() - 1] {
        current = current
            .get_mut(part)
            .with_context(|| format!("config key not found: section '{part}' in '{key}'"))?;
    }

    let leaf = parts[parts.len() - 1];

    let table = current.as_table_mut().with_context(|| {
        format!(
            "expected table at '{}'",
            key.rsplit_once('.').map(|(s, _)| s).unwrap_or("")
        )
    })?;

    if !table.contains_key(leaf) {
        anyhow::bail!("unknown config key '{key}'");
    }

    // Parse according to the type of the existing value
    let new_value = match table.get(leaf) {
        Some(toml::Value::Boolean(_)) => toml::Value::Boolean(is_truthy(raw_value)),
        Some(toml::Value::Integer(_)) => {
            let n: i64 = raw_value
                .parse()
                .with_context(|| format!("expected integer for '{key}', got '{raw_value}'"))?;
            toml::Value::Integer(n)
        }
        Some(toml::Value::Float(_)) => {
            let f: f64 = raw_value
                .parse()
                .with_context(|| format!("expected float for '{key}', got '{raw_value}'"))?;
            toml::Value::Float(f)
        }
        Some(toml::Value::Array(_)) => {
            let items: Vec<toml::Value> = raw_value
                .split(',')
                .map(|s| toml::Value::String(s.trim().to_string()))
                .collect();
            toml::Value::Array(items)
        }
        _ => toml::Value::String(raw_value.to_string()),
    };

    table.insert(leaf.to_string(), new_value);
    Ok(())
}

/// Reset the global config to defaults (overwrite the file).
pub fn reset_config() -> Result<PathBuf> {
    init_config(true)
}

/// Show the effective (fully resolved) config as TOML.
pub fn show_effective_config() -> Result<String> {
    let config = load();
    toml::to_string_pretty(&config).context("failed to serialize effective config")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{McpTransportKind, TransportKind};

    fn layer(text: &str) -> toml::Table {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn later_layer_only_overrides_keys_it_sets() {
        let global = layer(
            "[completion]\napi_key = \"sk-global\"\nmodel = \"gpt-4o-mini\"\n\n[feed]\nretry_interval_ms = 500\n",
        );
        let project = layer("[completion]\nmodel = \"llama3\"\n");
        let config = resolve_layers([global, project]);
        assert_eq!(config.completion.model, "llama3");
        assert_eq!(config.completion.api_key, "sk-global");
        assert_eq!(config.feed.retry_interval_ms, 500);
        let defaults = VoltGuardConfig::default();
        assert_eq!(config.socket.url, defaults.socket.url);
        assert_eq!(config.tools.transport, defaults.tools.transport);
    }

    #[test]
    fn ill_typed_layer_is_skipped() {
        let global = layer("[feed]\nretry_interval_ms = 500\n");
        let broken = layer("[feed]\nretry_interval_ms = \"soon\"\n");
        let config = resolve_layers([global, broken]);
        assert_eq!(config.feed.retry_interval_ms, 500);
    }

    #[test]
    fn no_layers_gives_defaults() {
        let config = resolve_layers(Vec::<toml::Table>::new());
        assert_eq!(config.socket.url, VoltGuardConfig::default().socket.url);
    }

    #[test]
    fn is_truthy_accepts_variants() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("yes"));
        assert!(is_truthy("On"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("off"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn parse_transports_handles_order_and_aliases() {
        assert_eq!(
            parse_transports("polling, ws"),
            Some(vec![TransportKind::Polling, TransportKind::Websocket])
        );
        assert_eq!(
            parse_transports("websocket"),
            Some(vec![TransportKind::Websocket])
        );
        assert_eq!(parse_transports("websocket,carrier-pigeon"), None);
    }

    #[test]
    fn parse_mcp_transport_handles_variants() {
        assert_eq!(parse_mcp_transport("SSE"), Some(McpTransportKind::Sse));
        assert_eq!(
            parse_mcp_transport("streamable_http"),
            Some(McpTransportKind::StreamableHttp)
        );
        assert_eq!(parse_mcp_transport("stdio"), None);
    }

    #[test]
    fn expand_tilde_resolves_home() {
        let expanded = expand_tilde("~/.voltguard/events.jsonl").unwrap();
        assert!(expanded.ends_with(".voltguard/events.jsonl"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert_eq!(
            expand_tilde("/tmp/events.jsonl").unwrap(),
            PathBuf::from("/tmp/events.jsonl")
        );
    }

    #[test]
    fn set_toml_value_updates_string() {
        let mut root: toml::Value = toml::from_str("[socket]\nurl = \"http://a\"\n").unwrap();
        set_toml_value(&mut root, "socket.url", "http://b:8000").unwrap();
        assert_eq!(root["socket"]["url"].as_str(), Some("http://b:8000"));
    }

    #[test]
    fn set_toml_value_updates_integer_and_bool() {
        let mut root: toml::Value =
            toml::from_str("[feed]\nretry_interval_ms = 1000\n[logging]\nenabled = true\n")
                .unwrap();
        set_toml_value(&mut root, "feed.retry_interval_ms", "250").unwrap();
        set_toml_value(&mut root, "logging.enabled", "off").unwrap();
        assert_eq!(root["feed"]["retry_interval_ms"].as_integer(), Some(250));
        assert_eq!(root["logging"]["enabled"].as_bool(), Some(false));
    }

    #[test]
    fn set_toml_value_splits_arrays() {
        let mut root: toml::Value =
            toml::from_str("[socket]\ntransports = [\"websocket\"]\n").unwrap();
        set_toml_value(&mut root, "socket.transports", "polling, websocket").unwrap();
        let arr = root["socket"]["transports"].as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0].as_str(), Some("polling"));
    }

    #[test]
    fn set_toml_value_rejects_unknown_and_mistyped_keys() {
        let mut root: toml::Value =
            toml::from_str("[feed]\nretry_interval_ms = 1000\n").unwrap();
        assert!(set_toml_value(&mut root, "feed.nope", "1").is_err());
        assert!(set_toml_value(&mut root, "missing.key", "1").is_err());
        assert!(set_toml_value(&mut root, "feed.retry_interval_ms", "soon").is_err());
    }

    #[test]
    fn show_effective_config_round_trips() {
        let toml_str = show_effective_config().unwrap();
        let _: VoltGuardConfig = toml::from_str(&toml_str).unwrap();
    }
}
