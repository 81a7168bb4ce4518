//! URL helpers for the diffusion server address.

use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_PORT: &str = "8190";
pub const ALTERNATE_PORT: &str = "8188";

static RE_PORT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":(\d+)").unwrap());
static RE_SCHEME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://").unwrap());

/// Trim, drop one trailing `/`, and default to `http://`.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if RE_SCHEME.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// The first `:<digits>` in the address, or the default port.
pub fn current_port(url: &str) -> &str {
    RE_PORT
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(DEFAULT_PORT)
}

/// Switch between the two common ComfyUI ports. Addresses without a port
/// are replaced by the loopback address on the new port.
pub fn toggle_port(url: &str) -> String {
    let next = if current_port(url) == DEFAULT_PORT {
        ALTERNATE_PORT
    } else {
        DEFAULT_PORT
    };
    let replaced = RE_PORT.replace(url, format!(":{}", next)).into_owned();
    if replaced.contains(&format!(":{}", next)) {
        replaced
    } else {
        format!("http://127.0.0.1:{}", next)
    }
}

/// Address of a finished image on the server.
pub fn view_url(base: &str, filename: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(filename.as_bytes()).collect();
    format!("{}/view?filename={}", base, encoded)
}

/// HTML where JSON was expected.
pub fn is_html(body: &str) -> bool {
    body.trim_start().starts_with('<')
}
