use once_cell::sync::Lazy;
use url::Url;
use uuid::Uuid;

use crate::error::{ChatError, Result};

pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
});

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// `https://host/app` -> `wss://host/app/socket`.
pub fn ws_url_from_base(base_url: &str) -> Result<String> {
    let mut url = Url::parse(&normalize_url(base_url))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(ChatError::Config(format!("unsupported scheme {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ChatError::Config(format!("cannot use {} for {}", scheme, base_url)))?;
    let path = format!("{}/socket", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url.to_string())
}

/// Client-side id for an optimistic message, unique for the life of the process.
pub fn temp_id() -> String {
    format!("tmp-{}", Uuid::new_v4().simple())
}
