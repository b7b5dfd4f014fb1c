//! Client command implementation
//!
//! Issues `get`/`put` requests against a running logcask façade.

use logcask::Result;
use serde_json::json;

/// Execute a PUT command against the façade.
pub async fn put(addr: &str, key: String, value: String) -> Result<()> {
    let url = format!("http://{addr}/db/?key={key}");
    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .json(&json!({ "key": key, "value": value }))
        .send()
        .await
        .map_err(|e| logcask::StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    println!("{status}: {body}");
    Ok(())
}

/// Execute a GET command against the façade.
pub async fn get(addr: &str, key: String) -> Result<()> {
    let url = format!("http://{addr}/db/?key={key}");
    let resp = reqwest::get(&url)
        .await
        .map_err(|e| logcask::StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    println!("{status}: {body}");
    Ok(())
}
