//! Subcommand implementations and the shared HTTP plumbing they use.

pub mod assign;
pub mod charge;
pub mod init;
pub mod resolve;
pub mod settle;
pub mod status;
pub mod wallet;

use clap::Args;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Header naming the node a request acts as.
pub const ACTOR_HEADER: &str = "x-tierpay-actor";

/// Where the node is and who is asking.
#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// API endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:9100")]
    pub endpoint: String,

    /// Hierarchy node to act as.
    #[arg(short, long)]
    pub actor: Option<String>,
}

impl NodeArgs {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.endpoint.trim_end_matches('/'), path)
    }

    pub fn get(&self, client: &reqwest::Client, path: &str) -> reqwest::RequestBuilder {
        self.with_actor(client.get(self.url(path)))
    }

    pub fn post(&self, client: &reqwest::Client, path: &str) -> reqwest::RequestBuilder {
        self.with_actor(client.post(self.url(path)))
    }

    fn with_actor(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.actor {
            Some(ref actor) => req.header(ACTOR_HEADER, actor),
            None => req,
        }
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Send a request and decode a JSON success body, turning error bodies into
/// readable failures.
pub async fn send<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> anyhow::Result<T> {
    let resp = req
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("could not reach node: {e}\nIs the node running? Start it with: tierpay-node"))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    match resp.json::<ErrorResponse>().await {
        Ok(err) => anyhow::bail!("request failed (HTTP {}): {}", status, err.error),
        Err(_) => anyhow::bail!("request failed (HTTP {})", status),
    }
}

/// Render a paise count from a JSON body as rupees.
pub fn rupees(value: &serde_json::Value) -> String {
    match value.as_u64() {
        Some(paise) => tierpay_core::Amount::new(paise).to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_api_prefix() {
        let args = NodeArgs {
            endpoint: "http://localhost:9100/".into(),
            actor: None,
        };
        assert_eq!(args.url("/status"), "http://localhost:9100/api/v1/status");
    }

    #[test]
    fn test_rupees() {
        assert_eq!(rupees(&serde_json::json!(1_000_050)), "10000.50");
        assert_eq!(rupees(&serde_json::json!("x")), "\"x\"");
    }
}
