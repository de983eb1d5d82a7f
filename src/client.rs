use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::api::{ResetReport, StatusReport};
use crate::control::ControlState;
use crate::error::{Error, Result};
use crate::model::Record;

/// Sends one payload to a listener: connect, write, half-close.
pub async fn send_payload(addr: &str, payload: &[u8]) -> Result<()> {
    let mut stream = TcpStream::connect(addr).await.map_err(Error::Connection)?;
    stream.write_all(payload).await.map_err(Error::Connection)?;
    stream.shutdown().await.map_err(Error::Connection)?;
    Ok(())
}

/// Thin wrapper over the HTTP API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base: &str) -> Self {
        let base = if base.starts_with("http://") || base.starts_with("https://") {
            base.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", base.trim_end_matches('/'))
        };
        Self { base, http: reqwest::Client::new() }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<Record>> {
        let mut req = self.http.get(format!("{}/history", self.base));
        if let Some(limit) = limit {
            req = req.query(&[("limit", limit)]);
        }
        Ok(req.send().await?.error_for_status()?.json().await?)
    }

    /// Newest record, optionally for one client. `None` when there is none.
    pub async fn latest(&self, client: Option<&str>) -> Result<Option<Record>> {
        let mut req = self.http.get(format!("{}/history/latest", self.base));
        if let Some(client) = client {
            req = req.query(&[("client", client)]);
        }
        let resp = req.send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.error_for_status()?.json().await?))
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let resp = self.http.get(format!("{}/status", self.base)).send().await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    pub async fn reset(&self) -> Result<ResetReport> {
        let resp = self.http.post(format!("{}/reset", self.base)).send().await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    pub async fn set_active(&self, active: bool) -> Result<ControlState> {
        let action = if active { "start" } else { "stop" };
        let resp = self
            .http
            .post(format!("{}/control/{}", self.base, action))
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(ApiClient::new("127.0.0.1:8080").base_url(), "http://127.0.0.1:8080");
        assert_eq!(ApiClient::new("http://localhost:8080/").base_url(), "http://localhost:8080");
    }
}
