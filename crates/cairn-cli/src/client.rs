use anyhow::{bail, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub fn auth(builder: reqwest::RequestBuilder, token: Option<&String>) -> reqwest::RequestBuilder {
    match token {
        Some(t) => builder.bearer_auth(t),
        None => builder,
    }
}

/// Thin JSON client for the daemon's /v1 API.
pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl DaemonClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let resp = auth(self.http.get(&url), self.token.as_ref()).send().await?;
        decode(resp).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        let resp = auth(self.http.post(&url), self.token.as_ref())
            .json(body)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn get_text(&self, path: &str) -> Result<String> {
        let resp = auth(self.http.get(self.url(path)), self.token.as_ref())
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            bail!("{status}: {text}");
        }
        Ok(text)
    }
}

/// Pull `{"error": {"code", "message"}}` out of a failed response.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let err = v.get("error")?;
            let message = err.get("message")?.as_str()?.to_string();
            Some(match err.get("code").and_then(Value::as_str) {
                Some(code) => format!("{code}: {message}"),
                None => message,
            })
        })
        .unwrap_or_else(|| body.to_string())
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        bail!("daemon returned {status}: {}", error_message(&body));
    }
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_is_unwrapped() {
        let body = r#"{"error":{"code":"WORKSPACE_UNAVAILABLE","message":"workspace 'x' is unavailable (status: suspended)"}}"#;
        assert_eq!(
            error_message(body),
            "WORKSPACE_UNAVAILABLE: workspace 'x' is unavailable (status: suspended)"
        );
        assert_eq!(error_message("plain failure"), "plain failure");
    }

    #[test]
    fn base_url_is_normalized() {
        let client = DaemonClient::new("http://localhost:18090/", None);
        assert_eq!(client.url("/v1/contexts"), "http://localhost:18090/v1/contexts");
    }
}
