use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{StatusCode, Url};

use cairn_common::WorkspaceConfig;

use crate::types::WorkspaceRegistry;

/// Registry client for a remote service exposing
/// `GET {base}/workspaces` and `GET {base}/workspaces/{id_or_slug}`.
#[derive(Debug, Clone)]
pub struct HttpWorkspaceRegistry {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpWorkspaceRegistry {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(timeout)
            .build()
            .context("building registry http client")?;
        let base_url = Url::parse(base_url).with_context(|| format!("parsing registry url {base_url}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("registry url {base_url} cannot carry a path");
        }
        Ok(Self {
            http,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Base URL plus `segments`, each percent-encoded as a single path segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("registry url {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }
}

#[async_trait::async_trait]
impl WorkspaceRegistry for HttpWorkspaceRegistry {
    async fn get_workspace(&self, id_or_slug: &str) -> Result<Option<WorkspaceConfig>> {
        // Dot segments would be dropped from the path rather than encoded.
        if matches!(id_or_slug, "" | "." | "..") {
            return Ok(None);
        }
        let url = self.url(&["workspaces", id_or_slug])?;
        let resp = self
            .auth(self.http.get(url.clone()))
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%url, %status, "workspace registry lookup failed");
            anyhow::bail!("registry returned {status}: {body}");
        }

        let ws = resp
            .json::<WorkspaceConfig>()
            .await
            .with_context(|| format!("decoding workspace from {url}"))?;
        Ok(Some(ws))
    }

    async fn list_workspaces(&self) -> Result<Vec<WorkspaceConfig>> {
        let url = self.url(&["workspaces"])?;
        let resp = self
            .auth(self.http.get(url.clone()))
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode as AxumStatus, routing::get, Json, Router};
    use cairn_common::{WorkspaceAuth, WorkspaceStatus};

    fn ws1() -> WorkspaceConfig {
        WorkspaceConfig {
            id: "ws1".to_string(),
            slug: "team-one".to_string(),
            base_url: "https://api.example.com".to_string(),
            status: WorkspaceStatus::Active,
            auth: WorkspaceAuth::default(),
        }
    }

    async fn serve() -> String {
        let app = Router::new()
            .route("/workspaces", get(|| async { Json(vec![ws1()]) }))
            .route(
                "/admin",
                get(|| async {
                    Json(WorkspaceConfig {
                        id: "admin".to_string(),
                        slug: "admin".to_string(),
                        ..ws1()
                    })
                }),
            )
            .route(
                "/workspaces/:key",
                get(|Path(key): Path<String>| async move {
                    match key.as_str() {
                        "ws1" | "team-one" => Ok(Json(ws1())),
                        "broken" => Err(AxumStatus::INTERNAL_SERVER_ERROR),
                        _ => Err(AxumStatus::NOT_FOUND),
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn maps_statuses_to_lookup_outcomes() {
        let base = serve().await;
        let reg = HttpWorkspaceRegistry::new(&base, Some("t0ken".to_string()), Duration::from_secs(5)).unwrap();

        assert_eq!(reg.get_workspace("team-one").await.unwrap().unwrap().id, "ws1");
        assert!(reg.get_workspace("nope").await.unwrap().is_none());
        assert!(reg.get_workspace("broken").await.is_err());
        assert_eq!(reg.list_workspaces().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_registry_is_an_error() {
        let reg = HttpWorkspaceRegistry::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
        assert!(reg.get_workspace("ws1").await.is_err());
    }

    #[tokio::test]
    async fn keys_stay_inside_the_workspace_path() {
        let base = serve().await;
        let reg = HttpWorkspaceRegistry::new(&base, None, Duration::from_secs(5)).unwrap();

        for key in ["../../admin", "other/../ws1", "ws1?x=nope", "ws1#frag", "..", "."] {
            assert!(reg.get_workspace(key).await.unwrap().is_none(), "{key}");
        }
        assert_eq!(reg.get_workspace("ws1").await.unwrap().unwrap().id, "ws1");
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let reg = HttpWorkspaceRegistry::new("http://registry.local/api/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            reg.url(&["workspaces", "team one/x"]).unwrap().as_str(),
            "http://registry.local/api/workspaces/team%20one%2Fx"
        );
    }
}
