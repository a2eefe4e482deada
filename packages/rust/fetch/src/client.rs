//! HTTP plumbing shared by the fetcher and the prober.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use markdownizer_reconcile::{FetchedPage, PageFetcher};
use markdownizer_shared::{FetchConfig, MarkdownizerError, Result, redact_tokens};

/// Responses larger than this are refused (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// Build a reqwest client with the configured UA, redirect limit and timeout.
pub(crate) fn build_client(config: &FetchConfig, timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .timeout(timeout)
        .build()
        .map_err(|e| MarkdownizerError::Network(format!("failed to build HTTP client: {e}")))
}

/// A response of any status.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// GET `url`, following redirects. Non-2xx statuses are returned, not raised.
pub(crate) async fn get(client: &Client, url: &str) -> Result<RawResponse> {
    let shown = redact_tokens(url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| MarkdownizerError::Network(format!("{shown}: {}", e.without_url())))?;

    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(MarkdownizerError::Network(format!(
                "{shown}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    let final_url = response.url().to_string();
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| MarkdownizerError::Network(format!("{shown}: body read failed: {}", e.without_url())))?;

    debug!(status, bytes = body.len(), "response received");
    Ok(RawResponse {
        final_url,
        status,
        body,
    })
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Independent fetch over plain HTTP, without the user's cookies or session.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = build_client(config, Duration::from_secs(config.timeout_secs))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for ReqwestFetcher {
    #[instrument(skip_all, fields(url = %redact_tokens(url)))]
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let raw = get(&self.client, url).await?;
        if !(200..300).contains(&raw.status) {
            return Err(MarkdownizerError::Network(format!(
                "{}: HTTP {}",
                redact_tokens(url),
                raw.status
            )));
        }
        Ok(FetchedPage {
            final_url: raw.final_url,
            status: raw.status,
            html: raw.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fetcher() -> ReqwestFetcher {
        ReqwestFetcher::new(&FetchConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn fetch_returns_body_and_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/post"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hello</p>"))
            .mount(&server)
            .await;

        let url = format!("{}/post", server.uri());
        let page = fetcher().fetch(&url).await.unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.final_url, url);
        assert_eq!(page.html, "<p>hello</p>");
    }

    #[tokio::test]
    async fn fetch_sends_configured_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "markdownizer-test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let config = FetchConfig {
            user_agent: "markdownizer-test/1.0".into(),
            ..FetchConfig::default()
        };
        let page = ReqwestFetcher::new(&config)
            .unwrap()
            .fetch(&server.uri())
            .await
            .unwrap();
        assert_eq!(page.html, "ok");
    }

    #[tokio::test]
    async fn fetch_follows_redirects_and_reports_landing_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/premium-post"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/login"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<form>sign in</form>"))
            .mount(&server)
            .await;

        let page = fetcher()
            .fetch(&format!("{}/premium-post", server.uri()))
            .await
            .unwrap();
        assert_eq!(page.final_url, format!("{}/login", server.uri()));
    }

    #[tokio::test]
    async fn fetch_gives_up_on_redirect_loops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let config = FetchConfig {
            max_redirects: 3,
            ..FetchConfig::default()
        };
        let err = ReqwestFetcher::new(&config)
            .unwrap()
            .fetch(&format!("{}/loop", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, MarkdownizerError::Network(_)));
    }

    #[tokio::test]
    async fn non_success_status_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher().fetch(&server.uri()).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = FetchConfig {
            timeout_secs: 1,
            ..FetchConfig::default()
        };
        let err = ReqwestFetcher::new(&config)
            .unwrap()
            .fetch(&server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, MarkdownizerError::Network(_)));
    }

    #[tokio::test]
    async fn error_messages_redact_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/feed?token=s3cret", server.uri()))
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("s3cret"));
    }
}
