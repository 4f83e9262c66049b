use std::future::Future;
use std::time::Duration;

use tracing::warn;

const BASE_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 8_000;

fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// `Retry-After` in seconds if the server sent one, exponential backoff
/// otherwise. Either way the delay never exceeds `MAX_BACKOFF_MS`.
pub(crate) fn retry_delay(response: Option<&reqwest::Response>, attempt: u32) -> Duration {
    let cap = Duration::from_millis(MAX_BACKOFF_MS);
    if let Some(secs) = response
        .and_then(|r| r.headers().get(reqwest::header::RETRY_AFTER))
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
    {
        return Duration::from_secs(secs).min(cap);
    }
    Duration::from_millis(BASE_BACKOFF_MS << attempt.min(5)).min(cap)
}

/// Send a request, retrying up to `max_retries` times on 429, 5xx, timeouts
/// and connection failures. The final response is returned as-is, so callers
/// still inspect the status of a non-transient failure.
pub(crate) async fn send_with_retry<F, Fut>(
    target: &str,
    max_retries: u32,
    mut f: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(response) if is_transient_status(response.status()) && attempt < max_retries => {
                let delay = retry_delay(Some(&response), attempt);
                warn!(
                    "{target} returned {}, retrying in {}ms ({}/{})",
                    response.status(),
                    delay.as_millis(),
                    attempt + 1,
                    max_retries
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) if is_transient_error(&e) && attempt < max_retries => {
                let delay = retry_delay(None, attempt);
                warn!(
                    "{target} request failed ({e}), retrying in {}ms ({}/{})",
                    delay.as_millis(),
                    attempt + 1,
                    max_retries
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(retry_delay(None, 0), Duration::from_millis(250));
        assert_eq!(retry_delay(None, 1), Duration::from_millis(500));
        assert_eq!(retry_delay(None, 2), Duration::from_millis(1000));
        assert_eq!(retry_delay(None, 30), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[tokio::test]
    async fn server_retry_after_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3600"))
            .mount(&server)
            .await;

        let response = reqwest::get(server.uri()).await.unwrap();
        assert_eq!(retry_delay(Some(&response), 0), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[tokio::test]
    async fn small_retry_after_is_honoured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let response = reqwest::get(server.uri()).await.unwrap();
        assert_eq!(retry_delay(Some(&response), 3), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = server.uri();
        let response = send_with_retry("test", 2, || client.get(&url).send())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .expect(2)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = server.uri();
        let response = send_with_retry("test", 1, || client.get(&url).send())
            .await
            .unwrap();
        assert_eq!(response.status(), 429);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = server.uri();
        let response = send_with_retry("test", 3, || client.get(&url).send())
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }
}
