use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mux_engine::{
    CancellationToken, ErrorKind, FetchError, FetchResult, FetchSettings, Fetcher,
    MultiplexConfig, MultiplexError, Multiplexer, NullSink, ReqwestFetcher,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Echoes the `param` query value after a short delay.
struct EchoParam {
    delay: Duration,
}

impl Respond for EchoParam {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let param = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "param")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        ResponseTemplate::new(200)
            .set_delay(self.delay)
            .set_body_raw(param, "text/plain")
    }
}

/// Counts how many fetches are in flight through the wrapped fetcher.
struct InFlightCounter {
    inner: ReqwestFetcher,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait::async_trait]
impl Fetcher for InFlightCounter {
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.inner.fetch(url, cancel).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn reqwest_fetcher() -> ReqwestFetcher {
    ReqwestFetcher::new(FetchSettings::default()).expect("client")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_urls_echo_in_order_with_at_most_two_fetches_in_flight() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(EchoParam {
            delay: Duration::from_millis(3),
        })
        .mount(&server)
        .await;

    let counter = Arc::new(InFlightCounter {
        inner: reqwest_fetcher(),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let mux = Multiplexer::new(
        MultiplexConfig::new(counter.clone())
            .with_max_concurrent(2)
            .with_diagnostics(Arc::new(NullSink)),
    );
    let urls: Vec<String> = (1..=10)
        .map(|i| format!("{}/echo?param={i}", server.uri()))
        .collect();

    let results = mux
        .multiplex(&urls, &CancellationToken::new())
        .await
        .expect("batch ok");

    assert_eq!(results.len(), 10);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.status_code, 200);
        assert_eq!(result.body, (i + 1).to_string().into_bytes());
        assert_eq!(result.header("Content-Type"), Some("text/plain"));
    }
    assert!(counter.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn single_slow_url_is_reported_by_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;

    let mux = Multiplexer::new(
        MultiplexConfig::new(Arc::new(reqwest_fetcher()))
            .with_request_timeout(Duration::from_millis(10))
            .with_diagnostics(Arc::new(NullSink)),
    );
    let url = format!("{}/slow", server.uri());

    let err = mux
        .multiplex(&[url.clone()], &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, MultiplexError::SlowUrl { url });
}

#[tokio::test]
async fn oversized_batch_makes_no_network_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mux = Multiplexer::new(
        MultiplexConfig::new(Arc::new(reqwest_fetcher()))
            .with_max_urls(5)
            .with_diagnostics(Arc::new(NullSink)),
    );
    let urls: Vec<String> = (0..6).map(|i| format!("{}/{i}", server.uri())).collect();

    let err = mux
        .multiplex(&urls, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TooManyUrls);
    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty());
}

#[tokio::test]
async fn unreachable_url_fails_the_whole_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    let closed_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dead = format!("http://127.0.0.1:{closed_port}/");

    let mux = Multiplexer::new(
        MultiplexConfig::new(Arc::new(reqwest_fetcher()))
            .with_diagnostics(Arc::new(NullSink)),
    );
    let urls = vec![format!("{}/a", server.uri()), dead.clone()];

    let err = mux
        .multiplex(&urls, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unclassified);
    assert_eq!(err.url(), Some(dead.as_str()));
}
