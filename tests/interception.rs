//! End-to-end tests: client → proxy → mock upstream.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use futures_util::future::BoxFuture;
use goofy_proxy::config::FailurePolicy;
use goofy_proxy::http::{
    ImageInterceptor, InterceptError, Intercepted, InterceptedResponse, Outcome, PassReason,
    ResponseInterceptor,
};
use goofy_proxy::imaging::{CodecError, Distortion, ImageCodec};
use goofy_proxy::transform::TransformRegistry;
use image::ImageFormat;

#[tokio::test]
async fn test_non_image_passes_through_unchanged() {
    let html = b"<html><body>hello</body></html>".to_vec();
    let upstream = start_upstream(Canned::ok("text/html; charset=utf-8", html.clone())).await;
    let proxy = start_proxy(config_for(&upstream.url())).await;

    let res = reqwest::get(proxy.url("/index.html")).await.unwrap();

    assert_eq!(res.status(), 200);
    assert!(res.headers().get("x-goofy").is_none());
    assert_eq!(res.headers()["content-type"], "text/html; charset=utf-8");
    assert_eq!(res.bytes().await.unwrap().as_ref(), html.as_slice());
}

#[tokio::test]
async fn test_png_is_distorted() {
    let original = png_bytes();
    let upstream = start_upstream(Canned::ok("image/png", original.clone())).await;
    let mut config = config_for(&upstream.url());
    config.transform.operations = vec!["flop".to_string()];
    let proxy = start_proxy(config).await;

    let res = reqwest::get(proxy.url("/cat.png")).await.unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-goofy"], "1");
    assert_eq!(res.headers()["content-type"], "image/png");
    let declared: usize = res.headers()["content-length"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let body = res.bytes().await.unwrap();
    assert_eq!(declared, body.len());
    assert_ne!(body.as_ref(), original.as_slice());

    let decoded = image::load_from_memory_with_format(&body, ImageFormat::Png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (32, 16));
}

#[tokio::test]
async fn test_jpeg_rotation_changes_dimensions() {
    let upstream = start_upstream(Canned::ok("image/jpeg", jpeg_bytes())).await;
    let mut config = config_for(&upstream.url());
    config.transform.operations = vec!["rotate-90".to_string()];
    config.transform.format_operations.clear();
    let proxy = start_proxy(config).await;

    let body = reqwest::get(proxy.url("/photo.jpg"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();

    let decoded = image::load_from_memory_with_format(&body, ImageFormat::Jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16, 32));
}

#[tokio::test]
async fn test_corrupt_image_passes_through_by_default() {
    let corrupt = corrupt_jpeg_bytes();
    let upstream = start_upstream(Canned::ok("image/jpeg", corrupt.clone())).await;
    let proxy = start_proxy(config_for(&upstream.url())).await;

    let res = reqwest::get(proxy.url("/broken.jpg")).await.unwrap();

    assert_eq!(res.status(), 200);
    assert!(res.headers().get("x-goofy").is_none());
    assert_eq!(res.bytes().await.unwrap().as_ref(), corrupt.as_slice());
}

#[tokio::test]
async fn test_corrupt_image_fails_under_fail_policy() {
    let upstream = start_upstream(Canned::ok("image/jpeg", corrupt_jpeg_bytes())).await;
    let mut config = config_for(&upstream.url());
    config.transform.failure_policy = FailurePolicy::Fail;
    let proxy = start_proxy(config).await;

    let res = reqwest::get(proxy.url("/broken.jpg")).await.unwrap();

    assert_eq!(res.status(), 502);
}

#[tokio::test]
async fn test_non_ok_image_is_not_touched() {
    let original = png_bytes();
    let upstream = start_upstream(Canned {
        status: 404,
        content_type: "image/png",
        body: original.clone(),
        chunked: false,
    })
    .await;
    let proxy = start_proxy(config_for(&upstream.url())).await;

    let res = reqwest::get(proxy.url("/missing.png")).await.unwrap();

    assert_eq!(res.status(), 404);
    assert!(res.headers().get("x-goofy").is_none());
    assert_eq!(res.bytes().await.unwrap().as_ref(), original.as_slice());
}

#[tokio::test]
async fn test_request_is_rewritten_onto_upstream() {
    let upstream = start_upstream(Canned::ok("text/plain", "ok")).await;
    let base = format!("{}/static", upstream.url());
    let proxy = start_proxy(config_for(&base)).await;

    let res = reqwest::get(proxy.url("/img/a.png?size=2")).await.unwrap();
    assert_eq!(res.status(), 200);

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    let head = requests[0].to_ascii_lowercase();
    assert!(head.starts_with("get /static/img/a.png?size=2 http/1.1"), "{head}");
    assert!(head.contains(&format!("host: {}", upstream.addr)), "{head}");
}

#[tokio::test]
async fn test_chunked_image_over_limit_streams_through() {
    let body: Vec<u8> = (0..64u8).collect();
    let upstream = start_upstream(Canned::ok("image/png", body.clone()).chunked()).await;
    let mut config = config_for(&upstream.url());
    config.transform.max_body_bytes = 16;
    let proxy = start_proxy(config).await;

    let res = reqwest::get(proxy.url("/big.png")).await.unwrap();

    assert_eq!(res.status(), 200);
    assert!(res.headers().get("x-goofy").is_none());
    assert_eq!(res.bytes().await.unwrap().as_ref(), body.as_slice());
}

/// Interceptor that takes its time before handing the response on untouched.
struct DawdlingInterceptor {
    delay: Duration,
}

impl ResponseInterceptor for DawdlingInterceptor {
    fn on_response(
        &self,
        response: InterceptedResponse,
    ) -> BoxFuture<'_, Result<Intercepted, InterceptError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(Intercepted {
                response: response.response,
                outcome: Outcome::Passthrough(PassReason::TransformFailed),
            })
        })
    }
}

#[tokio::test]
async fn test_slow_interception_not_cut_by_request_timeout() {
    let original = png_bytes();
    let upstream = start_upstream(Canned::ok("image/png", original.clone())).await;
    let mut config = config_for(&upstream.url());
    config.timeouts.request_secs = 1;
    let interceptor = DawdlingInterceptor {
        delay: Duration::from_millis(1500),
    };
    let proxy = start_proxy_with(config, Arc::new(interceptor)).await;

    let res = reqwest::get(proxy.url("/slow.png")).await.unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.bytes().await.unwrap().as_ref(), original.as_slice());
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let addr = dead_address().await;
    let proxy = start_proxy(config_for(&format!("http://{}", addr))).await;

    let res = reqwest::get(proxy.url("/")).await.unwrap();

    assert_eq!(res.status(), 502);
}

/// Codec that takes a while and counts how many calls overlap.
struct SlowCodec {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ImageCodec for SlowCodec {
    fn sniff(&self, bytes: &[u8]) -> Option<ImageFormat> {
        bytes.starts_with(b"IMG").then_some(ImageFormat::Png)
    }

    fn is_supported(&self, _format: ImageFormat) -> bool {
        true
    }

    fn apply(
        &self,
        _distortion: Distortion,
        _format: ImageFormat,
        bytes: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut out = bytes.to_vec();
        out.extend_from_slice(b"-goofed");
        Ok(out)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overload_degrades_to_passthrough() {
    const SLOTS: usize = 2;

    let upstream = start_upstream(Canned::ok("image/png", "IMG-payload")).await;
    let mut config = config_for(&upstream.url());
    config.transform.max_concurrent = SLOTS;
    config.transform.acquire_timeout_ms = 50;

    let codec = Arc::new(SlowCodec {
        delay: Duration::from_millis(400),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let registry = TransformRegistry::from_config(&config.transform).unwrap();
    let interceptor = ImageInterceptor::new(&config.transform, registry, codec.clone());
    let proxy = start_proxy_with(config, Arc::new(interceptor)).await;

    let client = reqwest::Client::new();
    let tasks: Vec<_> = (0..SLOTS + 1)
        .map(|i| {
            let client = client.clone();
            let url = proxy.url(&format!("/img/{i}.png"));
            tokio::spawn(async move {
                let res = client.get(url).send().await.unwrap();
                assert_eq!(res.status(), 200);
                let marked = res.headers().get("x-goofy").is_some();
                let body = res.bytes().await.unwrap();
                (marked, body)
            })
        })
        .collect();

    let mut transformed = 0;
    let mut untouched = 0;
    for task in tasks {
        let (marked, body) = task.await.unwrap();
        if marked {
            assert_eq!(body.as_ref(), b"IMG-payload-goofed");
            transformed += 1;
        } else {
            assert_eq!(body.as_ref(), b"IMG-payload");
            untouched += 1;
        }
    }

    assert!(transformed <= SLOTS);
    assert!(untouched >= 1);
    assert!(codec.max_in_flight.load(Ordering::SeqCst) <= SLOTS);
}
