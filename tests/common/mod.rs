//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use goofy_proxy::http::ResponseInterceptor;
use goofy_proxy::{HttpServer, ProxyConfig, Shutdown};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A canned upstream response.
#[derive(Clone)]
pub struct Canned {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    /// Send the body with chunked transfer encoding and no Content-Length.
    pub chunked: bool,
}

impl Canned {
    pub fn ok(content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type,
            body: body.into(),
            chunked: false,
        }
    }

    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }
}

/// Raw-TCP upstream that records every request head it receives.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    /// Request heads (request line plus headers) seen so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Start a mock upstream on an ephemeral port that always answers with `canned`.
pub async fn start_upstream(canned: Canned) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let canned = canned.clone();
                    let seen = seen.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        seen.lock().unwrap().push(head);

                        let status_text = match canned.status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            _ => "200 OK",
                        };
                        let framing = if canned.chunked {
                            "Transfer-Encoding: chunked".to_string()
                        } else {
                            format!("Content-Length: {}", canned.body.len())
                        };
                        let head = format!(
                            "HTTP/1.1 {}\r\nContent-Type: {}\r\n{}\r\nConnection: close\r\n\r\n",
                            status_text, canned.content_type, framing
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        if canned.chunked {
                            for chunk in canned.body.chunks(10) {
                                let _ = socket.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await;
                                let _ = socket.write_all(chunk).await;
                                let _ = socket.write_all(b"\r\n").await;
                            }
                            let _ = socket.write_all(b"0\r\n\r\n").await;
                        } else {
                            let _ = socket.write_all(&canned.body).await;
                        }
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockUpstream { addr, requests }
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// An address nothing is listening on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Default config pointed at `upstream`.
pub fn config_for(upstream: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstream.url = upstream.to_string();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config
}

/// A proxy serving on an ephemeral port; stops when dropped.
pub struct RunningProxy {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the proxy with the image interceptor built from `config`.
pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    serve(HttpServer::new(config).unwrap()).await
}

/// Start the proxy with a caller-supplied interceptor.
pub async fn start_proxy_with(
    config: ProxyConfig,
    interceptor: Arc<dyn ResponseInterceptor>,
) -> RunningProxy {
    serve(HttpServer::with_interceptor(config, interceptor).unwrap()).await
}

async fn serve(server: HttpServer) -> RunningProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    RunningProxy { addr, shutdown }
}

/// A small image whose left and right halves differ.
pub fn sample_image() -> DynamicImage {
    let img = RgbImage::from_fn(32, 16, |x, y| {
        if x < 16 {
            Rgb([255, (y * 8) as u8, 0])
        } else {
            Rgb([0, 0, (x * 4) as u8])
        }
    });
    DynamicImage::ImageRgb8(img)
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn png_bytes() -> Vec<u8> {
    encode(&sample_image(), ImageFormat::Png)
}

pub fn jpeg_bytes() -> Vec<u8> {
    encode(&sample_image(), ImageFormat::Jpeg)
}

/// JPEG magic followed by garbage: sniffs as JPEG, fails to decode.
pub fn corrupt_jpeg_bytes() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.extend_from_slice(b"definitely not a jpeg payload");
    bytes
}
