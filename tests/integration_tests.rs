use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use trikv::config::ServerConfig;
use trikv::metrics::Metrics;
use trikv::server::{HttpServerHandle, TcpServerHandle, UdpServerHandle};
use trikv::{Handler, HttpServer, MemoryStorage, Response, StorageBackend, TcpServer, UdpServer};

struct Cluster {
    tcp: TcpServerHandle,
    udp: UdpServerHandle,
    http: HttpServerHandle,
}

impl Cluster {
    async fn start() -> Self {
        Self::start_with(Arc::new(Metrics::noop())).await
    }

    async fn start_with(metrics: Arc<Metrics>) -> Self {
        let config = ServerConfig::ephemeral();
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let handler = Handler::new(storage, metrics);

        let udp = UdpServer::bind(config.udp_addr(), handler.clone(), config.read_buffer_size)
            .await
            .unwrap()
            .start();
        let http = HttpServer::bind(config.http_addr(), handler.clone(), config.shutdown_grace())
            .await
            .unwrap()
            .start();
        let tcp = TcpServer::bind(config.tcp_addr(), handler, config.read_buffer_size)
            .await
            .unwrap()
            .start();

        Self { tcp, udp, http }
    }

    fn tcp_addr(&self) -> SocketAddr {
        self.tcp.local_addr().unwrap()
    }

    fn udp_addr(&self) -> SocketAddr {
        self.udp.local_addr().unwrap()
    }

    fn http_addr(&self) -> SocketAddr {
        self.http.local_addr().unwrap()
    }

    async fn stop(self) {
        self.udp.stop().await;
        self.http.stop().await;
        self.tcp.stop().await;
    }
}

async fn tcp_request(addr: SocketAddr, body: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(body).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

async fn udp_request(addr: SocketAddr, body: &[u8]) -> Vec<u8> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(body, addr).await.unwrap();
    let mut buffer = vec![0u8; 4096];
    let (n, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
        .await
        .expect("no udp reply")
        .unwrap();
    buffer.truncate(n);
    buffer
}

/// Minimal HTTP/1.1 exchange; returns status code and raw body.
async fn http_request(addr: SocketAddr, method: &str, body: &str) -> (u16, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{} / HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        method,
        addr,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8(raw).unwrap();
    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    let status = head.split(' ').nth(1).unwrap().parse().unwrap();
    assert!(head
        .to_ascii_lowercase()
        .contains("content-type: application/json"));
    (status, body.as_bytes().to_vec())
}

fn parse(bytes: &[u8]) -> Response {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_round_trip_on_every_transport() {
    let cluster = Cluster::start().await;

    let body = br#"{"Method":"POST","Payload":{"1":"hello world","2":123,"3":true}}"#;
    let posted = parse(&tcp_request(cluster.tcp_addr(), body).await);
    assert_eq!(posted.status, 200);

    let over_tcp = tcp_request(cluster.tcp_addr(), br#"{"Method":"GET","Query":"1"}"#).await;
    let over_udp = udp_request(cluster.udp_addr(), br#"{"Method":"GET","Query":"1"}"#).await;
    let (status, over_http) = http_request(cluster.http_addr(), "GET", r#"{"Query":"1"}"#).await;

    assert_eq!(status, 200);
    // Same outcome, same bytes, whichever transport carried it.
    assert_eq!(over_tcp, over_udp);
    assert_eq!(over_tcp, over_http);
    assert_eq!(
        parse(&over_tcp),
        Response {
            err: String::new(),
            status: 200,
            data: Some(json!("hello world")),
        }
    );

    let got = parse(&udp_request(cluster.udp_addr(), br#"{"Method":"GET","Query":"3"}"#).await);
    assert_eq!(got.data, Some(json!(true)));

    cluster.stop().await;
}

#[tokio::test]
async fn test_error_envelopes_match_across_transports() {
    let cluster = Cluster::start().await;

    // Empty store.
    let tcp = tcp_request(cluster.tcp_addr(), br#"{"Method":"GET","Query":"1"}"#).await;
    let (status, http) = http_request(cluster.http_addr(), "GET", r#"{"Query":"1"}"#).await;
    assert_eq!(status, 500);
    assert_eq!(tcp, http);
    assert_eq!(parse(&tcp).err, "store is empty");

    // Empty key.
    let udp = parse(&udp_request(cluster.udp_addr(), br#"{"Method":"DELETE","Query":""}"#).await);
    assert_eq!(udp.status, 400);
    assert_eq!(udp.err, "key cannot be empty");

    // Missing key.
    http_request(cluster.http_addr(), "POST", r#"{"Payload":{"a":1}}"#).await;
    let (status, body) = http_request(cluster.http_addr(), "DELETE", r#"{"Query":"b"}"#).await;
    assert_eq!(status, 404);
    assert_eq!(parse(&body).err, "key not found in store");

    cluster.stop().await;
}

#[tokio::test]
async fn test_unsupported_method() {
    let cluster = Cluster::start().await;

    let tcp = parse(&tcp_request(cluster.tcp_addr(), br#"{"Method":"PUT","Query":"1"}"#).await);
    let udp = parse(&udp_request(cluster.udp_addr(), br#"{"Method":"get","Query":"1"}"#).await);
    let (status, http) =
        http_request(cluster.http_addr(), "PATCH", r#"{"Payload":{"1":"x"}}"#).await;

    assert_eq!(status, 405);
    for response in [tcp, udp, parse(&http)] {
        assert_eq!(response.status, 405);
        assert_eq!(response.err, "method forbidden");
        assert_eq!(response.data, None);
    }

    // Nothing was written by the rejected PATCH.
    let (status, _) = http_request(cluster.http_addr(), "GET", r#"{"Query":"1"}"#).await;
    assert_eq!(status, 500);

    cluster.stop().await;
}

#[tokio::test]
async fn test_malformed_input_does_not_stop_serving() {
    let cluster = Cluster::start().await;

    let tcp = parse(&tcp_request(cluster.tcp_addr(), b"{\"Method\":").await);
    let udp = parse(&udp_request(cluster.udp_addr(), b"\xff\xfe").await);
    let (status, http) = http_request(cluster.http_addr(), "POST", "{not json").await;

    assert_eq!(status, 500);
    for response in [tcp, udp, parse(&http)] {
        assert_eq!(response.status, 500);
        assert!(!response.err.is_empty());
    }

    // A connection that sends nothing and half-closes still gets a reply.
    let mut stream = TcpStream::connect(cluster.tcp_addr()).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    assert_eq!(parse(&out).status, 500);

    let body = br#"{"Method":"POST","Payload":{"k":"v"}}"#;
    let posted = parse(&tcp_request(cluster.tcp_addr(), body).await);
    assert_eq!(posted.status, 200);

    cluster.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_across_transports() {
    let cluster = Arc::new(Cluster::start().await);
    let mut tasks = Vec::new();

    for i in 0..30 {
        let cluster = Arc::clone(&cluster);
        tasks.push(tokio::spawn(async move {
            let key = format!("key-{}", i);
            let body = format!(r#"{{"Method":"POST","Payload":{{"{}":{}}}}}"#, key, i);
            let response = match i % 3 {
                0 => parse(&tcp_request(cluster.tcp_addr(), body.as_bytes()).await),
                1 => parse(&udp_request(cluster.udp_addr(), body.as_bytes()).await),
                _ => {
                    let payload = format!(r#"{{"Payload":{{"{}":{}}}}}"#, key, i);
                    let (_, body) = http_request(cluster.http_addr(), "POST", &payload).await;
                    parse(&body)
                }
            };
            assert_eq!(response.status, 200);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for i in 0..30 {
        let body = format!(r#"{{"Method":"GET","Query":"key-{}"}}"#, i);
        let got = parse(&tcp_request(cluster.tcp_addr(), body.as_bytes()).await);
        assert_eq!(got.data, Some(json!(i)));
    }

    let cluster = Arc::try_unwrap(cluster).ok().unwrap();
    cluster.stop().await;
}

#[tokio::test]
async fn test_metrics_count_every_transport() {
    let metrics = Arc::new(Metrics::new(&Default::default()));
    metrics.start();
    let cluster = Cluster::start_with(Arc::clone(&metrics)).await;

    tcp_request(cluster.tcp_addr(), br#"{"Method":"POST","Payload":{"a":1}}"#).await;
    udp_request(cluster.udp_addr(), br#"{"Method":"GET","Query":"a"}"#).await;
    http_request(cluster.http_addr(), "DELETE", r#"{"Query":"a"}"#).await;
    http_request(cluster.http_addr(), "PATCH", "{}").await;

    cluster.stop().await;
    metrics.stop().await;

    let counts = metrics.snapshot();
    assert_eq!((counts.get, counts.post, counts.delete, counts.unknown), (1, 1, 1, 1));
}
