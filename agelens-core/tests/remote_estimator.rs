//! HTTP remote estimator against a throwaway local server.

use std::time::Duration;

use agelens_core::{Gender, HttpRemoteEstimator, RemoteEstimateError, RemoteEstimator};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::oneshot,
};

/// Serve one request with `status` and `body`, handing back the request body.
async fn serve_once(
    status: &'static str,
    body: &'static str,
) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("http://{}/api/analyze-face", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let request = read_request(&mut socket).await;
        let _ = tx.send(request);
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.expect("write");
        socket.shutdown().await.ok();
    });

    (url, rx)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.expect("read");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(split) = text.find("\r\n\r\n") {
            let length = text[..split]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= split + 4 + length {
                return String::from_utf8_lossy(&buf[split + 4..split + 4 + length]).into_owned();
            }
        }
    }
    String::new()
}

#[tokio::test]
async fn posts_data_url_and_parses_results() {
    let (url, request) = serve_once(
        "200 OK",
        r#"{"results":[{"age":28.4,"gender":"male","genderProbability":0.83,"confidence":0.7,"position":{"x":50,"y":50,"width":200,"height":200}}],"processingLocation":"server","isEstimate":true}"#,
    )
    .await;

    let remote = HttpRemoteEstimator::new(url, Duration::from_secs(5)).expect("client");
    let results = remote.estimate(vec![0xFF, 0xD8, 0xFF]).await.expect("estimate");
    assert_eq!(results.len(), 1);
    let attrs = results[0].attributes();
    assert_eq!(attrs.gender, Some(Gender::Male));
    assert_eq!(attrs.age, Some(28.4));

    let body: serde_json::Value = serde_json::from_str(&request.await.unwrap()).unwrap();
    assert_eq!(body["imageData"], "data:image/jpeg;base64,/9j/");
}

#[tokio::test]
async fn error_status_is_reported() {
    let (url, _request) = serve_once("500 Internal Server Error", r#"{"error":"nope"}"#).await;
    let remote = HttpRemoteEstimator::new(url, Duration::from_secs(5)).expect("client");
    let err = remote.estimate(vec![1]).await.unwrap_err();
    assert!(matches!(err, RemoteEstimateError::Status(500)), "{err}");
}

#[tokio::test]
async fn empty_results_are_a_failure() {
    let (url, _request) = serve_once("200 OK", r#"{"results":[],"isEstimate":true}"#).await;
    let remote = HttpRemoteEstimator::new(url, Duration::from_secs(5)).expect("client");
    let err = remote.estimate(vec![1]).await.unwrap_err();
    assert!(matches!(err, RemoteEstimateError::Empty), "{err}");
}

#[tokio::test]
async fn malformed_json_is_a_parse_failure() {
    let (url, _request) = serve_once("200 OK", "<html>").await;
    let remote = HttpRemoteEstimator::new(url, Duration::from_secs(5)).expect("client");
    let err = remote.estimate(vec![1]).await.unwrap_err();
    assert!(matches!(err, RemoteEstimateError::Parse(_)), "{err}");
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("http://{}/", listener.local_addr().unwrap());
    // Accept and hold the connection without ever answering.
    let holder = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });

    let remote = HttpRemoteEstimator::new(url, Duration::from_millis(200)).expect("client");
    let err = remote.estimate(vec![1]).await.unwrap_err();
    assert!(matches!(err, RemoteEstimateError::Timeout(_)), "{err}");
    holder.abort();
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let remote = HttpRemoteEstimator::new(format!("http://{addr}/"), Duration::from_secs(2))
        .expect("client");
    let err = remote.estimate(vec![1]).await.unwrap_err();
    assert!(matches!(err, RemoteEstimateError::Transport(_)), "{err}");
}
