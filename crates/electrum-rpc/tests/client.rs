//! Client behavior against an in-process mock Electrum server: lazy
//! connect, multiplexing, error propagation, reconnect, close, timeout and
//! keep-alive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use electrum_rpc::{ConnectionState, ElectrumClient, ElectrumConfig, ElectrumError, Protocol};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

fn config_for(port: u16) -> ElectrumConfig {
    ElectrumConfig {
        host: "127.0.0.1".into(),
        port,
        protocol: Protocol::Tcp,
        timeout_ms: 2_000,
        max_retry: 0,
        retry_period_ms: 50,
        ping_period_ms: 60_000,
    }
}

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn reply(id: u64, result: Value) -> Vec<u8> {
    let mut line = json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string();
    line.push('\n');
    line.into_bytes()
}

fn reply_error(id: u64, code: i64, message: &str) -> Vec<u8> {
    let mut line =
        json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
            .to_string();
    line.push('\n');
    line.into_bytes()
}

/// Accept one connection and echo `test.echo` params forever.
fn spawn_echo_server(listener: TcpListener, pings: Option<Arc<AtomicUsize>>) {
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            let pings = pings.clone();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let id = request["id"].as_u64().unwrap();
                let frame = match request["method"].as_str().unwrap() {
                    "server.version" => reply(id, json!(["mock electrum", "1.4"])),
                    "server.ping" => {
                        if let Some(counter) = &pings {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                        reply(id, Value::Null)
                    }
                    "blockchain.estimatefee" => reply(id, json!(0.00012)),
                    "test.fail" => reply_error(id, -2, "rejected by server"),
                    _ => reply(id, request["params"][0].clone()),
                };
                if write_half.write_all(&frame).await.is_err() {
                    break;
                }
            }
        }
    });
}

#[tokio::test]
async fn connects_lazily_and_resolves_calls() {
    let (listener, port) = bind().await;
    spawn_echo_server(listener, None);

    let client = ElectrumClient::new(config_for(port));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let fee = client.estimate_fee(1).await.unwrap();
    assert!((fee - 0.00012).abs() < 1e-12);
    assert_eq!(client.state(), ConnectionState::Connected);

    let echoed = client.call("test.echo", vec![json!("hello")]).await.unwrap();
    assert_eq!(echoed, json!("hello"));
}

#[tokio::test]
async fn responses_resolve_out_of_order() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let handshake: Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        write_half
            .write_all(&reply(handshake["id"].as_u64().unwrap(), json!(["mock", "1.4"])))
            .await
            .unwrap();

        // Collect both requests, then answer in reverse order.
        let first: Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        write_half
            .write_all(&reply(second["id"].as_u64().unwrap(), second["params"][0].clone()))
            .await
            .unwrap();
        write_half
            .write_all(&reply(first["id"].as_u64().unwrap(), first["params"][0].clone()))
            .await
            .unwrap();
    });

    let client = ElectrumClient::new(config_for(port));
    let (alpha, beta) = tokio::join!(
        client.call("test.echo", vec![json!("alpha")]),
        client.call("test.echo", vec![json!("beta")]),
    );
    assert_eq!(alpha.unwrap(), json!("alpha"));
    assert_eq!(beta.unwrap(), json!("beta"));
}

#[tokio::test]
async fn server_errors_surface_with_code_and_message() {
    let (listener, port) = bind().await;
    spawn_echo_server(listener, None);

    let client = ElectrumClient::new(config_for(port));
    let err = client.call("test.fail", vec![]).await.unwrap_err();
    match err {
        ElectrumError::Protocol { code, message } => {
            assert_eq!(code, -2);
            assert_eq!(message, "rejected by server");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn socket_death_flushes_pending_and_next_call_reconnects() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        // First connection: handshake, then drop on the first real request.
        let (stream, _) = listener.accept().await.unwrap();
        {
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let handshake: Value =
                serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            write_half
                .write_all(&reply(handshake["id"].as_u64().unwrap(), json!(["mock", "1.4"])))
                .await
                .unwrap();
            let _ = lines.next_line().await;
            // Dropping both halves closes the socket mid-request.
        }

        // Second connection: behave normally.
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            let id = request["id"].as_u64().unwrap();
            let frame = match request["method"].as_str().unwrap() {
                "server.version" => reply(id, json!(["mock", "1.4"])),
                _ => reply(id, request["params"][0].clone()),
            };
            write_half.write_all(&frame).await.unwrap();
        }
    });

    let client = ElectrumClient::new(config_for(port));
    let err = client.call("test.echo", vec![json!("lost")]).await.unwrap_err();
    assert!(matches!(err, ElectrumError::ConnectionClosed));

    // The client recovers by itself on the next call.
    let echoed = client.call("test.echo", vec![json!("back")]).await.unwrap();
    assert_eq!(echoed, json!("back"));
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn close_is_terminal() {
    let (listener, port) = bind().await;
    spawn_echo_server(listener, None);

    let client = ElectrumClient::new(config_for(port));
    client.ping().await.unwrap();
    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);

    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, ElectrumError::Closed));

    let err = client.reconnect().await.unwrap_err();
    assert!(matches!(err, ElectrumError::Closed));
}

#[tokio::test]
async fn unresponsive_server_times_out_the_connect() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        // Accept and read, but never answer the version handshake.
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, _write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(_)) = lines.next_line().await {}
    });

    let mut config = config_for(port);
    config.timeout_ms = 200;
    let client = ElectrumClient::new(config);

    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, ElectrumError::Timeout));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn keepalive_pings_while_connected() {
    let (listener, port) = bind().await;
    let pings = Arc::new(AtomicUsize::new(0));
    spawn_echo_server(listener, Some(Arc::clone(&pings)));

    let mut config = config_for(port);
    config.ping_period_ms = 100;
    let client = ElectrumClient::new(config);
    client.call("test.echo", vec![json!("warm-up")]).await.unwrap();

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert!(
        pings.load(Ordering::SeqCst) >= 2,
        "expected at least two keepalive pings, saw {}",
        pings.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn notification_frames_are_ignored() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            let id = request["id"].as_u64().unwrap();
            if request["method"] == "server.version" {
                write_half
                    .write_all(&reply(id, json!(["mock", "1.4"])))
                    .await
                    .unwrap();
                continue;
            }
            // A subscription notification lands before the actual response.
            let mut notification =
                json!({"jsonrpc": "2.0", "method": "blockchain.headers.subscribe", "params": [{}]})
                    .to_string();
            notification.push('\n');
            write_half.write_all(notification.as_bytes()).await.unwrap();
            write_half
                .write_all(&reply(id, request["params"][0].clone()))
                .await
                .unwrap();
        }
    });

    let client = ElectrumClient::new(config_for(port));
    let echoed = client.call("test.echo", vec![json!("still works")]).await.unwrap();
    assert_eq!(echoed, json!("still works"));
}
