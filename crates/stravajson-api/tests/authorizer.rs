use std::time::Duration;

use stravajson_api::{ApiError, AuthorizerSettings, LocalAuthorizer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn settings(port: u16) -> AuthorizerSettings {
    AuthorizerSettings::new("12345", "https://www.strava.com/oauth/authorize")
        .with_redirect("127.0.0.1", port)
        .with_open_browser(false)
}

async fn get(port: u16, target: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let request = format!("GET {target} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn captures_code_from_redirect() {
    let pending = LocalAuthorizer::new(settings(0)).start().await.unwrap();
    let port = pending.local_addr().port();

    assert_eq!(
        pending.redirect_uri(),
        format!("http://127.0.0.1:{port}/exchange_token")
    );
    assert!(pending.authorization_url().contains("client_id=12345"));

    let not_found = get(port, "/favicon.ico").await;
    assert!(not_found.starts_with("HTTP/1.1 404"));

    let ok = get(port, "/exchange_token?state=&code=abc&scope=read,activity:read_all").await;
    assert!(ok.starts_with("HTTP/1.1 200"));
    assert!(ok.contains("Authorization complete"));

    let code = pending.wait(Duration::from_secs(5)).await.unwrap();
    assert_eq!(code, "abc");

    // listener is gone once wait returns
    TcpListener::bind(("127.0.0.1", port)).await.unwrap();
}

#[tokio::test]
async fn times_out_and_releases_port() {
    let pending = LocalAuthorizer::new(settings(0)).start().await.unwrap();
    let port = pending.local_addr().port();

    let err = pending.wait(Duration::from_millis(300)).await.unwrap_err();
    assert!(matches!(err, ApiError::AuthorizationTimeout { .. }));

    TcpListener::bind(("127.0.0.1", port)).await.unwrap();
}

#[tokio::test]
async fn falls_back_when_port_is_taken() {
    let occupied = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let taken = occupied.local_addr().unwrap().port();

    let pending = LocalAuthorizer::new(settings(taken)).start().await.unwrap();
    let port = pending.local_addr().port();
    assert_ne!(port, taken);
    assert!(pending.redirect_uri().contains(&format!(":{port}/")));

    drop(pending);
    drop(occupied);
}

#[tokio::test]
async fn idle_connection_does_not_delay_redirect() {
    let pending = LocalAuthorizer::new(settings(0)).start().await.unwrap();
    let port = pending.local_addr().port();

    // a browser preconnect: opened, never written to
    let _idle = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ok = get(port, "/exchange_token?code=xyz").await;
    assert!(ok.starts_with("HTTP/1.1 200"));

    // well under the per-connection read timeout
    let code = pending.wait(Duration::from_secs(2)).await.unwrap();
    assert_eq!(code, "xyz");
}

#[tokio::test]
async fn dropping_pending_authorization_releases_port() {
    let pending = LocalAuthorizer::new(settings(0)).start().await.unwrap();
    let port = pending.local_addr().port();

    drop(pending);
    tokio::time::sleep(Duration::from_millis(50)).await;

    TcpListener::bind(("127.0.0.1", port)).await.unwrap();
}
