use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

use linedis::config::Config;
use linedis::pool::AdmissionPool;
use linedis::server::Server;
use linedis::Error;

fn config(max_connections: usize) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_connections,
        register_limit: max_connections,
        drain_timeout_ms: 500,
        ..Config::default()
    }
}

async fn start(config: Config) -> (SocketAddr, AdmissionPool, JoinHandle<Result<(), Error>>) {
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let pool = server.pool();
    let handle = tokio::spawn(server.run());

    (addr, pool, handle)
}

async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}

/// Sends `input` and asserts the server answers with exactly `expected`.
async fn test_reply(stream: &mut TcpStream, input: &[u8], expected: &[u8]) {
    stream.write_all(input).await.unwrap();

    let mut buf = vec![0; expected.len()];
    timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for a reply")
        .unwrap();

    assert_eq!(
        String::from_utf8_lossy(&buf),
        String::from_utf8_lossy(expected)
    );
}

/// Asserts nothing arrives on `stream` for a little while.
async fn test_silence(stream: &mut TcpStream) {
    let mut buf = [0; 16];
    let res = timeout(Duration::from_millis(200), stream.read(&mut buf)).await;
    assert!(res.is_err(), "unexpected reply {:?}", res);
}

#[tokio::test]
async fn test_set_then_get() {
    let (addr, _pool, _handle) = start(config(4)).await;
    let mut stream = connect(addr).await;

    test_reply(&mut stream, b"set\r\n$\r\nfoo\r\n$\r\nbar\r\n", b"+OK\r\n").await;
    test_reply(&mut stream, b"get\r\n$\r\nfoo\r\n", b"+bar\r\n").await;
}

#[tokio::test]
async fn test_get_missing_key() {
    let (addr, _pool, _handle) = start(config(4)).await;
    let mut stream = connect(addr).await;

    test_reply(&mut stream, b"get\r\n$\r\nmissing\r\n", b"$-1\r\n").await;
}

#[tokio::test]
async fn test_del() {
    let (addr, _pool, _handle) = start(config(4)).await;
    let mut stream = connect(addr).await;

    test_reply(&mut stream, b"set\r\n$\r\nfoo\r\n$\r\nbar\r\n", b"+OK\r\n").await;
    test_reply(&mut stream, b"del\r\n$\r\nfoo\r\n", b":1\r\n").await;
    test_reply(&mut stream, b"del\r\n$\r\nfoo\r\n", b"$-1\r\n").await;
}

#[tokio::test]
async fn test_unsupported_input_is_reported_once() {
    let (addr, _pool, _handle) = start(config(4)).await;
    let mut stream = connect(addr).await;

    test_reply(&mut stream, b"bogus\r\n", b"-not supported\r\n").await;

    stream.write_all(b"bogus\r\n").await.unwrap();
    test_silence(&mut stream).await;

    test_reply(&mut stream, b"get\r\n$\r\nfoo\r\n", b"$-1\r\n").await;
    test_reply(&mut stream, b"bogus\r\n", b"-not supported\r\n").await;
}

#[tokio::test]
async fn test_command_introspection() {
    let (addr, _pool, _handle) = start(config(4)).await;
    let mut stream = connect(addr).await;

    test_reply(&mut stream, b"COMMAND\r\n", b"$-1\r\n").await;
}

#[tokio::test]
async fn test_sessions_share_the_store() {
    let (addr, _pool, _handle) = start(config(4)).await;
    let mut writer = connect(addr).await;
    let mut reader = connect(addr).await;

    test_reply(&mut writer, b"set\r\n$\r\nshared\r\n$\r\n42\r\n", b"+OK\r\n").await;
    test_reply(&mut reader, b"get\r\n$\r\nshared\r\n", b"+42\r\n").await;
    test_reply(&mut reader, b"del\r\n$\r\nshared\r\n", b":1\r\n").await;
    test_reply(&mut writer, b"get\r\n$\r\nshared\r\n", b"$-1\r\n").await;
}

#[tokio::test]
async fn test_admission_waits_for_a_free_slot() {
    let (addr, pool, _handle) = start(config(2)).await;

    let mut first = connect(addr).await;
    test_reply(&mut first, b"COMMAND\r\n", b"$-1\r\n").await;
    let mut second = connect(addr).await;
    test_reply(&mut second, b"COMMAND\r\n", b"$-1\r\n").await;
    assert_eq!(pool.active_count(), 2);

    // The third client sits in the listen backlog.
    let mut third = connect(addr).await;
    third.write_all(b"COMMAND\r\n").await.unwrap();
    test_silence(&mut third).await;
    assert_eq!(pool.active_count(), 2);

    drop(first);

    let mut buf = [0; 5];
    timeout(Duration::from_secs(2), third.read_exact(&mut buf))
        .await
        .expect("third client was never admitted")
        .unwrap();
    assert_eq!(&buf, b"$-1\r\n");
    assert_eq!(pool.active_count(), 2);

    test_reply(&mut second, b"get\r\n$\r\nfoo\r\n", b"$-1\r\n").await;
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let (addr, pool, handle) = start(config(4)).await;

    let mut first = connect(addr).await;
    let mut second = connect(addr).await;
    test_reply(&mut first, b"COMMAND\r\n", b"$-1\r\n").await;
    test_reply(&mut second, b"COMMAND\r\n", b"$-1\r\n").await;

    pool.shutdown();
    assert!(!pool.request_accept());

    for stream in [&mut first, &mut second] {
        let mut buf = vec![];
        timeout(Duration::from_secs(2), stream.read_to_end(&mut buf))
            .await
            .expect("session was not closed")
            .unwrap();
        assert!(buf.is_empty());
    }

    let res = timeout(Duration::from_secs(2), handle).await.unwrap();
    assert!(res.unwrap().is_ok());

    // Give the guards a moment, every slot is released once sessions are gone.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.active_count(), 0);
}
