//! End-to-end tests over the wire: a real listener, raw RESP bytes.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use cinder_protocol::{parse_frame, Frame};
use cinder_server::config::Config;
use cinder_server::server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};

/// Boots a server on an ephemeral port. The TempDir must stay alive
/// for the duration of the test.
async fn spawn_server(mutate: impl FnOnce(&mut Config)) -> (SocketAddr, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = Config::default();
    config.dir = dir.path().to_path_buf();
    mutate(&mut config);

    let ctx = server::build_context(config).expect("context should build");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, Arc::new(ctx)));
    (addr, dir)
}

/// A raw RESP client for the tests.
struct Client {
    stream: TcpStream,
    buf: BytesMut,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Sends one command as an array of bulk strings.
    async fn send(&mut self, parts: &[&str]) {
        let mut out = BytesMut::new();
        Frame::Array(
            parts
                .iter()
                .map(|p| Frame::Bulk(bytes::Bytes::copy_from_slice(p.as_bytes())))
                .collect(),
        )
        .serialize(&mut out);
        self.stream.write_all(&out).await.unwrap();
    }

    /// Sends raw bytes on the wire.
    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Reads the next complete reply frame.
    async fn read_frame(&mut self) -> Frame {
        loop {
            if let Some((frame, consumed)) = parse_frame(&self.buf).unwrap() {
                let _ = self.buf.split_to(consumed);
                return frame;
            }
            let n = timeout(Duration::from_secs(5), self.stream.read_buf(&mut self.buf))
                .await
                .expect("timed out waiting for reply")
                .unwrap();
            assert!(n > 0, "connection closed while waiting for a frame");
        }
    }

    async fn round_trip(&mut self, parts: &[&str]) -> Frame {
        self.send(parts).await;
        self.read_frame().await
    }
}

fn bulk(s: &str) -> Frame {
    Frame::Bulk(bytes::Bytes::copy_from_slice(s.as_bytes()))
}

// ---------------------------------------------------------------------------
// wire scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_on_the_wire() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    client.send_raw(b"*1\r\n$4\r\nPING\r\n").await;
    let mut reply = [0u8; 7];
    client.stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"+PONG\r\n");
}

#[tokio::test]
async fn set_then_get() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(client.round_trip(&["SET", "foo", "bar"]).await, Frame::ok());
    assert_eq!(client.round_trip(&["GET", "foo"]).await, bulk("bar"));
    assert_eq!(client.round_trip(&["GET", "missing"]).await, Frame::Null);
}

#[tokio::test]
async fn incr_sequence() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(client.round_trip(&["SET", "c", "10"]).await, Frame::ok());
    assert_eq!(client.round_trip(&["INCR", "c"]).await, Frame::Integer(11));
    assert_eq!(client.round_trip(&["INCR", "c"]).await, Frame::Integer(12));
    assert_eq!(client.round_trip(&["GET", "c"]).await, bulk("12"));
}

#[tokio::test]
async fn sadd_counts_and_scard() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(
        client.round_trip(&["SADD", "s", "a", "b", "c"]).await,
        Frame::Integer(3)
    );
    assert_eq!(client.round_trip(&["SADD", "s", "b"]).await, Frame::Integer(0));
    assert_eq!(client.round_trip(&["SCARD", "s"]).await, Frame::Integer(3));
}

#[tokio::test]
async fn zrange_withscores_ordering() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(
        client
            .round_trip(&["ZADD", "z", "1", "a", "3", "c", "2", "b"])
            .await,
        Frame::Integer(3)
    );
    assert_eq!(
        client
            .round_trip(&["ZRANGE", "z", "0", "-1", "WITHSCORES"])
            .await,
        Frame::Array(vec![
            bulk("a"),
            bulk("1"),
            bulk("b"),
            bulk("2"),
            bulk("c"),
            bulk("3"),
        ])
    );
}

#[tokio::test]
async fn multi_exec_happy_path() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(client.round_trip(&["MULTI"]).await, Frame::ok());
    assert_eq!(
        client.round_trip(&["SET", "k1", "v1"]).await,
        Frame::Simple("QUEUED".into())
    );
    assert_eq!(
        client.round_trip(&["SET", "k2", "v2"]).await,
        Frame::Simple("QUEUED".into())
    );
    assert_eq!(
        client.round_trip(&["EXEC"]).await,
        Frame::Array(vec![Frame::ok(), Frame::ok()])
    );
    assert_eq!(client.round_trip(&["GET", "k1"]).await, bulk("v1"));
    assert_eq!(client.round_trip(&["GET", "k2"]).await, bulk("v2"));
}

#[tokio::test]
async fn watch_aborts_on_external_write() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut watcher = Client::connect(addr).await;
    let mut writer = Client::connect(addr).await;

    watcher.round_trip(&["SET", "k", "1"]).await;
    assert_eq!(watcher.round_trip(&["WATCH", "k"]).await, Frame::ok());

    // another connection slips in a write between WATCH and EXEC
    assert_eq!(writer.round_trip(&["SET", "k", "x"]).await, Frame::ok());

    assert_eq!(watcher.round_trip(&["MULTI"]).await, Frame::ok());
    assert_eq!(
        watcher.round_trip(&["INCR", "k"]).await,
        Frame::Simple("QUEUED".into())
    );
    assert_eq!(watcher.round_trip(&["EXEC"]).await, Frame::NullArray);

    // the queued INCR never ran
    assert_eq!(watcher.round_trip(&["GET", "k"]).await, bulk("x"));
}

#[tokio::test]
async fn own_write_after_watch_also_aborts() {
    // documented semantics: any change to a watched key aborts, even
    // one made by the watching connection itself
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    client.round_trip(&["SET", "k", "1"]).await;
    assert_eq!(client.round_trip(&["WATCH", "k"]).await, Frame::ok());
    assert_eq!(client.round_trip(&["SET", "k", "y"]).await, Frame::ok());
    assert_eq!(client.round_trip(&["MULTI"]).await, Frame::ok());
    client.round_trip(&["INCR", "k"]).await;
    assert_eq!(client.round_trip(&["EXEC"]).await, Frame::NullArray);
    assert_eq!(client.round_trip(&["GET", "k"]).await, bulk("y"));
}

#[tokio::test]
async fn unwatch_releases_watches() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;
    let mut writer = Client::connect(addr).await;

    client.round_trip(&["SET", "k", "1"]).await;
    client.round_trip(&["WATCH", "k"]).await;
    writer.round_trip(&["SET", "k", "2"]).await;
    assert_eq!(client.round_trip(&["UNWATCH"]).await, Frame::ok());

    client.round_trip(&["MULTI"]).await;
    client.round_trip(&["INCR", "k"]).await;
    assert_eq!(
        client.round_trip(&["EXEC"]).await,
        Frame::Array(vec![Frame::Integer(3)])
    );
}

#[tokio::test]
async fn queue_time_errors_poison_the_transaction() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    client.round_trip(&["MULTI"]).await;
    let reply = client.round_trip(&["NOSUCHCOMMAND", "x"]).await;
    assert!(matches!(reply, Frame::Error(ref m) if m.contains("unknown command")));

    // well-formed commands still queue, but EXEC refuses
    assert_eq!(
        client.round_trip(&["SET", "k", "v"]).await,
        Frame::Simple("QUEUED".into())
    );
    let reply = client.round_trip(&["EXEC"]).await;
    assert!(matches!(reply, Frame::Error(ref m) if m.starts_with("EXECABORT")), "{reply:?}");

    // nothing from the poisoned queue ran
    assert_eq!(client.round_trip(&["GET", "k"]).await, Frame::Null);
}

#[tokio::test]
async fn transaction_state_errors() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    let reply = client.round_trip(&["EXEC"]).await;
    assert_eq!(reply, Frame::Error("ERR EXEC without MULTI".into()));
    let reply = client.round_trip(&["DISCARD"]).await;
    assert_eq!(reply, Frame::Error("ERR DISCARD without MULTI".into()));

    client.round_trip(&["MULTI"]).await;
    let reply = client.round_trip(&["MULTI"]).await;
    assert_eq!(reply, Frame::Error("ERR MULTI calls can not be nested".into()));
    let reply = client.round_trip(&["WATCH", "k"]).await;
    assert_eq!(
        reply,
        Frame::Error("ERR WATCH inside MULTI is not allowed".into())
    );
    assert_eq!(client.round_trip(&["DISCARD"]).await, Frame::ok());
}

#[tokio::test]
async fn discard_flushes_the_queue() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    client.round_trip(&["MULTI"]).await;
    client.round_trip(&["SET", "never", "ran"]).await;
    assert_eq!(client.round_trip(&["DISCARD"]).await, Frame::ok());
    assert_eq!(client.round_trip(&["GET", "never"]).await, Frame::Null);
}

#[tokio::test]
async fn select_routes_to_distinct_databases() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    client.round_trip(&["SET", "k", "zero"]).await;
    assert_eq!(client.round_trip(&["SELECT", "1"]).await, Frame::ok());
    assert_eq!(client.round_trip(&["GET", "k"]).await, Frame::Null);
    client.round_trip(&["SET", "k", "one"]).await;

    assert_eq!(client.round_trip(&["SELECT", "0"]).await, Frame::ok());
    assert_eq!(client.round_trip(&["GET", "k"]).await, bulk("zero"));

    let reply = client.round_trip(&["SELECT", "99"]).await;
    assert_eq!(reply, Frame::Error("ERR DB index is out of range".into()));
}

#[tokio::test]
async fn wrongtype_and_arity_and_unknown_errors() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    client.round_trip(&["SET", "s", "v"]).await;
    let reply = client.round_trip(&["LPUSH", "s", "x"]).await;
    assert!(matches!(reply, Frame::Error(ref m) if m.starts_with("WRONGTYPE")), "{reply:?}");

    let reply = client.round_trip(&["GET"]).await;
    assert_eq!(
        reply,
        Frame::Error("ERR wrong number of arguments for 'get' command".into())
    );

    let reply = client.round_trip(&["BOGUS"]).await;
    assert_eq!(reply, Frame::Error("ERR unknown command 'BOGUS'".into()));

    // the connection survived all of it
    assert_eq!(client.round_trip(&["PING"]).await, Frame::Simple("PONG".into()));
}

#[tokio::test]
async fn expiry_over_the_wire() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    client.round_trip(&["SET", "temp", "v", "PX", "40"]).await;
    assert_eq!(client.round_trip(&["GET", "temp"]).await, bulk("v"));
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(client.round_trip(&["GET", "temp"]).await, Frame::Null);
    assert_eq!(client.round_trip(&["TTL", "temp"]).await, Frame::Integer(-2));
}

// ---------------------------------------------------------------------------
// pub/sub
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_delivers_and_counts() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut subscriber = Client::connect(addr).await;
    let mut publisher = Client::connect(addr).await;

    assert_eq!(
        subscriber.round_trip(&["SUBSCRIBE", "news"]).await,
        Frame::Array(vec![bulk("subscribe"), bulk("news"), Frame::Integer(1)])
    );

    assert_eq!(
        publisher.round_trip(&["PUBLISH", "news", "hello"]).await,
        Frame::Integer(1)
    );
    assert_eq!(
        subscriber.read_frame().await,
        Frame::Array(vec![bulk("message"), bulk("news"), bulk("hello")])
    );

    assert_eq!(
        publisher.round_trip(&["PUBLISH", "nobody", "x"]).await,
        Frame::Integer(0)
    );
}

#[tokio::test]
async fn pattern_subscriptions_match_globs() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut subscriber = Client::connect(addr).await;
    let mut publisher = Client::connect(addr).await;

    assert_eq!(
        subscriber.round_trip(&["PSUBSCRIBE", "news.*"]).await,
        Frame::Array(vec![bulk("psubscribe"), bulk("news.*"), Frame::Integer(1)])
    );

    assert_eq!(
        publisher.round_trip(&["PUBLISH", "news.tech", "m1"]).await,
        Frame::Integer(1)
    );
    assert_eq!(
        subscriber.read_frame().await,
        Frame::Array(vec![
            bulk("pmessage"),
            bulk("news.*"),
            bulk("news.tech"),
            bulk("m1"),
        ])
    );

    assert_eq!(
        publisher.round_trip(&["PUBLISH", "weather", "m2"]).await,
        Frame::Integer(0)
    );
}

#[tokio::test]
async fn direct_plus_pattern_counts_both() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut direct = Client::connect(addr).await;
    let mut pattern = Client::connect(addr).await;
    let mut publisher = Client::connect(addr).await;

    direct.round_trip(&["SUBSCRIBE", "news.tech"]).await;
    pattern.round_trip(&["PSUBSCRIBE", "news.*"]).await;

    assert_eq!(
        publisher.round_trip(&["PUBLISH", "news.tech", "m"]).await,
        Frame::Integer(2)
    );
}

#[tokio::test]
async fn subscriber_mode_restricts_commands() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    client.round_trip(&["SUBSCRIBE", "ch"]).await;

    let reply = client.round_trip(&["GET", "k"]).await;
    assert!(
        matches!(reply, Frame::Error(ref m) if m.contains("allowed in this context")),
        "{reply:?}"
    );

    // PING stays available
    assert_eq!(client.round_trip(&["PING"]).await, Frame::Simple("PONG".into()));

    // leaving subscriber mode restores the full surface
    assert_eq!(
        client.round_trip(&["UNSUBSCRIBE"]).await,
        Frame::Array(vec![bulk("unsubscribe"), bulk("ch"), Frame::Integer(0)])
    );
    client.round_trip(&["SET", "k", "v"]).await;
    assert_eq!(client.round_trip(&["GET", "k"]).await, bulk("v"));
}

#[tokio::test]
async fn disconnect_tears_down_subscriptions() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut publisher = Client::connect(addr).await;

    {
        let mut subscriber = Client::connect(addr).await;
        subscriber.round_trip(&["SUBSCRIBE", "gone"]).await;
        assert_eq!(
            publisher.round_trip(&["PUBLISH", "gone", "m"]).await,
            Frame::Integer(1)
        );
        // subscriber drops here
    }

    // give the server a moment to observe the close
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        publisher.round_trip(&["PUBLISH", "gone", "m"]).await,
        Frame::Integer(0)
    );
}

#[tokio::test]
async fn unsubscribe_without_args_clears_everything() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    client.round_trip(&["SUBSCRIBE", "a"]).await;
    client.round_trip(&["SUBSCRIBE", "b"]).await;

    client.send(&["UNSUBSCRIBE"]).await;
    let first = client.read_frame().await;
    let second = client.read_frame().await;
    for frame in [first, second] {
        let Frame::Array(items) = frame else {
            panic!("expected array confirmation");
        };
        assert_eq!(items[0], bulk("unsubscribe"));
        assert!(matches!(items[2], Frame::Integer(0 | 1)));
    }
}

// ---------------------------------------------------------------------------
// limits and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn maxclients_rejects_excess_connections() {
    let (addr, _dir) = spawn_server(|c| c.maxclients = 1).await;

    let mut first = Client::connect(addr).await;
    assert_eq!(first.round_trip(&["PING"]).await, Frame::Simple("PONG".into()));

    let mut second = Client::connect(addr).await;
    let reply = second.read_frame().await;
    assert_eq!(reply, Frame::Error("ERR max number of clients reached".into()));
}

#[tokio::test]
async fn protocol_error_closes_the_connection() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    client.send_raw(b"~what\r\n").await;
    let reply = client.read_frame().await;
    assert!(matches!(reply, Frame::Error(ref m) if m.contains("Protocol error")));

    // the server hangs up after a framing error
    let n = timeout(Duration::from_secs(5), client.stream.read_buf(&mut client.buf))
        .await
        .expect("timed out waiting for close")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn pipelined_commands_answer_in_order() {
    let (addr, _dir) = spawn_server(|_| {}).await;
    let mut client = Client::connect(addr).await;

    client
        .send_raw(
            b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
              *2\r\n$4\r\nINCR\r\n$1\r\na\r\n\
              *2\r\n$3\r\nGET\r\n$1\r\na\r\n",
        )
        .await;

    assert_eq!(client.read_frame().await, Frame::ok());
    assert_eq!(client.read_frame().await, Frame::Integer(2));
    assert_eq!(client.read_frame().await, bulk("2"));
}

#[tokio::test]
async fn state_survives_restart_via_save() {
    let dir = tempfile::TempDir::new().unwrap();

    let boot = |dir_path: std::path::PathBuf| async move {
        let mut config = Config::default();
        config.dir = dir_path;
        let ctx = server::build_context(config).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server::serve(listener, Arc::new(ctx)));
        addr
    };

    let addr = boot(dir.path().to_path_buf()).await;
    {
        let mut client = Client::connect(addr).await;
        client.round_trip(&["SET", "durable", "yes"]).await;
        client.round_trip(&["HSET", "h", "f", "v"]).await;
        assert_eq!(client.round_trip(&["SAVE"]).await, Frame::ok());
    }

    // a second server over the same data directory sees the state
    let addr = boot(dir.path().to_path_buf()).await;
    let mut client = Client::connect(addr).await;
    assert_eq!(client.round_trip(&["GET", "durable"]).await, bulk("yes"));
    assert_eq!(client.round_trip(&["HGET", "h", "f"]).await, bulk("v"));
}
