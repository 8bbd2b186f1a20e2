//! Scripted in-memory Bolt server for tests.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::codec::{Decoder, Encoder};

use crate::bolt::codec::BoltCodec;
use crate::bolt::handshake::{BoltVersion, HANDSHAKE_SIZE};
use crate::bolt::message::tag;
use crate::bolt::packstream::{PackStreamMap, PackStreamStructure, PackStreamValue};

/// Route driver logs to the test output. Honours `RUST_LOG`.
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a metadata map.
pub(crate) fn meta(entries: &[(&str, PackStreamValue)]) -> PackStreamMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Server end of an in-memory connection.
pub(crate) struct StubServer {
    stream: DuplexStream,
    codec: BoltCodec,
    buffer: BytesMut,
}

impl StubServer {
    /// Client stream and the server driving it.
    pub(crate) fn pair() -> (DuplexStream, StubServer) {
        init_tracing();
        let (client, server) = tokio::io::duplex(64 * 1024);
        (
            client,
            StubServer {
                stream: server,
                codec: BoltCodec::new(),
                buffer: BytesMut::new(),
            },
        )
    }

    /// Read the client handshake and reply with `reply`.
    pub(crate) async fn handshake_raw(&mut self, reply: &[u8]) -> [u8; HANDSHAKE_SIZE] {
        let mut request = [0u8; HANDSHAKE_SIZE];
        self.stream.read_exact(&mut request).await.unwrap();
        self.send_raw(reply).await;
        request
    }

    /// Agree on `version`.
    pub(crate) async fn handshake(&mut self, version: BoltVersion) {
        self.handshake_raw(&version.to_bytes()).await;
    }

    /// Next client message, or `None` once the client hung up.
    pub(crate) async fn recv(&mut self) -> Option<PackStreamStructure> {
        loop {
            if let Some(value) = self.codec.decode(&mut self.buffer).unwrap() {
                match value {
                    PackStreamValue::Structure(s) => return Some(s),
                    other => panic!("client sent a non-structure message: {}", other),
                }
            }
            match self.stream.read_buf(&mut self.buffer).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    /// Next client message, which must carry `expected`.
    pub(crate) async fn expect(&mut self, expected: u8) -> PackStreamStructure {
        let message = self.recv().await.expect("client hung up");
        assert_eq!(
            message.tag,
            expected,
            "expected {:?}, got {:?}",
            tag::name(expected),
            tag::name(message.tag)
        );
        message
    }

    pub(crate) async fn read_raw(&mut self, n: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; n];
        self.stream.read_exact(&mut bytes).await.unwrap();
        bytes
    }

    pub(crate) async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub(crate) async fn send(&mut self, tag: u8, fields: Vec<PackStreamValue>) {
        let mut out = BytesMut::new();
        self.codec
            .encode(
                PackStreamValue::Structure(PackStreamStructure::new(tag, fields)),
                &mut out,
            )
            .unwrap();
        self.send_raw(&out).await;
    }

    pub(crate) async fn success(&mut self, metadata: PackStreamMap) {
        self.send(tag::SUCCESS, vec![PackStreamValue::Map(metadata)])
            .await;
    }

    pub(crate) async fn record(&mut self, values: Vec<PackStreamValue>) {
        self.send(tag::RECORD, vec![PackStreamValue::List(values)])
            .await;
    }

    pub(crate) async fn failure(&mut self, code: &str, message: &str) {
        let metadata = meta(&[("code", code.into()), ("message", message.into())]);
        self.send(tag::FAILURE, vec![PackStreamValue::Map(metadata)])
            .await;
    }

    pub(crate) async fn ignored(&mut self) {
        self.send(tag::IGNORED, vec![]).await;
    }

    /// Answer HELLO (and LOGON) with a plain SUCCESS.
    pub(crate) async fn accept_hello(&mut self) {
        self.expect(tag::HELLO).await;
        self.success(meta(&[
            ("server", "Neo4j/5.7.0".into()),
            ("connection_id", "bolt-1".into()),
        ]))
        .await;
    }

    /// Handshake, HELLO, then answer everything with SUCCESS until GOODBYE
    /// or hang-up.
    pub(crate) async fn serve(mut self, version: BoltVersion) {
        self.handshake(version).await;
        while let Some(message) = self.recv().await {
            if message.tag == tag::GOODBYE {
                return;
            }
            self.success(PackStreamMap::new()).await;
        }
    }
}
