//! Opening connections.
//!
//! Resolve, connect, wrap with TLS, negotiate the version and say HELLO.
//! Everything runs under the caller's [`Deadline`].

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};

use crate::bolt::handshake::{
    choose_version, encode_varint, handshake_request, BoltVersion, HandshakeError,
    HandshakeResponse, Offering, VarintDecoder, HANDSHAKE_RESPONSE_SIZE,
};
use crate::driver::address::Address;
use crate::driver::config::ConnectionConfig;
use crate::driver::deadline::Deadline;
use crate::driver::error::{DriverError, DriverResult};

use super::connection::{BoltStream, Connection};

/// Upper bound on offerings accepted in a manifest.
const MAX_OFFERINGS: u64 = 256;

/// Open a ready-to-use connection to `address`.
pub async fn open(
    address: &Address,
    config: &ConnectionConfig,
    deadline: Deadline,
) -> DriverResult<Connection> {
    let resolved = match deadline.run(config.resolver.resolve(address)).await {
        Some(resolved) => resolved?,
        None => {
            return Err(DriverError::service_unavailable(format!(
                "Timed out resolving {}",
                address
            )))
        }
    };

    let (tcp, peer) = connect_any(address, &resolved, config, deadline).await?;

    let stream: Box<dyn BoltStream> = match &config.tls {
        Some(tls) => match deadline.run(tls.wrap(address, tcp)).await {
            Some(wrapped) => Box::new(wrapped?),
            None => {
                return Err(DriverError::service_unavailable(format!(
                    "Timed out establishing encrypted connection to {}",
                    address
                )))
            }
        },
        None => Box::new(tcp),
    };

    establish(stream, address.clone(), Some(peer), config, deadline).await
}

/// Handshake and HELLO over an already connected transport.
pub async fn establish(
    mut stream: Box<dyn BoltStream>,
    address: Address,
    server_address: Option<SocketAddr>,
    config: &ConnectionConfig,
    deadline: Deadline,
) -> DriverResult<Connection> {
    let version = handshake(&mut *stream, &address, deadline).await?;

    let mut connection = Connection::new(
        stream,
        address,
        server_address,
        version,
        config.max_connection_lifetime,
    );
    connection.set_deadline(deadline);
    if let Err(e) = connection.hello(config).await {
        connection.kill();
        return Err(e);
    }
    connection.set_deadline(Deadline::never());
    Ok(connection)
}

async fn connect_any(
    address: &Address,
    resolved: &[SocketAddr],
    config: &ConnectionConfig,
    deadline: Deadline,
) -> DriverResult<(TcpStream, SocketAddr)> {
    let mut errors: Vec<io::Error> = Vec::new();

    for endpoint in resolved {
        tracing::debug!("[#0000]  C: <OPEN> {}", endpoint);
        let attempt = Deadline::min(Deadline::after(config.connection_timeout), deadline);
        match attempt.run(connect_tcp(*endpoint, config.keep_alive)).await {
            Some(Ok(stream)) => {
                let local = stream
                    .local_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                tracing::debug!("[#0000]  C: <OPENED> {} -> {}", local, endpoint);
                return Ok((stream, *endpoint));
            }
            Some(Err(e)) => {
                tracing::debug!("[#0000]  C: <ERROR> {}: {}", endpoint, e);
                errors.push(e);
            }
            None => {
                tracing::debug!("[#0000]  C: <TIMEOUT> {}", endpoint);
                errors.push(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out connecting to {}", endpoint),
                ));
            }
        }
        if deadline.expired() {
            break;
        }
    }

    let listed = resolved
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let message = format!("Couldn't connect to {} (resolved to ({}))", address, listed);
    Err(match errors.into_iter().next() {
        Some(first) => DriverError::service_unavailable_from(message, first),
        None => DriverError::service_unavailable(message),
    })
}

async fn connect_tcp(endpoint: SocketAddr, keep_alive: bool) -> io::Result<TcpStream> {
    let socket = if endpoint.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(keep_alive)?;
    let stream = socket.connect(endpoint).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

// ============================================================================
// Handshake
// ============================================================================

/// Negotiate the protocol version.
pub async fn handshake<S>(stream: &mut S, address: &Address, deadline: Deadline) -> DriverResult<BoltVersion>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let request = handshake_request();
    tracing::debug!("[#0000]  C: <MAGIC> 0x{}", hex(&request[..4]));
    tracing::debug!(
        "[#0000]  C: <HANDSHAKE> 0x{} 0x{} 0x{} 0x{}",
        hex(&request[4..8]),
        hex(&request[8..12]),
        hex(&request[12..16]),
        hex(&request[16..20])
    );
    write_handshake(stream, &request, address, deadline).await?;

    let mut response = [0u8; HANDSHAKE_RESPONSE_SIZE];
    read_handshake(stream, &mut response, address, deadline).await?;
    tracing::debug!("[#0000]  S: <HANDSHAKE> 0x{}", hex(&response));

    match HandshakeResponse::parse(response) {
        Ok(HandshakeResponse::Version(version)) => Ok(version),
        Ok(HandshakeResponse::ManifestV1) => manifest_v1(stream, address, deadline).await,
        Err(HandshakeError::LooksLikeHttp) => Err(DriverError::service_unavailable(format!(
            "Cannot connect to Bolt service on {} (looks like HTTP)",
            address
        ))),
        Err(HandshakeError::UnsupportedManifest(_)) => Err(DriverError::protocol(
            "Unsupported Bolt handshake manifest version",
        )),
        Err(_) => Err(no_compatible_version(address)),
    }
}

async fn manifest_v1<S>(stream: &mut S, address: &Address, deadline: Deadline) -> DriverResult<BoltVersion>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let count = read_varint(stream, address, deadline).await?;
    if count > MAX_OFFERINGS {
        return Err(DriverError::protocol(format!(
            "Bolt handshake manifest from {} lists {} offerings",
            address, count
        )));
    }

    let mut offerings = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut bytes = [0u8; 4];
        read_handshake(stream, &mut bytes, address, deadline).await?;
        offerings.push(Offering::from_bytes(bytes));
    }
    let capabilities = read_varint(stream, address, deadline).await?;
    tracing::debug!(
        "[#0000]  S: <HANDSHAKE> {:?} capabilities=0x{:X}",
        offerings,
        capabilities
    );

    let Some(version) = choose_version(&offerings) else {
        write_handshake(stream, &[0, 0, 0, 0, 0], address, deadline).await?;
        return Err(no_compatible_version(address));
    };

    let mut reply = version.to_bytes().to_vec();
    reply.extend(encode_varint(0));
    tracing::debug!("[#0000]  C: <HANDSHAKE> 0x{}", hex(&reply));
    write_handshake(stream, &reply, address, deadline).await?;
    Ok(version)
}

fn no_compatible_version(address: &Address) -> DriverError {
    let supported = BoltVersion::ALL
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    DriverError::protocol(format!(
        "The server at {} does not support any of the driver's Bolt protocol versions ({})",
        address, supported
    ))
}

async fn write_handshake<S>(stream: &mut S, data: &[u8], address: &Address, deadline: Deadline) -> DriverResult<()>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let written = deadline
        .run(async {
            match stream.write_all(data).await {
                Ok(()) => stream.flush().await,
                Err(e) => Err(e),
            }
        })
        .await;
    match written {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(DriverError::service_unavailable_from(
            format!("Failed to write handshake to {}", address),
            e,
        )),
        None => Err(handshake_timeout(address)),
    }
}

async fn read_handshake<S>(stream: &mut S, buf: &mut [u8], address: &Address, deadline: Deadline) -> DriverResult<()>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let read = match deadline.run(stream.read(&mut buf[filled..])).await {
            Some(Ok(n)) => n,
            Some(Err(e)) => {
                return Err(DriverError::service_unavailable_from(
                    format!("Failed to read handshake response from {}", address),
                    e,
                ))
            }
            None => return Err(handshake_timeout(address)),
        };
        if read == 0 {
            if filled == 0 {
                return Err(DriverError::service_unavailable(format!(
                    "Connection to {} closed with incomplete handshake response",
                    address
                )));
            }
            return Err(DriverError::protocol(format!(
                "Expected {} bytes of Bolt handshake from {}, received {:02X?} instead; check for incorrect port number",
                buf.len(),
                address,
                &buf[..filled]
            )));
        }
        filled += read;
    }
    Ok(())
}

async fn read_varint<S>(stream: &mut S, address: &Address, deadline: Deadline) -> DriverResult<u64>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut decoder = VarintDecoder::default();
    loop {
        let mut byte = [0u8; 1];
        read_handshake(stream, &mut byte, address, deadline).await?;
        if let Some(value) = decoder
            .push(byte[0])
            .map_err(|e| DriverError::protocol(e.to_string()))?
        {
            return Ok(value);
        }
    }
}

fn handshake_timeout(address: &Address) -> DriverError {
    DriverError::service_unavailable_from(
        format!("Timed out during handshake with {}", address),
        io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"),
    )
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::handshake::BOLT_MAGIC;
    use crate::bolt::message::tag;
    use crate::driver::bolt::stub::StubServer;
    use crate::driver::bolt::ServerState;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn address() -> Address {
        Address::new("localhost", 7687)
    }

    #[tokio::test]
    async fn test_handshake_direct_version() {
        let (mut client, mut server) = StubServer::pair();
        let server_task =
            tokio::spawn(async move { server.handshake_raw(&[0x00, 0x00, 0x04, 0x04]).await });

        let version = handshake(&mut client, &address(), Deadline::never()).await.unwrap();
        assert_eq!(version, BoltVersion::V4_4);

        let request = server_task.await.unwrap();
        assert_eq!(&request[..4], &BOLT_MAGIC);
        assert_eq!(&request[4..8], &[0x00, 0x00, 0x01, 0xFF]);
    }

    #[tokio::test]
    async fn test_handshake_manifest_v1() {
        let (mut client, mut server) = StubServer::pair();
        let server_task = tokio::spawn(async move {
            let mut reply = vec![0x00, 0x00, 0x01, 0xFF];
            reply.push(2);
            reply.extend([0x00, 0x02, 0x02, 0x05]);
            reply.extend([0x00, 0x00, 0x08, 0x05]);
            reply.push(0x00);
            server.handshake_raw(&reply).await;

            server.read_raw(5).await
        });

        let version = handshake(&mut client, &address(), Deadline::never()).await.unwrap();
        assert_eq!(version, BoltVersion::V5_2);
        assert_eq!(server_task.await.unwrap(), vec![0x00, 0x00, 0x02, 0x05, 0x00]);
    }

    #[tokio::test]
    async fn test_handshake_http() {
        let (mut client, mut server) = StubServer::pair();
        tokio::spawn(async move { server.handshake_raw(b"HTTP/1.1 400").await });

        let err = handshake(&mut client, &address(), Deadline::never())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ServiceUnavailable { .. }));
        assert!(err.to_string().contains("looks like HTTP"));
    }

    #[tokio::test]
    async fn test_handshake_no_version() {
        let (mut client, mut server) = StubServer::pair();
        tokio::spawn(async move { server.handshake_raw(&[0, 0, 0, 0]).await });

        let err = handshake(&mut client, &address(), Deadline::never())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
        assert!(err.to_string().contains("5.2"));
    }

    #[tokio::test]
    async fn test_handshake_closed_without_reply() {
        let (mut client, mut server) = StubServer::pair();
        tokio::spawn(async move { server.handshake_raw(&[]).await });

        let err = handshake(&mut client, &address(), Deadline::never())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ServiceUnavailable { .. }));
        assert!(err
            .to_string()
            .contains("closed with incomplete handshake response"));
    }

    #[tokio::test]
    async fn test_handshake_short_reply() {
        let (mut client, mut server) = StubServer::pair();
        tokio::spawn(async move { server.handshake_raw(&[0x00, 0x00]).await });

        let err = handshake(&mut client, &address(), Deadline::never())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let (mut client, mut server) = StubServer::pair();
        let _server_task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            server.handshake_raw(&[]).await
        });

        let err = handshake(&mut client, &address(), Deadline::after(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_establish_runs_hello() {
        let (client, mut server) = StubServer::pair();
        let server_task = tokio::spawn(async move {
            server.handshake(BoltVersion::V5_0).await;
            server.accept_hello().await;
            server.expect(tag::RESET).await;
            server.success(Default::default()).await;
            server
        });

        let mut connection = establish(
            Box::new(client),
            address(),
            None,
            &ConnectionConfig::default(),
            Deadline::never(),
        )
        .await
        .unwrap();
        assert_eq!(connection.version(), BoltVersion::V5_0);
        assert_eq!(connection.server_state(), ServerState::Ready);
        assert_eq!(connection.server_agent(), Some("Neo4j/5.7.0"));

        connection.reset().await.unwrap();
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = open(
            &Address::new("127.0.0.1", port),
            &ConnectionConfig::default(),
            Deadline::after(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DriverError::ServiceUnavailable { .. }));
        assert!(err.to_string().contains("Couldn't connect to 127.0.0.1"));
    }

    #[tokio::test]
    async fn test_open_http_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 20];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(b"HTTP/1.1 400 Bad Request\r\n").await.unwrap();
        });

        let err = open(
            &Address::new("127.0.0.1", port),
            &ConnectionConfig::default(),
            Deadline::after(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("looks like HTTP"));
    }
}
