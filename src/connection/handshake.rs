//! Transport setup and the HTTP/1.1 upgrade handshake.
use std::{future::Future, io, sync::Arc, time::Duration};

use base64::prelude::*;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::{body::Incoming, header, upgrade::Upgraded, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use sha1::{Digest, Sha1};
use tokio::net::TcpStream;
use tokio_rustls::{
    rustls::{self, pki_types::ServerName},
    TlsConnector,
};
use tokio_util::codec::Framed;
use url::{Host, Url};

use crate::{codec::Codec, stream::MaybeTlsStream, Options, Result, WebSocketError};

/// Framed socket of an open connection.
pub(crate) type WsStream = Framed<TokioIo<Upgraded>, Codec>;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Everything needed to (re)open a connection.
#[derive(Clone)]
pub(crate) struct Target {
    pub url: Url,
    pub options: Options,
    pub connector: Option<TlsConnector>,
}

impl Target {
    /// Opens the transport and performs the upgrade, each bounded by the connect timeout.
    pub async fn establish(&self, on_handshake: impl FnOnce()) -> Result<WsStream> {
        let timeout = self.options.socket_connect_timeout();

        let io = with_timeout(timeout, open_transport(self), WebSocketError::ConnectTimeout).await?;
        on_handshake();
        with_timeout(
            timeout,
            client_handshake(&self.url, io, self.options),
            WebSocketError::HandshakeTimeout,
        )
        .await
    }
}

async fn with_timeout<T>(
    duration: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
    elapsed: WebSocketError,
) -> Result<T> {
    match duration {
        Some(duration) => tokio::time::timeout(duration, fut)
            .await
            .map_err(|_| elapsed)?,
        None => fut.await,
    }
}

/// Checks that the URL names a WebSocket endpoint this client can reach.
pub(crate) fn check_url(url: &Url) -> Result<()> {
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(WebSocketError::InvalidHttpScheme);
    }
    if url.host().is_none() {
        return Err(WebSocketError::MissingHost);
    }
    Ok(())
}

fn host_name(url: &Url) -> Result<String> {
    match url.host() {
        Some(Host::Domain(domain)) => Ok(domain.to_string()),
        Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
        None => Err(WebSocketError::MissingHost),
    }
}

async fn open_transport(target: &Target) -> Result<MaybeTlsStream> {
    let url = &target.url;
    let host = host_name(url)?;
    let port = url
        .port_or_known_default()
        .ok_or(WebSocketError::InvalidHttpScheme)?;

    let tcp_stream = TcpStream::connect((host.as_str(), port)).await?;
    if let Err(_err) = tcp_stream.set_nodelay(target.options.tcp_no_delay()) {
        #[cfg(feature = "logging")]
        log::warn!("set_nodelay: {_err}");
    }

    #[cfg(feature = "logging")]
    log::debug!("tcp connected to {host}:{port}");

    match url.scheme() {
        "ws" => Ok(MaybeTlsStream::Plain(tcp_stream)),
        "wss" => {
            let connector = match target.connector.clone() {
                Some(connector) => connector,
                None => tls_connector()?,
            };
            let domain = ServerName::try_from(host)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid dnsname"))?;

            let stream = connector.connect(domain, tcp_stream).await?;
            Ok(MaybeTlsStream::Tls(Box::new(stream)))
        }
        _ => Err(WebSocketError::InvalidHttpScheme),
    }
}

async fn client_handshake(url: &Url, io: MaybeTlsStream, options: Options) -> Result<WsStream> {
    let key = generate_key();
    let request = upgrade_request(url, &key)?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;
    tokio::spawn(async move {
        if let Err(_err) = conn.with_upgrades().await {
            #[cfg(feature = "logging")]
            log::error!("upgrading connection: {:?}", _err);
        }
    });

    let mut response = sender.send_request(request).await?;
    verify(&response, &key)?;

    let upgraded = hyper::upgrade::on(&mut response).await?;

    #[cfg(feature = "logging")]
    log::debug!("handshake with {url} complete");

    Ok(Framed::new(
        TokioIo::new(upgraded),
        Codec::new(options.max_frame_payload_size()),
    ))
}

fn upgrade_request(url: &Url, key: &str) -> Result<Request<Empty<Bytes>>> {
    let host = match url.host() {
        Some(host) => host.to_string(),
        None => return Err(WebSocketError::MissingHost),
    };
    let host_header = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    };

    let request = Request::builder()
        .method("GET")
        .uri(&url[url::Position::BeforePath..])
        .header(header::HOST, host_header)
        .header(header::UPGRADE, "websocket")
        .header(header::CONNECTION, "Upgrade")
        .header(header::SEC_WEBSOCKET_KEY, key)
        .header(header::SEC_WEBSOCKET_VERSION, "13")
        .body(Empty::<Bytes>::new())?;

    Ok(request)
}

fn verify(response: &Response<Incoming>, key: &str) -> Result<()> {
    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(WebSocketError::InvalidStatusCode(response.status().as_u16()));
    }

    let headers = response.headers();

    if !headers
        .get(header::UPGRADE)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
    {
        return Err(WebSocketError::InvalidUpgradeHeader);
    }

    if !headers
        .get(header::CONNECTION)
        .and_then(|h| h.to_str().ok())
        .map(|h| {
            h.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        })
        .unwrap_or(false)
    {
        return Err(WebSocketError::InvalidConnectionHeader);
    }

    let expected = sec_websocket_accept(key);
    if headers
        .get(header::SEC_WEBSOCKET_ACCEPT)
        .map(|h| h.as_bytes() != expected.as_bytes())
        .unwrap_or(true)
    {
        return Err(WebSocketError::InvalidAcceptKey);
    }

    Ok(())
}

/// The `Sec-WebSocket-Accept` value a server must answer `key` with.
pub(crate) fn sec_websocket_accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

fn generate_key() -> String {
    let input: [u8; 16] = rand::random();
    BASE64_STANDARD.encode(input)
}

/// Creates a TLS connector trusting the webpki root certificates.
fn tls_connector() -> Result<TlsConnector> {
    let mut root_cert_store = rustls::RootCertStore::empty();
    root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()));

    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(io::Error::other)?
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();
    config.alpn_protocols = vec!["http/1.1".into()];

    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_key_rfc_example() {
        // RFC 6455 section 1.3
        assert_eq!(
            sec_websocket_accept("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_default_tls_connector() {
        assert!(tls_connector().is_ok());
    }

    #[test]
    fn test_generated_keys() {
        let key = generate_key();
        assert_eq!(BASE64_STANDARD.decode(&key).unwrap().len(), 16);
        assert_ne!(key, generate_key());
    }

    #[test]
    fn test_check_url() {
        assert!(check_url(&"ws://localhost:9000".parse().unwrap()).is_ok());
        assert!(check_url(&"wss://example.com/chat?room=1".parse().unwrap()).is_ok());
        assert!(matches!(
            check_url(&"http://example.com".parse().unwrap()),
            Err(WebSocketError::InvalidHttpScheme)
        ));
        assert!(matches!(
            check_url(&"file:///tmp/socket".parse().unwrap()),
            Err(WebSocketError::InvalidHttpScheme)
        ));
    }

    #[test]
    fn test_upgrade_request() {
        let url: Url = "ws://127.0.0.1:9000/chat?room=1".parse().unwrap();
        let request = upgrade_request(&url, "dGhlIHNhbXBsZSBub25jZQ==").unwrap();

        assert_eq!(request.uri(), "/chat?room=1");
        assert_eq!(request.headers()[header::HOST], "127.0.0.1:9000");
        assert_eq!(request.headers()[header::UPGRADE], "websocket");
        assert_eq!(request.headers()[header::SEC_WEBSOCKET_VERSION], "13");
        assert_eq!(
            request.headers()[header::SEC_WEBSOCKET_KEY],
            "dGhlIHNhbXBsZSBub25jZQ=="
        );
    }

    #[test]
    fn test_default_port_omitted_from_host() {
        let url: Url = "wss://example.com".parse().unwrap();
        let request = upgrade_request(&url, "key").unwrap();
        assert_eq!(request.headers()[header::HOST], "example.com");
        assert_eq!(request.uri(), "/");
    }
}
