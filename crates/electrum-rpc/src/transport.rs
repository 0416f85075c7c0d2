use std::io;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ElectrumError;

/// Wire transport for the Electrum endpoint. `ssl` is accepted as an alias
/// for `tls`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Tls,
    Ssl,
    Ws,
}

/// Reading side of a connection, yielding one JSON frame per line (or per
/// WebSocket text message).
pub(crate) enum LineStream {
    Tcp(Lines<BufReader<ReadHalf<TcpStream>>>),
    Tls(Lines<BufReader<ReadHalf<TlsStream<TcpStream>>>>),
    Ws(SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>),
}

impl LineStream {
    /// Next frame, `None` on orderly end of stream.
    pub(crate) async fn next_line(&mut self) -> io::Result<Option<String>> {
        match self {
            LineStream::Tcp(lines) => lines.next_line().await,
            LineStream::Tls(lines) => lines.next_line().await,
            LineStream::Ws(stream) => loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                    Some(Ok(Message::Binary(data))) => {
                        return String::from_utf8(data)
                            .map(Some)
                            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
                    }
                    // Control frames are answered by tungstenite itself.
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => return Ok(None),
                    Some(Err(e)) => return Err(io::Error::new(io::ErrorKind::Other, e)),
                }
            },
        }
    }
}

/// Writing side of a connection.
pub(crate) enum LineSink {
    Tcp(WriteHalf<TcpStream>),
    Tls(WriteHalf<TlsStream<TcpStream>>),
    Ws(SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>),
}

impl LineSink {
    pub(crate) async fn send_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            LineSink::Tcp(writer) => {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await
            }
            LineSink::Tls(writer) => {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await
            }
            LineSink::Ws(sink) => sink
                .send(Message::Text(line.to_owned()))
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
        }
    }
}

/// Open a socket to `host:port` over the requested transport and split it
/// into line-oriented halves.
pub(crate) async fn open(
    host: &str,
    port: u16,
    protocol: Protocol,
) -> Result<(LineStream, LineSink), ElectrumError> {
    match protocol {
        Protocol::Tcp => {
            let stream = TcpStream::connect((host, port))
                .await
                .map_err(|e| ElectrumError::Connection(e.to_string()))?;
            let (reader, writer) = tokio::io::split(stream);
            Ok((
                LineStream::Tcp(BufReader::new(reader).lines()),
                LineSink::Tcp(writer),
            ))
        }
        Protocol::Tls | Protocol::Ssl => {
            let tcp = TcpStream::connect((host, port))
                .await
                .map_err(|e| ElectrumError::Connection(e.to_string()))?;
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            let connector = TlsConnector::from(Arc::new(config));
            let name = ServerName::try_from(host.to_owned())
                .map_err(|e| ElectrumError::Connection(e.to_string()))?;
            let stream = connector
                .connect(name, tcp)
                .await
                .map_err(|e| ElectrumError::Connection(e.to_string()))?;
            let (reader, writer) = tokio::io::split(stream);
            Ok((
                LineStream::Tls(BufReader::new(reader).lines()),
                LineSink::Tls(writer),
            ))
        }
        Protocol::Ws => {
            let url = format!("ws://{host}:{port}");
            let (stream, _response) = tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| ElectrumError::Connection(e.to_string()))?;
            let (sink, stream) = stream.split();
            Ok((LineStream::Ws(stream), LineSink::Ws(sink)))
        }
    }
}
