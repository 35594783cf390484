use std::net::SocketAddr;

use log::{debug, info};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use super::error::NetworkResult;
use super::protocol::DiscoveryMessage;

/// Broker-side pub/sub channel.
///
/// Peers connect, publish `HI` announcements as lines and stay subscribed;
/// every announcement is rebroadcast to all connected subscribers, so any
/// node on the channel can observe mesh membership. The broker itself
/// consumes announcements through [`DiscoveryServer::subscribe`].
pub struct DiscoveryServer {
    listener: TcpListener,
    announcements: broadcast::Sender<DiscoveryMessage>,
    lines: broadcast::Sender<String>,
}

impl DiscoveryServer {
    pub async fn bind(address: &str) -> NetworkResult<Self> {
        let listener = TcpListener::bind(address).await?;
        let (announcements, _) = broadcast::channel(64);
        let (lines, _) = broadcast::channel(64);
        Ok(Self {
            listener,
            announcements,
            lines,
        })
    }

    pub fn local_addr(&self) -> NetworkResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Announcements parsed off the channel, in arrival order.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryMessage> {
        self.announcements.subscribe()
    }

    /// Accept loop; runs until the listener fails.
    pub async fn run(self) -> NetworkResult<()> {
        info!(
            "discovery channel listening on {}",
            self.listener.local_addr()?
        );
        loop {
            let (socket, peer) = self.listener.accept().await?;
            debug!("discovery subscriber connected: {}", peer);
            let announcements = self.announcements.clone();
            let lines = self.lines.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_subscriber(socket, announcements, lines).await {
                    debug!("discovery subscriber {} dropped: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_subscriber(
    socket: tokio::net::TcpStream,
    announcements: broadcast::Sender<DiscoveryMessage>,
    lines: broadcast::Sender<String>,
) -> NetworkResult<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader).lines();
    let mut rebroadcast = lines.subscribe();
    loop {
        tokio::select! {
            line = reader.next_line() => {
                match line? {
                    Some(line) => {
                        if let Some(message) = DiscoveryMessage::parse(&line) {
                            let _ = announcements.send(message);
                            let _ = lines.send(line);
                        } else {
                            debug!("ignoring unrecognized discovery line: {}", line);
                        }
                    }
                    None => return Ok(()),
                }
            }
            line = rebroadcast.recv() => {
                if let Ok(line) = line {
                    writer.write_all(line.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                }
            }
        }
    }
}
