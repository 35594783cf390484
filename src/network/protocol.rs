//! Wire formats: the discovery line protocol and the length-prefixed JSON
//! framing used by the RPC surface.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::{NetworkError, NetworkResult};

/// Topic of the discovery pub/sub channel.
pub const DISCOVERY_TOPIC: &str = "NODE";

/// A message on the discovery channel, `NODE HI <name> <address>` on the
/// wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMessage {
    Hi { node: String, address: String },
}

impl DiscoveryMessage {
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Hi { node, address } => {
                format!("{} HI {} {}", DISCOVERY_TOPIC, node, address)
            }
        }
    }

    /// Parses one channel line; unknown topics and malformed lines are
    /// ignored by returning `None`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        match (parts.next()?, parts.next()?) {
            (DISCOVERY_TOPIC, "HI") => {
                let node = parts.next()?.to_string();
                let address = parts.next()?.to_string();
                Some(Self::Hi { node, address })
            }
            _ => None,
        }
    }
}

/// Writes one frame: 4-byte big-endian length prefix, then the payload.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    stream: &mut W,
    payload: &[u8],
    max_message_size: usize,
) -> NetworkResult<()> {
    if payload.len() > max_message_size {
        return Err(NetworkError::Message(format!(
            "frame of {} bytes exceeds the {} byte limit",
            payload.len(),
            max_message_size
        )));
    }
    stream.write_u32(payload.len() as u32).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame, rejecting oversized payloads before
/// allocating for them.
pub async fn read_frame<R: AsyncRead + Unpin>(
    stream: &mut R,
    max_message_size: usize,
) -> NetworkResult<Vec<u8>> {
    let len = stream.read_u32().await? as usize;
    if len > max_message_size {
        return Err(NetworkError::Message(format!(
            "frame of {} bytes exceeds the {} byte limit",
            len, max_message_size
        )));
    }
    let mut buffer = vec![0u8; len];
    stream.read_exact(&mut buffer).await?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_round_trip() {
        let message = DiscoveryMessage::Hi {
            node: "node-a".to_string(),
            address: "127.0.0.1:5558".to_string(),
        };
        assert_eq!(message.encode(), "NODE HI node-a 127.0.0.1:5558");
        assert_eq!(DiscoveryMessage::parse(&message.encode()), Some(message));
    }

    #[test]
    fn malformed_lines_are_ignored() {
        assert_eq!(DiscoveryMessage::parse(""), None);
        assert_eq!(DiscoveryMessage::parse("NODE BYE x y"), None);
        assert_eq!(DiscoveryMessage::parse("OTHER HI x y"), None);
        assert_eq!(DiscoveryMessage::parse("NODE HI only-name"), None);
    }
}
