// Peer connection management

use crate::network::{MAX_FRAME_SIZE, Message, MessageError, PeerId};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("runtime has stopped")]
    Stopped,
}

/// Read one length-prefixed frame body
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, NetworkError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(MessageError::FrameTooLarge(len).into());
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write an already framed message and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &[u8],
) -> Result<(), NetworkError> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Peer connection
pub struct Peer {
    pub id: PeerId,
    pub addr: SocketAddr,
    stream: TcpStream,
}

impl Peer {
    /// Create a new peer from a TCP stream
    pub fn new(id: PeerId, stream: TcpStream, addr: SocketAddr) -> Self {
        Self { id, addr, stream }
    }

    /// Connect to a peer
    pub async fn connect(id: PeerId, address: &str) -> Result<Self, NetworkError> {
        let stream = TcpStream::connect(address).await?;
        let addr = stream.peer_addr()?;
        Ok(Self::new(id, stream, addr))
    }

    /// Send a message to the peer
    pub async fn send_message(&mut self, message: &Message) -> Result<(), NetworkError> {
        write_frame(&mut self.stream, &message.to_frame()?).await
    }

    /// Receive a message from the peer
    pub async fn receive_message(&mut self) -> Result<Message, NetworkError> {
        let body = read_frame(&mut self.stream).await?;
        Ok(Message::from_bytes(&body)?)
    }

    /// Hand the connection to background tasks.
    ///
    /// `on_open` receives the frame sender before anything is read: frames
    /// pushed into it are written in order, and dropping it closes our side.
    /// Received bodies go to `on_frame` (returning false stops reading), and
    /// `on_close` runs once the connection ends.
    pub fn spawn<O, F, C>(self, on_open: O, on_frame: F, on_close: C)
    where
        O: FnOnce(PeerId, mpsc::UnboundedSender<Vec<u8>>),
        F: Fn(PeerId, Vec<u8>) -> bool + Send + 'static,
        C: FnOnce(PeerId) + Send + 'static,
    {
        let (reader, writer) = self.stream.into_split();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(self.id, writer, frames_rx));
        on_open(self.id, frames_tx);
        tokio::spawn(read_loop(self.id, reader, on_frame, on_close));
    }
}

async fn write_loop(
    id: PeerId,
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            log::debug!("write to {} failed: {}", id, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<F, C>(id: PeerId, mut reader: OwnedReadHalf, on_frame: F, on_close: C)
where
    F: Fn(PeerId, Vec<u8>) -> bool,
    C: FnOnce(PeerId),
{
    loop {
        match read_frame(&mut reader).await {
            Ok(body) => {
                if !on_frame(id, body) {
                    break;
                }
            }
            Err(NetworkError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                log::debug!("read from {} failed: {}", id, e);
                break;
            }
        }
    }
    on_close(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::VersionMessage;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_frame_round_trip_over_pipe() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let frame = Message::GetAddr.to_frame().unwrap();
        write_frame(&mut client, &frame).await.unwrap();

        let body = read_frame(&mut server).await.unwrap();
        assert_eq!(Message::from_bytes(&body).unwrap(), Message::GetAddr);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes())
            .await
            .unwrap();

        assert!(matches!(
            read_frame(&mut server).await,
            Err(NetworkError::Message(MessageError::FrameTooLarge(_)))
        ));
    }

    #[tokio::test]
    async fn test_peer_messages_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, remote) = listener.accept().await.unwrap();
            let mut peer = Peer::new(PeerId(2), stream, remote);
            let message = peer.receive_message().await.unwrap();
            peer.send_message(&Message::Verack).await.unwrap();
            message
        });

        let mut client = Peer::connect(PeerId(1), &addr.to_string()).await.unwrap();
        let version = Message::Version(VersionMessage {
            address: Some("x:1".into()),
        });
        client.send_message(&version).await.unwrap();
        assert_eq!(client.receive_message().await.unwrap(), Message::Verack);
        assert_eq!(server.await.unwrap(), version);
    }
}
