//! Managed TCP connections.
//!
//! A [`Connection`] owns one socket, split behind two background
//! tasks: a writer draining an mpsc channel into the framed sink and
//! a reader pumping decoded frames out. A codec error is a protocol
//! error — the reader logs it and stops, which surfaces to the owner
//! as an end-of-stream on [`Connection::recv`].

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::error::VpsError;

/// A framed TCP connection decoding `I` and encoding `O`.
#[derive(Debug)]
pub struct Connection<I, O> {
    tx: mpsc::Sender<O>,
    rx: mpsc::Receiver<I>,
}

impl<I, O> Connection<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Wrap an established stream with the given codec.
    pub fn new<C>(stream: TcpStream, codec: C) -> Self
    where
        C: Decoder<Item = I, Error = VpsError> + Encoder<O, Error = VpsError> + Send + 'static,
    {
        let (mut net_writer, mut net_reader) = Framed::new(stream, codec).split();

        // Owner → network.
        let (user_tx, mut network_rx) = mpsc::channel::<O>(100);
        // Network → owner.
        let (network_tx, user_rx) = mpsc::channel::<I>(100);

        tokio::spawn(async move {
            while let Some(item) = network_rx.recv().await {
                if let Err(e) = net_writer.send(item).await {
                    tracing::warn!(error = %e, "network write error");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(item) => {
                        if network_tx.send(item).await.is_err() {
                            // Owner dropped its handle; stop reading.
                            break;
                        }
                    }
                    Err(e) => {
                        // Protocol error: the stream is desynchronized
                        // and the connection must die with it.
                        tracing::warn!(error = %e, "network read error, closing");
                        break;
                    }
                }
            }
        });

        Self {
            tx: user_tx,
            rx: user_rx,
        }
    }

    /// Connect to `addr` and wrap the stream.
    pub async fn connect<C>(addr: &str, codec: C) -> Result<Self, VpsError>
    where
        C: Decoder<Item = I, Error = VpsError> + Encoder<O, Error = VpsError> + Send + 'static,
    {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, codec))
    }

    /// Queue one item for transmission.
    pub async fn send(&self, item: O) -> Result<(), VpsError> {
        self.tx.send(item).await.map_err(|_| VpsError::ChannelClosed)
    }

    /// Receive the next decoded item; `None` once the socket closed
    /// or desynchronized.
    pub async fn recv(&mut self) -> Option<I> {
        self.rx.recv().await
    }

    /// A cloneable sender for the write side.
    pub fn sender(&self) -> mpsc::Sender<O> {
        self.tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use crate::command;
    use crate::frame::Frame;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn frames_cross_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let client = tokio::spawn(async move {
            Connection::<Frame, Frame>::connect(&addr, FrameCodec::default())
                .await
                .unwrap()
        });
        let (stream, _) = listener.accept().await.unwrap();
        let mut server: Connection<Frame, Frame> = Connection::new(stream, FrameCodec::default());
        let client = client.await.unwrap();

        let frame = Frame::new(command::SCREEN_CAPTURE, 5, vec![1, 2, 3]);
        client.send(frame.clone()).await.unwrap();

        let got = server.recv().await.unwrap();
        assert_eq!(got, frame);
    }

    #[tokio::test]
    async fn peer_drop_surfaces_as_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let client = tokio::spawn(async move {
            Connection::<Frame, Frame>::connect(&addr, FrameCodec::default())
                .await
                .unwrap()
        });
        let (stream, _) = listener.accept().await.unwrap();
        let mut server: Connection<Frame, Frame> = Connection::new(stream, FrameCodec::default());
        let client = client.await.unwrap();

        drop(client);
        assert!(server.recv().await.is_none());
    }
}
