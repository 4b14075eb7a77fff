use std::sync::Arc;

use anyhow::Context;
use log::{debug, error, info, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio_util::sync::CancellationToken;

use crate::{
    frame::{FrameError, FrameReader},
    model::{SessionId, SessionStore},
    packet::{ClientPacket, ServerPacket},
};

pub struct Connection<W> {
    id: SessionId,
    store: Arc<SessionStore>,
    write_stream: W,
}

/// Unregisters its session when dropped, whichever way the connection ends.
struct Registration {
    id: SessionId,
    store: Arc<SessionStore>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.store.unregister(self.id);
        debug!("[{}] Session unregistered", self.id);
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<WriteHalf<S>> {
    /// Serves one client until it disconnects, sends an invalid frame, or the
    /// server shuts down. The session is registered for exactly as long as
    /// this runs.
    pub async fn run(
        stream: S,
        id: SessionId,
        store: Arc<SessionStore>,
        server_cancellation_token: CancellationToken,
    ) -> anyhow::Result<()> {
        store
            .register(id)
            .with_context(|| format!("registering session {id}"))?;
        let registration = Registration {
            id,
            store: store.clone(),
        };
        debug!("[{id}] Session registered");

        let (read_stream, write_stream) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read_stream);
        let mut connection = Connection {
            id,
            store,
            write_stream,
        };

        loop {
            let packet = tokio::select! {
                v = reader.read_packet() => v,
                _ = server_cancellation_token.cancelled() => {
                    debug!("[{id}] Server shutting down");
                    break;
                }
            };

            match packet {
                Ok(Some(packet)) => connection.handle_packet(packet).await?,
                Ok(None) => {
                    debug!("[{id}] Encountered EOF");
                    break;
                }
                Err(FrameError::Decode(e)) => {
                    warn!("[{id}] Invalid message: {e}");
                    break;
                }
                Err(FrameError::Io(e)) => {
                    error!("[{id}] Error reading from connection: {e}");
                    break;
                }
            }
        }

        drop(registration);
        info!("[{id}] Closing connection");
        if let Err(e) = connection.write_stream.shutdown().await {
            debug!("[{id}] Error closing connection: {e}");
        }

        Ok(())
    }
}

impl<W: AsyncWrite + Unpin> Connection<W> {
    async fn handle_packet(&mut self, packet: ClientPacket) -> anyhow::Result<()> {
        trace!("[{}] < {:?}", self.id, packet);
        match packet {
            ClientPacket::Insert { timestamp, price } => {
                if let Err(e) = self.store.insert(self.id, timestamp, price) {
                    warn!("[{}] Dropping insert: {e}", self.id);
                }
            }
            ClientPacket::Query { min_time, max_time } => {
                let mean_price = match self.store.query_average(self.id, min_time, max_time) {
                    Ok(v) => v,
                    Err(e) => {
                        error!("[{}] Error while querying average: {e}", self.id);
                        0
                    }
                };
                debug!(
                    "[{}] Returning {mean_price} for prices between {min_time} and {max_time}",
                    self.id
                );
                self.send(ServerPacket::QueryResponse { mean_price }).await?;
            }
        }
        Ok(())
    }

    async fn send(&mut self, packet: ServerPacket) -> anyhow::Result<()> {
        trace!("[{}] > {:?}", self.id, packet);
        self.write_stream
            .write_all(&packet.to_bytes())
            .await
            .context("writing to connection")
    }
}
