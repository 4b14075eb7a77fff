use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use log::{error, info};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::{
    connection::Connection,
    model::{SessionIds, SessionStore},
};

pub struct Server {
    command_tx: mpsc::Sender<ServerCommand>,
    cancellation_token: CancellationToken,
    store: Arc<SessionStore>,
    session_ids: SessionIds,
}

impl Server {
    pub async fn run(address: &str) -> anyhow::Result<ServerHandle> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("binding to {address}"))?;
        info!("Server listening at {}", listener.local_addr()?);

        let (command_tx, command_rx) = mpsc::channel(100);
        let cancellation_token = CancellationToken::new();

        let server = Server {
            command_tx,
            cancellation_token,
            store: Arc::new(SessionStore::default()),
            session_ids: SessionIds::default(),
        };
        let handle = server.handle();

        tokio::spawn(command_receive_loop(command_rx, server));
        tokio::spawn(listen_loop(listener, handle.clone()));

        Ok(handle)
    }

    async fn handle_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::NewConnection(tcp_stream, socket_addr) => {
                self.new_connection(tcp_stream, socket_addr);
            }
        };
    }

    fn new_connection(&mut self, tcp_stream: TcpStream, socket_addr: SocketAddr) {
        let id = self.session_ids.allocate();
        info!("[{id}] Serving {socket_addr}");

        let store = self.store.clone();
        let cancellation_token = self.cancellation_token.clone();
        tokio::spawn(async move {
            if let Err(e) = Connection::run(tcp_stream, id, store, cancellation_token).await {
                error!("[{id}] Connection error: {e:#}");
            }
        });
    }

    fn handle(&self) -> ServerHandle {
        ServerHandle {
            command_tx: self.command_tx.clone(),
            cancellation_token: self.cancellation_token.clone(),
            store: self.store.clone(),
        }
    }
}

async fn command_receive_loop(mut command_rx: mpsc::Receiver<ServerCommand>, mut server: Server) {
    let server_handle = server.handle();
    loop {
        let command = tokio::select! {
            _ = server_handle.wait_shutdown() => return,
            command = command_rx.recv() => command,
        };
        let Some(command) = command else {
            return;
        };
        server.handle_command(command).await;
    }
}

async fn listen_loop(tcp_listener: TcpListener, server_handle: ServerHandle) {
    loop {
        let tcp_stream = tokio::select! {
            _ = server_handle.wait_shutdown() => return,
            tcp_stream = tcp_listener.accept() => tcp_stream,
        };
        let (tcp_stream, socket_addr) = match tcp_stream {
            Ok(v) => v,
            Err(e) => {
                error!("Error listening to connections. {}", e);
                server_handle.shutdown();
                return;
            }
        };
        server_handle.new_connection(tcp_stream, socket_addr).await;
    }
}

#[derive(Clone)]
pub struct ServerHandle {
    command_tx: mpsc::Sender<ServerCommand>,
    cancellation_token: CancellationToken,
    store: Arc<SessionStore>,
}

impl ServerHandle {
    async fn new_connection(&self, tcp_stream: TcpStream, socket_addr: SocketAddr) {
        let _ = self
            .command_tx
            .send(ServerCommand::NewConnection(tcp_stream, socket_addr))
            .await;
    }

    pub fn shutdown(&self) {
        self.cancellation_token.cancel();
    }

    pub fn wait_shutdown(&self) -> WaitForCancellationFuture {
        self.cancellation_token.cancelled()
    }

    pub fn session_count(&self) -> usize {
        self.store.session_count()
    }
}

enum ServerCommand {
    NewConnection(TcpStream, SocketAddr),
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::packet::ClientPacket;

    #[tokio::test]
    async fn serves_sessions_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let server = Server::run(&address.to_string()).await.unwrap();

        let mut first = TcpStream::connect(address).await.unwrap();
        let mut second = TcpStream::connect(address).await.unwrap();

        first
            .write_all(&ClientPacket::Insert { timestamp: 1, price: 10 }.to_bytes())
            .await
            .unwrap();
        second
            .write_all(&ClientPacket::Insert { timestamp: 1, price: 30 }.to_bytes())
            .await
            .unwrap();

        for (stream, expected) in [(&mut first, 10), (&mut second, 30)] {
            stream
                .write_all(&ClientPacket::Query { min_time: 0, max_time: 5 }.to_bytes())
                .await
                .unwrap();
            let mut response = [0; 4];
            stream.read_exact(&mut response).await.unwrap();
            assert_eq!(i32::from_be_bytes(response), expected);
        }
        assert_eq!(server.session_count(), 2);

        server.shutdown();
        let mut rest = Vec::new();
        first.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn bind_failure_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        assert!(Server::run(&address.to_string()).await.is_err());
    }
}
