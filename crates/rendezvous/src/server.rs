use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use brawlnet::rendezvous::{ErrorReason, Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};

use crate::config::RendezvousConfig;
use crate::registry::RoomRegistry;

const MAX_REQUEST_LEN: usize = 256;

/// Accepts one request per connection, answers it and closes.
pub struct RendezvousServer {
    config: RendezvousConfig,
    registry: Arc<Mutex<RoomRegistry>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RendezvousServer {
    pub fn new(config: RendezvousConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            registry: Arc::new(Mutex::new(RoomRegistry::from_config(&config))),
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn registry(&self) -> Arc<Mutex<RoomRegistry>> {
        Arc::clone(&self.registry)
    }

    pub async fn run(&self) -> io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run_with_listener(listener).await
    }

    /// Runs the accept loop and the sweeper on a pre-bound listener until
    /// [`RendezvousServer::shutdown`] is called.
    pub async fn run_with_listener(&self, listener: TcpListener) -> io::Result<()> {
        log::info!("Rendezvous listening on {}", listener.local_addr()?);

        let sweeper = tokio::spawn(Self::sweep_loop(
            Arc::clone(&self.registry),
            self.config.sweep_interval,
            self.shutdown_rx.clone(),
        ));

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            log::warn!("Accept failed: {}", e);
                            continue;
                        }
                    };

                    let registry = Arc::clone(&self.registry);
                    let read_timeout = self.config.read_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, peer_addr, registry, read_timeout).await {
                            log::debug!("Connection from {} failed: {}", peer_addr, e);
                        }
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        log::info!("Rendezvous shutting down");
                        break;
                    }
                }
            }
        }

        sweeper.abort();
        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn sweep_loop(
        registry: Arc<Mutex<RoomRegistry>>,
        period: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    registry.lock().await.sweep(Instant::now());
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        registry: Arc<Mutex<RoomRegistry>>,
        read_timeout: Duration,
    ) -> io::Result<()> {
        let mut data = Vec::with_capacity(64);
        match tokio::time::timeout(read_timeout, read_request(&mut stream, &mut data)).await {
            Ok(result) => result?,
            // Answer whatever arrived.
            Err(_) => log::debug!("{} sent no terminator within {:?}", peer_addr, read_timeout),
        }
        let line = request_line(&data);

        let response = match Request::parse(&line) {
            Some(request) => {
                let source_ip = peer_addr.ip().to_canonical();
                registry.lock().await.handle(request, source_ip, Instant::now())
            }
            None => {
                log::warn!("Bad request from {}: {:?}", peer_addr, line);
                Response::Error(ErrorReason::BadRequest)
            }
        };

        stream.write_all(format!("{}\n", response).as_bytes()).await?;
        stream.shutdown().await
    }
}

/// Reads until a newline or NUL terminator, end of stream, or the length cap.
/// Bytes read so far stay in `data` if the caller gives up early.
async fn read_request(stream: &mut TcpStream, data: &mut Vec<u8>) -> io::Result<()> {
    let mut chunk = [0u8; 64];

    while data.len() < MAX_REQUEST_LEN {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
        if chunk[..n].iter().any(|&b| b == b'\n' || b == 0) {
            break;
        }
    }

    Ok(())
}

fn request_line(data: &[u8]) -> String {
    let end = data
        .iter()
        .position(|&b| b == b'\n' || b == 0)
        .unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}
