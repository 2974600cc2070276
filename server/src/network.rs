//! Server network layer: WebSocket connections and the world hub loop

use crate::config::ServerConfig;
use crate::connections::{new_session_id, Session};
use crate::error::ServerError;
use crate::hub::WorldHub;
use crate::persistence::PersistenceStore;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::any::Any;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the hub loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected { session: Session },
    ClientText { session_id: String, text: String },
    Disconnected { session_id: String },
}

/// Owns the listener and the hub, and runs the loop that serializes every
/// world access.
pub struct Server {
    listener: TcpListener,
    hub: WorldHub,
    save_interval: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the listen address and loads the world.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        if config.save_interval.is_zero() {
            return Err(ServerError::InvalidSaveInterval);
        }

        let address = config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| bind_error(&address, source))?;
        info!("Server listening on {}", listener.local_addr()?);

        let store = PersistenceStore::new(&config.state_file);
        info!("World will be saved to {}", store.path().display());
        let hub = WorldHub::load(store);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            hub,
            save_interval: config.save_interval,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn hub(&self) -> &WorldHub {
        &self.hub
    }

    /// Runs until `shutdown` resolves or a handler panics.
    ///
    /// Either way the world is saved one last time before returning. A panic
    /// is reported as [`ServerError::HandlerPanicked`].
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            hub,
            save_interval,
            server_tx,
            server_rx,
        } = self;

        let acceptor = spawn_acceptor(listener, server_tx);
        let result = drive(hub, server_rx, save_interval, shutdown, dispatch).await;
        acceptor.abort();
        result
    }
}

/// The hub loop. Every message goes through `handler` on this one task,
/// interleaved with periodic saves, until shutdown or a handler panic. The
/// hub is flushed and closed on every exit path.
async fn drive<F, H>(
    mut hub: WorldHub,
    mut server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    save_interval: Duration,
    shutdown: F,
    mut handler: H,
) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
    H: FnMut(&mut WorldHub, ServerMessage),
{
    let mut save_timer = interval_at(Instant::now() + save_interval, save_interval);
    save_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::pin!(shutdown);
    info!("Server started successfully");

    let result = loop {
        tokio::select! {
            message = server_rx.recv() => {
                match message {
                    Some(message) => {
                        let handled =
                            off_runtime(|| guarded(&mut hub, |hub| handler(hub, message)));
                        if let Err(e) = handled {
                            break Err(e);
                        }
                    }
                    None => {
                        warn!("All connection channels closed");
                        break Ok(());
                    }
                }
            },

            _ = save_timer.tick() => {
                if off_runtime(|| hub.periodic_checkpoint()) == Some(false) {
                    error!("Periodic save failed");
                }
            },

            _ = &mut shutdown => {
                info!("Server shutting down");
                break Ok(());
            },
        }
    };

    if !off_runtime(|| hub.shutdown()) {
        error!("Final save failed");
    }
    result
}

/// Runs file-bound work so it does not stall other tasks. On a multi-threaded
/// runtime the worker hands its queue to another thread first; elsewhere the
/// work just runs inline.
fn off_runtime<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            task::block_in_place(f)
        }
        _ => f(),
    }
}

fn bind_error(address: &str, source: io::Error) -> ServerError {
    match (source.kind(), address.parse::<SocketAddr>()) {
        (io::ErrorKind::AddrInUse, Ok(addr)) => ServerError::AddrInUse { addr, source },
        _ => ServerError::Bind {
            addr: address.to_string(),
            source,
        },
    }
}

/// Runs `f` against the hub, turning a panic into an error.
fn guarded<F>(hub: &mut WorldHub, f: F) -> Result<(), ServerError>
where
    F: FnOnce(&mut WorldHub),
{
    panic::catch_unwind(AssertUnwindSafe(|| f(hub))).map_err(|payload| {
        let reason = panic_message(&*payload);
        error!("World handler panicked: {}", reason);
        ServerError::HandlerPanicked(reason)
    })
}

fn dispatch(hub: &mut WorldHub, message: ServerMessage) {
    match message {
        ServerMessage::Connected { session } => {
            hub.connect(session);
        }
        ServerMessage::ClientText { session_id, text } => {
            hub.handle_text(&session_id, &text);
        }
        ServerMessage::Disconnected { session_id } => {
            hub.disconnect(&session_id);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawns task that accepts TCP connections and hands each to its own task
fn spawn_acceptor(
    listener: TcpListener,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tokio::spawn(handle_connection(stream, addr, server_tx.clone()));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    })
}

/// Drives one WebSocket: a writer task drains the session's outbound queue,
/// while this task forwards inbound text frames to the hub.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut sink, mut source) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let session_id = new_session_id();

    // Ends when the hub drops the session or after a close frame.
    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = sink.send(message).await {
                debug!("Write to {} failed: {}", addr, e);
                break;
            }
            if closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let session = Session::new(session_id.clone(), addr, out_tx);
    if server_tx
        .send(ServerMessage::Connected { session })
        .is_err()
    {
        return;
    }

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let message = ServerMessage::ClientText {
                    session_id: session_id.clone(),
                    text,
                };
                if server_tx.send(message).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(data)) => {
                warn!(
                    "Dropped {}-byte binary frame from {}, only text is accepted",
                    data.len(),
                    session_id
                );
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Connection {} ended with error: {}", session_id, e);
                break;
            }
        }
    }

    let _ = server_tx.send(ServerMessage::Disconnected { session_id });
}
