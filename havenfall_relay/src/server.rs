// TCP server and main event loop for the relay coordinator.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::NewConnection` to the main thread.
// - **Reader threads** (one per peer): call `framing::recv()` in a loop and
//   send `InternalEvent::MessageFrom` to the main thread. On error/EOF or a
//   Goodbye, send `InternalEvent::Disconnected`.
// - **Main thread**: owns the `RelaySession`, receives events from the
//   channel, and dispatches them. Handling order on this one thread IS the
//   session order every peer observes — commands, membership, and property
//   updates all serialize here.
//
// The main thread is the only writer to peer TCP streams (via the session's
// send helpers); reader threads only read. This avoids concurrent
// read/write on one `TcpStream`.
//
// Shutdown: `RelayHandle::stop` flips `keep_running`; the main loop's
// `recv_timeout` notices within its tick.

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use havenfall_protocol::framing;
use havenfall_protocol::message::{ClientMessage, ServerMessage};
use havenfall_protocol::types::ActorId;
use log::{debug, warn};

use crate::session::RelaySession;

/// How long the main loop sleeps in `recv_timeout` before re-checking the
/// shutdown flag.
const LOOP_TICK: Duration = Duration::from_millis(50);

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
    },
    MessageFrom {
        actor_id: ActorId,
        message: ClientMessage,
    },
    Disconnected {
        actor_id: ActorId,
    },
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a relay server.
pub struct RelayConfig {
    pub port: u16,
    pub session_name: String,
    pub password: Option<String>,
    pub max_peers: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 7979,
            session_name: "havenfall-session".into(),
            password: None,
            max_peers: 16,
        }
    }
}

/// Start the relay server on a background thread. Returns a control handle
/// and the bound address (useful with port 0, where the OS picks).
pub fn start_relay(config: RelayConfig) -> std::io::Result<(RelayHandle, std::net::SocketAddr)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_loop = keep_running.clone();

    let thread = thread::spawn(move || {
        run_relay(listener, config, keep_running_loop);
    });

    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main relay loop. Runs until `keep_running` is cleared.
fn run_relay(listener: TcpListener, config: RelayConfig, keep_running: Arc<AtomicBool>) {
    let mut session = RelaySession::new(config.session_name, config.password, config.max_peers);

    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Non-blocking accept so the listener thread can notice shutdown.
    listener.set_nonblocking(true).ok();
    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(LOOP_TICK);
                }
                Err(_) => break,
            }
        }
    });

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(LOOP_TICK) {
            Ok(event) => {
                handle_event(&mut session, event, &tx, &keep_running);
                // Drain whatever arrived while handling; ordering within the
                // drain is still single-threaded handling order.
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut session, event, &tx, &keep_running);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn handle_event(
    session: &mut RelaySession,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    match event {
        InternalEvent::NewConnection { stream } => {
            handle_new_connection(session, stream, tx, keep_running);
        }
        InternalEvent::MessageFrom { actor_id, message } => {
            handle_message(session, actor_id, message);
        }
        InternalEvent::Disconnected { actor_id } => {
            session.remove_peer(actor_id);
        }
    }
}

/// Handle a fresh TCP connection: read the Hello handshake, admit the peer,
/// and spawn its reader thread.
fn handle_new_connection(
    session: &mut RelaySession,
    stream: TcpStream,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    // Bound the handshake wait; a silent connection is dropped.
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok();

    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });

    let hello: ClientMessage = match framing::recv(&mut reader) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("dropping connection before handshake: {e}");
            return;
        }
    };

    let ClientMessage::Hello {
        protocol_version: _,
        peer_name,
        world_version_hash,
        config_hash,
        session_password,
    } = hello
    else {
        debug!("first message was not Hello; dropping connection");
        return;
    };

    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };

    match session.add_peer(
        peer_name,
        world_version_hash,
        config_hash,
        session_password,
        write_stream,
    ) {
        Ok(actor_id) => {
            // Clear the handshake timeout for the long-lived reader loop.
            stream.set_read_timeout(None).ok();
            let tx_reader = tx.clone();
            let keep_running_reader = keep_running.clone();
            thread::spawn(move || {
                reader_loop(reader, actor_id, tx_reader, keep_running_reader);
            });
        }
        Err(reason) => {
            warn!("rejected join: {reason}");
            let mut writer = std::io::BufWriter::new(stream);
            let _ = framing::send(&mut writer, &ServerMessage::Rejected { reason });
        }
    }
}

/// Reader loop for one peer. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    actor_id: ActorId,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match framing::recv::<_, ClientMessage>(&mut reader) {
            Ok(ClientMessage::Goodbye) => {
                let _ = tx.send(InternalEvent::Disconnected { actor_id });
                break;
            }
            Ok(message) => {
                let _ = tx.send(InternalEvent::MessageFrom { actor_id, message });
            }
            Err(_) => {
                // Read error, EOF, or an unparsable frame — either way this
                // connection is done.
                let _ = tx.send(InternalEvent::Disconnected { actor_id });
                break;
            }
        }
    }
}

/// Dispatch one in-session client message. Hello and Goodbye never reach
/// here (handled at connection setup and in the reader loop).
fn handle_message(session: &mut RelaySession, actor_id: ActorId, message: ClientMessage) {
    match message {
        ClientMessage::Command { sequence, payload } => {
            session.relay_command(actor_id, sequence, payload);
        }
        ClientMessage::StreamFrame { target, payload } => {
            session.relay_stream_frame(actor_id, target, payload);
        }
        ClientMessage::PropertySet { entries } => {
            session.store_properties(actor_id, entries);
        }
        ClientMessage::SnapshotSync {
            tile_count,
            structure_count,
            resource_count,
        } => {
            session.relay_snapshot_sync(actor_id, tile_count, structure_count, resource_count);
        }
        ClientMessage::Focus { position } => {
            session.relay_focus(actor_id, position);
        }
        ClientMessage::Ping { nonce } => {
            session.pong(actor_id, nonce);
        }
        ClientMessage::Hello { .. } | ClientMessage::Goodbye => {}
    }
}
