//! Telnet line transport
//!
//! Accepts TCP connections, negotiates character-at-a-time telnet, and
//! wires each connection to a [`Session`].

use std::net::SocketAddr;
use std::sync::Arc;

use atomic_protocol::{negotiation_preamble, ChannelRequest, CodecError, TelnetCodec, TelnetEvent};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, trace, warn};

use atomic_utils::{AtomicError, Result};

use crate::config::AppConfig;
use crate::registry::SessionRegistry;
use crate::script::ScriptCache;
use crate::session::{IdentityResolver, Inbound, Session};
use crate::terminal::{run_writer, OutputSink};

/// Everything a connection handler needs
#[derive(Clone)]
pub struct ServerContext {
    pub config: Arc<AppConfig>,
    pub registry: Arc<SessionRegistry>,
    pub scripts: Arc<ScriptCache>,
    pub identities: Arc<dyn IdentityResolver>,
}

/// Run the TCP accept loop until `shutdown` fires
pub async fn run_accept_loop(
    listener: TcpListener,
    context: ServerContext,
    mut shutdown: broadcast::Receiver<()>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Accepting connections");
    }

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "New TCP connection");
                        let context = context.clone();
                        tokio::spawn(async move {
                            match handle_connection(stream, peer, context).await {
                                Ok(()) => {}
                                Err(e) if e.ends_session() => {
                                    debug!(peer = %peer, error = %e, "Connection dropped");
                                }
                                Err(e) => {
                                    warn!(peer = %peer, error = %e, "Session ended with error");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "TCP accept error");
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Shutdown signal received, stopping accept loop");
                break;
            }
        }
    }
}

/// Serve one connection until its session ends
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: ServerContext,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(&negotiation_preamble()).await?;

    let (sink, outgoing) = OutputSink::channel();
    let writer = tokio::spawn(run_writer(
        outgoing,
        FramedWrite::new(write_half, TelnetCodec::new()),
    ));

    let identity = context
        .identities
        .resolve(&context.config.server.guest_nickname);
    let session = Session::new(
        identity,
        sink,
        Arc::clone(&context.config),
        Arc::clone(&context.scripts),
    );
    context.registry.register(Arc::clone(&session));

    info!(
        session_id = %session.id(),
        peer = %peer,
        nickname = %session.identity().nickname,
        online = context.registry.len(),
        "Connection accepted"
    );

    let inbound = FramedRead::with_capacity(
        read_half,
        TelnetCodec::new(),
        context.config.session.read_buffer_size,
    )
    .filter_map(|event| futures::future::ready(to_inbound(event)));

    let result = match session.start_shell() {
        Ok(()) => Arc::clone(&session).run_reader(inbound).await,
        Err(e) => {
            warn!(session_id = %session.id(), error = %e, "Could not start shell");
            session.disconnect();
            Err(e)
        }
    };

    context.registry.unregister(session.id());
    if let Err(e) = writer.await {
        warn!(session_id = %session.id(), error = %e, "Writer task failed");
    }

    info!(session_id = %session.id(), peer = %peer, "Connection closed");
    result
}

/// Telnet events the session cares about
fn to_inbound(event: std::result::Result<TelnetEvent, CodecError>) -> Option<Result<Inbound>> {
    match event {
        Ok(TelnetEvent::Data(data)) => Some(Ok(Inbound::Data(data))),
        Ok(TelnetEvent::WindowSize { cols, rows }) => {
            Some(Ok(Inbound::Request(ChannelRequest::WindowChange {
                cols: cols.into(),
                rows: rows.into(),
            })))
        }
        Ok(other) => {
            trace!(event = ?other, "Ignoring telnet event");
            None
        }
        Err(CodecError::Io(e)) => Some(Err(AtomicError::Io(e))),
        Err(e) => Some(Err(AtomicError::protocol(e.to_string()))),
    }
}
