//! Terminal output path
//!
//! Writers on any thread push [`Outgoing`] items into an unbounded channel;
//! one writer task per connection drains it into the transport. Paced
//! output is written one unit at a time with a sleep between units.

use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Item queued for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Bytes written as one unit
    Data(Bytes),
    /// Units written one by one with `delay` after each
    Paced { units: Vec<Bytes>, delay: Duration },
    /// Close the transport after everything queued before it
    Close,
}

/// Cloneable handle to a connection's output queue
#[derive(Debug, Clone)]
pub struct OutputSink {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl OutputSink {
    /// Create a sink and the receiver the writer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue bytes. Failures are logged and swallowed so the line editor
    /// keeps working while the remote display is gone.
    pub fn send(&self, item: Outgoing) {
        if let Err(e) = self.tx.send(item) {
            debug!(error = %e, "Terminal output dropped, writer is gone");
        }
    }

    pub fn data(&self, data: impl Into<Bytes>) {
        let data = data.into();
        if !data.is_empty() {
            self.send(Outgoing::Data(data));
        }
    }

    /// Ask the writer to close the transport
    pub fn close(&self) {
        self.send(Outgoing::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drain `rx` into `sink` until a close item arrives, every sender is
/// dropped, or a write fails.
pub async fn run_writer<S>(mut rx: mpsc::UnboundedReceiver<Outgoing>, mut sink: S)
where
    S: Sink<Bytes> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(item) = rx.recv().await {
        let result = match item {
            Outgoing::Data(data) => {
                trace!(len = data.len(), "Writing terminal output");
                sink.send(data).await
            }
            Outgoing::Paced { units, delay } => write_paced(&mut sink, units, delay).await,
            Outgoing::Close => {
                debug!("Closing transport");
                break;
            }
        };

        if let Err(e) = result {
            warn!(error = %e, "Transport write failed, stopping writer");
            rx.close();
            break;
        }
    }

    if let Err(e) = sink.close().await {
        debug!(error = %e, "Transport close failed");
    }
}

async fn write_paced<S>(sink: &mut S, units: Vec<Bytes>, delay: Duration) -> Result<(), S::Error>
where
    S: Sink<Bytes> + Unpin,
{
    for unit in units {
        sink.send(unit).await?;
        tokio::time::sleep(delay).await;
    }
    Ok(())
}
