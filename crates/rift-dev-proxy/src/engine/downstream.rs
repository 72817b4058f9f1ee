//! The client side of an operation: where the response (or handshake) goes.

use super::body::ProxyBody;
use super::error::ProxyError;
use hyper::Response;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Cloneable one-shot handle to the client response.
///
/// Every clone refers to the same slot; the first successful `send` wins.
#[derive(Clone)]
pub struct Responder {
    slot: Arc<Mutex<Option<oneshot::Sender<Response<ProxyBody>>>>>,
}

impl Responder {
    /// Create a responder and the receiver the dev server awaits.
    pub fn channel() -> (Self, oneshot::Receiver<Response<ProxyBody>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// A response (status line and headers) has been handed to the client.
    pub fn headers_sent(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// The client stopped waiting (connection closed) before any response.
    pub fn is_closed(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .map(|tx| tx.is_closed())
            .unwrap_or(false)
    }

    /// Nothing may be written anymore: headers went out or the client is gone.
    pub fn is_started(&self) -> bool {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }

    /// Send the response to the client.
    pub fn send(&self, response: Response<ProxyBody>) -> Result<(), ProxyError> {
        let tx = self
            .slot
            .lock()
            .take()
            .ok_or(ProxyError::AlreadyResponded)?;
        tx.send(response).map_err(|_| ProxyError::ClientGone)
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("headers_sent", &self.headers_sent())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Second argument of a failure event.
///
/// `Http` carries a regular response; `WebSocket` carries the handshake
/// answer of an upgrade. Replays dispatch on the variant.
#[derive(Debug, Clone)]
pub enum Downstream {
    Http(Responder),
    WebSocket(Responder),
}

impl Downstream {
    pub fn responder(&self) -> &Responder {
        match self {
            Downstream::Http(responder) | Downstream::WebSocket(responder) => responder,
        }
    }

    pub fn is_started(&self) -> bool {
        self.responder().is_started()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Downstream::Http(_) => "http",
            Downstream::WebSocket(_) => "websocket",
        }
    }
}
