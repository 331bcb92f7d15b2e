//! `GET /getState` bootstrap endpoint.
//!
//! Serves the latest full encoded state so a client can build its mirrors
//! before the event stream takes over. Runs on its own thread; the game
//! loop only swaps the shared string once per tick.

use log::{debug, error, info};
use shared::{StateResponse, STATE_PATH};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tiny_http::{Header, Method, Request, Response, Server};

/// Latest encoded state, written by the game loop.
pub type SharedState = Arc<Mutex<String>>;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("failed to bind to {addr}: {error}")]
    Bind { addr: String, error: String },
    #[error("state lock poisoned")]
    Poisoned,
    #[error("failed to encode response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to send response: {0}")]
    Io(#[from] std::io::Error),
}

pub struct StateServer {
    addr: String,
    actual_port: Option<u16>,
    handle: Option<JoinHandle<()>>,
}

impl StateServer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            actual_port: None,
            handle: None,
        }
    }

    pub fn start(&mut self, state: SharedState) -> Result<(), HttpError> {
        let server = Server::http(&self.addr).map_err(|e| HttpError::Bind {
            addr: self.addr.clone(),
            error: e.to_string(),
        })?;

        self.actual_port = server.server_addr().to_ip().map(|addr| addr.port());
        info!("State endpoint listening on {}{}", self.addr, STATE_PATH);

        let handle = thread::spawn(move || {
            for request in server.incoming_requests() {
                if let Err(e) = Self::handle_request(request, &state) {
                    error!("State request failed: {}", e);
                }
            }
        });
        self.handle = Some(handle);
        Ok(())
    }

    /// Port actually bound, useful when started on port 0.
    pub fn actual_port(&self) -> Option<u16> {
        self.actual_port
    }

    fn handle_request(request: Request, state: &SharedState) -> Result<(), HttpError> {
        let path = request.url().split('?').next().unwrap_or_default();
        debug!("{} {}", request.method(), path);

        let response = match (request.method(), path) {
            (&Method::Get, STATE_PATH) => {
                let mut response = Response::from_string(state_json(state)?);
                if let Ok(header) =
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                {
                    response = response.with_header(header);
                }
                response
            }
            _ => Response::from_string("Not Found").with_status_code(404),
        };

        request.respond(response)?;
        Ok(())
    }
}

/// JSON body served for the current state.
pub fn state_json(state: &SharedState) -> Result<String, HttpError> {
    let encoded = state.lock().map_err(|_| HttpError::Poisoned)?.clone();
    Ok(serde_json::to_string(&StateResponse { state: encoded })?)
}
