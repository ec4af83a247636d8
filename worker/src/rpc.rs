//! Outbound peer RPC: one HTTP POST per call, bounded by the configured
//! timeout.

use std::time::Duration;

use cartcast_core::protocol::{PeerRequest, PeerResponse};

use crate::error::{WorkerError, WorkerResult};

#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(timeout: Duration) -> WorkerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(WorkerError::Client)?;
        Ok(Self { http })
    }

    /// Send one request to the worker at `addr` and wait for its reply.
    ///
    /// A timeout or refused connection comes back as an error; callers treat
    /// that as a best-effort failure, never as a reason to retry or roll
    /// back.
    pub async fn call(&self, addr: &str, request: &PeerRequest) -> WorkerResult<PeerResponse> {
        let url = format!("http://{}/rpc", addr);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| classify(addr, e))?;
        response
            .json::<PeerResponse>()
            .await
            .map_err(|e| classify(addr, e))
    }
}

fn classify(addr: &str, error: reqwest::Error) -> WorkerError {
    if error.is_timeout() {
        WorkerError::PeerTimeout {
            addr: addr.to_string(),
        }
    } else {
        WorkerError::PeerUnreachable {
            addr: addr.to_string(),
            source: error,
        }
    }
}
