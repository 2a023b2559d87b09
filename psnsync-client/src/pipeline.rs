//! Authenticated request pipeline.
//!
//! Attaches the bearer token to every request. A request rejected with an
//! expired token asks the [`TokenGate`] for a fresh one and is retried once.

use crate::token_gate::TokenGate;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use psnsync_core::{PsnError, PsnResult, TransportError};
use serde_json::Value;
use std::sync::Arc;

pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    gate: TokenGate,
}

impl AuthenticatedClient {
    pub fn new(transport: Arc<dyn Transport>, gate: TokenGate) -> Self {
        Self { transport, gate }
    }

    pub fn gate(&self) -> &TokenGate {
        &self.gate
    }

    pub fn is_authenticated(&self) -> bool {
        self.gate.is_authenticated()
    }

    /// Execute `request` with the current access token.
    pub async fn request(&self, request: HttpRequest) -> PsnResult<HttpResponse> {
        let token = self
            .gate
            .access_token()
            .ok_or(PsnError::AuthenticationRequired)?;

        match self.send(request.clone(), &token).await {
            Err(TransportError::AuthRejected) => {
                tracing::debug!(url = %request.url, "Access token rejected; refreshing");
                let fresh = self.gate.ensure_fresh_token(&token).await?;
                match self.send(request, &fresh).await {
                    Err(TransportError::AuthRejected) => Err(PsnError::AuthenticationRequired),
                    other => other.map_err(PsnError::from),
                }
            }
            other => other.map_err(PsnError::from),
        }
    }

    async fn send(&self, request: HttpRequest, token: &str) -> Result<HttpResponse, TransportError> {
        let request = request.with_header("authorization", format!("Bearer {}", token));
        self.transport.execute(request).await
    }

    pub async fn get(&self, url: &str) -> PsnResult<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }

    pub async fn post(&self, url: &str, body: &Value) -> PsnResult<HttpResponse> {
        let request = HttpRequest::post(url, body.to_string())
            .with_header("content-type", "application/json");
        self.request(request).await
    }

    /// GET and decode a JSON body. A non-JSON body is an unknown backend response.
    pub async fn get_json(&self, url: &str) -> PsnResult<Value> {
        let response = self.get(url).await?;
        response.json().map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Response is not valid JSON");
            PsnError::from(e)
        })
    }

    /// Let an in-flight refresh settle, drop the tokens, close the transport.
    pub async fn shutdown(&self) {
        self.gate.drain().await;
        self.gate.clear();
        self.transport.close().await;
    }
}
