//! NPSSO cookie to access token exchange.
//!
//! The authorize endpoint answers a silent request with a redirect whose
//! `Location` fragment carries `access_token`. A `Set-Cookie: npsso=...` on
//! that reply is a rotated refresh token.

use crate::credentials::NPSSO_COOKIE;
use crate::endpoints;
use crate::token_gate::{TokenExchange, TokenGrant};
use crate::transport::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use psnsync_core::{ParseError, PsnError, PsnResult, TransportError};
use std::sync::Arc;

pub struct NpssoExchange {
    transport: Arc<dyn Transport>,
    token_url: String,
}

impl NpssoExchange {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            token_url: endpoints::oauth_token_url(),
        }
    }
}

#[async_trait]
impl TokenExchange for NpssoExchange {
    async fn exchange(&self, refresh_token: &str) -> PsnResult<TokenGrant> {
        let request = HttpRequest::get(&self.token_url).with_cookie(NPSSO_COOKIE, refresh_token);
        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(TransportError::AuthRejected) => return Err(PsnError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };

        let access_token = access_token_from_location(&response)?;
        Ok(TokenGrant {
            access_token,
            rotated_refresh_token: rotated_npsso(&response, refresh_token),
        })
    }
}

/// Extract `access_token` from the fragment of the `Location` header.
pub fn access_token_from_location(response: &HttpResponse) -> Result<String, ParseError> {
    let location = response
        .header("location")
        .ok_or_else(|| ParseError::missing("Location"))?;
    let (_, fragment) = location
        .split_once('#')
        .ok_or_else(|| ParseError::invalid("Location", "no fragment"))?;

    fragment
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "access_token")
        .map(|(_, value)| {
            urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ParseError::missing("access_token"))
}

/// A new NPSSO value set by the response, if it differs from the current one.
fn rotated_npsso(response: &HttpResponse, current: &str) -> Option<String> {
    response
        .headers_named("set-cookie")
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == NPSSO_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty() && value != current)
}
