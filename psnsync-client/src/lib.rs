//! psnsync Client
//!
//! Everything between the normalized records of `psnsync-core` and the wire:
//!
//! - [`transport`]: the HTTP port and its `reqwest` implementation
//! - [`token_gate`]: single-flight access token refresh
//! - [`pipeline`]: bearer injection with one refresh-and-retry on rejection
//! - [`oauth`]: the NPSSO cookie to access token exchange
//! - [`parsers`]: typed parse functions over backend payloads
//! - [`psn`]: the backend API client and the [`TrophyApi`] seam

pub mod credentials;
pub mod endpoints;
pub mod oauth;
pub mod parsers;
pub mod pipeline;
pub mod psn;
pub mod token_gate;
pub mod transport;

pub use credentials::{AuthLostNotifier, CredentialStore, StoredCredentials};
pub use oauth::NpssoExchange;
pub use pipeline::AuthenticatedClient;
pub use psn::{PsnClient, TrophyApi};
pub use token_gate::{GatePhase, TokenExchange, TokenGate, TokenGrant};
pub use transport::{
    HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportConfig,
};
