//! Credential lifecycle: stored OAuth tokens, expiry, refresh-and-retry.

mod auth;
mod store;

pub use auth::{
    CredentialManager, HttpClient, HttpMethod, HttpRequest, HttpResponse, TokenEndpoint,
    UreqClient,
};
pub use store::{CredentialStore, EnvCredentialStore, FileCredentialStore, StoredCredential};
