//! Authorized HTTP requests with single-refresh-retry semantics.
//!
//! The manager inspects the stored credential's expiry before sending. An
//! expired credential, or an authorization failure on the first attempt,
//! triggers exactly one refresh round-trip; the rotated token set is
//! persisted before the request is retried exactly once. A credential with
//! no refresh token (setup tokens) skips the refresh path entirely.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ProbeError;
use super::store::{CredentialStore, StoredCredential};

/// HTTP verb subset the probes need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A request the manager can decorate with a bearer token and retry.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub json_body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            json_body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            json_body: Some(body),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status and body of a completed request. Non-2xx statuses are data, not
/// transport errors; classification happens in the manager and the parsers.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProbeError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ProbeError::parse(format!("response body: {e}")))
    }
}

/// Transport seam so the refresh flow is testable without a network.
pub trait HttpClient: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ProbeError>;
}

/// Production transport on a shared `ureq` agent.
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new() -> Self {
        let config = ureq::config::Config::builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(30)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for UreqClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ProbeError> {
        let response = match request.method {
            HttpMethod::Get => {
                let mut r = self.agent.get(&request.url);
                for (name, value) in &request.headers {
                    r = r.header(name, value);
                }
                r.call()
            }
            HttpMethod::Post => {
                let mut r = self.agent.post(&request.url);
                for (name, value) in &request.headers {
                    r = r.header(name, value);
                }
                match &request.json_body {
                    Some(body) => r.send_json(body),
                    None => r.send_empty(),
                }
            }
        }
        .map_err(|e| ProbeError::execution(format!("http request failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .into_body()
            .read_to_vec()
            .map_err(|e| ProbeError::execution(format!("read response body: {e}")))?;
        Ok(HttpResponse { status, body })
    }
}

/// OAuth token endpoint for one provider.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    pub url: String,
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds until expiry
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: String,
}

/// Loads a provider's credential and performs authorized requests with the
/// refresh-then-retry policy of one refresh and one retry, never more.
pub struct CredentialManager {
    store: Box<dyn CredentialStore>,
    http: Arc<dyn HttpClient>,
    token_endpoint: Option<TokenEndpoint>,
    // A second concurrent refresh for the same credential could invalidate
    // the first; refreshes are strictly serialized.
    refresh_gate: Mutex<()>,
}

impl CredentialManager {
    pub fn new(store: Box<dyn CredentialStore>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            store,
            http,
            token_endpoint: None,
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn with_token_endpoint(mut self, endpoint: TokenEndpoint) -> Self {
        self.token_endpoint = Some(endpoint);
        self
    }

    /// Current stored credential.
    pub fn load(&self) -> Result<StoredCredential, ProbeError> {
        self.store.load()
    }

    /// Send `request` with a bearer token, refreshing the credential at
    /// most once.
    pub fn authorized_request(&self, request: &HttpRequest) -> Result<HttpResponse, ProbeError> {
        let mut credential = self.store.load()?;
        let mut already_refreshed = false;

        if credential.is_expired() && credential.can_refresh() {
            debug!("credential expired; refreshing before first attempt");
            credential = self.refresh(&credential)?;
            already_refreshed = true;
        }

        let response = self.http.send(&bearer(request, &credential.access_token))?;
        if !is_auth_failure(response.status) {
            return Ok(response);
        }

        if already_refreshed {
            // A token minted moments ago was still rejected
            warn!("freshly refreshed token rejected with {}", response.status);
            return Err(ProbeError::SessionExpired);
        }
        if !credential.can_refresh() {
            // Setup tokens surface authorization failures directly
            return Err(ProbeError::AuthenticationRequired);
        }

        debug!(status = response.status, "authorization failed; refreshing and retrying once");
        let credential = self.refresh(&credential)?;
        let retry = self.http.send(&bearer(request, &credential.access_token))?;
        if is_auth_failure(retry.status) {
            return Err(ProbeError::SessionExpired);
        }
        Ok(retry)
    }

    fn refresh(&self, credential: &StoredCredential) -> Result<StoredCredential, ProbeError> {
        let _gate = self.refresh_gate.lock();

        // The credential was loaded before the gate. A request that held the
        // gate first may have rotated it already, in which case the old
        // refresh token is dead and posting it would kill the live grant.
        if let Ok(current) = self.store.load() {
            if current.access_token != credential.access_token && !current.is_expired() {
                debug!("credential was refreshed concurrently; reusing it");
                return Ok(current);
            }
        }

        let endpoint = self
            .token_endpoint
            .as_ref()
            .ok_or(ProbeError::SessionExpired)?;
        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or(ProbeError::SessionExpired)?;

        let mut body = serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });
        if let Some(client_id) = &endpoint.client_id {
            body["client_id"] = serde_json::Value::String(client_id.clone());
        }

        let response = self
            .http
            .send(&HttpRequest::post_json(&endpoint.url, body))?;

        if !response.is_success() {
            let kind = response
                .json::<OAuthErrorBody>()
                .map(|e| e.error)
                .unwrap_or_default();
            warn!(status = response.status, error = %kind, "token refresh rejected");
            return if kind == "invalid_grant" {
                Err(ProbeError::SessionExpired)
            } else {
                Err(ProbeError::execution(format!(
                    "token refresh failed with status {}",
                    response.status
                )))
            };
        }

        let token: TokenResponse = response.json()?;
        let rotated = StoredCredential {
            access_token: token.access_token,
            // Providers that do not rotate the refresh token keep the old one
            refresh_token: token.refresh_token.or(Some(refresh_token)),
            expires_at: token
                .expires_in
                .map(|secs| Utc::now().timestamp_millis() + secs * 1000),
            subscription_type: credential.subscription_type.clone(),
        };
        self.store.save(&rotated)?;
        debug!("credential refreshed and persisted");
        Ok(rotated)
    }
}

fn bearer(request: &HttpRequest, token: &str) -> HttpRequest {
    request
        .clone()
        .with_header("Authorization", format!("Bearer {token}"))
}

fn is_auth_failure(status: u16) -> bool {
    status == 401 || status == 403
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use parking_lot::RwLock;
    use pretty_assertions::assert_eq;

    struct MemoryStore {
        credential: RwLock<StoredCredential>,
        saves: RwLock<Vec<StoredCredential>>,
    }

    impl MemoryStore {
        fn new(credential: StoredCredential) -> Arc<Self> {
            Arc::new(Self {
                credential: RwLock::new(credential),
                saves: RwLock::new(Vec::new()),
            })
        }
    }

    impl CredentialStore for Arc<MemoryStore> {
        fn load(&self) -> Result<StoredCredential, ProbeError> {
            Ok(self.credential.read().clone())
        }

        fn save(&self, credential: &StoredCredential) -> Result<(), ProbeError> {
            *self.credential.write() = credential.clone();
            self.saves.write().push(credential.clone());
            Ok(())
        }
    }

    /// Scripted transport: pops canned responses in order, records requests.
    struct FakeHttp {
        responses: Mutex<Vec<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl FakeHttp {
        fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_urls(&self) -> Vec<String> {
            self.requests.lock().iter().map(|r| r.url.clone()).collect()
        }
    }

    impl HttpClient for FakeHttp {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ProbeError> {
            self.requests.lock().push(request.clone());
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                panic!("unexpected extra request to {}", request.url);
            }
            Ok(responses.remove(0))
        }
    }

    fn ok_json(value: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status: 200,
            body: serde_json::to_vec(&value).unwrap(),
        }
    }

    fn status(code: u16, value: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status: code,
            body: serde_json::to_vec(&value).unwrap(),
        }
    }

    fn expired_credential() -> StoredCredential {
        StoredCredential {
            access_token: "stale".into(),
            refresh_token: Some("refresh-1".into()),
            expires_at: Some((Utc::now() - ChronoDuration::hours(1)).timestamp_millis()),
            subscription_type: Some("max".into()),
        }
    }

    fn manager(
        store: Arc<MemoryStore>,
        http: Arc<FakeHttp>,
    ) -> CredentialManager {
        CredentialManager::new(Box::new(store), http).with_token_endpoint(TokenEndpoint {
            url: "https://auth.example/token".into(),
            client_id: Some("client-1".into()),
        })
    }

    #[test]
    fn test_expired_credential_refreshes_then_retries_once() {
        let store = MemoryStore::new(expired_credential());
        let http = FakeHttp::new(vec![
            ok_json(serde_json::json!({
                "access_token": "fresh",
                "refresh_token": "refresh-2",
                "expires_in": 3600,
            })),
            ok_json(serde_json::json!({"data": "from-retried-request"})),
        ]);
        let mgr = manager(store.clone(), http.clone());

        let response = mgr
            .authorized_request(&HttpRequest::get("https://api.example/usage"))
            .unwrap();

        // Exactly one refresh call and one (retried) data request
        assert_eq!(
            http.request_urls(),
            vec![
                "https://auth.example/token".to_string(),
                "https://api.example/usage".to_string(),
            ]
        );
        // The snapshot data comes from the retried request
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["data"], "from-retried-request");

        // The data request carried the fresh token
        let requests = http.requests.lock();
        let auth = requests[1]
            .headers
            .iter()
            .find(|(n, _)| n == "Authorization")
            .unwrap();
        assert_eq!(auth.1, "Bearer fresh");
    }

    #[test]
    fn test_rotated_tokens_are_persisted_before_retry() {
        let store = MemoryStore::new(expired_credential());
        let http = FakeHttp::new(vec![
            ok_json(serde_json::json!({"access_token": "fresh", "expires_in": 60})),
            ok_json(serde_json::json!({})),
        ]);
        let mgr = manager(store.clone(), http.clone());
        mgr.authorized_request(&HttpRequest::get("https://api.example/usage"))
            .unwrap();

        let saves = store.saves.read();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].access_token, "fresh");
        // Refresh token survives when the endpoint does not rotate it
        assert_eq!(saves[0].refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(saves[0].subscription_type.as_deref(), Some("max"));
        assert!(saves[0].expires_at.is_some());
    }

    #[test]
    fn test_invalid_grant_fails_as_session_expired_with_no_retry() {
        let store = MemoryStore::new(expired_credential());
        let http = FakeHttp::new(vec![status(
            400,
            serde_json::json!({"error": "invalid_grant"}),
        )]);
        let mgr = manager(store.clone(), http.clone());

        let err = mgr
            .authorized_request(&HttpRequest::get("https://api.example/usage"))
            .unwrap_err();
        assert!(matches!(err, ProbeError::SessionExpired));
        // Only the refresh call went out
        assert_eq!(http.request_urls(), vec!["https://auth.example/token".to_string()]);
    }

    #[test]
    fn test_401_triggers_refresh_and_single_retry() {
        let cred = StoredCredential {
            expires_at: None,
            ..expired_credential()
        };
        let store = MemoryStore::new(cred);
        let http = FakeHttp::new(vec![
            status(401, serde_json::json!({})),
            ok_json(serde_json::json!({"access_token": "fresh"})),
            ok_json(serde_json::json!({"ok": true})),
        ]);
        let mgr = manager(store.clone(), http.clone());

        let response = mgr
            .authorized_request(&HttpRequest::get("https://api.example/usage"))
            .unwrap();
        assert!(response.is_success());
        assert_eq!(http.request_urls().len(), 3);
    }

    #[test]
    fn test_retry_still_unauthorized_is_session_expired() {
        let cred = StoredCredential {
            expires_at: None,
            ..expired_credential()
        };
        let store = MemoryStore::new(cred);
        let http = FakeHttp::new(vec![
            status(403, serde_json::json!({})),
            ok_json(serde_json::json!({"access_token": "fresh"})),
            status(403, serde_json::json!({})),
        ]);
        let mgr = manager(store.clone(), http.clone());

        let err = mgr
            .authorized_request(&HttpRequest::get("https://api.example/usage"))
            .unwrap_err();
        assert!(matches!(err, ProbeError::SessionExpired));
    }

    #[test]
    fn test_setup_token_skips_refresh_entirely() {
        let store = MemoryStore::new(StoredCredential::setup_token("sk-setup"));
        let http = FakeHttp::new(vec![status(401, serde_json::json!({}))]);
        let mgr = manager(store.clone(), http.clone());

        let err = mgr
            .authorized_request(&HttpRequest::get("https://api.example/usage"))
            .unwrap_err();
        assert!(matches!(err, ProbeError::AuthenticationRequired));
        // No token endpoint traffic at all
        assert_eq!(http.request_urls(), vec!["https://api.example/usage".to_string()]);
    }

    #[test]
    fn test_concurrent_requests_share_one_refresh() {
        // Endpoint that rotates the refresh token: the first refresh call
        // succeeds and invalidates the old token, any further call with it
        // is an invalid grant. Data requests only accept the fresh token.
        struct RotatingEndpoint {
            token_calls: Mutex<u32>,
        }

        impl HttpClient for RotatingEndpoint {
            fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ProbeError> {
                if request.url.contains("/token") {
                    let mut calls = self.token_calls.lock();
                    *calls += 1;
                    return if *calls == 1 {
                        Ok(ok_json(serde_json::json!({
                            "access_token": "fresh",
                            "refresh_token": "refresh-2",
                            "expires_in": 3600,
                        })))
                    } else {
                        Ok(status(400, serde_json::json!({"error": "invalid_grant"})))
                    };
                }
                let authorized = request
                    .headers
                    .iter()
                    .any(|(n, v)| n == "Authorization" && v == "Bearer fresh");
                if authorized {
                    Ok(ok_json(serde_json::json!({"ok": true})))
                } else {
                    Ok(status(401, serde_json::json!({})))
                }
            }
        }

        let store = MemoryStore::new(expired_credential());
        let http = Arc::new(RotatingEndpoint {
            token_calls: Mutex::new(0),
        });
        let mgr = CredentialManager::new(Box::new(store), http.clone()).with_token_endpoint(
            TokenEndpoint {
                url: "https://auth.example/token".into(),
                client_id: None,
            },
        );

        // Both requests load the expired credential, then race for the gate.
        // The loser must reuse the winner's rotated token, not re-refresh.
        let barrier = std::sync::Barrier::new(2);
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        mgr.authorized_request(&HttpRequest::get("https://api.example/usage"))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for result in &results {
            let response = result.as_ref().expect("both requests should succeed");
            assert!(response.is_success());
        }
        assert_eq!(*http.token_calls.lock(), 1);
    }

    #[test]
    fn test_healthy_credential_sends_exactly_one_request() {
        let cred = StoredCredential {
            expires_at: Some((Utc::now() + ChronoDuration::hours(2)).timestamp_millis()),
            ..expired_credential()
        };
        let store = MemoryStore::new(cred);
        let http = FakeHttp::new(vec![ok_json(serde_json::json!({"ok": true}))]);
        let mgr = manager(store.clone(), http.clone());

        mgr.authorized_request(&HttpRequest::get("https://api.example/usage"))
            .unwrap();
        assert_eq!(http.request_urls().len(), 1);
    }
}
