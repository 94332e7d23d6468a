use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::auth::Authenticator;
use crate::error::{Result, VkError};
use crate::transport::Transport;
use crate::types::{ApiRequest, ApiResponse};

/// VK `error_code` for "User authorization failed" (expired or revoked token).
pub const SESSION_EXPIRED_CODE: i64 = 5;

/// Forced reauthentications allowed per `send`.
const MAX_REAUTH: u32 = 1;

/// Sends authenticated requests, reauthenticating once when the session expires.
///
/// Every request gets the current `access_token` and API version attached. If
/// the response body carries the session-expired error code the executor forces
/// a fresh handshake and resends the same request. A second expiry in a row is
/// returned as [`VkError::SessionExpired`]. Everything else, including other API
/// errors and non-JSON bodies, is passed through untouched.
///
/// The token lock is held for the duration of a handshake, so concurrent sends
/// on the same executor wait for the refresh to finish.
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    auth: Arc<dyn Authenticator>,
    version: String,
    token: Mutex<Option<String>>,
}

impl RequestExecutor {
    /// Authenticates lazily on the first send.
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<dyn Authenticator>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            auth,
            version: version.into(),
            token: Mutex::new(None),
        }
    }

    /// Starts from an already issued token; the first handshake happens only on expiry.
    pub fn with_token(
        transport: Arc<dyn Transport>,
        auth: Arc<dyn Authenticator>,
        version: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            auth,
            version: version.into(),
            token: Mutex::new(Some(token.into())),
        }
    }

    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut reauths = 0;

        loop {
            let token = self.current_token().await?;
            let signed = request
                .clone()
                .param("access_token", &token)
                .param("v", &self.version);

            let response = self.transport.send(&signed).await?;
            if !is_session_expired(&response) {
                return Ok(response);
            }

            if reauths >= MAX_REAUTH {
                warn!(path = %request.path, attempts = reauths + 1, "Session still expired after reauthentication");
                return Err(VkError::SessionExpired {
                    attempts: reauths + 1,
                });
            }

            reauths += 1;
            warn!(path = %request.path, "Session expired, reauthenticating");
            self.refresh().await?;
        }
    }

    async fn current_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let fresh = self.auth.authenticate().await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    async fn refresh(&self) -> Result<()> {
        let mut guard = self.token.lock().await;
        let fresh = self.auth.authenticate().await?;
        *guard = Some(fresh);
        Ok(())
    }
}

/// True when the body is a JSON error object carrying [`SESSION_EXPIRED_CODE`].
pub fn is_session_expired(response: &ApiResponse) -> bool {
    response.error_code() == Some(SESSION_EXPIRED_CODE)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;

    const EXPIRED: &str = r#"{"error":{"error_code":5,"error_msg":"User authorization failed: access_token has expired."}}"#;
    const WALL_OK: &str = r#"{"response":{"count":1,"items":[{"id":1,"date":1700000000}]}}"#;

    struct ScriptedTransport {
        responses: StdMutex<VecDeque<Result<ApiResponse>>>,
        seen: StdMutex<Vec<ApiRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<ApiResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                seen: StdMutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<ApiRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
            self.seen.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(VkError::Network("script exhausted".to_string())))
        }
    }

    /// Hands out `token-1`, `token-2`, ... and counts handshakes.
    struct CountingAuth {
        calls: AtomicU32,
    }

    impl CountingAuth {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Authenticator for CountingAuth {
        async fn authenticate(&self) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{n}"))
        }
    }

    fn wall_request() -> ApiRequest {
        ApiRequest::get("wall.get")
            .param("owner_id", -100)
            .param("count", 50)
            .param("offset", 0)
    }

    #[tokio::test]
    async fn passes_through_successful_response_without_reauth() {
        let transport = ScriptedTransport::new(vec![Ok(ApiResponse::ok(WALL_OK))]);
        let auth = CountingAuth::new();
        let executor = RequestExecutor::with_token(transport.clone(), auth.clone(), "5.64", "initial");

        let resp = executor.send(&wall_request()).await.unwrap();

        assert_eq!(resp.body, WALL_OK);
        assert_eq!(auth.calls(), 0);
        let seen = transport.seen();
        assert_eq!(seen[0].param_value("access_token"), Some("initial"));
        assert_eq!(seen[0].param_value("v"), Some("5.64"));
    }

    #[tokio::test]
    async fn single_expiry_recovers_after_exactly_one_reauth() {
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::ok(EXPIRED)),
            Ok(ApiResponse::ok(WALL_OK)),
        ]);
        let auth = CountingAuth::new();
        let executor = RequestExecutor::with_token(transport.clone(), auth.clone(), "5.64", "stale");

        let resp = executor.send(&wall_request()).await.unwrap();

        assert_eq!(resp.body, WALL_OK);
        assert_eq!(auth.calls(), 1);

        let seen = transport.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].param_value("access_token"), Some("stale"));
        assert_eq!(seen[1].param_value("access_token"), Some("token-1"));
        // Same call, only the token differs.
        assert_eq!(seen[0].path, seen[1].path);
        assert_eq!(seen[0].param_value("offset"), seen[1].param_value("offset"));
        assert_eq!(seen[0].param_value("owner_id"), seen[1].param_value("owner_id"));
    }

    #[tokio::test]
    async fn consecutive_expiry_surfaces_error() {
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::ok(EXPIRED)),
            Ok(ApiResponse::ok(EXPIRED)),
            Ok(ApiResponse::ok(WALL_OK)),
        ]);
        let auth = CountingAuth::new();
        let executor = RequestExecutor::with_token(transport.clone(), auth.clone(), "5.64", "stale");

        let err = executor.send(&wall_request()).await.unwrap_err();

        assert!(matches!(err, VkError::SessionExpired { attempts: 2 }));
        assert_eq!(auth.calls(), 1);
        assert_eq!(transport.seen().len(), 2);
    }

    #[tokio::test]
    async fn reauth_budget_resets_per_call() {
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::ok(EXPIRED)),
            Ok(ApiResponse::ok(WALL_OK)),
            Ok(ApiResponse::ok(EXPIRED)),
            Ok(ApiResponse::ok(WALL_OK)),
        ]);
        let auth = CountingAuth::new();
        let executor = RequestExecutor::with_token(transport, auth.clone(), "5.64", "stale");

        executor.send(&wall_request()).await.unwrap();
        executor.send(&wall_request()).await.unwrap();

        assert_eq!(auth.calls(), 2);
    }

    #[tokio::test]
    async fn other_api_errors_and_non_json_pass_through() {
        let denied = r#"{"error":{"error_code":15,"error_msg":"Access denied"}}"#;
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::ok(denied)),
            Ok(ApiResponse {
                status: 502,
                body: "<html>Bad Gateway</html>".to_string(),
            }),
        ]);
        let auth = CountingAuth::new();
        let executor = RequestExecutor::with_token(transport, auth.clone(), "5.64", "t");

        let first = executor.send(&wall_request()).await.unwrap();
        let second = executor.send(&wall_request()).await.unwrap();

        assert_eq!(first.body, denied);
        assert_eq!(second.status, 502);
        assert_eq!(auth.calls(), 0);
    }

    #[tokio::test]
    async fn transport_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(VkError::Network("connection reset".to_string())),
            Ok(ApiResponse::ok(WALL_OK)),
        ]);
        let auth = CountingAuth::new();
        let executor = RequestExecutor::with_token(transport.clone(), auth.clone(), "5.64", "t");

        let err = executor.send(&wall_request()).await.unwrap_err();

        assert!(matches!(err, VkError::Network(_)));
        assert_eq!(transport.seen().len(), 1);
        assert_eq!(auth.calls(), 0);
    }

    #[tokio::test]
    async fn lazy_initial_handshake_is_not_the_forced_refresh() {
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::ok(EXPIRED)),
            Ok(ApiResponse::ok(WALL_OK)),
        ]);
        let auth = CountingAuth::new();
        let executor = RequestExecutor::new(transport.clone(), auth.clone(), "5.64");

        executor.send(&wall_request()).await.unwrap();

        // One lazy handshake plus one forced refresh.
        assert_eq!(auth.calls(), 2);
        let seen = transport.seen();
        assert_eq!(seen[0].param_value("access_token"), Some("token-1"));
        assert_eq!(seen[1].param_value("access_token"), Some("token-2"));
    }
}
