/// REST client for the RipplePay backend.
///
/// Attaches the current bearer token to every request and maps the
/// backend's failure responses onto [`WalletError`]. A 401 from any
/// endpoint tears down the shared auth state so protected screens fall
/// back to the login flow.
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::types::ErrorBody;
use crate::errors::{WalletError, WalletResult};
use crate::session::AuthHandle;

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: AuthHandle,
}

impl ApiClient {
    /// Create a new API client against the given base URL.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        auth: AuthHandle,
    ) -> WalletResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            WalletError::NetworkError(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(ApiClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> WalletResult<T> {
        self.execute(self.client.get(self.url(path))).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> WalletResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.execute(self.client.get(self.url(path)).query(query))
            .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> WalletResult<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.execute(self.client.post(self.url(path)).json(body))
            .await
    }

    /// POST without a request body, for endpoints keyed off the bearer
    /// token alone.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> WalletResult<T> {
        self.execute(self.client.post(self.url(path))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(&self, mut request: RequestBuilder) -> WalletResult<T> {
        if let Some(token) = self.auth.bearer() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            // A rejected token invalidates the whole session.
            self.auth.invalidate();
            let message = read_error_message(response)
                .await
                .unwrap_or_else(|| "Authentication expired".to_string());
            return Err(WalletError::Unauthorized(message));
        }

        if !status.is_success() {
            let message = read_error_message(response)
                .await
                .unwrap_or_else(|| format!("HTTP error: {}", status));
            return Err(WalletError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| WalletError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

async fn read_error_message(response: reqwest::Response) -> Option<String> {
    let body: ErrorBody = response.json().await.ok()?;
    body.message.or(body.error)
}
