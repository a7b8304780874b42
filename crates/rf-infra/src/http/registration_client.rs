//! reqwest-based registration API client
//!
//! Attaches the stored bearer token to every call and translates the
//! authorization-relevant status codes (401, 403, 422-with-token-hint)
//! into the typed failures the application layer reacts to.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use rf_core::ports::{
    ApiError, ApiResponse, KeyValueStorePort, RegistrationApiPort, SendOtpData, VerifyOtpData,
    AUTH_TOKEN_KEY,
};
use rf_core::registration::FormData;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendOtpRequest<'a> {
    id_number: &'a str,
    phone_number: &'a str,
    name: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResendOtpRequest<'a> {
    phone_number: &'a str,
}

pub struct RegistrationClient {
    http: reqwest::Client,
    base_url: String,
    storage: Arc<dyn KeyValueStorePort>,
}

impl RegistrationClient {
    pub fn new(base_url: impl Into<String>, storage: Arc<dyn KeyValueStorePort>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            storage,
        }
    }

    async fn bearer(&self) -> Option<String> {
        match self.storage.get(AUTH_TOKEN_KEY).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "failed to read token for outbound call");
                None
            }
        }
    }

    async fn send<T: DeserializeOwned + Default>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiResponse<T>, ApiError> {
        let mut request = request;
        if let Some(token) = self.bearer().await {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;

        match status {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let message = extract_message(&body);
                if message.to_lowercase().contains("token") {
                    Err(ApiError::TokenRejected)
                } else {
                    Err(ApiError::Status {
                        status: status.as_u16(),
                        message,
                    })
                }
            }
            status if !status.is_success() => Err(ApiError::Status {
                status: status.as_u16(),
                message: extract_message(&body),
            }),
            _ => serde_json::from_str(&body)
                .map_err(|err| ApiError::Transport(format!("invalid response body: {err}"))),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Best-effort `message` extraction from an error body.
fn extract_message(body: &str) -> String {
    serde_json::from_str::<ApiResponse<serde_json::Value>>(body)
        .map(|response| response.message)
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl RegistrationApiPort for RegistrationClient {
    async fn submit_registration(
        &self,
        form: &FormData,
    ) -> Result<ApiResponse<SendOtpData>, ApiError> {
        debug!(phone = %form.phone_number, "submitting registration");
        let body = SendOtpRequest {
            id_number: &form.id_number,
            phone_number: &form.phone_number,
            name: &form.name,
            email: &form.email,
        };
        self.send(self.http.post(self.url("/send-otp")).json(&body))
            .await
    }

    async fn verify_otp(
        &self,
        otp_code: &str,
        form: &FormData,
    ) -> Result<ApiResponse<VerifyOtpData>, ApiError> {
        debug!("verifying otp");
        let mut payload = form.clone();
        payload.otp_code = Some(otp_code.to_string());
        self.send(self.http.post(self.url("/register")).json(&payload))
            .await
    }

    async fn resend_otp(&self, phone_number: &str) -> Result<ApiResponse<SendOtpData>, ApiError> {
        debug!(phone = %phone_number, "resending otp");
        let body = ResendOtpRequest { phone_number };
        self.send(self.http.post(self.url("/resend-otp")).json(&body))
            .await
    }

    async fn lookup_cities(&self) -> Result<Vec<String>, ApiError> {
        let response: ApiResponse<Vec<String>> =
            self.send(self.http.get(self.url("/cities"))).await?;
        Ok(response.data.unwrap_or_default())
    }

    async fn lookup_districts(&self, city: &str) -> Result<Vec<String>, ApiError> {
        let response: ApiResponse<Vec<String>> = self
            .send(
                self.http
                    .get(self.url("/public/address/districts"))
                    .query(&[("city", city)]),
            )
            .await?;
        Ok(response.data.unwrap_or_default())
    }
}
