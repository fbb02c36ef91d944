//! HTTP implementation of both gateways over `reqwest`.
//!
//! The remote session lives in a cookie, so one client (and one cookie jar)
//! is shared by every call. The jar's cookies for the base URL can be
//! exported and restored so a remembered session outlives the process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use izaj_core::{Notification, NotificationId, NotificationStats, Principal};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::{
    AuthGateway, Credentials, GatewayError, NotificationFilter, NotificationGateway,
    OAuthProvider, ProfilePictureUpload, ProfileUpdate, RegisterRequest,
};

/// `{success, data, error}` envelope used by the notification API.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<Option<T>, GatewayError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(GatewayError::Rejected(
                self.error.unwrap_or_else(|| "request failed".to_string()),
            ))
        }
    }

    fn into_data(self) -> Result<T, GatewayError> {
        self.into_result()?
            .ok_or_else(|| GatewayError::Decode("response is missing data".to_string()))
    }
}

/// `{user}` | `{error}` shape used by the auth API.
#[derive(Debug, Deserialize)]
struct UserResponse {
    #[serde(default)]
    user: Option<Principal>,
    #[serde(default)]
    error: Option<String>,
}

impl UserResponse {
    fn into_principal(self) -> Result<Principal, GatewayError> {
        match (self.user, self.error) {
            (Some(user), _) => Ok(user),
            (None, Some(error)) => Err(GatewayError::Rejected(error)),
            (None, None) => Err(GatewayError::Decode("response is missing user".to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    profile_picture_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

struct Inner {
    client: reqwest::Client,
    cookies: Arc<Jar>,
    base_url: Url,
}

/// Gateway speaking the storefront's JSON API.
#[derive(Clone)]
pub struct HttpGateway {
    inner: Arc<Inner>,
}

impl HttpGateway {
    /// Create a gateway rooted at `base_url` (e.g. `https://izaj.ph/api`).
    ///
    /// # Errors
    ///
    /// Returns error if the URL cannot carry paths or the HTTP client fails
    /// to build.
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, GatewayError> {
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidUrl(base_url.to_string()));
        }

        let cookies = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .timeout(timeout)
            .user_agent(concat!("izaj-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                cookies,
                base_url: base_url.clone(),
            }),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::InvalidUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn client(&self) -> &reqwest::Client {
        &self.inner.client
    }
}

/// Turn a non-success response into [`GatewayError::Status`].
async fn check(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .error
        .or(body.message)
        .filter(|m| !m.is_empty())
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    Err(GatewayError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let bytes = check(response).await?.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode(e.to_string()))
}

#[async_trait]
impl AuthGateway for HttpGateway {
    #[instrument(skip(self))]
    async fn current_session(&self) -> Result<Option<Principal>, GatewayError> {
        let response = self
            .client()
            .get(self.endpoint(&["auth", "me"])?)
            .send()
            .await?;

        // An expired cookie is a miss, not a failure.
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Remote session probe returned 401");
            return Ok(None);
        }

        let body: UserResponse = decode(response).await?;
        Ok(body.user)
    }

    #[instrument(skip(self, credentials), fields(identifier = %credentials.identifier))]
    async fn login(&self, credentials: &Credentials) -> Result<Principal, GatewayError> {
        let body = serde_json::json!({
            "identifier": credentials.identifier,
            "password": credentials.password.expose_secret(),
            "rememberMe": credentials.remember_me,
        });

        let response = self
            .client()
            .post(self.endpoint(&["auth", "login"])?)
            .json(&body)
            .send()
            .await?;

        decode::<UserResponse>(response).await?.into_principal()
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> Result<(), GatewayError> {
        let response = self
            .client()
            .post(self.endpoint(&["auth", "logout"])?)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn signup(&self, request: &RegisterRequest) -> Result<Principal, GatewayError> {
        let mut body = serde_json::json!({
            "email": request.email,
            "password": request.password.expose_secret(),
            "name": request.full_name(),
        });
        if let Some(phone) = request.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            body["phone"] = serde_json::Value::String(phone.trim().to_string());
        }
        if let Some(address) = &request.address {
            body["address"] = serde_json::to_value(address)
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
        }

        let response = self
            .client()
            .post(self.endpoint(&["auth", "signup"])?)
            .json(&body)
            .send()
            .await?;

        decode::<UserResponse>(response).await?.into_principal()
    }

    #[instrument(skip(self, update))]
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), GatewayError> {
        let response = self
            .client()
            .put(self.endpoint(&["profile"])?)
            .json(update)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, size = upload.size()))]
    async fn upload_profile_picture(
        &self,
        upload: &ProfilePictureUpload,
    ) -> Result<String, GatewayError> {
        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)?;
        let form = Form::new().part("profilePicture", part);

        let response = self
            .client()
            .post(self.endpoint(&["profile", "upload-picture"])?)
            .multipart(form)
            .send()
            .await?;

        let body: UploadResponse = decode(response).await?;
        Ok(body.profile_picture_url)
    }

    #[instrument(skip(self))]
    async fn remove_profile_picture(&self) -> Result<(), GatewayError> {
        let response = self
            .client()
            .delete(self.endpoint(&["profile", "upload-picture"])?)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    fn oauth_redirect_url(&self, provider: OAuthProvider) -> Result<Url, GatewayError> {
        let mut url = self.endpoint(&["auth", "oauth"])?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str());
        Ok(url)
    }

    /// The `Cookie` header the jar would send to the API.
    fn session_token(&self) -> Option<SecretString> {
        let header = self.inner.cookies.cookies(&self.inner.base_url)?;
        let value = header.to_str().ok()?.trim();
        (!value.is_empty()).then(|| SecretString::from(value))
    }

    fn restore_session_token(&self, token: &SecretString) {
        let pairs = token
            .expose_secret()
            .split(';')
            .map(str::trim)
            .filter(|pair| pair.contains('='));
        let mut restored = 0_usize;
        for pair in pairs {
            self.inner.cookies.add_cookie_str(pair, &self.inner.base_url);
            restored += 1;
        }
        debug!(restored, "Restored session cookies");
    }
}

#[async_trait]
impl NotificationGateway for HttpGateway {
    #[instrument(skip(self))]
    async fn list(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, GatewayError> {
        let mut url = self.endpoint(&["notifications"])?;
        let pairs = filter.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        let response = self.client().get(url).send().await?;
        let envelope: Envelope<Vec<Notification>> = decode(response).await?;
        envelope.into_data()
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> Result<NotificationStats, GatewayError> {
        let response = self
            .client()
            .get(self.endpoint(&["notifications", "stats"])?)
            .send()
            .await?;
        let envelope: Envelope<NotificationStats> = decode(response).await?;
        Ok(envelope.into_data()?.with_all_kinds())
    }

    #[instrument(skip(self, id), fields(id = %id))]
    async fn set_read(
        &self,
        id: &NotificationId,
        is_read: bool,
    ) -> Result<Notification, GatewayError> {
        let response = self
            .client()
            .put(self.endpoint(&["notifications", id.as_str()])?)
            .json(&serde_json::json!({ "is_read": is_read }))
            .send()
            .await?;
        let envelope: Envelope<Notification> = decode(response).await?;
        envelope.into_data()
    }

    #[instrument(skip(self))]
    async fn mark_all_read(&self) -> Result<Vec<Notification>, GatewayError> {
        let response = self
            .client()
            .put(self.endpoint(&["notifications", "mark-all-read"])?)
            .send()
            .await?;
        let envelope: Envelope<Vec<Notification>> = decode(response).await?;
        Ok(envelope.into_result()?.unwrap_or_default())
    }

    #[instrument(skip(self, id), fields(id = %id))]
    async fn delete(&self, id: &NotificationId) -> Result<(), GatewayError> {
        let response = self
            .client()
            .delete(self.endpoint(&["notifications", id.as_str()])?)
            .send()
            .await?;
        let envelope: Envelope<serde_json::Value> = decode(response).await?;
        envelope.into_result()?;
        Ok(())
    }
}
