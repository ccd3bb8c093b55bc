//! REST collaborator consumed by the stores.
//!
//! [`ApiClient`] is the seam: stores only see the trait, [`HttpApiClient`]
//! implements it over reqwest. Response bodies are the resource itself, with
//! no envelope. Any non-2xx answer becomes an [`ApiError`] carrying the
//! status, so callers can tell 404 ("absent") from real failures.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::ApiError;
use crate::models::{
    DisplayPreferences, DisplayPreferencesPatch, Document, Notification, NotificationPreferences,
    NotificationPreferencesPatch, ProfilePatch, ProfileSettings, ReportPatch, Transaction,
    TransactionReport, UserSettings,
};
use crate::session::SessionProvider;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub trait ApiClient: Send + Sync + 'static {
    fn get_transaction_report<'a>(
        &'a self,
        transaction_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<TransactionReport>>;

    fn update_transaction_report<'a>(
        &'a self,
        transaction_id: &'a str,
        patch: &'a ReportPatch,
    ) -> BoxFuture<'a, ApiResult<TransactionReport>>;

    fn get_transaction<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ApiResult<Transaction>>;

    fn get_document<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ApiResult<Document>>;

    fn list_notifications(&self) -> BoxFuture<'_, ApiResult<Vec<Notification>>>;

    fn mark_notification_read<'a>(&'a self, id: &'a str)
    -> BoxFuture<'a, ApiResult<Notification>>;

    fn mark_all_notifications_read(&self) -> BoxFuture<'_, ApiResult<()>>;

    fn get_user_settings(&self) -> BoxFuture<'_, ApiResult<UserSettings>>;

    fn update_profile<'a>(
        &'a self,
        patch: &'a ProfilePatch,
    ) -> BoxFuture<'a, ApiResult<ProfileSettings>>;

    fn update_notification_preferences<'a>(
        &'a self,
        patch: &'a NotificationPreferencesPatch,
    ) -> BoxFuture<'a, ApiResult<NotificationPreferences>>;

    fn update_display_preferences<'a>(
        &'a self,
        patch: &'a DisplayPreferencesPatch,
    ) -> BoxFuture<'a, ApiResult<DisplayPreferences>>;
}

/// [`ApiClient`] over HTTP.
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<dyn SessionProvider>,
}

impl HttpApiClient {
    pub fn new(base_url: &str, session: Arc<dyn SessionProvider>) -> ApiResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::new(None, format!("invalid API URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::new(None, format!("API URL {base_url} cannot carry a path")));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            session,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Issue one call and check the status; the body is left unread.
    async fn send<B>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> ApiResult<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments);
        let mut req = self.http.request(method.clone(), url.clone());
        match self.session.bearer_token().await {
            Ok(Some(token)) => req = req.bearer_auth(token),
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "No bearer token for API call"),
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::debug!(%method, %url, status = status.as_u16(), "API call failed");
            return Err(ApiError::new(Some(status.as_u16()), text));
        }
        Ok(resp)
    }

    async fn request<B, T>(&self, method: Method, segments: &[&str], body: Option<&B>) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.send(method, segments, body).await?;
        let url = resp.url().clone();
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::new(None, format!("bad response body from {url}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ApiResult<T> {
        self.request::<(), T>(Method::GET, segments, None).await
    }
}

impl ApiClient for HttpApiClient {
    fn get_transaction_report<'a>(
        &'a self,
        transaction_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<TransactionReport>> {
        Box::pin(async move { self.get(&["transactions", transaction_id, "report"]).await })
    }

    fn update_transaction_report<'a>(
        &'a self,
        transaction_id: &'a str,
        patch: &'a ReportPatch,
    ) -> BoxFuture<'a, ApiResult<TransactionReport>> {
        Box::pin(async move {
            self.request(
                Method::PATCH,
                &["transactions", transaction_id, "report"],
                Some(patch),
            )
            .await
        })
    }

    fn get_transaction<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ApiResult<Transaction>> {
        Box::pin(async move { self.get(&["transactions", id]).await })
    }

    fn get_document<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ApiResult<Document>> {
        Box::pin(async move { self.get(&["documents", id]).await })
    }

    fn list_notifications(&self) -> BoxFuture<'_, ApiResult<Vec<Notification>>> {
        Box::pin(async move { self.get(&["notifications"]).await })
    }

    fn mark_notification_read<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, ApiResult<Notification>> {
        Box::pin(async move {
            self.request::<(), _>(Method::POST, &["notifications", id, "read"], None)
                .await
        })
    }

    fn mark_all_notifications_read(&self) -> BoxFuture<'_, ApiResult<()>> {
        Box::pin(async move {
            self.send::<()>(Method::POST, &["notifications", "read-all"], None)
                .await
                .map(|_| ())
        })
    }

    fn get_user_settings(&self) -> BoxFuture<'_, ApiResult<UserSettings>> {
        Box::pin(async move { self.get(&["users", "me", "settings"]).await })
    }

    fn update_profile<'a>(
        &'a self,
        patch: &'a ProfilePatch,
    ) -> BoxFuture<'a, ApiResult<ProfileSettings>> {
        Box::pin(async move {
            self.request(Method::PATCH, &["users", "me", "settings", "profile"], Some(patch))
                .await
        })
    }

    fn update_notification_preferences<'a>(
        &'a self,
        patch: &'a NotificationPreferencesPatch,
    ) -> BoxFuture<'a, ApiResult<NotificationPreferences>> {
        Box::pin(async move {
            self.request(
                Method::PATCH,
                &["users", "me", "settings", "notification-preferences"],
                Some(patch),
            )
            .await
        })
    }

    fn update_display_preferences<'a>(
        &'a self,
        patch: &'a DisplayPreferencesPatch,
    ) -> BoxFuture<'a, ApiResult<DisplayPreferences>> {
        Box::pin(async move {
            self.request(Method::PATCH, &["users", "me", "settings", "display"], Some(patch))
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StaticSession;

    fn client(base: &str) -> HttpApiClient {
        HttpApiClient::new(base, Arc::new(StaticSession::default())).unwrap()
    }

    #[test]
    fn endpoint_appends_encoded_segments() {
        let api = client("https://app.example.com/api/");
        assert_eq!(
            api.endpoint(&["transactions", "txn 1/2", "report"]).as_str(),
            "https://app.example.com/api/transactions/txn%201%2F2/report"
        );
        let api = client("https://app.example.com/api");
        assert_eq!(
            api.endpoint(&["notifications"]).as_str(),
            "https://app.example.com/api/notifications"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        let session: Arc<dyn SessionProvider> = Arc::new(StaticSession::default());
        assert!(HttpApiClient::new("not a url", session.clone()).is_err());
        assert!(HttpApiClient::new("mailto:ops@example.com", session).is_err());
    }
}
