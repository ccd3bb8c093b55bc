//! Source of the bearer credential used for the push-channel handshake and
//! REST calls.

use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::error::Result;

/// Supplies the current bearer token, if any.
///
/// `Ok(None)` and `Err(_)` are both non-fatal for the push channel: the
/// connection manager logs and falls back to cookie auth.
pub trait SessionProvider: Send + Sync + 'static {
    fn bearer_token(&self) -> BoxFuture<'_, Result<Option<String>>>;
}

/// A token held in memory, replaceable at runtime (e.g. after refresh).
#[derive(Debug, Default)]
pub struct StaticSession {
    token: RwLock<Option<String>>,
}

impl StaticSession {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}

impl SessionProvider for StaticSession {
    fn bearer_token(&self) -> BoxFuture<'_, Result<Option<String>>> {
        let token = self.token.read().clone();
        Box::pin(async move { Ok(token) })
    }
}
