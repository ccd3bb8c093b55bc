//! User settings with optimistic edits.
//!
//! Each update touches one section of [`UserSettings`]. The section is
//! replaced locally right away, then by the server's normalized answer, or
//! restored when the server refuses. Before `load()` succeeds every update
//! is a no-op.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::{ApiClient, ApiResult};
use crate::models::{
    DisplayPreferences, DisplayPreferencesPatch, NotificationPreferences,
    NotificationPreferencesPatch, ProfilePatch, ProfileSettings, UserSettings,
};
use crate::optimistic::{OptimisticSlot, optimistic_update};

#[derive(Default)]
struct SettingsState {
    settings: Option<UserSettings>,
    loading: bool,
    /// Section writes in flight.
    saving: usize,
    error: Option<String>,
}

#[derive(Clone)]
pub struct SettingsStore {
    api: Arc<dyn ApiClient>,
    state: Arc<Mutex<SettingsState>>,
}

impl SettingsStore {
    pub fn new(api: Arc<dyn ApiClient>) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(SettingsState::default())),
        }
    }

    pub async fn load(&self) -> ApiResult<UserSettings> {
        {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
        }
        let result = self.api.get_user_settings().await;

        let mut state = self.state.lock();
        state.loading = false;
        match &result {
            Ok(settings) => state.settings = Some(settings.clone()),
            Err(e) => {
                tracing::warn!(error = %e, "Loading settings failed");
                state.error = Some(e.to_string());
            }
        }
        result
    }

    pub async fn update_notification_preferences(
        &self,
        patch: NotificationPreferencesPatch,
    ) -> ApiResult<Option<NotificationPreferences>> {
        let api = self.api.clone();
        let slot = Section {
            state: &self.state,
            get: |s| &s.notification_preferences,
            set: |s, v| s.notification_preferences = v,
        };
        optimistic_update(
            &slot,
            patch,
            NotificationPreferences::merged,
            move |patch, _| async move { api.update_notification_preferences(&patch).await },
        )
        .await
    }

    pub async fn update_display_preferences(
        &self,
        patch: DisplayPreferencesPatch,
    ) -> ApiResult<Option<DisplayPreferences>> {
        let api = self.api.clone();
        let slot = Section {
            state: &self.state,
            get: |s| &s.display,
            set: |s, v| s.display = v,
        };
        optimistic_update(
            &slot,
            patch,
            DisplayPreferences::merged,
            move |patch, _| async move { api.update_display_preferences(&patch).await },
        )
        .await
    }

    pub async fn update_profile(&self, patch: ProfilePatch) -> ApiResult<Option<ProfileSettings>> {
        let api = self.api.clone();
        let slot = Section {
            state: &self.state,
            get: |s| &s.profile,
            set: |s, v| s.profile = v,
        };
        optimistic_update(
            &slot,
            patch,
            ProfileSettings::merged,
            move |patch, _| async move { api.update_profile(&patch).await },
        )
        .await
    }

    pub fn settings(&self) -> Option<UserSettings> {
        self.state.lock().settings.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn is_saving(&self) -> bool {
        self.state.lock().saving > 0
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn clear(&self) {
        *self.state.lock() = SettingsState::default();
    }
}

/// One section of the loaded settings.
struct Section<'a, T> {
    state: &'a Mutex<SettingsState>,
    get: fn(&UserSettings) -> &T,
    set: fn(&mut UserSettings, T),
}

impl<T: Clone + Send + Sync> OptimisticSlot<T> for Section<'_, T> {
    fn snapshot(&self) -> Option<T> {
        self.state.lock().settings.as_ref().map(|s| (self.get)(s).clone())
    }

    fn replace(&self, value: T) {
        if let Some(settings) = self.state.lock().settings.as_mut() {
            (self.set)(settings, value);
        }
    }

    fn begin(&self) {
        let mut state = self.state.lock();
        state.saving += 1;
        state.error = None;
    }

    fn finish(&self, error: Option<String>) {
        let mut state = self.state.lock();
        state.saving = state.saving.saturating_sub(1);
        if error.is_some() {
            state.error = error;
        }
    }
}
