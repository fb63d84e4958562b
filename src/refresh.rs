use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{error::AppError, preferences::AppPreferences, repository::MovieRepository};

#[derive(Clone, Debug)]
pub enum RefreshState {
    Idle,
    Loading,
    Success,
    Error(Arc<AppError>),
}

impl RefreshState {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success | Self::Error(_))
    }
}

/// Wire form of [`RefreshState`].
#[derive(Debug, Serialize)]
pub struct RefreshStatus {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub retryable: bool,
}

impl From<&RefreshState> for RefreshStatus {
    fn from(state: &RefreshState) -> Self {
        let (name, message, retryable) = match state {
            RefreshState::Idle => ("idle", None, false),
            RefreshState::Loading => ("loading", None, false),
            RefreshState::Success => ("success", None, false),
            RefreshState::Error(err) => ("error", Some(err.user_message()), true),
        };
        Self { state: name, message, retryable }
    }
}

/// Drives the first catalog load: skip it when a previous run already stored
/// the catalog, otherwise refresh in the background with at most one refresh
/// in flight.
pub struct RefreshController {
    repository: Arc<dyn MovieRepository>,
    preferences: AppPreferences,
    state: Arc<watch::Sender<RefreshState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshController {
    pub fn new(repository: Arc<dyn MovieRepository>, preferences: AppPreferences) -> Self {
        let (tx, _) = watch::channel(RefreshState::Idle);
        Self { repository, preferences, state: Arc::new(tx), task: Mutex::new(None) }
    }

    pub fn state(&self) -> RefreshState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.state.subscribe()
    }

    /// Returns whether a refresh is needed. A stored catalog moves straight
    /// to `Success`.
    pub async fn decide(&self) -> bool {
        if self.preferences.is_catalog_stored().await {
            debug!("movie catalog already stored");
            self.state.send_replace(RefreshState::Success);
            return false;
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts a background refresh. Returns false, changing nothing, while a
    /// previous one is still running.
    pub fn start(&self) -> bool {
        let mut task = self.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("refresh already in flight");
            return false;
        }

        self.state.send_replace(RefreshState::Loading);
        let repository = self.repository.clone();
        let preferences = self.preferences.clone();
        let state = self.state.clone();

        *task = Some(tokio::spawn(async move {
            let next = match repository.refresh_from_remote().await {
                Ok(movies) => {
                    if let Err(err) = preferences.set_catalog_stored().await {
                        warn!(error = %err, "failed to mark movie catalog as stored");
                    }
                    info!(movies = movies.len(), "movie catalog ready");
                    RefreshState::Success
                }
                Err(err) => RefreshState::Error(Arc::new(err)),
            };
            state.send_replace(next);
        }));
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        error::AppResult,
        models::{Movie, sample_movie},
        remote::MovieRemoteDataSource,
        repository::tests::{FakeRemote, repository},
    };

    async fn controller(remote: Arc<dyn MovieRemoteDataSource>) -> (RefreshController, AppPreferences) {
        let (repo, store) = repository(remote).await;
        let preferences = AppPreferences::new(store.db().clone());
        (RefreshController::new(Arc::new(repo), preferences.clone()), preferences)
    }

    async fn settled(controller: &RefreshController) -> RefreshState {
        let mut rx = controller.subscribe();
        let state = rx.wait_for(RefreshState::is_settled).await.unwrap().clone();
        while controller.is_running() {
            tokio::task::yield_now().await;
        }
        state
    }

    /// Holds every fetch until released.
    #[derive(Default)]
    struct GatedRemote {
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MovieRemoteDataSource for GatedRemote {
        async fn retrieve_movie_data(&self) -> AppResult<Vec<Movie>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(vec![sample_movie(1, 2020)])
        }
    }

    #[tokio::test]
    async fn starts_idle_and_refreshes_when_nothing_is_stored() {
        let remote = Arc::new(FakeRemote::default());
        remote.push(Ok(vec![sample_movie(1, 2020)]));
        let (controller, preferences) = controller(remote).await;

        assert!(matches!(controller.state(), RefreshState::Idle));
        assert!(controller.decide().await);
        assert!(controller.start());

        assert!(matches!(settled(&controller).await, RefreshState::Success));
        assert!(preferences.is_catalog_stored().await);
    }

    #[tokio::test]
    async fn stored_catalog_skips_the_fetch() {
        let remote = Arc::new(FakeRemote::default());
        let (controller, preferences) = controller(remote).await;
        preferences.set_catalog_stored().await.unwrap();

        assert!(!controller.decide().await);
        assert!(matches!(controller.state(), RefreshState::Success));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn failure_is_retryable() {
        let remote = Arc::new(FakeRemote::default());
        remote.push(Err(AppError::ServiceUnavailable { service: "fake", status: Some(503) }));
        remote.push(Ok(vec![sample_movie(1, 2020)]));
        let (controller, preferences) = controller(remote).await;

        assert!(controller.start());
        let RefreshState::Error(err) = settled(&controller).await else {
            panic!("expected an error state");
        };
        assert!(err.is_retryable());
        assert!(!preferences.is_catalog_stored().await);

        // Error is not terminal.
        assert!(controller.start());
        assert!(matches!(settled(&controller).await, RefreshState::Success));
        assert!(preferences.is_catalog_stored().await);
    }

    #[tokio::test]
    async fn concurrent_start_is_suppressed() {
        let remote = Arc::new(GatedRemote::default());
        let (controller, _) = controller(remote.clone()).await;

        assert!(controller.start());
        assert!(!controller.start());
        assert!(controller.is_running());
        assert!(matches!(controller.state(), RefreshState::Loading));

        remote.release.notify_one();
        assert!(matches!(settled(&controller).await, RefreshState::Success));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_status_carries_a_user_message() {
        let state = RefreshState::Error(Arc::new(AppError::ServiceUnavailable {
            service: "movie catalog",
            status: Some(429),
        }));
        let status = RefreshStatus::from(&state);
        assert_eq!(status.state, "error");
        assert!(status.retryable);
        assert!(status.message.is_some());
    }
}
