use std::path::{Path, PathBuf};

use chrono::{TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::{
    aws::AwsCredentials,
    error::{Error, Result},
    state::State,
    vault::SecretEngine,
};

/// Serves credentials from the state cache, asking Vault only when the cached
/// entry is missing or about to expire.
pub struct Session<E> {
    engine: E,
    state: State,
    state_path: PathBuf,
    renewal_margin: TimeDelta,
}

impl<E> Session<E> {
    /// Load the state file at `state_path` and wrap `engine`
    pub async fn open(engine: E, state_path: impl Into<PathBuf>) -> Result<Self> {
        let state_path = state_path.into();
        let state = State::read(&state_path).await?;
        Ok(Self::with_state(engine, state, state_path))
    }

    pub fn with_state(engine: E, state: State, state_path: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            state,
            state_path: state_path.into(),
            renewal_margin: TimeDelta::zero(),
        }
    }

    /// Refresh cached credentials expiring within `margin`
    #[must_use]
    pub fn with_renewal_margin(mut self, margin: TimeDelta) -> Self {
        self.renewal_margin = margin.max(TimeDelta::zero());
        self
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Make `engine`/`role` the current selection without fetching anything
    pub async fn select(&mut self, engine: &str, role: &str) -> Result<()> {
        require_engine_and_role(engine, role)?;

        let current = self.state.current();
        if current.engine == engine && current.role == role {
            debug!("{}/{} already selected", engine, role);
            return Ok(());
        }

        let mut next = self.state.clone();
        next.set_current_engine(engine);
        next.set_current_role(role);
        next.write(&self.state_path).await?;
        self.state = next;
        Ok(())
    }

    pub fn list_cached_engines(&self) -> Vec<&str> {
        self.state.list_cached_engines()
    }

    pub fn list_cached_roles(&self, engine: &str) -> Vec<&str> {
        self.state.list_cached_engine_roles(engine)
    }
}

impl<E: SecretEngine> Session<E> {
    /// Valid credentials for `engine`/`role`, which also becomes the current selection
    pub async fn credentials(&mut self, engine: &str, role: &str) -> Result<AwsCredentials> {
        require_engine_and_role(engine, role)?;

        if let Some(cached) = self.state.get_aws_credentials(engine, role) {
            if cached.is_valid_at(Utc::now(), self.renewal_margin) {
                info!("Using cached credentials for {}/{}", engine, role);
                let cached = cached.clone();
                // The cached credentials stay usable even if the selection cannot be saved.
                if let Err(e) = self.select(engine, role).await {
                    warn!("Failed to save {}/{} as the current selection: {}", engine, role, e);
                }
                return Ok(cached);
            }
            info!("Cached credentials for {}/{} expired, refreshing", engine, role);
        } else {
            info!("No cached credentials for {}/{}, requesting from Vault", engine, role);
        }

        let creds = self.engine.generate_aws_credentials(engine, role).await?;

        // Stage the update so a failed write leaves the in-memory cache untouched too.
        let mut next = self.state.clone();
        next.set_aws_credentials(engine, role, creds.clone())?;
        next.set_current_engine(engine);
        next.set_current_role(role);
        next.write(&self.state_path).await?;
        self.state = next;

        Ok(creds)
    }

    /// Valid credentials for the current selection
    pub async fn current_credentials(&mut self) -> Result<AwsCredentials> {
        let current = self.state.current().clone();
        if !current.is_complete() {
            return Err(Error::Configuration(
                "No engine and role selected yet; pass them explicitly or run `vac use ENGINE ROLE`"
                    .to_string(),
            ));
        }
        self.credentials(&current.engine, &current.role).await
    }

    /// AWS engines currently mounted in Vault, sorted
    pub async fn list_engines(&self) -> Result<Vec<String>> {
        let mut engines = self.engine.list_aws_engines().await?;
        engines.sort();
        Ok(engines)
    }

    /// Roles Vault knows under `engine`, sorted
    pub async fn list_roles(&self, engine: &str) -> Result<Vec<String>> {
        let mut roles = self.engine.list_aws_engine_roles(engine).await?;
        roles.sort();
        Ok(roles)
    }
}

fn require_engine_and_role(engine: &str, role: &str) -> Result<()> {
    if engine.is_empty() || role.is_empty() {
        return Err(Error::Configuration(format!(
            "Both an engine and a role are required (engine: '{engine}', role: '{role}')"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aws::CredentialsMetadata, error::ErrorKind};
    use async_trait::async_trait;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    /// Fake Vault answering from a queue of canned STS results
    #[derive(Default)]
    struct FakeEngine {
        issued: Mutex<Vec<Result<AwsCredentials>>>,
        calls: AtomicUsize,
    }

    impl FakeEngine {
        fn issuing(results: Vec<Result<AwsCredentials>>) -> Self {
            Self {
                issued: Mutex::new(results),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SecretEngine for FakeEngine {
        async fn list_aws_engines(&self) -> Result<Vec<String>> {
            Ok(vec!["aws-prod".to_string(), "aws-dev".to_string()])
        }

        async fn list_aws_engine_roles(&self, _engine: &str) -> Result<Vec<String>> {
            Ok(vec!["writer".to_string(), "reader".to_string()])
        }

        async fn generate_aws_credentials(&self, _engine: &str, _role: &str) -> Result<AwsCredentials> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.issued.lock().unwrap().remove(0)
        }
    }

    fn creds_expiring_in(key: &str, secs: i64) -> AwsCredentials {
        let now = Utc::now();
        let created_at = now - TimeDelta::hours(1);
        let lease = (now + TimeDelta::seconds(secs)) - created_at;
        let metadata = CredentialsMetadata::for_lease(created_at, lease).unwrap();
        AwsCredentials::new(key, "SK", "ST", metadata)
    }

    fn fresh(key: &str) -> AwsCredentials {
        let metadata = CredentialsMetadata::for_lease(Utc::now(), TimeDelta::hours(1)).unwrap();
        AwsCredentials::new(key, "SK", "ST", metadata)
    }

    fn formation_error() -> Error {
        Error::CredentialFormation {
            engine: "aws-dev".to_string(),
            role: "reader".to_string(),
            reason: "response has no lease_duration".to_string(),
            partial: Box::new(fresh("PARTIAL")),
        }
    }

    #[tokio::test]
    async fn test_fresh_issue_is_cached_and_selected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let fake = FakeEngine::issuing(vec![Ok(fresh("AKIA1"))]);

        let mut session = Session::open(fake, &path).await.unwrap();
        let creds = session.credentials("aws-dev", "reader").await.unwrap();
        assert_eq!(creds.access_key_id(), "AKIA1");
        assert_eq!(session.engine.calls(), 1);

        let on_disk = State::read(&path).await.unwrap();
        assert_eq!(on_disk.current().engine, "aws-dev");
        assert_eq!(on_disk.current().role, "reader");
        assert_eq!(on_disk.get_current_aws_credentials(), Some(&creds));
    }

    #[tokio::test]
    async fn test_cache_hit_makes_no_remote_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = State::default();
        state.set_aws_credentials("aws-dev", "reader", creds_expiring_in("CACHED", 3600)).unwrap();
        state.write(&path).await.unwrap();

        let fake = FakeEngine::default();
        let mut session = Session::open(fake, &path).await.unwrap();
        let creds = session.credentials("aws-dev", "reader").await.unwrap();

        assert_eq!(creds.access_key_id(), "CACHED");
        assert_eq!(session.engine.calls(), 0);
        assert_eq!(session.state().current().engine, "aws-dev");
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = State::default();
        state.set_aws_credentials("aws-dev", "reader", creds_expiring_in("OLD", -10)).unwrap();

        let fake = FakeEngine::issuing(vec![Ok(fresh("NEW"))]);
        let mut session = Session::with_state(fake, state, &path);
        let creds = session.credentials("aws-dev", "reader").await.unwrap();

        assert_eq!(creds.access_key_id(), "NEW");
        assert_eq!(session.engine.calls(), 1);
        let on_disk = State::read(&path).await.unwrap();
        assert_eq!(
            on_disk.get_aws_credentials("aws-dev", "reader").map(AwsCredentials::access_key_id),
            Some("NEW")
        );
    }

    #[tokio::test]
    async fn test_renewal_margin_forces_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = State::default();
        state.set_aws_credentials("aws-dev", "reader", creds_expiring_in("SOON", 30)).unwrap();

        let fake = FakeEngine::issuing(vec![Ok(fresh("NEW"))]);
        let mut session = Session::with_state(fake, state, dir.path().join("state.json"))
            .with_renewal_margin(TimeDelta::seconds(60));
        let creds = session.credentials("aws-dev", "reader").await.unwrap();
        assert_eq!(creds.access_key_id(), "NEW");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = State::default();
        state.set_current_engine("aws-prod");
        state.set_current_role("admin");
        state.set_aws_credentials("aws-dev", "reader", creds_expiring_in("OLD", -10)).unwrap();
        state.write(&path).await.unwrap();

        let fake = FakeEngine::issuing(vec![Err(formation_error())]);
        let mut session = Session::open(fake, &path).await.unwrap();
        let err = session.credentials("aws-dev", "reader").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialFormation);

        for state in [session.state().clone(), State::read(&path).await.unwrap()] {
            assert_eq!(
                state.get_aws_credentials("aws-dev", "reader").map(AwsCredentials::access_key_id),
                Some("OLD")
            );
            assert_eq!(state.current().engine, "aws-prod");
        }
    }

    #[tokio::test]
    async fn test_current_credentials_requires_selection() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeEngine::default();
        let mut session = Session::open(fake, dir.path().join("state.json")).await.unwrap();

        let err = session.current_credentials().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!dir.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn test_current_credentials_uses_selection() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeEngine::issuing(vec![Ok(fresh("AKIA1"))]);
        let mut session = Session::open(fake, dir.path().join("state.json")).await.unwrap();

        session.select("aws-dev", "reader").await.unwrap();
        let creds = session.current_credentials().await.unwrap();
        assert_eq!(creds.access_key_id(), "AKIA1");
        assert_eq!(session.list_cached_engines(), vec!["aws-dev"]);
        assert_eq!(session.list_cached_roles("aws-dev"), vec!["reader"]);
    }

    #[tokio::test]
    async fn test_select_persists_without_caching() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let fake = FakeEngine::default();
        let mut session = Session::open(fake, &path).await.unwrap();

        session.select("aws-dev", "reader").await.unwrap();
        let on_disk = State::read(&path).await.unwrap();
        assert_eq!(on_disk.current().role, "reader");
        assert!(on_disk.list_cached_engines().is_empty());
        assert_eq!(session.engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_listings_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeEngine::default();
        let session = Session::open(fake, dir.path().join("state.json")).await.unwrap();

        assert_eq!(session.list_engines().await.unwrap(), vec!["aws-dev", "aws-prod"]);
        assert_eq!(session.list_roles("aws-dev").await.unwrap(), vec!["reader", "writer"]);
        assert!(session.list_cached_engines().is_empty());
    }

    #[tokio::test]
    async fn test_empty_engine_or_role_is_rejected_before_vault() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let fake = FakeEngine::issuing(vec![Ok(fresh("AKIA1"))]);
        let mut session = Session::open(fake, &path).await.unwrap();

        for (engine, role) in [("aws-dev", ""), ("", "reader"), ("", "")] {
            let err = session.credentials(engine, role).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
            let err = session.select(engine, role).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
        assert_eq!(session.engine.calls(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cache_hit_survives_unwritable_state() {
        let dir = tempfile::tempdir().unwrap();
        // Parent directory does not exist, so any write fails.
        let path = dir.path().join("missing").join("state.json");
        let mut state = State::default();
        state.set_current_engine("aws-prod");
        state.set_current_role("admin");
        state.set_aws_credentials("aws-dev", "reader", creds_expiring_in("CACHED", 3600)).unwrap();

        let fake = FakeEngine::default();
        let mut session = Session::with_state(fake, state, &path);
        assert_eq!(
            session.select("aws-dev", "reader").await.unwrap_err().kind(),
            ErrorKind::Io
        );

        let creds = session.credentials("aws-dev", "reader").await.unwrap();
        assert_eq!(creds.access_key_id(), "CACHED");
        assert_eq!(session.engine.calls(), 0);
        assert_eq!(session.state().current().engine, "aws-prod");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_select_without_remote_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut session = Session::open((), &path).await.unwrap();

        session.select("aws-dev", "reader").await.unwrap();
        let on_disk = State::read(&path).await.unwrap();
        assert_eq!(on_disk.current().engine, "aws-dev");
        assert_eq!(on_disk.current().role, "reader");
    }
}
