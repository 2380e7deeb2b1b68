use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};

use anyhow::{anyhow, Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use super::session::{Session, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USERNAME_KEY};

/// Keyring service name
const SERVICE_NAME: &str = "sessionkeep";

/// Session file name in the store directory
const SESSION_FILE: &str = "session.json";

/// Durable key/value persistence for the session.
///
/// Backends may fail (locked keychain, read-only disk); [`CredentialStore`]
/// absorbs those failures so callers never see them.
pub trait CredentialBackend: Send + Sync {
    fn load(&self) -> Result<Session>;
    fn save(&self, session: &Session) -> Result<()>;
    fn clear(&self) -> Result<()>;
    /// Short name for log lines
    fn name(&self) -> &'static str;
}

// ============================================================================
// Memory
// ============================================================================

/// Process-local backend. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    session: Mutex<Session>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> Result<Session> {
        let session = self
            .session
            .lock()
            .map_err(|_| anyhow!("Memory credential backend poisoned"))?;
        Ok(session.clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        *self
            .session
            .lock()
            .map_err(|_| anyhow!("Memory credential backend poisoned"))? = session.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.save(&Session::default())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// File
// ============================================================================

/// Stores the session as `session.json` in a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }
}

impl CredentialBackend for FileBackend {
    fn load(&self) -> Result<Session> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(Session::default());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    fn save(&self, session: &Session) -> Result<()> {
        std::fs::create_dir_all(&self.dir).context("Failed to create session directory")?;
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(self.session_path(), contents).context("Failed to write session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to delete session file")?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

// ============================================================================
// Keyring
// ============================================================================

/// Stores each session field as its own entry in the OS keychain.
#[derive(Debug, Clone)]
pub struct KeyringBackend {
    service: String,
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve value from keychain"),
        }
    }

    fn set(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => self
                .entry(key)?
                .set_password(value)
                .context("Failed to store value in keychain"),
            None => self.delete(key),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete value from keychain"),
        }
    }
}

impl CredentialBackend for KeyringBackend {
    fn load(&self) -> Result<Session> {
        Ok(Session {
            access_token: self.get(ACCESS_TOKEN_KEY)?,
            refresh_token: self.get(REFRESH_TOKEN_KEY)?,
            display_name: self.get(USERNAME_KEY)?,
        })
    }

    fn save(&self, session: &Session) -> Result<()> {
        self.set(ACCESS_TOKEN_KEY, session.access_token())?;
        self.set(REFRESH_TOKEN_KEY, session.refresh_token())?;
        self.set(USERNAME_KEY, session.display_name())
    }

    fn clear(&self) -> Result<()> {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USERNAME_KEY] {
            self.delete(key)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "keyring"
    }
}

// ============================================================================
// Store
// ============================================================================

/// The single owner of the session.
///
/// Reads are served from an in-memory mirror; writes update the mirror and
/// then the backend. If the backend fails the store logs it, marks itself
/// degraded and carries on in memory, so the user stays signed in until the
/// process exits. Clone is cheap and every clone shares the same session.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    backend: Box<dyn CredentialBackend>,
    mirror: RwLock<Session>,
    writer: Mutex<()>,
    degraded: AtomicBool,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("backend", &self.inner.backend.name())
            .field("authenticated", &self.load().is_authenticated())
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

impl CredentialStore {
    /// Open a store over `backend`, loading whatever session it holds
    pub fn open(backend: impl CredentialBackend + 'static) -> Self {
        let (session, degraded) = match backend.load() {
            Ok(session) => (session, false),
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "Credential backend unavailable, session kept in memory");
                (Session::default(), true)
            }
        };
        debug!(
            backend = backend.name(),
            authenticated = session.is_authenticated(),
            "Credential store opened"
        );

        Self {
            inner: Arc::new(StoreInner {
                backend: Box::new(backend),
                mirror: RwLock::new(session),
                writer: Mutex::new(()),
                degraded: AtomicBool::new(degraded),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(MemoryBackend::new())
    }

    pub fn load(&self) -> Session {
        self.inner
            .mirror
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn save(&self, session: &Session) {
        let _writer = self.writer();
        *self.mirror_mut() = session.clone();
        self.persist(session);
    }

    /// Remove every session entry. Clearing an empty store is a no-op.
    pub fn clear(&self) {
        let _writer = self.writer();
        *self.mirror_mut() = Session::default();
        if let Err(e) = self.inner.backend.clear() {
            self.mark_degraded(&e);
        }
    }

    /// Replace the access token after exchanging `exchanged_refresh`,
    /// keeping the rest of the session. A rotated refresh token replaces
    /// the stored one.
    ///
    /// Nothing is written unless the store still holds `exchanged_refresh`:
    /// a session cleared or replaced while the exchange ran stays as it is.
    /// Returns whether the update was applied.
    pub fn update_access_token(
        &self,
        exchanged_refresh: &str,
        access_token: String,
        rotated_refresh: Option<String>,
    ) -> bool {
        let _writer = self.writer();
        let session = {
            let mut mirror = self.mirror_mut();
            if mirror.refresh_token.as_deref() != Some(exchanged_refresh) {
                return false;
            }
            mirror.access_token = Some(access_token);
            if let Some(refresh) = rotated_refresh {
                mirror.refresh_token = Some(refresh);
            }
            mirror.clone()
        };
        self.persist(&session);
        true
    }

    pub fn access_token(&self) -> Option<String> {
        self.load().access_token
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.load().refresh_token
    }

    /// True once any backend operation has failed
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::Relaxed)
    }

    // Writers are serialized so the backend sees writes in mirror order.
    // Backend I/O runs outside the mirror lock and never blocks readers.
    fn writer(&self) -> MutexGuard<'_, ()> {
        self.inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mirror_mut(&self) -> RwLockWriteGuard<'_, Session> {
        self.inner
            .mirror
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, session: &Session) {
        if let Err(e) = self.inner.backend.save(session) {
            self.mark_degraded(&e);
        }
    }

    fn mark_degraded(&self, error: &anyhow::Error) {
        warn!(backend = self.inner.backend.name(), error = %error, "Credential backend write failed, session kept in memory");
        self.inner.degraded.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    struct BrokenBackend;

    impl CredentialBackend for BrokenBackend {
        fn load(&self) -> Result<Session> {
            Err(anyhow!("storage disabled"))
        }

        fn save(&self, _session: &Session) -> Result<()> {
            Err(anyhow!("storage disabled"))
        }

        fn clear(&self) -> Result<()> {
            Err(anyhow!("storage disabled"))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    /// Accepts writes after a pause, like a keychain waiting on a prompt
    struct SlowBackend;

    impl CredentialBackend for SlowBackend {
        fn load(&self) -> Result<Session> {
            Ok(Session::default())
        }

        fn save(&self, _session: &Session) -> Result<()> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        }

        fn clear(&self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn alice() -> Session {
        Session::new("access-1".into(), "refresh-1".into(), "alice".into())
    }

    #[test]
    fn test_memory_store_save_then_load() {
        let store = CredentialStore::in_memory();
        store.save(&alice());
        assert_eq!(store.load(), alice());
        assert!(!store.is_degraded());
    }

    #[test]
    fn test_file_backend_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("nested"));
        backend.save(&alice()).unwrap();
        assert_eq!(backend.load().unwrap(), alice());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        CredentialStore::open(FileBackend::new(dir.path().to_path_buf())).save(&alice());

        let reopened = CredentialStore::open(FileBackend::new(dir.path().to_path_buf()));
        assert_eq!(reopened.load(), alice());
    }

    #[test]
    fn test_file_backend_missing_file_is_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        assert!(backend.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_backend_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        backend.save(&alice()).unwrap();
        backend.clear().unwrap();
        backend.clear().unwrap();
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_broken_backend_degrades_to_memory() {
        let store = CredentialStore::open(BrokenBackend);
        assert!(store.is_degraded());
        assert!(store.load().is_empty());

        store.save(&alice());
        assert_eq!(store.load(), alice());

        store.clear();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_update_access_token_keeps_refresh_token() {
        let store = CredentialStore::in_memory();
        store.save(&alice());
        assert!(store.update_access_token("refresh-1", "access-2".into(), None));

        let session = store.load();
        assert_eq!(session.access_token(), Some("access-2"));
        assert_eq!(session.refresh_token(), Some("refresh-1"));
        assert_eq!(session.display_name(), Some("alice"));
    }

    #[test]
    fn test_update_access_token_with_rotation() {
        let store = CredentialStore::in_memory();
        store.save(&alice());
        assert!(store.update_access_token(
            "refresh-1",
            "access-2".into(),
            Some("refresh-2".into())
        ));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-2"));
    }

    #[test]
    fn test_update_access_token_skips_cleared_store() {
        let store = CredentialStore::in_memory();
        store.save(&alice());
        store.clear();

        assert!(!store.update_access_token("refresh-1", "access-2".into(), None));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_update_access_token_skips_replaced_session() {
        let store = CredentialStore::in_memory();
        store.save(&alice());
        let bob = Session::new("bob-a".into(), "bob-r".into(), "bob".into());
        store.save(&bob);

        assert!(!store.update_access_token("refresh-1", "access-2".into(), None));
        assert_eq!(store.load(), bob);
    }

    #[test]
    fn test_reads_do_not_wait_for_backend_writes() {
        let store = CredentialStore::open(SlowBackend);
        let writer = std::thread::spawn({
            let store = store.clone();
            move || store.save(&alice())
        });

        std::thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        assert_eq!(store.access_token().as_deref(), Some("access-1"));
        assert!(started.elapsed() < Duration::from_millis(200));

        writer.join().unwrap();
    }

    #[test]
    fn test_clones_share_session() {
        let store = CredentialStore::in_memory();
        let other = store.clone();
        store.save(&alice());
        assert_eq!(other.access_token().as_deref(), Some("access-1"));
        other.clear();
        assert!(store.load().is_empty());
    }
}
