//! Credential handling: a plaintext username and an encrypted-at-rest
//! password, persisted in a small env-style store with the key in its own
//! file. Resolution prompts at most once per missing value and saves what it
//! learns, so later runs are non-interactive.

pub mod store;
pub mod vault;

use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

use self::store::{EnvStore, StoreError, PASSWORD_KEY, USERNAME_KEY};
use self::vault::{PasswordVault, VaultError};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("credential prompt failed: {0}")]
    Prompt(String),
    #[error("username missing from the store and prompting is disabled")]
    UsernameUnavailable,
    #[error("password missing or undecryptable and prompting is disabled")]
    PasswordUnavailable,
}

/// Interactive input seam. The binary wires this to the terminal; tests use
/// fakes so the flow can run headless.
pub trait CredentialPrompter {
    fn prompt_username(&mut self) -> io::Result<String>;
    /// Must not echo the input back to the terminal.
    fn prompt_password(&mut self) -> io::Result<String>;
    fn prompt_classroom(&mut self, default: Option<&str>) -> io::Result<String>;
}

/// A resolved login. The password buffer is zeroized when the value drops.
#[derive(Debug)]
pub struct Credential {
    pub username: String,
    pub password: Zeroizing<String>,
}

/// Resolves username and password from the store, prompting for whatever is
/// missing and persisting the result. A stored password that fails to
/// decrypt is discarded for this run and re-entered; the stored token is
/// only replaced once the fresh password is encrypted and saved.
pub fn resolve_credentials(
    store: &mut EnvStore,
    store_path: &Path,
    vault: &PasswordVault,
    prompter: &mut dyn CredentialPrompter,
    interactive: bool,
) -> Result<Credential, CredentialError> {
    let username = match store.get(USERNAME_KEY) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            if !interactive {
                return Err(CredentialError::UsernameUnavailable);
            }
            info!(field = "username", "prompting for missing credential");
            let name = prompter
                .prompt_username()
                .map_err(|e| CredentialError::Prompt(format!("{e}")))?
                .trim()
                .to_string();
            store.set(USERNAME_KEY, name.clone());
            store.save(store_path)?;
            name
        }
    };

    let mut password = None;
    if let Some(token) = store.get(PASSWORD_KEY) {
        match vault.decrypt(token) {
            Ok(plain) => password = Some(Zeroizing::new(plain)),
            Err(err) => {
                warn!(error = %err, "stored password failed to decrypt; it must be re-entered")
            }
        }
    }

    let password = match password {
        Some(plain) => plain,
        None => {
            if !interactive {
                return Err(CredentialError::PasswordUnavailable);
            }
            info!(field = "password", "prompting for missing credential");
            let plain = Zeroizing::new(
                prompter
                    .prompt_password()
                    .map_err(|e| CredentialError::Prompt(format!("{e}")))?,
            );
            let token = vault.encrypt(&plain)?;
            store.set(PASSWORD_KEY, token);
            store.save(store_path)?;
            plain
        }
    };

    Ok(Credential { username, password })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Scripted prompter that counts how often it is asked.
    struct FakePrompter {
        username: String,
        password: String,
        username_prompts: usize,
        password_prompts: usize,
    }

    impl FakePrompter {
        fn new(username: &str, password: &str) -> Self {
            Self {
                username: username.to_string(),
                password: password.to_string(),
                username_prompts: 0,
                password_prompts: 0,
            }
        }
    }

    impl CredentialPrompter for FakePrompter {
        fn prompt_username(&mut self) -> io::Result<String> {
            self.username_prompts += 1;
            Ok(self.username.clone())
        }

        fn prompt_password(&mut self) -> io::Result<String> {
            self.password_prompts += 1;
            Ok(self.password.clone())
        }

        fn prompt_classroom(&mut self, _default: Option<&str>) -> io::Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn empty_store_prompts_once_and_persists() {
        let dir = tempdir().expect("temp dir");
        let env_path = dir.path().join(".env");
        let vault = PasswordVault::load_or_create(&dir.path().join("secret.key")).expect("vault");
        let mut prompter = FakePrompter::new("s1234567", "hunter2");

        let mut store = EnvStore::load(&env_path).expect("load");
        let credential =
            resolve_credentials(&mut store, &env_path, &vault, &mut prompter, true)
                .expect("resolution should succeed");

        assert_eq!(credential.username, "s1234567");
        assert_eq!(credential.password.as_str(), "hunter2");
        assert_eq!(prompter.username_prompts, 1);
        assert_eq!(prompter.password_prompts, 1);

        // The password never lands on disk in the clear.
        let on_disk = std::fs::read_to_string(&env_path).expect("read env");
        assert!(on_disk.contains("USERNAME=s1234567"));
        assert!(!on_disk.contains("hunter2"));
    }

    #[test]
    fn second_run_does_not_prompt() {
        let dir = tempdir().expect("temp dir");
        let env_path = dir.path().join(".env");
        let key_path = dir.path().join("secret.key");

        {
            let vault = PasswordVault::load_or_create(&key_path).expect("vault");
            let mut prompter = FakePrompter::new("s1234567", "hunter2");
            let mut store = EnvStore::load(&env_path).expect("load");
            resolve_credentials(&mut store, &env_path, &vault, &mut prompter, true)
                .expect("first run");
        }

        let vault = PasswordVault::load_or_create(&key_path).expect("vault");
        let mut prompter = FakePrompter::new("unused", "unused");
        let mut store = EnvStore::load(&env_path).expect("reload");
        let credential =
            resolve_credentials(&mut store, &env_path, &vault, &mut prompter, true)
                .expect("second run");

        assert_eq!(credential.username, "s1234567");
        assert_eq!(credential.password.as_str(), "hunter2");
        assert_eq!(prompter.username_prompts, 0);
        assert_eq!(prompter.password_prompts, 0);
    }

    #[test]
    fn undecryptable_password_is_reprompted_and_replaced() {
        let dir = tempdir().expect("temp dir");
        let env_path = dir.path().join(".env");
        let vault = PasswordVault::load_or_create(&dir.path().join("secret.key")).expect("vault");

        // Token encrypted under some other installation's key.
        let stranger = PasswordVault::load_or_create(&dir.path().join("other.key")).expect("vault");
        let foreign_token = stranger.encrypt("old-secret").expect("encrypt");

        let mut store = EnvStore::default();
        store.set(USERNAME_KEY, "s1234567");
        store.set(PASSWORD_KEY, foreign_token);
        store.save(&env_path).expect("seed store");

        let mut store = EnvStore::load(&env_path).expect("load");
        let mut prompter = FakePrompter::new("unused", "fresh-secret");
        let credential =
            resolve_credentials(&mut store, &env_path, &vault, &mut prompter, true)
                .expect("resolution should recover");

        assert_eq!(credential.password.as_str(), "fresh-secret");
        assert_eq!(prompter.username_prompts, 0);
        assert_eq!(prompter.password_prompts, 1);

        // The replacement token decrypts under this vault now.
        let reloaded = EnvStore::load(&env_path).expect("reload");
        let token = reloaded.get(PASSWORD_KEY).expect("token present");
        assert_eq!(vault.decrypt(token).expect("decrypt"), "fresh-secret");
    }

    #[test]
    fn fail_fast_mode_errors_instead_of_prompting() {
        let dir = tempdir().expect("temp dir");
        let env_path = dir.path().join(".env");
        let vault = PasswordVault::load_or_create(&dir.path().join("secret.key")).expect("vault");
        let mut prompter = FakePrompter::new("unused", "unused");

        let mut store = EnvStore::load(&env_path).expect("load");
        let err = resolve_credentials(&mut store, &env_path, &vault, &mut prompter, false)
            .unwrap_err();
        assert!(matches!(err, CredentialError::UsernameUnavailable));
        assert_eq!(prompter.username_prompts, 0);

        store.set(USERNAME_KEY, "s1234567");
        let err = resolve_credentials(&mut store, &env_path, &vault, &mut prompter, false)
            .unwrap_err();
        assert!(matches!(err, CredentialError::PasswordUnavailable));
        assert_eq!(prompter.password_prompts, 0);
    }
}
