use crate::digest::PasswordDigest;
use crate::error::Error;
use crate::flow::{CredentialBackend, RoleSet, UsernamePasswordFlow};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// A minimal naming service: string paths bound to string values. The
/// reference store for the simplest login backend.
pub trait NamingDirectory: Send + Sync {
    fn lookup(&self, path: &str) -> Option<String>;
}

/// In-process directory backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, path: impl Into<String>, value: impl Into<String>) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(path.into(), value.into());
    }
}

impl NamingDirectory for InMemoryDirectory {
    fn lookup(&self, path: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .cloned()
    }
}

/// Credential backend resolving the stored password by a fixed path
/// prefix plus the username. Role resolution against the naming directory
/// is a stated extension point and returns no role sets here.
pub struct NamingBackend {
    directory: Arc<dyn NamingDirectory>,
    prefix: String,
}

impl NamingBackend {
    pub fn new(directory: Arc<dyn NamingDirectory>, prefix: impl Into<String>) -> Self {
        Self {
            directory,
            prefix: prefix.into(),
        }
    }

    fn path_for(&self, username: &str) -> String {
        format!("{}/{}", self.prefix.trim_end_matches('/'), username)
    }
}

#[async_trait]
impl CredentialBackend for NamingBackend {
    async fn users_password(&self, username: &str) -> Result<String, Error> {
        let path = self.path_for(username);
        self.directory
            .lookup(&path)
            .ok_or_else(|| Error::Login(format!("no directory binding at `{path}`")))
    }

    async fn role_sets(&self, _username: &str) -> Result<Vec<RoleSet>, Error> {
        Ok(Vec::new())
    }
}

/// The naming-directory login module: the generic flow over a
/// [`NamingBackend`].
pub type NamingDirectoryLoginModule = UsernamePasswordFlow<NamingBackend>;

pub fn naming_module(
    spec: &config::ModuleSpec,
    directory: Arc<dyn NamingDirectory>,
) -> Result<NamingDirectoryLoginModule, Error> {
    let prefix = spec.get("prefix").unwrap_or("security/users").to_string();
    let backend = NamingBackend::new(directory, prefix);
    Ok(
        UsernamePasswordFlow::new("naming-directory", backend, PasswordDigest::from_spec(spec)?)
            .with_use_first_pass(spec.flag("use_first_pass"))
            .with_password_stacking(spec.flag("password_stacking")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_by_prefix_and_username() {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.bind("security/users/alice", "secret");
        let backend = NamingBackend::new(directory, "security/users/");

        assert_eq!(backend.users_password("alice").await.unwrap(), "secret");
        assert!(matches!(
            backend.users_password("bob").await.unwrap_err(),
            Error::Login(_)
        ));
    }

    #[tokio::test]
    async fn role_resolution_is_stubbed_empty() {
        let directory = Arc::new(InMemoryDirectory::new());
        let backend = NamingBackend::new(directory, "security/users");
        assert!(backend.role_sets("alice").await.unwrap().is_empty());
    }
}
