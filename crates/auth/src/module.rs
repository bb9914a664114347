use crate::attempt::AttemptContext;
use crate::error::Error;
use crate::subject::Subject;
use async_trait::async_trait;
use tracing::debug;

/// Supplies the credentials for one authentication attempt. For
/// password-based modules the pair is `(username, password)`; for
/// token-based modules the token travels in the name slot (bearer) or the
/// password slot (authorization code).
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    async fn credentials(&self) -> Result<(String, String), Error>;
}

/// Fixed credentials, the common case for programmatic callers and tests.
#[derive(Debug, Clone)]
pub struct StaticCallbackHandler {
    name: String,
    password: String,
}

impl StaticCallbackHandler {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl CallbackHandler for StaticCallbackHandler {
    async fn credentials(&self) -> Result<(String, String), Error> {
        Ok((self.name.clone(), self.password.clone()))
    }
}

/// One pluggable authentication module. Modules are constructed from
/// configuration (the initialize phase), then driven through
/// `login -> commit | abort -> logout` per attempt. `login` decides
/// whether the credentials are valid; only `commit` mutates the
/// [`Subject`], and `logout` removes exactly what `commit` added.
#[async_trait]
pub trait LoginModule: Send {
    fn name(&self) -> &str;

    /// Validate credentials, or reuse the shared first pass when so
    /// configured. Returns `Ok(true)` when this module participated.
    async fn login(
        &mut self,
        ctx: &mut AttemptContext,
        handler: &dyn CallbackHandler,
    ) -> Result<bool, Error>;

    /// Merge the identity principal and this module's role sets into the
    /// subject. A no-op returning `false` when `login` did not succeed.
    fn commit(&mut self, subject: &mut Subject) -> bool;

    /// Discard attempted-but-uncommitted state.
    fn abort(&mut self) -> bool;

    /// Remove the identity this module committed from the subject.
    fn logout(&mut self, subject: &mut Subject) -> bool;
}

impl std::fmt::Debug for dyn LoginModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginModule")
            .field("name", &self.name())
            .finish()
    }
}

/// Runs the configured modules in order within one attempt. Every module
/// must pass; on the first failure all modules are aborted and the error
/// surfaces to the caller. Chain-level failover policy beyond that is
/// deliberately left to callers.
pub struct LoginChain {
    modules: Vec<Box<dyn LoginModule>>,
}

impl LoginChain {
    pub fn new(modules: Vec<Box<dyn LoginModule>>) -> Self {
        Self { modules }
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// One full authentication attempt: `login` on every module in order,
    /// then `commit` on every module into a fresh [`Subject`].
    pub async fn authenticate(
        &mut self,
        handler: &dyn CallbackHandler,
    ) -> Result<Subject, Error> {
        let mut ctx = AttemptContext::new();

        for index in 0..self.modules.len() {
            if let Err(err) = self.modules[index].login(&mut ctx, handler).await {
                debug!(module = self.modules[index].name(), %err, "login phase failed");
                for module in &mut self.modules {
                    module.abort();
                }
                return Err(err);
            }
            debug!(module = self.modules[index].name(), "login phase passed");
        }

        let mut subject = Subject::default();
        for module in &mut self.modules {
            module.commit(&mut subject);
        }
        Ok(subject)
    }

    /// Remove every committed identity from the subject.
    pub fn logout(&mut self, subject: &mut Subject) {
        for module in &mut self.modules {
            module.logout(subject);
        }
    }
}
