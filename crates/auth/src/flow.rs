use crate::attempt::AttemptContext;
use crate::digest::PasswordDigest;
use crate::error::Error;
use crate::module::{CallbackHandler, LoginModule};
use crate::subject::{Principal, Subject};
use async_trait::async_trait;
use tracing::{debug, trace};

/// One named group with the role members a backend resolved for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSet {
    pub group: String,
    pub roles: Vec<String>,
}

impl RoleSet {
    pub fn roles(group: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            group: group.into(),
            roles,
        }
    }
}

/// A password-validating credential store. The stored password is expected
/// to already be in the backend's at-rest form (hashed, when a digest is
/// configured on the flow).
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// The stored (expected) password for a user. "No such user" is an
    /// infrastructure-class [`Error::Login`], not a credential rejection.
    async fn users_password(&self, username: &str) -> Result<String, Error>;

    /// The role sets for a validated user.
    async fn role_sets(&self, username: &str) -> Result<Vec<RoleSet>, Error>;
}

#[derive(Debug, Default)]
enum FlowState {
    #[default]
    Initialized,
    Succeeded {
        identity: String,
        role_sets: Vec<RoleSet>,
        committed: bool,
    },
}

/// The generic username/password login flow, composed with a
/// [`CredentialBackend`] instead of subclassing: collect or reuse
/// credentials, digest-compare, publish the first pass, and at commit
/// time merge identity plus role sets into the subject.
pub struct UsernamePasswordFlow<B> {
    name: String,
    backend: B,
    digest: PasswordDigest,
    /// Reuse credentials published by an earlier module instead of
    /// collecting and validating our own.
    use_first_pass: bool,
    /// Publish our validated credentials for downstream modules.
    password_stacking: bool,
    state: FlowState,
}

impl<B: CredentialBackend> UsernamePasswordFlow<B> {
    pub fn new(name: impl Into<String>, backend: B, digest: PasswordDigest) -> Self {
        Self {
            name: name.into(),
            backend,
            digest,
            use_first_pass: false,
            password_stacking: false,
            state: FlowState::Initialized,
        }
    }

    pub fn with_use_first_pass(mut self, use_first_pass: bool) -> Self {
        self.use_first_pass = use_first_pass;
        self
    }

    pub fn with_password_stacking(mut self, password_stacking: bool) -> Self {
        self.password_stacking = password_stacking;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: CredentialBackend> LoginModule for UsernamePasswordFlow<B> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn login(
        &mut self,
        ctx: &mut AttemptContext,
        handler: &dyn CallbackHandler,
    ) -> Result<bool, Error> {
        let (username, password) = match ctx.first_pass() {
            // An earlier module already validated this pair; reusing it
            // must not re-validate.
            Some(first_pass) if self.use_first_pass => {
                trace!(module = self.name, "reusing first-pass credentials");
                (first_pass.name.clone(), first_pass.password.clone())
            }
            _ => {
                let (username, password) = handler.credentials().await?;
                let expected = self.backend.users_password(&username).await?;
                if !self.digest.matches(&password, &expected) {
                    return Err(Error::FailedLogin(username));
                }
                debug!(module = self.name, user = username, "credentials validated");
                (username, password)
            }
        };

        let role_sets = self.backend.role_sets(&username).await?;
        if self.password_stacking {
            ctx.publish_first_pass(username.clone(), password);
        }
        self.state = FlowState::Succeeded {
            identity: username,
            role_sets,
            committed: false,
        };
        Ok(true)
    }

    fn commit(&mut self, subject: &mut Subject) -> bool {
        let FlowState::Succeeded {
            identity,
            role_sets,
            committed,
        } = &mut self.state
        else {
            return false;
        };

        subject.add_principal(Principal::new(identity.clone()));
        for role_set in role_sets.iter() {
            let group = subject.group_mut(&role_set.group);
            for role in &role_set.roles {
                group.add_member(Principal::new(role.clone()));
            }
        }
        *committed = true;
        true
    }

    fn abort(&mut self) -> bool {
        let attempted = matches!(&self.state, FlowState::Succeeded { committed: false, .. });
        self.state = FlowState::Initialized;
        attempted
    }

    fn logout(&mut self, subject: &mut Subject) -> bool {
        if let FlowState::Succeeded {
            identity,
            committed: true,
            ..
        } = &self.state
        {
            subject.remove_principal(identity);
            self.state = FlowState::Initialized;
            return true;
        }
        false
    }
}
