use crate::attempt::AttemptContext;
use crate::error::Error;
use crate::module::{CallbackHandler, LoginModule};
use crate::subject::{Principal, Subject};
use async_trait::async_trait;
use ldap3::{LdapConnAsync, Scope, SearchEntry};
use std::sync::Arc;
use tracing::{debug, trace};

/// Connection and search parameters for [`LdapLoginModule`]. `{0}` in the
/// user filter is substituted with the username; in the role filter `{0}`
/// is the username and `{1}` the resolved user DN.
#[derive(Debug, Clone)]
pub struct LdapParams {
    pub url: String,
    pub bind_dn: String,
    pub bind_password: String,
    pub base_dn: String,
    pub user_filter: String,
    pub role_base_dn: String,
    pub role_filter: String,
    pub roles_group: String,
}

impl LdapParams {
    pub fn from_spec(spec: &config::ModuleSpec) -> Result<Self, Error> {
        let base_dn = spec.require("base_dn")?.to_string();
        Ok(Self {
            url: spec.require("url")?.to_string(),
            bind_dn: spec.require("bind_dn")?.to_string(),
            bind_password: spec.require("bind_password")?.to_string(),
            role_base_dn: spec
                .get("role_base_dn")
                .unwrap_or(&base_dn)
                .to_string(),
            base_dn,
            user_filter: spec.get("user_filter").unwrap_or("(uid={0})").to_string(),
            role_filter: spec
                .get("role_filter")
                .unwrap_or("(member={1})")
                .to_string(),
            roles_group: spec.get("roles_group").unwrap_or("Roles").to_string(),
        })
    }
}

/// The directory operations the login module needs, so the flow logic is
/// testable without a live server. User and role searches run under the
/// administrative bind; only [`LdapDirectory::bind_user`] proves the
/// credentials.
#[async_trait]
pub trait LdapDirectory: Send + Sync {
    /// Admin bind plus user search; the resolved user DN. No matching
    /// entry is an infrastructure-class [`Error::Login`].
    async fn resolve_user_dn(&self, username: &str) -> Result<String, Error>;

    /// The credential proof: bind as the resolved DN with the supplied
    /// password.
    async fn bind_user(&self, user_dn: &str, password: &str) -> Result<(), Error>;

    /// DNs of role entries matching `filter` under the role base.
    async fn search_role_dns(&self, filter: &str) -> Result<Vec<String>, Error>;
}

/// The real directory over an ldap3 connection. Each operation opens its
/// own short-lived connection; the module holds no connection state
/// between attempts.
pub struct Ldap3Directory {
    params: LdapParams,
}

impl Ldap3Directory {
    pub fn new(params: LdapParams) -> Self {
        Self { params }
    }

    async fn admin_session(&self) -> Result<ldap3::Ldap, Error> {
        let (conn, mut ldap) = LdapConnAsync::new(&self.params.url).await?;
        ldap3::drive!(conn);
        ldap.simple_bind(&self.params.bind_dn, &self.params.bind_password)
            .await?
            .success()?;
        Ok(ldap)
    }
}

#[async_trait]
impl LdapDirectory for Ldap3Directory {
    async fn resolve_user_dn(&self, username: &str) -> Result<String, Error> {
        let mut ldap = self.admin_session().await?;
        let filter = self.params.user_filter.replace("{0}", username);
        let (entries, _) = ldap
            .search(&self.params.base_dn, Scope::Subtree, &filter, vec!["dn"])
            .await?
            .success()?;
        ldap.unbind().await?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| Error::Login(format!("no directory entry for user `{username}`")))?;
        Ok(SearchEntry::construct(entry).dn)
    }

    async fn bind_user(&self, user_dn: &str, password: &str) -> Result<(), Error> {
        let (conn, mut ldap) = LdapConnAsync::new(&self.params.url).await?;
        ldap3::drive!(conn);
        // A rejected bind is an infrastructure-class failure here: the DN
        // existed but the directory refused it.
        ldap.simple_bind(user_dn, password)
            .await?
            .success()
            .map_err(|err| Error::Login(format!("bind as `{user_dn}` failed: {err}")))?;
        ldap.unbind().await?;
        Ok(())
    }

    async fn search_role_dns(&self, filter: &str) -> Result<Vec<String>, Error> {
        let mut ldap = self.admin_session().await?;
        let (entries, _) = ldap
            .search(&self.params.role_base_dn, Scope::Subtree, filter, vec!["dn"])
            .await?
            .success()?;
        ldap.unbind().await?;
        Ok(entries
            .into_iter()
            .map(|entry| SearchEntry::construct(entry).dn)
            .collect())
    }
}

#[derive(Debug, Default)]
enum LdapState {
    #[default]
    Initialized,
    Succeeded {
        identity: String,
        roles: Vec<String>,
        committed: bool,
    },
}

/// Directory-backed login: search for the user entry under the admin
/// bind, prove the credentials by binding as the resolved DN, then pull
/// roles from a second search whose result DNs have their common name
/// extracted. With `use_first_pass` the credential bind is skipped, but
/// the DN is still resolved so the role filter sees the real DN.
pub struct LdapLoginModule {
    params: LdapParams,
    directory: Arc<dyn LdapDirectory>,
    use_first_pass: bool,
    password_stacking: bool,
    state: LdapState,
}

impl LdapLoginModule {
    pub fn new(params: LdapParams) -> Self {
        let directory = Arc::new(Ldap3Directory::new(params.clone()));
        Self::with_directory(params, directory)
    }

    pub fn with_directory(params: LdapParams, directory: Arc<dyn LdapDirectory>) -> Self {
        Self {
            params,
            directory,
            use_first_pass: false,
            password_stacking: false,
            state: LdapState::default(),
        }
    }

    pub fn from_spec(spec: &config::ModuleSpec) -> Result<Self, Error> {
        let mut module = Self::new(LdapParams::from_spec(spec)?);
        module.use_first_pass = spec.flag("use_first_pass");
        module.password_stacking = spec.flag("password_stacking");
        Ok(module)
    }

    pub fn with_use_first_pass(mut self, use_first_pass: bool) -> Self {
        self.use_first_pass = use_first_pass;
        self
    }

    async fn role_names(&self, username: &str, user_dn: &str) -> Result<Vec<String>, Error> {
        let filter = self
            .params
            .role_filter
            .replace("{0}", username)
            .replace("{1}", user_dn);
        Ok(self
            .directory
            .search_role_dns(&filter)
            .await?
            .iter()
            .filter_map(|dn| common_name(dn))
            .collect())
    }
}

/// First RDN value of a DN: `cn=admins,ou=roles,dc=example` -> `admins`.
fn common_name(dn: &str) -> Option<String> {
    let rdn = dn.split(',').next()?;
    let (_, value) = rdn.split_once('=')?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[async_trait]
impl LoginModule for LdapLoginModule {
    fn name(&self) -> &str {
        "ldap"
    }

    async fn login(
        &mut self,
        ctx: &mut AttemptContext,
        handler: &dyn CallbackHandler,
    ) -> Result<bool, Error> {
        let (username, password, user_dn) = match ctx.first_pass() {
            Some(first_pass) if self.use_first_pass => {
                trace!("reusing first-pass credentials");
                let username = first_pass.name.clone();
                let password = first_pass.password.clone();
                // Reuse skips the credential bind, not the DN resolution:
                // the role filter needs the real DN.
                let user_dn = self.directory.resolve_user_dn(&username).await?;
                (username, password, user_dn)
            }
            _ => {
                let (username, password) = handler.credentials().await?;
                let user_dn = self.directory.resolve_user_dn(&username).await?;
                self.directory.bind_user(&user_dn, &password).await?;
                debug!(user = username, "directory bind succeeded");
                (username, password, user_dn)
            }
        };

        let roles = self.role_names(&username, &user_dn).await?;
        if self.password_stacking {
            ctx.publish_first_pass(username.clone(), password);
        }
        self.state = LdapState::Succeeded {
            identity: username,
            roles,
            committed: false,
        };
        Ok(true)
    }

    fn commit(&mut self, subject: &mut Subject) -> bool {
        let LdapState::Succeeded {
            identity,
            roles,
            committed,
        } = &mut self.state
        else {
            return false;
        };
        subject.add_principal(Principal::new(identity.clone()));
        let group = subject.group_mut(&self.params.roles_group);
        for role in roles.iter() {
            group.add_member(Principal::new(role.clone()));
        }
        *committed = true;
        true
    }

    fn abort(&mut self) -> bool {
        let attempted = matches!(&self.state, LdapState::Succeeded { committed: false, .. });
        self.state = LdapState::Initialized;
        attempted
    }

    fn logout(&mut self, subject: &mut Subject) -> bool {
        if let LdapState::Succeeded {
            identity,
            committed: true,
            ..
        } = &self.state
        {
            subject.remove_principal(identity);
            self.state = LdapState::Initialized;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::StaticCallbackHandler;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn params() -> LdapParams {
        LdapParams {
            url: "ldap://localhost".into(),
            bind_dn: "cn=admin,dc=example".into(),
            bind_password: "secret".into(),
            base_dn: "ou=people,dc=example".into(),
            user_filter: "(uid={0})".into(),
            role_base_dn: "ou=roles,dc=example".into(),
            role_filter: "(member={1})".into(),
            roles_group: "Roles".into(),
        }
    }

    #[derive(Default)]
    struct FakeDirectory {
        binds: AtomicUsize,
        role_filters: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LdapDirectory for FakeDirectory {
        async fn resolve_user_dn(&self, username: &str) -> Result<String, Error> {
            Ok(format!("uid={username},ou=people,dc=example"))
        }

        async fn bind_user(&self, _user_dn: &str, _password: &str) -> Result<(), Error> {
            self.binds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn search_role_dns(&self, filter: &str) -> Result<Vec<String>, Error> {
            self.role_filters.lock().unwrap().push(filter.to_string());
            Ok(vec!["cn=admins,ou=roles,dc=example".to_string()])
        }
    }

    #[test]
    fn common_name_extraction() {
        assert_eq!(
            common_name("cn=admins,ou=roles,dc=example,dc=org"),
            Some("admins".to_string())
        );
        assert_eq!(common_name("cn=editors"), Some("editors".to_string()));
        assert_eq!(common_name("malformed"), None);
    }

    #[tokio::test]
    async fn login_binds_and_commits_roles() {
        let directory = Arc::new(FakeDirectory::default());
        let mut module = LdapLoginModule::with_directory(params(), directory.clone());
        let mut ctx = AttemptContext::new();
        let handler = StaticCallbackHandler::new("alice", "secret");

        assert!(module.login(&mut ctx, &handler).await.unwrap());
        assert_eq!(directory.binds.load(Ordering::SeqCst), 1);

        let mut subject = Subject::default();
        assert!(module.commit(&mut subject));
        assert!(subject.group("Roles").unwrap().is_member("admins"));
    }

    #[tokio::test]
    async fn first_pass_reuse_resolves_the_dn_for_the_role_filter() {
        let directory = Arc::new(FakeDirectory::default());
        let mut module =
            LdapLoginModule::with_directory(params(), directory.clone()).with_use_first_pass(true);
        let mut ctx = AttemptContext::new();
        ctx.publish_first_pass("alice", "secret");
        // Credentials the module must never collect.
        let handler = StaticCallbackHandler::new("ignored", "ignored");

        assert!(module.login(&mut ctx, &handler).await.unwrap());

        // No credential bind happened, but the role search still saw the
        // resolved DN rather than the bare username.
        assert_eq!(directory.binds.load(Ordering::SeqCst), 0);
        let filters = directory.role_filters.lock().unwrap();
        assert_eq!(
            filters.as_slice(),
            ["(member=uid=alice,ou=people,dc=example)"]
        );

        let mut subject = Subject::default();
        assert!(module.commit(&mut subject));
        assert!(subject.group("Roles").unwrap().is_member("admins"));
    }

    #[test]
    fn missing_required_option_is_a_config_error() {
        let spec = config::ModuleSpec {
            kind: "ldap".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            LdapLoginModule::from_spec(&spec),
            Err(Error::Config(_))
        ));
    }
}
