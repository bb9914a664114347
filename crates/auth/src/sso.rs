use crate::attempt::AttemptContext;
use crate::bearer::roles_from;
use crate::error::Error;
use crate::module::{CallbackHandler, LoginModule};
use crate::subject::{Principal, Subject};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Field-name mapping for the token and userinfo payloads, so the module
/// works against identity providers that deviate from the RFC names.
#[derive(Debug, Clone)]
pub struct SsoFieldMapping {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub username: String,
    pub roles: String,
}

impl Default for SsoFieldMapping {
    fn default() -> Self {
        Self {
            access_token: "access_token".to_string(),
            refresh_token: "refresh_token".to_string(),
            id_token: "id_token".to_string(),
            username: "username".to_string(),
            roles: "roles".to_string(),
        }
    }
}

/// Tokens received from the exchange. Refresh and id tokens are carried
/// for the caller's session handling; only the access token is used here.
#[derive(Debug, Clone, Default)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
}

/// OAuth single-sign-on login: exchange the authorization code (supplied
/// through the callback handler's password slot) for tokens, then resolve
/// identity and roles from the userinfo endpoint. Scalar userinfo fields
/// are copied onto the principal as attributes.
#[derive(Debug)]
pub struct SingleSignOnLoginModule {
    http: reqwest::Client,
    token_url: Url,
    userinfo_url: Url,
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
    mapping: SsoFieldMapping,
    roles_group: String,
    state: SsoState,
}

#[derive(Debug, Default)]
enum SsoState {
    #[default]
    Initialized,
    Succeeded {
        principal: Principal,
        roles: Vec<String>,
        tokens: TokenSet,
        committed: bool,
    },
}

impl SingleSignOnLoginModule {
    pub fn from_spec(spec: &config::ModuleSpec) -> Result<Self, Error> {
        let mut mapping = SsoFieldMapping::default();
        if let Some(field) = spec.get("username_field") {
            mapping.username = field.to_string();
        }
        if let Some(field) = spec.get("roles_field") {
            mapping.roles = field.to_string();
        }
        if let Some(field) = spec.get("access_token_field") {
            mapping.access_token = field.to_string();
        }
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()?,
            token_url: Url::parse(spec.require("token_url")?)?,
            userinfo_url: Url::parse(spec.require("userinfo_url")?)?,
            client_id: spec.require("client_id")?.to_string(),
            client_secret: spec.require("client_secret")?.to_string(),
            redirect_uri: spec.get("redirect_uri").map(str::to_string),
            mapping,
            roles_group: spec.get("roles_group").unwrap_or("Roles").to_string(),
            state: SsoState::default(),
        })
    }

    /// Authorization-code to token exchange. A 4xx from the provider is a
    /// credential rejection (expired or forged code); anything else that
    /// is not a 2xx is infrastructure.
    async fn exchange(&self, code: &str) -> Result<TokenSet, Error> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(redirect_uri) = &self.redirect_uri {
            form.push(("redirect_uri", redirect_uri.as_str()));
        }

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        if status.is_client_error() {
            return Err(Error::FailedLogin("authorization code".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Login(format!("token endpoint returned {status}")));
        }

        let payload: serde_json::Value = response.json().await?;
        let access_token = payload
            .get(&self.mapping.access_token)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                Error::Login(format!(
                    "token payload has no `{}` field",
                    self.mapping.access_token
                ))
            })?
            .to_string();
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        Ok(TokenSet {
            access_token,
            refresh_token: field(&self.mapping.refresh_token),
            id_token: field(&self.mapping.id_token),
        })
    }

    /// Identity, attributes and roles from the userinfo endpoint.
    async fn userinfo(&self, access_token: &str) -> Result<(Principal, Vec<String>), Error> {
        let payload: serde_json::Value = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let name = payload
            .get(&self.mapping.username)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                Error::Login(format!(
                    "userinfo payload has no `{}` field",
                    self.mapping.username
                ))
            })?;
        let mut principal = Principal::new(name);

        // Scalars become principal attributes; arrays and objects (the
        // roles field among them) do not.
        if let Some(object) = payload.as_object() {
            for (key, value) in object {
                if key == &self.mapping.username {
                    continue;
                }
                match value {
                    serde_json::Value::String(s) => principal.set_attribute(key, s),
                    serde_json::Value::Number(n) => principal.set_attribute(key, n.to_string()),
                    serde_json::Value::Bool(b) => principal.set_attribute(key, b.to_string()),
                    _ => {}
                }
            }
        }

        let roles = roles_from(&payload, &self.mapping.roles);
        Ok((principal, roles))
    }

    /// The tokens from the last successful login, for session handling.
    pub fn tokens(&self) -> Option<&TokenSet> {
        match &self.state {
            SsoState::Succeeded { tokens, .. } => Some(tokens),
            SsoState::Initialized => None,
        }
    }
}

#[async_trait]
impl LoginModule for SingleSignOnLoginModule {
    fn name(&self) -> &str {
        "sso"
    }

    async fn login(
        &mut self,
        _ctx: &mut AttemptContext,
        handler: &dyn CallbackHandler,
    ) -> Result<bool, Error> {
        let (_, code) = handler.credentials().await?;
        trace!("exchanging authorization code");
        let tokens = self.exchange(&code).await?;
        let (principal, roles) = self.userinfo(&tokens.access_token).await?;
        debug!(user = principal.name(), "single sign-on accepted");
        self.state = SsoState::Succeeded {
            principal,
            roles,
            tokens,
            committed: false,
        };
        Ok(true)
    }

    fn commit(&mut self, subject: &mut Subject) -> bool {
        let SsoState::Succeeded {
            principal,
            roles,
            committed,
            ..
        } = &mut self.state
        else {
            return false;
        };
        subject.add_principal(principal.clone());
        let group = subject.group_mut(&self.roles_group);
        for role in roles.iter() {
            group.add_member(Principal::new(role.clone()));
        }
        *committed = true;
        true
    }

    fn abort(&mut self) -> bool {
        let attempted = matches!(&self.state, SsoState::Succeeded { committed: false, .. });
        self.state = SsoState::Initialized;
        attempted
    }

    fn logout(&mut self, subject: &mut Subject) -> bool {
        if let SsoState::Succeeded {
            principal,
            committed: true,
            ..
        } = &self.state
        {
            subject.remove_principal(principal.name());
            self.state = SsoState::Initialized;
            return true;
        }
        false
    }
}
