use crate::attempt::AttemptContext;
use crate::error::Error;
use crate::module::{CallbackHandler, LoginModule};
use crate::subject::{Principal, Subject};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer-token login: the token itself is the "username". The token is
/// proven by a remote validate call (200 means valid), and the identity
/// plus roles come from the userinfo endpoint.
#[derive(Debug)]
pub struct BearerLoginModule {
    http: reqwest::Client,
    validate_url: Url,
    userinfo_url: Url,
    username_field: String,
    roles_field: String,
    roles_group: String,
    state: BearerState,
}

#[derive(Debug, Default)]
enum BearerState {
    #[default]
    Initialized,
    Succeeded {
        identity: String,
        roles: Vec<String>,
        committed: bool,
    },
}

impl BearerLoginModule {
    pub fn new(
        validate_url: impl AsRef<str>,
        userinfo_url: impl AsRef<str>,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()?,
            validate_url: Url::parse(validate_url.as_ref())?,
            userinfo_url: Url::parse(userinfo_url.as_ref())?,
            username_field: "username".to_string(),
            roles_field: "roles".to_string(),
            roles_group: "Roles".to_string(),
            state: BearerState::default(),
        })
    }

    pub fn from_spec(spec: &config::ModuleSpec) -> Result<Self, Error> {
        let mut module = Self::new(spec.require("validate_url")?, spec.require("userinfo_url")?)?;
        if let Some(field) = spec.get("username_field") {
            module.username_field = field.to_string();
        }
        if let Some(field) = spec.get("roles_field") {
            module.roles_field = field.to_string();
        }
        if let Some(group) = spec.get("roles_group") {
            module.roles_group = group.to_string();
        }
        Ok(module)
    }

    async fn validate(&self, token: &str) -> Result<(), Error> {
        let response = self
            .http
            .get(self.validate_url.clone())
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::FailedLogin("bearer token".to_string()));
        }
        Err(Error::Login(format!(
            "token validation endpoint returned {status}"
        )))
    }

    async fn userinfo(&self, token: &str) -> Result<(String, Vec<String>), Error> {
        let payload: serde_json::Value = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let identity = payload
            .get(&self.username_field)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                Error::Login(format!(
                    "userinfo payload has no `{}` field",
                    self.username_field
                ))
            })?
            .to_string();
        let roles = roles_from(&payload, &self.roles_field);
        Ok((identity, roles))
    }
}

/// Role names from a userinfo payload: an array of strings under the
/// configured field. Anything else yields no roles.
pub(crate) fn roles_from(payload: &serde_json::Value, field: &str) -> Vec<String> {
    payload
        .get(field)
        .and_then(serde_json::Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl LoginModule for BearerLoginModule {
    fn name(&self) -> &str {
        "bearer"
    }

    async fn login(
        &mut self,
        _ctx: &mut AttemptContext,
        handler: &dyn CallbackHandler,
    ) -> Result<bool, Error> {
        let (token, _) = handler.credentials().await?;
        trace!("validating bearer token");
        self.validate(&token).await?;
        let (identity, roles) = self.userinfo(&token).await?;
        debug!(user = identity, "bearer token accepted");
        self.state = BearerState::Succeeded {
            identity,
            roles,
            committed: false,
        };
        Ok(true)
    }

    fn commit(&mut self, subject: &mut Subject) -> bool {
        let BearerState::Succeeded {
            identity,
            roles,
            committed,
        } = &mut self.state
        else {
            return false;
        };
        subject.add_principal(Principal::new(identity.clone()));
        let group = subject.group_mut(&self.roles_group);
        for role in roles.iter() {
            group.add_member(Principal::new(role.clone()));
        }
        *committed = true;
        true
    }

    fn abort(&mut self) -> bool {
        let attempted = matches!(&self.state, BearerState::Succeeded { committed: false, .. });
        self.state = BearerState::Initialized;
        attempted
    }

    fn logout(&mut self, subject: &mut Subject) -> bool {
        if let BearerState::Succeeded {
            identity,
            committed: true,
            ..
        } = &self.state
        {
            subject.remove_principal(identity);
            self.state = BearerState::Initialized;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_endpoint_url_is_rejected() {
        let err = BearerLoginModule::new("not a url", "https://idp.example/userinfo").unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }

    #[test]
    fn roles_field_extraction() {
        let payload = serde_json::json!({
            "username": "alice",
            "roles": ["admin", "editor"],
            "scope": "openid"
        });
        assert_eq!(roles_from(&payload, "roles"), vec!["admin", "editor"]);
        assert!(roles_from(&payload, "groups").is_empty());
        assert!(roles_from(&payload, "scope").is_empty());
    }
}
