/// Authentication errors fall in two classes: [`Error::FailedLogin`] is a
/// credential rejection (wrong password, rejected token), everything else
/// is an infrastructure failure (backend unreachable, no such user,
/// identity could not be constructed). Both terminate the current login
/// attempt; whether the chain as a whole fails is the caller's policy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Authentication failed for `{0}`: invalid credentials")]
    FailedLogin(String),

    #[error("Login failure: {0}")]
    Login(String),

    #[error("Unknown login module kind `{0}`")]
    UnknownModuleType(String),

    #[error("Invalid digest configuration: {0}")]
    DigestConfig(String),

    #[error(transparent)]
    Config(#[from] config::Error),

    #[error("Database failure: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Directory failure: {0}")]
    Ldap(#[from] ldap3::LdapError),

    #[error("Token endpoint failure: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// `true` for a plain credential rejection, `false` for everything
    /// infrastructure-shaped.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, Error::FailedLogin(_))
    }
}
