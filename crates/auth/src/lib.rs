#![forbid(unsafe_code)]

pub mod attempt;
pub mod bearer;
pub mod database;
pub mod digest;
pub mod error;
pub mod flow;
pub mod ldap;
pub mod module;
pub mod naming;
pub mod registry;
pub mod sso;
pub mod subject;

pub use attempt::{AttemptContext, FirstPass};
pub use bearer::BearerLoginModule;
pub use database::{DatabaseBackend, DatabaseLoginModule, database_module};
pub use digest::{HashAlgorithm, HashEncoding, PasswordDigest};
pub use error::Error;
pub use flow::{CredentialBackend, RoleSet, UsernamePasswordFlow};
pub use ldap::{Ldap3Directory, LdapDirectory, LdapLoginModule, LdapParams};
pub use module::{CallbackHandler, LoginChain, LoginModule, StaticCallbackHandler};
pub use naming::{
    InMemoryDirectory, NamingBackend, NamingDirectory, NamingDirectoryLoginModule, naming_module,
};
pub use registry::{ModuleContext, build_chain, build_module};
pub use sso::{SingleSignOnLoginModule, SsoFieldMapping, TokenSet};
pub use subject::{Group, Principal, Subject};
