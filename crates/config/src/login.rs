use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Login {
    /// Ordered login-module chain. Modules run in configuration order
    /// within one authentication attempt; the first module to validate a
    /// name/password pair may publish it for later modules configured with
    /// `use_first_pass`.
    pub modules: Vec<ModuleSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ModuleSpec {
    /// Login-module variant. Known kinds are `database`, `ldap`, `bearer`,
    /// `sso` and `naming-directory`. Unknown kinds are rejected by the
    /// module registry.
    pub kind: String,

    /// Backend-specific options, passed verbatim to the module at
    /// initialization. Typical keys: `hash_algorithm`, `hash_encoding`,
    /// `ignore_password_case`, `use_first_pass`, `password_stacking`, and
    /// per-backend connection parameters (`url`, `bind_dn`, `base_dn`,
    /// `principals_query`, `roles_query`, `client_id`, ...).
    pub options: BTreeMap<String, String>,
}

impl ModuleSpec {
    /// Fetch a required option, with the module kind in the error message.
    pub fn require(&self, key: &str) -> Result<&str, crate::Error> {
        self.options
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| crate::Error::MissingOption {
                module: self.kind.clone(),
                key: key.to_string(),
            })
    }

    /// Fetch an optional option.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Fetch a boolean option, defaulting to `false` when absent. Accepts
    /// `true`/`false` and `1`/`0`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.options.get(key).map(String::as_str), Some("true" | "1"))
    }
}
