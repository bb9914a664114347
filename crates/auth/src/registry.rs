use crate::bearer::BearerLoginModule;
use crate::database::database_module;
use crate::error::Error;
use crate::ldap::LdapLoginModule;
use crate::module::{LoginChain, LoginModule};
use crate::naming::{InMemoryDirectory, NamingDirectory, naming_module};
use crate::sso::SingleSignOnLoginModule;
use std::sync::Arc;

/// Collaborators a module constructor may need beyond its own options.
pub struct ModuleContext {
    pub directory: Arc<dyn NamingDirectory>,
}

impl Default for ModuleContext {
    fn default() -> Self {
        Self {
            directory: Arc::new(InMemoryDirectory::new()),
        }
    }
}

/// Build one module from its configuration entry. The variant set lives
/// here and nowhere else; everything downstream consumes modules through
/// the [`LoginModule`] capability.
pub async fn build_module(
    context: &ModuleContext,
    spec: &config::ModuleSpec,
) -> Result<Box<dyn LoginModule>, Error> {
    match spec.kind.as_str() {
        "database" => Ok(Box::new(database_module(spec).await?)),
        "ldap" => Ok(Box::new(LdapLoginModule::from_spec(spec)?)),
        "bearer" => Ok(Box::new(BearerLoginModule::from_spec(spec)?)),
        "sso" => Ok(Box::new(SingleSignOnLoginModule::from_spec(spec)?)),
        "naming-directory" => Ok(Box::new(naming_module(spec, context.directory.clone())?)),
        other => Err(Error::UnknownModuleType(other.to_string())),
    }
}

/// Build the whole chain in configuration order.
pub async fn build_chain(
    context: &ModuleContext,
    login: &config::Login,
) -> Result<LoginChain, Error> {
    let mut modules = Vec::with_capacity(login.modules.len());
    for spec in &login.modules {
        modules.push(build_module(context, spec).await?);
    }
    Ok(LoginChain::new(modules))
}
