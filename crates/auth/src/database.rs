use crate::digest::PasswordDigest;
use crate::error::Error;
use crate::flow::{CredentialBackend, RoleSet, UsernamePasswordFlow};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

/// SQL credential store: one configurable query resolving the stored
/// password for a username, and one resolving `(role, group)` rows. Both
/// queries take the username as their single bind parameter.
pub struct DatabaseBackend {
    pool: SqlitePool,
    principals_query: String,
    roles_query: String,
}

impl DatabaseBackend {
    pub fn new(
        pool: SqlitePool,
        principals_query: impl Into<String>,
        roles_query: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            principals_query: principals_query.into(),
            roles_query: roles_query.into(),
        }
    }
}

#[async_trait]
impl CredentialBackend for DatabaseBackend {
    async fn users_password(&self, username: &str) -> Result<String, Error> {
        let stored: Option<String> = sqlx::query_scalar(&self.principals_query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        // A user the principals query cannot resolve is an infrastructure
        // failure, not a wrong password.
        stored.ok_or_else(|| Error::Login(format!("no principals row for user `{username}`")))
    }

    async fn role_sets(&self, username: &str) -> Result<Vec<RoleSet>, Error> {
        let rows: Vec<(String, String)> = sqlx::query_as(&self.roles_query)
            .bind(username)
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (role, group) in rows {
            grouped.entry(group).or_default().push(role);
        }
        Ok(grouped
            .into_iter()
            .map(|(group, roles)| RoleSet { group, roles })
            .collect())
    }
}

/// The database login module: the generic username/password flow over a
/// [`DatabaseBackend`].
pub type DatabaseLoginModule = UsernamePasswordFlow<DatabaseBackend>;

/// Build the module from configuration options: `url`, `principals_query`,
/// `roles_query`, plus the shared digest/stacking options.
pub async fn database_module(spec: &config::ModuleSpec) -> Result<DatabaseLoginModule, Error> {
    let pool = SqlitePool::connect(spec.require("url")?).await?;
    let backend = DatabaseBackend::new(
        pool,
        spec.require("principals_query")?,
        spec.require("roles_query")?,
    );
    Ok(
        UsernamePasswordFlow::new("database", backend, PasswordDigest::from_spec(spec)?)
            .with_use_first_pass(spec.flag("use_first_pass"))
            .with_password_stacking(spec.flag("password_stacking")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE principals (username TEXT PRIMARY KEY, password TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE roles (username TEXT, role TEXT, role_group TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO principals VALUES ('alice', 'stored-secret')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO roles VALUES ('alice', 'admins', 'Roles'), ('alice', 'editors', 'Roles')",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn backend(pool: SqlitePool) -> DatabaseBackend {
        DatabaseBackend::new(
            pool,
            "SELECT password FROM principals WHERE username = ?",
            "SELECT role, role_group FROM roles WHERE username = ?",
        )
    }

    #[tokio::test]
    async fn stored_password_is_resolved() {
        let backend = backend(seeded_pool().await);
        assert_eq!(
            backend.users_password("alice").await.unwrap(),
            "stored-secret"
        );
    }

    #[tokio::test]
    async fn unknown_user_is_an_infrastructure_failure() {
        let backend = backend(seeded_pool().await);
        let err = backend.users_password("bob").await.unwrap_err();
        assert!(!err.is_credential_rejection());
        assert!(matches!(err, Error::Login(_)));
    }

    #[tokio::test]
    async fn roles_are_grouped() {
        let backend = backend(seeded_pool().await);
        let sets = backend.role_sets("alice").await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].group, "Roles");
        assert_eq!(sets[0].roles, vec!["admins", "editors"]);
    }
}
