#![forbid(unsafe_code)]

use auth::{
    CredentialBackend, DatabaseBackend, Error, HashAlgorithm, HashEncoding, InMemoryDirectory,
    LoginChain, NamingBackend, PasswordDigest, Principal, StaticCallbackHandler,
    UsernamePasswordFlow,
};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

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
    sqlx::query("INSERT INTO principals VALUES ('alice', ?)")
        .bind(sha256_hex("correct horse"))
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO roles VALUES ('alice', 'admins', 'Roles')")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

fn database_backend(pool: SqlitePool) -> DatabaseBackend {
    DatabaseBackend::new(
        pool,
        "SELECT password FROM principals WHERE username = ?",
        "SELECT role, role_group FROM roles WHERE username = ?",
    )
}

#[tokio::test]
async fn database_login_end_to_end() {
    let backend = database_backend(seeded_pool().await);
    let digest = PasswordDigest::new(HashAlgorithm::Sha256, HashEncoding::Hex);
    let mut chain = LoginChain::new(vec![Box::new(UsernamePasswordFlow::new(
        "database", backend, digest,
    ))]);

    let subject = chain
        .authenticate(&StaticCallbackHandler::new("alice", "correct horse"))
        .await
        .unwrap();

    let identities: Vec<_> = subject.principals().map(Principal::name).collect();
    assert_eq!(identities, vec!["alice"]);
    let roles = subject.group("Roles").unwrap();
    assert_eq!(roles.len(), 1);
    assert!(roles.is_member("admins"));
}

#[tokio::test]
async fn wrong_password_fails_the_chain() {
    let backend = database_backend(seeded_pool().await);
    let digest = PasswordDigest::new(HashAlgorithm::Sha256, HashEncoding::Hex);
    let mut chain = LoginChain::new(vec![Box::new(UsernamePasswordFlow::new(
        "database", backend, digest,
    ))]);

    let err = chain
        .authenticate(&StaticCallbackHandler::new("alice", "incorrect horse"))
        .await
        .unwrap_err();
    assert!(err.is_credential_rejection());
}

#[tokio::test]
async fn unknown_user_is_infrastructure_failure() {
    let backend = database_backend(seeded_pool().await);
    let mut chain = LoginChain::new(vec![Box::new(UsernamePasswordFlow::new(
        "database",
        backend,
        PasswordDigest::plaintext(),
    ))]);

    let err = chain
        .authenticate(&StaticCallbackHandler::new("mallory", "whatever"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Login(_)));
}

#[tokio::test]
async fn first_pass_stacks_across_the_chain() {
    // Module 1 validates against the database and publishes the pair.
    let upstream = UsernamePasswordFlow::new(
        "database",
        database_backend(seeded_pool().await),
        PasswordDigest::new(HashAlgorithm::Sha256, HashEncoding::Hex),
    )
    .with_password_stacking(true);

    // Module 2 has an empty backend: any credential collection of its own
    // would fail, so success proves the first pass was reused.
    let empty = Arc::new(InMemoryDirectory::new());
    let downstream = UsernamePasswordFlow::new(
        "naming-directory",
        NamingBackend::new(empty, "security/users"),
        PasswordDigest::plaintext(),
    )
    .with_use_first_pass(true);

    let mut chain = LoginChain::new(vec![Box::new(upstream), Box::new(downstream)]);
    let subject = chain
        .authenticate(&StaticCallbackHandler::new("alice", "correct horse"))
        .await
        .unwrap();

    // Both modules committed the same identity; the subject holds it once.
    let identities: Vec<_> = subject.principals().map(Principal::name).collect();
    assert_eq!(identities, vec!["alice"]);
}

#[tokio::test]
async fn without_first_pass_the_empty_backend_fails_the_chain() {
    let upstream = UsernamePasswordFlow::new(
        "database",
        database_backend(seeded_pool().await),
        PasswordDigest::new(HashAlgorithm::Sha256, HashEncoding::Hex),
    )
    .with_password_stacking(true);

    let empty = Arc::new(InMemoryDirectory::new());
    let downstream = UsernamePasswordFlow::new(
        "naming-directory",
        NamingBackend::new(empty, "security/users"),
        PasswordDigest::plaintext(),
    );

    let mut chain = LoginChain::new(vec![Box::new(upstream), Box::new(downstream)]);
    let err = chain
        .authenticate(&StaticCallbackHandler::new("alice", "correct horse"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Login(_)));
}

#[tokio::test]
async fn logout_removes_the_committed_identity() {
    let backend = database_backend(seeded_pool().await);
    let mut chain = LoginChain::new(vec![Box::new(UsernamePasswordFlow::new(
        "database",
        backend,
        PasswordDigest::new(HashAlgorithm::Sha256, HashEncoding::Hex),
    ))]);

    let mut subject = chain
        .authenticate(&StaticCallbackHandler::new("alice", "correct horse"))
        .await
        .unwrap();
    assert_eq!(subject.principals().count(), 1);

    chain.logout(&mut subject);
    assert_eq!(subject.principals().count(), 0);
}

#[tokio::test]
async fn naming_backend_validates_but_yields_no_roles() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.bind("security/users/alice", "plain-secret");
    let backend = NamingBackend::new(directory, "security/users");
    assert!(backend.role_sets("alice").await.unwrap().is_empty());

    let mut chain = LoginChain::new(vec![Box::new(UsernamePasswordFlow::new(
        "naming-directory",
        backend,
        PasswordDigest::plaintext(),
    ))]);
    let subject = chain
        .authenticate(&StaticCallbackHandler::new("alice", "plain-secret"))
        .await
        .unwrap();
    assert_eq!(subject.principals().count(), 1);
    assert_eq!(subject.groups().count(), 0);
}
