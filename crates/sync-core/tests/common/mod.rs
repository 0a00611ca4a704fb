//! Shared fixtures for the engine scenario tests.
#![allow(dead_code)]

use std::sync::Arc;
use sync_core::directory::attributes;
use sync_core::testing::InMemoryDirectory;
use sync_core::{Attributes, DirectoryCredentials, DirectoryModel};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const USERS_BASE: &str = "ou=users,dc=foo,dc=bar";
pub const JDOE_DN: &str = "uid=jdoe,ou=users,dc=foo,dc=bar";

/// Initialize logging for tests
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

pub fn credentials() -> DirectoryCredentials {
    DirectoryCredentials {
        url: "ldap://memory".to_string(),
        bind_dn: "cn=admin,dc=foo,dc=bar".to_string(),
        bind_password: "secret".to_string(),
    }
}

pub fn users_model() -> Arc<DirectoryModel> {
    Arc::new(
        DirectoryModel::new(
            "(&(objectClass=inetOrgPerson)(uid={uid}))",
            USERS_BASE,
            "uid={uid},ou=users,dc=foo,dc=bar",
            attributes([("objectClass", vec!["top", "inetOrgPerson"])]),
        )
        .expect("valid model"),
    )
}

pub fn person(uid: &str, extra: &[(&str, &[&str])]) -> Attributes {
    let mut attrs = attributes([
        ("objectClass", vec!["top", "inetOrgPerson"]),
        ("uid", vec![uid]),
    ]);
    for (attr, values) in extra {
        attrs.insert(
            attr.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
    }
    attrs
}

/// A directory holding `uid=jdoe` with `mail=['foo@bar.com']`.
pub async fn directory_with_jdoe() -> InMemoryDirectory {
    let dir = InMemoryDirectory::new();
    dir.insert_entry(JDOE_DN, person("jdoe", &[("mail", &["foo@bar.com"])]))
        .await;
    dir
}
