//! DirectoryModel behavior against an in-memory directory.

mod common;

use common::*;
use sync_core::directory::attributes;
use sync_core::model::identity;
use sync_core::testing::{InMemoryDirectory, WriteRecord};
use sync_core::{DirectoryConnector, SyncError, WriteOperation};

#[tokio::test]
async fn test_get_distinguishes_none_one_and_many() {
    init_logging();
    let dir = directory_with_jdoe().await;
    dir.insert_entry(
        "uid=dup,ou=a,ou=users,dc=foo,dc=bar",
        person("dup", &[]),
    )
    .await;
    dir.insert_entry(
        "uid=dup,ou=b,ou=users,dc=foo,dc=bar",
        person("dup", &[]),
    )
    .await;
    let model = users_model();
    let mut conn = dir.bind(&credentials()).await.unwrap();

    let missing = model
        .get(conn.as_mut(), &identity([("uid", "nobody")]))
        .await
        .unwrap();
    assert!(missing.is_none());

    let found = model
        .get(conn.as_mut(), &identity([("uid", "jdoe")]))
        .await
        .unwrap()
        .expect("jdoe exists");
    assert_eq!(found.dn, JDOE_DN);
    assert_eq!(found.values("mail"), ["foo@bar.com"]);

    let err = model
        .get(conn.as_mut(), &identity([("uid", "dup")]))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::AmbiguousEntry { count: 2, .. }));
}

#[tokio::test]
async fn test_create_then_get_returns_a_superset() {
    init_logging();
    let dir = InMemoryDirectory::new();
    let model = users_model();
    let mut conn = dir.bind(&credentials()).await.unwrap();

    let supplied = attributes([("uid", vec!["jane"]), ("mail", vec!["jane@bar.com"])]);
    let dn = model.create(conn.as_mut(), &supplied).await.unwrap();
    assert_eq!(dn, "uid=jane,ou=users,dc=foo,dc=bar");

    let entry = model
        .get(conn.as_mut(), &identity([("uid", "jane")]))
        .await
        .unwrap()
        .expect("created entry is found");
    assert_eq!(entry.dn, dn);
    for (attr, values) in supplied.iter().chain(model.static_attrs.iter()) {
        for value in values {
            assert!(entry.values(attr).contains(value), "{attr}={value} missing");
        }
    }
}

#[tokio::test]
async fn test_accumulating_modify_is_idempotent() {
    init_logging();
    let dir = directory_with_jdoe().await;
    let model = users_model();
    let mut conn = dir.bind(&credentials()).await.unwrap();
    let ident = identity([("uid", "jdoe")]);
    let changed = identity([("mail", "foo2@bar.com")]);

    let first = model
        .modify(conn.as_mut(), &ident, &changed, true)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    let second = model
        .modify(conn.as_mut(), &ident, &changed, true)
        .await
        .unwrap();
    assert!(second.is_empty());

    let entry = dir.entry(JDOE_DN).await.unwrap();
    assert_eq!(entry.values("mail"), ["foo@bar.com", "foo2@bar.com"]);
    assert_eq!(dir.writes().await.len(), 1);
}

#[tokio::test]
async fn test_overriding_modify_only_touches_changed_attributes() {
    init_logging();
    let dir = directory_with_jdoe().await;
    dir.insert_entry(
        "uid=jane,ou=users,dc=foo,dc=bar",
        person("jane", &[("mail", &["jane@bar.com"]), ("description", &["unmanaged"])]),
    )
    .await;
    let model = users_model();
    let mut conn = dir.bind(&credentials()).await.unwrap();

    let mut changed = identity([("mail", "jane@new.com")]);
    changed.insert("telephoneNumber".to_string(), Vec::new());
    model
        .modify(conn.as_mut(), &identity([("uid", "jane")]), &changed, false)
        .await
        .unwrap();

    let entry = dir.entry("uid=jane,ou=users,dc=foo,dc=bar").await.unwrap();
    assert_eq!(entry.values("mail"), ["jane@new.com"]);
    assert_eq!(entry.values("description"), ["unmanaged"]);
}

#[tokio::test]
async fn test_remove_absent_value_is_a_noop() {
    init_logging();
    let dir = directory_with_jdoe().await;
    let model = users_model();
    let mut conn = dir.bind(&credentials()).await.unwrap();
    let before = dir.entry(JDOE_DN).await.unwrap();

    let delta = model
        .remove_from_attr(conn.as_mut(), &identity([("uid", "jdoe")]), "mail", "other@bar.com")
        .await
        .unwrap();
    assert!(delta.is_empty());
    assert_eq!(dir.entry(JDOE_DN).await.unwrap(), before);
    assert!(dir.writes().await.is_empty());

    model
        .remove_from_attr(conn.as_mut(), &identity([("uid", "jdoe")]), "mail", "foo@bar.com")
        .await
        .unwrap();
    assert!(dir.entry(JDOE_DN).await.unwrap().values("mail").is_empty());
}

#[tokio::test]
async fn test_modify_and_delete_require_an_existing_entry() {
    init_logging();
    let dir = InMemoryDirectory::new();
    let model = users_model();
    let mut conn = dir.bind(&credentials()).await.unwrap();
    let ghost = identity([("uid", "ghost")]);

    let err = model
        .modify(conn.as_mut(), &ghost, &identity([("mail", "x@y")]), false)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = model.delete(conn.as_mut(), &ghost).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_is_not_idempotent() {
    init_logging();
    let dir = directory_with_jdoe().await;
    let model = users_model();
    let mut conn = dir.bind(&credentials()).await.unwrap();

    let err = model
        .create(conn.as_mut(), &identity([("uid", "jdoe")]))
        .await
        .unwrap_err();
    assert!(
        matches!(
            &err,
            SyncError::DirectoryWrite {
                operation: WriteOperation::Add,
                dn,
                ..
            } if dn == JDOE_DN
        ),
        "{err:?}"
    );
    assert!(dir.writes().await.is_empty());
    assert_eq!(
        dir.entry(JDOE_DN).await.unwrap().values("mail"),
        ["foo@bar.com"]
    );
}

#[tokio::test]
async fn test_transport_failures_are_wrapped() {
    init_logging();
    let dir = InMemoryDirectory::new();
    let model = users_model();
    let mut conn = dir.bind(&credentials()).await.unwrap();
    dir.fail_next_write("server busy").await;

    let err = model
        .create(conn.as_mut(), &identity([("uid", "jane")]))
        .await
        .unwrap_err();
    match &err {
        SyncError::DirectoryWrite { operation, dn, .. } => {
            assert_eq!(operation.to_string(), "add");
            assert_eq!(dn, "uid=jane,ou=users,dc=foo,dc=bar");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(std::error::Error::source(&err)
        .expect("has a source")
        .to_string()
        .contains("server busy"));

    // The failed write left nothing behind, the next one goes through.
    model
        .create(conn.as_mut(), &identity([("uid", "jane")]))
        .await
        .unwrap();
    assert!(matches!(dir.writes().await.as_slice(), [WriteRecord::Add { .. }]));
}
