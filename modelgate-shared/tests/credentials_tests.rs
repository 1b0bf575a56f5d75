//! Account registration, login and management against a real database.
//!
//! Requires `DATABASE_URL` pointing at a PostgreSQL server where the test
//! user may create databases.

mod common;

use common::{account, context, Fixture};
use modelgate_shared::auth::credentials::{AccountUpdate, Accounts, NewAccount};
use modelgate_shared::db::{RetryPolicy, Store};
use modelgate_shared::error::{AuthorityError, Resource};
use sqlx::PgPool;
use std::time::Duration;

fn accounts(pool: PgPool) -> Accounts {
    Accounts::new(Store::new(pool, RetryPolicy::default()))
}

#[sqlx::test(migrations = "../migrations")]
async fn test_first_user_is_admin_second_is_not(pool: PgPool) {
    let accounts = accounts(pool);

    let first = accounts.register(account("first")).await.unwrap();
    let second = accounts.register(account("second")).await.unwrap();

    assert!(first.is_admin);
    assert!(!second.is_admin);
    assert!(first.is_active && second.is_active);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_concurrent_first_registrations_yield_one_admin(pool: PgPool) {
    let accounts = accounts(pool);

    let (a, b) = tokio::join!(
        accounts.register(account("racer_a")),
        accounts.register(account("racer_b"))
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.is_admin ^ b.is_admin, "exactly one racer must be admin");
}

#[sqlx::test(migrations = "../migrations")]
async fn test_authenticate_round_trip(pool: PgPool) {
    let accounts = accounts(pool);
    accounts
        .register(NewAccount {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "Tr0ub4dor&3".to_string(),
            full_name: Some("Alice Example".to_string()),
        })
        .await
        .unwrap();

    let user = accounts.authenticate("alice", "Tr0ub4dor&3").await.unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.full_name.as_deref(), Some("Alice Example"));
    assert_ne!(user.hashed_password, "Tr0ub4dor&3");
}

#[sqlx::test(migrations = "../migrations")]
async fn test_login_hashing_leaves_runtime_free(pool: PgPool) {
    let accounts = accounts(pool);
    accounts.register(account("carol")).await.unwrap();

    let login = {
        let accounts = accounts.clone();
        tokio::spawn(async move { accounts.authenticate("carol", "carol-password").await })
    };
    let unknown = {
        let accounts = accounts.clone();
        tokio::spawn(async move { accounts.authenticate("nobody", "carol-password").await })
    };

    // Timers keep firing while both verifications run
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!login.is_finished());
    assert!(!unknown.is_finished());

    assert_eq!(login.await.unwrap().unwrap().username, "carol");
    assert!(matches!(
        unknown.await.unwrap(),
        Err(AuthorityError::InvalidCredentials)
    ));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_mutated_password_fails_uniformly(pool: PgPool) {
    let accounts = accounts(pool);
    accounts.register(account("bob")).await.unwrap();

    for wrong in ["bob-passworD", "bob-passwor", "bob-password!", "Bob-password", "cob-password"] {
        let result = accounts.authenticate("bob", wrong).await;
        assert!(
            matches!(result, Err(AuthorityError::InvalidCredentials)),
            "password {:?} must be rejected",
            wrong
        );
    }

    let unknown = accounts.authenticate("nobody", "bob-password").await;
    assert!(matches!(unknown, Err(AuthorityError::InvalidCredentials)));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_duplicate_username_and_email(pool: PgPool) {
    let accounts = accounts(pool);
    accounts.register(account("carol")).await.unwrap();

    let same_name = accounts
        .register(NewAccount {
            email: "other@example.com".to_string(),
            ..account("carol")
        })
        .await;
    assert!(matches!(same_name, Err(AuthorityError::DuplicateUsername)));

    let same_email = accounts
        .register(NewAccount {
            email: "carol@example.com".to_string(),
            ..account("carol2")
        })
        .await;
    assert!(matches!(same_email, Err(AuthorityError::DuplicateEmail)));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_inactive_user_cannot_log_in(pool: PgPool) {
    let fx = Fixture::new(pool).await;

    fx.accounts
        .update(
            &fx.admin,
            fx.user.user_id,
            AccountUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = fx.accounts.authenticate("user", "user-password").await;
    assert!(matches!(result, Err(AuthorityError::InactiveUser)));

    // The user's still-valid token cannot undo the deactivation
    let reactivate = fx
        .accounts
        .update(
            &fx.user,
            fx.user.user_id,
            AccountUpdate {
                is_active: Some(true),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(reactivate, Err(AuthorityError::Forbidden(_))));
    assert!(!fx.accounts.get(fx.user.user_id).await.unwrap().is_active);
    assert!(matches!(
        fx.accounts.authenticate("user", "user-password").await,
        Err(AuthorityError::InactiveUser)
    ));

    // A wrong password still reads as bad credentials
    let result = fx.accounts.authenticate("user", "wrong").await;
    assert!(matches!(result, Err(AuthorityError::InvalidCredentials)));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_user_updates_own_profile_and_password(pool: PgPool) {
    let fx = Fixture::new(pool).await;

    let updated = fx
        .accounts
        .update(
            &fx.user,
            fx.user.user_id,
            AccountUpdate {
                email: Some("renamed@example.com".to_string()),
                full_name: Some(Some("Renamed".to_string())),
                password: Some("a-brand-new-password".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.email, "renamed@example.com");
    assert_eq!(updated.full_name.as_deref(), Some("Renamed"));
    assert!(!updated.is_admin);

    assert!(fx.accounts.authenticate("user", "a-brand-new-password").await.is_ok());
    assert!(matches!(
        fx.accounts.authenticate("user", "user-password").await,
        Err(AuthorityError::InvalidCredentials)
    ));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_user_cannot_escalate_or_edit_others(pool: PgPool) {
    let fx = Fixture::new(pool).await;

    let escalate = fx
        .accounts
        .update(
            &fx.user,
            fx.user.user_id,
            AccountUpdate {
                is_admin: Some(true),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(escalate, Err(AuthorityError::Forbidden(_))));

    let other = fx
        .accounts
        .update(
            &fx.user,
            fx.admin.user_id,
            AccountUpdate {
                full_name: Some(None),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(other, Err(AuthorityError::Forbidden(_))));

    let still_user = fx.accounts.get(fx.user.user_id).await.unwrap();
    assert!(!still_user.is_admin);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_admin_promotes_and_email_conflicts(pool: PgPool) {
    let fx = Fixture::new(pool).await;

    let promoted = fx
        .accounts
        .update(
            &fx.admin,
            fx.user.user_id,
            AccountUpdate {
                is_admin: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(promoted.is_admin);

    let conflict = fx
        .accounts
        .update(
            &fx.admin,
            fx.user.user_id,
            AccountUpdate {
                email: Some("admin@example.com".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(conflict, Err(AuthorityError::DuplicateEmail)));

    let missing = fx
        .accounts
        .update(&fx.admin, uuid::Uuid::new_v4(), AccountUpdate::default())
        .await;
    assert!(matches!(missing, Err(AuthorityError::NotFound(Resource::User))));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_delete_rules(pool: PgPool) {
    let fx = Fixture::new(pool).await;

    assert!(matches!(
        fx.accounts.delete(&fx.admin, fx.admin.user_id).await,
        Err(AuthorityError::SelfDeletion)
    ));
    assert!(matches!(
        fx.accounts.delete(&fx.user, fx.admin.user_id).await,
        Err(AuthorityError::Forbidden(_))
    ));

    fx.accounts.delete(&fx.admin, fx.user.user_id).await.unwrap();
    assert!(matches!(
        fx.accounts.get(fx.user.user_id).await,
        Err(AuthorityError::NotFound(Resource::User))
    ));
    assert!(matches!(
        fx.accounts.delete(&fx.admin, fx.user.user_id).await,
        Err(AuthorityError::NotFound(Resource::User))
    ));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_list_is_admin_only_and_paginated(pool: PgPool) {
    let fx = Fixture::new(pool).await;
    fx.accounts.register(account("third")).await.unwrap();

    assert!(matches!(
        fx.accounts.list(&fx.user, 0, 100).await,
        Err(AuthorityError::Forbidden(_))
    ));

    let all = fx.accounts.list(&fx.admin, 0, 100).await.unwrap();
    let names: Vec<_> = all.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["admin", "user", "third"]);

    let page = fx.accounts.list(&fx.admin, 1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].username, "user");

    let admin = fx.accounts.get(fx.admin.user_id).await.unwrap();
    assert_eq!(context(&admin), fx.admin);
}
