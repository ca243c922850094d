//! Shared tests for IdentityRepo implementations
//!
//! These exercise the specialization synchronizer: every write must leave the
//! base row and the current role's specialization row consistent.

use uuid::Uuid;

use crate::{
    auth::Actor,
    authz::VisibilityScope,
    db::{
        error::DbError,
        repos::{IDENTITY_SORT, IdentityRepo, ListParams},
        tests::harness::RawPool,
    },
    models::{
        ChangeRole, CreateIdentity, IdentityFilter, Profile, ProfileFields, Role, UpdateIdentity,
        UpdateProfileFields,
    },
};

// ============================================================================
// Test Input Helpers
// ============================================================================

fn create_input(handle: &str, role: Role) -> CreateIdentity {
    CreateIdentity {
        handle: handle.to_string(),
        password: "correct-horse".to_string(),
        name: format!("Name {}", handle),
        surname: "Tester".to_string(),
        email: format!("{}@school.test", handle),
        role,
        phone: None,
        gender: None,
        birth_date: None,
        profile: ProfileFields::default(),
    }
}

fn admin_scope() -> VisibilityScope {
    VisibilityScope::for_actor(&Actor::new(Uuid::new_v4(), "ADMIN"))
}

fn first_page() -> ListParams {
    ListParams::first_page(&IDENTITY_SORT, 100)
}

pub struct IdentityTestContext<'a> {
    pub repo: &'a dyn IdentityRepo,
    pub raw: &'a RawPool,
}

impl IdentityTestContext<'_> {
    pub async fn create(&self, handle: &str, role: Role) -> Uuid {
        self.repo
            .create(&create_input(handle, role), "hash")
            .await
            .expect("Failed to create test identity")
            .identity
            .id
    }
}

// ============================================================================
// Create
// ============================================================================

pub async fn test_create_writes_base_and_profile(ctx: &IdentityTestContext<'_>) {
    let mut input = create_input("ada", Role::Instructor);
    input.profile.title = Some("Dr.".to_string());

    let view = ctx
        .repo
        .create(&input, "hash")
        .await
        .expect("Failed to create identity");

    assert_eq!(view.identity.role, Role::Instructor);
    assert!(view.identity.is_active);
    match view.profile {
        Some(Profile::Instructor(p)) => assert_eq!(p.title.as_deref(), Some("Dr.")),
        other => panic!("unexpected profile: {:?}", other),
    }

    let presence = ctx.repo.profile_presence(view.identity.id).await.unwrap();
    assert_eq!(presence, vec![Role::Instructor]);
}

pub async fn test_create_duplicate_handle_conflicts_across_roles(ctx: &IdentityTestContext<'_>) {
    ctx.create("jdoe", Role::Student).await;

    let mut input = create_input("JDoe", Role::Manager);
    input.email = "other@school.test".to_string();
    let result = ctx.repo.create(&input, "hash").await;

    assert!(matches!(result, Err(DbError::Conflict(_))));
}

pub async fn test_create_duplicate_email_conflicts(ctx: &IdentityTestContext<'_>) {
    ctx.create("first", Role::Student).await;

    let mut input = create_input("second", Role::Instructor);
    input.email = "FIRST@school.test".to_string();
    let result = ctx.repo.create(&input, "hash").await;

    assert!(matches!(result, Err(DbError::Conflict(_))));
}

pub async fn test_create_with_missing_advisor_leaves_nothing(ctx: &IdentityTestContext<'_>) {
    let mut input = create_input("orphan", Role::Student);
    input.profile.advisor_id = Some(Uuid::new_v4());

    let result = ctx.repo.create(&input, "hash").await;
    assert!(matches!(result, Err(DbError::Validation(_))));

    let creds = ctx.repo.get_credentials_by_handle("orphan").await.unwrap();
    assert!(creds.is_none());
}

pub async fn test_create_with_non_instructor_advisor_fails(ctx: &IdentityTestContext<'_>) {
    let not_instructor = ctx.create("peer", Role::Student).await;

    let mut input = create_input("advisee", Role::Student);
    input.profile.advisor_id = Some(not_instructor);

    let result = ctx.repo.create(&input, "hash").await;
    assert!(matches!(result, Err(DbError::Validation(_))));
}

pub async fn test_create_rejects_foreign_profile_fields(ctx: &IdentityTestContext<'_>) {
    let mut input = create_input("mixed", Role::Manager);
    input.profile.father_name = Some("Bob".to_string());

    let result = ctx.repo.create(&input, "hash").await;
    assert!(matches!(result, Err(DbError::Validation(_))));
}

// ============================================================================
// Reads
// ============================================================================

pub async fn test_get_view_not_found(ctx: &IdentityTestContext<'_>) {
    let view = ctx.repo.get_view(Uuid::new_v4()).await.unwrap();
    assert!(view.is_none());
}

pub async fn test_credentials_lookup_is_case_insensitive(ctx: &IdentityTestContext<'_>) {
    let id = ctx.create("MixedCase", Role::Student).await;

    let creds = ctx
        .repo
        .get_credentials_by_handle("mixedcase")
        .await
        .unwrap()
        .expect("credentials should exist");

    assert_eq!(creds.id, id);
    assert_eq!(creds.password_hash, "hash");
    assert_eq!(creds.role, "STUDENT");
}

pub async fn test_list_respects_visibility(ctx: &IdentityTestContext<'_>) {
    let student = ctx.create("s1", Role::Student).await;
    ctx.create("i1", Role::Instructor).await;
    ctx.create("m1", Role::Manager).await;
    ctx.create("a1", Role::Admin).await;
    let am = ctx.create("am1", Role::AssistantManager).await;

    let all = ctx
        .repo
        .list(&admin_scope(), &IdentityFilter::default(), &first_page())
        .await
        .unwrap();
    assert_eq!(all.total, 5);

    let am_scope = VisibilityScope::for_actor(&Actor::new(am, "ASSISTANT_MANAGER"));
    let visible = ctx
        .repo
        .list(&am_scope, &IdentityFilter::default(), &first_page())
        .await
        .unwrap();
    let mut roles: Vec<Role> = visible.items.iter().map(|i| i.role).collect();
    roles.sort_by_key(|r| r.rank());
    assert_eq!(
        roles,
        vec![Role::Student, Role::Instructor, Role::AssistantManager]
    );

    let student_scope = VisibilityScope::for_actor(&Actor::new(student, "STUDENT"));
    let own = ctx
        .repo
        .list(&student_scope, &IdentityFilter::default(), &first_page())
        .await
        .unwrap();
    assert_eq!(own.total, 1);
    assert_eq!(own.items[0].id, student);
}

pub async fn test_list_filters_and_paginates(ctx: &IdentityTestContext<'_>) {
    for i in 0..5 {
        ctx.create(&format!("student{}", i), Role::Student).await;
    }
    ctx.create("teacher", Role::Instructor).await;

    let filter = IdentityFilter {
        role: Some(Role::Student),
        is_active: None,
    };
    let params = ListParams::resolve(&IDENTITY_SORT, Some(1), Some(2), Some("handle"), Some("asc"), 20, 100);
    let page = ctx
        .repo
        .list(&admin_scope(), &filter, &params)
        .await
        .unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].handle, "student2");
    assert_eq!(page.items[1].handle, "student3");
}

// ============================================================================
// Update
// ============================================================================

pub async fn test_update_mirrors_into_profile(ctx: &IdentityTestContext<'_>) {
    let advisor = ctx.create("mentor", Role::Instructor).await;
    let id = ctx.create("pupil", Role::Student).await;

    let input = UpdateIdentity {
        surname: Some("Renamed".to_string()),
        profile: UpdateProfileFields {
            mother_name: Some(Some("Alice".to_string())),
            advisor_id: Some(Some(advisor)),
            ..Default::default()
        },
        ..Default::default()
    };
    let view = ctx.repo.update(id, &input).await.expect("update failed");

    assert_eq!(view.identity.surname, "Renamed");
    match view.profile {
        Some(Profile::Student(p)) => {
            assert_eq!(p.mother_name.as_deref(), Some("Alice"));
            assert_eq!(p.advisor_id, Some(advisor));
        }
        other => panic!("unexpected profile: {:?}", other),
    }
}

pub async fn test_update_recreates_missing_profile(ctx: &IdentityTestContext<'_>) {
    let id = ctx.create("orphan", Role::Manager).await;
    ctx.raw.delete_profile_row(Role::Manager, id).await;
    assert!(ctx.repo.profile_presence(id).await.unwrap().is_empty());

    let input = UpdateIdentity {
        surname: Some("Healed".to_string()),
        ..Default::default()
    };
    let view = ctx.repo.update(id, &input).await.expect("update failed");

    assert!(matches!(view.profile, Some(Profile::Manager(_))));
    assert_eq!(
        ctx.repo.profile_presence(id).await.unwrap(),
        vec![Role::Manager]
    );
}

pub async fn test_update_bad_advisor_is_atomic(ctx: &IdentityTestContext<'_>) {
    let id = ctx.create("steady", Role::Student).await;

    let input = UpdateIdentity {
        name: Some("Changed".to_string()),
        profile: UpdateProfileFields {
            advisor_id: Some(Some(Uuid::new_v4())),
            ..Default::default()
        },
        ..Default::default()
    };
    let result = ctx.repo.update(id, &input).await;
    assert!(matches!(result, Err(DbError::Validation(_))));

    let view = ctx.repo.get_view(id).await.unwrap().unwrap();
    assert_eq!(view.identity.name, "Name steady");
}

pub async fn test_update_email_to_taken_conflicts(ctx: &IdentityTestContext<'_>) {
    ctx.create("owner", Role::Student).await;
    let id = ctx.create("taker", Role::Student).await;

    let input = UpdateIdentity {
        email: Some("owner@school.test".to_string()),
        ..Default::default()
    };
    let result = ctx.repo.update(id, &input).await;
    assert!(matches!(result, Err(DbError::Conflict(_))));

    // Re-submitting one's own email is fine
    let input = UpdateIdentity {
        email: Some("taker@school.test".to_string()),
        ..Default::default()
    };
    assert!(ctx.repo.update(id, &input).await.is_ok());
}

pub async fn test_update_not_found(ctx: &IdentityTestContext<'_>) {
    let result = ctx
        .repo
        .update(Uuid::new_v4(), &UpdateIdentity::default())
        .await;
    assert!(matches!(result, Err(DbError::NotFound)));
}

// ============================================================================
// ChangeRole / SetActive
// ============================================================================

pub async fn test_change_role_creates_new_profile(ctx: &IdentityTestContext<'_>) {
    let id = ctx.create("climber", Role::Student).await;

    let input = ChangeRole {
        role: Role::Instructor,
        profile: ProfileFields {
            title: Some("Prof.".to_string()),
            ..Default::default()
        },
    };
    let view = ctx.repo.change_role(id, &input).await.expect("change_role failed");

    assert_eq!(view.identity.role, Role::Instructor);
    assert!(matches!(view.profile, Some(Profile::Instructor(_))));

    let presence = ctx.repo.profile_presence(id).await.unwrap();
    assert!(presence.contains(&Role::Instructor));
}

pub async fn test_change_role_clears_advisor_links(ctx: &IdentityTestContext<'_>) {
    let advisor = ctx.create("adviser", Role::Instructor).await;
    let mut input = create_input("advised", Role::Student);
    input.profile.advisor_id = Some(advisor);
    let student = ctx.repo.create(&input, "hash").await.unwrap().identity.id;

    ctx.repo
        .change_role(
            advisor,
            &ChangeRole {
                role: Role::Manager,
                profile: ProfileFields::default(),
            },
        )
        .await
        .unwrap();

    let view = ctx.repo.get_view(student).await.unwrap().unwrap();
    match view.profile {
        Some(Profile::Student(p)) => assert_eq!(p.advisor_id, None),
        other => panic!("unexpected profile: {:?}", other),
    }
}

pub async fn test_change_role_rejects_self_advisor(ctx: &IdentityTestContext<'_>) {
    let id = ctx.create("selfish", Role::Instructor).await;

    let input = ChangeRole {
        role: Role::Student,
        profile: ProfileFields {
            advisor_id: Some(id),
            ..Default::default()
        },
    };
    let result = ctx.repo.change_role(id, &input).await;
    assert!(matches!(result, Err(DbError::Validation(_))));

    let view = ctx.repo.get_view(id).await.unwrap().unwrap();
    assert_eq!(view.identity.role, Role::Instructor);
    assert_eq!(
        ctx.repo.profile_presence(id).await.unwrap(),
        vec![Role::Instructor]
    );
}

pub async fn test_change_role_not_found(ctx: &IdentityTestContext<'_>) {
    let result = ctx
        .repo
        .change_role(
            Uuid::new_v4(),
            &ChangeRole {
                role: Role::Admin,
                profile: ProfileFields::default(),
            },
        )
        .await;
    assert!(matches!(result, Err(DbError::NotFound)));
}

pub async fn test_set_active_updates_flag_profile(ctx: &IdentityTestContext<'_>) {
    let id = ctx.create("sleeper", Role::Student).await;

    let identity = ctx.repo.set_active(id, false).await.unwrap();
    assert!(!identity.is_active);

    let view = ctx.repo.get_view(id).await.unwrap().unwrap();
    assert!(!view.identity.is_active);
    match view.profile {
        Some(Profile::Student(p)) => assert!(!p.is_active),
        other => panic!("unexpected profile: {:?}", other),
    }

    let filter = IdentityFilter {
        role: None,
        is_active: Some(false),
    };
    let inactive = ctx
        .repo
        .list(&admin_scope(), &filter, &first_page())
        .await
        .unwrap();
    assert_eq!(inactive.total, 1);
}

pub async fn test_set_active_instructor_touches_base_only(ctx: &IdentityTestContext<'_>) {
    let id = ctx.create("lecturer", Role::Instructor).await;

    let identity = ctx.repo.set_active(id, false).await.unwrap();
    assert!(!identity.is_active);

    let view = ctx.repo.get_view(id).await.unwrap().unwrap();
    assert!(matches!(view.profile, Some(Profile::Instructor(_))));
}

// ============================================================================
// Delete / stale profiles
// ============================================================================

pub async fn test_delete_removes_every_profile(ctx: &IdentityTestContext<'_>) {
    let id = ctx.create("shifty", Role::Student).await;
    ctx.repo
        .change_role(
            id,
            &ChangeRole {
                role: Role::AssistantManager,
                profile: ProfileFields::default(),
            },
        )
        .await
        .unwrap();

    let result = ctx.repo.delete(id).await.unwrap();
    assert_eq!(result.profiles_deleted, 2);

    assert!(ctx.repo.get_by_id(id).await.unwrap().is_none());
    assert!(ctx.repo.profile_presence(id).await.unwrap().is_empty());
}

pub async fn test_delete_clears_advisor_links(ctx: &IdentityTestContext<'_>) {
    let advisor = ctx.create("leaving", Role::Instructor).await;
    let mut input = create_input("left", Role::Student);
    input.profile.advisor_id = Some(advisor);
    let student = ctx.repo.create(&input, "hash").await.unwrap().identity.id;

    let result = ctx.repo.delete(advisor).await.unwrap();
    assert_eq!(result.advisor_links_cleared, 1);

    let view = ctx.repo.get_view(student).await.unwrap().unwrap();
    match view.profile {
        Some(Profile::Student(p)) => assert_eq!(p.advisor_id, None),
        other => panic!("unexpected profile: {:?}", other),
    }
}

pub async fn test_delete_not_found(ctx: &IdentityTestContext<'_>) {
    let result = ctx.repo.delete(Uuid::new_v4()).await;
    assert!(matches!(result, Err(DbError::NotFound)));
}

pub async fn test_purge_stale_profiles(ctx: &IdentityTestContext<'_>) {
    let id = ctx.create("promoted", Role::Student).await;
    ctx.repo
        .change_role(
            id,
            &ChangeRole {
                role: Role::Instructor,
                profile: ProfileFields::default(),
            },
        )
        .await
        .unwrap();
    let untouched = ctx.create("steady-student", Role::Student).await;

    assert_eq!(
        ctx.repo.profile_presence(id).await.unwrap(),
        vec![Role::Student, Role::Instructor]
    );

    let deleted = ctx.repo.purge_stale_profiles(Some(id)).await.unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(
        ctx.repo.profile_presence(id).await.unwrap(),
        vec![Role::Instructor]
    );
    assert_eq!(
        ctx.repo.profile_presence(untouched).await.unwrap(),
        vec![Role::Student]
    );

    // Nothing left to purge
    assert_eq!(ctx.repo.purge_stale_profiles(None).await.unwrap(), 0);
}

pub async fn test_change_role_back_reuses_stale_profile(ctx: &IdentityTestContext<'_>) {
    let mut input = create_input("boomerang", Role::Student);
    input.profile.father_name = Some("Carl".to_string());
    let id = ctx.repo.create(&input, "hash").await.unwrap().identity.id;

    for role in [Role::Instructor, Role::Student] {
        ctx.repo
            .change_role(
                id,
                &ChangeRole {
                    role,
                    profile: ProfileFields::default(),
                },
            )
            .await
            .unwrap();
    }

    let view = ctx.repo.get_view(id).await.unwrap().unwrap();
    match view.profile {
        Some(Profile::Student(p)) => assert_eq!(p.father_name.as_deref(), Some("Carl")),
        other => panic!("unexpected profile: {:?}", other),
    }
}

pub async fn test_exists_with_role(ctx: &IdentityTestContext<'_>) {
    assert!(!ctx.repo.exists_with_role(Role::Admin).await.unwrap());
    ctx.create("root", Role::Admin).await;
    assert!(ctx.repo.exists_with_role(Role::Admin).await.unwrap());
}

// ============================================================================
// SQLite Tests
// ============================================================================

#[cfg(all(test, feature = "database-sqlite"))]
mod sqlite_tests {
    use super::*;
    use crate::db::{
        sqlite::SqliteIdentityRepo,
        tests::harness::{create_sqlite_pool, run_sqlite_migrations},
    };

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let pool = create_sqlite_pool().await;
                run_sqlite_migrations(&pool).await;
                let repo = SqliteIdentityRepo::new(pool.clone());
                let raw = RawPool::Sqlite(pool);
                let ctx = IdentityTestContext { repo: &repo, raw: &raw };
                super::$name(&ctx).await;
            }
        };
    }

    sqlite_test!(test_create_writes_base_and_profile);
    sqlite_test!(test_create_duplicate_handle_conflicts_across_roles);
    sqlite_test!(test_create_duplicate_email_conflicts);
    sqlite_test!(test_create_with_missing_advisor_leaves_nothing);
    sqlite_test!(test_create_with_non_instructor_advisor_fails);
    sqlite_test!(test_create_rejects_foreign_profile_fields);
    sqlite_test!(test_get_view_not_found);
    sqlite_test!(test_credentials_lookup_is_case_insensitive);
    sqlite_test!(test_list_respects_visibility);
    sqlite_test!(test_list_filters_and_paginates);
    sqlite_test!(test_update_mirrors_into_profile);
    sqlite_test!(test_update_recreates_missing_profile);
    sqlite_test!(test_update_bad_advisor_is_atomic);
    sqlite_test!(test_update_email_to_taken_conflicts);
    sqlite_test!(test_update_not_found);
    sqlite_test!(test_change_role_creates_new_profile);
    sqlite_test!(test_change_role_clears_advisor_links);
    sqlite_test!(test_change_role_rejects_self_advisor);
    sqlite_test!(test_change_role_not_found);
    sqlite_test!(test_set_active_updates_flag_profile);
    sqlite_test!(test_set_active_instructor_touches_base_only);
    sqlite_test!(test_delete_removes_every_profile);
    sqlite_test!(test_delete_clears_advisor_links);
    sqlite_test!(test_delete_not_found);
    sqlite_test!(test_purge_stale_profiles);
    sqlite_test!(test_change_role_back_reuses_stale_profile);
    sqlite_test!(test_exists_with_role);
}

// ============================================================================
// PostgreSQL Tests - Require Docker, run with `cargo test -- --ignored`
// ============================================================================

#[cfg(all(test, feature = "database-postgres"))]
mod postgres_tests {
    use super::*;
    use crate::db::{
        postgres::PostgresIdentityRepo,
        tests::harness::postgres::{create_isolated_postgres_pool, run_postgres_migrations},
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = create_isolated_postgres_pool().await;
                run_postgres_migrations(&pool).await;
                let repo = PostgresIdentityRepo::new(pool.clone(), None);
                let raw = RawPool::Postgres(pool);
                let ctx = IdentityTestContext { repo: &repo, raw: &raw };
                super::$name(&ctx).await;
            }
        };
    }

    postgres_test!(test_create_writes_base_and_profile);
    postgres_test!(test_create_duplicate_handle_conflicts_across_roles);
    postgres_test!(test_create_duplicate_email_conflicts);
    postgres_test!(test_create_with_missing_advisor_leaves_nothing);
    postgres_test!(test_create_with_non_instructor_advisor_fails);
    postgres_test!(test_create_rejects_foreign_profile_fields);
    postgres_test!(test_get_view_not_found);
    postgres_test!(test_credentials_lookup_is_case_insensitive);
    postgres_test!(test_list_respects_visibility);
    postgres_test!(test_list_filters_and_paginates);
    postgres_test!(test_update_mirrors_into_profile);
    postgres_test!(test_update_recreates_missing_profile);
    postgres_test!(test_update_bad_advisor_is_atomic);
    postgres_test!(test_update_email_to_taken_conflicts);
    postgres_test!(test_update_not_found);
    postgres_test!(test_change_role_creates_new_profile);
    postgres_test!(test_change_role_clears_advisor_links);
    postgres_test!(test_change_role_rejects_self_advisor);
    postgres_test!(test_change_role_not_found);
    postgres_test!(test_set_active_updates_flag_profile);
    postgres_test!(test_set_active_instructor_touches_base_only);
    postgres_test!(test_delete_removes_every_profile);
    postgres_test!(test_delete_clears_advisor_links);
    postgres_test!(test_delete_not_found);
    postgres_test!(test_purge_stale_profiles);
    postgres_test!(test_change_role_back_reuses_stale_profile);
    postgres_test!(test_exists_with_role);
}
