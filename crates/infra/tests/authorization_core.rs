use std::sync::Arc;

use chrono::{Duration, Utc};

use orgguard_auth::{
    explain_permission, AccessError, Authenticator, AuthzConfig, AuthzError, ContextBuilder, DirectoryStore,
    GrantSource, HierarchyError, HierarchyResolver, IdentityClaim, LifecycleError, Membership, NewMembership,
    NewOrganization, OrgRole, Organization, OrganizationService, Permission, PermissionMatrix, Slug, SystemRole,
    User,
};
use orgguard_core::DomainError;
use orgguard_infra::InMemoryDirectoryStore;

struct Fixture {
    store: Arc<InMemoryDirectoryStore>,
    service: OrganizationService,
    contexts: ContextBuilder,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(AuthzConfig::default())
    }

    fn with_config(config: AuthzConfig) -> Self {
        let store = Arc::new(InMemoryDirectoryStore::new());
        let dyn_store: Arc<dyn DirectoryStore> = store.clone();
        Self {
            service: OrganizationService::new(dyn_store.clone(), &config),
            contexts: ContextBuilder::new(dyn_store),
            store,
        }
    }

    async fn user(&self, subject: &str) -> User {
        let user = User::provisioned(subject, Utc::now());
        self.store.insert_user(user.clone()).await.unwrap();
        user
    }

    async fn org(&self, owner: &User, name: &str, parent: Option<&Organization>) -> Organization {
        self.service
            .create_organization(
                owner,
                NewOrganization {
                    name: name.to_string(),
                    slug: None,
                    parent_id: parent.map(|p| p.id),
                    settings: None,
                },
            )
            .await
            .unwrap()
            .organization
    }

    async fn ctx(&self, user: &User, org: &Organization) -> Result<orgguard_auth::AuthorizationContext, AccessError> {
        let identity = orgguard_auth::Identity {
            user: user.clone(),
            claim: claim(&user.external_id),
        };
        self.contexts.build(Some(&identity), Some(org.slug.as_str())).await
    }
}

fn claim(subject: &str) -> IdentityClaim {
    let now = Utc::now();
    IdentityClaim {
        subject: subject.to_string(),
        email: Some(format!("{subject}@example.com")),
        name: None,
        email_verified: true,
        disabled: false,
        issued_at: now - Duration::minutes(1),
        expires_at: now + Duration::minutes(10),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context building
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn context_steps_fail_in_order() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let org = f.org(&owner, "Acme", None).await;

    assert_eq!(
        f.contexts.build(None, Some("acme")).await.unwrap_err(),
        AccessError::Denied(AuthzError::AuthenticationRequired)
    );

    let identity = orgguard_auth::Identity {
        user: owner.clone(),
        claim: claim("owner"),
    };
    assert_eq!(
        f.contexts.build(Some(&identity), None).await.unwrap_err(),
        AccessError::Denied(AuthzError::TenantRequired)
    );
    assert_eq!(
        f.contexts.build(Some(&identity), Some("nope")).await.unwrap_err(),
        AccessError::Denied(AuthzError::OrganizationNotFound)
    );

    let outsider = f.user("outsider").await;
    assert_eq!(
        f.ctx(&outsider, &org).await.unwrap_err(),
        AccessError::Denied(AuthzError::AccessDenied)
    );

    let ctx = f.ctx(&owner, &org).await.unwrap();
    assert_eq!(ctx.role(), OrgRole::Owner);
    assert!(!ctx.is_bypass());
}

#[tokio::test]
async fn super_admin_bypasses_membership() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let org = f.org(&owner, "Acme", None).await;

    let root = User::provisioned("root", Utc::now()).with_system_role(SystemRole::SuperAdmin);
    f.store.insert_user(root.clone()).await.unwrap();

    let ctx = f.ctx(&root, &org).await.unwrap();
    assert!(ctx.is_bypass());
    assert!(ctx.membership().is_none());
    assert!(ctx.allows(Permission::ORGANIZATIONS_DELETE));

    // system_admin is not the top tier.
    let admin = User::provisioned("sysadmin", Utc::now()).with_system_role(SystemRole::SystemAdmin);
    f.store.insert_user(admin.clone()).await.unwrap();
    assert_eq!(
        f.ctx(&admin, &org).await.unwrap_err(),
        AccessError::Denied(AuthzError::AccessDenied)
    );
}

#[tokio::test]
async fn inactive_membership_is_treated_as_missing() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let org = f.org(&owner, "Acme", None).await;
    let member = f.user("member").await;

    let owner_ctx = f.ctx(&owner, &org).await.unwrap();
    let m = f
        .service
        .add_member(
            &owner_ctx,
            NewMembership {
                user_id: member.id,
                role: Some(OrgRole::Viewer),
                permissions: None,
                invited_by: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(m.invited_by, Some(owner.id));
    assert!(f.ctx(&member, &org).await.is_ok());

    f.service.set_member_active(&owner_ctx, m.id, false).await.unwrap();
    assert_eq!(
        f.ctx(&member, &org).await.unwrap_err(),
        AccessError::Denied(AuthzError::AccessDenied)
    );
}

#[tokio::test]
async fn optional_context_absorbs_tenant_failures_only() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    f.org(&owner, "Acme", None).await;
    let identity = orgguard_auth::Identity {
        user: owner.clone(),
        claim: claim("owner"),
    };

    assert!(f.contexts.build_optional(Some(&identity), None).await.unwrap().is_none());
    assert!(f
        .contexts
        .build_optional(Some(&identity), Some("missing"))
        .await
        .unwrap()
        .is_none());
    assert!(f
        .contexts
        .build_optional(Some(&identity), Some("acme"))
        .await
        .unwrap()
        .is_some());
    assert_eq!(
        f.contexts.build_optional(None, Some("acme")).await.unwrap_err(),
        AccessError::Denied(AuthzError::AuthenticationRequired)
    );
}

#[tokio::test]
async fn soft_deleted_organization_stops_resolving() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let org = f.org(&owner, "Acme", None).await;
    let ctx = f.ctx(&owner, &org).await.unwrap();

    f.service.soft_delete(&ctx).await.unwrap();
    assert_eq!(
        f.ctx(&owner, &org).await.unwrap_err(),
        AccessError::Denied(AuthzError::OrganizationNotFound)
    );
}

#[tokio::test]
async fn successful_context_stamps_last_access() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let org = f.org(&owner, "Acme", None).await;
    let ctx = f.ctx(&owner, &org).await.unwrap();
    let id = ctx.membership().unwrap().id;

    for _ in 0..50 {
        if f.store.membership(id).await.unwrap().unwrap().last_access_at.is_some() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("last_access_at was never stamped");
}

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_subject_is_provisioned_once() {
    let f = Fixture::new();
    let auth = Authenticator::new(f.store.clone(), true);

    let first = auth.authenticate(claim("new-user"), Utc::now()).await.unwrap();
    let second = auth.authenticate(claim("new-user"), Utc::now()).await.unwrap();
    assert_eq!(first.user.id, second.user.id);
    assert_eq!(first.user.system_role, SystemRole::User);
    assert_eq!(first.user.email.as_deref(), Some("new-user@example.com"));
}

#[tokio::test]
async fn disabled_claims_and_inactive_users_are_rejected() {
    let f = Fixture::new();
    let strict = Authenticator::new(f.store.clone(), false);
    assert_eq!(
        strict.authenticate(claim("ghost"), Utc::now()).await.unwrap_err(),
        AccessError::Denied(AuthzError::AuthenticationRequired)
    );

    let mut disabled = claim("owner");
    disabled.disabled = true;
    f.user("owner").await;
    assert_eq!(
        strict.authenticate(disabled, Utc::now()).await.unwrap_err(),
        AccessError::Denied(AuthzError::AuthenticationRequired)
    );

    let mut gone = User::provisioned("gone", Utc::now());
    gone.deleted_at = Some(Utc::now());
    f.store.insert_user(gone).await.unwrap();
    assert_eq!(
        strict.authenticate(claim("gone"), Utc::now()).await.unwrap_err(),
        AccessError::Denied(AuthzError::AuthenticationRequired)
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Hierarchy
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn slugs_are_derived_and_suffixed_on_collision() {
    let f = Fixture::new();
    let owner = f.user("owner").await;

    let first = f.org(&owner, "Acme Corp!!", None).await;
    let second = f.org(&owner, "Acme Corp!!", None).await;
    assert_eq!(first.slug.as_str(), "acme-corp");
    assert_eq!(second.slug.as_str(), "acme-corp-1");

    let err = f
        .service
        .create_organization(
            &owner,
            NewOrganization {
                name: "Other".to_string(),
                slug: Some("acme-corp".to_string()),
                parent_id: None,
                settings: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Invalid(DomainError::Conflict(_))));
}

#[tokio::test]
async fn slug_retries_are_bounded() {
    let f = Fixture::with_config(AuthzConfig {
        slug_retry_limit: 1,
        ..AuthzConfig::default()
    });
    let owner = f.user("owner").await;
    f.org(&owner, "Acme", None).await;
    f.org(&owner, "Acme", None).await;

    let resolver = f.service.hierarchy();
    assert!(matches!(
        resolver.assign_slug("Acme", None).await,
        Err(HierarchyError::SlugExhausted { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn ancestors_and_descendants() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let root = f.org(&owner, "Root", None).await;
    let mid = f.org(&owner, "Mid", Some(&root)).await;
    let leaf = f.org(&owner, "Leaf", Some(&mid)).await;
    let sibling = f.org(&owner, "Sibling", Some(&root)).await;

    let h = f.service.hierarchy();
    let chain: Vec<_> = h.ancestor_chain(&leaf).await.unwrap().into_iter().map(|o| o.id).collect();
    assert_eq!(chain, vec![root.id, mid.id, leaf.id]);

    let below: Vec<_> = h.descendants(root.id).await.unwrap().into_iter().map(|o| o.id).collect();
    assert_eq!(below.len(), 3);
    assert!(below[..2].contains(&mid.id) && below[..2].contains(&sibling.id));
    assert_eq!(below[2], leaf.id);
    assert!(h.descendants(leaf.id).await.unwrap().is_empty());

    assert!(h.is_descendant_of(&leaf, root.id).await.unwrap());
    assert!(!h.is_descendant_of(&root, leaf.id).await.unwrap());
    assert!(!h.is_descendant_of(&leaf, leaf.id).await.unwrap());
}

#[tokio::test]
async fn reparent_rejects_self_and_cycles() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let root = f.org(&owner, "Root", None).await;
    let child = f.org(&owner, "Child", Some(&root)).await;
    let root_ctx = f.ctx(&owner, &root).await.unwrap();

    assert_eq!(
        f.service.reparent(&root_ctx, Some(root.id)).await.unwrap_err(),
        LifecycleError::Denied(AuthzError::HierarchyCycle)
    );
    assert_eq!(
        f.service.reparent(&root_ctx, Some(child.id)).await.unwrap_err(),
        LifecycleError::Denied(AuthzError::HierarchyCycle)
    );

    let child_ctx = f.ctx(&owner, &child).await.unwrap();
    let moved = f.service.reparent(&child_ctx, None).await.unwrap();
    assert!(moved.parent_id.is_none());
}

fn shallow_fixture() -> Fixture {
    Fixture::with_config(AuthzConfig {
        max_hierarchy_depth: 3,
        ..AuthzConfig::default()
    })
}

/// Writes `name` straight into the store below `parent`, skipping the service's depth check.
async fn insert_unchecked(f: &Fixture, owner: &User, name: &str, parent: &Organization) -> Organization {
    let org = Organization::new(name, Slug::derive(name), Utc::now()).with_parent(Some(parent.id));
    f.store
        .insert_organization(org.clone(), Membership::founding_owner(owner.id, org.id, Utc::now()))
        .await
        .unwrap();
    org
}

#[tokio::test]
async fn creating_below_the_deepest_level_is_rejected() {
    let f = shallow_fixture();
    let owner = f.user("owner").await;
    let a = f.org(&owner, "A", None).await;
    let b = f.org(&owner, "B", Some(&a)).await;
    let c = f.org(&owner, "C", Some(&b)).await;

    let err = f
        .service
        .create_organization(
            &owner,
            NewOrganization {
                name: "D".to_string(),
                slug: None,
                parent_id: Some(c.id),
                settings: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::Denied(AuthzError::HierarchyDepthExceeded { max_depth: 3 }));
    assert!(!f.store.slug_exists("d").await.unwrap());
    assert!(f.service.hierarchy().ancestor_chain(&c).await.is_ok());
}

#[tokio::test]
async fn reparent_rejects_subtree_that_would_overflow() {
    let f = shallow_fixture();
    let owner = f.user("owner").await;
    let a = f.org(&owner, "A", None).await;
    let b = f.org(&owner, "B", Some(&a)).await;
    let x = f.org(&owner, "X", None).await;
    let y = f.org(&owner, "Y", Some(&x)).await;

    let x_ctx = f.ctx(&owner, &x).await.unwrap();
    assert_eq!(
        f.service.reparent(&x_ctx, Some(b.id)).await.unwrap_err(),
        LifecycleError::Denied(AuthzError::HierarchyDepthExceeded { max_depth: 3 })
    );
    assert_eq!(f.store.organization(x.id).await.unwrap().unwrap().parent_id, None);
    assert!(f.service.hierarchy().ancestor_chain(&y).await.is_ok());

    // The leaf alone still fits.
    let y_ctx = f.ctx(&owner, &y).await.unwrap();
    let moved = f.service.reparent(&y_ctx, Some(b.id)).await.unwrap();
    assert_eq!(moved.parent_id, Some(b.id));
}

#[tokio::test]
async fn overlong_stored_chain_reports_corruption_not_missing() {
    let f = shallow_fixture();
    let owner = f.user("owner").await;
    let a = f.org(&owner, "A", None).await;
    let b = f.org(&owner, "B", Some(&a)).await;
    let c = f.org(&owner, "C", Some(&b)).await;
    let d = insert_unchecked(&f, &owner, "D", &c).await;

    let h = f.service.hierarchy();
    assert!(h.ancestor_chain(&c).await.is_ok());
    assert_eq!(
        h.ancestor_chain(&d).await.unwrap_err(),
        HierarchyError::Corruption { max_depth: 3 }
    );
    assert_eq!(
        h.ancestor_chain(&d).await.unwrap_err().as_denial(),
        Some(AuthzError::HierarchyCorruption { max_depth: 3 })
    );
}

#[tokio::test]
async fn dangling_parent_is_corruption() {
    let store = Arc::new(InMemoryDirectoryStore::new());
    let resolver = HierarchyResolver::new(store, 32, 100);
    let orphan = Organization::new("Orphan", Slug::derive("Orphan"), Utc::now())
        .with_parent(Some(orgguard_core::OrganizationId::new()));

    assert!(matches!(
        resolver.ancestor_chain(&orphan).await,
        Err(HierarchyError::Corruption { .. })
    ));
}

#[tokio::test]
async fn soft_delete_cascades_to_descendants() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let root = f.org(&owner, "Root", None).await;
    let mid = f.org(&owner, "Mid", Some(&root)).await;
    let leaf = f.org(&owner, "Leaf", Some(&mid)).await;
    let other = f.org(&owner, "Other", None).await;

    let ctx = f.ctx(&owner, &root).await.unwrap();
    let deleted = f.service.soft_delete(&ctx).await.unwrap();
    assert_eq!(deleted, vec![root.id, mid.id, leaf.id]);

    for id in deleted {
        assert!(f.store.organization(id).await.unwrap().unwrap().deleted_at.is_some());
    }
    assert!(f.store.organization(other.id).await.unwrap().unwrap().deleted_at.is_none());
    // Memberships are left in place.
    assert!(f.store.membership_for(owner.id, leaf.id).await.unwrap().is_some());
}

#[tokio::test]
async fn failed_cascade_deletes_nothing() {
    let f = shallow_fixture();
    let owner = f.user("owner").await;
    let a = f.org(&owner, "A", None).await;
    let b = f.org(&owner, "B", Some(&a)).await;
    let c = f.org(&owner, "C", Some(&b)).await;
    let d = insert_unchecked(&f, &owner, "D", &c).await;

    let ctx = f.ctx(&owner, &a).await.unwrap();
    assert_eq!(
        f.service.soft_delete(&ctx).await.unwrap_err(),
        LifecycleError::Denied(AuthzError::HierarchyCorruption { max_depth: 3 })
    );
    for org in [&a, &b, &c, &d] {
        assert!(f.store.organization(org.id).await.unwrap().unwrap().deleted_at.is_none());
    }
}

#[tokio::test]
async fn child_creation_needs_write_access_to_parent() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let stranger = f.user("stranger").await;
    let root = f.org(&owner, "Root", None).await;

    let err = f
        .service
        .create_organization(
            &stranger,
            NewOrganization {
                name: "Squatter".to_string(),
                slug: None,
                parent_id: Some(root.id),
                settings: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::Denied(AuthzError::AccessDenied));
}

// ─────────────────────────────────────────────────────────────────────────────
// Memberships
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn last_owner_rule_one_vs_two_owners() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let org = f.org(&owner, "Acme", None).await;
    let ctx = f.ctx(&owner, &org).await.unwrap();
    let owner_membership = ctx.membership().unwrap().clone();

    assert_eq!(
        f.service.remove_member(&ctx, owner_membership.id).await.unwrap_err(),
        LifecycleError::Denied(AuthzError::LastOwnerViolation)
    );
    assert_eq!(
        f.service
            .change_role(&ctx, owner_membership.id, OrgRole::Admin)
            .await
            .unwrap_err(),
        LifecycleError::Denied(AuthzError::LastOwnerViolation)
    );

    let co = f.user("co").await;
    f.service
        .add_member(
            &ctx,
            NewMembership {
                user_id: co.id,
                role: Some(OrgRole::Owner),
                permissions: None,
                invited_by: None,
            },
        )
        .await
        .unwrap();

    let removed = f.service.remove_member(&ctx, owner_membership.id).await.unwrap();
    assert_eq!(removed.user_id, owner.id);
}

#[tokio::test]
async fn role_change_keeps_custom_export_grant() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let org = f.org(&owner, "Acme", None).await;
    let ctx = f.ctx(&owner, &org).await.unwrap();
    let member = f.user("member").await;

    let m = f
        .service
        .add_member(
            &ctx,
            NewMembership {
                user_id: member.id,
                role: Some(OrgRole::Viewer),
                permissions: None,
                invited_by: None,
            },
        )
        .await
        .unwrap();

    let m = f.service.change_role(&ctx, m.id, OrgRole::Manager).await.unwrap();
    assert!(m.allows(Permission::REPORTS_WRITE));
    let m = f
        .service
        .set_permission(&ctx, m.id, Permission::REPORTS_EXPORT, true)
        .await
        .unwrap();
    let m = f.service.change_role(&ctx, m.id, OrgRole::Viewer).await.unwrap();

    assert!(m.allows(Permission::REPORTS_EXPORT));
    assert!(!m.allows(Permission::REPORTS_WRITE));

    let member_ctx = f.ctx(&member, &org).await.unwrap();
    let explained = explain_permission(&member_ctx, Permission::REPORTS_EXPORT);
    assert!(explained.granted);
    assert_eq!(explained.source, GrantSource::CustomGrant);
    let denied = explain_permission(&member_ctx, Permission::REPORTS_WRITE);
    assert!(!denied.granted);
    assert!(denied.denial_reason.is_some());
}

#[tokio::test]
async fn duplicate_membership_and_escalation_are_rejected() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let org = f.org(&owner, "Acme", None).await;
    let owner_ctx = f.ctx(&owner, &org).await.unwrap();
    let manager = f.user("manager").await;

    f.service
        .add_member(
            &owner_ctx,
            NewMembership {
                user_id: manager.id,
                role: Some(OrgRole::Manager),
                permissions: None,
                invited_by: None,
            },
        )
        .await
        .unwrap();

    let again = f
        .service
        .add_member(
            &owner_ctx,
            NewMembership {
                user_id: manager.id,
                role: None,
                permissions: None,
                invited_by: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(again, LifecycleError::Invalid(DomainError::Conflict(_))));

    let manager_ctx = f.ctx(&manager, &org).await.unwrap();
    let newcomer = f.user("newcomer").await;
    let err = f
        .service
        .add_member(
            &manager_ctx,
            NewMembership {
                user_id: newcomer.id,
                role: Some(OrgRole::Admin),
                permissions: None,
                invited_by: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Denied(AuthzError::InsufficientRole { .. })));
}

#[tokio::test]
async fn my_organizations_lists_live_active_memberships() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let a = f.org(&owner, "Alpha", None).await;
    let b = f.org(&owner, "Beta", None).await;
    let b_ctx = f.ctx(&owner, &b).await.unwrap();
    f.service.soft_delete(&b_ctx).await.unwrap();

    let mine = f.service.my_organizations(&owner).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].organization.id, a.id);
    assert_eq!(mine[0].membership.role, OrgRole::Owner);
}

#[tokio::test]
async fn founding_owner_membership_is_created_with_organization() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let org = f.org(&owner, "Acme", None).await;

    let members: Vec<Membership> = f.store.memberships_of_organization(org.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert!(members[0].is_active_owner());
    assert_eq!(members[0].user_id, owner.id);
}

#[tokio::test]
async fn invitations_cannot_carry_grants_the_inviter_lacks() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let org = f.org(&owner, "Acme", None).await;
    let owner_ctx = f.ctx(&owner, &org).await.unwrap();
    let manager = f.user("manager").await;
    f.service
        .add_member(
            &owner_ctx,
            NewMembership {
                user_id: manager.id,
                role: Some(OrgRole::Manager),
                permissions: None,
                invited_by: None,
            },
        )
        .await
        .unwrap();

    let manager_ctx = f.ctx(&manager, &org).await.unwrap();
    let newcomer = f.user("newcomer").await;
    let invite = |permissions| NewMembership {
        user_id: newcomer.id,
        role: Some(OrgRole::Viewer),
        permissions: Some(permissions),
        invited_by: None,
    };

    let padded = PermissionMatrix::defaults(OrgRole::Viewer).grant(Permission::BILLING_WRITE);
    assert_eq!(
        f.service.add_member(&manager_ctx, invite(padded)).await.unwrap_err(),
        LifecycleError::Denied(AuthzError::InsufficientPermission(Permission::BILLING_WRITE))
    );
    assert!(f.store.membership_for(newcomer.id, org.id).await.unwrap().is_none());

    let within_reach = PermissionMatrix::defaults(OrgRole::Viewer).grant(Permission::USERS_INVITE);
    let m = f.service.add_member(&manager_ctx, invite(within_reach)).await.unwrap();
    assert!(m.allows(Permission::USERS_INVITE));
}

#[tokio::test]
async fn admins_cannot_grant_themselves_what_they_lack() {
    let f = Fixture::new();
    let owner = f.user("owner").await;
    let org = f.org(&owner, "Acme", None).await;
    let owner_ctx = f.ctx(&owner, &org).await.unwrap();
    let admin = f.user("admin").await;
    let admin_membership = f
        .service
        .add_member(
            &owner_ctx,
            NewMembership {
                user_id: admin.id,
                role: Some(OrgRole::Admin),
                permissions: None,
                invited_by: None,
            },
        )
        .await
        .unwrap();

    let admin_ctx = f.ctx(&admin, &org).await.unwrap();
    assert_eq!(
        f.service
            .set_permission(&admin_ctx, admin_membership.id, Permission::ORGANIZATIONS_DELETE, true)
            .await
            .unwrap_err(),
        LifecycleError::Denied(AuthzError::InsufficientPermission(Permission::ORGANIZATIONS_DELETE))
    );

    // Revoking stays open, and the owner can still grant it.
    let m = f
        .service
        .set_permission(&admin_ctx, admin_membership.id, Permission::BILLING_READ, false)
        .await
        .unwrap();
    assert!(!m.allows(Permission::BILLING_READ));
    let m = f
        .service
        .set_permission(&owner_ctx, admin_membership.id, Permission::ORGANIZATIONS_DELETE, true)
        .await
        .unwrap();
    assert!(m.allows(Permission::ORGANIZATIONS_DELETE));
}
