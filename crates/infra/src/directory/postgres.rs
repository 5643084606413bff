//! Postgres-backed directory store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate slug, external id, or `(user, organization)` pair |
//! | Database (foreign key violation) | `23503` | `NotFound` | Referenced user or organization missing |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | Other | N/A | `Backend` | Pool closed, network errors, decode failures |
//!
//! ## Atomicity
//!
//! - Owner-affecting membership writes lock the organization row (`FOR UPDATE`)
//!   before counting the remaining active owners, so two concurrent removals of
//!   the last two owners serialize and the second one is rejected.
//! - Parent changes take a transaction-scoped advisory lock shared by all
//!   hierarchy writes and re-run a depth-bounded recursive cycle check inside
//!   the same transaction. The moved subtree's height is measured there too,
//!   so no write can push a chain past `max_depth`.
//! - Cascade soft-deletes mark the whole subtree with one `UPDATE`, under the
//!   same advisory lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{error, instrument};
use uuid::Uuid;

use orgguard_auth::membership::ensure_owner_retained;
use orgguard_auth::{
    AuthzError, DirectoryStore, Membership, OrgRole, Organization, PermissionMap, Slug, StoreError, SystemRole, User,
};
use orgguard_core::{MembershipId, OrganizationId, UserId};

/// Key of the advisory lock serializing hierarchy writes ("orgguard" in ASCII).
const HIERARCHY_LOCK_KEY: i64 = 0x6f72_6767_7561_7264;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        external_id TEXT NOT NULL UNIQUE,
        email TEXT,
        display_name TEXT,
        system_role TEXT NOT NULL DEFAULT 'user',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        deleted_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS organizations (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        parent_id UUID REFERENCES organizations(id),
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        settings JSONB NOT NULL DEFAULT '{}'::jsonb,
        deleted_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        CHECK (parent_id IS NULL OR parent_id <> id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS organizations_parent_idx ON organizations (parent_id)",
    r#"
    CREATE TABLE IF NOT EXISTS memberships (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        organization_id UUID NOT NULL REFERENCES organizations(id),
        role TEXT NOT NULL DEFAULT 'employee',
        permissions JSONB NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        invited_by UUID REFERENCES users(id),
        invited_at TIMESTAMPTZ,
        joined_at TIMESTAMPTZ,
        last_access_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (user_id, organization_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS memberships_organization_idx ON memberships (organization_id)",
];

const USER_COLUMNS: &str = "id, external_id, email, display_name, system_role, is_active, deleted_at, created_at";

const ORGANIZATION_COLUMNS: &str =
    "id, name, slug, parent_id, is_active, settings, deleted_at, created_at, updated_at";

const MEMBERSHIP_COLUMNS: &str = "id, user_id, organization_id, role, permissions, is_active, invited_by, \
     invited_at, joined_at, last_access_at, created_at, updated_at";

/// Postgres-backed directory of users, organizations and memberships.
///
/// `Send + Sync`; all operations go through the SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresDirectoryStore {
    pool: Arc<PgPool>,
}

impl PostgresDirectoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Create tables and indexes when missing.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    async fn lock_organization(
        tx: &mut Transaction<'_, Postgres>,
        organization_id: OrganizationId,
    ) -> Result<(), StoreError> {
        sqlx::query("SELECT id FROM organizations WHERE id = $1 FOR UPDATE")
            .bind(organization_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_organization", e))?
            .ok_or(StoreError::NotFound("organization"))?;
        Ok(())
    }

    /// Current row and the count of other active owners, read under the organization lock.
    async fn owner_snapshot(
        tx: &mut Transaction<'_, Postgres>,
        id: MembershipId,
    ) -> Result<(Membership, usize), StoreError> {
        let organization_id: Uuid = sqlx::query("SELECT organization_id FROM memberships WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("membership_organization", e))?
            .ok_or(StoreError::NotFound("membership"))?
            .try_get("organization_id")
            .map_err(|e| decode_error("membership_organization", e))?;

        Self::lock_organization(tx, OrganizationId::from_uuid(organization_id)).await?;

        let row = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("membership_for_update", e))?
        .ok_or(StoreError::NotFound("membership"))?;
        let current = membership_from_row(&row)?;

        let others: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS owners
            FROM memberships
            WHERE organization_id = $1 AND id <> $2 AND role = 'owner' AND is_active
            "#,
        )
        .bind(current.organization_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("count_owners", e))?
        .try_get("owners")
        .map_err(|e| decode_error("count_owners", e))?;

        Ok((current, usize::try_from(others).unwrap_or(0)))
    }
}

#[async_trait::async_trait]
impl DirectoryStore for PostgresDirectoryStore {
    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user", e))?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn user_by_external_id(&self, external_id: &str) -> Result<Option<User>, StoreError> {
        sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = $1"))
            .bind(external_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_external_id", e))?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, external_id, email, display_name, system_role, is_active, deleted_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.external_id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.system_role.as_str())
        .bind(user.is_active)
        .bind(user.deleted_at)
        .bind(user.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    async fn organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError> {
        sqlx::query(&format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("organization", e))?
            .map(|row| organization_from_row(&row))
            .transpose()
    }

    async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError> {
        sqlx::query(&format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("organization_by_slug", e))?
            .map(|row| organization_from_row(&row))
            .transpose()
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        sqlx::query("SELECT EXISTS (SELECT 1 FROM organizations WHERE slug = $1) AS taken")
            .bind(slug)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("slug_exists", e))?
            .try_get("taken")
            .map_err(|e| decode_error("slug_exists", e))
    }

    async fn children(&self, id: OrganizationId) -> Result<Vec<Organization>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations \
             WHERE parent_id = $1 AND deleted_at IS NULL ORDER BY created_at, id"
        ))
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("children", e))?;
        rows.iter().map(organization_from_row).collect()
    }

    #[instrument(skip(self, organization, founding_owner), fields(organization_id = %organization.id), err)]
    async fn insert_organization(
        &self,
        organization: Organization,
        founding_owner: Membership,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, slug, parent_id, is_active, settings, deleted_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(organization.id.as_uuid())
        .bind(&organization.name)
        .bind(organization.slug.as_str())
        .bind(organization.parent_id.map(Uuid::from))
        .bind(organization.is_active)
        .bind(&organization.settings)
        .bind(organization.deleted_at)
        .bind(organization.created_at)
        .bind(organization.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_organization", e))?;

        insert_membership_row(&mut tx, &founding_owner).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn update_organization(&self, organization: Organization) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE organizations
            SET name = $2, slug = $3, is_active = $4, settings = $5, deleted_at = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(organization.id.as_uuid())
        .bind(&organization.name)
        .bind(organization.slug.as_str())
        .bind(organization.is_active)
        .bind(&organization.settings)
        .bind(organization.deleted_at)
        .bind(organization.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_organization", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("organization"));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn set_parent(
        &self,
        id: OrganizationId,
        parent: Option<OrganizationId>,
        max_depth: usize,
        now: DateTime<Utc>,
    ) -> Result<Organization, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(HIERARCHY_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("hierarchy_lock", e))?;

        if let Some(parent_id) = parent {
            if parent_id == id {
                return Err(StoreError::Rejected(AuthzError::HierarchyCycle));
            }
            let depth_limit = i32::try_from(max_depth).unwrap_or(i32::MAX);
            let row = sqlx::query(
                r#"
                WITH RECURSIVE chain (id, parent_id, is_live, depth) AS (
                    SELECT id, parent_id, (is_active AND deleted_at IS NULL), 1
                    FROM organizations
                    WHERE id = $1
                    UNION ALL
                    SELECT o.id, o.parent_id, TRUE, c.depth + 1
                    FROM organizations o
                    JOIN chain c ON o.id = c.parent_id
                    WHERE c.depth < $3 AND c.id <> $2
                )
                SELECT
                    COUNT(*) AS found,
                    COALESCE(BOOL_OR(id = $2), FALSE) AS cycles,
                    COALESCE(BOOL_OR(depth = 1 AND is_live), FALSE) AS parent_live,
                    COALESCE(BOOL_OR(depth >= $3 AND parent_id IS NOT NULL AND id <> $2), FALSE) AS overflow,
                    COALESCE(MAX(depth), 0) AS parent_depth
                FROM chain
                "#,
            )
            .bind(parent_id.as_uuid())
            .bind(id.as_uuid())
            .bind(depth_limit)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("cycle_check", e))?;

            let found: i64 = row.try_get("found").map_err(|e| decode_error("cycle_check", e))?;
            let cycles: bool = row.try_get("cycles").map_err(|e| decode_error("cycle_check", e))?;
            let parent_live: bool = row.try_get("parent_live").map_err(|e| decode_error("cycle_check", e))?;
            let overflow: bool = row.try_get("overflow").map_err(|e| decode_error("cycle_check", e))?;
            let parent_depth: i32 = row.try_get("parent_depth").map_err(|e| decode_error("cycle_check", e))?;

            if found == 0 || !parent_live {
                return Err(StoreError::Rejected(AuthzError::OrganizationNotFound));
            }
            if cycles {
                return Err(StoreError::Rejected(AuthzError::HierarchyCycle));
            }
            if overflow {
                error!(organization_id = %id, max_depth, "hierarchy deeper than limit during reparent");
                return Err(StoreError::Rejected(AuthzError::HierarchyCorruption { max_depth }));
            }

            let height: i32 = sqlx::query(
                r#"
                WITH RECURSIVE subtree (id, level) AS (
                    SELECT id, 0 FROM organizations WHERE id = $1
                    UNION ALL
                    SELECT o.id, s.level + 1
                    FROM organizations o
                    JOIN subtree s ON o.parent_id = s.id
                    WHERE o.deleted_at IS NULL AND s.level < $2
                )
                SELECT COALESCE(MAX(level), 0) AS height FROM subtree
                "#,
            )
            .bind(id.as_uuid())
            .bind(depth_limit)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("subtree_height", e))?
            .try_get("height")
            .map_err(|e| decode_error("subtree_height", e))?;

            if i64::from(parent_depth) + 1 + i64::from(height) > i64::from(depth_limit) {
                return Err(StoreError::Rejected(AuthzError::HierarchyDepthExceeded { max_depth }));
            }
        }

        let row = sqlx::query(&format!(
            "UPDATE organizations SET parent_id = $2, updated_at = $3 WHERE id = $1 RETURNING {ORGANIZATION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(parent.map(Uuid::from))
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("set_parent", e))?
        .ok_or(StoreError::NotFound("organization"))?;
        let updated = organization_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(updated)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn soft_delete_organizations(&self, ids: &[OrganizationId], now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(HIERARCHY_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("hierarchy_lock", e))?;

        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query("UPDATE organizations SET deleted_at = $2, updated_at = $2 WHERE id = ANY($1)")
            .bind(&uuids)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("soft_delete_organizations", e))?;

        // Dropping the transaction rolls back the partial write.
        if result.rows_affected() != uuids.len() as u64 {
            return Err(StoreError::NotFound("organization"));
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn membership(&self, id: MembershipId) -> Result<Option<Membership>, StoreError> {
        sqlx::query(&format!("SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("membership", e))?
            .map(|row| membership_from_row(&row))
            .transpose()
    }

    async fn membership_for(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<Option<Membership>, StoreError> {
        sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = $1 AND organization_id = $2"
        ))
        .bind(user_id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("membership_for", e))?
        .map(|row| membership_from_row(&row))
        .transpose()
    }

    async fn memberships_of_user(&self, user_id: UserId) -> Result<Vec<Membership>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = $1 ORDER BY created_at, id"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("memberships_of_user", e))?;
        rows.iter().map(membership_from_row).collect()
    }

    async fn memberships_of_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Membership>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE organization_id = $1 ORDER BY created_at, id"
        ))
        .bind(organization_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("memberships_of_organization", e))?;
        rows.iter().map(membership_from_row).collect()
    }

    #[instrument(skip(self, membership), fields(membership_id = %membership.id), err)]
    async fn insert_membership(&self, membership: Membership) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        insert_membership_row(&mut tx, &membership).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self, membership), fields(membership_id = %membership.id), err)]
    async fn update_membership(&self, membership: Membership) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current, other_owners) = Self::owner_snapshot(&mut tx, membership.id).await?;
        if current.user_id != membership.user_id || current.organization_id != membership.organization_id {
            return Err(StoreError::Conflict(
                "membership user and organization are immutable".to_string(),
            ));
        }
        ensure_owner_retained(&current, Some(&membership), other_owners).map_err(StoreError::Rejected)?;

        sqlx::query(
            r#"
            UPDATE memberships
            SET role = $2, permissions = $3, is_active = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(membership.id.as_uuid())
        .bind(membership.role.as_str())
        .bind(permissions_json(&membership.permissions)?)
        .bind(membership.is_active)
        .bind(membership.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_membership", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    async fn delete_membership(&self, id: MembershipId) -> Result<Membership, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current, other_owners) = Self::owner_snapshot(&mut tx, id).await?;
        ensure_owner_retained(&current, None, other_owners).map_err(StoreError::Rejected)?;

        sqlx::query("DELETE FROM memberships WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_membership", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(current)
    }

    async fn touch_membership(&self, id: MembershipId, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE memberships SET last_access_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("touch_membership", e))?;
        Ok(())
    }
}

async fn insert_membership_row(
    tx: &mut Transaction<'_, Postgres>,
    membership: &Membership,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO memberships (
            id, user_id, organization_id, role, permissions, is_active,
            invited_by, invited_at, joined_at, last_access_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(membership.id.as_uuid())
    .bind(membership.user_id.as_uuid())
    .bind(membership.organization_id.as_uuid())
    .bind(membership.role.as_str())
    .bind(permissions_json(&membership.permissions)?)
    .bind(membership.is_active)
    .bind(membership.invited_by.map(Uuid::from))
    .bind(membership.invited_at)
    .bind(membership.joined_at)
    .bind(membership.last_access_at)
    .bind(membership.created_at)
    .bind(membership.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_membership", e))?;
    Ok(())
}

fn permissions_json(permissions: &PermissionMap) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(permissions)
        .map_err(|e| StoreError::Backend(format!("failed to encode permissions: {e}")))
}

// SQLx row mapping

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let decode = |e| decode_error("users", e);
    let system_role: String = row.try_get("system_role").map_err(decode)?;
    Ok(User {
        id: UserId::from_uuid(row.try_get("id").map_err(decode)?),
        external_id: row.try_get("external_id").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        display_name: row.try_get("display_name").map_err(decode)?,
        // Unknown stored roles fall back to the least privileged one.
        system_role: system_role.parse::<SystemRole>().unwrap_or_default(),
        is_active: row.try_get("is_active").map_err(decode)?,
        deleted_at: row.try_get("deleted_at").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn organization_from_row(row: &PgRow) -> Result<Organization, StoreError> {
    let decode = |e| decode_error("organizations", e);
    let slug: String = row.try_get("slug").map_err(decode)?;
    let parent_id: Option<Uuid> = row.try_get("parent_id").map_err(decode)?;
    Ok(Organization {
        id: OrganizationId::from_uuid(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        slug: Slug::parse(slug).map_err(|e| StoreError::Backend(format!("stored slug invalid: {e}")))?,
        parent_id: parent_id.map(OrganizationId::from_uuid),
        is_active: row.try_get("is_active").map_err(decode)?,
        settings: row.try_get("settings").map_err(decode)?,
        deleted_at: row.try_get("deleted_at").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<Membership, StoreError> {
    let decode = |e| decode_error("memberships", e);
    let role: String = row.try_get("role").map_err(decode)?;
    let permissions: serde_json::Value = row.try_get("permissions").map_err(decode)?;
    let invited_by: Option<Uuid> = row.try_get("invited_by").map_err(decode)?;
    Ok(Membership {
        id: MembershipId::from_uuid(row.try_get("id").map_err(decode)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode)?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id").map_err(decode)?),
        role: OrgRole::parse_or_guest(&role),
        permissions: serde_json::from_value(permissions)
            .map_err(|e| StoreError::Backend(format!("failed to decode permissions: {e}")))?,
        is_active: row.try_get("is_active").map_err(decode)?,
        invited_by: invited_by.map(UserId::from_uuid),
        invited_at: row.try_get("invited_at").map_err(decode)?,
        joined_at: row.try_get("joined_at").map_err(decode)?,
        last_access_at: row.try_get("last_access_at").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn decode_error(table: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode {table} row: {err}"))
}

/// Map SQLx errors to `StoreError`; see the module docs for the table.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound("referenced record"),
                _ => StoreError::Backend(msg),
            }
        }
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
