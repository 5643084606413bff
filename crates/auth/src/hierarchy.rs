//! Organization forest: ancestor/descendant walks, parent validation and slug assignment.
//!
//! Every walk is bounded by `max_depth`. Exceeding it, meeting an id twice, or
//! following a parent reference to a missing row means the stored forest is
//! corrupt; that is reported as `Corruption`, never as not-found. Writes that
//! would push any chain past `max_depth` are refused up front as `DepthExceeded`.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use orgguard_core::{DomainError, OrganizationId};

use crate::authorize::AuthzError;
use crate::organization::{Organization, Slug};
use crate::store::{DirectoryStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("an organization cannot be its own parent")]
    SelfParent,

    #[error("new parent is a descendant of the organization")]
    Cycle,

    #[error("parent organization not found")]
    ParentNotFound,

    #[error("hierarchy corrupt: walk exceeded {max_depth} levels or revisited an organization")]
    Corruption { max_depth: usize },

    #[error("organization hierarchy would exceed {max_depth} levels")]
    DepthExceeded { max_depth: usize },

    #[error(transparent)]
    InvalidSlug(DomainError),

    #[error("slug '{0}' is already taken")]
    SlugTaken(String),

    #[error("no free slug for '{base}' after {attempts} attempts")]
    SlugExhausted { base: String, attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HierarchyError {
    /// The denial this failure surfaces as, if it is one.
    pub fn as_denial(&self) -> Option<AuthzError> {
        match self {
            HierarchyError::SelfParent | HierarchyError::Cycle => Some(AuthzError::HierarchyCycle),
            HierarchyError::ParentNotFound => Some(AuthzError::OrganizationNotFound),
            HierarchyError::Corruption { max_depth } => Some(AuthzError::HierarchyCorruption {
                max_depth: *max_depth,
            }),
            HierarchyError::DepthExceeded { max_depth } => Some(AuthzError::HierarchyDepthExceeded {
                max_depth: *max_depth,
            }),
            HierarchyError::Store(StoreError::Rejected(denial)) => Some(denial.clone()),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct HierarchyResolver {
    store: Arc<dyn DirectoryStore>,
    max_depth: usize,
    slug_retry_limit: u32,
}

impl HierarchyResolver {
    pub fn new(store: Arc<dyn DirectoryStore>, max_depth: usize, slug_retry_limit: u32) -> Self {
        Self {
            store,
            max_depth: max_depth.max(1),
            slug_retry_limit,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Chain from the root down to `org` itself.
    pub async fn ancestor_chain(&self, org: &Organization) -> Result<Vec<Organization>, HierarchyError> {
        let mut chain = vec![org.clone()];
        let mut seen = HashSet::from([org.id]);
        let mut next = org.parent_id;

        while let Some(parent_id) = next {
            if chain.len() >= self.max_depth || !seen.insert(parent_id) {
                return Err(self.corruption(org.id, "ancestor walk"));
            }
            let parent = self
                .store
                .organization(parent_id)
                .await?
                .ok_or_else(|| self.corruption(org.id, "dangling parent reference"))?;
            next = parent.parent_id;
            chain.push(parent);
        }

        chain.reverse();
        Ok(chain)
    }

    /// Every live organization below `root`, breadth-first; empty when childless.
    pub async fn descendants(&self, root: OrganizationId) -> Result<Vec<Organization>, HierarchyError> {
        Ok(self
            .walk_down(root)
            .await?
            .into_iter()
            .map(|(org, _)| org)
            .collect())
    }

    /// Levels of live organizations below `root`; 0 for a leaf.
    pub async fn subtree_height(&self, root: OrganizationId) -> Result<usize, HierarchyError> {
        Ok(self
            .walk_down(root)
            .await?
            .last()
            .map_or(0, |(_, level)| *level))
    }

    /// Refuse a new child below `parent` when the parent already sits at the deepest level.
    pub async fn ensure_room_below(&self, parent: &Organization) -> Result<(), HierarchyError> {
        let parent_depth = self.ancestor_chain(parent).await?.len();
        self.check_fits(parent.id, parent_depth, 0)
    }

    async fn walk_down(&self, root: OrganizationId) -> Result<Vec<(Organization, usize)>, HierarchyError> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([root]);
        let mut frontier = VecDeque::from([(root, 0usize)]);

        while let Some((id, level)) = frontier.pop_front() {
            for child in self.store.children(id).await? {
                if level + 1 >= self.max_depth || !seen.insert(child.id) {
                    return Err(self.corruption(root, "descendant walk"));
                }
                frontier.push_back((child.id, level + 1));
                out.push((child, level + 1));
            }
        }
        Ok(out)
    }

    /// Whether `candidate` is a strict ancestor of `org`. An organization is not its own descendant.
    pub async fn is_descendant_of(
        &self,
        org: &Organization,
        candidate: OrganizationId,
    ) -> Result<bool, HierarchyError> {
        if org.id == candidate {
            return Ok(false);
        }
        let chain = self.ancestor_chain(org).await?;
        Ok(chain.iter().any(|o| o.id == candidate))
    }

    /// Check that `parent_id` may become the parent of `child_id`: no cycle, and
    /// the moved subtree still fits within `max_depth`. Returns the parent.
    ///
    /// Must be re-run on every reparent; the store re-checks atomically on write.
    pub async fn validate_new_parent(
        &self,
        child_id: OrganizationId,
        parent_id: OrganizationId,
    ) -> Result<Organization, HierarchyError> {
        if child_id == parent_id {
            return Err(HierarchyError::SelfParent);
        }
        let parent = self
            .store
            .organization(parent_id)
            .await?
            .filter(Organization::is_available)
            .ok_or(HierarchyError::ParentNotFound)?;

        let chain = self.ancestor_chain(&parent).await?;
        if chain.iter().any(|o| o.id == child_id) {
            debug!(child = %child_id, parent = %parent_id, "reparent rejected: cycle");
            return Err(HierarchyError::Cycle);
        }
        let height = self.subtree_height(child_id).await?;
        self.check_fits(parent_id, chain.len(), height)?;
        Ok(parent)
    }

    /// Pick the slug for a new organization.
    ///
    /// An explicit slug must be valid and free; it is never suffixed. A derived
    /// slug tries `base`, then `base-1`, `base-2`, ... up to the retry limit.
    pub async fn assign_slug(&self, name: &str, requested: Option<&str>) -> Result<Slug, HierarchyError> {
        if let Some(requested) = requested {
            let slug = Slug::parse(requested.trim()).map_err(HierarchyError::InvalidSlug)?;
            if self.store.slug_exists(slug.as_str()).await? {
                return Err(HierarchyError::SlugTaken(slug.to_string()));
            }
            return Ok(slug);
        }

        let base = Slug::derive(name);
        if !self.store.slug_exists(base.as_str()).await? {
            return Ok(base);
        }
        for n in 1..=self.slug_retry_limit {
            let candidate = base.with_suffix(n);
            if !self.store.slug_exists(candidate.as_str()).await? {
                return Ok(candidate);
            }
        }
        Err(HierarchyError::SlugExhausted {
            base: base.to_string(),
            attempts: self.slug_retry_limit + 1,
        })
    }

    /// A subtree `height` levels tall hung below a parent at `parent_depth` must stay within `max_depth`.
    fn check_fits(&self, parent: OrganizationId, parent_depth: usize, height: usize) -> Result<(), HierarchyError> {
        if parent_depth + 1 + height <= self.max_depth {
            return Ok(());
        }
        debug!(
            parent = %parent,
            parent_depth,
            height,
            max_depth = self.max_depth,
            "hierarchy write rejected: too deep"
        );
        Err(HierarchyError::DepthExceeded {
            max_depth: self.max_depth,
        })
    }

    fn corruption(&self, org: OrganizationId, walk: &'static str) -> HierarchyError {
        error!(organization = %org, max_depth = self.max_depth, walk, "organization hierarchy corrupt");
        HierarchyError::Corruption {
            max_depth: self.max_depth,
        }
    }
}
