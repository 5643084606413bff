//! Authentication step: verified claim → active user account.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::authorize::{AccessError, AuthzError};
use crate::claims::IdentityClaim;
use crate::store::{DirectoryStore, StoreError};
use crate::user::User;

/// Authenticated caller: the verified claim and the account it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: User,
    pub claim: IdentityClaim,
}

#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn DirectoryStore>,
    auto_provision: bool,
}

impl Authenticator {
    pub fn new(store: Arc<dyn DirectoryStore>, auto_provision: bool) -> Self {
        Self { store, auto_provision }
    }

    /// Resolve a verified claim to an account that may act.
    ///
    /// Disabled claims and inactive or deleted accounts are `AuthenticationRequired`.
    /// Unknown subjects are provisioned as plain `user` accounts when enabled.
    pub async fn authenticate(&self, claim: IdentityClaim, now: DateTime<Utc>) -> Result<Identity, AccessError> {
        if claim.disabled {
            debug!(subject = %claim.subject, "identity disabled at provider");
            return Err(AuthzError::AuthenticationRequired.into());
        }

        let user = match self.store.user_by_external_id(&claim.subject).await? {
            Some(user) => user,
            None if self.auto_provision => self.provision(&claim, now).await?,
            None => {
                debug!(subject = %claim.subject, "unknown subject and provisioning disabled");
                return Err(AuthzError::AuthenticationRequired.into());
            }
        };

        if !user.can_act() {
            debug!(user_id = %user.id, "account inactive or deleted");
            return Err(AuthzError::AuthenticationRequired.into());
        }

        Ok(Identity { user, claim })
    }

    async fn provision(&self, claim: &IdentityClaim, now: DateTime<Utc>) -> Result<User, AccessError> {
        let user = User::provisioned(claim.subject.clone(), now)
            .with_profile(claim.email.clone(), claim.name.clone());

        match self.store.insert_user(user.clone()).await {
            Ok(()) => {
                info!(user_id = %user.id, subject = %claim.subject, "provisioned user on first login");
                Ok(user)
            }
            // Lost a first-login race: another request inserted the same subject.
            Err(StoreError::Conflict(_)) => self
                .store
                .user_by_external_id(&claim.subject)
                .await?
                .ok_or_else(|| {
                    warn!(subject = %claim.subject, "user vanished after provisioning conflict");
                    AccessError::Denied(AuthzError::AuthenticationRequired)
                }),
            Err(e) => Err(e.into()),
        }
    }
}
