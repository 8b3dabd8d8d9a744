//! Member registration: sponsor lookup, spillover placement, and root bootstrap.

use crate::config::{Config, RootAccount};
use crate::db::repo::InsertMemberError;
use crate::db::Repository;
use crate::domain::{LegSide, Member, MemberId, NewMember, Role, TimeMs};
use crate::engine::{PlacementError, PlacementResolver};
use crate::error::ServiceError;
use crate::notify::{Dispatcher, Notification};
use crate::orchestration::auth::{hash_password, new_salt};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    /// Referral code of the sponsoring member.
    pub sponsor_code: String,
    pub side: LegSide,
}

#[derive(Clone)]
pub struct Registrar {
    repo: Arc<Repository>,
    notifications: Dispatcher,
    resolver: PlacementResolver,
    retries: u32,
}

fn new_referral_code() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("TL{}", &raw[..8])
}

fn normalize_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ServiceError::Validation(format!(
            "'{}' is not a valid email address",
            email
        ))),
    }
}

fn validate_credentials(name: &str, password: &str) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::Validation("name must not be empty".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn placement_error(err: PlacementError) -> ServiceError {
    match err {
        PlacementError::SponsorNotFound(id) => ServiceError::NotFound(format!("Sponsor {}", id)),
        PlacementError::TreeFull { .. } => ServiceError::Conflict(err.to_string()),
        PlacementError::Db(e) => ServiceError::Db(e),
    }
}

impl Registrar {
    pub fn new(repo: Arc<Repository>, notifications: Dispatcher, config: &Config) -> Self {
        Self {
            repo,
            notifications,
            resolver: PlacementResolver::new(config.placement_max_depth),
            retries: config.placement_retries.max(1),
        }
    }

    /// Create a member under the sponsor identified by `input.sponsor_code`.
    ///
    /// A slot lost to a concurrent registration is re-resolved, up to the
    /// configured number of attempts.
    pub async fn register(&self, input: RegisterInput, now: TimeMs) -> Result<Member, ServiceError> {
        validate_credentials(&input.name, &input.password)?;
        let email = normalize_email(&input.email)?;

        let sponsor_code = input.sponsor_code.trim().to_uppercase();
        if sponsor_code.is_empty() {
            return Err(ServiceError::Validation(
                "sponsor referral code is required".to_string(),
            ));
        }
        let sponsor = self
            .repo
            .get_member_by_referral_code(&sponsor_code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sponsor '{}'", sponsor_code)))?;

        let salt = new_salt();
        let password_hash = hash_password(&input.password, &salt);

        for attempt in 1..=self.retries {
            let placement = self
                .resolver
                .resolve(self.repo.as_ref(), sponsor.id, input.side)
                .await
                .map_err(placement_error)?;

            let new = NewMember {
                referral_code: new_referral_code(),
                name: input.name.trim().to_string(),
                email: email.clone(),
                phone: input.phone.clone().filter(|p| !p.trim().is_empty()),
                password_hash: password_hash.clone(),
                password_salt: salt.clone(),
                role: Role::User,
                sponsor_id: Some(sponsor.id),
                placement: Some(placement),
                joined_at: now,
            };

            match self.repo.insert_member_atomic(&new).await {
                Ok(id) => {
                    info!(
                        member_id = %id,
                        sponsor_id = %sponsor.id,
                        parent_id = %placement.parent,
                        side = %placement.side,
                        depth = placement.depth,
                        "Member registered"
                    );
                    self.notifications.send(Notification::MemberRegistered {
                        member_id: id,
                        sponsor_id: Some(sponsor.id),
                    });
                    return self.load(id).await;
                }
                Err(InsertMemberError::SlotTaken) => {
                    warn!(
                        attempt,
                        parent_id = %placement.parent,
                        side = %placement.side,
                        "Placement slot taken concurrently, re-resolving"
                    );
                }
                Err(InsertMemberError::ReferralCodeTaken) => {
                    warn!(attempt, "Referral code collision, regenerating");
                }
                Err(InsertMemberError::EmailTaken) => {
                    return Err(ServiceError::Conflict(format!(
                        "email {} is already registered",
                        email
                    )));
                }
                Err(InsertMemberError::Db(e)) => return Err(e.into()),
            }
        }

        Err(ServiceError::Conflict(format!(
            "placement under sponsor {} still contended after {} attempts",
            sponsor.id, self.retries
        )))
    }

    /// Create the root admin when the tree is empty. None if a tree already exists.
    pub async fn bootstrap_root(
        &self,
        root: &RootAccount,
        now: TimeMs,
    ) -> Result<Option<Member>, ServiceError> {
        if self.repo.count_members().await? > 0 {
            return Ok(None);
        }
        validate_credentials(&root.name, &root.password)?;
        let email = normalize_email(&root.email)?;
        let salt = new_salt();

        let new = NewMember {
            referral_code: new_referral_code(),
            name: root.name.trim().to_string(),
            email,
            phone: None,
            password_hash: hash_password(&root.password, &salt),
            password_salt: salt,
            role: Role::Admin,
            sponsor_id: None,
            placement: None,
            joined_at: now,
        };

        match self.repo.insert_member_atomic(&new).await {
            Ok(id) => {
                let member = self.load(id).await?;
                info!(member_id = %id, referral_code = %member.referral_code, "Root member created");
                Ok(Some(member))
            }
            Err(InsertMemberError::EmailTaken) => Ok(None),
            Err(InsertMemberError::Db(e)) => Err(e.into()),
            Err(other) => Err(ServiceError::Conflict(other.to_string())),
        }
    }

    async fn load(&self, id: MemberId) -> Result<Member, ServiceError> {
        self.repo
            .get_member(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Member {}", id)))
    }
}
