//! Authentication matcher
//!
//! Resolves a login identifier (handle, email or student full name) to an
//! account and checks the secret against the stored hash, falling back to
//! the student's external id for student accounts.
//!
//! Identifier matching is trimmed and case-insensitive. The external-id
//! fallback trims but compares case-sensitively; that asymmetry is kept on
//! purpose until product decides otherwise.
//!
//! Every failure path returns the same [`AuthOutcome::InvalidCredentials`];
//! only store outages surface as errors.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::CredentialHasher;
use crate::db::SharedGateway;
use crate::types::{Account, AccountId, Result, Role, StudentProfile};

/// Successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Authenticated {
    pub account_id: AccountId,
    pub role: Role,
    pub display_name: String,
}

/// Terminal outcome of an authentication attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(Authenticated),
    InvalidCredentials,
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

pub struct AuthenticationMatcher {
    store: SharedGateway,
    hasher: Arc<dyn CredentialHasher>,
}

impl AuthenticationMatcher {
    pub fn new(store: SharedGateway, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { store, hasher }
    }

    pub async fn authenticate(&self, identifier: &str, secret: &str) -> Result<AuthOutcome> {
        let identifier = identifier.trim();
        if identifier.is_empty() || secret.is_empty() {
            return Ok(AuthOutcome::InvalidCredentials);
        }

        // Primary: handle or account email
        let (account, mut profile) = match self.store.find_account_by_login(identifier).await? {
            Some(account) => {
                let profile = self.linked_profile(&account).await;
                (account, profile)
            }
            None => {
                // Secondary: student full name or profile email
                let Some(login) = self.store.find_profile_login(identifier).await? else {
                    debug!("Login failed - no account for identifier");
                    return Ok(AuthOutcome::InvalidCredentials);
                };
                let Some(account) = self.store.get_account(&login.account_id).await? else {
                    warn!(
                        profile_id = %login.profile.id,
                        account_id = %login.account_id,
                        "Login matched a profile whose linked account is missing"
                    );
                    return Ok(AuthOutcome::InvalidCredentials);
                };
                (account, Some(login.profile))
            }
        };

        if !self.verify_hash(&account, secret) {
            if account.role != Role::Student {
                debug!(account_id = %account.id, "Login failed - invalid secret");
                return Ok(AuthOutcome::InvalidCredentials);
            }

            if profile.is_none() {
                profile = self.linked_profile(&account).await;
            }
            let fallback_ok = profile
                .as_ref()
                .and_then(StudentProfile::login_secret)
                .is_some_and(|external_id| secret.trim() == external_id);

            if !fallback_ok {
                debug!(account_id = %account.id, "Login failed - invalid secret");
                return Ok(AuthOutcome::InvalidCredentials);
            }
            debug!(account_id = %account.id, "Login accepted via external id fallback");
        }

        let display_name = profile
            .as_ref()
            .and_then(StudentProfile::display_name)
            .unwrap_or_else(|| account.handle.clone());

        info!(account_id = %account.id, role = %account.role, "Login succeeded");
        Ok(AuthOutcome::Authenticated(Authenticated {
            account_id: account.id,
            role: account.role,
            display_name,
        }))
    }

    /// Malformed or foreign digests count as a mismatch
    fn verify_hash(&self, account: &Account, secret: &str) -> bool {
        match self.hasher.verify(secret, &account.credential_hash) {
            Ok(valid) => valid,
            Err(e) => {
                debug!(account_id = %account.id, "Credential hash unusable: {}", e);
                false
            }
        }
    }

    /// Best effort: a store failure here is logged and treated as no profile
    async fn linked_profile(&self, account: &Account) -> Option<StudentProfile> {
        match self.store.find_profile_by_account(&account.id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(account_id = %account.id, "Failed to load linked profile: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Argon2Hasher;
    use crate::db::{MemoryGateway, StoreGateway};
    use crate::types::{NewAccount, ProfileId};

    struct Fixture {
        store: Arc<MemoryGateway>,
        hasher: Arc<Argon2Hasher>,
        matcher: AuthenticationMatcher,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryGateway::new());
        let hasher = Arc::new(Argon2Hasher::with_params(64, 1).unwrap());
        let matcher = AuthenticationMatcher::new(store.clone(), hasher.clone());
        Fixture {
            store,
            hasher,
            matcher,
        }
    }

    /// Jane Doe with a linked student account whose hash is of `password`
    async fn jane(f: &Fixture, password: &str) -> (Account, StudentProfile) {
        let account = f
            .store
            .seed_account(NewAccount {
                handle: "jdoe".to_string(),
                email: "jane@x.com".to_string(),
                credential_hash: f.hasher.hash(password).unwrap(),
                role: Role::Student,
            })
            .await;
        let profile = f
            .store
            .seed_profile(StudentProfile {
                id: ProfileId::from(""),
                external_id: "STU01".to_string(),
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                email: "jane@x.com".to_string(),
                linked_account_id: None,
                status: "active".to_string(),
            })
            .await;
        f.store.set_profile_link(&profile.id, &account.id).await.unwrap();
        (account, profile)
    }

    fn authenticated(outcome: AuthOutcome) -> Authenticated {
        match outcome {
            AuthOutcome::Authenticated(a) => a,
            AuthOutcome::InvalidCredentials => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_primary_hash_by_handle_and_email() {
        let f = fixture();
        let (account, _) = jane(&f, "hunter2").await;

        let by_handle = authenticated(f.matcher.authenticate("jdoe", "hunter2").await.unwrap());
        assert_eq!(by_handle.account_id, account.id);
        assert_eq!(by_handle.display_name, "Jane Doe");

        let by_email = f.matcher.authenticate(" JANE@X.COM ", "hunter2").await.unwrap();
        assert!(by_email.is_authenticated());
    }

    #[tokio::test]
    async fn test_secondary_lookup_by_full_name() {
        let f = fixture();
        let (account, _) = jane(&f, "hunter2").await;

        let outcome = authenticated(f.matcher.authenticate("  jane DOE ", "hunter2").await.unwrap());
        assert_eq!(outcome.account_id, account.id);
        assert_eq!(outcome.role, Role::Student);
    }

    #[tokio::test]
    async fn test_fallback_to_external_id() {
        let f = fixture();
        jane(&f, "something-else").await;

        assert!(f.matcher.authenticate("jane@x.com", "STU01").await.unwrap().is_authenticated());
        assert!(f.matcher.authenticate("Jane Doe", " STU01 ").await.unwrap().is_authenticated());
    }

    #[tokio::test]
    async fn test_fallback_is_case_sensitive() {
        // Identifier matching ignores case, the external-id fallback does not
        let f = fixture();
        jane(&f, "something-else").await;

        let outcome = f.matcher.authenticate("JANE@x.com", "stu01").await.unwrap();
        assert_eq!(outcome, AuthOutcome::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_no_fallback_for_staff() {
        let f = fixture();
        let warden = f
            .store
            .seed_account(NewAccount {
                handle: "warden".to_string(),
                email: "w@x.com".to_string(),
                credential_hash: f.hasher.hash("secret").unwrap(),
                role: Role::Warden,
            })
            .await;
        let profile = f
            .store
            .seed_profile(StudentProfile {
                id: ProfileId::from(""),
                external_id: "STU99".to_string(),
                first_name: "Wes".to_string(),
                last_name: "Ward".to_string(),
                email: "w@x.com".to_string(),
                linked_account_id: None,
                status: "active".to_string(),
            })
            .await;
        f.store.set_profile_link(&profile.id, &warden.id).await.unwrap();

        let outcome = f.matcher.authenticate("warden", "STU99").await.unwrap();
        assert_eq!(outcome, AuthOutcome::InvalidCredentials);
        assert!(f.matcher.authenticate("warden", "secret").await.unwrap().is_authenticated());
    }

    #[tokio::test]
    async fn test_unknown_identifier_and_wrong_secret_look_the_same() {
        let f = fixture();
        jane(&f, "hunter2").await;

        let unknown = f.matcher.authenticate("nobody", "hunter2").await.unwrap();
        let wrong = f.matcher.authenticate("jdoe", "wrong").await.unwrap();
        assert_eq!(unknown, wrong);
        assert_eq!(unknown, AuthOutcome::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_malformed_hash_still_allows_fallback() {
        let f = fixture();
        let (account, _) = jane(&f, "x").await;
        f.store
            .update_account(
                &account.id,
                crate::types::AccountUpdate {
                    credential_hash: Some("legacy-bcrypt".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(f.matcher.authenticate("jdoe", "STU01").await.unwrap().is_authenticated());
        assert!(!f.matcher.authenticate("jdoe", "x").await.unwrap().is_authenticated());
    }

    #[tokio::test]
    async fn test_display_name_falls_back_to_handle() {
        let f = fixture();
        f.store
            .seed_account(NewAccount {
                handle: "admin".to_string(),
                email: "admin@x.com".to_string(),
                credential_hash: f.hasher.hash("root").unwrap(),
                role: Role::Admin,
            })
            .await;

        let outcome = authenticated(f.matcher.authenticate("admin", "root").await.unwrap());
        assert_eq!(outcome.display_name, "admin");
        assert_eq!(outcome.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_empty_inputs_rejected() {
        let f = fixture();
        jane(&f, "hunter2").await;

        assert!(!f.matcher.authenticate("", "hunter2").await.unwrap().is_authenticated());
        assert!(!f.matcher.authenticate("jdoe", "").await.unwrap().is_authenticated());
    }

    #[tokio::test]
    async fn test_profile_load_failure_does_not_block_hash_check() {
        let f = fixture();
        jane(&f, "pw").await;
        f.store.fail_operation("find_profile_by_account").await;

        // Correct hash still wins, named by handle since the profile is unknown
        let outcome = authenticated(f.matcher.authenticate("jdoe", "pw").await.unwrap());
        assert_eq!(outcome.display_name, "jdoe");
        assert_eq!(outcome.role, Role::Student);

        // Without the profile there is no external id to fall back on
        let fallback = f.matcher.authenticate("jdoe", "STU01").await.unwrap();
        assert_eq!(fallback, AuthOutcome::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_store_outage_is_an_error() {
        let f = fixture();
        jane(&f, "hunter2").await;
        f.store.fail_next(1);

        assert!(f.matcher.authenticate("jdoe", "hunter2").await.is_err());
    }
}
