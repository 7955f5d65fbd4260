//! Login: authenticate, then hand the claim payload to the token issuer

use serde::Serialize;
use std::sync::Arc;

use crate::auth::jwt::{TokenInput, TokenIssuer};
use crate::auth::matcher::{AuthOutcome, AuthenticationMatcher};
use crate::types::{AccountId, IdentityError, Result, Role};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: u64,
    pub account_id: AccountId,
    pub role: Role,
    pub display_name: String,
}

pub struct LoginService {
    matcher: Arc<AuthenticationMatcher>,
    issuer: Arc<dyn TokenIssuer>,
}

impl LoginService {
    pub fn new(matcher: Arc<AuthenticationMatcher>, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self { matcher, issuer }
    }

    /// Fails with [`IdentityError::InvalidCredentials`] for any rejected attempt
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<LoginResponse> {
        let authenticated = match self.matcher.authenticate(identifier, secret).await? {
            AuthOutcome::Authenticated(a) => a,
            AuthOutcome::InvalidCredentials => return Err(IdentityError::InvalidCredentials),
        };

        let issued = self.issuer.issue(TokenInput {
            account_id: authenticated.account_id.clone(),
            role: authenticated.role,
        })?;

        Ok(LoginResponse {
            token: issued.token,
            expires_at: issued.expires_at,
            account_id: authenticated.account_id,
            role: authenticated.role,
            display_name: authenticated.display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Argon2Hasher, CredentialHasher, JwtIssuer};
    use crate::db::MemoryGateway;
    use crate::types::NewAccount;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters-long";

    #[tokio::test]
    async fn test_login_issues_token_for_account() {
        let store = Arc::new(MemoryGateway::new());
        let hasher = Arc::new(Argon2Hasher::with_params(64, 1).unwrap());
        let account = store
            .seed_account(NewAccount {
                handle: "warden".to_string(),
                email: "w@x.com".to_string(),
                credential_hash: hasher.hash("pw").unwrap(),
                role: Role::Warden,
            })
            .await;
        let issuer = Arc::new(JwtIssuer::new(SECRET.into(), 60).unwrap());
        let service = LoginService::new(
            Arc::new(AuthenticationMatcher::new(store.clone(), hasher)),
            issuer.clone(),
        );

        let response = service.login("w@x.com", "pw").await.unwrap();
        assert_eq!(response.account_id, account.id);
        assert_eq!(response.role, Role::Warden);

        let claims = issuer.verify(&response.token).unwrap();
        assert_eq!(claims.sub, account.id.0);
        assert_eq!(claims.role, Role::Warden);

        let err = service.login("w@x.com", "nope").await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }
}
