//! Authorization engine: login, code exchange, refresh rotation, and
//! bearer validation for the MCP surface.

use crate::db::{Database, IssuedTokenPair};
use crate::models::{Role, User, UserStatus};
use crate::services::ServiceError;
use crate::utils::password::{burn_verification, verify_password, Password, PasswordHashString};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

/// Identity attached to a request after bearer validation.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }
    }
}

#[derive(Clone)]
pub struct OAuthService {
    db: Arc<Database>,
    client_id: String,
    client_secret: String,
}

impl OAuthService {
    pub fn new(db: Arc<Database>, client_id: String, client_secret: String) -> Self {
        Self {
            db,
            client_id,
            client_secret,
        }
    }

    /// Validate the query half of the authorize endpoint. Runs before the
    /// login form is shown and again on submission.
    pub fn begin_authorization(
        &self,
        client_id: &str,
        response_type: &str,
    ) -> Result<(), ServiceError> {
        if client_id != self.client_id {
            return Err(ServiceError::InvalidClient);
        }
        if response_type != "code" {
            return Err(ServiceError::UnsupportedResponseType);
        }
        Ok(())
    }

    /// Verify credentials and mint an authorization code. Unknown emails and
    /// disabled accounts burn a full verification so the failure path costs
    /// the same as a wrong password.
    #[instrument(skip(self, password))]
    pub async fn complete_authorization(
        &self,
        client_id: &str,
        response_type: &str,
        redirect_uri: &str,
        email: &str,
        password: &str,
    ) -> Result<String, ServiceError> {
        self.begin_authorization(client_id, response_type)?;

        let password = Password::new(password.to_string());
        let user = self.db.find_user_by_email(email).await?;

        let user = match user {
            Some(user) if user.status == UserStatus::Active => user,
            _ => {
                burn_verification(&password);
                warn!(email = %email, "Login rejected");
                return Err(ServiceError::InvalidCredentials);
            }
        };

        let stored = PasswordHashString::new(user.password_hash.clone());
        if verify_password(&password, &stored).is_err() {
            warn!(user_id = %user.id, "Login rejected");
            return Err(ServiceError::InvalidCredentials);
        }

        let code = self
            .db
            .create_authorization_code(&user.id, client_id, redirect_uri)
            .await?;

        info!(user_id = %user.id, "Login succeeded");
        Ok(code)
    }

    /// Exchange a single-use authorization code for a token pair. Consume
    /// and mint are one transaction; a second exchange of the same code
    /// loses the conditional update and fails.
    #[instrument(skip(self, client_secret, code))]
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<IssuedTokenPair, ServiceError> {
        self.verify_client(client_id, client_secret)?;

        self.db
            .exchange_authorization_code(code, client_id, redirect_uri)
            .await?
            .ok_or(ServiceError::InvalidGrant)
    }

    /// Rotate a refresh token into a fresh pair. The presented token is
    /// revoked whether or not it was still live; replaying it yields
    /// `InvalidGrant`.
    #[instrument(skip(self, client_secret, refresh_token))]
    pub async fn refresh(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<IssuedTokenPair, ServiceError> {
        self.verify_client(client_id, client_secret)?;

        self.db
            .rotate_refresh_token(refresh_token)
            .await?
            .ok_or(ServiceError::InvalidGrant)
    }

    /// Resolve a bearer token to its owner. Revocation, expiry, and account
    /// status are re-checked on every call; there is no caching layer.
    pub async fn validate_access_token(
        &self,
        access_token: &str,
    ) -> Result<Option<AuthenticatedUser>, ServiceError> {
        let Some(row) = self.db.find_access_token(access_token).await? else {
            return Ok(None);
        };

        if row.revoked
            || row.status != UserStatus::Active
            || row.expires_at <= chrono::Utc::now().timestamp()
        {
            return Ok(None);
        }

        let user = self.db.find_user_by_id(&row.user_id).await?;
        Ok(user.map(AuthenticatedUser::from))
    }

    /// Flip an account's status. Disabling revokes every live token pair
    /// before returning, so the change takes effect at the next request.
    #[instrument(skip(self))]
    pub async fn set_user_status(
        &self,
        user_id: &str,
        status: UserStatus,
    ) -> Result<(), ServiceError> {
        self.db.update_user_status(user_id, status).await?;
        if status == UserStatus::Disabled {
            self.db.revoke_user_tokens(user_id).await?;
        }
        Ok(())
    }

    pub async fn revoke_all(&self, user_id: &str) -> Result<(), ServiceError> {
        Ok(self.db.revoke_user_tokens(user_id).await?)
    }

    /// Constant-time client credential check.
    fn verify_client(&self, client_id: &str, client_secret: &str) -> Result<(), ServiceError> {
        let id_ok: bool = client_id
            .as_bytes()
            .ct_eq(self.client_id.as_bytes())
            .into();
        let secret_ok: bool = client_secret
            .as_bytes()
            .ct_eq(self.client_secret.as_bytes())
            .into();
        if id_ok && secret_ok {
            Ok(())
        } else {
            Err(ServiceError::InvalidClient)
        }
    }
}
