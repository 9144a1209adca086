use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::accounts::{
    models::{
        Account, Credentials, DoctorProfile, LoginIdentifier, LoginRequest, PatientProfile,
        Profile, RegisterRequest, UpdateAccountRequest, UserProfile,
    },
    repository::AccountRepository,
};
use crate::auth::{
    error::AuthError,
    models::{AccountKind, Principal, Role},
    password::{HashedPassword, PasswordService},
    token::{TokenPair, TokenService},
};
use crate::db::StoreError;

/// Registration, login, token rotation and lookups for one account kind
pub struct AccountService<P: Profile> {
    repo: Arc<dyn AccountRepository<P>>,
    tokens: Arc<TokenService>,
}

impl<P: Profile> AccountService<P> {
    pub fn new(repo: Arc<dyn AccountRepository<P>>, tokens: Arc<TokenService>) -> Self {
        Self { repo, tokens }
    }

    fn not_found() -> AuthError {
        AuthError::NotFound(P::KIND.label().to_string())
    }

    /// Create an account after checking username, email and phone number are free
    pub async fn register(&self, request: RegisterRequest<P>) -> Result<Account<P>, AuthError> {
        let RegisterRequest { identity, profile } = request;
        identity.validate()?;
        profile.validate()?;
        PasswordService::validate_password_strength(&identity.password)?;
        let role = P::resolve_role(identity.role)?;

        let username = identity.username.trim().to_lowercase();
        let email = identity.email.trim().to_lowercase();
        let phone_number = identity.phone_number.trim().to_string();

        if self
            .repo
            .identity_taken(&username, &email, &phone_number, None)
            .await?
        {
            warn!(
                "Registration rejected, {} identity already in use: {}",
                P::KIND.label(),
                username
            );
            return Err(AuthError::ValidationError(format!(
                "{} with this username, email or phone number already exists",
                P::KIND.label()
            )));
        }

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            username,
            email,
            phone_number,
            role,
            profile_picture: identity.profile_picture,
            credentials: Credentials::new(HashedPassword::from_plaintext(&identity.password)?),
            profile,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert(&account).await?;

        info!(
            "{} registered: id={}, role={}",
            P::KIND.label(),
            account.id,
            account.role
        );
        Ok(account)
    }

    /// Authenticate by email or phone number and issue a fresh token pair
    pub async fn login(&self, request: LoginRequest) -> Result<(Account<P>, TokenPair), AuthError> {
        let identifier = request.identifier()?;
        let found = match &identifier {
            LoginIdentifier::Email(email) => self.repo.find_by_email(email).await?,
            LoginIdentifier::Phone(phone) => self.repo.find_by_phone(phone).await?,
        };

        let account = match found {
            Some(account) if account.credentials.verify_password(&request.password) => account,
            Some(account) => {
                warn!("Failed login for {} id={}", P::KIND.label(), account.id);
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                warn!("Login attempt for unknown {}", P::KIND.label().to_lowercase());
                return Err(AuthError::InvalidCredentials);
            }
        };

        let tokens = self.rotate_tokens(&account).await?;
        info!("{} logged in: id={}", P::KIND.label(), account.id);
        Ok((account, tokens))
    }

    /// Issue both tokens, then store the new refresh token fingerprint in one write.
    /// Tokens are only handed out once that write succeeded.
    pub async fn rotate_tokens(&self, account: &Account<P>) -> Result<TokenPair, AuthError> {
        let pair = self.tokens.issue_pair(&account.token_subject())?;
        let fingerprint = TokenService::fingerprint(&pair.refresh_token);

        if !self
            .repo
            .set_refresh_token(account.id, Some(&fingerprint))
            .await?
        {
            return Err(Self::not_found());
        }

        Ok(pair)
    }

    /// Clear the stored refresh token, invalidating every refresh token issued so far
    pub async fn logout(&self, id: Uuid) -> Result<(), AuthError> {
        if !self.repo.set_refresh_token(id, None).await? {
            return Err(Self::not_found());
        }
        info!("{} logged out: id={}", P::KIND.label(), id);
        Ok(())
    }

    /// Exchange a refresh token for a new pair. The presented token must be the stored one.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(Account<P>, TokenPair), AuthError> {
        let claims = self.tokens.decode_refresh(refresh_token)?;

        let account = self.repo.find_by_id(claims.sub).await?.ok_or_else(|| {
            debug!("Refresh token for unknown {} id={}", P::KIND.label(), claims.sub);
            AuthError::InvalidToken
        })?;

        self.tokens
            .verify_refresh(refresh_token, account.credentials.refresh_token.as_deref())
            .map_err(|e| {
                warn!(
                    "Stale refresh token presented for {} id={}",
                    P::KIND.label(),
                    account.id
                );
                e
            })?;

        let tokens = self.rotate_tokens(&account).await?;
        debug!("Tokens rotated for {} id={}", P::KIND.label(), account.id);
        Ok((account, tokens))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Account<P>, AuthError> {
        self.repo.find_by_id(id).await?.ok_or_else(Self::not_found)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Account<P>, AuthError> {
        self.repo
            .find_by_email(email.trim())
            .await?
            .ok_or_else(Self::not_found)
    }

    pub async fn find_by_phone(&self, phone_number: &str) -> Result<Account<P>, AuthError> {
        self.repo
            .find_by_phone(phone_number.trim())
            .await?
            .ok_or_else(Self::not_found)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Account<P>, AuthError> {
        self.repo
            .find_by_username(username.trim())
            .await?
            .ok_or_else(Self::not_found)
    }

    /// Accounts of this kind carrying `role`; none is reported as not found
    pub async fn find_by_role(&self, role: &str) -> Result<Vec<Account<P>>, AuthError> {
        let role = role.parse::<Role>().map_err(AuthError::ValidationError)?;
        let accounts = self.repo.find_by_role(role).await?;
        if accounts.is_empty() {
            return Err(AuthError::NotFound(format!(
                "{} with role {}",
                P::KIND.label(),
                role
            )));
        }
        Ok(accounts)
    }

    pub async fn list(&self) -> Result<Vec<Account<P>>, AuthError> {
        Ok(self.repo.list().await?)
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.repo.find_by_id(id).await?.is_some())
    }

    /// Apply the fields present in `request`. A new password is hashed once here.
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateAccountRequest,
    ) -> Result<Account<P>, AuthError> {
        request.validate()?;
        let mut account = self.find_by_id(id).await?;
        let mut identity_changed = false;

        if let Some(username) = request.username {
            account.username = username.trim().to_lowercase();
            identity_changed = true;
        }
        if let Some(email) = request.email {
            account.email = email.trim().to_lowercase();
            identity_changed = true;
        }
        if let Some(phone_number) = request.phone_number {
            account.phone_number = phone_number.trim().to_string();
            identity_changed = true;
        }
        if let Some(picture) = request.profile_picture {
            account.profile_picture = Some(picture);
        }
        if let Some(password) = request.password {
            PasswordService::validate_password_strength(&password)?;
            account.credentials.password = HashedPassword::from_plaintext(&password)?;
        }
        if let Some(changes) = request.profile {
            account.profile = merge_profile(&account.profile, changes)?;
        }

        if identity_changed
            && self
                .repo
                .identity_taken(
                    &account.username,
                    &account.email,
                    &account.phone_number,
                    Some(id),
                )
                .await?
        {
            warn!("Update rejected, identity already in use: id={}", id);
            return Err(AuthError::ValidationError(format!(
                "{} with this username, email or phone number already exists",
                P::KIND.label()
            )));
        }

        account.updated_at = Utc::now();
        if !self.repo.update(&account).await? {
            return Err(Self::not_found());
        }
        info!("{} updated: id={}", P::KIND.label(), id);
        Ok(account)
    }

    /// Load the principal for the access gate
    pub async fn find_principal(&self, id: Uuid) -> Result<Option<Principal>, AuthError> {
        match self.repo.find_by_id(id).await? {
            Some(account) => Ok(Some(account.to_principal()?)),
            None => Ok(None),
        }
    }
}

/// Overlay changed profile fields and re-validate the whole profile
fn merge_profile<P: Profile>(
    current: &P,
    changes: serde_json::Map<String, Value>,
) -> Result<P, AuthError> {
    let mut value = serde_json::to_value(current).map_err(StoreError::from)?;
    if let Value::Object(fields) = &mut value {
        fields.extend(changes);
    }
    let merged: P = serde_json::from_value(value)
        .map_err(|e| AuthError::ValidationError(format!("Invalid profile: {}", e)))?;
    merged.validate()?;
    Ok(merged)
}

/// The three account services, addressed by account kind
#[derive(Clone)]
pub struct AccountDirectory {
    pub users: Arc<AccountService<UserProfile>>,
    pub doctors: Arc<AccountService<DoctorProfile>>,
    pub patients: Arc<AccountService<PatientProfile>>,
}

impl AccountDirectory {
    /// Collection an id is stored in, if any
    pub async fn kind_of(&self, id: Uuid) -> Result<Option<AccountKind>, StoreError> {
        if self.doctors.exists(id).await? {
            return Ok(Some(AccountKind::Doctor));
        }
        if self.patients.exists(id).await? {
            return Ok(Some(AccountKind::Patient));
        }
        if self.users.exists(id).await? {
            return Ok(Some(AccountKind::User));
        }
        Ok(None)
    }

    /// Resolve a principal in the collection matching `kind`
    pub async fn principal(
        &self,
        kind: AccountKind,
        id: Uuid,
    ) -> Result<Option<Principal>, AuthError> {
        match kind {
            AccountKind::User => self.users.find_principal(id).await,
            AccountKind::Doctor => self.doctors.find_principal(id).await,
            AccountKind::Patient => self.patients.find_principal(id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::models::{Address, Gender, NewIdentity};
    use crate::accounts::repository::MemoryAccountRepository;
    use crate::auth::token::TokenConfig;
    use axum::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;

    fn token_service() -> Arc<TokenService> {
        Arc::new(TokenService::new(&TokenConfig {
            access_secret: "access-secret".to_string(),
            access_ttl_secs: 900,
            refresh_secret: "refresh-secret".to_string(),
            refresh_ttl_secs: 3600,
        }))
    }

    fn service() -> AccountService<UserProfile> {
        AccountService::new(Arc::new(MemoryAccountRepository::new()), token_service())
    }

    fn registration(username: &str, email: &str, phone: &str) -> RegisterRequest<UserProfile> {
        RegisterRequest {
            identity: NewIdentity {
                username: username.to_string(),
                password: "password-123".to_string(),
                email: email.to_string(),
                phone_number: phone.to_string(),
                role: Some(Role::Admin),
                profile_picture: None,
            },
            profile: UserProfile {
                full_name: "Ada Admin".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1980, 3, 4).unwrap(),
                gender: Gender::Female,
                address: Address::default(),
            },
        }
    }

    fn login_by_email(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.to_string()),
            phone_number: None,
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_normalizes_and_hashes() {
        let service = service();
        let account = service
            .register(registration("Ada", "ADA@Example.com", "9000000001"))
            .await
            .unwrap();

        assert_eq!(account.username, "ada");
        assert_eq!(account.email, "ada@example.com");
        assert_ne!(account.credentials.password.as_str(), "password-123");
        assert!(account.credentials.verify_password("password-123"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let service = service();
        service
            .register(registration("ada", "ada@example.com", "9000000001"))
            .await
            .unwrap();

        let same_email = service
            .register(registration("bea", "ada@example.com", "9000000002"))
            .await;
        let same_phone = service
            .register(registration("cid", "cid@example.com", "9000000001"))
            .await;

        assert!(matches!(same_email, Err(AuthError::ValidationError(_))));
        assert!(matches!(same_phone, Err(AuthError::ValidationError(_))));
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_password() {
        let service = service();
        service
            .register(registration("ada", "ada@example.com", "9000000001"))
            .await
            .unwrap();

        let result = service
            .login(login_by_email("ada@example.com", "not-the-password"))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));

        let unknown = service
            .login(login_by_email("nobody@example.com", "password-123"))
            .await;
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_by_phone() {
        let service = service();
        service
            .register(registration("ada", "ada@example.com", "9000000001"))
            .await
            .unwrap();

        let request = LoginRequest {
            email: None,
            phone_number: Some("9000000001".to_string()),
            password: "password-123".to_string(),
        };
        assert!(service.login(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_rejects_previous_token() {
        let service = service();
        service
            .register(registration("ada", "ada@example.com", "9000000001"))
            .await
            .unwrap();
        let (_, first) = service
            .login(login_by_email("ada@example.com", "password-123"))
            .await
            .unwrap();

        let (_, second) = service.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let replay = service.refresh(&first.refresh_token).await;
        assert!(matches!(replay, Err(AuthError::TokenMismatch)));
        assert!(service.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_invalidates_refresh_token() {
        let service = service();
        let account = service
            .register(registration("ada", "ada@example.com", "9000000001"))
            .await
            .unwrap();
        let (_, tokens) = service
            .login(login_by_email("ada@example.com", "password-123"))
            .await
            .unwrap();

        service.logout(account.id).await.unwrap();

        let result = service.refresh(&tokens.refresh_token).await;
        assert!(matches!(result, Err(AuthError::TokenMismatch)));
    }

    #[tokio::test]
    async fn test_password_change_rejects_previous_password() {
        let service = service();
        let account = service
            .register(registration("ada", "ada@example.com", "9000000001"))
            .await
            .unwrap();

        let request = UpdateAccountRequest {
            password: Some("brand-new-password".to_string()),
            ..Default::default()
        };
        service.update(account.id, request).await.unwrap();

        assert!(service
            .login(login_by_email("ada@example.com", "password-123"))
            .await
            .is_err());
        assert!(service
            .login(login_by_email("ada@example.com", "brand-new-password"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_update_merges_profile_fields() {
        let service = service();
        let account = service
            .register(registration("ada", "ada@example.com", "9000000001"))
            .await
            .unwrap();

        let request = UpdateAccountRequest {
            profile: json!({"full_name": "Ada Lovelace"}).as_object().cloned(),
            ..Default::default()
        };
        let updated = service.update(account.id, request).await.unwrap();

        assert_eq!(updated.profile.full_name, "Ada Lovelace");
        assert_eq!(updated.profile.gender, Gender::Female);
    }

    #[tokio::test]
    async fn test_update_rejects_taken_email() {
        let service = service();
        service
            .register(registration("ada", "ada@example.com", "9000000001"))
            .await
            .unwrap();
        let bea = service
            .register(registration("bea", "bea@example.com", "9000000002"))
            .await
            .unwrap();

        let request = UpdateAccountRequest {
            email: Some("ada@example.com".to_string()),
            ..Default::default()
        };
        let result = service.update(bea.id, request).await;
        assert!(matches!(result, Err(AuthError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_find_by_role_reports_empty_as_not_found() {
        let service = service();
        service
            .register(registration("ada", "ada@example.com", "9000000001"))
            .await
            .unwrap();

        assert_eq!(service.find_by_role("admin").await.unwrap().len(), 1);
        assert!(matches!(
            service.find_by_role("staff").await,
            Err(AuthError::NotFound(_))
        ));
        assert!(matches!(
            service.find_by_role("janitor").await,
            Err(AuthError::ValidationError(_))
        ));
    }

    /// Reads succeed but every write finds the row already deleted
    struct DeletedBeforeWrite {
        inner: MemoryAccountRepository<UserProfile>,
    }

    #[async_trait]
    impl AccountRepository<UserProfile> for DeletedBeforeWrite {
        async fn insert(&self, account: &Account<UserProfile>) -> Result<(), StoreError> {
            self.inner.insert(account).await
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Account<UserProfile>>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_email(
            &self,
            email: &str,
        ) -> Result<Option<Account<UserProfile>>, StoreError> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_phone(
            &self,
            phone_number: &str,
        ) -> Result<Option<Account<UserProfile>>, StoreError> {
            self.inner.find_by_phone(phone_number).await
        }

        async fn find_by_username(
            &self,
            username: &str,
        ) -> Result<Option<Account<UserProfile>>, StoreError> {
            self.inner.find_by_username(username).await
        }

        async fn find_by_role(&self, role: Role) -> Result<Vec<Account<UserProfile>>, StoreError> {
            self.inner.find_by_role(role).await
        }

        async fn list(&self) -> Result<Vec<Account<UserProfile>>, StoreError> {
            self.inner.list().await
        }

        async fn identity_taken(
            &self,
            username: &str,
            email: &str,
            phone_number: &str,
            exclude: Option<Uuid>,
        ) -> Result<bool, StoreError> {
            self.inner
                .identity_taken(username, email, phone_number, exclude)
                .await
        }

        async fn update(&self, _account: &Account<UserProfile>) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn set_refresh_token(
            &self,
            _id: Uuid,
            _fingerprint: Option<&str>,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_update_of_vanished_account_is_not_found() {
        let repo = Arc::new(DeletedBeforeWrite {
            inner: MemoryAccountRepository::new(),
        });
        let service = AccountService::new(repo, token_service());
        let ada = service
            .register(registration("ada", "ada@example.com", "9000000001"))
            .await
            .unwrap();

        let request = UpdateAccountRequest {
            profile: json!({"full_name": "Ada Lovelace"}).as_object().cloned(),
            ..Default::default()
        };
        let result = service.update(ada.id, request).await;
        assert!(matches!(result, Err(AuthError::NotFound(_))));
    }
}
