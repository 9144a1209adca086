use axum::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::marker::PhantomData;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::accounts::models::{Account, Credentials, Profile};
use crate::auth::{models::Role, password::HashedPassword};
use crate::db::StoreError;

/// Storage for one account kind
#[async_trait]
pub trait AccountRepository<P: Profile>: Send + Sync {
    /// Insert a new account; a taken username, email or phone number is `Duplicate`
    async fn insert(&self, account: &Account<P>) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account<P>>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account<P>>, StoreError>;

    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Account<P>>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account<P>>, StoreError>;

    async fn find_by_role(&self, role: Role) -> Result<Vec<Account<P>>, StoreError>;

    async fn list(&self) -> Result<Vec<Account<P>>, StoreError>;

    /// Whether any account other than `exclude` already uses one of the identifiers
    async fn identity_taken(
        &self,
        username: &str,
        email: &str,
        phone_number: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, StoreError>;

    /// Persist identity, password, profile and `updated_at` of an existing account.
    /// Returns false if the account is gone.
    async fn update(&self, account: &Account<P>) -> Result<bool, StoreError>;

    /// Overwrite the stored refresh token fingerprint. Returns false if the account is gone.
    async fn set_refresh_token(
        &self,
        id: Uuid,
        fingerprint: Option<&str>,
    ) -> Result<bool, StoreError>;
}

/// Raw row shared by the three account tables
#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    username: String,
    email: String,
    phone_number: String,
    role: String,
    password_hash: String,
    refresh_token: Option<String>,
    profile_picture: Option<String>,
    profile: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account<P: Profile>(self) -> Result<Account<P>, StoreError> {
        let role = self.role.parse::<Role>().map_err(StoreError::Corrupt)?;
        Ok(Account {
            id: self.id,
            username: self.username,
            email: self.email,
            phone_number: self.phone_number,
            role,
            profile_picture: self.profile_picture,
            credentials: Credentials {
                password: HashedPassword::from_stored(self.password_hash),
                refresh_token: self.refresh_token,
            },
            profile: serde_json::from_value(self.profile)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ACCOUNT_COLUMNS: &str = "id, username, email, phone_number, role, password_hash, \
     refresh_token, profile_picture, profile, created_at, updated_at";

/// PostgreSQL repository; the table is chosen by the profile's account kind
#[derive(Clone)]
pub struct PgAccountRepository<P> {
    pool: PgPool,
    _profile: PhantomData<fn() -> P>,
}

impl<P: Profile> PgAccountRepository<P> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _profile: PhantomData,
        }
    }

    fn table() -> &'static str {
        P::KIND.table()
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Account<P>>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            ACCOUNT_COLUMNS,
            Self::table(),
            column
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AccountRow::into_account).transpose()
    }
}

#[async_trait]
impl<P: Profile> AccountRepository<P> for PgAccountRepository<P> {
    async fn insert(&self, account: &Account<P>) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {} (id, username, email, phone_number, role, password_hash,
                            refresh_token, profile_picture, profile, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
            Self::table()
        );
        sqlx::query(&sql)
            .bind(account.id)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.phone_number)
            .bind(account.role.as_str())
            .bind(account.credentials.password.as_str())
            .bind(account.credentials.refresh_token.as_deref())
            .bind(account.profile_picture.as_deref())
            .bind(serde_json::to_value(&account.profile)?)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account<P>>, StoreError> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", ACCOUNT_COLUMNS, Self::table());
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AccountRow::into_account).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account<P>>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE LOWER(email) = LOWER($1)",
            ACCOUNT_COLUMNS,
            Self::table()
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AccountRow::into_account).transpose()
    }

    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Account<P>>, StoreError> {
        self.find_one("phone_number", phone_number).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account<P>>, StoreError> {
        self.find_one("username", &username.to_lowercase()).await
    }

    async fn find_by_role(&self, role: Role) -> Result<Vec<Account<P>>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE role = $1 ORDER BY created_at",
            ACCOUNT_COLUMNS,
            Self::table()
        );
        let rows = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(role.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AccountRow::into_account).collect()
    }

    async fn list(&self) -> Result<Vec<Account<P>>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY created_at",
            ACCOUNT_COLUMNS,
            Self::table()
        );
        let rows = sqlx::query_as::<_, AccountRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AccountRow::into_account).collect()
    }

    async fn identity_taken(
        &self,
        username: &str,
        email: &str,
        phone_number: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM {}
                WHERE (username = $1 OR LOWER(email) = LOWER($2) OR phone_number = $3)
                  AND ($4::uuid IS NULL OR id <> $4)
            )
            "#,
            Self::table()
        );
        let taken: bool = sqlx::query_scalar(&sql)
            .bind(username)
            .bind(email)
            .bind(phone_number)
            .bind(exclude)
            .fetch_one(&self.pool)
            .await?;

        Ok(taken)
    }

    async fn update(&self, account: &Account<P>) -> Result<bool, StoreError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET username = $1,
                email = $2,
                phone_number = $3,
                password_hash = $4,
                profile_picture = $5,
                profile = $6,
                updated_at = $7
            WHERE id = $8
            "#,
            Self::table()
        );
        let result = sqlx::query(&sql)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.phone_number)
            .bind(account.credentials.password.as_str())
            .bind(account.profile_picture.as_deref())
            .bind(serde_json::to_value(&account.profile)?)
            .bind(account.updated_at)
            .bind(account.id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_refresh_token(
        &self,
        id: Uuid,
        fingerprint: Option<&str>,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE {} SET refresh_token = $1 WHERE id = $2",
            Self::table()
        );
        let result = sqlx::query(&sql)
            .bind(fingerprint)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// In-memory repository for development without a database and for tests
pub struct MemoryAccountRepository<P> {
    accounts: RwLock<HashMap<Uuid, Account<P>>>,
}

impl<P: Profile> MemoryAccountRepository<P> {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    fn clashes(existing: &Account<P>, username: &str, email: &str, phone_number: &str) -> bool {
        existing.username == username
            || existing.email.eq_ignore_ascii_case(email)
            || existing.phone_number == phone_number
    }
}

impl<P: Profile> Default for MemoryAccountRepository<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P: Profile> AccountRepository<P> for MemoryAccountRepository<P> {
    async fn insert(&self, account: &Account<P>) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        let clash = accounts.values().any(|existing| {
            Self::clashes(
                existing,
                &account.username,
                &account.email,
                &account.phone_number,
            )
        });
        if clash || accounts.contains_key(&account.id) {
            return Err(StoreError::Duplicate(format!(
                "{} identity already in use",
                P::KIND.label()
            )));
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account<P>>, StoreError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account<P>>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Account<P>>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.phone_number == phone_number)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account<P>>, StoreError> {
        let username = username.to_lowercase();
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.username == username).cloned())
    }

    async fn find_by_role(&self, role: Role) -> Result<Vec<Account<P>>, StoreError> {
        let mut found: Vec<_> = self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.role == role)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.created_at);
        Ok(found)
    }

    async fn list(&self) -> Result<Vec<Account<P>>, StoreError> {
        let mut all: Vec<_> = self.accounts.read().await.values().cloned().collect();
        all.sort_by_key(|a| a.created_at);
        Ok(all)
    }

    async fn identity_taken(
        &self,
        username: &str,
        email: &str,
        phone_number: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().any(|existing| {
            Some(existing.id) != exclude && Self::clashes(existing, username, email, phone_number)
        }))
    }

    async fn update(&self, account: &Account<P>) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write().await;
        let clash = accounts.values().any(|existing| {
            existing.id != account.id
                && Self::clashes(
                    existing,
                    &account.username,
                    &account.email,
                    &account.phone_number,
                )
        });
        if clash {
            return Err(StoreError::Duplicate(format!(
                "{} identity already in use",
                P::KIND.label()
            )));
        }
        match accounts.get_mut(&account.id) {
            Some(stored) => {
                // the refresh token is only written through set_refresh_token
                let refresh_token = stored.credentials.refresh_token.take();
                *stored = account.clone();
                stored.credentials.refresh_token = refresh_token;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_refresh_token(
        &self,
        id: Uuid,
        fingerprint: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&id) {
            Some(account) => {
                account.credentials.refresh_token = fingerprint.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
