// HTTP handlers for the account registry, shared by users, doctors and patients

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::accounts::{
    models::{
        Account, AccountResponse, DoctorProfile, LoginRequest, LoginResponse, PatientProfile, Profile,
        RefreshRequest, RegisterRequest, UpdateAccountRequest, UserProfile,
    },
    service::AccountService,
};
use crate::auth::{
    error::AuthError,
    middleware::{
        clear_session_cookies, cookie_value, require_admin, require_auth, session_cookies,
        REFRESH_COOKIE,
    },
    models::Principal,
};
use crate::error::JsonBody;
use crate::response::ApiResponse;
use crate::AppState;

/// Binds an account kind to its service and its route policy
pub trait AccountScope: Profile {
    /// Lookups by id, email, phone, username and role need no token
    const PUBLIC_LOOKUPS: bool;

    /// Admin-only listing of every account of the kind
    const LIST_PATH: &'static str;

    fn service(state: &AppState) -> &AccountService<Self>;
}

impl AccountScope for UserProfile {
    const PUBLIC_LOOKUPS: bool = true;
    const LIST_PATH: &'static str = "/users";

    fn service(state: &AppState) -> &AccountService<Self> {
        &state.accounts.users
    }
}

impl AccountScope for DoctorProfile {
    const PUBLIC_LOOKUPS: bool = false;
    const LIST_PATH: &'static str = "/doctors";

    fn service(state: &AppState) -> &AccountService<Self> {
        &state.accounts.doctors
    }
}

impl AccountScope for PatientProfile {
    const PUBLIC_LOOKUPS: bool = false;
    const LIST_PATH: &'static str = "/patients";

    fn service(state: &AppState) -> &AccountService<Self> {
        &state.accounts.patients
    }
}

/// Routes for one account kind, mounted under `/api/v1/{user|doctor|patient}`
pub fn account_routes<P: AccountScope>(state: AppState) -> Router<AppState> {
    let lookups = Router::new()
        .route("/id/:id", get(find_by_id::<P>))
        .route("/email/:email", get(find_by_email::<P>))
        .route("/phone/:phone_number", get(find_by_phone::<P>))
        .route("/username/:username", get(find_by_username::<P>))
        .route("/role/:role", get(find_by_role::<P>));

    let admin = Router::new()
        .route(P::LIST_PATH, get(list_accounts::<P>))
        .route_layer(from_fn(require_admin));

    let mut public = Router::new()
        .route("/register", post(register::<P>))
        .route("/login", post(login::<P>))
        .route("/refresh-token", post(refresh_token::<P>));

    let mut protected = Router::new()
        .route("/logout", post(logout::<P>))
        .route("/current-user", get(current_user::<P>))
        .route("/update/:id", put(update_account::<P>))
        .merge(admin);

    if P::PUBLIC_LOOKUPS {
        public = public.merge(lookups);
    } else {
        protected = protected.merge(lookups);
    }

    public.merge(protected.route_layer(from_fn_with_state(state, require_auth)))
}

/// The principal must belong to the collection the route serves
fn ensure_kind<P: Profile>(principal: &Principal) -> Result<(), AuthError> {
    if principal.kind() != P::KIND {
        return Err(AuthError::Forbidden(format!(
            "Only {} accounts may use this route",
            P::KIND.label().to_lowercase()
        )));
    }
    Ok(())
}

fn responses<P: Profile>(accounts: Vec<Account<P>>) -> Vec<AccountResponse<P>> {
    accounts.iter().map(|account| account.to_response()).collect()
}

/// Handler for POST /register
pub async fn register<P: AccountScope>(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest<P>>,
) -> Result<ApiResponse<AccountResponse<P>>, AuthError> {
    let account = P::service(&state).register(request).await?;
    Ok(ApiResponse::created(
        account.to_response(),
        format!("{} registered successfully", P::KIND.label()),
    ))
}

/// Handler for POST /login
/// Sets both token cookies and returns the tokens in the body
pub async fn login<P: AccountScope>(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let (account, tokens) = P::service(&state).login(request).await?;
    let cookies = session_cookies(
        &tokens,
        state.tokens.access_ttl_secs(),
        state.tokens.refresh_ttl_secs(),
    );

    Ok((
        cookies,
        ApiResponse::ok(
            LoginResponse {
                user: account.to_response(),
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            },
            format!("{} logged in successfully", P::KIND.label()),
        ),
    ))
}

/// Handler for POST /logout
pub async fn logout<P: AccountScope>(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AuthError> {
    ensure_kind::<P>(&principal)?;
    P::service(&state).logout(principal.id).await?;

    Ok((
        clear_session_cookies(),
        ApiResponse::ok(json!({}), format!("{} logged out", P::KIND.label())),
    ))
}

/// Handler for POST /refresh-token
/// The refresh token comes from the cookie, else from the body
pub async fn refresh_token<P: AccountScope>(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<JsonBody<RefreshRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let presented = cookie_value(&headers, REFRESH_COOKIE)
        .or_else(|| body.and_then(|JsonBody(request)| request.refresh_token))
        .filter(|token| !token.trim().is_empty())
        .ok_or(AuthError::MissingToken)?;

    let (account, tokens) = P::service(&state).refresh(&presented).await?;
    let cookies = session_cookies(
        &tokens,
        state.tokens.access_ttl_secs(),
        state.tokens.refresh_ttl_secs(),
    );

    Ok((
        cookies,
        ApiResponse::ok(
            LoginResponse {
                user: account.to_response(),
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            },
            "Access token refreshed",
        ),
    ))
}

/// Handler for GET /current-user
pub async fn current_user<P: AccountScope>(
    principal: Principal,
) -> Result<ApiResponse<serde_json::Value>, AuthError> {
    ensure_kind::<P>(&principal)?;
    Ok(ApiResponse::ok(principal.account, "Current account fetched"))
}

/// Handler for PUT /update/:id
/// Accounts may only update themselves
pub async fn update_account<P: AccountScope>(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdateAccountRequest>,
) -> Result<ApiResponse<AccountResponse<P>>, AuthError> {
    ensure_kind::<P>(&principal)?;
    if principal.id != id {
        tracing::warn!(
            "Account {} attempted to update account {}",
            principal.id,
            id
        );
        return Err(AuthError::Forbidden(
            "You can only update your own account".to_string(),
        ));
    }

    let account = P::service(&state).update(id, request).await?;
    Ok(ApiResponse::ok(
        account.to_response(),
        format!("{} updated successfully", P::KIND.label()),
    ))
}

/// Handler for GET /id/:id
pub async fn find_by_id<P: AccountScope>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<AccountResponse<P>>, AuthError> {
    let account = P::service(&state).find_by_id(id).await?;
    Ok(ApiResponse::ok(account.to_response(), format!("{} found", P::KIND.label())))
}

/// Handler for GET /email/:email
pub async fn find_by_email<P: AccountScope>(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<ApiResponse<AccountResponse<P>>, AuthError> {
    let account = P::service(&state).find_by_email(&email).await?;
    Ok(ApiResponse::ok(account.to_response(), format!("{} found", P::KIND.label())))
}

/// Handler for GET /phone/:phone_number
pub async fn find_by_phone<P: AccountScope>(
    State(state): State<AppState>,
    Path(phone_number): Path<String>,
) -> Result<ApiResponse<AccountResponse<P>>, AuthError> {
    let account = P::service(&state).find_by_phone(&phone_number).await?;
    Ok(ApiResponse::ok(account.to_response(), format!("{} found", P::KIND.label())))
}

/// Handler for GET /username/:username
pub async fn find_by_username<P: AccountScope>(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<ApiResponse<AccountResponse<P>>, AuthError> {
    let account = P::service(&state).find_by_username(&username).await?;
    Ok(ApiResponse::ok(account.to_response(), format!("{} found", P::KIND.label())))
}

/// Handler for GET /role/:role
pub async fn find_by_role<P: AccountScope>(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<ApiResponse<Vec<AccountResponse<P>>>, AuthError> {
    let accounts = P::service(&state).find_by_role(&role).await?;
    Ok(ApiResponse::ok(
        responses(accounts),
        format!("{} accounts with role {}", P::KIND.label(), role),
    ))
}

/// Handler for the admin-only listing
pub async fn list_accounts<P: AccountScope>(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<AccountResponse<P>>>, AuthError> {
    let accounts = P::service(&state).list().await?;
    Ok(ApiResponse::ok(
        responses(accounts),
        format!("{} accounts fetched", P::KIND.label()),
    ))
}
