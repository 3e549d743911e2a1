//! REST API layer (Axum).
//!
//! - Public: `/api/auth/register`, `/api/auth/login`, `/health`, OpenAPI docs.
//! - Bearer-protected: sponsorships CRUD, status history, dashboard stats, checkout.
//!
//! Every response uses the JSON envelope `{success, data?, error?, timestamp}`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::{debug, error, info, warn, Level};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{IntoParams, Modify, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, TokenService};
use crate::checkout::{parse_price_to_minor_units, CheckoutOrder, CheckoutProvider};
use crate::dashboard;
use crate::error::{ApiError, FieldErrors};
use crate::models::{
    DashboardStats, Identity, Priority, Sponsorship, SponsorshipInput, SponsorshipStatus,
    StatusChange, User, UserProfile,
};
use crate::sponsorships::SponsorshipService;
use crate::storage::Storage;

/// Fixed page size for sponsorship listings.
pub const PAGE_SIZE: usize = 20;

/// Shared app state for REST handlers (Arc-wrapped for concurrency)
#[derive(Clone)]
pub struct AppState {
    storage: Arc<Storage>,
    tokens: Arc<TokenService>,
    sponsorships: SponsorshipService,
    checkout: Arc<dyn CheckoutProvider>,
    bcrypt_cost: u32,
}

impl AppState {
    pub fn new(
        storage: Storage,
        tokens: TokenService,
        checkout: Arc<dyn CheckoutProvider>,
        bcrypt_cost: u32,
    ) -> Self {
        let storage = Arc::new(storage);
        Self {
            sponsorships: SponsorshipService::new(storage.clone()),
            storage,
            tokens: Arc::new(tokens),
            checkout,
            bcrypt_cost,
        }
    }
}

// --- Envelope ---

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Serialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: now_rfc3339(),
        }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            timestamp: now_rfc3339(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub total: usize,
    pub page: usize,
    pub size: usize,
    pub has_more: bool,
}

#[derive(Serialize, Debug)]
pub struct PaginatedResponse<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
    pub timestamp: String,
}

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn respond<T: Serialize>(status: StatusCode, data: T) -> ApiResult<T> {
    Ok((status, Json(ApiResponse::success(data))))
}

/// `Json` extractor whose rejection is the standard `INVALID_REQUEST` envelope.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                warn!(reason = %rejection.body_text(), "failed to decode request body");
                Err(ApiError::InvalidRequest(rejection.body_text()))
            }
        }
    }
}

/// `Path` extractor whose rejection is the standard `INVALID_REQUEST` envelope.
pub struct ApiPath<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => {
                warn!(reason = %rejection.body_text(), "failed to decode path parameters");
                Err(ApiError::InvalidRequest(rejection.body_text()))
            }
        }
    }
}

/// Replace axum's bodiless 405 with the error envelope, keeping `Allow`.
async fn envelope_method_not_allowed(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }
    let allow = response.headers().get(header::ALLOW).cloned();
    let mut envelope = ApiError::MethodNotAllowed.into_response();
    if let Some(allow) = allow {
        envelope.headers_mut().insert(header::ALLOW, allow);
    }
    envelope
}

// --- DTOs ---

#[derive(Deserialize, Serialize, Debug, Default, ToSchema)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Serialize, Debug, Default, ToSchema)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: String,
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// 1-based page number; invalid or missing values mean 1.
    pub page: Option<String>,
    /// Restrict to one status, e.g. `negotiating`.
    pub status: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Default, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutRequest {
    pub product_name: String,
    /// Display price, e.g. `"$29"`.
    pub price: String,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct DeletedResponse {
    pub deleted: bool,
}

// --- Authentication gate ---

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// The header must split on single spaces into exactly two parts.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(ApiError::MissingToken);
    };
    let value = value.to_str().map_err(|_| ApiError::InvalidTokenFormat)?;
    if value.is_empty() {
        return Err(ApiError::MissingToken);
    }

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] => Ok(*token),
        _ => Err(ApiError::InvalidTokenFormat),
    }
}

async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = {
        let token = bearer_token(req.headers()).map_err(|e| {
            warn!(path = %req.uri().path(), code = e.code(), "authentication failed");
            e
        })?;
        state.tokens.verify(token).map_err(|e| {
            warn!(path = %req.uri().path(), error = %e, "authentication failed");
            ApiError::InvalidToken
        })?
    };

    debug!(email = %claims.email, "authenticated request");
    req.extensions_mut().insert(Identity::from(claims));
    Ok(next.run(req).await)
}

// --- Router ---

#[derive(OpenApi)]
#[openapi(
    paths(
        register_handler,
        login_handler,
        me_handler,
        list_handler,
        create_handler,
        get_handler,
        update_handler,
        delete_handler,
        history_handler,
        stats_handler,
        checkout_handler,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        AuthResponse,
        UserProfile,
        Sponsorship,
        SponsorshipInput,
        SponsorshipStatus,
        Priority,
        StatusChange,
        DashboardStats,
        CheckoutRequest,
        CheckoutResponse,
        DeletedResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "sponsorships", description = "Creator-scoped sponsorship deals"),
        (name = "dashboard", description = "Aggregated deal statistics"),
        (name = "checkout", description = "Payment checkout sessions"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::LINK])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300))
}

/// Build the application router.
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    let protected = Router::new()
        .route("/api/auth/me", get(me_handler))
        .route("/api/sponsorships", get(list_handler).post(create_handler))
        .route(
            "/api/sponsorships/:id",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/api/sponsorships/:id/history", get(history_handler))
        .route("/api/dashboard/stats", get(stats_handler))
        .route("/api/checkout", post(checkout_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/health", get(health_handler))
        .merge(protected)
        .fallback(|| async { ApiError::NotFound })
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::map_response(envelope_method_not_allowed))
        .layer(cors_layer(allowed_origins))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
}

// --- Auth handlers ---

async fn hash_blocking(password: String, cost: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered; token envelope", body = AuthResponse),
        (status = 400, description = "Missing fields"),
        (status = 409, description = "Email already registered"),
    )
)]
async fn register_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<AuthResponse> {
    let mut fields = FieldErrors::new();
    for (name, value) in [
        ("username", &payload.username),
        ("email", &payload.email),
        ("password", &payload.password),
    ] {
        if value.trim().is_empty() {
            fields.insert(name.to_string(), format!("{name} is required"));
        }
    }
    if !fields.is_empty() {
        warn!(?fields, "registration validation failed");
        return Err(ApiError::Validation(fields));
    }

    let password_hash = hash_blocking(payload.password, state.bcrypt_cost).await?;
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: payload.username,
        email: payload.email,
        password_hash,
        created_at: now,
        updated_at: now,
    };

    state.storage.create_user(&user).map_err(|e| {
        warn!(email = %user.email, error = %e, "failed to create user");
        ApiError::from(e)
    })?;

    // Each user is their own creator tenant.
    let issued = state.tokens.issue(&user.id, &user.email, &user.id).map_err(|e| {
        error!(user_id = %user.id, error = %e, "failed to issue token");
        ApiError::Internal(e.to_string())
    })?;

    info!(email = %user.email, "user registered");
    respond(
        StatusCode::CREATED,
        AuthResponse {
            user_id: user.id,
            email: user.email,
            token: issued.token,
            expires_at: issued.expires_at,
        },
    )
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token envelope", body = AuthResponse),
        (status = 401, description = "INVALID_CREDENTIALS"),
    )
)]
async fn login_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let mut fields = FieldErrors::new();
    if payload.email.is_empty() {
        fields.insert("email".into(), "email is required".into());
    }
    if payload.password.is_empty() {
        fields.insert("password".into(), "password is required".into());
    }
    if !fields.is_empty() {
        return Err(ApiError::Validation(fields));
    }

    let Some(user) = state.storage.get_user_by_email(&payload.email)? else {
        warn!(email = %payload.email, "login failed: unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let hash = user.password_hash.clone();
    let password = payload.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .unwrap_or(false);
    if !matches {
        warn!(email = %payload.email, "login failed: wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let issued = state
        .tokens
        .issue(&user.id, &user.email, &user.id)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(email = %user.email, "user logged in");
    respond(
        StatusCode::OK,
        AuthResponse {
            user_id: user.id,
            email: user.email,
            token: issued.token,
            expires_at: issued.expires_at,
        },
    )
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Caller profile", body = UserProfile))
)]
async fn me_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<UserProfile> {
    let user = state
        .storage
        .get_user_by_id(&identity.user_id)?
        .ok_or(ApiError::NotFound)?;
    respond(StatusCode::OK, UserProfile::from(user))
}

// --- Sponsorship handlers ---

#[utoipa::path(
    get,
    path = "/api/sponsorships",
    tag = "sponsorships",
    params(ListParams),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Paginated envelope of sponsorships", body = [Sponsorship]))
)]
async fn list_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Sponsorship>>, ApiError> {
    let page = params
        .page
        .as_deref()
        .and_then(|p| p.parse::<usize>().ok())
        .filter(|p| *p > 0)
        .unwrap_or(1);
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(SponsorshipStatus::parse(raw).ok_or_else(|| {
            ApiError::InvalidRequest(format!("unknown status {raw:?}"))
        })?),
    };

    let offset = (page - 1).saturating_mul(PAGE_SIZE);
    let (data, total) = state
        .sponsorships
        .list(&identity, status, offset, PAGE_SIZE)?;

    Ok(Json(PaginatedResponse {
        success: true,
        data,
        pagination: PaginationMeta {
            total,
            page,
            size: PAGE_SIZE,
            has_more: offset.saturating_add(PAGE_SIZE) < total,
        },
        timestamp: now_rfc3339(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/sponsorships",
    tag = "sponsorships",
    request_body = SponsorshipInput,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Created sponsorship", body = Sponsorship),
        (status = 400, description = "VALIDATION_ERROR with field details"),
    )
)]
async fn create_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiJson(input): ApiJson<SponsorshipInput>,
) -> ApiResult<Sponsorship> {
    let sponsorship = state.sponsorships.create(&identity, input)?;
    respond(StatusCode::CREATED, sponsorship)
}

#[utoipa::path(
    get,
    path = "/api/sponsorships/{id}",
    tag = "sponsorships",
    params(("id" = String, Path, description = "Sponsorship id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sponsorship", body = Sponsorship),
        (status = 404, description = "Absent, deleted, or owned by another creator"),
    )
)]
async fn get_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Sponsorship> {
    respond(StatusCode::OK, state.sponsorships.get(&identity, &id)?)
}

#[utoipa::path(
    put,
    path = "/api/sponsorships/{id}",
    tag = "sponsorships",
    params(("id" = String, Path, description = "Sponsorship id")),
    request_body = SponsorshipInput,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated sponsorship", body = Sponsorship),
        (status = 404, description = "Absent, deleted, or owned by another creator"),
    )
)]
async fn update_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<SponsorshipInput>,
) -> ApiResult<Sponsorship> {
    respond(StatusCode::OK, state.sponsorships.update(&identity, &id, patch)?)
}

#[utoipa::path(
    delete,
    path = "/api/sponsorships/{id}",
    tag = "sponsorships",
    params(("id" = String, Path, description = "Sponsorship id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Soft-deleted", body = DeletedResponse),
        (status = 404, description = "Absent or already deleted"),
    )
)]
async fn delete_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<DeletedResponse> {
    state.sponsorships.delete(&identity, &id)?;
    respond(StatusCode::OK, DeletedResponse { deleted: true })
}

#[utoipa::path(
    get,
    path = "/api/sponsorships/{id}/history",
    tag = "sponsorships",
    params(("id" = String, Path, description = "Sponsorship id")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Status changes, oldest first", body = [StatusChange]))
)]
async fn history_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Vec<StatusChange>> {
    respond(StatusCode::OK, state.sponsorships.history(&identity, &id)?)
}

#[utoipa::path(
    get,
    path = "/api/dashboard/stats",
    tag = "dashboard",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Aggregated stats", body = DashboardStats))
)]
async fn stats_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<DashboardStats> {
    let stats = dashboard::compute_stats(&state.storage, &identity.creator_id)?;
    respond(StatusCode::OK, stats)
}

// --- Checkout ---

#[utoipa::path(
    post,
    path = "/api/checkout",
    tag = "checkout",
    request_body = CheckoutRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Redirect URL for the payment flow", body = CheckoutResponse),
        (status = 500, description = "Provider failure"),
    )
)]
async fn checkout_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiJson(payload): ApiJson<CheckoutRequest>,
) -> ApiResult<CheckoutResponse> {
    if payload.product_name.trim().is_empty() {
        let mut fields = FieldErrors::new();
        fields.insert("productName".into(), "productName is required".into());
        return Err(ApiError::Validation(fields));
    }

    let order = CheckoutOrder {
        client_reference_id: identity.user_id.clone(),
        unit_amount: parse_price_to_minor_units(&payload.price),
        product_name: payload.product_name,
        currency: "usd".to_string(),
    };

    let session = state.checkout.create_session(&order).await.map_err(|e| {
        error!(user_id = %identity.user_id, error = %e, "failed to create checkout session");
        ApiError::Internal(e.to_string())
    })?;

    respond(
        StatusCode::OK,
        CheckoutResponse {
            checkout_url: session.url,
        },
    )
}

async fn health_handler() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(serde_json::json!({ "status": "ok" })))
}
