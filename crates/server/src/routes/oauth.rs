//! OAuth connect/callback/disconnect routes.
//!
//! The browser session only carries a random key binding the merchant to
//! their outstanding state token; the token itself lives server-side in the
//! connector's single-use store.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get};
use axum::Router;
use saltbox_core::Platform;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use uuid::Uuid;

use crate::error::AppError;
use crate::oauth::{CallbackParams, OAuthError};
use crate::state::AppState;
use crate::storage::Storage as _;

const OAUTH_SESSION_KEY: &str = "oauth_session_key";

/// Build the OAuth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/connect", get(connect))
        .route("/callback", get(callback))
        .route("/disconnect/{uid}", delete(disconnect))
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub platform: Platform,
    /// Shop domain, required for Shopify connects.
    pub shop: Option<String>,
}

/// Random key identifying this browser session; created on first use.
async fn session_key(session: &Session) -> Result<String, AppError> {
    if let Ok(Some(key)) = session.get::<String>(OAUTH_SESSION_KEY).await {
        return Ok(key);
    }
    let key = Uuid::new_v4().to_string();
    session
        .insert(OAUTH_SESSION_KEY, &key)
        .await
        .map_err(|e| AppError::Internal(format!("session store failed: {e}")))?;
    Ok(key)
}

/// GET /connect - Start the OAuth flow for a platform.
#[instrument(skip(state, session))]
async fn connect(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<ConnectParams>,
) -> Result<Response, AppError> {
    let key = session_key(&session).await?;
    let url = state
        .oauth()
        .begin_authorization(params.platform, &key, params.shop.as_deref())
        .await?;
    Ok(Redirect::to(&url).into_response())
}

/// GET /callback - Complete the OAuth flow.
///
/// On success redirects to the connected store's detail view.
#[instrument(skip(state, session, params))]
async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    let key = session
        .get::<String>(OAUTH_SESSION_KEY)
        .await
        .ok()
        .flatten()
        .ok_or(AppError::OAuth(OAuthError::InvalidState))?;

    let store = state.oauth().complete_authorization(params, &key).await?;
    Ok(Redirect::to(&format!("/stores/{}", store.uid)).into_response())
}

/// DELETE /disconnect/{uid} - Terminal disconnect; revokes the local
/// credential and removes the mirrored records.
#[instrument(skip(state))]
async fn disconnect(
    State(state): State<AppState>,
    Path(uid): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let store = state
        .storage()
        .store_by_uid(uid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("store {uid}")))?;

    state.tenancy().disconnect(&store).await?;
    Ok(StatusCode::NO_CONTENT)
}
