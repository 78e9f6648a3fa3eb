//! Identity is resolved upstream; this service only reads the result.

use super::{ApiError, AppState};
use crate::realtime::{ConnectionId, Hub};
use crate::{CONNECTION_HEADER, USER_HEADER};
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use std::convert::Infallible;
use tracing::debug;
use uuid::Uuid;

/// The caller, taken from the `X-User-Id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

/// The caller's own realtime connection, excluded from the echo broadcast.
///
/// Only honoured when the connection is open and belongs to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginConnection(pub Option<ConnectionId>);

impl OriginConnection {
    pub fn verify(hub: &Hub, claimed: Option<ConnectionId>, user_id: Option<Uuid>) -> Self {
        let Some(id) = claimed else {
            return OriginConnection(None);
        };
        match (hub.user_of(id), user_id) {
            (Some(owner), Some(user)) if owner == user => OriginConnection(Some(id)),
            _ => {
                debug!(connection_id = %id, "ignoring connection header not owned by caller");
                OriginConnection(None)
            }
        }
    }
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Option<Result<Uuid, ()>> {
    headers.get(name).map(|value| {
        value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or(())
    })
}

/// Header first, then the fallback (query parameter for socket upgrades).
pub fn resolve_user(headers: &HeaderMap, fallback: Option<Uuid>) -> Result<Uuid, ApiError> {
    match header_uuid(headers, USER_HEADER) {
        Some(Ok(id)) => Ok(id),
        Some(Err(())) => Err(ApiError::Unauthorized("Invalid X-User-Id header".to_string())),
        None => fallback.ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string())),
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        resolve_user(&parts.headers, None).map(CurrentUser)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for OriginConnection {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claimed = header_uuid(&parts.headers, CONNECTION_HEADER).and_then(Result::ok);
        let user_id = resolve_user(&parts.headers, None).ok();
        Ok(OriginConnection::verify(&state.hub, claimed, user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::setup_test_state;
    use axum::http::{HeaderValue, Request};

    async fn origin_of(state: &AppState, user: Uuid, connection: Uuid) -> OriginConnection {
        let (mut parts, _) = Request::builder()
            .header(USER_HEADER, user.to_string())
            .header(CONNECTION_HEADER, connection.to_string())
            .body(())
            .unwrap()
            .into_parts();
        OriginConnection::from_request_parts(&mut parts, state)
            .await
            .unwrap()
    }

    #[test]
    fn test_resolve_user() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        assert!(matches!(resolve_user(&headers, None), Err(ApiError::Unauthorized(_))));
        assert_eq!(resolve_user(&headers, Some(id)).unwrap(), id);

        headers.insert(USER_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(resolve_user(&headers, None).unwrap(), id);

        headers.insert(USER_HEADER, HeaderValue::from_static("admin"));
        assert!(matches!(resolve_user(&headers, Some(id)), Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_origin_must_belong_to_caller() {
        let state = setup_test_state();
        let (alice, mallory) = (Uuid::new_v4(), Uuid::new_v4());
        let (connection, _rx) = state.hub.connect(alice);

        assert_eq!(
            origin_of(&state, alice, connection).await,
            OriginConnection(Some(connection))
        );
        assert_eq!(origin_of(&state, mallory, connection).await, OriginConnection(None));
        assert_eq!(
            origin_of(&state, alice, Uuid::new_v4()).await,
            OriginConnection(None)
        );

        state.hub.disconnect(connection);
        assert_eq!(origin_of(&state, alice, connection).await, OriginConnection(None));
    }
}
