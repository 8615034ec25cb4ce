use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::auth::jwt::{JwtKeys, SESSION_COOKIE};

/// Extracts and verifies the session cookie, yielding the user id. Protected
/// routes take this as an argument; the auth flows themselves never read it.
#[derive(Debug)]
pub struct AuthUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_owned())
            .ok_or((StatusCode::UNAUTHORIZED, "missing session cookie".to_string()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(&token).map_err(|_| {
            warn!("invalid or expired session token");
            (
                StatusCode::UNAUTHORIZED,
                "invalid or expired session".to_string(),
            )
        })?;

        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::http::{header::COOKIE, Request};

    fn parts_with_cookie(cookie: Option<String>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(()).expect("request").into_parts().0
    }

    #[tokio::test]
    async fn accepts_a_freshly_issued_session() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let token = keys.sign(11, "Ana").expect("sign");
        let mut parts = parts_with_cookie(Some(format!("{SESSION_COOKIE}={token}")));
        let AuthUser(user_id) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect("extract");
        assert_eq!(user_id, 11);
    }

    #[tokio::test]
    async fn rejects_a_missing_cookie() {
        let state = AppState::fake();
        let mut parts = parts_with_cookie(None);
        let (status, _) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_a_tampered_token() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let token = keys.sign(11, "Ana").expect("sign");
        let mut parts =
            parts_with_cookie(Some(format!("{SESSION_COOKIE}={token}x")));
        let (status, _) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
