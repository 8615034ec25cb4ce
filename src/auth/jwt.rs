use axum::extract::FromRef;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::state::AppState;

/// Name of the session cookie carrying the signed token.
pub const SESSION_COOKIE: &str = "token";

/// Identity claims embedded in the session token. Sessions are stateless;
/// the signature is the only thing binding them to this server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,     // user id
    pub name: String, // display name
    pub iat: usize,   // issued at (unix timestamp)
    pub exp: usize,   // expires at (unix timestamp)
}

/// JWT signing and verification keys, built once from config.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub session_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let jwt = &state.config.jwt;
        Self {
            encoding: EncodingKey::from_secret(jwt.secret.as_bytes()),
            decoding: DecodingKey::from_secret(jwt.secret.as_bytes()),
            session_ttl: Duration::days(jwt.session_ttl_days),
        }
    }
}

impl JwtKeys {
    pub fn sign(&self, user_id: i64, name: &str) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + self.session_ttl;
        let claims = Claims {
            sub: user_id,
            name: name.to_owned(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "session token signed");
        Ok(token)
    }

    /// Accept a token back. Not used by the auth flows themselves, but any
    /// protected-route middleware must go through here so issuance and
    /// verification share one secret and algorithm.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        debug!(user_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }
}

/// Session cookie contract: HTTP-only, secure, cross-site, 30 days, root path.
pub fn session_cookie(token: &str, ttl: Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_owned()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(ttl)
        .build()
}

/// Logout: same attributes, empty value, immediate expiry. There is no
/// server-side session state to revoke.
pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_roundtrip() {
        let keys = make_keys();
        let token = keys.sign(7, "Ana").expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.name, "Ana");
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn verify_rejects_foreign_secret() {
        let keys = make_keys();
        let other = JwtKeys {
            encoding: EncodingKey::from_secret(b"other-secret"),
            decoding: DecodingKey::from_secret(b"other-secret"),
            session_ttl: Duration::days(30),
        };
        let token = other.sign(7, "Ana").expect("sign");
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn session_cookie_contract() {
        let cookie = session_cookie("signed-token", Duration::days(30));
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "signed-token");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
        assert_eq!(cookie.max_age(), Some(Duration::days(30)));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_session_cookie();
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }
}
