use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use lazy_static::lazy_static;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, ChangePasswordResponse, ChangedUser,
            ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest, PublicProfile,
            RegisterRequest, ResetDispatch, StatusResponse,
        },
        extractors::AuthUser,
        jwt::{clear_session_cookie, session_cookie, JwtKeys},
        password,
        repo::{self, NewUser, RecoveryToken, Role, Team, TeamChoice, User},
    },
    email::reset_link,
    errors::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/change-password", post(change_password))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// 32 bytes from the OS CSPRNG, hex-encoded to 64 characters.
fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(AppError::Validation("password too short".into()));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::DuplicateEmail);
    }

    // Joining an existing team demands that the team exists; without an id
    // the registrant founds a new team and becomes its manager.
    let (team, roles) = match payload.id_team {
        Some(id_team) => {
            Team::find_by_id(&state.db, id_team)
                .await?
                .ok_or(AppError::TeamNotFound)?;
            (TeamChoice::Join(id_team), vec![Role::User])
        }
        None => (
            TeamChoice::Create {
                company_name: payload.company_name.clone(),
                team_name: payload.team_name.clone(),
            },
            vec![Role::Manager],
        ),
    };

    let password_hash = password::hash_async(payload.password, state.config.bcrypt_cost).await?;

    let new = NewUser {
        email: payload.email.clone(),
        password_hash,
        name: payload.name.clone(),
        surname: payload.surname.clone(),
        roles,
        employee_role: payload.employee_role.clone(),
    };
    let user = match User::create_with_team(&state.db, new, team).await {
        Ok(user) => user,
        // The unique index is the real barrier against racing registrations;
        // the earlier lookup only gives the common case a clean answer.
        Err(ref e) if repo::is_unique_violation(e) => return Err(AppError::DuplicateEmail),
        Err(ref e) if repo::is_foreign_key_violation(e) => return Err(AppError::TeamNotFound),
        Err(e) => return Err(e.into()),
    };

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id_user, &user.name)?;
    let jar = jar.add(session_cookie(&token, keys.session_ttl));

    info!(user_id = %user.id_user, email = %user.email, "user registered");
    Ok((
        jar,
        Json(AuthResponse {
            code: 1,
            message: "user registered".into(),
            token,
            user,
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("invalid email".into()));
    }

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "login unknown email");
            AppError::UnknownUser
        })?;

    let ok = password::verify_async(payload.password, user.password_hash.clone()).await?;
    if !ok {
        warn!(user_id = %user.id_user, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id_user, &user.name)?;
    let jar = jar.add(session_cookie(&token, keys.session_ttl));

    info!(user_id = %user.id_user, email = %user.email, "user logged in");
    Ok((
        jar,
        Json(AuthResponse {
            code: 1,
            message: "user authenticated".into(),
            token,
            user,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>, AppError> {
    payload.email = payload.email.trim().to_lowercase();

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or(AppError::EmailNotFound)?;

    let token = generate_reset_token();
    RecoveryToken::create(&state.db, user.id_user, &token, OffsetDateTime::now_utc()).await?;
    let link = reset_link(&state.config.client_url, &token, user.id_user);

    // The token/link only leaves the server in dev/test mode; in production
    // the emailed link is the sole channel.
    let data = state.config.expose_reset_token.then(|| ResetDispatch {
        token: token.clone(),
        link: link.clone(),
    });

    // A failed send is still a 200: the token exists and a retry is cheap.
    let response = match state
        .mailer
        .send_password_reset(&user.email, &user.name, &link)
        .await
    {
        Ok(()) => {
            info!(user_id = %user.id_user, "reset email dispatched");
            ForgotPasswordResponse {
                code: 100,
                message: "reset email sent".into(),
                data,
            }
        }
        Err(e) => {
            warn!(error = %e, user_id = %user.id_user, "reset email failed");
            ForgotPasswordResponse {
                code: -80,
                message: "reset email could not be sent".into(),
                data,
            }
        }
    };
    Ok(Json(response))
}

#[instrument(skip(state, jar, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<(CookieJar, Json<ChangePasswordResponse>), AppError> {
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(AppError::Validation("password too short".into()));
    }

    let grant = RecoveryToken::find_by_token(&state.db, &payload.token)
        .await?
        .ok_or(AppError::InvalidResetToken)?;

    let user = User::find_by_id(&state.db, grant.user_id)
        .await?
        .ok_or(AppError::UserNotFound)?;

    let password_hash = password::hash_async(payload.password, state.config.bcrypt_cost).await?;
    User::update_password(&state.db, user.id_user, &password_hash).await?;

    // Consume the grant and every other outstanding token for this user, so
    // stale reset links die with it.
    let revoked = RecoveryToken::delete_all_for_user(&state.db, user.id_user).await?;
    debug!(user_id = %user.id_user, revoked, "recovery tokens deleted");

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id_user, &user.name)?;
    let jar = jar.add(session_cookie(&token, keys.session_ttl));

    info!(user_id = %user.id_user, "password changed");
    Ok((
        jar,
        Json(ChangePasswordResponse {
            code: 1,
            message: "user detail".into(),
            data: ChangedUser {
                user: PublicProfile {
                    name: user.name,
                    surname: user.surname,
                    email: user.email,
                },
            },
        }),
    ))
}

/// Session-verified profile lookup. Anything behind the session cookie goes
/// through the same extractor.
#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<User>, AppError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(AppError::UserNotFound)?;
    Ok(Json(user))
}

/// Sessions are stateless, so logout only tells the client to drop the
/// cookie. It succeeds whether or not a session existed.
#[instrument(skip(jar))]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<StatusResponse>) {
    let jar = jar.add(clear_session_cookie());
    (
        jar,
        Json(StatusResponse {
            code: 0,
            message: "logged out".into(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_tokens_are_64_hex_chars() {
        let token = generate_reset_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn reset_tokens_do_not_repeat() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_ne!(a, b);
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@x.com"));
    }
}
