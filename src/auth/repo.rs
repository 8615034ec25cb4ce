use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::warn;

/// Account role, derived at registration: the founder of a team is its
/// manager, anyone joining an existing team is a plain user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::User => "user",
        }
    }

    fn parse(s: &str) -> Option<Role> {
        match s {
            "manager" => Some(Role::Manager),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

/// Comma-joined role encoding used by the `users.roles` column. This stays
/// inside the persistence adapter; domain code only sees `Vec<Role>`.
fn encode_roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_roles(raw: &str) -> Vec<Role> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            let role = Role::parse(s);
            if role.is_none() {
                warn!(tag = %s, "unknown role tag in users.roles, skipping");
            }
            role
        })
        .collect()
}

/// User record. The password field always holds a bcrypt hash and is never
/// serialized back to clients.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id_user: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub surname: Option<String>,
    pub roles: Vec<Role>,
    pub employee_role: String,
    pub status: i16,
    pub id_team: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id_user: i64,
    email: String,
    password_hash: String,
    name: String,
    surname: Option<String>,
    roles: String,
    employee_role: String,
    status: i16,
    id_team: Option<i64>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id_user: row.id_user,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            surname: row.surname,
            roles: decode_roles(&row.roles),
            employee_role: row.employee_role,
            status: row.status,
            id_team: row.id_team,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const USER_COLUMNS: &str = "id_user, email, password_hash, name, surname, roles, \
                            employee_role, status, id_team, created_at, updated_at";

/// Fields supplied by the registration workflow. Ids, status and timestamps
/// come from the database.
#[derive(Debug)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub surname: Option<String>,
    pub roles: Vec<Role>,
    pub employee_role: String,
}

/// Team attachment decided during registration.
#[derive(Debug)]
pub enum TeamChoice {
    /// Join an existing team as a member.
    Join(i64),
    /// Found a new team with the freshly created user as its manager.
    Create {
        company_name: Option<String>,
        team_name: Option<String>,
    },
}

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(row.map(User::from))
    }

    pub async fn find_by_id(db: &PgPool, id_user: i64) -> sqlx::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id_user = $1"
        ))
        .bind(id_user)
        .fetch_optional(db)
        .await?;
        Ok(row.map(User::from))
    }

    /// Create a user and attach it to a team as one transactional unit, so a
    /// failed team insert never leaves a team-less user behind. Email
    /// uniqueness is enforced by the database index; a concurrent duplicate
    /// insert surfaces as a unique violation, not as a stale read.
    pub async fn create_with_team(
        db: &PgPool,
        new: NewUser,
        team: TeamChoice,
    ) -> sqlx::Result<User> {
        let mut tx = db.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, password_hash, name, surname, roles, employee_role, status) \
             VALUES ($1, $2, $3, $4, $5, $6, 1) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(&new.surname)
        .bind(encode_roles(&new.roles))
        .bind(&new.employee_role)
        .fetch_one(&mut *tx)
        .await?;

        let id_team = match team {
            TeamChoice::Join(id_team) => id_team,
            TeamChoice::Create {
                company_name,
                team_name,
            } => {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO teams (id_user_manager, company_name, team_name) \
                     VALUES ($1, $2, $3) \
                     RETURNING id_team",
                )
                .bind(row.id_user)
                .bind(&company_name)
                .bind(&team_name)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET id_team = $2, updated_at = now() \
             WHERE id_user = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(row.id_user)
        .bind(id_team)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    pub async fn update_password(
        db: &PgPool,
        id_user: i64,
        password_hash: &str,
    ) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id_user = $1")
            .bind(id_user)
            .bind(password_hash)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Team {
    pub id_team: i64,
    pub id_user_manager: i64,
    pub company_name: Option<String>,
    pub team_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Team {
    pub async fn find_by_id(db: &PgPool, id_team: i64) -> sqlx::Result<Option<Team>> {
        sqlx::query_as::<_, Team>(
            "SELECT id_team, id_user_manager, company_name, team_name, created_at \
             FROM teams WHERE id_team = $1",
        )
        .bind(id_team)
        .fetch_optional(db)
        .await
    }
}

/// One-time password-reset grant. Token values are generated by the caller
/// from a cryptographically secure source, never in here.
#[derive(Debug, Clone, FromRow)]
pub struct RecoveryToken {
    pub user_id: i64,
    pub token: String,
    pub created_at: OffsetDateTime,
}

impl RecoveryToken {
    pub async fn create(
        db: &PgPool,
        user_id: i64,
        token: &str,
        created_at: OffsetDateTime,
    ) -> sqlx::Result<RecoveryToken> {
        sqlx::query_as::<_, RecoveryToken>(
            "INSERT INTO recovery_tokens (user_id, token, created_at) \
             VALUES ($1, $2, $3) \
             RETURNING user_id, token, created_at",
        )
        .bind(user_id)
        .bind(token)
        .bind(created_at)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_token(db: &PgPool, token: &str) -> sqlx::Result<Option<RecoveryToken>> {
        sqlx::query_as::<_, RecoveryToken>(
            "SELECT user_id, token, created_at FROM recovery_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(db)
        .await
    }

    /// Single-use consumption invalidates every outstanding token for the
    /// user, not just the one presented, collapsing stale reset links.
    pub async fn delete_all_for_user(db: &PgPool, user_id: i64) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM recovery_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Postgres unique-constraint violation (SQLSTATE 23505).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Postgres foreign-key violation (SQLSTATE 23503).
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23503"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_encode_as_comma_joined_tags() {
        assert_eq!(encode_roles(&[Role::Manager]), "manager");
        assert_eq!(encode_roles(&[Role::Manager, Role::User]), "manager,user");
        assert_eq!(encode_roles(&[]), "");
    }

    #[test]
    fn roles_decode_skips_empty_and_unknown_tags() {
        assert_eq!(decode_roles("manager"), vec![Role::Manager]);
        assert_eq!(decode_roles("manager,user"), vec![Role::Manager, Role::User]);
        assert_eq!(decode_roles(""), Vec::<Role>::new());
        assert_eq!(decode_roles("admin,user"), vec![Role::User]);
    }

    #[test]
    fn user_serialization_never_includes_password_hash() {
        let user = User {
            id_user: 1,
            email: "a@x.com".into(),
            password_hash: "$2b$04$secret".into(),
            name: "Ana".into(),
            surname: None,
            roles: vec![Role::Manager],
            employee_role: "engineer".into(),
            status: 1,
            id_team: Some(3),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&user).expect("serialize user");
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["roles"], serde_json::json!(["manager"]));
        assert_eq!(json["id_team"], 3);
    }
}
