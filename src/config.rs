use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub session_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub client_url: String,
    pub bcrypt_cost: u32,
    /// Dev/test only: echo the reset token and link back in the
    /// forgot-password response instead of relying on email delivery.
    pub expose_reset_token: bool,
    pub jwt: JwtConfig,
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let client_url =
            std::env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:5173".into());
        let bcrypt_cost = std::env::var("BCRYPT_COST")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(bcrypt::DEFAULT_COST);
        let expose_reset_token = std::env::var("EXPOSE_RESET_TOKEN")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            session_ttl_days: std::env::var("SESSION_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(30),
        };
        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: std::env::var("SMTP_PORT")
                    .ok()
                    .and_then(|v| v.parse::<u16>().ok())
                    .unwrap_or(587),
                username: std::env::var("SMTP_USERNAME")?,
                password: std::env::var("SMTP_PASSWORD")?,
                from: std::env::var("SMTP_FROM")?,
            }),
            Err(_) => None,
        };
        Ok(Self {
            database_url,
            client_url,
            bcrypt_cost,
            expose_reset_token,
            jwt,
            smtp,
        })
    }
}
