use serde::{Deserialize, Serialize};

use crate::auth::repo::User;

/// Request body for registration. Either `id_team` is given (join an
/// existing team) or `companyName`/`teamName` describe the team to found.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub surname: Option<String>,
    #[serde(rename = "employeeRole")]
    pub employee_role: String,
    #[serde(rename = "companyName")]
    pub company_name: Option<String>,
    #[serde(rename = "teamName")]
    pub team_name: Option<String>,
    pub id_team: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub token: String,
    pub password: String,
}

/// Envelope returned by register and login: session token plus the created
/// or authenticated user (minus the password hash).
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub code: i32,
    pub message: String,
    pub token: String,
    pub user: User,
}

/// Forgot-password outcome. Email failure is not a request failure, so both
/// paths are 200 with a distinguishing code. The token/link payload is only
/// present when the dev-mode exposure flag is on.
#[derive(Debug, Serialize)]
pub struct ForgotPasswordResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResetDispatch>,
}

#[derive(Debug, Serialize)]
pub struct ResetDispatch {
    pub token: String,
    pub link: String,
}

/// Change-password returns a minimal profile, not the full record.
#[derive(Debug, Serialize)]
pub struct ChangePasswordResponse {
    pub code: i32,
    pub message: String,
    pub data: ChangedUser,
}

#[derive(Debug, Serialize)]
pub struct ChangedUser {
    pub user: PublicProfile,
}

#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub name: String,
    pub surname: Option<String>,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub code: i32,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_uses_client_field_names() {
        let body = serde_json::json!({
            "email": "a@x.com",
            "password": "pw123456",
            "name": "Ana",
            "employeeRole": "engineer",
            "companyName": "Acme",
            "teamName": "Core",
        });
        let req: RegisterRequest = serde_json::from_value(body).expect("deserialize");
        assert_eq!(req.employee_role, "engineer");
        assert_eq!(req.company_name.as_deref(), Some("Acme"));
        assert!(req.id_team.is_none());
        assert!(req.surname.is_none());
    }

    #[test]
    fn forgot_password_response_omits_data_when_absent() {
        let response = ForgotPasswordResponse {
            code: 100,
            message: "reset email sent".into(),
            data: None,
        };
        let json = serde_json::to_value(&response).expect("serialize");
        assert!(json.get("data").is_none());
        assert_eq!(json["code"], 100);
    }

    #[test]
    fn change_password_response_nests_minimal_profile() {
        let response = ChangePasswordResponse {
            code: 1,
            message: "user detail".into(),
            data: ChangedUser {
                user: PublicProfile {
                    name: "Ana".into(),
                    surname: Some("Diaz".into()),
                    email: "a@x.com".into(),
                },
            },
        };
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["data"]["user"]["email"], "a@x.com");
        assert!(json["data"]["user"].get("password_hash").is_none());
    }
}
