use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_status, PortalClient, PortalError};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionUser {
    pub nic: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

/// Authenticated session, created at sign-in and passed to every
/// authenticated request. Ending it consumes the value.
#[derive(Debug, Clone)]
pub struct Session {
    access_token: String,
    user: Option<SessionUser>,
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    passcode: &'a str,
}

#[derive(Deserialize)]
struct SignInResponse {
    access_token: String,
    user: Option<SessionUser>,
}

impl Session {
    /// Wraps a token issued elsewhere, e.g. from `PORTAL_TOKEN`.
    pub fn from_token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user: None,
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.access_token)
    }

    pub fn end(self) {
        match &self.user {
            Some(user) => info!(nic = %user.nic, "session ended"),
            None => info!("session ended"),
        }
    }
}

impl PortalClient {
    pub async fn sign_in(&self, email: &str, passcode: &str) -> Result<Session, PortalError> {
        let response = self
            .http
            .post(self.url("/auth/sign_in"))
            .json(&SignInRequest { email, passcode })
            .send()
            .await?;
        let body: SignInResponse = check_status(response).await?.json().await?;

        if let Some(user) = &body.user {
            info!(nic = %user.nic, "signed in");
        }
        Ok(Session {
            access_token: body.access_token,
            user: body.user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_sets_bearer_header() {
        let session = Session::from_token("abc123");
        let request = session
            .authorize(reqwest::Client::new().get("http://127.0.0.1/"))
            .build()
            .unwrap();

        assert_eq!(
            request.headers()[reqwest::header::AUTHORIZATION],
            "Bearer abc123"
        );
        assert!(session.user().is_none());
    }

    #[test]
    fn sign_in_response_accepts_backend_shape() {
        let body: SignInResponse = serde_json::from_str(
            r#"{
                "message": "Login successful",
                "access_token": "tok",
                "token_type": "bearer",
                "expires_in": 1800,
                "user": {
                    "nic": "200012345678",
                    "first_name": "Imasha",
                    "last_name": "Jayarathne",
                    "phone_number": "0771234567",
                    "email": "imasha@example.com"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(body.access_token, "tok");
        assert_eq!(body.user.unwrap().first_name, "Imasha");
    }

    #[tokio::test]
    async fn sign_in_against_closed_port_is_a_transport_error() {
        let client = PortalClient::new("http://127.0.0.1:1").unwrap();
        let err = client.sign_in("a@b.c", "secret1").await.unwrap_err();
        assert!(matches!(err, PortalError::Transport(_)));
    }
}
