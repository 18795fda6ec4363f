//! Wire types exchanged with the service.
//!
//! Field names follow the service's camelCase JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ApiError;

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Generic `{success, message, payload?}` wrapper used by the service.
///
/// `payload` is only present when `success` is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T> ApiResponse<T> {
    /// The payload of a successful response, or `None`.
    pub fn payload(&self) -> Option<&T> {
        if self.success {
            self.payload.as_ref()
        } else {
            None
        }
    }

    /// Convert the envelope into a `Result`.
    pub fn into_payload(self) -> Result<T, ApiError> {
        match (self.success, self.payload) {
            (true, Some(payload)) => Ok(payload),
            (true, None) => Err(ApiError::Rejected {
                message: format!("{} (missing payload)", self.message),
            }),
            (false, _) => Err(ApiError::Rejected {
                message: self.message,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// The signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub google_id: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// The server-side session backing the cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Payload of `GET /api/auth/validate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticationObject {
    pub user: User,
    pub session: Session,
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// Body of `POST /api/github/clone`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloneRequest {
    pub owner: String,
    pub repo: String,
    /// Replace an existing checkout instead of failing with 409.
    pub force: bool,
}

/// Reply to a successful clone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CloneResult {
    pub message: String,
    pub owner: String,
    pub repo: String,
    /// Empty when GitHub did not report one.
    pub default_branch: String,
    pub shallow: bool,
    /// Checkout location on the server.
    pub destination: String,
}

// ---------------------------------------------------------------------------
// Commit / stage / decline
// ---------------------------------------------------------------------------

/// Body of `POST /api/github/commit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub repo_name: String,
    pub new_file_data: String,
    pub path: String,
}

/// Reply that only acknowledges: an envelope whose payload is `{}`.
///
/// Sent by commit and by file save.
pub type Ack = ApiResponse<serde_json::Value>;

/// Body of `POST /api/github/merge/accept`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageRequest {
    pub new_file_data: String,
    pub full_path: String,
    pub repo_name: String,
}

/// Reply to a successful merge accept: the file is written and `git add`ed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StagedFile {
    pub message: String,
    pub repo_name: String,
    pub full_path: String,
    pub staged: bool,
}

/// Body of `POST /api/github/merge/decline`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeclineRequest {
    pub full_path: String,
    pub repo_name: String,
}

/// Reply to a successful merge decline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeclineResult {
    pub message: String,
    pub repo_name: String,
    pub action: String,
    pub stdout: String,
}

/// Body of `POST /api/file/data/{path}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveFileRequest {
    pub content: String,
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// Failure body. Handlers send either `{error}` or a `{success: false,
/// message}` envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}

impl ErrorBody {
    /// `error`, else `message`, ignoring blank values.
    pub fn into_message(self) -> Option<String> {
        let usable = |m: &Option<String>| m.as_deref().is_some_and(|m| !m.trim().is_empty());
        if usable(&self.error) {
            self.error
        } else if usable(&self.message) {
            self.message
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_json() -> serde_json::Value {
        serde_json::json!({
            "success": true,
            "message": "authenticated",
            "payload": {
                "user": {
                    "id": "0b6f4a52-3f0e-4a57-9d0c-8f5b1f7f5e11",
                    "googleId": "1093",
                    "isAdmin": false,
                    "createdAt": "2025-03-01T10:00:00Z"
                },
                "session": {
                    "id": "7a0d7c8e-05c4-4f3e-9a53-2b3f7d7b0c21",
                    "userId": "0b6f4a52-3f0e-4a57-9d0c-8f5b1f7f5e11",
                    "createdAt": "2025-03-01T10:00:00Z",
                    "expiresAt": "2025-03-08T10:00:00Z"
                }
            }
        })
    }

    #[test]
    fn test_success_envelope_exposes_payload() {
        let resp: ApiResponse<AuthenticationObject> =
            serde_json::from_value(auth_json()).unwrap();
        assert!(resp.payload().is_some());
        let ao = resp.into_payload().unwrap();
        assert_eq!(ao.user.id, ao.session.user_id);
        assert!(!ao.user.is_admin);
    }

    #[test]
    fn test_failure_envelope_has_no_payload() {
        let resp: ApiResponse<AuthenticationObject> = serde_json::from_value(
            serde_json::json!({"success": false, "message": "session has expired"}),
        )
        .unwrap();
        assert!(resp.payload().is_none());
        let err = resp.into_payload().unwrap_err();
        assert!(matches!(err, ApiError::Rejected { ref message } if message == "session has expired"));
    }

    #[test]
    fn test_session_expiry() {
        let resp: ApiResponse<AuthenticationObject> =
            serde_json::from_value(auth_json()).unwrap();
        let session = resp.into_payload().unwrap().session;
        let before = "2025-03-02T00:00:00Z".parse().unwrap();
        let after = "2025-03-09T00:00:00Z".parse().unwrap();
        assert!(!session.is_expired_at(before));
        assert!(session.is_expired_at(after));
    }

    #[test]
    fn test_commit_request_wire_names() {
        let body = CommitRequest {
            repo_name: "demo".into(),
            new_file_data: "package main\n".into(),
            path: "cmd/main.go".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["repoName"], "demo");
        assert_eq!(json["newFileData"], "package main\n");
        assert_eq!(json["path"], "cmd/main.go");
    }

    #[test]
    fn test_commit_reply_is_an_envelope() {
        let resp: Ack = serde_json::from_value(
            serde_json::json!({"success": true, "message": "ok", "payload": {}}),
        )
        .unwrap();
        assert!(resp.success);
        assert_eq!(resp.message, "ok");
        assert_eq!(resp.payload(), Some(&serde_json::json!({})));
    }

    #[test]
    fn test_sparse_staged_file_decodes() {
        let result: StagedFile =
            serde_json::from_value(serde_json::json!({"message": "ok", "staged": true})).unwrap();
        assert!(result.staged);
        assert!(result.full_path.is_empty());
    }

    #[test]
    fn test_clone_result_keeps_snake_case_branch() {
        let result: CloneResult = serde_json::from_value(serde_json::json!({
            "message": "cloned",
            "owner": "octocat",
            "repo": "hello-world",
            "default_branch": "main",
            "shallow": true,
            "destination": "repos/u/octocat/hello-world"
        }))
        .unwrap();
        assert_eq!(result.default_branch, "main");
        assert!(result.shallow);
    }

    #[test]
    fn test_error_body_prefers_error_then_message() {
        let body = |v| serde_json::from_value::<ErrorBody>(v).unwrap().into_message();
        assert_eq!(
            body(serde_json::json!({"error": "git add failed", "message": "other"})).as_deref(),
            Some("git add failed")
        );
        assert_eq!(
            body(serde_json::json!({"success": false, "message": "failed to commit repository"}))
                .as_deref(),
            Some("failed to commit repository")
        );
        assert_eq!(
            body(serde_json::json!({"error": " ", "message": "fallback to message"})).as_deref(),
            Some("fallback to message")
        );
        assert_eq!(body(serde_json::json!({"success": false, "message": ""})), None);
    }
}
