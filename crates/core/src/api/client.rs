//! HTTP client for the conflict-resolution service.

use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use reqwest::{Response, StatusCode, Url};
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::errors::ApiError;
use crate::models::{
    Ack, ApiResponse, AuthenticationObject, CloneRequest, CloneResult, CommitRequest,
    DeclineRequest, DeclineResult, ErrorBody, SaveFileRequest, StageRequest, StagedFile,
};
use crate::stream::{StreamConsumer, StreamEndpoint};
use crate::tree::TreeNode;

const DEFAULT_STREAM_PATH: &str = "api/gemini/resolve-conflicts-file-stream";
const COMMIT_FALLBACK: &str = "Failed to commit repository";
const ACCEPT_FALLBACK: &str = "Failed to accept merge";
const DECLINE_FALLBACK: &str = "Failed to decline merge";
const CLONE_FALLBACK: &str = "failed to clone repository";

/// Asynchronous client for the service REST API.
///
/// Every request carries the session cookie when one is configured.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    stream_endpoint: StreamEndpoint,
}

impl ApiClient {
    /// Create a client for `base_url`, optionally authenticated by `session`.
    pub fn new(base_url: &str, session: Option<&str>) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url.trim()).map_err(|e| ApiError::InvalidUrl {
            url: base_url.to_string(),
            detail: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl {
                url: base_url.to_string(),
                detail: "URL cannot be used as a base".into(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("mergeflow/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = session {
            let cookie = HeaderValue::from_str(&format!("session={}", token))
                .map_err(|_| ApiError::InvalidSession)?;
            headers.insert(COOKIE, cookie);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let stream_endpoint = StreamEndpoint::post(join_path(&base_url, DEFAULT_STREAM_PATH));
        info!(base_url = %base_url, authenticated = session.is_some(), "created ApiClient");
        Ok(Self {
            http,
            base_url,
            stream_endpoint,
        })
    }

    /// Build a client from a loaded configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, ApiError> {
        let client = Self::new(&config.server.base_url, config.server.session.as_deref())?;
        Ok(client.with_stream_endpoint(StreamEndpoint::from_config(config)))
    }

    pub fn with_stream_endpoint(mut self, endpoint: StreamEndpoint) -> Self {
        self.stream_endpoint = endpoint;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// A stream consumer sharing this client's connection pool and cookie.
    pub fn stream_consumer(&self) -> StreamConsumer {
        StreamConsumer::new(self.http.clone(), self.stream_endpoint.clone())
    }

    /// `GET /api/file/tree/generate?repoName=`
    #[instrument(skip(self))]
    pub async fn file_tree(&self, repo_name: &str) -> Result<Vec<TreeNode>, ApiError> {
        let url = self.url(&["api", "file", "tree", "generate"])?;
        let resp = self
            .http
            .get(url)
            .query(&[("repoName", repo_name)])
            .send()
            .await?;
        let resp = expect_success(resp, "failed to get file tree")?;
        let tree: Vec<TreeNode> = resp.json().await?;
        debug!(roots = tree.len(), "fetched file tree");
        Ok(tree)
    }

    /// `GET /api/file/data/{user}/{repo}/{path}`, returning the raw text.
    #[instrument(skip(self))]
    pub async fn file_content(
        &self,
        github_username: &str,
        repo_name: &str,
        file_path: &str,
    ) -> Result<String, ApiError> {
        let url = self.data_url(github_username, repo_name, file_path)?;
        let resp = self.http.get(url).send().await?;
        let resp = expect_success(resp, "failed to get file")?;
        let text = resp.text().await?;
        debug!(len = text.len(), "fetched file content");
        Ok(text)
    }

    /// `POST /api/file/data/{user}/{repo}/{path}`: overwrite one file on
    /// the server without staging it.
    #[instrument(skip(self, content), fields(len = content.len()))]
    pub async fn save_file(
        &self,
        github_username: &str,
        repo_name: &str,
        file_path: &str,
        content: &str,
    ) -> Result<Ack, ApiError> {
        let url = self.data_url(github_username, repo_name, file_path)?;
        let body = SaveFileRequest {
            content: content.to_string(),
        };
        let resp = self.http.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = error_message(resp, "failed to save file").await;
            warn!(status = status.as_u16(), %message, "file save rejected");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let ack: Ack = resp.json().await?;
        if !ack.success {
            return Err(ApiError::Rejected {
                message: ack.message,
            });
        }
        debug!("saved file");
        Ok(ack)
    }

    /// `GET /api/github/repos`: names of every repository the linked
    /// GitHub account can see.
    #[instrument(skip(self))]
    pub async fn list_repos(&self) -> Result<Vec<String>, ApiError> {
        let url = self.url(&["api", "github", "repos"])?;
        let resp = self.http.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = error_message(resp, "failed to list repositories").await;
            warn!(status = status.as_u16(), %message, "repository listing rejected");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        // The service encodes an empty list as `null`.
        let repos: Option<Vec<String>> = resp.json().await?;
        let repos = repos.unwrap_or_default();
        debug!(count = repos.len(), "listed repositories");
        Ok(repos)
    }

    /// `POST /api/github/clone`: shallow-clone `owner/repo` onto the server.
    ///
    /// Without `force` an existing checkout is a 409.
    #[instrument(skip(self))]
    pub async fn clone_repo(
        &self,
        owner: &str,
        repo: &str,
        force: bool,
    ) -> Result<CloneResult, ApiError> {
        if !super::is_valid_repo_name(owner) {
            return Err(ApiError::InvalidOwner(owner.to_string()));
        }
        check_repo_name(repo)?;
        let url = self.url(&["api", "github", "clone"])?;
        let body = CloneRequest {
            owner: owner.to_string(),
            repo: repo.to_string(),
            force,
        };
        let resp = self.http.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = error_message(resp, CLONE_FALLBACK).await;
            warn!(status = status.as_u16(), %message, "clone rejected");
            return Err(ApiError::CloneRepo {
                status: status.as_u16(),
                message,
            });
        }
        let result: CloneResult = resp.json().await?;
        info!(destination = %result.destination, branch = %result.default_branch, "cloned repository");
        Ok(result)
    }

    /// `POST /api/github/commit` with the new content of one file.
    ///
    /// The server writes the file, commits and pushes. Its reply is a bare
    /// envelope; `success: false` is an error even with a 2xx status.
    #[instrument(skip(self, new_file_data), fields(len = new_file_data.len()))]
    pub async fn commit(
        &self,
        repo_name: &str,
        new_file_data: &str,
        path: &str,
    ) -> Result<Ack, ApiError> {
        check_repo_name(repo_name)?;
        let url = self.url(&["api", "github", "commit"])?;
        let body = CommitRequest {
            repo_name: repo_name.to_string(),
            new_file_data: new_file_data.to_string(),
            path: path.to_string(),
        };
        let resp = self.http.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = error_message(resp, COMMIT_FALLBACK).await;
            warn!(status = status.as_u16(), %message, "commit rejected");
            return Err(ApiError::Commit {
                status: status.as_u16(),
                message,
            });
        }
        let ack: Ack = resp.json().await?;
        if !ack.success {
            warn!(message = %ack.message, "commit refused in envelope");
            let message = if ack.message.trim().is_empty() {
                COMMIT_FALLBACK.to_string()
            } else {
                ack.message
            };
            return Err(ApiError::Commit {
                status: status.as_u16(),
                message,
            });
        }
        info!(message = %ack.message, "committed file");
        Ok(ack)
    }

    /// `POST /api/github/merge/accept`: write the file and `git add` it,
    /// without committing.
    #[instrument(skip(self, new_file_data), fields(len = new_file_data.len()))]
    pub async fn accept_merge(
        &self,
        repo_name: &str,
        new_file_data: &str,
        full_path: &str,
    ) -> Result<StagedFile, ApiError> {
        check_repo_name(repo_name)?;
        let url = self.url(&["api", "github", "merge", "accept"])?;
        let body = StageRequest {
            new_file_data: new_file_data.to_string(),
            full_path: full_path.to_string(),
            repo_name: repo_name.to_string(),
        };
        let resp = self.http.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = error_message(resp, ACCEPT_FALLBACK).await;
            warn!(status = status.as_u16(), %message, "merge accept rejected");
            return Err(ApiError::MergeAccept {
                status: status.as_u16(),
                message,
            });
        }
        let staged: StagedFile = resp.json().await?;
        info!(full_path = %staged.full_path, staged = staged.staged, "staged file");
        Ok(staged)
    }

    /// `POST /api/github/merge/decline`: abort the in-progress merge.
    #[instrument(skip(self))]
    pub async fn decline_merge(
        &self,
        full_path: &str,
        repo_name: &str,
    ) -> Result<DeclineResult, ApiError> {
        check_repo_name(repo_name)?;
        let url = self.url(&["api", "github", "merge", "decline"])?;
        let body = DeclineRequest {
            full_path: full_path.to_string(),
            repo_name: repo_name.to_string(),
        };
        let resp = self.http.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = error_message(resp, DECLINE_FALLBACK).await;
            warn!(status = status.as_u16(), %message, "merge decline rejected");
            return Err(ApiError::MergeDecline {
                status: status.as_u16(),
                message,
            });
        }
        let result: DeclineResult = resp.json().await?;
        info!(action = %result.action, "declined merge");
        Ok(result)
    }

    /// `GET /api/auth/validate`.
    ///
    /// The envelope is returned as-is; an unauthenticated session is a
    /// `success: false` envelope, not an error.
    #[instrument(skip(self))]
    pub async fn validate_auth(&self) -> Result<ApiResponse<AuthenticationObject>, ApiError> {
        let url = self.url(&["api", "auth", "validate"])?;
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        match serde_json::from_slice::<ApiResponse<AuthenticationObject>>(&body) {
            Ok(envelope) => {
                debug!(success = envelope.success, "validated session");
                Ok(envelope)
            }
            Err(_) if !status.is_success() => Err(ApiError::Status {
                status: status.as_u16(),
                message: "failed to validate session".into(),
            }),
            Err(e) => Err(ApiError::Decode(e)),
        }
    }

    /// `/api/file/data/{user}/{repo}/{path...}` with each segment encoded.
    fn data_url(&self, user: &str, repo: &str, file_path: &str) -> Result<Url, ApiError> {
        let mut segments = vec!["api", "file", "data", user, repo];
        segments.extend(file_path.split('/').filter(|s| !s.is_empty()));
        self.url(&segments)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl {
                url: self.base_url.to_string(),
                detail: "URL cannot be used as a base".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn join_path(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn check_repo_name(repo_name: &str) -> Result<(), ApiError> {
    if super::is_valid_repo_name(repo_name) {
        Ok(())
    } else {
        Err(ApiError::InvalidRepoName(repo_name.to_string()))
    }
}

fn expect_success(resp: Response, message: &str) -> Result<Response, ApiError> {
    let status: StatusCode = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    warn!(status = status.as_u16(), message, "API request failed");
    Err(ApiError::Status {
        status: status.as_u16(),
        message: message.to_string(),
    })
}

/// `{error}`, else the envelope `message`, else `fallback`.
async fn error_message(resp: Response, fallback: &str) -> String {
    resp.json::<ErrorBody>()
        .await
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_segments_are_encoded() {
        let client = ApiClient::new("http://localhost:8080/", None).unwrap();
        let url = client
            .url(&["api", "file", "data", "octocat", "demo", "src", "a b.go"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/file/data/octocat/demo/src/a%20b.go"
        );
    }

    #[test]
    fn test_base_path_prefix_is_kept() {
        let client = ApiClient::new("https://example.com/merge/", None).unwrap();
        let url = client.url(&["api", "auth", "validate"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/merge/api/auth/validate");
        assert_eq!(
            client.stream_consumer().endpoint().url,
            "https://example.com/merge/api/gemini/resolve-conflicts-file-stream"
        );
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        assert!(matches!(
            ApiClient::new("not a url", None),
            Err(ApiError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ApiClient::new("mailto:dev@example.com", None),
            Err(ApiError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_rejects_session_with_newline() {
        assert!(matches!(
            ApiClient::new("http://localhost:8080", Some("abc\ndef")),
            Err(ApiError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn test_invalid_repo_name_fails_before_request() {
        // Port 9 (discard) is never contacted: validation fails first.
        let client = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        let err = client.commit("../escape", "data", "a.txt").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRepoName(_)));
        let err = client.decline_merge("a.txt", "two words").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRepoName(_)));
        let err = client.accept_merge("a/b", "data", "a.txt").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRepoName(_)));
        let err = client.clone_repo("octo cat", "demo", false).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOwner(_)));
        let err = client.clone_repo("octocat", "a/b", false).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRepoName(_)));
    }
}
