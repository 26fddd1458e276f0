use std::collections::VecDeque;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    error::{Result, SyncError},
    source::RemoteDirectoryService,
    types::{EntryType, RemoteEntry, RepositoryId},
};

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// GitHub-backed remote directory service
///
/// Lists directories and fetches blobs through the GitHub contents API.
/// Files too large to be inlined by the API are downloaded from their
/// `download_url`.
#[derive(Clone)]
pub struct GitHubService {
    client: Client,
    api_base: String,
    branch: Option<String>,
    token: Option<String>,
}

#[derive(Deserialize)]
struct GitHubApiEntry {
    name: String,
    path: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "type")]
    entry_type: String,
}

#[derive(Deserialize)]
struct GitHubApiFile {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
    download_url: Option<String>,
}

impl GitHubService {
    /// Create a service reading the default branch of each repository
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent("module-sync/0.1")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            branch: None,
            token: None,
        }
    }

    /// Read from `branch` instead of the repository's default branch
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Authenticate requests with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Point the service at another API host (GitHub Enterprise, test servers)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the contents API URL for a path
    fn api_url(&self, repository: &RepositoryId, path: &str) -> String {
        let path = path.trim_matches('/');
        let mut url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, repository.owner, repository.name, path
        );
        if let Some(branch) = &self.branch {
            url.push_str("?ref=");
            url.push_str(branch);
        }
        url
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Check if an error is a rate limit error
    fn is_rate_limit_error(&self, status: StatusCode) -> bool {
        status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS
    }

    /// Turn a non-success response into the matching error
    async fn check_status(&self, response: Response, path: &str) -> Result<Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(SyncError::NotFound {
                path: path.to_string(),
            }),
            status if self.is_rate_limit_error(status) => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "GitHub API rate limit exceeded".to_string());
                Err(SyncError::RateLimited { message })
            }
            status => {
                let message = format!(
                    "Unexpected status {}: {}",
                    status,
                    response.text().await.unwrap_or_default()
                );
                Err(SyncError::InvalidResponse { message })
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, path: &str) -> Result<T> {
        let response = self.get(url).send().await?;
        let body = self.check_status(response, path).await?.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| SyncError::InvalidResponse {
            message: format!("Malformed contents response for {}: {}", path, e),
        })
    }

    async fn list_directory(&self, repository: &RepositoryId, path: &str) -> Result<Vec<RemoteEntry>> {
        let url = self.api_url(repository, path);
        let api_entries: Vec<GitHubApiEntry> = self.get_json(&url, path).await?;

        Ok(api_entries
            .into_iter()
            .map(|e| {
                let entry_type = match e.entry_type.as_str() {
                    "dir" => EntryType::Dir,
                    _ => EntryType::File, // Default to file for unknown types
                };
                RemoteEntry {
                    name: e.name,
                    path: e.path,
                    size: if entry_type == EntryType::Dir { 0 } else { e.size },
                    entry_type,
                    content_hash: e.sha,
                }
            })
            .collect())
    }
}

impl Default for GitHubService {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode the base64 payload of a contents response; GitHub wraps it at 60 columns
fn decode_inline_content(content: &str) -> Result<Bytes> {
    let cleaned: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(cleaned)
        .map(Bytes::from)
        .map_err(|e| SyncError::InvalidResponse {
            message: format!("Invalid base64 content: {}", e),
        })
}

#[async_trait]
impl RemoteDirectoryService for GitHubService {
    async fn list_entries(&self, repository: &RepositoryId, path: &str) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        let mut pending = VecDeque::from([path.trim_matches('/').to_string()]);

        // Breadth-first, so every directory is emitted before its children
        while let Some(directory) = pending.pop_front() {
            for entry in self.list_directory(repository, &directory).await? {
                if entry.entry_type == EntryType::Dir {
                    pending.push_back(entry.path.clone());
                }
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    async fn fetch_bytes(&self, repository: &RepositoryId, entry: &RemoteEntry) -> Result<Bytes> {
        let url = self.api_url(repository, &entry.path);
        let file: GitHubApiFile = self.get_json(&url, &entry.path).await?;

        if file.encoding == "base64" && (!file.content.is_empty() || entry.size == 0) {
            return decode_inline_content(&file.content);
        }

        let download_url = file.download_url.ok_or_else(|| SyncError::InvalidResponse {
            message: format!("No download URL for {}", entry.path),
        })?;
        let response = self.get(&download_url).send().await?;
        Ok(self.check_status(response, &entry.path).await?.bytes().await?)
    }

    fn identifier(&self) -> String {
        format!(
            "github+{}@{}",
            self.api_base,
            self.branch.as_deref().unwrap_or("default")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> RepositoryId {
        RepositoryId::new("owner", "repo")
    }

    #[test]
    fn test_api_url() {
        let service = GitHubService::new();
        assert_eq!(
            service.api_url(&repository(), "/Binaries/net8/"),
            "https://api.github.com/repos/owner/repo/contents/Binaries/net8"
        );
    }

    #[test]
    fn test_api_url_with_branch() {
        let service = GitHubService::new()
            .with_branch("main")
            .with_api_base("http://localhost:1234/");
        assert_eq!(
            service.api_url(&repository(), "Binaries"),
            "http://localhost:1234/repos/owner/repo/contents/Binaries?ref=main"
        );
    }

    #[test]
    fn test_decode_wrapped_content() {
        let decoded = decode_inline_content("aGVsbG8g\nd29ybGQ=\n").unwrap();
        assert_eq!(decoded, Bytes::from("hello world"));

        assert!(matches!(
            decode_inline_content("!!!"),
            Err(SyncError::InvalidResponse { .. })
        ));
    }
}
