//! Release feed client (GitHub Releases API).
//!
//! Fetches the latest tagged release of a source repository, or the release of one
//! specific version. The tag is normalized into a plain version and bare issue
//! references in the notes are rewritten so they keep pointing at the upstream
//! repository once embedded in our own changelog.

use async_trait::async_trait;
use regex::{Captures, Regex};
use reqwest::Client;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, error, warn};

use crate::config::ReleasesConfig;
use crate::contract::{ReleaseFeed, ReleaseInfo};
use crate::error::{Result, SyncError};

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: Option<String>,
    body: Option<String>,
}

/// `owner` and `repo` of a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub owner: String,
    pub repo: String,
}

/// Parse `host/owner/repo` out of a repository URL.
///
/// Accepts an optional scheme, `git@host:owner/repo` SSH form, a trailing `.git` and
/// extra path segments (`/tree/main`, `/releases`).
pub fn parse_repo_url(url: &str) -> Option<RepoCoordinates> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:[A-Za-z][A-Za-z0-9+.-]*://)?(?:[^@/]+@)?[^/:]+(?::\d+)?[/:]([^/]+)/([^/]+?)(?:\.git)?(?:/.*)?$",
        )
        .expect("repository url pattern is valid")
    });

    let caps = pattern.captures(url.trim())?;
    let owner = caps.get(1)?.as_str();
    let repo = caps.get(2)?.as_str();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some(RepoCoordinates {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// Prefix bare `#123` references with `owner/repo`. Already qualified references
/// (`other/repo#5`) and anchors inside words are left alone.
pub fn qualify_issue_references(text: &str, coords: &RepoCoordinates) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(^|[^\w/#])#(\d+)\b").expect("issue reference pattern is valid")
    });

    pattern
        .replace_all(text, |caps: &Captures| {
            format!("{}{}/{}#{}", &caps[1], coords.owner, coords.repo, &caps[2])
        })
        .into_owned()
}

pub struct ReleaseFetcher {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl ReleaseFetcher {
    /// The bearer token is taken from the config, never from the environment directly.
    pub fn new(config: &ReleasesConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("provider-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Fetch `/repos/{owner}/{repo}/releases/{endpoint}`.
    async fn fetch_release(&self, coords: &RepoCoordinates, endpoint: &str) -> Result<ReleaseInfo> {
        let url = format!(
            "{}/repos/{}/{}/releases/{}",
            self.api_url, coords.owner, coords.repo, endpoint
        );
        debug!(url = %url, authenticated = self.token.is_some(), "Fetching release");

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        let release: GithubRelease = response.json().await?;

        let tag = release
            .tag_name
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SyncError::NotFound(format!("release of {}/{} has no tag", coords.owner, coords.repo)))?;
        let version = tag.strip_prefix('v').unwrap_or(&tag).to_string();
        let changelog = release
            .body
            .filter(|b| !b.trim().is_empty())
            .map(|b| qualify_issue_references(&b, coords));

        Ok(ReleaseInfo { version, changelog })
    }
}

#[async_trait]
impl ReleaseFeed for ReleaseFetcher {
    async fn latest_release(&self, repo_url: &str) -> Option<ReleaseInfo> {
        let Some(coords) = parse_repo_url(repo_url) else {
            warn!(repo_url = %repo_url, "Cannot parse repository url");
            return None;
        };

        match self.fetch_release(&coords, "latest").await {
            Ok(release) => Some(release),
            Err(e) => {
                error!(repo_url = %repo_url, error = %e, "Failed to fetch latest release");
                None
            }
        }
    }

    async fn release_for_version(&self, repo_url: &str, version: &str) -> Option<ReleaseInfo> {
        let Some(coords) = parse_repo_url(repo_url) else {
            warn!(repo_url = %repo_url, "Cannot parse repository url");
            return None;
        };

        let bare = version.strip_prefix('v').unwrap_or(version);
        for tag in [format!("v{bare}"), bare.to_string()] {
            match self.fetch_release(&coords, &format!("tags/{tag}")).await {
                Ok(release) => return Some(release),
                Err(e) => debug!(repo_url = %repo_url, tag = %tag, error = %e, "No release for tag"),
            }
        }
        warn!(repo_url = %repo_url, version = %version, "No release found for version");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn coords(owner: &str, repo: &str) -> RepoCoordinates {
        RepoCoordinates {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    fn fetcher(server: &MockServer, token: Option<&str>) -> ReleaseFetcher {
        ReleaseFetcher::new(&ReleasesConfig {
            api_url: server.uri(),
            token: token.map(str::to_string),
            http_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn parses_common_repository_urls() {
        assert_eq!(parse_repo_url("https://github.com/acme/widget"), Some(coords("acme", "widget")));
        assert_eq!(parse_repo_url("https://github.com/acme/widget.git"), Some(coords("acme", "widget")));
        assert_eq!(parse_repo_url("github.com/acme/widget/tree/main"), Some(coords("acme", "widget")));
        assert_eq!(parse_repo_url("git@github.com:acme/widget.git"), Some(coords("acme", "widget")));
        assert_eq!(parse_repo_url("http://127.0.0.1:8080/acme/widget"), Some(coords("acme", "widget")));
    }

    #[test]
    fn rejects_malformed_repository_urls() {
        assert_eq!(parse_repo_url("github.com/acme"), None);
        assert_eq!(parse_repo_url("widget"), None);
        assert_eq!(parse_repo_url(""), None);
    }

    #[test]
    fn qualifies_bare_issue_references_only() {
        let c = coords("acme", "widget");
        assert_eq!(qualify_issue_references("Fixed #5", &c), "Fixed acme/widget#5");
        assert_eq!(qualify_issue_references("#12 at start", &c), "acme/widget#12 at start");
        assert_eq!(
            qualify_issue_references("See other/repo#7 and (#8)", &c),
            "See other/repo#7 and (acme/widget#8)"
        );
        assert_eq!(qualify_issue_references("## Heading\nno refs", &c), "## Heading\nno refs");
    }

    #[tokio::test]
    async fn strips_v_prefix_and_rewrites_notes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"tag_name":"v1.1.0","body":"Fixed #5"}"#,
            ))
            .mount(&server)
            .await;

        let release = fetcher(&server, None)
            .latest_release("https://github.com/acme/widget")
            .await
            .unwrap();
        assert_eq!(release.version, "1.1.0");
        assert_eq!(release.changelog.as_deref(), Some("Fixed acme/widget#5"));
    }

    #[tokio::test]
    async fn sends_bearer_token_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases/latest"))
            .and(header("Authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"tag_name":"2.0.0"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let release = fetcher(&server, Some("s3cret"))
            .latest_release("https://github.com/acme/widget")
            .await
            .unwrap();
        assert_eq!(release.version, "2.0.0");
        assert_eq!(release.changelog, None);
    }

    #[tokio::test]
    async fn missing_tag_and_error_status_are_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/untagged/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"body":"notes"}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/gone/releases/latest"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = fetcher(&server, None);
        assert!(fetcher.latest_release("https://github.com/acme/untagged").await.is_none());
        assert!(fetcher.latest_release("https://github.com/acme/gone").await.is_none());
        assert!(fetcher.latest_release("not a url").await.is_none());
    }

    #[tokio::test]
    async fn release_for_version_prefers_v_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases/tags/v1.1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"tag_name":"v1.1.0","body":"Fixed #9"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases/tags/1.1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"tag_name":"1.1.0"}"#))
            .expect(0)
            .mount(&server)
            .await;

        let release = fetcher(&server, None)
            .release_for_version("https://github.com/acme/widget", "1.1.0")
            .await
            .unwrap();
        assert_eq!(release.version, "1.1.0");
        assert_eq!(release.changelog.as_deref(), Some("Fixed acme/widget#9"));
    }

    #[tokio::test]
    async fn release_for_version_falls_back_to_bare_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases/tags/v2.0.0"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases/tags/2.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"tag_name":"2.0.0","body":"Bare tag notes"}"#,
            ))
            .mount(&server)
            .await;

        let fetcher = fetcher(&server, None);
        let release = fetcher
            .release_for_version("https://github.com/acme/widget", "2.0.0")
            .await
            .unwrap();
        assert_eq!(release.changelog.as_deref(), Some("Bare tag notes"));
        assert!(fetcher
            .release_for_version("https://github.com/acme/widget", "3.0.0")
            .await
            .is_none());
    }
}
