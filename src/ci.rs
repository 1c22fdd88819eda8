//! CI provider detection.
//!
//! Derives a small, immutable identity record from environment variables.
//! Detection is a pure function of a lookup closure, so it can be tested
//! without touching the process environment. The retrieval core never
//! reads this record; callers use it to namespace cache keys.
//!
//! | Provider | Marker | Repository URL |
//! |----------|--------|----------------|
//! | Bitrise | `BITRISE_IO` | `GIT_REPOSITORY_URL` |
//! | CircleCI | `CIRCLECI` | `CIRCLE_REPOSITORY_URL` |
//! | GitHub Actions | `GITHUB_ACTIONS` | `GITHUB_SERVER_URL` + `/` + `GITHUB_REPOSITORY` |

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CiProvider {
    #[serde(rename = "bitrise")]
    Bitrise,
    #[serde(rename = "circleci")]
    CircleCi,
    #[serde(rename = "github-actions")]
    GitHubActions,
}

impl CiProvider {
    pub fn slug(self) -> &'static str {
        match self {
            CiProvider::Bitrise => "bitrise",
            CiProvider::CircleCi => "circleci",
            CiProvider::GitHubActions => "github-actions",
        }
    }
}

/// Identity of the CI run, as far as the environment reveals it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CiMetadata {
    pub provider: Option<CiProvider>,
    pub repo_url: Option<String>,
    pub app_id: Option<String>,
    pub build_id: Option<String>,
    pub workflow_name: Option<String>,
    pub step_id: Option<String>,
}

impl CiMetadata {
    /// Detects the provider using `lookup` for every variable read.
    /// Empty values count as unset.
    pub fn detect<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if get("BITRISE_IO").is_some() {
            return Self {
                provider: Some(CiProvider::Bitrise),
                repo_url: get("GIT_REPOSITORY_URL"),
                app_id: get("BITRISE_APP_SLUG"),
                build_id: get("BITRISE_BUILD_SLUG"),
                workflow_name: get("BITRISE_TRIGGERED_WORKFLOW_TITLE"),
                step_id: get("BITRISE_STEP_EXECUTION_ID"),
            };
        }

        if get("CIRCLECI").is_some() {
            return Self {
                provider: Some(CiProvider::CircleCi),
                repo_url: get("CIRCLE_REPOSITORY_URL"),
                ..Self::default()
            };
        }

        if get("GITHUB_ACTIONS").is_some() {
            let repo_url = match (get("GITHUB_SERVER_URL"), get("GITHUB_REPOSITORY")) {
                (Some(server), Some(repo)) => {
                    Some(format!("{}/{}", server.trim_end_matches('/'), repo))
                }
                _ => None,
            };
            return Self {
                provider: Some(CiProvider::GitHubActions),
                repo_url,
                ..Self::default()
            };
        }

        Self::default()
    }

    /// Detects from the real process environment.
    pub fn from_env() -> Self {
        Self::detect(|name| std::env::var(name).ok())
    }

    /// Prefixes `key` with the provider and app identity, when known.
    pub fn scoped_key(&self, key: &str) -> String {
        match (self.provider, self.app_id.as_deref()) {
            (Some(p), Some(app)) => format!("{}-{}-{}", p.slug(), app, key),
            (Some(p), None) => format!("{}-{}", p.slug(), key),
            (None, _) => key.to_string(),
        }
    }
}
