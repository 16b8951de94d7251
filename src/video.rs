use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};
use crate::formats::{ChapterDescriptor, VideoBuckets};

pub const DEFAULT_YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Fewest results requested from a provider, whatever the bucket sizes.
pub const MIN_REQUESTED_RESULTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoResult {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// A ranked video search service.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    fn name(&self) -> &str;

    /// Results in provider rank order. Missing credentials and non-success
    /// responses are `ProviderUnavailable`.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<VideoResult>>;
}

#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub name: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_results: usize,
}

impl YouTubeConfig {
    pub fn primary_from_env() -> Self {
        Self::from_env_key("youtube", "YOUTUBE_API_KEY")
    }

    pub fn secondary_from_env() -> Self {
        Self::from_env_key("youtube-fallback", "YOUTUBE_FALLBACK_API_KEY")
    }

    fn from_env_key(name: &str, key_var: &str) -> Self {
        let api_key = std::env::var(key_var)
            .ok()
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty());
        let base_url = std::env::var("COURSEFORGE_YOUTUBE_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_YOUTUBE_BASE_URL.to_owned());
        let max_results = std::env::var("COURSEFORGE_VIDEO_MAX_RESULTS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(MIN_REQUESTED_RESULTS)
            .min(50);
        Self {
            name: name.to_owned(),
            api_key,
            base_url,
            max_results,
        }
    }
}

/// YouTube Data API v3 `search.list` client.
pub struct YouTubeSearch {
    client: reqwest::Client,
    config: YouTubeConfig,
}

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    #[serde(default)]
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

impl YouTubeSearch {
    pub fn new(config: YouTubeConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build http client")?;
        Ok(Self { client, config })
    }

    fn search_url(&self, query: &str, max_results: usize, api_key: &str) -> anyhow::Result<url::Url> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut url = url::Url::parse(&format!("{base}/search"))
            .with_context(|| format!("invalid youtube base url: {}", self.config.base_url))?;
        url.query_pairs_mut()
            .append_pair("part", "snippet")
            .append_pair("q", query)
            .append_pair("maxResults", &max_results.to_string())
            .append_pair("type", "video")
            .append_pair("key", api_key);
        Ok(url)
    }

    async fn fetch(&self, url: url::Url) -> anyhow::Result<Vec<VideoResult>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("send youtube search request")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("YouTube API error ({status}): {body}");
        }
        let parsed: SearchListResponse = response
            .json()
            .await
            .context("parse youtube search response")?;

        Ok(parsed
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item.id.video_id.filter(|id| !id.is_empty())?;
                let snippet = item.snippet.unwrap_or(Snippet {
                    title: String::new(),
                    description: String::new(),
                });
                Some(VideoResult {
                    id,
                    title: snippet.title,
                    description: snippet.description,
                })
            })
            .collect())
    }
}

#[async_trait]
impl VideoSearch for YouTubeSearch {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<VideoResult>> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(GenerationError::unavailable(&self.config.name, "no API key configured"));
        };
        let max_results = max_results.clamp(1, self.config.max_results.max(1));
        let url = self
            .search_url(query, max_results, api_key)
            .map_err(|err| GenerationError::unavailable(&self.config.name, format!("{err:#}")))?;
        self.fetch(url)
            .await
            .map_err(|err| GenerationError::unavailable(&self.config.name, format!("{err:#}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSizes {
    pub recommended: usize,
    pub alternative: usize,
    pub expert: usize,
}

impl Default for BucketSizes {
    fn default() -> Self {
        Self {
            recommended: 3,
            alternative: 3,
            expert: 2,
        }
    }
}

impl BucketSizes {
    pub fn total(&self) -> usize {
        self.recommended + self.alternative + self.expert
    }
}

/// Attaches ranked videos to a chapter, falling back from the primary to the
/// secondary provider and finally to empty buckets.
#[derive(Clone, Default)]
pub struct VideoEnricher {
    primary: Option<Arc<dyn VideoSearch>>,
    secondary: Option<Arc<dyn VideoSearch>>,
    sizes: BucketSizes,
}

impl VideoEnricher {
    pub fn new(
        primary: Option<Arc<dyn VideoSearch>>,
        secondary: Option<Arc<dyn VideoSearch>>,
    ) -> Self {
        Self {
            primary,
            secondary,
            sizes: BucketSizes::default(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let primary = YouTubeSearch::new(YouTubeConfig::primary_from_env())?;
        let secondary = YouTubeSearch::new(YouTubeConfig::secondary_from_env())?;
        Ok(Self::new(Some(Arc::new(primary)), Some(Arc::new(secondary))))
    }

    pub fn search_query(chapter: &ChapterDescriptor, course_name: &str) -> String {
        format!("{} {} tutorial", chapter.name, course_name)
    }

    pub async fn enrich(&self, chapter: &ChapterDescriptor, course_name: &str) -> VideoBuckets {
        let query = Self::search_query(chapter, course_name);
        let requested = self.sizes.total().max(MIN_REQUESTED_RESULTS);

        if let Some(primary) = &self.primary {
            match primary.search(&query, requested).await {
                Ok(results) if !results.is_empty() => {
                    tracing::debug!(provider = primary.name(), results = results.len(), "videos found");
                    return partition(results, self.sizes);
                }
                Ok(_) => {
                    tracing::info!(provider = primary.name(), %query, "no videos found");
                }
                Err(err) => {
                    tracing::warn!(provider = primary.name(), error = %err, "video search failed");
                }
            }
        }

        if let Some(secondary) = &self.secondary {
            match secondary.search(&query, requested).await {
                Ok(results) if !results.is_empty() => {
                    tracing::debug!(provider = secondary.name(), results = results.len(), "videos found");
                    let sizes = BucketSizes {
                        expert: 0,
                        ..self.sizes
                    };
                    return partition(results, sizes);
                }
                Ok(_) => {
                    tracing::info!(provider = secondary.name(), %query, "no videos found");
                }
                Err(err) => {
                    tracing::warn!(provider = secondary.name(), error = %err, "video search failed");
                }
            }
        }

        VideoBuckets::default()
    }
}

fn partition(results: Vec<VideoResult>, sizes: BucketSizes) -> VideoBuckets {
    let mut ids = results.into_iter().map(|v| v.id);
    let mut take = |n: usize| ids.by_ref().take(n).collect::<Vec<_>>();
    VideoBuckets {
        recommended_videos: take(sizes.recommended),
        alternative_videos: take(sizes.alternative),
        expert_talks: take(sizes.expert),
    }
}
