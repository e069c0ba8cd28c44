use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{ContentItem, ContentKind, DetailRecord, DiscoverPage, FilterSet, Genre};
use crate::random::RandomSource;

const TMDB_BASE: &str = "https://api.themoviedb.org/3";

/// Discover results with fewer votes than this are too noisy to recommend.
const MIN_VOTE_COUNT: u32 = 10;

/// The upstream truncates deep result pages, so a fixed sort order would
/// sample the same window on every rebuild. One of these is picked at
/// random per discover call instead.
const SORT_ORDERS: [&str; 8] = [
    "popularity.desc",
    "popularity.asc",
    "release_date.desc",
    "release_date.asc",
    "vote_average.desc",
    "vote_average.asc",
    "vote_count.desc",
    "vote_count.asc",
];

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn discover(&self, filters: &FilterSet, page: u32) -> Result<DiscoverPage>;
    async fn details(&self, kind: ContentKind, id: i32) -> Result<DetailRecord>;
    async fn genres(&self, kind: ContentKind) -> Result<Vec<Genre>>;
}

#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    random: Arc<dyn RandomSource>,
}

impl TmdbClient {
    pub fn from_env(random: Arc<dyn RandomSource>) -> Result<Self> {
        let api_key = env::var("TMDB_API_KEY").context("TMDB_API_KEY not set")?;
        let user_agent = format!("lumiere/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            api_key,
            random,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .context("TMDB request failed")?;
        let status = res.status();
        let text = res.text().await.context("Failed to read TMDB body")?;
        if !status.is_success() {
            return Err(anyhow!("TMDB HTTP error (status {}): {}", status, text));
        }
        serde_json::from_str(&text).context("Failed to parse TMDB JSON")
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn discover(&self, filters: &FilterSet, page: u32) -> Result<DiscoverPage> {
        let sort_by = pick_sort_order(self.random.as_ref());
        let params = discover_query(filters, page, sort_by);
        let url = format!(
            "{TMDB_BASE}/discover/{}?api_key={}&language=en-US&{}",
            filters.content_type.resource(),
            self.api_key,
            encode_query(&params)
        );
        let raw: RawPage = self.get_json(&url).await?;
        Ok(DiscoverPage {
            page: raw.page,
            items: raw.results.into_iter().map(normalize).collect(),
            total_pages: raw.total_pages,
            total_results: raw.total_results,
        })
    }

    async fn details(&self, kind: ContentKind, id: i32) -> Result<DetailRecord> {
        let url = format!(
            "{TMDB_BASE}/{}/{id}?append_to_response=credits&language=en-US&api_key={}",
            kind.resource(),
            self.api_key
        );
        self.get_json(&url).await
    }

    async fn genres(&self, kind: ContentKind) -> Result<Vec<Genre>> {
        let url = format!(
            "{TMDB_BASE}/genre/{}/list?language=en-US&api_key={}",
            kind.resource(),
            self.api_key
        );
        let data: RawGenreList = self.get_json(&url).await?;
        Ok(data.genres)
    }
}

fn pick_sort_order(random: &dyn RandomSource) -> &'static str {
    SORT_ORDERS[random.next_index(SORT_ORDERS.len())]
}

/// Query parameters for a discover call, excluding the api key and the
/// localization parameter the base URL always carries.
fn discover_query(filters: &FilterSet, page: u32, sort_by: &str) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", page.to_string()),
        ("vote_average.gte", filters.min_rating.to_string()),
        ("vote_count.gte", MIN_VOTE_COUNT.to_string()),
        ("sort_by", sort_by.to_string()),
    ];

    if !filters.genre_ids.is_empty() {
        // Comma join: the upstream treats the list as "any of these".
        let joined = filters
            .genre_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        params.push(("with_genres", joined));
    }

    let movie = filters.content_type == ContentKind::Movie;
    if let Some(from) = filters.year_from.and_then(year_start) {
        params.push((
            if movie {
                "primary_release_date.gte"
            } else {
                "first_air_date.gte"
            },
            from,
        ));
    }
    if let Some(to) = filters.year_to.and_then(year_end) {
        params.push((
            if movie {
                "primary_release_date.lte"
            } else {
                "first_air_date.lte"
            },
            to,
        ));
    }

    if let Some(language) = filters.language_filter() {
        params.push(("with_original_language", language.to_string()));
    }

    params
}

fn year_start(year: i32) -> Option<String> {
    NaiveDate::from_ymd_opt(year, 1, 1).map(|d| d.format("%Y-%m-%d").to_string())
}

fn year_end(year: i32) -> Option<String> {
    NaiveDate::from_ymd_opt(year, 12, 31).map(|d| d.format("%Y-%m-%d").to_string())
}

fn encode_query(params: &[(&'static str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Raw discover record; movies carry `title`/`release_date`, series carry
/// `name`/`first_air_date`.
#[derive(Debug, Deserialize)]
struct RawItem {
    id: i32,
    title: Option<String>,
    name: Option<String>,
    original_title: Option<String>,
    original_name: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    vote_average: Option<f32>,
    vote_count: Option<i32>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    genre_ids: Option<Vec<i32>>,
    original_language: Option<String>,
    popularity: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default = "default_page")]
    page: u32,
    results: Vec<RawItem>,
    total_pages: u32,
    total_results: u32,
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct RawGenreList {
    genres: Vec<Genre>,
}

fn normalize(raw: RawItem) -> ContentItem {
    ContentItem {
        id: raw.id,
        title: raw.title.or(raw.name).unwrap_or_default(),
        original_title: raw.original_title.or(raw.original_name),
        overview: raw.overview.unwrap_or_default(),
        poster_path: raw.poster_path,
        backdrop_path: raw.backdrop_path,
        vote_average: raw.vote_average.unwrap_or_default(),
        vote_count: raw.vote_count.unwrap_or_default(),
        release_date: raw
            .release_date
            .or(raw.first_air_date)
            .filter(|d| !d.is_empty()),
        genre_ids: raw.genre_ids.unwrap_or_default(),
        original_language: raw.original_language.unwrap_or_default(),
        popularity: raw.popularity.unwrap_or_default(),
        status: None,
        series_type: None,
        number_of_seasons: None,
        number_of_episodes: None,
    }
}
