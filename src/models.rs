use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Kind of content the user is asking for. TMDB has no native miniseries
/// resource, so `Miniseries` is queried as `tv` and narrowed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Tv,
    Miniseries,
}

impl ContentKind {
    /// The upstream resource this kind maps to (`movie` or `tv`).
    pub fn resource(self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::Tv | ContentKind::Miniseries => "tv",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::Tv => "tv",
            ContentKind::Miniseries => "miniseries",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(ContentKind::Movie),
            "tv" => Ok(ContentKind::Tv),
            "miniseries" => Ok(ContentKind::Miniseries),
            other => Err(anyhow::anyhow!("Unknown content kind '{}'", other)),
        }
    }
}

/// User-selected search constraints, immutable once handed to the builder.
/// Field names follow what the display layer sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSet {
    pub content_type: ContentKind,
    #[serde(default)]
    pub genre_ids: BTreeSet<i32>,
    #[serde(default)]
    pub year_from: Option<i32>,
    #[serde(default)]
    pub year_to: Option<i32>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub min_rating: f32,
}

impl FilterSet {
    /// Cache identity: the JSON serialization. Genre ids live in a sorted
    /// set, so equal filter sets always serialize to the same key.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }

    /// The language filter, unless it is the "all" sentinel or empty.
    pub fn language_filter(&self) -> Option<&str> {
        self.language
            .as_deref()
            .filter(|l| !l.is_empty() && *l != "all")
    }
}

/// One catalog entry, normalized so movie and series records share a shape:
/// series `name` becomes `title`, `first_air_date` becomes `release_date`.
/// The trailing detail fields are only present after miniseries
/// reclassification merged them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub vote_average: f32,
    #[serde(default)]
    pub vote_count: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<i32>,
    #[serde(default)]
    pub original_language: String,
    #[serde(default)]
    pub popularity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub series_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_seasons: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_episodes: Option<i32>,
}

impl ContentItem {
    pub fn merge_details(&mut self, details: &DetailRecord) {
        self.status = details.status.clone();
        self.series_type = details.series_type.clone();
        self.number_of_seasons = details.number_of_seasons;
        self.number_of_episodes = details.number_of_episodes;
    }
}

/// One page of normalized discover results.
#[derive(Debug, Clone)]
pub struct DiscoverPage {
    pub page: u32,
    pub items: Vec<ContentItem>,
    pub total_pages: u32,
    pub total_results: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

/// Extended per-item metadata: presentation fields for the display layer
/// plus the series facts the miniseries classifier tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailRecord {
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub vote_average: f32,
    #[serde(default)]
    pub vote_count: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_air_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_run_time: Option<Vec<i32>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub series_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_seasons: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_episodes: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Vec<Creator>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<Credits>,
}

impl DetailRecord {
    /// A show qualifies as a miniseries when TMDB tags it as one, or when
    /// it is a single season of at most 12 episodes that has ended or is
    /// still listed as returning.
    pub fn is_miniseries(&self) -> bool {
        if self.series_type.as_deref() == Some("Miniseries") {
            return true;
        }
        let single_short_season = self.number_of_seasons == Some(1)
            && self.number_of_episodes.is_some_and(|e| e <= 12);
        single_short_season
            && matches!(
                self.status.as_deref(),
                Some("Ended") | Some("Returning Series")
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crew: Option<Vec<CrewMember>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastMember {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewMember {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creator {
    pub name: String,
}
