use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::{RatingError, RatingResult};

pub type ItemId = i64;
pub type UserId = i64;
pub type ReviewId = i64;
pub type RatingValue = f64;

pub const MIN_REVIEW_RATING: RatingValue = 1.0;
pub const MAX_REVIEW_RATING: RatingValue = 10.0;

/// A single review score on the 1.0-10.0 scale, kept to one decimal place.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ReviewRating(RatingValue);

impl ReviewRating {
    pub fn new(value: RatingValue) -> RatingResult<Self> {
        if !value.is_finite() {
            return Err(RatingError::invalid(format!(
                "review rating must be finite, got {}",
                value
            )));
        }

        let rounded = (value * 10.0).round() / 10.0;
        if !(MIN_REVIEW_RATING..=MAX_REVIEW_RATING).contains(&rounded) {
            return Err(RatingError::invalid(format!(
                "review rating must be within {}..={}, got {}",
                MIN_REVIEW_RATING, MAX_REVIEW_RATING, value
            )));
        }

        Ok(Self(rounded))
    }

    pub fn value(self) -> RatingValue {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Genre {
    Fantasy,
    SciFi,
    Horror,
    Modern,
    Historical,
    Superhero,
    Other,
}

impl Genre {
    pub const ALL: [Genre; 7] = [
        Genre::Fantasy,
        Genre::SciFi,
        Genre::Horror,
        Genre::Modern,
        Genre::Historical,
        Genre::Superhero,
        Genre::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Fantasy => "fantasy",
            Genre::SciFi => "sci-fi",
            Genre::Horror => "horror",
            Genre::Modern => "modern",
            Genre::Historical => "historical",
            Genre::Superhero => "superhero",
            Genre::Other => "other",
        }
    }

    /// Maps a ranking category slug onto the genre it is filed under.
    ///
    /// `"overall"` yields `Ok(None)`, meaning the ranking is not filtered.
    /// Unknown slugs are rejected.
    pub fn from_category(category: &str) -> RatingResult<Option<Genre>> {
        let genre = match category.trim().to_lowercase().as_str() {
            "overall" => return Ok(None),
            "science-fiction" | "steampunk-dieselpunk" | "science-fantasy" => Genre::SciFi,
            "wuxia-eastern" | "mythological" | "comedy-satirical" | "anthropomorphic"
            | "children-family-friendly" | "anime-manga" => Genre::Fantasy,
            "modern-urban" => Genre::Modern,
            "mystery-investigation" => Genre::Horror,
            other => other.parse()?,
        };
        Ok(Some(genre))
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Genre {
    type Err = RatingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Genre::ALL
            .into_iter()
            .find(|genre| genre.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RatingError::invalid(format!("unknown genre: {}", s)))
    }
}

/// Derived aggregate fields written back to an item after a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAggregate {
    pub item_id: ItemId,
    pub raw_average: RatingValue,
    pub review_count: u64,
    pub smoothed_rating: RatingValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatedItem {
    pub id: ItemId,
    pub title: String,
    pub genre: Genre,
    pub raw_average: RatingValue,
    pub review_count: u64,
    pub smoothed_rating: RatingValue,
    pub created_at: NaiveDateTime,
}

impl RatedItem {
    pub fn aggregate(&self) -> ItemAggregate {
        ItemAggregate {
            item_id: self.id,
            raw_average: self.raw_average,
            review_count: self.review_count,
            smoothed_rating: self.smoothed_rating,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopRatedPage {
    pub items: Vec<RatedItem>,
    pub total_count: u64,
    pub has_more: bool,
}

impl TopRatedPage {
    pub fn new(items: Vec<RatedItem>, total_count: u64, limit: usize, offset: usize) -> Self {
        let has_more = (offset as u64).saturating_add(limit as u64) < total_count;
        Self {
            items,
            total_count,
            has_more,
        }
    }
}
