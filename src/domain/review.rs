//! Unified review record for both page layouts
//!
//! A review has the same shape whether it came from a long-form owner
//! review page or from a short "5 kopeek" listing. Optional fields stay
//! `None` when the page did not carry them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{Sqlite, SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Type};
use std::fmt;
use std::str::FromStr;

use super::comment::ReviewComment;

/// Minimum amount of normalized text needed before a content hash is
/// accepted as an identity for records without a site-assigned id.
pub const MIN_HASHABLE_TEXT_CHARS: usize = 20;

/// Page-layout family a review was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewVariant {
    Long,
    Short,
}

impl ReviewVariant {
    pub const ALL: [Self; 2] = [Self::Long, Self::Short];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for ReviewVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            other => Err(format!("Invalid review variant: {other}")),
        }
    }
}

impl Type<Sqlite> for ReviewVariant {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for ReviewVariant {
    fn encode_by_ref(&self, buf: &mut Vec<SqliteArgumentValue<'q>>) -> Result<IsNull, BoxDynError> {
        <String as Encode<Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, Sqlite> for ReviewVariant {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Sqlite>>::decode(value)?;
        s.parse::<Self>().map_err(Into::into)
    }
}

/// Owner score categories shown under a long-form review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingCategory {
    Exterior,
    Interior,
    Engine,
    Driving,
}

impl RatingCategory {
    pub const ALL: [Self; 4] = [Self::Exterior, Self::Interior, Self::Engine, Self::Driving];
}

/// Owner's per-category scores on a 1 to 5 scale
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRatings {
    pub exterior: Option<u8>,
    pub interior: Option<u8>,
    pub engine: Option<u8>,
    pub driving: Option<u8>,
}

impl OwnerRatings {
    pub const MAX_SCORE: u8 = 5;

    pub const fn get(&self, category: RatingCategory) -> Option<u8> {
        match category {
            RatingCategory::Exterior => self.exterior,
            RatingCategory::Interior => self.interior,
            RatingCategory::Engine => self.engine,
            RatingCategory::Driving => self.driving,
        }
    }

    /// Record a score; values outside 1..=5 are ignored
    pub fn set(&mut self, category: RatingCategory, score: u8) {
        if !(1..=Self::MAX_SCORE).contains(&score) {
            return;
        }
        let slot = match category {
            RatingCategory::Exterior => &mut self.exterior,
            RatingCategory::Interior => &mut self.interior,
            RatingCategory::Engine => &mut self.engine,
            RatingCategory::Driving => &mut self.driving,
        };
        *slot = Some(score);
    }

    pub fn is_empty(&self) -> bool {
        RatingCategory::ALL.iter().all(|category| self.get(*category).is_none())
    }

    /// Mean of the categories that carry a score
    pub fn average(&self) -> Option<f64> {
        let scores: Vec<f64> = RatingCategory::ALL
            .iter()
            .filter_map(|category| self.get(*category))
            .map(f64::from)
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

/// One extracted review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Site-assigned identity; often absent on long-form pages
    pub external_id: Option<String>,
    pub brand_slug: String,
    pub model_slug: String,
    pub variant: ReviewVariant,
    pub author: Option<String>,
    pub city: Option<String>,
    pub posted_at: Option<NaiveDate>,
    pub vehicle_year: Option<i32>,
    pub mileage_km: Option<u32>,
    /// Litres
    pub engine_volume: Option<f64>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub drive_type: Option<String>,
    pub rating: Option<f64>,
    #[serde(default)]
    pub owner_ratings: OwnerRatings,
    pub views_count: Option<u32>,
    pub title: Option<String>,
    pub pros: Option<String>,
    pub cons: Option<String>,
    pub defects: Option<String>,
    pub body_text: String,
    pub photo_count: u32,
    /// Reader comments; empty unless the page carried them
    #[serde(default)]
    pub comments: Vec<ReviewComment>,
    pub source_url: String,
    pub content_hash: String,
}

/// How a review is identified within its model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReviewIdentity {
    External(String),
    Content(String),
}

impl ReviewIdentity {
    /// Stable string form stored in the `identity_key` column
    pub fn key(&self) -> String {
        match self {
            Self::External(id) => format!("ext:{id}"),
            Self::Content(hash) => format!("hash:{hash}"),
        }
    }
}

impl Review {
    /// Create an empty record for a model; parsers fill the fields in.
    pub fn new(brand_slug: &str, model_slug: &str, variant: ReviewVariant, source_url: String) -> Self {
        Self {
            external_id: None,
            brand_slug: brand_slug.to_string(),
            model_slug: model_slug.to_string(),
            variant,
            author: None,
            city: None,
            posted_at: None,
            vehicle_year: None,
            mileage_km: None,
            engine_volume: None,
            fuel_type: None,
            transmission: None,
            drive_type: None,
            rating: None,
            owner_ratings: OwnerRatings::default(),
            views_count: None,
            title: None,
            pros: None,
            cons: None,
            defects: None,
            body_text: String::new(),
            photo_count: 0,
            comments: Vec::new(),
            source_url,
            content_hash: String::new(),
        }
    }

    /// `brand/model` reference this review belongs to
    pub fn model_key(&self) -> String {
        format!("{}/{}", self.brand_slug, self.model_slug)
    }

    /// Recompute `content_hash` from the current textual fields
    pub fn refresh_content_hash(&mut self) {
        self.content_hash = content_hash(
            self.title.as_deref(),
            self.pros.as_deref(),
            self.cons.as_deref(),
            &self.body_text,
        );
    }

    pub fn identity(&self) -> ReviewIdentity {
        match &self.external_id {
            Some(id) => ReviewIdentity::External(id.clone()),
            None => ReviewIdentity::Content(self.content_hash.clone()),
        }
    }

    /// True when the record carries either a site id or enough text for
    /// its content hash to be meaningful
    pub fn has_identity(&self) -> bool {
        if self.external_id.as_deref().is_some_and(|id| !id.trim().is_empty()) {
            return true;
        }
        hashable_text(
            self.title.as_deref(),
            self.pros.as_deref(),
            self.cons.as_deref(),
            &self.body_text,
        )
        .chars()
        .count()
            >= MIN_HASHABLE_TEXT_CHARS
    }

    pub fn body_len(&self) -> usize {
        self.body_text.chars().count()
    }

    pub fn is_complete(&self, threshold: usize) -> bool {
        self.body_len() >= threshold
    }

    /// Bit mask of optional fields that carry a value. Comments are
    /// attached data, not fields, and never count.
    pub fn populated_fields(&self) -> FieldMask {
        let flags = [
            self.external_id.is_some(),
            self.author.is_some(),
            self.city.is_some(),
            self.posted_at.is_some(),
            self.vehicle_year.is_some(),
            self.mileage_km.is_some(),
            self.engine_volume.is_some(),
            self.fuel_type.is_some(),
            self.transmission.is_some(),
            self.drive_type.is_some(),
            self.rating.is_some(),
            self.title.is_some(),
            self.pros.is_some(),
            self.cons.is_some(),
            self.defects.is_some(),
            self.photo_count > 0,
            self.owner_ratings.exterior.is_some(),
            self.owner_ratings.interior.is_some(),
            self.owner_ratings.engine.is_some(),
            self.owner_ratings.driving.is_some(),
            self.views_count.is_some(),
        ];
        FieldMask::from_flags(&flags)
    }
}

/// Compact set of populated optional fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldMask(pub u32);

impl FieldMask {
    fn from_flags(flags: &[bool]) -> Self {
        let bits = flags
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .fold(0u32, |acc, (i, _)| acc | (1 << i));
        Self(bits)
    }

    /// Fields set in `self` that are missing from `other`
    pub const fn newly_populated_over(self, other: Self) -> bool {
        self.0 & !other.0 != 0
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

/// Collapse whitespace runs into single spaces, trim, and case-fold.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn hashable_text(title: Option<&str>, pros: Option<&str>, cons: Option<&str>, body: &str) -> String {
    [title.unwrap_or(""), pros.unwrap_or(""), cons.unwrap_or(""), body]
        .iter()
        .map(|part| normalize_text(part))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable digest of title, pros, cons and body after normalization.
///
/// Fields are joined with a unit separator so that moving text between
/// fields changes the hash, while re-formatting whitespace or case does not.
pub fn content_hash(title: Option<&str>, pros: Option<&str>, cons: Option<&str>, body: &str) -> String {
    let parts = [title.unwrap_or(""), pros.unwrap_or(""), cons.unwrap_or(""), body];
    let mut hasher = blake3::Hasher::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(&[0x1f]);
        }
        hasher.update(normalize_text(part).as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
