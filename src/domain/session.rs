//! Crawl session records
//!
//! A session is one crawl run. It is created when the run starts, mutated
//! only through the session tracker and closed exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{Sqlite, SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Type};
use std::fmt;
use std::str::FromStr;

use super::review::ReviewVariant;

/// What a session crawls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Catalog,
    LongReviews,
    ShortReviews,
}

impl SessionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::LongReviews => "long_reviews",
            Self::ShortReviews => "short_reviews",
        }
    }

    pub const fn for_variant(variant: ReviewVariant) -> Self {
        match variant {
            ReviewVariant::Long => Self::LongReviews,
            ReviewVariant::Short => Self::ShortReviews,
        }
    }
}

impl FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "catalog" => Ok(Self::Catalog),
            "long_reviews" => Ok(Self::LongReviews),
            "short_reviews" => Ok(Self::ShortReviews),
            _ => Err(format!("Invalid SessionKind: {s}")),
        }
    }
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid SessionStatus: {s}")),
        }
    }
}

macro_rules! text_column {
    ($ty:ty) => {
        impl Type<Sqlite> for $ty {
            fn type_info() -> SqliteTypeInfo {
                <String as Type<Sqlite>>::type_info()
            }

            fn compatible(ty: &SqliteTypeInfo) -> bool {
                <String as Type<Sqlite>>::compatible(ty)
            }
        }

        impl<'q> Encode<'q, Sqlite> for $ty {
            fn encode_by_ref(&self, buf: &mut Vec<SqliteArgumentValue<'q>>) -> Result<IsNull, BoxDynError> {
                <String as Encode<Sqlite>>::encode(self.as_str().to_string(), buf)
            }
        }

        impl<'r> Decode<'r, Sqlite> for $ty {
            fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
                let s = <String as Decode<Sqlite>>::decode(value)?;
                s.parse::<Self>().map_err(Into::into)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_column!(SessionKind);
text_column!(SessionStatus);

/// Brand/model filter of a crawl run. An empty scope means everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlScope {
    pub brand: Option<String>,
    pub model: Option<String>,
}

impl CrawlScope {
    pub const fn all() -> Self {
        Self { brand: None, model: None }
    }

    pub fn brand(brand: impl Into<String>) -> Self {
        Self { brand: Some(brand.into()), model: None }
    }

    pub fn model(brand: impl Into<String>, model: impl Into<String>) -> Self {
        Self { brand: Some(brand.into()), model: Some(model.into()) }
    }

    pub fn matches_brand(&self, brand_slug: &str) -> bool {
        self.brand.as_deref().is_none_or(|b| b == brand_slug)
    }

    pub fn matches_model(&self, model_slug: &str) -> bool {
        self.model.as_deref().is_none_or(|m| m == model_slug)
    }
}

impl fmt::Display for CrawlScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.brand, &self.model) {
            (None, _) => f.write_str("all"),
            (Some(brand), None) => f.write_str(brand),
            (Some(brand), Some(model)) => write!(f, "{brand}/{model}"),
        }
    }
}

/// Persisted state of one crawl run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSession {
    pub session_id: String,
    pub kind: SessionKind,
    pub scope: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub pages_processed: u64,
    pub records_found: u64,
    pub records_saved: u64,
    pub errors: u64,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_display_and_matching() {
        assert_eq!(CrawlScope::all().to_string(), "all");
        assert_eq!(CrawlScope::brand("toyota").to_string(), "toyota");

        let scope = CrawlScope::model("toyota", "camry");
        assert_eq!(scope.to_string(), "toyota/camry");
        assert!(scope.matches_brand("toyota"));
        assert!(!scope.matches_brand("lada"));
        assert!(scope.matches_model("camry"));
        assert!(!scope.matches_model("corolla"));
        assert!(CrawlScope::all().matches_model("anything"));
    }

    #[test]
    fn test_status_and_kind_parse() {
        assert_eq!("failed".parse::<SessionStatus>(), Ok(SessionStatus::Failed));
        assert_eq!("long_reviews".parse::<SessionKind>(), Ok(SessionKind::LongReviews));
        assert!(SessionStatus::Completed.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
        assert_eq!(SessionKind::for_variant(ReviewVariant::Short), SessionKind::ShortReviews);
    }
}
