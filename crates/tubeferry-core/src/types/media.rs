//! Destination metadata for an uploaded video.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Maximum title length accepted by the video platform.
pub const MAX_TITLE_CHARS: usize = 100;

/// Maximum description length accepted by the video platform.
pub const MAX_DESCRIPTION_CHARS: usize = 5000;

/// Who can see an uploaded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Only the owning account.
    #[default]
    Private,
    /// Anyone with the link.
    Unlisted,
    /// Everyone.
    Public,
}

impl Visibility {
    /// Return the visibility as the platform's privacy status string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Unlisted => "unlisted",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "unlisted" => Ok(Self::Unlisted),
            "public" => Ok(Self::Public),
            other => Err(AppError::validation(format!("Unknown visibility '{other}'"))),
        }
    }
}

/// Title, description, and publishing options for one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Video title (required).
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Platform category id; `None` uses the configured default.
    #[serde(default)]
    pub category_id: Option<String>,
    /// Visibility once processing finishes.
    #[serde(default)]
    pub visibility: Visibility,
}

impl VideoMetadata {
    /// Create metadata with only a title set.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            category_id: None,
            visibility: Visibility::default(),
        }
    }

    /// Parse the chat reply format: `Title:`, `Description:` and `Tags:` lines.
    ///
    /// Keys are case-insensitive, tags are comma separated, unknown lines are
    /// ignored. A missing title is a validation error.
    pub fn parse_details(text: &str) -> Result<Self, AppError> {
        let mut meta = Self::titled("");
        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "title" => meta.title = value.to_string(),
                "description" => meta.description = value.to_string(),
                "tags" => {
                    meta.tags = value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(String::from)
                        .collect();
                }
                _ => {}
            }
        }
        if meta.title.is_empty() {
            return Err(AppError::validation("Title is required"));
        }
        Ok(meta)
    }

    /// Check the metadata against the platform's limits.
    pub fn validate(&self) -> Result<(), AppError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AppError::validation("Title is required"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(AppError::validation(format!(
                "Title exceeds {MAX_TITLE_CHARS} characters"
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(AppError::validation(format!(
                "Description exceeds {MAX_DESCRIPTION_CHARS} characters"
            )));
        }
        if self.title.contains(['<', '>']) || self.description.contains(['<', '>']) {
            return Err(AppError::validation(
                "Title and description may not contain angle brackets",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_title_is_rejected() {
        let meta = VideoMetadata::titled("   ");
        assert!(meta.validate().is_err());
    }

    #[test]
    fn long_title_is_rejected() {
        let meta = VideoMetadata::titled("x".repeat(MAX_TITLE_CHARS + 1));
        assert!(meta.validate().is_err());
    }

    #[test]
    fn defaults_to_private() {
        let meta: VideoMetadata = serde_json::from_str(r#"{"title":"Trip"}"#).unwrap();
        assert_eq!(meta.visibility, Visibility::Private);
        assert!(meta.validate().is_ok());
    }

    #[test]
    fn parses_chat_details_reply() {
        let meta = VideoMetadata::parse_details(
            "Title: Summer trip\nDescription: Day one: the coast\nTags: travel, , beach",
        )
        .unwrap();
        assert_eq!(meta.title, "Summer trip");
        assert_eq!(meta.description, "Day one: the coast");
        assert_eq!(meta.tags, vec!["travel", "beach"]);
    }

    #[test]
    fn details_without_title_are_rejected() {
        assert!(VideoMetadata::parse_details("Description: nothing").is_err());
    }

    #[test]
    fn visibility_parses_case_insensitively() {
        assert_eq!("Unlisted".parse::<Visibility>().unwrap(), Visibility::Unlisted);
        assert!("secret".parse::<Visibility>().is_err());
    }
}
