//! Source descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};
use tubeferry_core::{AppError, AppResult};

/// Prefix that marks a chat attachment reference on the command line.
pub const ATTACHMENT_PREFIX: &str = "tg:";

const DRIVE_HOSTS: &[&str] = &["drive.google.com", "docs.google.com"];

/// Where a job's bytes come from.
///
/// A closed set: adding a source type means adding a variant and a
/// matching fetch handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    /// A file attached to a chat message.
    ChatAttachment {
        /// Platform-specific file handle.
        file_ref: String,
    },
    /// A direct HTTP(S) link.
    Url {
        /// The link.
        url: String,
    },
    /// A cloud-drive share link.
    DriveLink {
        /// The share link as given by the operator.
        url: String,
    },
}

impl SourceDescriptor {
    /// Classify free-form operator input.
    ///
    /// `tg:<file_id>` is a chat attachment, links on a drive host are drive
    /// links, any other `http(s)` link is a direct URL. Anything else is
    /// `SourceAmbiguous`.
    pub fn parse(input: &str) -> AppResult<Self> {
        let input = input.trim();
        if let Some(file_ref) = input.strip_prefix(ATTACHMENT_PREFIX) {
            if file_ref.is_empty() {
                return Err(AppError::source_ambiguous("empty attachment reference"));
            }
            return Ok(Self::ChatAttachment {
                file_ref: file_ref.to_string(),
            });
        }

        let host = host_of(input)
            .ok_or_else(|| AppError::source_ambiguous(format!("unrecognized source: {input}")))?;
        if DRIVE_HOSTS.contains(&host.as_str()) {
            Ok(Self::DriveLink {
                url: input.to_string(),
            })
        } else {
            Ok(Self::Url {
                url: input.to_string(),
            })
        }
    }

    /// Short name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatAttachment { .. } => "chat_attachment",
            Self::Url { .. } => "url",
            Self::DriveLink { .. } => "drive_link",
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChatAttachment { file_ref } => write!(f, "{ATTACHMENT_PREFIX}{file_ref}"),
            Self::Url { url } | Self::DriveLink { url } => f.write_str(url),
        }
    }
}

/// Lowercased host of an `http(s)` link.
fn host_of(link: &str) -> Option<String> {
    let lower = link.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubeferry_core::ErrorKind;

    #[test]
    fn classifies_attachment() {
        let src = SourceDescriptor::parse("tg:BQACAgIAAxkBAAI").unwrap();
        assert_eq!(
            src,
            SourceDescriptor::ChatAttachment {
                file_ref: "BQACAgIAAxkBAAI".into()
            }
        );
        assert_eq!(src.to_string(), "tg:BQACAgIAAxkBAAI");
    }

    #[test]
    fn classifies_drive_and_direct_links() {
        let drive = SourceDescriptor::parse("https://drive.google.com/file/d/abc/view").unwrap();
        assert_eq!(drive.kind(), "drive_link");

        let direct = SourceDescriptor::parse("http://cdn.example.com:8080/v.mp4").unwrap();
        assert_eq!(direct.kind(), "url");
    }

    #[test]
    fn rejects_unknown_formats() {
        for input in ["ftp://host/file", "just words", "tg:", "https://"] {
            let err = SourceDescriptor::parse(input).unwrap_err();
            assert_eq!(err.kind, ErrorKind::SourceAmbiguous, "{input}");
        }
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(SourceDescriptor::Url {
            url: "https://x/y".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "url");
    }
}
