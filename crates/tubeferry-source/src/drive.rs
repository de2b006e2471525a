//! Cloud-drive share links.
//!
//! Share links are rewritten to the drive's download endpoint. Files too
//! large for virus scanning come back as an HTML warning page instead of
//! bytes; the page carries a form (or, on older deployments, a link) whose
//! parameters confirm the download.

use regex::Regex;

use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;

/// Compiled patterns for share links and warning pages.
#[derive(Debug, Clone)]
pub struct DrivePatterns {
    file_path_id: Regex,
    query_id: Regex,
    form_action: Regex,
    hidden_input: Regex,
    confirm_token: Regex,
}

impl DrivePatterns {
    /// Compile all patterns.
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            file_path_id: compile(r"/file/d/([A-Za-z0-9_-]{10,})")?,
            query_id: compile(r"[?&]id=([A-Za-z0-9_-]{10,})")?,
            form_action: compile(r#"<form[^>]*id="download-form"[^>]*action="([^"]+)""#)?,
            hidden_input: compile(
                r#"<input[^>]*type="hidden"[^>]*name="([^"]+)"[^>]*value="([^"]*)""#,
            )?,
            confirm_token: compile(r"confirm=([0-9A-Za-z_-]+)")?,
        })
    }

    /// Extract the file id from a share link.
    ///
    /// Accepts `/file/d/<id>/…`, `open?id=<id>` and `uc?id=<id>` forms; any
    /// other link is `SourceAmbiguous`.
    pub fn file_id(&self, link: &str) -> AppResult<String> {
        self.file_path_id
            .captures(link)
            .or_else(|| self.query_id.captures(link))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| AppError::source_ambiguous(format!("unrecognized drive link: {link}")))
    }

    /// Parse the large-file warning page.
    ///
    /// Returns `None` when the page carries neither a download form nor a
    /// confirm token, which means the file is not publicly downloadable.
    pub fn parse_interstitial(&self, html: &str, base: &str, id: &str) -> Option<ConfirmRequest> {
        if let Some(action) = self.form_action.captures(html).and_then(|c| c.get(1)) {
            let params = self
                .hidden_input
                .captures_iter(html)
                .filter_map(|c| Some((unescape(c.get(1)?.as_str()), unescape(c.get(2)?.as_str()))))
                .collect();
            return Some(ConfirmRequest {
                url: absolutize(&unescape(action.as_str()), base),
                params,
            });
        }

        self.confirm_token
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|token| ConfirmRequest {
                url: format!("{}/uc", base.trim_end_matches('/')),
                params: vec![
                    ("export".into(), "download".into()),
                    ("confirm".into(), token.as_str().to_string()),
                    ("id".into(), id.to_string()),
                ],
            })
    }
}

fn compile(pattern: &str) -> AppResult<Regex> {
    Regex::new(pattern).map_err(|e| {
        AppError::with_source(ErrorKind::Internal, format!("invalid pattern {pattern}"), e)
    })
}

/// Direct-download URL for a file id.
pub fn download_url(base: &str, id: &str) -> String {
    format!("{}/uc?export=download&id={id}", base.trim_end_matches('/'))
}

/// A confirmed download request parsed from the warning page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    /// Absolute URL to request.
    pub url: String,
    /// Query parameters to append.
    pub params: Vec<(String, String)>,
}

fn absolutize(action: &str, base: &str) -> String {
    if action.starts_with("http://") || action.starts_with("https://") {
        action.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            action.trim_start_matches('/')
        )
    }
}

fn unescape(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "1AbCdEfGhIjKlMnOp";

    fn patterns() -> DrivePatterns {
        DrivePatterns::new().unwrap()
    }

    #[test]
    fn extracts_id_from_common_link_shapes() {
        for link in [
            format!("https://drive.google.com/file/d/{ID}/view?usp=sharing"),
            format!("https://drive.google.com/open?id={ID}"),
            format!("https://drive.google.com/uc?export=download&id={ID}"),
        ] {
            assert_eq!(patterns().file_id(&link).unwrap(), ID, "{link}");
        }
    }

    #[test]
    fn folder_links_are_ambiguous() {
        let err = patterns().file_id("https://drive.google.com/drive/folders/xyz").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceAmbiguous);
    }

    #[test]
    fn parses_download_form() {
        let html = r#"<html><form id="download-form" action="https://drive.usercontent.google.com/download" method="get">
            <input type="hidden" name="id" value="1AbCdEfGhIjKlMnOp">
            <input type="hidden" name="export" value="download">
            <input type="hidden" name="confirm" value="t">
            <input type="hidden" name="uuid" value="abc-123">
            </form></html>"#;
        let req = patterns().parse_interstitial(html, "https://drive.google.com", ID).unwrap();
        assert_eq!(req.url, "https://drive.usercontent.google.com/download");
        assert!(req.params.contains(&("confirm".into(), "t".into())));
        assert!(req.params.contains(&("uuid".into(), "abc-123".into())));
        assert_eq!(req.params.len(), 4);
    }

    #[test]
    fn falls_back_to_confirm_link() {
        let html = r#"<a id="uc-download-link" href="/uc?export=download&amp;confirm=Xy_9&amp;id=1AbCdEfGhIjKlMnOp">Download anyway</a>"#;
        let req = patterns().parse_interstitial(html, "https://drive.google.com/", ID).unwrap();
        assert_eq!(req.url, "https://drive.google.com/uc");
        assert!(req.params.contains(&("confirm".into(), "Xy_9".into())));
    }

    #[test]
    fn login_page_is_not_an_interstitial() {
        assert!(patterns().parse_interstitial("<html>Sign in</html>", "https://d", ID).is_none());
    }
}
