//! Shareable links carrying a whole project in the `project` query parameter.

use thiserror::Error;
use url::Url;

use crate::app::project::ProjectDocument;

/// Links at or above this length are refused.
pub const MAX_SHARE_URL_LEN: usize = 5000;
pub const PROJECT_PARAM: &str = "project";

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("The logic program is too long to be shared.")]
    TooLong { length: usize },
    #[error("failed to encode project: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Cannot load the project from the URL.")]
    InvalidUrl(#[source] url::ParseError),
    #[error("Error load the project from the URL")]
    NotAProject,
}

/// Build the link that reopens `document`.
///
/// A project whose programs are all blank has nothing worth sharing, so the page address itself
/// is returned.
pub fn share_url(page: &str, document: &ProjectDocument) -> Result<String, ShareError> {
    if document.is_blank() {
        return Ok(page.to_owned());
    }
    let json = document.to_json_string()?;
    let url = format!(
        "{}/?{PROJECT_PARAM}={}",
        origin(page),
        urlencoding::encode(&json)
    );
    if url.len() >= MAX_SHARE_URL_LEN {
        return Err(ShareError::TooLong { length: url.len() });
    }
    Ok(url)
}

/// Read the project carried by a link. Links without a `project` parameter yield `Ok(None)`.
pub fn project_from_url(url: &str) -> Result<Option<ProjectDocument>, ShareError> {
    let url = Url::parse(url).map_err(ShareError::InvalidUrl)?;
    let Some((_, encoded)) = url.query_pairs().find(|(key, _)| key == PROJECT_PARAM) else {
        return Ok(None);
    };
    let value: serde_json::Value =
        serde_json::from_str(&encoded).map_err(|_| ShareError::NotAProject)?;
    match ProjectDocument::recognize(&value) {
        Ok(Some(document)) => Ok(Some(document)),
        Ok(None) => Err(ShareError::NotAProject),
        Err(err) => {
            tracing::debug!(error = %err, "shared project did not decode");
            Err(ShareError::NotAProject)
        }
    }
}

/// `scheme://host[:port]` of a page address. Bare `host[:port]` strings are used as given.
fn origin(page: &str) -> String {
    match Url::parse(page) {
        Ok(url) if url.has_host() => url.origin().ascii_serialization(),
        _ => page.trim_end_matches('/').to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::form::WireForm;

    fn document(program: &str) -> ProjectDocument {
        ProjectDocument {
            form: WireForm {
                language: "asp".into(),
                engine: "dlv".into(),
                program: vec![program.into()],
                ..WireForm::default()
            },
            tabname: vec!["L P 1".into()],
            ..ProjectDocument::default()
        }
    }

    #[test]
    fn blank_programs_share_the_page_itself() {
        let url = share_url("http://localhost:8080/editor", &document("  \n")).unwrap();
        assert_eq!(url, "http://localhost:8080/editor");
    }

    #[test]
    fn link_round_trips_through_the_query() {
        let source = document("a :- b & c.\n% 100%");
        let url = share_url("http://localhost:8080/some/page", &source).unwrap();
        assert!(url.starts_with("http://localhost:8080/?project=%7B"));
        assert_eq!(project_from_url(&url).unwrap(), Some(source));
    }

    #[test]
    fn bare_host_is_used_as_given() {
        let url = share_url("loide.example:8080", &document("a.")).unwrap();
        assert!(url.starts_with("loide.example:8080/?project="));
    }

    #[test]
    fn long_programs_are_refused() {
        let program = "a".repeat(MAX_SHARE_URL_LEN);
        let err = share_url("http://localhost", &document(&program)).unwrap_err();
        assert!(matches!(err, ShareError::TooLong { .. }));
        assert_eq!(err.to_string(), "The logic program is too long to be shared.");
    }

    #[test]
    fn loading_distinguishes_failures() {
        assert!(matches!(
            project_from_url("::not a url"),
            Err(ShareError::InvalidUrl(_))
        ));
        assert!(project_from_url("http://localhost/").unwrap().is_none());
        assert!(matches!(
            project_from_url("http://localhost/?project=%7B%22name%22%3A1%7D"),
            Err(ShareError::NotAProject)
        ));
        assert!(matches!(
            project_from_url("http://localhost/?project=plain"),
            Err(ShareError::NotAProject)
        ));
    }
}
