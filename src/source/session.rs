//! Credential capability handed to source clients.
//!
//! Sessions are produced outside the harvester (a prior login saves its cookies
//! as a flat JSON object). The harvester only loads the file and forwards it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading a saved session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The cookie file could not be read.
    #[error("failed to read cookie file {path:?}: {source}")]
    Read {
        /// Location of the cookie file.
        path: PathBuf,
        /// Underlying IO failure.
        source: std::io::Error,
    },
    /// The cookie file is not a JSON object of string values.
    #[error("invalid cookie file {path:?}: {source}")]
    Parse {
        /// Location of the cookie file.
        path: PathBuf,
        /// Underlying JSON failure.
        source: serde_json::Error,
    },
}

/// Opaque authenticated session, expressed as saved cookies.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    cookies: BTreeMap<String, String>,
}

impl Session {
    /// Builds a session from name/value cookie pairs.
    pub fn from_cookies<I, K, V>(cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cookies: cookies
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }

    /// Loads cookies previously saved by a login step.
    pub fn from_cookie_file(path: &Path) -> Result<Self, SessionError> {
        let raw = fs::read_to_string(path).map_err(|source| SessionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cookies: BTreeMap<String, String> =
            serde_json::from_str(&raw).map_err(|source| SessionError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { cookies })
    }

    /// Number of cookies held.
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Whether the session carries any credentials at all.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Value for a `Cookie` request header, or `None` for anonymous sessions.
    pub fn cookie_header(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let header = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        Some(header)
    }
}

// Cookie values are credentials; keep them out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_saved_cookie_object() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"auth_token": "abc", "ct0": "xyz"}}"#).expect("write cookies");

        let session = Session::from_cookie_file(file.path()).expect("session loads");
        assert_eq!(session.len(), 2);
        assert_eq!(
            session.cookie_header().as_deref(),
            Some("auth_token=abc; ct0=xyz")
        );
    }

    #[test]
    fn empty_cookie_object_sends_no_header() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "{{}}").expect("write cookies");

        let session = Session::from_cookie_file(file.path()).expect("session loads");
        assert!(session.is_empty());
        assert!(session.cookie_header().is_none());
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = Session::from_cookie_file(&dir.path().join("cookies.json"))
            .expect_err("missing file rejected");
        assert!(matches!(err, SessionError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "[1, 2, 3]").expect("write cookies");
        let err = Session::from_cookie_file(file.path()).expect_err("array rejected");
        assert!(matches!(err, SessionError::Parse { .. }));
    }

    #[test]
    fn debug_output_hides_values() {
        let session = Session::from_cookies([("auth_token", "secret")]);
        let rendered = format!("{session:?}");
        assert!(rendered.contains("auth_token"));
        assert!(!rendered.contains("secret"));
    }
}
