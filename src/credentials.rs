//! Session cookie loading.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::CredentialError;

/// Default cookie file name looked up next to the binary's working directory.
pub const DEFAULT_COOKIE_FILE: &str = "cookies.txt";

/// One browser cookie.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Cookie {
    #[serde(default)]
    pub domain: String,
    pub name: String,
    pub value: String,
}

/// Session context shared read-only by every job of a run.
#[derive(Clone, Debug)]
pub struct SessionCredential {
    source: PathBuf,
    cookies: Vec<Cookie>,
}

impl SessionCredential {
    pub fn new(source: PathBuf, cookies: Vec<Cookie>) -> Self {
        Self { source, cookies }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// `Cookie` request header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Supplies the session credential for a run.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Human-readable origin for logs.
    fn describe(&self) -> String;

    async fn load(&self) -> Result<SessionCredential, CredentialError>;
}

/// Reads a cookie export from disk (Netscape `cookies.txt` or JSON array).
#[derive(Clone, Debug)]
pub struct CookieFileProvider {
    path: PathBuf,
}

impl CookieFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialProvider for CookieFileProvider {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<SessionCredential, CredentialError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CredentialError::Missing {
                path: self.path.clone(),
                source: Some(e),
            })?;
        let cookies = parse_cookies(&text);
        if cookies.is_empty() {
            return Err(CredentialError::Empty {
                path: self.path.clone(),
            });
        }
        Ok(SessionCredential::new(self.path.clone(), cookies))
    }
}

/// Parse either a JSON cookie array or Netscape cookie lines.
pub fn parse_cookies(text: &str) -> Vec<Cookie> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return match serde_json::from_str::<Vec<Cookie>>(trimmed) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("cookie JSON could not be parsed: {e}");
                vec![]
            }
        };
    }
    text.lines().filter_map(parse_netscape_line).collect()
}

fn parse_netscape_line(line: &str) -> Option<Cookie> {
    let line = line.trim_end_matches(['\r', '\n']);
    // curl marks HttpOnly cookies with this prefix; other `#` lines are comments.
    let line = match line.strip_prefix("#HttpOnly_") {
        Some(rest) => rest,
        None if line.starts_with('#') || line.trim().is_empty() => return None,
        None => line,
    };
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 7 {
        return None;
    }
    Some(Cookie {
        domain: fields[0].to_string(),
        name: fields[5].to_string(),
        value: fields[6].to_string(),
    })
}

/// First existing file among `candidates`.
pub fn find_cookie_file<I, P>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    candidates
        .into_iter()
        .map(|p| p.as_ref().to_path_buf())
        .find(|p| p.is_file())
}

/// `cookies.txt` in the working directory, then in its parent.
pub fn default_cookie_candidates() -> Vec<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut v = vec![cwd.join(DEFAULT_COOKIE_FILE)];
    if let Some(parent) = cwd.parent() {
        v.push(parent.join(DEFAULT_COOKIE_FILE));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETSCAPE: &str = "# Netscape HTTP Cookie File\n\
        # comment line\n\
        \n\
        .example.com\tTRUE\t/\tTRUE\t1999999999\tsessionid\tabc123\n\
        #HttpOnly_.example.com\tTRUE\t/\tTRUE\t1999999999\ttt_csrf\txyz\n\
        broken line\n";

    #[test]
    fn parses_netscape_format() {
        let c = parse_cookies(NETSCAPE);
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].name, "sessionid");
        assert_eq!(c[0].domain, ".example.com");
        assert_eq!(c[1].name, "tt_csrf");
        let cred = SessionCredential::new("cookies.txt".into(), c);
        assert_eq!(cred.cookie_header(), "sessionid=abc123; tt_csrf=xyz");
    }

    #[test]
    fn parses_json_export() {
        let c = parse_cookies(r#"[{"name":"sessionid","value":"v1","domain":".x.com"},{"name":"a","value":"b"}]"#);
        assert_eq!(c.len(), 2);
        assert_eq!(c[1].domain, "");
    }

    #[tokio::test]
    async fn missing_file_is_missing_credential() {
        let dir = tempfile::tempdir().expect("tempdir");
        let p = CookieFileProvider::new(dir.path().join("cookies.txt"));
        let err = p.load().await.unwrap_err();
        assert!(matches!(err, CredentialError::Missing { .. }));
    }

    #[tokio::test]
    async fn file_without_cookies_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, "# nothing here\n").expect("write");
        let err = CookieFileProvider::new(&path).load().await.unwrap_err();
        assert!(matches!(err, CredentialError::Empty { .. }));
    }

    #[tokio::test]
    async fn loads_cookie_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, NETSCAPE).expect("write");
        let cred = CookieFileProvider::new(&path).load().await.expect("load");
        assert_eq!(cred.source(), path.as_path());
        assert_eq!(cred.cookies().len(), 2);
    }

    #[test]
    fn finds_first_existing_candidate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let child = dir.path().join("child");
        std::fs::create_dir(&child).expect("mkdir");
        let parent_file = dir.path().join(DEFAULT_COOKIE_FILE);
        std::fs::write(&parent_file, NETSCAPE).expect("write");

        let found = find_cookie_file([child.join(DEFAULT_COOKIE_FILE), parent_file.clone()]);
        assert_eq!(found, Some(parent_file));
        assert_eq!(find_cookie_file([child.join("none.txt")]), None);
    }
}
