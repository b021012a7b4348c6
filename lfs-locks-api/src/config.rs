use std::collections::HashMap;
use std::path::PathBuf;

const DEFAULT_DOCUMENTATION_URL: &str =
    "https://docs.gitlab.com/ee/topics/git/lfs/#lock-files-to-prevent-conflicts";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Access token -> user name
    pub tokens: HashMap<String, String>,
    pub documentation_url: String,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            port: lookup("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            db_path: PathBuf::from(
                lookup("LFS_DB_PATH").unwrap_or_else(|| "data/lfs-locks.db".into()),
            ),
            tokens: lookup("LFS_TOKENS")
                .map(|v| parse_tokens(&v))
                .unwrap_or_default(),
            documentation_url: lookup("LFS_DOCUMENTATION_URL")
                .unwrap_or_else(|| DEFAULT_DOCUMENTATION_URL.into()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".into()),
        }
    }

    /// User owning `token`, if any.
    pub fn user_for_token(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }
}

/// Parse `token=user` pairs separated by commas. Malformed pairs are dropped.
pub fn parse_tokens(value: &str) -> HashMap<String, String> {
    value
        .split(',')
        .filter_map(|pair| {
            let (token, user) = pair.split_once('=')?;
            let (token, user) = (token.trim(), user.trim());
            if token.is_empty() || user.is_empty() {
                return None;
            }
            Some((token.to_string(), user.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        let tokens = parse_tokens("abc=alice, def = bob,broken,=nobody,ghi=");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens["abc"], "alice");
        assert_eq!(tokens["def"], "bob");
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("data/lfs-locks.db"));
        assert!(config.tokens.is_empty());
        assert_eq!(config.documentation_url, DEFAULT_DOCUMENTATION_URL);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(|key| match key {
            "PORT" => Some("8080".into()),
            "LFS_TOKENS" => Some("t1=root".into()),
            "LFS_DOCUMENTATION_URL" => Some("http://help/lfs".into()),
            _ => None,
        });
        assert_eq!(config.port, 8080);
        assert_eq!(config.user_for_token("t1"), Some("root"));
        assert_eq!(config.user_for_token("t2"), None);
        assert_eq!(config.documentation_url, "http://help/lfs");
    }
}
