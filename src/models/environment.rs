use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle status of a staging environment.
///
/// `Active` is the only stable state; the others mark an in-flight
/// workflow and are overwritten on success. A failed workflow leaves
/// the in-flight status in place for operator visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvStatus {
    Creating,
    Active,
    Updating,
    Refreshing,
    Deleting,
}

impl EnvStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Updating => "updating",
            Self::Refreshing => "refreshing",
            Self::Deleting => "deleting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "creating" => Some(Self::Creating),
            "active" => Some(Self::Active),
            "updating" => Some(Self::Updating),
            "refreshing" => Some(Self::Refreshing),
            "deleting" => Some(Self::Deleting),
            _ => None,
        }
    }
}

/// Protocol used for the externally visible URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            _ => None,
        }
    }
}

/// Database credentials generated once per successful creation or
/// refresh. The password is never re-derivable; treat it as a secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbCredentials {
    pub name: String,
    pub user: String,
    pub pass: String,
}

/// One ephemeral staging deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: Uuid,
    /// Unique identifier, also the hostname label and checkout
    /// directory name. Always satisfies [`validate_environment_name`].
    pub name: String,
    pub status: EnvStatus,
    pub repository: String,
    pub branch: String,
    pub sha: String,
    pub protocol: Protocol,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_pass: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Environment {
    /// Hostname for this environment under the configured domain.
    pub fn host(&self, domain: &str) -> String {
        format!("{}.{}", self.name, domain)
    }

    /// Externally visible URL.
    pub fn url(&self, domain: &str) -> String {
        format!("{}://{}", self.protocol.as_str(), self.host(domain))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEnvironment {
    pub name: String,
    pub repository: String,
    pub branch: String,
    pub sha: String,
    pub protocol: Protocol,
}

/// Environment name grammar: length 3-16, first char `[a-z]`, last
/// char `[a-z0-9]`, interior chars `[a-z0-9-]`.
pub fn validate_environment_name(name: &str) -> bool {
    const MIN_LENGTH: usize = 3;
    const MAX_LENGTH: usize = 16;

    if name.len() < MIN_LENGTH || name.len() > MAX_LENGTH {
        return false;
    }

    let bytes = name.as_bytes();
    let first_ok = bytes[0].is_ascii_lowercase();
    let last_ok = bytes[bytes.len() - 1].is_ascii_lowercase()
        || bytes[bytes.len() - 1].is_ascii_digit();
    let body_ok = bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');

    first_ok && last_ok && body_ok
}

/// Derive the environment name for a pull request number.
pub fn environment_name_for_pr(number: u64) -> String {
    format!("pr-{}", number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_environment_name("pr-42"));
        assert!(validate_environment_name("abc"));
        assert!(validate_environment_name("a2c"));
        assert!(validate_environment_name("pr-42-feature"));
        assert!(validate_environment_name("a234567890123456")); // 16 chars
    }

    #[test]
    fn test_length_bounds() {
        assert!(!validate_environment_name("ab")); // too short
        assert!(!validate_environment_name("a2345678901234567")); // 17 chars
        assert!(!validate_environment_name(""));
    }

    #[test]
    fn test_first_char_must_be_lowercase_letter() {
        assert!(!validate_environment_name("Pr-42"));
        assert!(!validate_environment_name("1r-42"));
        assert!(!validate_environment_name("-r-42"));
    }

    #[test]
    fn test_last_char_must_be_alnum() {
        assert!(!validate_environment_name("pr-42-"));
        assert!(validate_environment_name("pr-4a"));
    }

    #[test]
    fn test_interior_chars() {
        assert!(!validate_environment_name("pr_42"));
        assert!(!validate_environment_name("pr.42"));
        assert!(!validate_environment_name("pr 42"));
    }

    #[test]
    fn test_environment_url() {
        let env = Environment {
            id: Uuid::new_v4(),
            name: "pr-42".to_string(),
            status: EnvStatus::Active,
            repository: "git@example.com:acme/app.git".to_string(),
            branch: "feature-x".to_string(),
            sha: "abc123".to_string(),
            protocol: Protocol::Https,
            db_name: None,
            db_user: None,
            db_pass: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };

        assert_eq!(env.host("staging.example.com"), "pr-42.staging.example.com");
        assert_eq!(
            env.url("staging.example.com"),
            "https://pr-42.staging.example.com"
        );
    }

    #[test]
    fn test_name_for_pr() {
        assert_eq!(environment_name_for_pr(42), "pr-42");
        assert!(validate_environment_name(&environment_name_for_pr(42)));
    }
}
