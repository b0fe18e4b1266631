use crate::models::Domain;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Project {
    pub id: i32,
    pub name: String, // unique lowercase slug
    pub user_id: i32,
    pub active_deployment_id: Option<i32>,
    pub locked_at: Option<DateTime<Utc>>,
    pub force_https: bool,
    pub skip_build: bool,
    pub default_domain_enabled: bool,
    pub basic_auth_username: Option<String>,
    /// hex SHA-256 of `username:password`
    pub encrypted_basic_auth_password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(user_id: i32, name: String) -> Self {
        Self {
            id: 0,
            name,
            user_id,
            active_deployment_id: None,
            locked_at: None,
            force_https: false,
            skip_build: false,
            default_domain_enabled: true,
            basic_auth_username: None,
            encrypted_basic_auth_password: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    pub fn default_domain_name(&self, suffix: &str) -> String {
        format!("{}.{}", self.name, suffix)
    }

    /// Every hostname bound to the project: the default domain first (when
    /// enabled), then explicit domains in id order. No duplicates.
    pub fn domain_names(&self, domains: &[Domain], suffix: &str) -> Vec<String> {
        let mut sorted: Vec<&Domain> = domains.iter().collect();
        sorted.sort_by_key(|domain| domain.id);

        let mut names = Vec::with_capacity(sorted.len() + 1);
        if self.default_domain_enabled {
            names.push(self.default_domain_name(suffix));
        }
        for domain in sorted {
            if !names.contains(&domain.name) {
                names.push(domain.name.clone());
            }
        }
        names
    }

    pub fn validate_name(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err("is required".to_string());
        }
        if name.len() < 3 || name.len() > 63 {
            return Err("must be between 3 and 63 characters".to_string());
        }
        let re = Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$").map_err(|e| e.to_string())?;
        if !re.is_match(name) {
            return Err("is invalid".to_string());
        }
        Ok(())
    }

    pub fn hash_basic_auth(username: &str, password: &str) -> String {
        let digest = Sha256::digest(format!("{}:{}", username, password).as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn basic_auth_digest(&self) -> Option<&str> {
        match (&self.basic_auth_username, &self.encrypted_basic_auth_password) {
            (Some(_), Some(digest)) => Some(digest.as_str()),
            _ => None,
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Project::new(0, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(id: i32, name: &str) -> Domain {
        Domain {
            id,
            project_id: 1,
            name: name.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn domain_names_lists_default_then_explicit_by_id() {
        let project = Project::new(1, "foo".to_string());
        let domains = vec![domain(9, "www.foo.com"), domain(3, "foo.com")];

        assert_eq!(
            project.domain_names(&domains, "launchpad.site"),
            vec!["foo.launchpad.site", "foo.com", "www.foo.com"]
        );
    }

    #[test]
    fn domain_names_skips_disabled_default_domain() {
        let mut project = Project::new(1, "foo".to_string());
        project.default_domain_enabled = false;

        assert_eq!(
            project.domain_names(&[domain(1, "foo.com")], "launchpad.site"),
            vec!["foo.com"]
        );
        assert!(project.domain_names(&[], "launchpad.site").is_empty());
    }

    #[test]
    fn validate_name_accepts_slugs() {
        assert!(Project::validate_name("foo-bar-express").is_ok());
        assert!(Project::validate_name("abc").is_ok());
    }

    #[test]
    fn validate_name_rejects_bad_names() {
        assert_eq!(Project::validate_name(""), Err("is required".to_string()));
        assert!(Project::validate_name("ab").is_err());
        assert_eq!(Project::validate_name("foo-bar-"), Err("is invalid".to_string()));
        assert_eq!(Project::validate_name("Foo"), Err("is invalid".to_string()));
        assert!(Project::validate_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn hash_basic_auth_is_hex_sha256() {
        assert_eq!(
            Project::hash_basic_auth("user", "pass"),
            "ef4c914c591698b268db3c64163eafda7209a630f236ebf0eebf045460df723a"
        );
        assert_ne!(
            Project::hash_basic_auth("user", "pass"),
            Project::hash_basic_auth("user", "pass2")
        );
    }

    #[test]
    fn basic_auth_digest_requires_username_and_digest() {
        let mut project = Project::new(1, "foo".to_string());
        assert_eq!(project.basic_auth_digest(), None);

        project.basic_auth_username = Some("user".to_string());
        project.encrypted_basic_auth_password = Some(Project::hash_basic_auth("user", "pass"));
        assert!(project.basic_auth_digest().is_some());
    }
}
