use crate::error::LaasError;
use regex::Regex;
use std::sync::LazyLock;

// A `+` in the local part lets one mailbox register many accounts; accepted knowingly.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-z]{2,4}$").expect("email regex")
});
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_ ']+$").expect("name regex"));

pub fn email(email: &str, allowed_domains: &[String]) -> Result<(), LaasError> {
    if !EMAIL_RE.is_match(email) {
        return Err(LaasError::Validation("invalid email address".to_string()));
    }
    let domain = email
        .rsplit_once('@')
        .map(|(_, d)| d.to_ascii_lowercase())
        .unwrap_or_default();
    if !allowed_domains.is_empty() && !allowed_domains.iter().any(|d| *d == domain) {
        return Err(LaasError::Validation(format!(
            "email domain {domain} is not allowed"
        )));
    }
    Ok(())
}

pub fn password(password: &str) -> Result<(), LaasError> {
    if (8..=64).contains(&password.len()) {
        Ok(())
    } else {
        Err(LaasError::Validation(
            "password must be 8 to 64 characters".to_string(),
        ))
    }
}

pub fn name(name: &str) -> Result<(), LaasError> {
    if !name.is_empty() && name.len() <= 48 && NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(LaasError::Validation(format!("invalid name {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_rules() {
        let allowed = vec!["example.com".to_string()];
        assert!(email("jo.doe@example.com", &allowed).is_ok());
        assert!(email("jo@elsewhere.com", &allowed).is_err());
        assert!(email("not-an-email", &allowed).is_err());
        assert!(email("jo@anything.org", &[]).is_ok());
    }

    #[test]
    fn password_and_name_rules() {
        assert!(password("short").is_err());
        assert!(password("longenough").is_ok());
        assert!(password(&"x".repeat(65)).is_err());
        assert!(name("Mary O'Neil").is_ok());
        assert!(name("").is_err());
        assert!(name("<script>").is_err());
        assert!(name(&"a".repeat(49)).is_err());
    }
}
