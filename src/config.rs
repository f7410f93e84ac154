use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

/// Environment variables picked up by [`Config::from_env`]; unrelated process env is ignored.
const ENV_KEYS: &[&str] = &[
    "host",
    "port",
    "db_file",
    "db_salt",
    "db_queue_size",
    "db_queue_policy",
    "smtp_host",
    "smtp_port",
    "smtp_user",
    "smtp_password",
    "lab_name",
    "lab_org",
    "lab_contact",
    "email_domain_whitelist",
    "session_ttl_secs",
    "pending_ttl_secs",
    "pending_sweep_secs",
    "insecure_cookie",
    "loglevel",
];

/// What `submit` does when `db_queue_size` operations are already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueuePolicy {
    /// Fail immediately with `QueueSaturated`.
    #[default]
    Reject,
    /// Wait in FIFO order for a free slot.
    Wait,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,

    pub db_file: String,
    pub db_salt: String,
    pub db_queue_size: usize,
    pub db_queue_policy: QueuePolicy,

    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,

    pub lab_name: String,
    pub lab_org: String,
    pub lab_contact: String,
    /// `|`-separated list of domains allowed to register.
    pub email_domain_whitelist: String,

    pub session_ttl_secs: u64,
    pub pending_ttl_secs: u64,
    pub pending_sweep_secs: u64,
    pub insecure_cookie: bool,
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            db_file: "opnlaas.db".to_string(),
            db_salt: String::new(),
            db_queue_size: 256,
            db_queue_policy: QueuePolicy::default(),
            smtp_host: None,
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_password: String::new(),
            lab_name: "Sample Laboratory".to_string(),
            lab_org: "Placebo Pharmaceuticals".to_string(),
            lab_contact: String::new(),
            email_domain_whitelist: "example.com|placebo.org".to_string(),
            session_ttl_secs: 600,
            pending_ttl_secs: 600,
            pending_sweep_secs: 1,
            insecure_cookie: false,
            loglevel: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults overlaid with the process environment (call `dotenvy::dotenv()` first).
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::raw().only(ENV_KEYS))
            .extract()
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.db_file)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn email_domains(&self) -> Vec<String> {
        self.email_domain_whitelist
            .split('|')
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect()
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    pub fn pending_sweep(&self) -> Duration {
        Duration::from_secs(self.pending_sweep_secs.max(1))
    }
}

pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::from_env().unwrap_or_else(|e| panic!("invalid configuration: {e}"))
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_splits_on_pipe() {
        let cfg = Config {
            email_domain_whitelist: "Example.com| unh.edu |".to_string(),
            ..Config::default()
        };
        assert_eq!(cfg.email_domains(), vec!["example.com", "unh.edu"]);
    }

    #[test]
    fn queue_policy_parses_lowercase() {
        let cfg: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Serialized::default("db_queue_policy", "wait"))
            .extract()
            .expect("extract config");
        assert_eq!(cfg.db_queue_policy, QueuePolicy::Wait);
    }
}
