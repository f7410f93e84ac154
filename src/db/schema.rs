//! SQL DDL for initializing the lab database.
//! Each statement is submitted separately through the store queue at startup.

/// Users keyed by lower-cased email. The PRIMARY KEY is what makes `create` atomic.
pub const USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    email TEXT PRIMARY KEY NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    create_time TEXT NOT NULL, -- RFC3339, server assigned
    privilege INTEGER NOT NULL DEFAULT 0
)
"#;

/// Hosts keyed by name; `health` and `mgmt_redfish_version` hold the enum integers.
pub const HOSTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS hosts (
    name TEXT PRIMARY KEY NOT NULL,
    health INTEGER NOT NULL DEFAULT 3,
    cpu_count INTEGER NOT NULL,
    cpu_speed_mhz INTEGER NOT NULL,
    cpu_cores INTEGER NOT NULL,
    memory_total_mib INTEGER NOT NULL,
    memory_speed_mhz INTEGER NOT NULL,
    virtual_storage_size_mib INTEGER NOT NULL,
    networking_provider TEXT NOT NULL,
    networking_speed_mbps INTEGER NOT NULL,
    mgmt_address TEXT NOT NULL,
    mgmt_username TEXT NOT NULL,
    mgmt_password TEXT NOT NULL,
    mgmt_redfish_version INTEGER NOT NULL
)
"#;

pub const SQLITE_INIT: &[&str] = &[USERS_TABLE, HOSTS_TABLE];
