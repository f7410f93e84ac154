use crate::error::LaasError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DbUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub create_time: DateTime<Utc>,
    pub privilege: i64,
}

impl DbUser {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, LaasError> {
        Ok(Self {
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            password_hash: row.try_get("password_hash")?,
            create_time: row.try_get("create_time")?,
            privilege: row.try_get("privilege")?,
        })
    }
}

/// Host health as stored in `hosts.health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Health {
    Good = 0,
    Degraded = 1,
    Bad = 2,
    Unknown = 3,
}

impl From<Health> for i64 {
    fn from(h: Health) -> Self {
        h as i64
    }
}

impl TryFrom<i64> for Health {
    type Error = LaasError;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Health::Good),
            1 => Ok(Health::Degraded),
            2 => Ok(Health::Bad),
            3 => Ok(Health::Unknown),
            other => Err(LaasError::Decode {
                column: "health",
                reason: format!("unknown health value {other}"),
            }),
        }
    }
}

/// Dell iDRAC generation spoken by the out-of-band controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum RedfishVersion {
    IDrac7 = 0,
    IDrac8 = 1,
    IDrac9 = 2,
}

impl From<RedfishVersion> for i64 {
    fn from(v: RedfishVersion) -> Self {
        v as i64
    }
}

impl TryFrom<i64> for RedfishVersion {
    type Error = LaasError;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(RedfishVersion::IDrac7),
            1 => Ok(RedfishVersion::IDrac8),
            2 => Ok(RedfishVersion::IDrac9),
            other => Err(LaasError::Decode {
                column: "mgmt_redfish_version",
                reason: format!("unknown redfish version {other}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSpecs {
    pub count: i64,
    pub speed_mhz: i64,
    pub cores: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySpecs {
    pub total_mib: i64,
    pub speed_mhz: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareSpecs {
    pub cpu: CpuSpecs,
    pub memory: MemorySpecs,
    pub virtual_storage_size_mib: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Networking {
    pub provider: String,
    pub speed_mbps: i64,
}

/// Out-of-band management access; never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Management {
    pub address: String,
    pub username: String,
    pub password: String,
    pub redfish_version: RedfishVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbHost {
    pub name: String,
    pub health: Health,
    pub hardware: HardwareSpecs,
    pub networking: Networking,
    #[serde(skip_serializing)]
    pub management: Management,
}

impl DbHost {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, LaasError> {
        let health: i64 = row.try_get("health")?;
        let redfish: i64 = row.try_get("mgmt_redfish_version")?;
        Ok(Self {
            name: row.try_get("name")?,
            health: Health::try_from(health)?,
            hardware: HardwareSpecs {
                cpu: CpuSpecs {
                    count: row.try_get("cpu_count")?,
                    speed_mhz: row.try_get("cpu_speed_mhz")?,
                    cores: row.try_get("cpu_cores")?,
                },
                memory: MemorySpecs {
                    total_mib: row.try_get("memory_total_mib")?,
                    speed_mhz: row.try_get("memory_speed_mhz")?,
                },
                virtual_storage_size_mib: row.try_get("virtual_storage_size_mib")?,
            },
            networking: Networking {
                provider: row.try_get("networking_provider")?,
                speed_mbps: row.try_get("networking_speed_mbps")?,
            },
            management: Management {
                address: row.try_get("mgmt_address")?,
                username: row.try_get("mgmt_username")?,
                password: row.try_get("mgmt_password")?,
                redfish_version: RedfishVersion::try_from(redfish)?,
            },
        })
    }
}
