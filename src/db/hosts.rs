use crate::db::models::{DbHost, HardwareSpecs, Health, Management, Networking};
use crate::db::queue::{Operation, StoreHandle};
use crate::error::LaasError;
use tracing::debug;

const INSERT_HOST: &str = "INSERT INTO hosts (name, health, cpu_count, cpu_speed_mhz, cpu_cores, memory_total_mib, memory_speed_mhz, virtual_storage_size_mib, networking_provider, networking_speed_mbps, mgmt_address, mgmt_username, mgmt_password, mgmt_redfish_version) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
const SELECT_HOST: &str = "SELECT name, health, cpu_count, cpu_speed_mhz, cpu_cores, memory_total_mib, memory_speed_mhz, virtual_storage_size_mib, networking_provider, networking_speed_mbps, mgmt_address, mgmt_username, mgmt_password, mgmt_redfish_version FROM hosts WHERE name = ?";
const DELETE_HOST: &str = "DELETE FROM hosts WHERE name = ?";
const UPDATE_HOST_HEALTH: &str = "UPDATE hosts SET health = ? WHERE name = ?";
const UPDATE_HOST_SPECS: &str = "UPDATE hosts SET cpu_count = ?, cpu_speed_mhz = ?, cpu_cores = ?, memory_total_mib = ?, memory_speed_mhz = ?, virtual_storage_size_mib = ? WHERE name = ?";
const UPDATE_HOST_NETWORKING: &str = "UPDATE hosts SET networking_provider = ?, networking_speed_mbps = ? WHERE name = ?";
const UPDATE_HOST_MANAGEMENT: &str = "UPDATE hosts SET mgmt_address = ?, mgmt_username = ?, mgmt_password = ?, mgmt_redfish_version = ? WHERE name = ?";

/// Host inventory repository.
#[derive(Clone)]
pub struct HostStore {
    store: StoreHandle,
}

impl HostStore {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Provision a host; fails with [`LaasError::DuplicateKey`] if the name is taken.
    pub async fn create(&self, host: DbHost) -> Result<DbHost, LaasError> {
        let name = host.name.clone();
        let op = Operation::execute(INSERT_HOST)
            .bind(host.name)
            .bind(i64::from(host.health))
            .bind(host.hardware.cpu.count)
            .bind(host.hardware.cpu.speed_mhz)
            .bind(host.hardware.cpu.cores)
            .bind(host.hardware.memory.total_mib)
            .bind(host.hardware.memory.speed_mhz)
            .bind(host.hardware.virtual_storage_size_mib)
            .bind(host.networking.provider)
            .bind(host.networking.speed_mbps)
            .bind(host.management.address)
            .bind(host.management.username)
            .bind(host.management.password)
            .bind(i64::from(host.management.redfish_version));
        match self.store.submit(op).await {
            Ok(_) => {}
            Err(e) if e.is_unique_violation() => {
                debug!(host = %name, "host already exists");
                return Err(LaasError::DuplicateKey(format!("host {name}")));
            }
            Err(e) => return Err(e),
        }
        self.get(&name)
            .await?
            .ok_or_else(|| LaasError::NotFound(format!("host {name}")))
    }

    pub async fn get(&self, name: &str) -> Result<Option<DbHost>, LaasError> {
        let rows = self
            .store
            .submit(Operation::fetch(SELECT_HOST).bind(name))
            .await?
            .into_rows();
        rows.first().map(DbHost::from_row).transpose()
    }

    pub async fn delete(&self, name: &str) -> Result<bool, LaasError> {
        let done = self
            .store
            .submit(Operation::execute(DELETE_HOST).bind(name))
            .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn update_health(&self, name: &str, health: Health) -> Result<bool, LaasError> {
        let op = Operation::execute(UPDATE_HOST_HEALTH)
            .bind(i64::from(health))
            .bind(name);
        Ok(self.store.submit(op).await?.rows_affected() > 0)
    }

    pub async fn update_specs(&self, name: &str, specs: &HardwareSpecs) -> Result<bool, LaasError> {
        let op = Operation::execute(UPDATE_HOST_SPECS)
            .bind(specs.cpu.count)
            .bind(specs.cpu.speed_mhz)
            .bind(specs.cpu.cores)
            .bind(specs.memory.total_mib)
            .bind(specs.memory.speed_mhz)
            .bind(specs.virtual_storage_size_mib)
            .bind(name);
        Ok(self.store.submit(op).await?.rows_affected() > 0)
    }

    pub async fn update_networking(
        &self,
        name: &str,
        networking: &Networking,
    ) -> Result<bool, LaasError> {
        let op = Operation::execute(UPDATE_HOST_NETWORKING)
            .bind(networking.provider.as_str())
            .bind(networking.speed_mbps)
            .bind(name);
        Ok(self.store.submit(op).await?.rows_affected() > 0)
    }

    pub async fn update_management(
        &self,
        name: &str,
        management: &Management,
    ) -> Result<bool, LaasError> {
        let op = Operation::execute(UPDATE_HOST_MANAGEMENT)
            .bind(management.address.as_str())
            .bind(management.username.as_str())
            .bind(management.password.as_str())
            .bind(i64::from(management.redfish_version))
            .bind(name);
        Ok(self.store.submit(op).await?.rows_affected() > 0)
    }
}
