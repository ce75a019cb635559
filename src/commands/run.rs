//! `run`: create and start a container (spec.md §4.I, §6).

use chrono::Local;
use tracing::{info, warn};

use crate::cgroup_manager::CgroupManager;
use crate::error::Result;
use crate::ipam::Ipam;
use crate::network;
use crate::overlay::Workspace;
use crate::paths;
use crate::runtime;
use crate::state::{self, ContainerDescriptor, ResourceConfig};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    netlink: rtnetlink::Handle,
    image: String,
    argv: Vec<String>,
    tty: bool,
    detach: bool,
    mem: String,
    cpu: String,
    cpu_set: String,
    volume: String,
    name: Option<String>,
    env: Vec<String>,
    network_name: String,
    port_mapping: Vec<String>,
) -> Result<()> {
    let create_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let resource_config = ResourceConfig {
        memory_limit: mem,
        cpus: cpu,
        cpu_set,
    };

    let mut descriptor = ContainerDescriptor::new(
        name,
        image.clone(),
        argv.clone(),
        tty,
        detach,
        volume.clone(),
        env,
        resource_config.clone(),
        network_name.clone(),
        port_mapping.clone(),
        create_at,
    );

    let workspace = Workspace::new_workspace(&descriptor.id, &image, &volume)?;

    let log_path = paths::container_log_path(&descriptor.id);
    let mut spawned = runtime::spawn(&workspace.merged, tty, detach, Some(&log_path))?;
    descriptor.pid = spawned.pid.as_raw();
    descriptor.status = state::ContainerStatus::Running;

    let manager = CgroupManager::new(descriptor.id.clone());
    if let Err(e) = manager.set(&resource_config) {
        warn!(id = %descriptor.id, error = %e, "cgroup set failed, limits are advisory");
    } else if let Err(e) = manager.apply(spawned.pid, &resource_config) {
        warn!(id = %descriptor.id, error = %e, "cgroup apply failed, limits are advisory");
    }

    let ipam = Ipam::default();
    match network::attach(netlink, spawned.pid.as_raw(), &network_name, &descriptor.id, port_mapping, &ipam).await {
        Ok(endpoint) => {
            descriptor.network = endpoint.network.name.clone();
        }
        Err(e) => warn!(id = %descriptor.id, error = %e, "network attach failed"),
    }

    state::save_container(&descriptor)?;
    spawned.send_command(&argv, &descriptor.environment)?;

    info!(id = %descriptor.id, name = %descriptor.name, pid = descriptor.pid, "container started");

    if tty {
        runtime::wait_foreground(spawned.pid)?;
        if let Err(e) = manager.destroy() {
            warn!(id = %descriptor.id, error = %e, "cgroup teardown failed");
        }
        Workspace::teardown(&descriptor.id, &volume);
        descriptor.status = state::ContainerStatus::Exited;
        descriptor.pid = 0;
        state::save_container(&descriptor)?;
    } else {
        println!("{}", descriptor.id);
    }

    Ok(())
}
