//! Host environment checks: privileges, hypervisor detection, connectivity.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};

/// Mirror endpoints probed for connectivity. Highly available, plain HTTP so
/// proxies configured via HTTP_PROXY/HTTPS_PROXY work unchanged.
const CONNECTIVITY_ENDPOINTS: &[&str] = &[
    "http://deb.debian.org",
    "http://mirror.centos.org",
    "http://github.com",
];

/// Fail unless running as root. Mutating operations require it.
pub fn check_root() -> Result<()> {
    if !nix::unistd::geteuid().is_root() {
        bail!("this program must be run as root (sudo)");
    }
    Ok(())
}

/// Detect whether the system is a virtual machine guest.
///
/// Probes the DMI product name and `/proc/cpuinfo` under `fs_root` (`/` in
/// production; tests point it at a staged tree).
pub fn is_virtual_guest(fs_root: &Path) -> bool {
    let dmi = fs_root.join("sys/class/dmi/id/product_name");
    if let Ok(product) = std::fs::read_to_string(&dmi) {
        if product.contains("VMware") || product.contains("Virtual") || product.contains("KVM") {
            return true;
        }
    }

    let cpuinfo = fs_root.join("proc/cpuinfo");
    if let Ok(content) = std::fs::read_to_string(&cpuinfo) {
        if content.contains("VMware") || content.contains("hypervisor") {
            return true;
        }
    }

    false
}

/// Probe well-known package mirrors with HEAD requests. Any success means
/// online; everything failing within the timeout means air-gapped mode.
pub fn check_connectivity() -> bool {
    let client = match reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
    {
        Ok(client) => client,
        Err(_) => return false,
    };

    for url in CONNECTIVITY_ENDPOINTS {
        if let Ok(resp) = client.head(*url).send() {
            if resp.status().is_success() {
                return true;
            }
        }
    }
    false
}
