//! Network mutator: installs a oneshot systemd unit that tunes vmxnet3
//! interfaces at boot (ring buffers, offloads, interrupt coalescing).

use std::path::PathBuf;

use anyhow::Result;

use crate::exec::Cmd;
use crate::report::Reporter;

use super::{ApplyContext, Outcome, Tuner};

const SERVICE_PATH: &str = "/etc/systemd/system/network-tuning.service";
const SERVICE_NAME: &str = "network-tuning.service";

/// The tuning unit. Everything is gated on the vmxnet3 driver so e1000
/// adapters, which hang on ring-buffer changes, are never touched.
const SERVICE_UNIT: &str = r#"[Unit]
Description=Network Performance Tuning for virtual interfaces
After=network-online.target
Wants=network-online.target

[Service]
Type=oneshot
RemainOnExit=yes

# Increase ring buffers (ONLY for vmxnet3 to avoid e1000 hangs)
ExecStart=/bin/bash -c 'for iface in $(ls /sys/class/net/ | grep -E "^(ens|eth)"); do if ethtool -i $iface | grep -q "driver: vmxnet3"; then ethtool -G $iface rx 4096 tx 4096 2>/dev/null || true; fi; done'

# Enable hardware offloading features (ONLY for vmxnet3)
ExecStart=/bin/bash -c 'for iface in $(ls /sys/class/net/ | grep -E "^(ens|eth)"); do if ethtool -i $iface | grep -q "driver: vmxnet3"; then ethtool -K $iface gso on gro on tso on 2>/dev/null || true; fi; done'

# Set interrupt coalescing (ONLY for vmxnet3)
ExecStart=/bin/bash -c 'for iface in $(ls /sys/class/net/ | grep -E "^(ens|eth)"); do if ethtool -i $iface | grep -q "driver: vmxnet3"; then ethtool -C $iface rx-usecs 10 tx-usecs 10 2>/dev/null || true; fi; done'

[Install]
WantedBy=multi-user.target
"#;

pub struct NetworkTuner {
    path: PathBuf,
}

impl NetworkTuner {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(SERVICE_PATH),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn service_unit() -> &'static str {
        SERVICE_UNIT
    }

    /// Ethernet-style interfaces (`ens*`, `eth*`) currently present.
    fn interfaces() -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(entries) = std::fs::read_dir("/sys/class/net") {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with("ens") || name.starts_with("eth") {
                    names.push(name);
                }
            }
        }
        names.sort();
        names
    }
}

impl Default for NetworkTuner {
    fn default() -> Self {
        Self::new()
    }
}

impl Tuner for NetworkTuner {
    fn name(&self) -> &'static str {
        "network interface optimization"
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<Outcome> {
        let reporter = ctx.reporter;
        reporter.step("Configuring network optimizations");

        let current = std::fs::read_to_string(&self.path).ok();
        if current.as_deref() == Some(SERVICE_UNIT) {
            reporter.success("network tuning service already installed");
            return Ok(Outcome::Unchanged);
        }

        if ctx.dry_run() {
            reporter.info(&format!("would create: {}", self.path.display()));
            reporter.info(SERVICE_UNIT.trim_end());
            return Ok(Outcome::Previewed);
        }

        ctx.backup(&self.path)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, SERVICE_UNIT)?;
        reporter.success(&format!("created {}", self.path.display()));

        reporter.info("reloading systemd daemon...");
        if let Err(err) = Cmd::new("systemctl").arg("daemon-reload").capture() {
            reporter.warning(&format!("failed to reload systemd ({})", err));
        }

        reporter.info("enabling network tuning service...");
        if let Err(err) = Cmd::new("systemctl").args(["enable", SERVICE_NAME]).capture() {
            reporter.warning(&format!("failed to enable service ({})", err));
        }

        reporter.info("starting network tuning service...");
        match Cmd::new("systemctl").args(["start", SERVICE_NAME]).capture() {
            Ok(_) => reporter.success("network tuning applied immediately"),
            Err(err) => {
                reporter.warning(&format!("failed to start service ({})", err));
                reporter.warning("network tuning will be applied on next boot");
            }
        }

        Ok(Outcome::Applied)
    }

    fn show(&self, reporter: &dyn Reporter) -> Result<()> {
        reporter.step("Current network interface settings");

        for iface in Self::interfaces() {
            reporter.info(&format!("interface: {}", iface));

            if let Ok((output, true)) = Cmd::new("ethtool").args(["-g", &iface]).capture_unchecked()
            {
                for line in output.lines() {
                    if line.contains("Current") || line.contains("RX") || line.contains("TX") {
                        reporter.info(&format!("  {}", line.trim()));
                    }
                }
            }

            if let Ok((output, true)) = Cmd::new("ethtool").args(["-k", &iface]).capture_unchecked()
            {
                let features = [
                    "tcp-segmentation-offload",
                    "generic-receive-offload",
                    "generic-segmentation-offload",
                ];
                for line in output.lines() {
                    if features.iter().any(|f| line.contains(&format!("{}:", f))) {
                        reporter.info(&format!("  {}", line.trim()));
                    }
                }
            }
        }
        Ok(())
    }

    fn verify(&self, reporter: &dyn Reporter) -> Result<bool> {
        if !self.path.exists() {
            reporter.warning(&format!(
                "network tuning service not found: {}",
                self.path.display()
            ));
            return Ok(false);
        }
        reporter.success("network tuning service exists");

        if let Ok((output, true)) = Cmd::new("systemctl")
            .args(["is-enabled", SERVICE_NAME])
            .capture_unchecked()
        {
            if output.trim() == "enabled" {
                reporter.success("network tuning service is enabled");
            } else {
                reporter.warning("network tuning service is not enabled");
            }
        }
        Ok(true)
    }
}

/// Scan interface statistics for non-zero drop/error counters.
pub fn check_packet_drops(reporter: &dyn Reporter) -> Result<()> {
    reporter.step("Checking for network packet drops");

    for iface in NetworkTuner::interfaces() {
        reporter.info(&format!("interface: {}", iface));

        let output = match Cmd::new("ethtool").args(["-S", &iface]).capture_unchecked() {
            Ok((output, true)) => output,
            _ => {
                reporter.warning("  could not get statistics");
                continue;
            }
        };

        let mut drops_found = false;
        for line in output.lines() {
            if !line.contains("drop") && !line.contains("error") {
                continue;
            }
            if let Some(value) = line.split_whitespace().last() {
                if value != "0" {
                    reporter.warning(&format!("  {}", line.trim()));
                    drops_found = true;
                }
            }
        }
        if !drops_found {
            reporter.success("  no packet drops or errors detected");
        }
    }
    Ok(())
}
