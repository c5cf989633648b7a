use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use vm_tuner::backup::{self, BackupSession};
use vm_tuner::disk;
use vm_tuner::host;
use vm_tuner::report::{ConsoleReporter, Reporter};
use vm_tuner::tuners::{
    clean_system, check_packet_drops, ApplyContext, DebloatTuner, FstabTuner, GrubTuner,
    NetworkTuner, Outcome, SchedulerTuner, SysctlTuner, Tuner, VmToolsTuner,
};
use vm_tuner::{Distro, TuningProfile};

fn usage() -> &'static str {
    "Usage:\n  \
     vm-tuner [flags]              apply all tuning modules\n  \
     vm-tuner show                 show current configuration of each surface\n  \
     vm-tuner verify               check that tuning artifacts are present\n  \
     vm-tuner restore [timestamp]  roll back a backup session (lists sessions without one)\n  \
     vm-tuner expand-disk [--yes]  grow the root partition and filesystem\n  \
     vm-tuner clean [--yes]        clean package cache and rotated logs\n\n\
     Flags:\n  \
     --dry-run          show what would change without writing\n  \
     --no-grub          skip boot parameter tuning\n  \
     --no-sysctl        skip kernel tunable tuning\n  \
     --no-fstab         skip mount option tuning\n  \
     --no-io            skip I/O scheduler tuning\n  \
     --no-network       skip network tuning\n  \
     --no-vmtools       skip guest tools installation\n  \
     --debloat          also disable known-unneeded services\n  \
     --profile <path>   use an explicit tuning profile\n  \
     --yes, -y          answer yes to confirmation prompts"
}

#[derive(Debug, Default)]
struct TuneFlags {
    dry_run: bool,
    no_grub: bool,
    no_sysctl: bool,
    no_fstab: bool,
    no_io: bool,
    no_network: bool,
    no_vmtools: bool,
    debloat: bool,
    yes: bool,
    profile: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("show") => show_config(),
        Some("verify") => verify_config(),
        Some("restore") => restore(args.get(1).map(String::as_str)),
        Some("expand-disk") => expand_disk(has_yes(&args[1..])),
        Some("clean") => clean(has_yes(&args[1..])),
        Some("--help") | Some("-h") | Some("help") => {
            println!("{}", usage());
            Ok(())
        }
        Some(first) if !first.starts_with('-') => bail!(usage()),
        _ => run_tuner(parse_tune_flags(&args)?),
    }
}

fn has_yes(args: &[String]) -> bool {
    args.iter().any(|a| a == "--yes" || a == "-y")
}

fn parse_tune_flags(args: &[String]) -> Result<TuneFlags> {
    let mut flags = TuneFlags::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dry-run" => flags.dry_run = true,
            "--no-grub" => flags.no_grub = true,
            "--no-sysctl" => flags.no_sysctl = true,
            "--no-fstab" => flags.no_fstab = true,
            "--no-io" => flags.no_io = true,
            "--no-network" => flags.no_network = true,
            "--no-vmtools" => flags.no_vmtools = true,
            "--debloat" => flags.debloat = true,
            "--yes" | "-y" => flags.yes = true,
            "--profile" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--profile requires a path\n\n{}", usage()))?;
                flags.profile = Some(PathBuf::from(path));
            }
            other => bail!("unknown flag '{}'\n\n{}", other, usage()),
        }
    }
    Ok(flags)
}

fn banner() {
    println!();
    println!(
        "vm-tuner {} - virtual machine performance tuner",
        env!("CARGO_PKG_VERSION")
    );
    println!();
}

/// Ask a yes/no question on stdin. Anything but an explicit yes is a no.
fn confirm(question: &str) -> bool {
    print!("{} (yes/no): ", question);
    let _ = io::stdout().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn run_tuner(flags: TuneFlags) -> Result<()> {
    banner();
    let reporter = ConsoleReporter;

    reporter.step("Connectivity check");
    let online = host::check_connectivity();
    if online {
        reporter.success("mode: online");
    } else {
        reporter.warning("mode: offline (no internet access detected)");
        reporter.info("features requiring package installation will be limited");
    }

    if !flags.dry_run {
        host::check_root()?;
    }

    if host::is_virtual_guest(Path::new("/")) {
        reporter.success("detected virtual machine guest");
    } else {
        reporter.warning("this system does not appear to be a virtual machine");
        reporter.warning("tuning parameters are optimized for virtualized environments");
        if !flags.yes && !flags.dry_run && !confirm("continue anyway?") {
            reporter.info("tuning cancelled");
            return Ok(());
        }
    }

    let distro = match Distro::detect() {
        Ok(distro) => {
            reporter.success(&format!("detected distribution: {}", distro.name));
            distro
        }
        Err(err) => {
            reporter.warning(&format!("could not detect distribution: {}", err));
            Distro::unknown()
        }
    };

    let profile = TuningProfile::load(flags.profile.as_deref())?;

    let mut tuners: Vec<Box<dyn Tuner>> = Vec::new();
    if !flags.no_grub {
        tuners.push(Box::new(GrubTuner::new(&distro)));
    }
    if !flags.no_sysctl {
        tuners.push(Box::new(SysctlTuner::new()));
    }
    if !flags.no_fstab {
        tuners.push(Box::new(FstabTuner::new()));
    }
    if !flags.no_io {
        tuners.push(Box::new(SchedulerTuner::new()));
    }
    if !flags.no_network {
        tuners.push(Box::new(NetworkTuner::new()));
    }
    if !flags.no_vmtools {
        tuners.push(Box::new(VmToolsTuner::new()));
    }
    if flags.debloat {
        tuners.push(Box::new(DebloatTuner::new()));
    }

    if tuners.is_empty() {
        bail!("no tuning modules selected");
    }

    reporter.step("Summary of actions");
    for (i, tuner) in tuners.iter().enumerate() {
        println!("  {}. {}", i + 1, tuner.name());
    }
    println!();

    if flags.dry_run {
        reporter.info("DRY RUN MODE - no changes will be made");
    } else if !flags.yes && !confirm("continue with tuning?") {
        reporter.info("tuning cancelled");
        return Ok(());
    }

    let session = if flags.dry_run {
        None
    } else {
        let session = BackupSession::create(&backup::default_backup_root())
            .context("failed to initialize backup session")?;
        reporter.success(&format!(
            "backup directory created: {}",
            session.dir().display()
        ));
        Some(session)
    };

    let ctx = ApplyContext {
        profile: &profile,
        distro: &distro,
        session: session.as_ref(),
        reporter: &reporter,
        online,
    };

    // strictly sequential; one failed surface never blocks the rest
    let mut reboot_required = false;
    for tuner in &tuners {
        match tuner.apply(&ctx) {
            Ok(Outcome::Applied) if tuner.requires_reboot() => reboot_required = true,
            Ok(_) => {}
            Err(err) => reporter.error(&format!("{} failed: {:#}", tuner.name(), err)),
        }
    }

    println!();
    if flags.dry_run {
        reporter.info("DRY RUN completed - no changes were made");
        reporter.info("run without --dry-run to apply changes");
    } else {
        reporter.success("tuning complete");
        if let Some(session) = &session {
            reporter.info(&format!(
                "backups available in {}",
                session.dir().display()
            ));
        }
        if reboot_required {
            reporter.warning("IMPORTANT: a reboot is required for boot parameter changes");
        }
    }
    Ok(())
}

fn all_surfaces() -> Vec<Box<dyn Tuner>> {
    let distro = Distro::detect().unwrap_or_else(|_| Distro::unknown());
    vec![
        Box::new(GrubTuner::new(&distro)),
        Box::new(SysctlTuner::new()),
        Box::new(FstabTuner::new()),
        Box::new(SchedulerTuner::new()),
        Box::new(NetworkTuner::new()),
        Box::new(VmToolsTuner::new()),
    ]
}

fn show_config() -> Result<()> {
    banner();
    let reporter = ConsoleReporter;
    reporter.info("current system configuration");

    for tuner in all_surfaces() {
        if let Err(err) = tuner.show(&reporter) {
            reporter.warning(&format!("could not show {}: {:#}", tuner.name(), err));
        }
    }

    if let Err(err) = check_packet_drops(&reporter) {
        reporter.warning(&format!("could not check packet drops: {:#}", err));
    }
    Ok(())
}

fn verify_config() -> Result<()> {
    banner();
    let reporter = ConsoleReporter;
    reporter.step("Verifying tuning configuration");

    let mut all_good = true;
    for tuner in all_surfaces() {
        match tuner.verify(&reporter) {
            Ok(present) => all_good &= present,
            Err(err) => {
                reporter.warning(&format!("{}: {:#}", tuner.name(), err));
                all_good = false;
            }
        }
    }

    println!();
    if all_good {
        reporter.success("all tuning configurations are present");
    } else {
        reporter.warning("some tuning configurations are missing");
        reporter.info("run 'vm-tuner' to apply tuning");
    }
    Ok(())
}

fn restore(timestamp: Option<&str>) -> Result<()> {
    let reporter = ConsoleReporter;
    let root = backup::default_backup_root();

    let Some(timestamp) = timestamp else {
        let sessions = backup::list_sessions(&root)?;
        if sessions.is_empty() {
            reporter.warning("no backups found");
            return Ok(());
        }
        println!("Available backups:");
        for session in sessions {
            println!("  {}", session);
        }
        println!();
        println!("Run 'vm-tuner restore <timestamp>' to roll one back.");
        return Ok(());
    };

    host::check_root()?;
    reporter.step("Restore backup");

    let rollback = backup::resolve_rollback(&root, timestamp)
        .with_context(|| format!("no usable backup session '{}'", timestamp))?;
    rollback.execute(&reporter)?;
    Ok(())
}

fn expand_disk(yes: bool) -> Result<()> {
    let reporter = ConsoleReporter;
    reporter.step("Disk Expansion Assistant");

    host::check_root()?;

    reporter.warning("disk operations carry risk");
    reporter.warning("make sure you have a snapshot or backup before continuing");
    if !yes && !confirm("continue?") {
        reporter.info("operation cancelled");
        return Ok(());
    }

    let distro = Distro::detect().unwrap_or_else(|_| Distro::unknown());
    let online = host::check_connectivity();
    disk::expand_root(&distro, online, &reporter)
}

fn clean(yes: bool) -> Result<()> {
    let reporter = ConsoleReporter;

    host::check_root()?;

    reporter.info("this will clean the package cache, vacuum logs and remove rotated logs");
    if !yes && !confirm("continue?") {
        reporter.info("cancelled");
        return Ok(());
    }

    let distro = Distro::detect().unwrap_or_else(|_| Distro::unknown());
    clean_system(&distro, &reporter)
}
