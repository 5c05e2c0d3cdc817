//! Contains Functionality of `features` container command
use std::path::Path;

use anyhow::Result;
use caps::CapSet;
use libcontainer::rootfs::utils::KNOWN_MOUNT_OPTIONS;
use liboci_cli::Features;
use oci_spec::runtime::{
    version, ApparmorBuilder, CgroupBuilder, Features as FeaturesDocument, FeaturesBuilder,
    IDMapBuilder, IntelRdtBuilder, LinuxFeatureBuilder, LinuxNamespaceType,
    MountExtensionsBuilder, SeccompBuilder, SelinuxBuilder,
};

const KNOWN_HOOKS: &[&str] = &[
    "prestart",
    "createRuntime",
    "createContainer",
    "startContainer",
    "poststart",
    "poststop",
];

// Capabilities in the permitted set of the runtime itself
fn query_caps() -> Vec<String> {
    caps::all()
        .into_iter()
        .filter(|cap| caps::has_cap(None, CapSet::Permitted, *cap).unwrap_or(false))
        .map(|cap| cap.to_string())
        .collect()
}

fn query_supported_namespaces() -> Vec<LinuxNamespaceType> {
    [
        (LinuxNamespaceType::Pid, "pid"),
        (LinuxNamespaceType::Network, "net"),
        (LinuxNamespaceType::Uts, "uts"),
        (LinuxNamespaceType::Ipc, "ipc"),
        (LinuxNamespaceType::Mount, "mnt"),
        (LinuxNamespaceType::User, "user"),
        (LinuxNamespaceType::Cgroup, "cgroup"),
        (LinuxNamespaceType::Time, "time"),
    ]
    .into_iter()
    .filter(|(_, proc_name)| Path::new("/proc/self/ns").join(proc_name).exists())
    .map(|(ns, _)| ns)
    .collect()
}

fn features_document() -> Result<FeaturesDocument> {
    let linux = LinuxFeatureBuilder::default()
        .namespaces(query_supported_namespaces())
        .capabilities(query_caps())
        .cgroup(
            CgroupBuilder::default()
                .v1(true)
                .v2(true)
                // placement is always by path, never through a systemd unit
                .systemd(false)
                .systemd_user(false)
                .rdma(false)
                .build()?,
        )
        .seccomp(
            SeccompBuilder::default()
                .enabled(cfg!(feature = "libseccomp"))
                .build()?,
        )
        .apparmor(
            ApparmorBuilder::default()
                .enabled(libcontainer::apparmor::is_enabled().unwrap_or(false))
                .build()?,
        )
        .mount_extensions(
            MountExtensionsBuilder::default()
                .idmap(IDMapBuilder::default().enabled(false).build()?)
                .build()?,
        )
        .selinux(SelinuxBuilder::default().enabled(false).build()?)
        .intel_rdt(IntelRdtBuilder::default().enabled(false).build()?)
        .build()?;

    let features = FeaturesBuilder::default()
        .oci_version_max(version())
        .oci_version_min(String::from("1.0.0"))
        .hooks(KNOWN_HOOKS.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        .mount_options(
            KNOWN_MOUNT_OPTIONS
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
        )
        .linux(linux)
        .build()?;
    Ok(features)
}

/// Prints what this runtime build supports as JSON
pub fn features(_: Features) -> Result<()> {
    let features = features_document()?;
    println!("{}", serde_json::to_string_pretty(&features)?);
    Ok(())
}
