use std::fs;
use std::path::{Path, PathBuf};

use oci_spec::runtime::{LinuxNamespaceType, Spec};

use super::builder::ContainerBuilder;
use super::builder_impl::ContainerBuilderImpl;
use super::lock::ContainerLock;
use super::{Container, ContainerStatus};
use crate::apparmor;
use crate::config::BurrowConfig;
use crate::error::{ErrInvalidSpec, LibcontainerError, MissingSpecError};
use crate::user_ns::UserNamespaceConfig;

// Builder that can be used to configure the properties of a new container
pub struct InitContainerBuilder {
    base: ContainerBuilder,
    bundle: PathBuf,
}

impl InitContainerBuilder {
    /// Generates the base configuration for a new container from which
    /// configuration methods can be chained
    pub(super) fn new(builder: ContainerBuilder, bundle: PathBuf) -> Self {
        Self {
            base: builder,
            bundle,
        }
    }

    /// Creates a new container. Returns once the container process has
    /// reported `ready` and the state is persisted as `Created`.
    pub fn build(self) -> Result<Container, LibcontainerError> {
        self.create(false)
    }

    /// Creates the container and starts it without releasing the container
    /// lock in between, so no other command observes it as `Created`.
    pub fn run(self) -> Result<Container, LibcontainerError> {
        self.create(true)
    }

    fn create(self, start: bool) -> Result<Container, LibcontainerError> {
        let base = self.base.validate_id()?;
        let bundle = fs::canonicalize(&self.bundle).map_err(|err| {
            tracing::error!(bundle = ?self.bundle, %err, "failed to resolve bundle");
            LibcontainerError::InvalidInput(format!("bundle {:?}: {err}", self.bundle))
        })?;
        let spec = Self::load_spec(&bundle)?;
        Self::validate_spec(&spec, base.console_socket.is_some())?;
        let user_ns_config = UserNamespaceConfig::new(&spec)?;

        let container_dir = Self::create_container_dir(&base)?;
        let _lock = match ContainerLock::acquire(&container_dir) {
            Ok(lock) => lock,
            Err(err) => {
                let _ = fs::remove_dir_all(&container_dir);
                return Err(err.into());
            }
        };

        let mut container = Container::new(
            &base.container_id,
            ContainerStatus::Creating,
            None,
            &bundle,
            &container_dir,
        );
        container.state.oci_version = spec.version().clone();
        container.state.annotations = spec.annotations().clone().unwrap_or_default();

        let reexec_args = base.reexec_args();
        ContainerBuilderImpl {
            syscall: base.syscall,
            spec: &spec,
            container: &mut container,
            config: BurrowConfig::from_spec(&spec),
            pid_file: base.pid_file,
            console_socket: base.console_socket,
            user_ns_config,
            reexec_args,
        }
        .create()?;

        if start {
            container.start_locked()?;
        }
        Ok(container)
    }

    fn create_container_dir(base: &ContainerBuilder) -> Result<PathBuf, LibcontainerError> {
        let container_dir = base.root_path.join(&base.container_id);
        tracing::debug!(?container_dir, "container directory");

        fs::create_dir_all(&base.root_path).map_err(|err| {
            tracing::error!(root = ?base.root_path, %err, "failed to create root directory");
            LibcontainerError::OtherIO(err)
        })?;
        match fs::create_dir(&container_dir) {
            Ok(()) => Ok(container_dir),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::error!(id = base.container_id, dir = ?container_dir, "container already exists");
                Err(LibcontainerError::Exist)
            }
            Err(err) => {
                tracing::error!(?container_dir, %err, "failed to create container directory");
                Err(LibcontainerError::OtherIO(err))
            }
        }
    }

    fn load_spec(bundle: &Path) -> Result<Spec, LibcontainerError> {
        let mut spec = Spec::load(bundle.join("config.json"))?;
        spec.canonicalize_rootfs(bundle).map_err(|err| {
            tracing::error!(?bundle, %err, "failed to canonicalize rootfs");
            err
        })?;
        Ok(spec)
    }

    fn validate_spec(spec: &Spec, has_console_socket: bool) -> Result<(), LibcontainerError> {
        let version = spec.version();
        if !version.starts_with("1.") {
            tracing::error!(
                "runtime spec has incompatible version '{}'. Only 1.X.Y is supported",
                version
            );
            Err(ErrInvalidSpec::UnsupportedVersion)?;
        }

        let linux = spec.linux().as_ref().ok_or(MissingSpecError::Linux)?;
        let has_mount_ns = linux
            .namespaces()
            .iter()
            .flatten()
            .any(|ns| ns.typ() == LinuxNamespaceType::Mount);
        if !has_mount_ns {
            return Err(LibcontainerError::InvalidInput(
                "a mount namespace is required".to_string(),
            ));
        }

        if cfg!(not(feature = "libseccomp")) && linux.seccomp().is_some() {
            Err(ErrInvalidSpec::SeccompUnsupported)?;
        }

        if let Some(process) = spec.process() {
            if process.terminal().unwrap_or(false) && !has_console_socket {
                Err(ErrInvalidSpec::ConsoleSocketRequired)?;
            }

            if let Some(profile) = process.apparmor_profile() {
                let apparmor_is_enabled = apparmor::is_enabled().map_err(|err| {
                    tracing::error!(?err, "failed to check if apparmor is enabled");
                    LibcontainerError::OtherIO(err)
                })?;
                if !apparmor_is_enabled {
                    tracing::error!(?profile,
                        "apparmor profile exists in the spec, but apparmor is not activated on this system");
                    Err(ErrInvalidSpec::AppArmorNotEnabled)?;
                }
            }

            if let Some(io_priority) = process.io_priority() {
                let priority = io_priority.priority();
                if !(0..=7).contains(&priority) {
                    tracing::error!(priority, "io priority not between 0 and 7 (inclusive)");
                    Err(ErrInvalidSpec::IoPriority)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use oci_spec::runtime::{
        LinuxBuilder, LinuxIOPriorityBuilder, LinuxNamespaceBuilder, ProcessBuilder, RootBuilder,
        SpecBuilder,
    };

    use super::*;
    use crate::syscall::syscall::SyscallType;

    fn mount_ns_linux() -> Result<oci_spec::runtime::Linux> {
        Ok(LinuxBuilder::default()
            .namespaces(vec![LinuxNamespaceBuilder::default()
                .typ(LinuxNamespaceType::Mount)
                .build()?])
            .build()?)
    }

    fn bundle_with(spec: &Spec) -> Result<tempfile::TempDir> {
        let bundle = tempfile::tempdir()?;
        fs::create_dir(bundle.path().join("rootfs"))?;
        spec.save(bundle.path().join("config.json"))?;
        Ok(bundle)
    }

    fn build(bundle: &Path, root: &Path) -> Result<Container, LibcontainerError> {
        ContainerBuilder::new("c1".to_owned(), SyscallType::default())
            .with_root_path(root)?
            .as_init(bundle)
            .build()
    }

    #[test]
    fn test_validate_spec_version() -> Result<()> {
        let spec = SpecBuilder::default()
            .version("0.9.0")
            .linux(mount_ns_linux()?)
            .build()?;
        assert!(matches!(
            InitContainerBuilder::validate_spec(&spec, false),
            Err(LibcontainerError::InvalidSpec(
                ErrInvalidSpec::UnsupportedVersion
            ))
        ));
        Ok(())
    }

    #[test]
    fn test_validate_spec_requires_mount_namespace() -> Result<()> {
        let spec = SpecBuilder::default()
            .linux(LinuxBuilder::default().namespaces(vec![]).build()?)
            .build()?;
        assert!(matches!(
            InitContainerBuilder::validate_spec(&spec, false),
            Err(LibcontainerError::InvalidInput(_))
        ));
        Ok(())
    }

    #[test]
    fn test_validate_spec_terminal_needs_console_socket() -> Result<()> {
        let spec = SpecBuilder::default()
            .process(ProcessBuilder::default().terminal(true).build()?)
            .linux(mount_ns_linux()?)
            .build()?;
        assert!(matches!(
            InitContainerBuilder::validate_spec(&spec, false),
            Err(LibcontainerError::InvalidSpec(
                ErrInvalidSpec::ConsoleSocketRequired
            ))
        ));
        assert!(InitContainerBuilder::validate_spec(&spec, true).is_ok());
        Ok(())
    }

    #[test]
    fn test_validate_spec_io_priority_range() -> Result<()> {
        let spec = SpecBuilder::default()
            .process(
                ProcessBuilder::default()
                    .io_priority(
                        LinuxIOPriorityBuilder::default()
                            .class(oci_spec::runtime::IOPriorityClass::IoprioClassBe)
                            .priority(8)
                            .build()?,
                    )
                    .build()?,
            )
            .linux(mount_ns_linux()?)
            .build()?;
        assert!(matches!(
            InitContainerBuilder::validate_spec(&spec, false),
            Err(LibcontainerError::InvalidSpec(ErrInvalidSpec::IoPriority))
        ));
        Ok(())
    }

    #[test]
    fn test_build_rejects_existing_container() -> Result<()> {
        let spec = SpecBuilder::default()
            .root(RootBuilder::default().path("rootfs").build()?)
            .linux(mount_ns_linux()?)
            .build()?;
        let bundle = bundle_with(&spec)?;
        let root = tempfile::tempdir()?;
        fs::create_dir(root.path().join("c1"))?;
        fs::write(root.path().join("c1").join("marker"), "keep")?;

        assert!(matches!(
            build(bundle.path(), root.path()),
            Err(LibcontainerError::Exist)
        ));
        assert!(root.path().join("c1").join("marker").exists());
        Ok(())
    }

    #[test]
    fn test_invalid_spec_leaves_no_state() -> Result<()> {
        let spec = SpecBuilder::default()
            .root(RootBuilder::default().path("rootfs").build()?)
            .linux(LinuxBuilder::default().namespaces(vec![]).build()?)
            .build()?;
        let bundle = bundle_with(&spec)?;
        let root = tempfile::tempdir()?;

        assert!(build(bundle.path(), root.path()).is_err());
        assert!(!root.path().join("c1").exists());
        Ok(())
    }

    #[test]
    fn test_missing_bundle_is_rejected() -> Result<()> {
        let root = tempfile::tempdir()?;
        let missing = root.path().join("no-bundle");
        assert!(matches!(
            build(&missing, root.path()),
            Err(LibcontainerError::InvalidInput(_))
        ));
        assert!(!root.path().join("c1").exists());
        Ok(())
    }

    #[test]
    fn test_run_rejects_existing_container() -> Result<()> {
        let spec = SpecBuilder::default()
            .root(RootBuilder::default().path("rootfs").build()?)
            .linux(mount_ns_linux()?)
            .build()?;
        let bundle = bundle_with(&spec)?;
        let root = tempfile::tempdir()?;
        fs::create_dir(root.path().join("c1"))?;

        let res = ContainerBuilder::new("c1".to_owned(), SyscallType::default())
            .with_root_path(root.path())?
            .as_init(bundle.path())
            .run();
        assert!(matches!(res, Err(LibcontainerError::Exist)));
        Ok(())
    }
}
