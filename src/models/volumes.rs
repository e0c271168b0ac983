//! Volumes that can be bound into a task's container
//!
//! Grounded in `thorium::models::volumes`: a volume is either a host-bind (a path on the node
//! mounted straight into the container) or a named driver volume carrying driver-specific
//! options, the way Thorium's `Volume` carries `host_path`/`config_map`/`secret`/`nfs` variants.
//! Scale only needs the host-bind and generic-driver shapes; the "nfs" driver is the one whose
//! options are spelled out explicitly because workspace resolution (§4.5 step 4) depends on its
//! `share` option.

use std::collections::BTreeMap;

use std::fmt;

/// Where a volume's backing storage actually lives
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeSource {
    /// A path on the host bind-mounted directly into the container
    HostPath {
        /// The path on the host
        host_path: String,
    },
    /// A named volume created and managed by a docker volume driver
    Driver {
        /// The name of the volume driver, e.g. `"local"` or `"nfs"`
        driver: String,
        /// Driver-specific options; the `"nfs"` driver carries a `"share"` option naming the
        /// exported share on the NFS server
        options: BTreeMap<String, String>,
    },
}

impl fmt::Display for VolumeSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VolumeSource::HostPath { .. } => write!(f, "host_path"),
            VolumeSource::Driver { driver, .. } => write!(f, "{driver}"),
        }
    }
}

/// A volume ready to be bound into a container
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    /// The name of this volume
    pub name: String,
    /// Where this volume should be mounted in the container
    pub mount_path: String,
    /// Whether this volume should be mounted read-only
    pub read_only: bool,
    /// Where this volume's storage actually lives
    pub source: VolumeSource,
}

impl Volume {
    /// Creates a host-bind volume
    ///
    /// # Arguments
    ///
    /// * `name` - The name of this volume
    /// * `mount_path` - Where this volume should be mounted in the container
    /// * `host_path` - The path on the host to bind in
    /// * `read_only` - Whether this volume should be mounted read-only
    pub fn host_path<N, M, H>(name: N, mount_path: M, host_path: H, read_only: bool) -> Self
    where
        N: Into<String>,
        M: Into<String>,
        H: Into<String>,
    {
        Volume {
            name: name.into(),
            mount_path: mount_path.into(),
            read_only,
            source: VolumeSource::HostPath {
                host_path: host_path.into(),
            },
        }
    }

    /// Creates a named NFS driver volume
    ///
    /// # Arguments
    ///
    /// * `name` - The name of this volume
    /// * `mount_path` - Where this volume should be mounted in the container
    /// * `share` - The exported share on the NFS server
    /// * `read_only` - Whether this volume should be mounted read-only
    pub fn nfs<N, M, S>(name: N, mount_path: M, share: S, read_only: bool) -> Self
    where
        N: Into<String>,
        M: Into<String>,
        S: Into<String>,
    {
        let mut options = BTreeMap::new();
        options.insert("share".to_owned(), share.into());
        Volume {
            name: name.into(),
            mount_path: mount_path.into(),
            read_only,
            source: VolumeSource::Driver {
                driver: "nfs".to_owned(),
                options,
            },
        }
    }

    /// Creates a named driver volume with arbitrary driver options
    ///
    /// # Arguments
    ///
    /// * `name` - The name of this volume
    /// * `mount_path` - Where this volume should be mounted in the container
    /// * `driver` - The name of the volume driver
    /// * `options` - Driver-specific options
    /// * `read_only` - Whether this volume should be mounted read-only
    pub fn driver<N, M, D>(
        name: N,
        mount_path: M,
        driver: D,
        options: BTreeMap<String, String>,
        read_only: bool,
    ) -> Self
    where
        N: Into<String>,
        M: Into<String>,
        D: Into<String>,
    {
        Volume {
            name: name.into(),
            mount_path: mount_path.into(),
            read_only,
            source: VolumeSource::Driver {
                driver: driver.into(),
                options,
            },
        }
    }
}

/// A mount declared by a job-type interface, resolved against the job-type's configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Mount {
    /// The name of the mount as declared in the interface
    pub name: String,
    /// Where this mount should appear in the container, once resolved
    pub mount_path: String,
    /// The resolved volume backing this mount; `None` until the launcher resolves it
    pub volume: Option<Volume>,
}

impl Mount {
    /// Creates a new, unresolved mount
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the mount as declared in the interface
    /// * `mount_path` - Where this mount should appear in the container
    pub fn new<N: Into<String>, M: Into<String>>(name: N, mount_path: M) -> Self {
        Mount {
            name: name.into(),
            mount_path: mount_path.into(),
            volume: None,
        }
    }
}
