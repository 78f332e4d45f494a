//! Asset provisioning for the sandbox VM.
//!
//! Ensures the hypervisor executable, guest kernel, and root filesystem
//! image exist locally and are well-formed. Safe to call on every startup:
//! when all assets verify, no network I/O happens. Assets are fetched
//! through a retrying HTTP client, streamed to a `.partial` name, and only
//! renamed into place on completion, so an interrupted download is detected
//! and re-fetched on the next run instead of booting a corrupt image.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use getset::Getters;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use nix::unistd::AccessFlags;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use tokio::io::AsyncWriteExt;

#[cfg(feature = "cli")]
use agentbox_utils::term::MULTI_PROGRESS;
use agentbox_utils::{
    resolve_env_url, FIRECRACKER_URL_ENV_VAR, KERNEL_URL_ENV_VAR, ROOTFS_URL_ENV_VAR,
};

use crate::config::{
    SandboxLayout, DEFAULT_FIRECRACKER_URL, DEFAULT_KERNEL_URL, DEFAULT_ROOTFS_URL,
    DOWNLOAD_MAX_RETRIES, FIRECRACKER_ARCHIVE_PREFIX, KVM_DEVICE_PATH,
};
use crate::{AgentboxError, AgentboxResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The verified local assets the hypervisor boots from. Treated as
/// immutable once returned.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct AssetSet {
    /// The hypervisor executable.
    firecracker_bin: PathBuf,

    /// The guest kernel image.
    kernel_image: PathBuf,

    /// The guest root filesystem image.
    rootfs_image: PathBuf,
}

impl AssetSet {
    /// Creates an asset set from already-verified paths.
    pub fn new(
        firecracker_bin: impl Into<PathBuf>,
        kernel_image: impl Into<PathBuf>,
        rootfs_image: impl Into<PathBuf>,
    ) -> Self {
        Self {
            firecracker_bin: firecracker_bin.into(),
            kernel_image: kernel_image.into(),
            rootfs_image: rootfs_image.into(),
        }
    }
}

/// Ensures the sandbox VM's assets exist locally and are usable.
#[async_trait]
pub trait AssetProvisioner: Send + Sync {
    /// Verifies (and if necessary fetches) all assets, returning their
    /// locations. Idempotent.
    async fn ensure_assets(&self) -> AgentboxResult<AssetSet>;
}

/// [`AssetProvisioner`] implementation that downloads missing assets over
/// HTTPS with transient-failure retries.
pub struct HttpAssetProvisioner {
    layout: SandboxLayout,
    client: ClientWithMiddleware,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HttpAssetProvisioner {
    /// Creates a provisioner for the given working-directory layout.
    pub fn new(layout: SandboxLayout) -> Self {
        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DOWNLOAD_MAX_RETRIES);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self { layout, client }
    }

    /// Fetches `url` into `dest`, streaming through a `.partial` temp name.
    async fn fetch_file(&self, url: &str, dest: &Path, label: &str) -> AgentboxResult<()> {
        tracing::info!("fetching {} from {}", label, url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AgentboxError::Download(format!("GET {}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| AgentboxError::Download(format!("GET {}: {}", url, e)))?;

        #[cfg(feature = "cli")]
        let progress = {
            let bar = MULTI_PROGRESS.add(ProgressBar::new(
                response.content_length().unwrap_or(0),
            ));
            bar.set_style(
                ProgressStyle::with_template("{msg:24} {bar:25} {bytes}/{total_bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_message(label.to_string());
            bar
        };

        let partial = partial_path(dest);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| AgentboxError::Download(format!("GET {}: {}", url, e)))?;
            file.write_all(&chunk).await?;

            #[cfg(feature = "cli")]
            progress.inc(chunk.len() as u64);
        }

        file.flush().await?;
        drop(file);

        // Only a complete download ever lands under the final name.
        tokio::fs::rename(&partial, dest).await?;

        #[cfg(feature = "cli")]
        progress.finish();

        Ok(())
    }

    /// Installs the hypervisor executable from its release archive.
    async fn ensure_firecracker(&self) -> AgentboxResult<()> {
        let bin = self.layout.firecracker_bin();

        if bin.is_dir() {
            tracing::warn!(
                "hypervisor path {} is a directory from a corrupt run, removing",
                bin.display()
            );
            tokio::fs::remove_dir_all(&bin).await?;
        }

        if !needs_refetch(&bin) {
            return Ok(());
        }

        let url = resolve_env_url(FIRECRACKER_URL_ENV_VAR, DEFAULT_FIRECRACKER_URL);
        let staging = tempfile::tempdir()?;
        let archive_path = staging.path().join("firecracker.tgz");
        self.fetch_file(&url, &archive_path, "hypervisor archive")
            .await?;

        let unpack_dir = staging.path().join("unpacked");
        let archive_for_task = archive_path.clone();
        let unpack_for_task = unpack_dir.clone();
        tokio::task::spawn_blocking(move || unpack_archive(&archive_for_task, &unpack_for_task))
            .await
            .map_err(|e| AgentboxError::Download(format!("archive extraction failed: {}", e)))??;

        let executable = find_archive_executable(&unpack_dir).ok_or_else(|| {
            AgentboxError::Download(format!(
                "no {}* executable found in archive {}",
                FIRECRACKER_ARCHIVE_PREFIX, url
            ))
        })?;

        tokio::fs::copy(&executable, &bin).await?;
        let mut permissions = tokio::fs::metadata(&bin).await?.permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut permissions, 0o755);
        tokio::fs::set_permissions(&bin, permissions).await?;

        tracing::info!("installed hypervisor at {}", bin.display());
        Ok(())
    }
}

#[async_trait]
impl AssetProvisioner for HttpAssetProvisioner {
    async fn ensure_assets(&self) -> AgentboxResult<AssetSet> {
        verify_virtualization()?;

        tokio::fs::create_dir_all(self.layout.assets_dir()).await?;

        self.ensure_firecracker().await?;

        let kernel = self.layout.kernel_image();
        if needs_refetch(&kernel) {
            let url = resolve_env_url(KERNEL_URL_ENV_VAR, DEFAULT_KERNEL_URL);
            self.fetch_file(&url, &kernel, "kernel image").await?;
        }

        let rootfs = self.layout.rootfs_image();
        if needs_refetch(&rootfs) {
            let url = resolve_env_url(ROOTFS_URL_ENV_VAR, DEFAULT_ROOTFS_URL);
            self.fetch_file(&url, &rootfs, "root filesystem").await?;
        }

        Ok(AssetSet {
            firecracker_bin: self.layout.firecracker_bin(),
            kernel_image: kernel,
            rootfs_image: rootfs,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Whether the asset at `path` must be (re-)fetched: missing, not a regular
/// file, or zero-length from an interrupted prior download.
fn needs_refetch(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => !meta.is_file() || meta.len() == 0,
        Err(_) => true,
    }
}

/// The temporary name a download streams into before its final rename.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dest.with_file_name(name)
}

/// Unpacks a gzipped tar archive into `dest`. Blocking; run on a blocking
/// task.
fn unpack_archive(archive: &Path, dest: &Path) -> AgentboxResult<()> {
    let file = std::fs::File::open(archive)?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    archive.unpack(dest)?;
    Ok(())
}

/// Locates the hypervisor executable inside an unpacked release archive by
/// its file name prefix, skipping debug-symbol siblings.
fn find_archive_executable(unpack_dir: &Path) -> Option<PathBuf> {
    walkdir::WalkDir::new(unpack_dir)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| {
            let name = entry.file_name().to_string_lossy();
            entry.file_type().is_file()
                && name.starts_with(FIRECRACKER_ARCHIVE_PREFIX)
                && !name.ends_with(".debug")
        })
        .map(|entry| entry.into_path())
}

/// Fails unless the hardware virtualization device is writable.
fn verify_virtualization() -> AgentboxResult<()> {
    nix::unistd::access(KVM_DEVICE_PATH, AccessFlags::W_OK).map_err(|e| {
        AgentboxError::Verification(format!("{} is not writable: {}", KVM_DEVICE_PATH, e))
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
