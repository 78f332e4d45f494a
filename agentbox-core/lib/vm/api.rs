//! Client for the hypervisor's control API.
//!
//! The hypervisor exposes HTTP request/response semantics over a
//! filesystem-scoped Unix socket; nothing here is network-routable. Any
//! response status of 400 or above is classified as an API error, and the
//! caller decides whether that is fatal to the current command: it is for
//! every configuration call, while the guest shutdown signal is best-effort.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Method;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use hyperlocal::UnixConnector;
use serde::Serialize;

use crate::config::{MachineResources, NetworkLink, GUEST_IFACE_ID, ROOT_DRIVE_ID};
use crate::vm::payload::{
    Action, BootSource, Drive, MachineConfig, MemBackend, NetworkInterface, SnapshotCreate,
    SnapshotLoad, VmState,
};
use crate::vm::SnapshotPair;
use crate::{AgentboxError, AgentboxResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

type UnixClient = Client<UnixConnector, Full<Bytes>>;

/// The configuration and action requests the lifecycle machine issues
/// against a live hypervisor.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Configures the kernel image and boot arguments. Must precede
    /// machine-config and instance-start.
    async fn put_boot_source(&self, kernel_image: &Path, boot_args: &str) -> AgentboxResult<()>;

    /// Attaches the root filesystem drive. Must precede machine-config and
    /// instance-start.
    async fn put_root_drive(&self, rootfs_image: &Path) -> AgentboxResult<()>;

    /// Attaches the guest network interface backed by the host tap device.
    async fn put_network_interface(&self, link: &NetworkLink) -> AgentboxResult<()>;

    /// Sets vCPU count and memory size.
    async fn put_machine_config(&self, resources: &MachineResources) -> AgentboxResult<()>;

    /// Boots the configured VM.
    async fn start_instance(&self) -> AgentboxResult<()>;

    /// Pauses the running VM.
    async fn pause_vm(&self) -> AgentboxResult<()>;

    /// Resumes a paused or freshly snapshot-loaded VM.
    async fn resume_vm(&self) -> AgentboxResult<()>;

    /// Writes a full snapshot of the paused VM to the pair's paths.
    async fn create_snapshot(&self, pair: &SnapshotPair) -> AgentboxResult<()>;

    /// Loads a snapshot pair into the freshly launched hypervisor, without
    /// resuming; the caller issues [`ControlPlane::resume_vm`] separately.
    async fn load_snapshot(&self, pair: &SnapshotPair) -> AgentboxResult<()>;

    /// Asks the guest to shut down. Best-effort: callers ignore failures
    /// since an unresponsive guest is exactly the case the forced-kill
    /// escalation exists for.
    async fn send_ctrl_alt_del(&self) -> AgentboxResult<()>;
}

/// [`ControlPlane`] implementation over the hypervisor's API socket.
pub struct FirecrackerApi {
    client: UnixClient,
    socket_path: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FirecrackerApi {
    /// Creates a client for the API socket at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(UnixConnector);
        Self {
            client,
            socket_path: socket_path.into(),
        }
    }

    /// Sends one request and classifies the response.
    ///
    /// Transport failures (socket absent, connection refused) surface as
    /// [`AgentboxError::ControlPlaneUnreachable`]; any response status of
    /// 400 or above becomes [`AgentboxError::Api`] carrying the body.
    async fn request<T: Serialize>(
        &self,
        method: Method,
        endpoint: &str,
        body: &T,
    ) -> AgentboxResult<()> {
        let uri: hyper::Uri = hyperlocal::Uri::new(&self.socket_path, endpoint).into();
        let json = serde_json::to_string(body)?;

        let request = hyper::Request::builder()
            .method(method)
            .uri(uri)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(json)))
            .map_err(|e| AgentboxError::ControlPlaneUnreachable(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| AgentboxError::ControlPlaneUnreachable(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = BodyExt::collect(response.into_body())
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_default();

            return Err(AgentboxError::Api {
                status,
                endpoint: endpoint.to_string(),
                message: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ControlPlane for FirecrackerApi {
    async fn put_boot_source(&self, kernel_image: &Path, boot_args: &str) -> AgentboxResult<()> {
        self.request(
            Method::PUT,
            "/boot-source",
            &BootSource {
                kernel_image_path: kernel_image.display().to_string(),
                boot_args: boot_args.to_string(),
            },
        )
        .await
    }

    async fn put_root_drive(&self, rootfs_image: &Path) -> AgentboxResult<()> {
        let endpoint = format!("/drives/{}", ROOT_DRIVE_ID);
        self.request(
            Method::PUT,
            &endpoint,
            &Drive {
                drive_id: ROOT_DRIVE_ID.to_string(),
                path_on_host: rootfs_image.display().to_string(),
                is_root_device: true,
                is_read_only: false,
            },
        )
        .await
    }

    async fn put_network_interface(&self, link: &NetworkLink) -> AgentboxResult<()> {
        let endpoint = format!("/network-interfaces/{}", GUEST_IFACE_ID);
        self.request(
            Method::PUT,
            &endpoint,
            &NetworkInterface {
                iface_id: GUEST_IFACE_ID.to_string(),
                guest_mac: link.get_mac().clone(),
                host_dev_name: link.get_device().clone(),
            },
        )
        .await
    }

    async fn put_machine_config(&self, resources: &MachineResources) -> AgentboxResult<()> {
        self.request(
            Method::PUT,
            "/machine-config",
            &MachineConfig {
                vcpu_count: *resources.get_vcpus(),
                mem_size_mib: *resources.get_memory_mib(),
                smt: false,
            },
        )
        .await
    }

    async fn start_instance(&self) -> AgentboxResult<()> {
        self.request(
            Method::PUT,
            "/actions",
            &Action {
                action_type: "InstanceStart".to_string(),
            },
        )
        .await
    }

    async fn pause_vm(&self) -> AgentboxResult<()> {
        self.request(
            Method::PATCH,
            "/vm",
            &VmState {
                state: "Paused".to_string(),
            },
        )
        .await
    }

    async fn resume_vm(&self) -> AgentboxResult<()> {
        self.request(
            Method::PATCH,
            "/vm",
            &VmState {
                state: "Resumed".to_string(),
            },
        )
        .await
    }

    async fn create_snapshot(&self, pair: &SnapshotPair) -> AgentboxResult<()> {
        self.request(
            Method::PUT,
            "/snapshot/create",
            &SnapshotCreate {
                snapshot_type: "Full".to_string(),
                snapshot_path: pair.state_file().display().to_string(),
                mem_file_path: pair.mem_file().display().to_string(),
            },
        )
        .await
    }

    async fn load_snapshot(&self, pair: &SnapshotPair) -> AgentboxResult<()> {
        self.request(
            Method::PUT,
            "/snapshot/load",
            &SnapshotLoad {
                snapshot_path: pair.state_file().display().to_string(),
                mem_backend: MemBackend {
                    backend_type: "File".to_string(),
                    backend_path: pair.mem_file().display().to_string(),
                },
                resume_vm: false,
            },
        )
        .await
    }

    async fn send_ctrl_alt_del(&self) -> AgentboxResult<()> {
        self.request(
            Method::PUT,
            "/actions",
            &Action {
                action_type: "SendCtrlAltDel".to_string(),
            },
        )
        .await
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    /// Accepts one connection on `listener`, consumes the request, and
    /// answers with the canned status line and body.
    async fn serve_once(listener: UnixListener, status_line: &'static str, body: &'static str) {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut buf = vec![0u8; 16384];
        let mut total = 0;
        loop {
            let n = stream.read(&mut buf[total..]).await.unwrap();
            total += n;
            let text = String::from_utf8_lossy(&buf[..total]).to_ascii_lowercase();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if total - (header_end + 4) >= content_length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_success_status_is_ok() {
        let temp = tempfile::tempdir().unwrap();
        let socket = temp.path().join("api.socket");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = tokio::spawn(serve_once(listener, "204 No Content", ""));

        let api = FirecrackerApi::new(&socket);
        api.start_instance().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_classified_as_api_error() {
        let temp = tempfile::tempdir().unwrap();
        let socket = temp.path().join("api.socket");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            "400 Bad Request",
            "{\"fault_message\":\"boot source not configured\"}",
        ));

        let api = FirecrackerApi::new(&socket);
        let err = api.start_instance().await.unwrap_err();
        match err {
            AgentboxError::Api {
                status,
                endpoint,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(endpoint, "/actions");
                assert!(message.contains("boot source not configured"));
            }
            other => panic!("expected Api error, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_socket_is_unreachable() {
        let temp = tempfile::tempdir().unwrap();
        let api = FirecrackerApi::new(temp.path().join("absent.socket"));
        let err = api.pause_vm().await.unwrap_err();
        assert!(matches!(err, AgentboxError::ControlPlaneUnreachable(_)));
    }
}
