use std::collections::{HashMap, HashSet};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::directory::{PeerAcceptor, PeerDirectory};
use crate::error::{Result, TransportError};
use crate::identifier::SharedIdentifier;
use crate::peer::{OpenMode, Peer};
use crate::stream::DuplexStream;

const SOCKET_EXTENSION: &str = "sock";

/// Peer directory backed by Unix domain sockets under a shared root.
///
/// Layout:
/// ```text
/// <root>/
///   <peer-name>/
///     <identifier>.sock   one listening socket per advertised identifier
/// ```
///
/// Every sub-directory of the root is a candidate peer; candidates are
/// enumerated in name order. The directory named after `local_name` is where
/// this process listens and is never offered as a candidate.
pub struct SocketDirectory {
    root: PathBuf,
    local_name: String,
    socket_mode: u32,
    advertised: Mutex<HashMap<String, HashSet<SharedIdentifier>>>,
    next_peer_id: Arc<AtomicU64>,
}

impl SocketDirectory {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(target_os = "macos")]
    const MAX_PATH_LEN: usize = 104;
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    const MAX_PATH_LEN: usize = 104;

    /// Create a directory rooted at `root`, publishing as `local_name`.
    pub fn new(root: impl AsRef<Path>, local_name: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            local_name: local_name.into(),
            socket_mode: Self::DEFAULT_SOCKET_MODE,
            advertised: Mutex::new(HashMap::new()),
            next_peer_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Override the permission mode of listening sockets.
    pub fn with_socket_mode(mut self, mode: u32) -> Self {
        self.socket_mode = mode;
        self
    }

    /// The shared root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The name this process listens under.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Socket path used by `peer_name` for `identifier`.
    pub fn socket_path(&self, peer_name: &str, identifier: &SharedIdentifier) -> PathBuf {
        self.root
            .join(peer_name)
            .join(format!("{identifier}.{SOCKET_EXTENSION}"))
    }

    fn peer_dir(&self, peer: &Peer) -> PathBuf {
        self.root.join(peer.name())
    }

    fn check_path_len(path: &Path) -> Result<()> {
        let len = path.as_os_str().len();
        if len >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path: path.to_path_buf(),
                len,
                max: Self::MAX_PATH_LEN,
            });
        }
        Ok(())
    }

    fn advertised(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashSet<SharedIdentifier>>> {
        self.advertised
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PeerDirectory for SocketDirectory {
    fn list_candidates(&self) -> Result<Vec<Peer>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut peers = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name == self.local_name {
                continue;
            }
            peers.push(Peer::new(name, entry.path().display().to_string()));
        }
        peers.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(peers)
    }

    fn refresh(&self, peer: &Peer) -> Result<()> {
        let dir = self.peer_dir(peer);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.advertised().remove(peer.name());
                return Err(TransportError::UnknownPeer(peer.name().to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let mut identifiers = HashSet::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SOCKET_EXTENSION) {
                continue;
            }
            if !entry.file_type()?.is_socket() {
                continue;
            }
            let parsed = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<SharedIdentifier>().ok());
            if let Some(identifier) = parsed {
                identifiers.insert(identifier);
            }
        }

        debug!(peer = %peer, count = identifiers.len(), "refreshed advertised identifiers");
        self.advertised()
            .insert(peer.name().to_string(), identifiers);
        Ok(())
    }

    fn resolve(&self, peer: &Peer) -> Result<HashSet<SharedIdentifier>> {
        Ok(self.advertised().get(peer.name()).cloned().unwrap_or_default())
    }

    fn open(
        &self,
        peer: &Peer,
        identifier: &SharedIdentifier,
        mode: OpenMode,
    ) -> Result<DuplexStream> {
        let path = self.socket_path(peer.name(), identifier);
        Self::check_path_len(&path)?;

        let stream = UnixStream::connect(&path).map_err(|e| TransportError::Connect {
            path: path.clone(),
            source: e,
        })?;
        let stream = DuplexStream::from(stream);

        if mode == OpenMode::Verified {
            verify_same_user(&stream)?;
        }

        debug!(?path, %mode, "connected to peer socket");
        Ok(stream)
    }

    fn listen(&self, identifier: &SharedIdentifier) -> Result<Box<dyn PeerAcceptor>> {
        let path = self.socket_path(&self.local_name, identifier);
        Self::check_path_len(&path)?;
        let dir = self.root.join(&self.local_name);
        std::fs::create_dir_all(&dir).map_err(|e| TransportError::Bind {
            path: dir.clone(),
            source: e,
        })?;
        let acceptor = SocketAcceptor::bind_with_mode(
            path,
            self.socket_mode,
            Arc::clone(&self.next_peer_id),
        )?;
        Ok(Box::new(acceptor))
    }
}

fn verify_same_user(stream: &DuplexStream) -> Result<()> {
    let Some((uid, _gid, pid)) = stream.peer_credentials() else {
        return Err(TransportError::CredentialsRejected(
            "peer credentials unavailable".to_string(),
        ));
    };
    // SAFETY: geteuid has no preconditions and cannot fail.
    let own = unsafe { libc::geteuid() };
    if uid != own {
        return Err(TransportError::CredentialsRejected(format!(
            "peer pid {pid} runs as uid {uid}, expected {own}"
        )));
    }
    Ok(())
}

/// Listening socket for one identifier.
///
/// The socket file is removed on drop, unless something else has replaced it
/// in the meantime.
pub struct SocketAcceptor {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
    closed: AtomicBool,
    next_peer_id: Arc<AtomicU64>,
}

impl SocketAcceptor {
    /// Bind and listen on `path` with an explicit permission mode.
    ///
    /// An existing socket at `path` is treated as stale and removed; any other
    /// kind of file is refused.
    pub fn bind_with_mode(
        path: impl AsRef<Path>,
        mode: u32,
        next_peer_id: Arc<AtomicU64>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        SocketDirectory::check_path_len(&path)?;

        // Remove stale socket if it exists, but never remove non-socket files.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| TransportError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(TransportError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            TransportError::Bind {
                path: path.clone(),
                source: e,
            }
        })?;
        let created_metadata =
            std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
        let created_inode = Some((created_metadata.dev(), created_metadata.ino()));

        info!(?path, "listening for peers");

        Ok(Self {
            listener,
            path,
            created_inode,
            closed: AtomicBool::new(false),
            next_peer_id,
        })
    }

    /// The path this acceptor is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PeerAcceptor for SocketAcceptor {
    fn accept(&self) -> Result<(DuplexStream, Peer)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        let peer = Peer::new(format!("peer-{id}"), self.path.display().to_string());
        debug!(peer = %peer, "accepted connection");
        Ok((DuplexStream::from(stream), peer))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // A blocking accept only returns on an inbound connection; poke it.
        if let Err(err) = UnixStream::connect(&self.path) {
            debug!(path = ?self.path, error = %err, "wake-up connect failed");
        }
        debug!(path = ?self.path, "acceptor closed");
    }
}

impl Drop for SocketAcceptor {
    fn drop(&mut self) {
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}
