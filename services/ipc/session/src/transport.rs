//! Platform transport binding: listeners, dialing, and the unified stream.
//!
//! A session talks to exactly one peer over either a TCP socket or, on
//! Unix platforms, a local domain socket at `/tmp/<name>.sock`. The
//! endpoint is resolved once from the configuration; everything above
//! this module works against [`IoStream`].

use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tracing::debug;

/// Resolved transport endpoint for one session
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// TCP: listen on `0.0.0.0:port`, dial `127.0.0.1:port`
    Tcp {
        /// Bind/dial port; `0` means OS-assigned (server only)
        port: u16,
    },
    /// Unix domain socket
    #[cfg(unix)]
    Unix {
        /// Socket file path
        path: PathBuf,
    },
}

impl Endpoint {
    /// Resolve the endpoint for a named session.
    ///
    /// On Unix a zero port selects the domain-socket transport; any
    /// explicit port (and every non-Unix platform) selects TCP.
    pub fn resolve(name: &str, port: u16) -> Self {
        #[cfg(unix)]
        if port == 0 {
            return Endpoint::Unix {
                path: socket_path(name),
            };
        }
        let _ = name;
        Endpoint::Tcp { port }
    }
}

/// Conventional socket file location for a named session
#[cfg(unix)]
pub fn socket_path(name: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/{name}.sock"))
}

/// Address a server binding ended up on
#[derive(Debug, Clone)]
pub enum BoundAddr {
    /// TCP listen address, with the OS-assigned port filled in
    Tcp(SocketAddr),
    /// Unix socket file path
    #[cfg(unix)]
    Unix(PathBuf),
}

impl BoundAddr {
    /// TCP address, if this binding is TCP
    pub fn tcp(&self) -> Option<SocketAddr> {
        match self {
            BoundAddr::Tcp(addr) => Some(*addr),
            #[cfg(unix)]
            BoundAddr::Unix(_) => None,
        }
    }
}

/// Server-side listener, bound once per session
#[derive(Debug)]
pub enum Binding {
    /// TCP listener
    Tcp(TcpListener),
    /// Unix socket listener; the path is kept for cleanup
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
}

impl Binding {
    /// Bind the endpoint.
    ///
    /// For Unix sockets a stale socket file from a previous run is
    /// removed first, and `unmask_permissions` opens the socket file
    /// mode so a controller under another uid can connect. It is a no-op
    /// for TCP.
    #[cfg_attr(not(unix), allow(unused_variables))]
    pub async fn bind(endpoint: &Endpoint, unmask_permissions: bool) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp { port } => {
                let listener = TcpListener::bind(("0.0.0.0", *port)).await?;
                debug!("bound tcp listener on {}", listener.local_addr()?);
                Ok(Binding::Tcp(listener))
            }
            #[cfg(unix)]
            Endpoint::Unix { path } => {
                remove_stale_socket(path)?;
                let listener = UnixListener::bind(path)?;
                if unmask_permissions {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))?;
                }
                debug!("bound unix listener at {}", path.display());
                Ok(Binding::Unix(listener, path.clone()))
            }
        }
    }

    /// Address the listener is bound to
    pub fn bound_addr(&self) -> io::Result<BoundAddr> {
        match self {
            Binding::Tcp(listener) => Ok(BoundAddr::Tcp(listener.local_addr()?)),
            #[cfg(unix)]
            Binding::Unix(_, path) => Ok(BoundAddr::Unix(path.clone())),
        }
    }

    /// Accept the next peer
    pub async fn accept(&self) -> io::Result<IoStream> {
        match self {
            Binding::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                debug!("accepted tcp peer {peer}");
                Ok(IoStream::Tcp(stream))
            }
            #[cfg(unix)]
            Binding::Unix(listener, _) => {
                let (stream, _) = listener.accept().await?;
                debug!("accepted unix peer");
                Ok(IoStream::Unix(stream))
            }
        }
    }
}

#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
impl Drop for Binding {
    fn drop(&mut self) {
        if let Binding::Unix(_, path) = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Dial the endpoint once
pub async fn dial(endpoint: &Endpoint) -> io::Result<IoStream> {
    match endpoint {
        Endpoint::Tcp { port } => Ok(IoStream::Tcp(
            TcpStream::connect(("127.0.0.1", *port)).await?,
        )),
        #[cfg(unix)]
        Endpoint::Unix { path } => Ok(IoStream::Unix(UnixStream::connect(path).await?)),
    }
}

/// Whether a dial failure means "no listener yet" and should be retried
/// without surfacing an error
pub fn is_transient_dial_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
    )
}

/// Unified duplex stream over the supported transports
#[derive(Debug)]
pub enum IoStream {
    /// TCP stream
    Tcp(TcpStream),
    /// Unix domain socket stream
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for IoStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IoStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            IoStream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IoStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        match self.get_mut() {
            IoStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            IoStream::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        match self.get_mut() {
            IoStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            IoStream::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        match self.get_mut() {
            IoStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            IoStream::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_bind_accept_dial() {
        let binding = Binding::bind(&Endpoint::Tcp { port: 0 }, false).await.unwrap();
        let addr = binding.bound_addr().unwrap().tcp().unwrap();

        let dialer = tokio::spawn(async move {
            dial(&Endpoint::Tcp { port: addr.port() }).await.unwrap()
        });

        let accepted = binding.accept().await.unwrap();
        assert!(matches!(accepted, IoStream::Tcp(_)));
        dialer.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_bind_accept_dial() {
        let name = format!("ipc-transport-test-{}", std::process::id());
        let endpoint = Endpoint::resolve(&name, 0);
        assert!(matches!(endpoint, Endpoint::Unix { .. }));

        let binding = Binding::bind(&endpoint, false).await.unwrap();

        let dial_endpoint = endpoint.clone();
        let dialer = tokio::spawn(async move { dial(&dial_endpoint).await.unwrap() });

        let accepted = binding.accept().await.unwrap();
        assert!(matches!(accepted, IoStream::Unix(_)));
        dialer.await.unwrap();

        // Socket file is removed when the binding drops.
        drop(binding);
        assert!(!socket_path(&name).exists());
    }

    #[tokio::test]
    async fn test_dial_refused_is_transient() {
        // Bind then drop to find a port with no listener.
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = dial(&Endpoint::Tcp { port }).await.unwrap_err();
        assert!(is_transient_dial_error(&err));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_socket_is_transient() {
        let endpoint = Endpoint::Unix {
            path: PathBuf::from("/tmp/ipc-transport-test-absent.sock"),
        };
        let err = dial(&endpoint).await.unwrap_err();
        assert!(is_transient_dial_error(&err));
    }
}
