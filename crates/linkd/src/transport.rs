// # Socket Transport
//
// Serves the query surface over a Unix stream socket, one JSON object per
// line in each direction.
//
// ## Frames
//
// ```text
// → {"method":"GetLinkByName","name":"eth0"}
// ← {"reply":{"index":2,"path":"/org/freedesktop/network1/link/2"}}
//
// → {"method":"GetLinkByIndex","index":9}
// ← {"error":{"name":"org.freedesktop.network1.NoSuchLink","message":"Link 9 not known"}}
//
// → {"method":"Subscribe"}
// ← {"reply":{"subscribed":true}}
// ← {"signal":"PropertiesChanged","path":"/org/freedesktop/network1","changed":{...}}
// ```
//
// A line that fails to parse gets an error frame; the connection stays open.

use linkd_core::notify::{ObserverDispatcher, PropertiesChanged};
use linkd_core::query::{QueryError, QueryHandler};
use serde_json::{Value, json};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Method handled by the transport itself rather than the query handler
const SUBSCRIBE: &str = "Subscribe";

/// Listening socket plus everything a connection needs
pub struct Server {
    listener: UnixListener,
    path: PathBuf,
    handler: QueryHandler,
    dispatcher: Arc<ObserverDispatcher>,
}

impl Server {
    /// Bind the socket, replacing a stale socket file left by a previous run
    pub fn bind(
        path: impl AsRef<Path>,
        handler: QueryHandler,
        dispatcher: Arc<ObserverDispatcher>,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale socket {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let listener = UnixListener::bind(&path)?;
        info!("Listening on {}", path.display());

        Ok(Self {
            listener,
            path,
            handler,
            dispatcher,
        })
    }

    /// Accept connections until `shutdown` flips, then wait for them to close
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let connection = Connection {
                            handler: self.handler.clone(),
                            dispatcher: Arc::clone(&self.dispatcher),
                            events: None,
                        };
                        connections.spawn(connection.serve(stream, shutdown.clone()));
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },

                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                _ = shutdown.changed() => break,
            }
        }

        debug!("Closing {} open connection(s)", connections.len());
        while connections.join_next().await.is_some() {}

        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Failed to remove socket {}: {}", self.path.display(), e);
        }
    }
}

struct Connection {
    handler: QueryHandler,
    dispatcher: Arc<ObserverDispatcher>,
    /// Set once the peer subscribes
    events: Option<mpsc::Receiver<PropertiesChanged>>,
}

impl Connection {
    async fn serve(mut self, stream: UnixStream, mut shutdown: watch::Receiver<bool>) {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        loop {
            let frame = tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => self.handle_line(&line),
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Connection read failed: {}", e);
                        break;
                    }
                },

                Some(event) = next_event(&mut self.events) => signal_frame(&event),

                _ = shutdown.changed() => break,
            };

            if let Err(e) = write_frame(&mut write, &frame).await {
                debug!("Connection write failed: {}", e);
                break;
            }
        }
    }

    fn handle_line(&mut self, line: &str) -> Value {
        let request: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => return error_frame(&QueryError::malformed(format!("invalid JSON: {}", e))),
        };

        if request.get("method").and_then(Value::as_str) == Some(SUBSCRIBE) {
            if self.events.is_none() {
                self.events = Some(self.dispatcher.subscribe());
            }
            return json!({ "reply": { "subscribed": true } });
        }

        match self.handler.handle_value(&request) {
            Ok(response) => json!({ "reply": response }),
            Err(e) => error_frame(&e),
        }
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<PropertiesChanged>>) -> Option<PropertiesChanged> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn error_frame(err: &QueryError) -> Value {
    json!({ "error": { "name": err.name(), "message": err.to_string() } })
}

fn signal_frame(event: &PropertiesChanged) -> Value {
    json!({
        "signal": "PropertiesChanged",
        "path": event.path,
        "changed": event.changed,
    })
}

async fn write_frame<W: AsyncWrite + Unpin>(write: &mut W, frame: &Value) -> io::Result<()> {
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');
    write.write_all(&bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkd_core::link::{OperationalState, ResourcePaths, StateUpdate};
    use linkd_core::registry::LinkRegistry;
    use tokio::io::Lines;
    use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::time::{Duration, timeout};

    struct Client {
        lines: Lines<BufReader<OwnedReadHalf>>,
        write: OwnedWriteHalf,
    }

    impl Client {
        async fn connect(path: &Path) -> Self {
            let stream = UnixStream::connect(path).await.unwrap();
            let (read, write) = stream.into_split();
            Self {
                lines: BufReader::new(read).lines(),
                write,
            }
        }

        async fn send(&mut self, line: &str) {
            self.write.write_all(line.as_bytes()).await.unwrap();
            self.write.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .expect("frame within 5 seconds")
                .unwrap()
                .expect("connection open");
            serde_json::from_str(&line).unwrap()
        }

        async fn call(&mut self, line: &str) -> Value {
            self.send(line).await;
            self.recv().await
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        path: PathBuf,
        registry: Arc<LinkRegistry>,
        shutdown: watch::Sender<bool>,
        server: tokio::task::JoinHandle<()>,
    }

    async fn start() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/linkd.socket");

        let paths = ResourcePaths::default();
        let dispatcher = Arc::new(ObserverDispatcher::new(paths.clone(), 16));
        let registry = Arc::new(LinkRegistry::new(dispatcher.clone()));
        let handler = QueryHandler::new(Arc::clone(&registry), paths);

        let server = Server::bind(&path, handler, dispatcher).unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(server.run(shutdown_rx));

        Fixture {
            _dir: dir,
            path,
            registry,
            shutdown,
            server,
        }
    }

    #[tokio::test]
    async fn queries_and_errors_round_trip() {
        let fixture = start().await;
        fixture.registry.insert(2, "eth0").unwrap();
        let mut client = Client::connect(&fixture.path).await;

        assert_eq!(
            client.call(r#"{"method":"ListLinks"}"#).await,
            json!({"reply": [{"index": 2, "name": "eth0", "path": "/org/freedesktop/network1/link/2"}]})
        );
        assert_eq!(
            client.call(r#"{"method":"GetLinkByIndex","index":9}"#).await,
            json!({"error": {"name": "org.freedesktop.network1.NoSuchLink", "message": "Link 9 not known"}})
        );

        // Garbage keeps the connection usable
        let frame = client.call("not json").await;
        assert_eq!(frame["error"]["name"], "org.freedesktop.DBus.Error.InvalidArgs");
        assert_eq!(
            client.call(r#"{"method":"GetLinkByName","name":"eth0"}"#).await,
            json!({"reply": {"index": 2, "path": "/org/freedesktop/network1/link/2"}})
        );

        fixture.shutdown.send(true).unwrap();
        timeout(Duration::from_secs(5), fixture.server)
            .await
            .expect("server stops")
            .unwrap();
        assert!(!fixture.path.exists(), "socket file removed on shutdown");
    }

    #[tokio::test]
    async fn subscribers_receive_signals() {
        let fixture = start().await;
        fixture.registry.insert(3, "wlan0").unwrap();
        let mut client = Client::connect(&fixture.path).await;

        assert_eq!(
            client.call(r#"{"method":"Subscribe"}"#).await,
            json!({"reply": {"subscribed": true}})
        );

        fixture
            .registry
            .update_state(3, StateUpdate::Operational(OperationalState::Routable))
            .unwrap();

        assert_eq!(
            client.recv().await,
            json!({
                "signal": "PropertiesChanged",
                "path": "/org/freedesktop/network1/link/3",
                "changed": {"OperationalState": "routable"}
            })
        );
        assert_eq!(
            client.recv().await,
            json!({
                "signal": "PropertiesChanged",
                "path": "/org/freedesktop/network1",
                "changed": {"OperationalState": "routable"}
            })
        );

        fixture.shutdown.send(true).unwrap();
        timeout(Duration::from_secs(5), fixture.server)
            .await
            .expect("server stops")
            .unwrap();
    }

    #[tokio::test]
    async fn stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linkd.socket");
        std::fs::write(&path, b"stale").unwrap();

        let paths = ResourcePaths::default();
        let dispatcher = Arc::new(ObserverDispatcher::new(paths.clone(), 4));
        let registry = Arc::new(LinkRegistry::new(dispatcher.clone()));
        let handler = QueryHandler::new(registry, paths);

        assert!(Server::bind(&path, handler, dispatcher).is_ok());
    }
}
