use std::sync::Arc;

use courier_channels::Channels;
use courier_core::{Format, Persistence, Uri};
use courier_fabric::transport::TransportListener;
use courier_fabric::{Channel, Error, Subscription, WorkerPool};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{CommandRequest, CommandResponse, RpcMessage};
use crate::error::{Result, RpcError};

type Handler = Arc<dyn Fn(Vec<Value>) -> std::result::Result<Value, String> + Send + Sync>;

/// Answers command requests with registered handlers
///
/// Cloning is cheap; clones share the command table, so commands added
/// after [`listen`](RpcServer::listen) are served too.
#[derive(Clone, Default)]
pub struct RpcServer {
    commands: Arc<DashMap<String, Handler>>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command, replacing any previous one with that name
    pub fn command<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.register(name, handler);
        self
    }

    pub fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.commands.insert(name.into(), Arc::new(handler));
    }

    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Run the handler for `request` and build its response
    pub fn dispatch(&self, request: CommandRequest) -> CommandResponse {
        let handler = self
            .commands
            .get(&request.name)
            .map(|entry| Arc::clone(entry.value()));
        let Some(handler) = handler else {
            debug!(command = %request.name, id = request.id, "unknown command");
            return CommandResponse::failure(request.id, format!("unknown command: {}", request.name));
        };

        match handler(request.params) {
            Ok(out) => CommandResponse::ok(request.id, out),
            Err(message) => {
                debug!(command = %request.name, id = request.id, %message, "command failed");
                CommandResponse::failure(request.id, message)
            }
        }
    }

    /// Serve requests arriving on `uri`, opened through `channels`
    ///
    /// Blocks while the channel opens.
    pub fn listen(&self, channels: &Channels, uri: &Uri) -> Result<ServerHandle> {
        let channel = channels.open_channel::<RpcMessage>(uri, Persistence::BestEffort, &[])?;
        let subscription = self.serve_channel(channel)?;
        info!(uri = %uri, commands = self.commands.len(), "rpc server listening");

        Ok(ServerHandle {
            connections: Arc::new(Mutex::new(vec![subscription])),
            acceptor: None,
        })
    }

    /// Serve every connection accepted by `listener`, each as its own channel
    /// named `uri`
    pub fn serve<L>(&self, listener: L, uri: Uri, pool: WorkerPool) -> Result<ServerHandle>
    where
        L: TransportListener + 'static,
        L::Transport: 'static,
    {
        let connections: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));
        let tracked = Arc::clone(&connections);
        let server = self.clone();
        let accepting = pool.clone();

        let acceptor = pool
            .spawn(async move {
                loop {
                    let transport = match listener.accept().await {
                        Ok(transport) => transport,
                        Err(e) => {
                            warn!(uri = %uri, error = %e, "rpc server stopped accepting");
                            break;
                        }
                    };
                    let served = Channel::from_transport(
                        uri.clone(),
                        transport,
                        Format::Json,
                        accepting.clone(),
                    )
                    .map_err(RpcError::Execution)
                    .and_then(|channel| server.serve_channel(Arc::new(channel)));

                    match served {
                        Ok(subscription) => {
                            let mut connections = tracked.lock();
                            connections.retain(Subscription::is_active);
                            connections.push(subscription);
                            debug!(uri = %uri, connections = connections.len(), "accepted rpc connection");
                        }
                        Err(e) => warn!(uri = %uri, error = %e, "unable to serve connection"),
                    }
                }
            })
            .map_err(RpcError::Execution)?;

        Ok(ServerHandle {
            connections,
            acceptor: Some(acceptor),
        })
    }

    fn serve_channel(&self, channel: Arc<Channel<RpcMessage>>) -> Result<Subscription> {
        let server = self.clone();
        let replies = Arc::clone(&channel);

        channel
            .subscribe(move |message| match message {
                Ok(RpcMessage::Request(request)) => {
                    let response = server.dispatch(request);
                    let id = response.id;
                    replies.publish(RpcMessage::Response(response), move |result| {
                        if let Err(e) = result {
                            warn!(id, error = %e, "unable to send response");
                        }
                    });
                }
                Ok(RpcMessage::Response(_)) => {}
                Err(Error::Codec(_) | Error::Timeout { .. }) => {}
                Err(e) => debug!(uri = %replies.uri(), error = %e, "rpc connection ended"),
            })
            .map_err(RpcError::Execution)
    }
}

/// A running server; dropping it stops serving
pub struct ServerHandle {
    connections: Arc<Mutex<Vec<Subscription>>>,
    acceptor: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Whether any connection is still being served, or new ones accepted
    pub fn is_serving(&self) -> bool {
        self.acceptor.as_ref().is_some_and(|task| !task.is_finished())
            || self.connections.lock().iter().any(Subscription::is_active)
    }

    pub fn stop(self) {}
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
        self.connections.lock().clear();
    }
}
