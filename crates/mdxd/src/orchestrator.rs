//! Orchestrator - discovery, launch, and shutdown of every listener
//!
//! Scans the root once, opens each dictionary, binds one listener per
//! dictionary under the port policy, then brings up the gateway. A single
//! watch channel tells every server to drain and stop.

use crate::cli::Cli;
use crate::config::Config;
use crate::error::StartupError;
use crate::gateway::{self, ClientShell, GatewayState};
use crate::html::SHARED_INJECTION;
use crate::server::{Dictionary, DictionaryServer};
use axum::Router;
use mdx_common::{scan, ArchiveOpener, PortError, PortPolicy, ScanRules};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long a listener may take to drain before it is aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of the whole process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Scanning,
    Launching,
    Serving,
    ShuttingDown,
    Stopped,
}

/// Everything the orchestrator needs, resolved from CLI, config and environment
#[derive(Debug, Clone)]
pub struct Settings {
    pub root_dir: PathBuf,
    pub host: IpAddr,
    pub gateway_port: u16,
    pub scan_rules: ScanRules,
    pub port_policy: PortPolicy,
    pub shell: ClientShell,
}

impl Settings {
    pub fn from_cli(cli: &Cli, config: &Config) -> Result<Self, StartupError> {
        let shell = match &config.gateway.client_dir {
            Some(dir) => ClientShell::from_dir(dir).map_err(|e| {
                StartupError::Config(format!("gateway.client_dir {}: {}", dir.display(), e))
            })?,
            None => ClientShell::Builtin,
        };

        Ok(Self {
            root_dir: cli.root_dir()?,
            host: config.host()?,
            gateway_port: cli.port,
            scan_rules: config.scan.rules(),
            port_policy: config.port_policy(PortPolicy::from_env()?)?,
            shell,
        })
    }
}

/// A running dictionary server
pub struct ServerHandle {
    pub server: Arc<DictionaryServer>,
    pub addr: SocketAddr,
    task: JoinHandle<io::Result<()>>,
}

struct GatewayHandle {
    addr: SocketAddr,
    task: JoinHandle<io::Result<()>>,
}

pub struct Orchestrator {
    settings: Settings,
    opener: Arc<dyn ArchiveOpener>,
    state: RunState,
    servers: Vec<ServerHandle>,
    gateway: Option<GatewayHandle>,
    shutdown_tx: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(settings: Settings, opener: Arc<dyn ArchiveOpener>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            settings,
            opener,
            state: RunState::Created,
            servers: Vec::new(),
            gateway: None,
            shutdown_tx,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn servers(&self) -> &[ServerHandle] {
        &self.servers
    }

    pub fn gateway_addr(&self) -> Option<SocketAddr> {
        self.gateway.as_ref().map(|g| g.addr)
    }

    /// Discover dictionaries and bring every listener up.
    ///
    /// On failure, anything already started is shut down before returning.
    pub async fn start(&mut self) -> Result<(), StartupError> {
        if let Err(e) = self.launch().await {
            self.shutdown().await;
            return Err(e);
        }
        self.state = RunState::Serving;
        Ok(())
    }

    async fn launch(&mut self) -> Result<(), StartupError> {
        self.state = RunState::Scanning;
        let root = &self.settings.root_dir;
        let descriptors = scan(root, &self.settings.scan_rules)?;
        if descriptors.is_empty() {
            return Err(StartupError::Discovery { path: root.clone() });
        }
        let found = descriptors.len();
        info!("Found {} dictionaries under {}", found, root.display());

        self.state = RunState::Launching;
        let shared_script: Arc<str> = Arc::from(SHARED_INJECTION);
        let dictionaries: Vec<Dictionary> = descriptors
            .into_iter()
            .filter_map(|descriptor| {
                let dir = descriptor.root_dir.clone();
                match Dictionary::open(descriptor, self.opener.as_ref(), shared_script.clone()) {
                    Ok(dictionary) => Some(dictionary),
                    Err(e) => {
                        warn!("Skipping dictionary {}: {}", dir.display(), e);
                        None
                    }
                }
            })
            .collect();

        let host = self.settings.host;
        let bound = allocate(dictionaries, self.settings.port_policy, Dictionary::title, |port| {
            std::net::TcpListener::bind((host, port))
        })?;

        for (dictionary, listener) in bound {
            let title = dictionary.title();
            let addr = listener
                .local_addr()
                .and_then(|addr| listener.set_nonblocking(true).map(|_| addr))
                .map_err(|source| StartupError::Bind {
                    addr: SocketAddr::new(host, 0),
                    source,
                })?;
            let listener = tokio::net::TcpListener::from_std(listener)
                .map_err(|source| StartupError::Bind { addr, source })?;

            let server = Arc::new(DictionaryServer::new(dictionary, addr.port()));
            let task = self.serve(listener, server.clone().router());
            info!("  Serving {} on http://{}", title, addr);
            self.servers.push(ServerHandle { server, addr, task });
        }

        if self.servers.is_empty() {
            return Err(StartupError::NoServers { found });
        }

        let addr = SocketAddr::new(host, self.settings.gateway_port);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| StartupError::Bind { addr, source })?;

        let servers: Vec<Arc<DictionaryServer>> =
            self.servers.iter().map(|h| h.server.clone()).collect();
        gateway::announce(addr, &servers);
        let router = gateway::router(Arc::new(GatewayState {
            shell: self.settings.shell.clone(),
            servers: Arc::new(servers),
        }));
        let task = self.serve(listener, router);
        self.gateway = Some(GatewayHandle { addr, task });
        Ok(())
    }

    fn serve(&self, listener: tokio::net::TcpListener, router: Router) -> JoinHandle<io::Result<()>> {
        let mut stop = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.wait_for(|stopping| *stopping).await;
                })
                .await
        })
    }

    /// Stop the gateway and every dictionary server. Safe to call twice.
    pub async fn shutdown(&mut self) {
        if matches!(self.state, RunState::ShuttingDown | RunState::Stopped) {
            return;
        }
        self.state = RunState::ShuttingDown;
        info!("Stopping {} dictionary servers", self.servers.len());
        self.shutdown_tx.send_replace(true);

        let mut tasks = Vec::with_capacity(self.servers.len() + 1);
        if let Some(gateway) = self.gateway.take() {
            tasks.push(("gateway".to_string(), gateway.task));
        }
        for handle in self.servers.drain(..) {
            tasks.push((handle.server.info().title.clone(), handle.task));
        }
        join_all(tasks, SHUTDOWN_GRACE).await;

        self.state = RunState::Stopped;
        info!("Shutdown complete");
    }
}

/// Wait for every task against one shared deadline, aborting stragglers.
///
/// All tasks were signalled together, so `grace` bounds the whole wait.
async fn join_all(tasks: Vec<(String, JoinHandle<io::Result<()>>)>, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    for (name, mut task) in tasks {
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(Ok(()))) => debug!("{} stopped", name),
            Ok(Ok(Err(e))) => error!("{} stopped with error: {}", name, e),
            Ok(Err(e)) => error!("{} task failed: {}", name, e),
            Err(_) => {
                warn!("{} did not stop within {:?}, aborting", name, grace);
                task.abort();
            }
        }
    }
}

/// Bind one listener per item under `policy`.
///
/// Ephemeral: an item whose bind fails is logged and skipped. Range: the
/// window must cover every item, otherwise everything bound so far is
/// dropped and the error returned.
fn allocate<D, T, L, F>(
    items: Vec<D>,
    policy: PortPolicy,
    label: L,
    mut bind: F,
) -> Result<Vec<(D, T)>, PortError>
where
    L: Fn(&D) -> String,
    F: FnMut(u16) -> io::Result<T>,
{
    let mut bound = Vec::with_capacity(items.len());
    match policy.allocator() {
        None => {
            for item in items {
                match bind(0) {
                    Ok(listener) => bound.push((item, listener)),
                    Err(e) => warn!("Skipping dictionary {}: bind failed: {}", label(&item), e),
                }
            }
        }
        Some(mut allocator) => {
            for item in items {
                let (port, listener) = allocator.next(&mut bind)?;
                debug!(port, "Allocated port for {}", label(&item));
                bound.push((item, listener));
            }
        }
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Token(Arc<AtomicUsize>);

    impl Drop for Token {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("dict{}", i)).collect()
    }

    #[test]
    fn test_range_covers_every_dictionary() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut probed = Vec::new();
        let policy = PortPolicy::range(40000, 40002).unwrap();

        let bound = allocate(names(3), policy, String::clone, |port| {
            probed.push(port);
            Ok(Token(dropped.clone()))
        })
        .unwrap();

        assert_eq!(bound.len(), 3);
        assert_eq!(probed, vec![40000, 40001, 40002]);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_range_too_small_releases_everything() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let policy = PortPolicy::range(40000, 40001).unwrap();

        let result = allocate(names(3), policy, String::clone, |_| Ok(Token(dropped.clone())));

        assert!(matches!(
            result,
            Err(PortError::Exhausted { start: 40000, end: 40001 })
        ));
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_range_skips_busy_ports() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let policy = PortPolicy::range(40000, 40003).unwrap();

        let bound = allocate(names(2), policy, String::clone, |port| {
            if port == 40000 || port == 40002 {
                return Err(io::Error::new(io::ErrorKind::AddrInUse, "busy"));
            }
            Ok((port, Token(dropped.clone())))
        })
        .unwrap();

        let ports: Vec<u16> = bound.iter().map(|(_, (port, _))| *port).collect();
        assert_eq!(ports, vec![40001, 40003]);
    }

    #[test]
    fn test_ephemeral_skips_failed_binds() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut calls = 0;

        let bound = allocate(names(3), PortPolicy::Ephemeral, String::clone, |port| {
            assert_eq!(port, 0);
            calls += 1;
            if calls == 2 {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            Ok(Token(dropped.clone()))
        })
        .unwrap();

        let titles: Vec<&str> = bound.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(titles, vec!["dict0", "dict2"]);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_settings_from_cli() {
        use clap::Parser;

        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from(["mdxd", "-d", dir.path().to_str().unwrap(), "-p", "3100"])
            .unwrap();

        let settings = Settings::from_cli(&cli, &Config::default()).unwrap();
        assert_eq!(settings.gateway_port, 3100);
        assert_eq!(settings.host, IpAddr::from([127, 0, 0, 1]));
        assert!(settings.root_dir.is_absolute());
        assert!(matches!(settings.shell, ClientShell::Builtin));

        let mut config = Config::default();
        config.gateway.client_dir = Some(dir.path().join("missing-client"));
        assert!(matches!(
            Settings::from_cli(&cli, &config),
            Err(StartupError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_join_all_shares_one_deadline() {
        let tasks: Vec<_> = (0..3)
            .map(|i| {
                let stuck = tokio::spawn(std::future::pending::<io::Result<()>>());
                (format!("dict{}", i), stuck)
            })
            .collect();
        let done = ("done".to_string(), tokio::spawn(async { Ok(()) }));

        let grace = Duration::from_millis(200);
        let started = std::time::Instant::now();
        join_all(std::iter::once(done).chain(tasks).collect(), grace).await;

        let elapsed = started.elapsed();
        assert!(elapsed >= grace);
        // One deadline for all, not one per task
        assert!(elapsed < grace * 2, "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let settings = Settings {
            root_dir: PathBuf::from("/nonexistent"),
            host: IpAddr::from([127, 0, 0, 1]),
            gateway_port: 0,
            scan_rules: ScanRules::default(),
            port_policy: PortPolicy::Ephemeral,
            shell: ClientShell::Builtin,
        };
        let mut orchestrator =
            Orchestrator::new(settings, Arc::new(mdx_common::SourceArchiveOpener));
        assert_eq!(orchestrator.state(), RunState::Created);

        orchestrator.shutdown().await;
        orchestrator.shutdown().await;
        assert_eq!(orchestrator.state(), RunState::Stopped);
        assert!(orchestrator.gateway_addr().is_none());
    }
}
