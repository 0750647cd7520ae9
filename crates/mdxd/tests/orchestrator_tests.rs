//! Orchestrator tests
//!
//! Full startup on loopback with source archives, talking to the listeners
//! over real sockets.

use mdx_common::{PortError, PortPolicy, ScanRules, SourceArchiveOpener};
use mdxd::gateway::ClientShell;
use mdxd::{Orchestrator, RunState, Settings, StartupError};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

const CAT_PNG_BASE64: &str = "iVBORw0KGgo=";
const CAT_PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

fn settings(root: &Path, policy: PortPolicy) -> Settings {
    Settings {
        root_dir: root.to_path_buf(),
        host: IpAddr::from([127, 0, 0, 1]),
        gateway_port: 0,
        scan_rules: ScanRules::default(),
        port_policy: policy,
        shell: ClientShell::Builtin,
    }
}

fn orchestrator(root: &Path, policy: PortPolicy) -> Orchestrator {
    Orchestrator::new(settings(root, policy), Arc::new(SourceArchiveOpener))
}

fn write_dictionaries(root: &Path) {
    let oald = root.join("oald");
    fs::create_dir_all(&oald).unwrap();
    fs::write(
        oald.join("oald.mdx"),
        "colour\n@@@LINK=color\n</>\ncolor\n<p>color</p>\n</>\n",
    )
    .unwrap();
    fs::write(
        oald.join("oald.mdd"),
        format!("\\img\\cat.png\n{}\n</>\n", CAT_PNG_BASE64),
    )
    .unwrap();

    let ldoce = root.join("ldoce");
    fs::create_dir_all(&ldoce).unwrap();
    fs::write(ldoce.join("ldoce.mdx"), "apple\n<p>apple</p>\n</>\n").unwrap();
}

#[tokio::test]
async fn test_start_serve_and_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    write_dictionaries(dir.path());

    let mut orchestrator = orchestrator(dir.path(), PortPolicy::Ephemeral);
    orchestrator.start().await.unwrap();
    assert_eq!(orchestrator.state(), RunState::Serving);

    let titles: Vec<String> = orchestrator
        .servers()
        .iter()
        .map(|h| h.server.info().title.clone())
        .collect();
    assert_eq!(titles, vec!["ldoce", "oald"]);

    let oald = &orchestrator.servers()[1];
    assert_eq!(oald.server.port(), oald.addr.port());

    let client = reqwest::Client::new();
    let page = client
        .get(format!("http://{}/colour", oald.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), 200);
    assert!(page.text().await.unwrap().contains("<p>color</p>"));

    let image = client
        .get(format!("http://{}/img/cat.png", oald.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(image.status(), 200);
    assert_eq!(image.headers()["content-type"], "image/png");
    assert_eq!(image.bytes().await.unwrap().as_ref(), CAT_PNG_BYTES);

    let gateway = orchestrator.gateway_addr().unwrap();
    let info: Vec<serde_json::Value> = client
        .post(format!("http://{}/api/info", gateway))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info.len(), 2);
    for (entry, handle) in info.iter().zip(orchestrator.servers()) {
        assert_eq!(entry["port"], handle.addr.port());
    }

    let oald_addr = oald.addr;
    orchestrator.shutdown().await;
    assert_eq!(orchestrator.state(), RunState::Stopped);
    assert!(orchestrator.servers().is_empty());

    // Second call is a no-op
    orchestrator.shutdown().await;
    assert_eq!(orchestrator.state(), RunState::Stopped);

    assert!(tokio::net::TcpStream::connect(oald_addr).await.is_err());
}

#[tokio::test]
async fn test_empty_root_is_discovery_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("notes")).unwrap();

    let mut orchestrator = orchestrator(dir.path(), PortPolicy::Ephemeral);
    let err = orchestrator.start().await.unwrap_err();
    assert!(matches!(err, StartupError::Discovery { .. }));
    assert_eq!(orchestrator.state(), RunState::Stopped);
}

#[tokio::test]
async fn test_missing_root_is_invalid() {
    let mut orchestrator = orchestrator(Path::new("/nonexistent/mdxd"), PortPolicy::Ephemeral);
    let err = orchestrator.start().await.unwrap_err();
    assert!(matches!(err, StartupError::InvalidRoot { .. }));
}

#[tokio::test]
async fn test_unreadable_dictionaries_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_dictionaries(dir.path());
    let broken = dir.path().join("broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("broken.mdx"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

    let mut orchestrator = orchestrator(dir.path(), PortPolicy::Ephemeral);
    orchestrator.start().await.unwrap();
    assert_eq!(orchestrator.servers().len(), 2);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_no_openable_dictionary_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("binary.mdx"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

    let mut orchestrator = orchestrator(dir.path(), PortPolicy::Ephemeral);
    let err = orchestrator.start().await.unwrap_err();
    assert!(matches!(err, StartupError::NoServers { found: 1 }));
}

#[tokio::test]
async fn test_port_range_too_small_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_dictionaries(dir.path());

    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let policy = PortPolicy::range(port, port).unwrap();

    let mut orchestrator = orchestrator(dir.path(), policy);
    let err = orchestrator.start().await.unwrap_err();
    assert!(matches!(err, StartupError::Ports(PortError::Exhausted { .. })));
    assert!(orchestrator.servers().is_empty());
    assert_eq!(orchestrator.state(), RunState::Stopped);
}

#[tokio::test]
async fn test_gateway_port_in_use_tears_down_servers() {
    let dir = tempfile::tempdir().unwrap();
    write_dictionaries(dir.path());

    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut settings = settings(dir.path(), PortPolicy::Ephemeral);
    settings.gateway_port = taken.local_addr().unwrap().port();

    let mut orchestrator = Orchestrator::new(settings, Arc::new(SourceArchiveOpener));
    let err = orchestrator.start().await.unwrap_err();
    assert!(matches!(err, StartupError::Bind { .. }));
    assert!(orchestrator.servers().is_empty());
    assert_eq!(orchestrator.state(), RunState::Stopped);
}
