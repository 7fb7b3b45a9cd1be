//! Integration tests for hub startup, the rendezvous file and shutdown

mod common;

use common::start_hub;
use plastic_hub::{client, HubConfig, PlasticError, PlasticHub, RendezvousInfo};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn test_started_hub_is_published() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, path) = start_hub(dir.path()).await;

    let info = RendezvousInfo::read(&path).unwrap();
    assert_eq!(Some(info.object_address().unwrap()), hub.object_address().await);
    assert_eq!(Some(info.xmlrpc_url.clone()), hub.xmlrpc_url().await);
    assert!(!info.instance.is_empty());
    assert!(client::is_hub_running_at(&path).await);

    hub.stop().await;
    assert!(!path.exists());
    assert!(!client::is_hub_running_at(&path).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_hub_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, path) = start_hub(dir.path()).await;

    let err = PlasticHub::start(HubConfig::ephemeral().with_rendezvous_file(Some(path.clone())))
        .await
        .unwrap_err();
    assert!(matches!(err, PlasticError::HubAlreadyRunning { .. }));
    // the refused hub must not have touched the running hub's file
    assert!(client::is_hub_running_at(&path).await);
    hub.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stale_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".plastic");

    // a port nobody listens on once the temporary listener is dropped
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let stale = RendezvousInfo::new(
        port,
        url::Url::parse("http://127.0.0.1:1/").unwrap(),
        "dead-hub".to_string(),
    );
    stale.write(&path).unwrap();

    let hub = PlasticHub::start(HubConfig::ephemeral().with_rendezvous_file(Some(path.clone())))
        .await
        .unwrap();
    let info = RendezvousInfo::read(&path).unwrap();
    assert_ne!(info.instance, "dead-hub");
    hub.stop().await;
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_file_of_newer_hub_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, path) = start_hub(dir.path()).await;

    let mut info = RendezvousInfo::read(&path).unwrap();
    info.instance = "someone-else".to_string();
    info.write(&path).unwrap();

    hub.stop().await;
    assert!(path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_is_idempotent_and_quick() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, _path) = start_hub(dir.path()).await;

    tokio::time::timeout(Duration::from_secs(5), hub.stop())
        .await
        .unwrap();
    hub.stop().await;
    assert!(hub.is_stopped());
    assert!(hub.object_address().await.is_none());
}

#[tokio::test]
async fn test_missing_file_means_no_hub() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".plastic");
    assert!(matches!(
        client::connect_object_at(&path).await.unwrap_err(),
        PlasticError::NoHub(_)
    ));
}

#[test]
fn test_config_from_toml() {
    let config = HubConfig::from_toml_str(
        r#"
        object_port = 0
        xmlrpc_port = 0
        validate = true
        request_timeout_ms = 250
        "#,
    )
    .unwrap();
    assert!(config.validate);
    assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
    assert_eq!(config.notify_timeout(), Duration::from_secs(1));
}
