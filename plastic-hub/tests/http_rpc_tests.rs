//! Integration tests driving a started hub over HTTP-RPC

mod common;

use common::{count, eventually, message, recorder, start_hub};
use plastic_hub::message_id::{APPLICATION_REGISTERED, ECHO, HUB_STOPPING};
use plastic_hub::xmlrpc::{codec, HttpCaller, MethodCall};
use plastic_hub::{client, HubService, HubTester, PlasticError, Value, XmlRpcHub};
use std::sync::Arc;

async fn connect(path: &std::path::Path) -> XmlRpcHub {
    let url = client::connect_xmlrpc_at(path).await.unwrap().caller().url().clone();
    XmlRpcHub::with_caller(HttpCaller::new(url).with_callback_port(0))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_queries_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, path) = start_hub(dir.path()).await;
    let remote = connect(&path).await;

    assert_eq!(&remote.get_hub_id().await.unwrap(), hub.hub_id());
    let id = remote.register_no_callback("remote driver").await.unwrap();
    assert_eq!(
        remote.get_name(&id).await.unwrap().as_deref(),
        Some("remote driver")
    );
    assert!(remote.get_registered_ids().await.unwrap().contains(&id));
    assert_eq!(remote.get_understood_messages(&id).await.unwrap(), Some(vec![]));

    let results = remote
        .request_to_subset(&id, &ECHO, &[Value::Int(42)], &[hub.hub_id().clone()])
        .await
        .unwrap();
    assert_eq!(results[hub.hub_id()], Value::Int(42));

    remote.unregister(&id).await.unwrap();
    remote.unregister(&id).await.unwrap();
    assert!(remote.get_name(&id).await.unwrap().is_none());
    hub.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_callback_peer_receives_requests() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, path) = start_hub(dir.path()).await;
    let remote = connect(&path).await;
    let ping = message("ivo://example.org/test/ping");

    let (listener, log) = recorder();
    let peer = remote
        .register_listener("listener", &[ping.clone()], listener)
        .await
        .unwrap();
    let driver = hub.register_no_callback("driver").unwrap();

    let results = hub.request(&driver, &ping, &[Value::from("hello")]).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[&peer], Value::from("hello"));
    assert_eq!(count(&log, &ping), 1);

    // not interested, so not asked
    let results = hub.request(&driver, &ECHO, &[Value::from("hi")]).await;
    assert!(!results.contains_key(&peer));

    remote.unregister(&peer).await.unwrap();
    let results = hub.request(&driver, &ping, &[]).await;
    assert!(results.is_empty());
    hub.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tester_passes_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, path) = start_hub(dir.path()).await;
    let remote = Arc::new(connect(&path).await);

    HubTester::new(remote).run().await.unwrap();
    assert_eq!(hub.get_registered_ids(), vec![hub.hub_id().clone()]);
    hub.stop().await;
}

async fn post_xml(url: url::Url, body: String) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "text/xml")
        .body(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_plain_xml_rpc_client_is_served() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, _path) = start_hub(dir.path()).await;
    let url = hub.xmlrpc_url().await.unwrap();

    let body = r#"<?xml version="1.0"?>
<methodCall>
  <methodName>plastic.hub.getHubId</methodName>
  <params></params>
</methodCall>"#;
    let response = post_xml(url, body.to_string()).await;
    assert!(response.status().is_success());
    assert_eq!(response.headers()[reqwest::header::CONTENT_TYPE], "text/xml");
    let text = response.text().await.unwrap();
    assert!(text.contains("<methodResponse>"));
    assert!(text.contains(&format!("<string>{}</string>", hub.hub_id())));
    hub.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_body_is_answered_with_fault() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, _path) = start_hub(dir.path()).await;
    let url = hub.xmlrpc_url().await.unwrap();

    let text = post_xml(url, r#"{"methodName": "plastic.hub.getHubId"}"#.to_string())
        .await
        .text()
        .await
        .unwrap();
    assert!(matches!(
        codec::decode_response(&text),
        Err(PlasticError::Remote(_))
    ));
    hub.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_object_registration_rejected_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, _path) = start_hub(dir.path()).await;
    let url = hub.xmlrpc_url().await.unwrap();

    let call = MethodCall::new(
        "plastic.hub.registerRMI",
        vec![Value::from("sneaky"), Value::List(vec![]), Value::Int(1)],
    );
    let text = post_xml(url, call.to_xml().unwrap())
        .await
        .text()
        .await
        .unwrap();
    match codec::decode_response(&text) {
        Err(PlasticError::Remote(fault)) => assert!(fault.contains("registerXMLRPC")),
        other => panic!("registerRMI should fault, got {:?}", other),
    }
    assert_eq!(hub.get_registered_ids().len(), 1);
    hub.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_method_faults() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, path) = start_hub(dir.path()).await;
    let remote = connect(&path).await;

    let err = remote.invoke("frobnicate", vec![]).await.unwrap_err();
    assert!(matches!(err, PlasticError::Remote(_)));
    hub.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_notifies_http_peer_once() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, path) = start_hub(dir.path()).await;
    let remote = connect(&path).await;

    let (listener, log) = recorder();
    remote
        .register_listener("watcher", &[], listener)
        .await
        .unwrap();
    assert!(eventually(|| count(&log, &APPLICATION_REGISTERED) == 1).await);

    hub.stop().await;
    assert_eq!(count(&log, &HUB_STOPPING), 1);
    assert!(!path.exists());

    // the servers are gone
    assert!(remote.get_hub_id().await.is_err());
    assert!(hub.register_no_callback("late").is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dead_callback_is_absent_from_results() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, _path) = start_hub(dir.path()).await;
    let ping = message("ivo://example.org/test/ping");

    // nothing listens on this port once the listener is dropped
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let dead = url::Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
    let gone = hub.register_xml_rpc("gone", &[ping.clone()], dead).unwrap();

    let (listener, _log) = recorder();
    let alive = hub.register_direct("alive", &[ping.clone()], listener).unwrap();
    let driver = hub.register_no_callback("driver").unwrap();

    let results = hub.request(&driver, &ping, &[Value::Int(1)]).await;
    assert!(!results.contains_key(&gone));
    assert_eq!(results[&alive], Value::Int(1));
    hub.stop().await;
}
