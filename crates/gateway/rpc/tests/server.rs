//! The status server over HTTP.

use jsonrpsee::RpcModule;
use serde_json::{Value, json};
use std::net::SocketAddr;
use weave_rpc::{GatewayApiServer, GatewayRpc, launch};
use weave_sync::SyncStateHandle;

async fn serve(state: SyncStateHandle) -> (SocketAddr, jsonrpsee::server::ServerHandle) {
    let mut module = RpcModule::new(());
    module.merge(GatewayRpc::new(state).into_rpc()).unwrap();
    launch(SocketAddr::from(([127, 0, 0, 1], 0)), module).await.unwrap()
}

async fn call(addr: SocketAddr, method: &str) -> Value {
    let request = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": [] });
    let body = reqwest::Client::new()
        .post(format!("http://{addr}"))
        .header("content-type", "application/json")
        .body(request.to_string())
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let mut response: Value = serde_json::from_str(&body).unwrap();
    response["result"].take()
}

#[tokio::test]
async fn test_status_over_json_rpc() {
    let state = SyncStateHandle::new("s");
    state.set_upstream_height(12);
    let (addr, handle) = serve(state.clone()).await;

    assert_eq!(
        call(addr, "gateway_status").await,
        json!({ "status": "BOOTING", "gatewayHeight": 0, "arweaveHeight": 12, "txsInFlight": 0, "delta": 12 })
    );

    state.finish(10, 0, Some("h10"));
    let status = call(addr, "gateway_status").await;
    assert_eq!(status["status"], "OK");
    assert_eq!(status["delta"], 2);

    let healthz = call(addr, "gateway_healthz").await;
    assert_eq!(healthz["status"], "OK");
    handle.stop().unwrap();
}

#[tokio::test]
async fn test_get_endpoints() {
    let (addr, handle) = serve(SyncStateHandle::new("s")).await;
    for path in ["status", "healthz"] {
        let response = reqwest::get(format!("http://{addr}/{path}")).await.unwrap();
        assert!(response.status().is_success(), "GET /{path} failed: {}", response.status());
    }
    handle.stop().unwrap();
}
