//! Scripted JSON-RPC node for provider tests.

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers a JSON-RPC call, echoing the request id.
pub(crate) struct JsonRpc(pub(crate) Value);

impl Respond for JsonRpc {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let mut reply = self.0.clone();
        reply["jsonrpc"] = json!("2.0");
        reply["id"] = body["id"].clone();
        ResponseTemplate::new(200).set_body_json(reply)
    }
}

/// A node answering `rpc_method` with `reply`.
pub(crate) async fn node(rpc_method: &str, reply: Value) -> MockServer {
    let server = MockServer::start().await;
    mount(&server, rpc_method, reply).await;
    server
}

async fn mount(server: &MockServer, rpc_method: &str, reply: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(JsonRpc(reply))
        .mount(server)
        .await;
}

/// How many `rpc_method` calls the node received.
pub(crate) async fn queries(server: &MockServer, rpc_method: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| {
            serde_json::from_slice::<Value>(&request.body)
                .is_ok_and(|body| body["method"] == rpc_method)
        })
        .count()
}
