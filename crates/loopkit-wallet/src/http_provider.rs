//! HTTP wallet provider.
//!
//! Signing goes through a wallet bridge service that owns the keys:
//! - POST /api/v1/enable
//! - POST /api/v1/execute
//!
//! Reads go straight to a Starknet JSON-RPC node:
//! - starknet_getTransactionReceipt
//! - starknet_call

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use loopkit_codec::felt_to_hex;

use crate::selector::get_selector_from_name;
use crate::*;

const USER_REJECTED: &str = "USER_REJECTED";
const NO_PROVIDER: &str = "NO_PROVIDER";

/// JSON-RPC error code for an unknown transaction hash.
const TXN_HASH_NOT_FOUND: i64 = 29;

/// Wallet bridge response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeResponse<T> {
    pub code: Option<String>,
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ExecuteData {
    transaction_hash: TransactionHash,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

pub struct HttpWalletProvider {
    bridge_url: String,
    rpc_url: String,
    client: reqwest::Client,
    timeout: Duration,
    request_id: AtomicU64,
}

impl HttpWalletProvider {
    pub fn new(bridge_url: &str, rpc_url: &str, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(30_000);
        Self {
            bridge_url: bridge_url.trim_end_matches('/').to_string(),
            rpc_url: rpc_url.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
            request_id: AtomicU64::new(1),
        }
    }

    async fn bridge_post<B, T>(&self, path: &str, body: &B) -> ProviderResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.bridge_url, path);

        let resp = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ProviderError::Unavailable
                } else {
                    ProviderError::Transport(format!("bridge request failed: {}", e))
                }
            })?;

        let status = resp.status();
        let body: BridgeResponse<T> = resp.json().await.map_err(|e| {
            ProviderError::Transport(format!(
                "failed to parse bridge response (status {}): {}",
                status, e
            ))
        })?;

        if let Some(code) = body.code.as_deref() {
            return Err(bridge_error(code, body.message));
        }
        if !status.is_success() {
            return Err(ProviderError::Rpc(format!("bridge returned status {}", status)));
        }
        body.data
            .ok_or_else(|| ProviderError::Rpc("bridge response has no data".into()))
    }

    async fn rpc_raw<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> ProviderResult<RpcResponse<T>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("rpc request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!(
                "rpc returned status {}: {}",
                status, body
            )));
        }

        resp.json()
            .await
            .map_err(|e| ProviderError::Transport(format!("failed to parse rpc response: {}", e)))
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> ProviderResult<T> {
        let body = self.rpc_raw(method, params).await?;
        into_result(method, body)
    }
}

fn bridge_error(code: &str, message: Option<String>) -> ProviderError {
    match code {
        USER_REJECTED => ProviderError::UserRejected,
        NO_PROVIDER => ProviderError::Unavailable,
        other => ProviderError::Rpc(format!("{}: {}", other, message.unwrap_or_default())),
    }
}

fn into_result<T>(method: &str, body: RpcResponse<T>) -> ProviderResult<T> {
    if let Some(err) = body.error {
        return Err(ProviderError::Rpc(format!(
            "{} failed with code {}: {}",
            method, err.code, err.message
        )));
    }
    body.result
        .ok_or_else(|| ProviderError::Rpc(format!("{} returned no result", method)))
}

/// `starknet_call` parameters against the latest block.
fn call_params(call: &Call) -> ProviderResult<Value> {
    let calldata = call
        .calldata
        .iter()
        .map(|felt| felt_to_hex(felt))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| ProviderError::Rpc(format!("invalid calldata: {}", e)))?;

    Ok(json!({
        "request": {
            "contract_address": call.contract_address,
            "entry_point_selector": get_selector_from_name(&call.entrypoint),
            "calldata": calldata,
        },
        "block_id": "latest",
    }))
}

#[async_trait]
impl WalletProvider for HttpWalletProvider {
    async fn enable(&self, options: &ConnectOptions) -> ProviderResult<ProviderState> {
        self.bridge_post("/api/v1/enable", options).await
    }

    async fn execute(&self, calls: &[Call]) -> ProviderResult<TransactionHash> {
        let data: ExecuteData = self
            .bridge_post("/api/v1/execute", &json!({ "calls": calls }))
            .await?;
        Ok(data.transaction_hash)
    }

    async fn get_transaction_receipt(&self, hash: &str) -> ProviderResult<Receipt> {
        let method = "starknet_getTransactionReceipt";
        let body: RpcResponse<Receipt> = self
            .rpc_raw(method, json!({ "transaction_hash": hash }))
            .await?;

        if body
            .error
            .as_ref()
            .is_some_and(|err| err.code == TXN_HASH_NOT_FOUND)
        {
            return Err(ProviderError::TransactionNotFound(hash.to_string()));
        }
        into_result(method, body)
    }

    async fn call_contract(&self, call: &Call) -> ProviderResult<Vec<Felt>> {
        self.rpc("starknet_call", call_params(call)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_codes_are_structured() {
        assert_eq!(bridge_error("USER_REJECTED", None), ProviderError::UserRejected);
        assert_eq!(bridge_error("NO_PROVIDER", None), ProviderError::Unavailable);
        assert_eq!(
            bridge_error("LOCKED", Some("wallet is locked".into())),
            ProviderError::Rpc("LOCKED: wallet is locked".into())
        );
    }

    #[test]
    fn test_call_params_use_hex_felts_and_selector() {
        let call = Call {
            contract_address: Address::parse("token", "0x53c91253bc9682c04929ca02ed00b3e423f6710d2ee7e0d5ebb06f3ecf368a8").unwrap(),
            entrypoint: "balanceOf".into(),
            calldata: vec!["255".into()],
        };
        let params = call_params(&call).unwrap();
        assert_eq!(params["block_id"], "latest");
        assert_eq!(
            params["request"]["entry_point_selector"],
            "0x2e4263afad30923c891518314c3c95dbe830a16874e8abc5777a9a20b54c76e"
        );
        assert_eq!(params["request"]["calldata"], json!(["0xff"]));
        assert_eq!(
            params["request"]["contract_address"],
            "0x53c91253bc9682c04929ca02ed00b3e423f6710d2ee7e0d5ebb06f3ecf368a8"
        );
    }

    #[test]
    fn test_rpc_error_becomes_provider_error() {
        let body: RpcResponse<Vec<Felt>> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":40,"message":"Contract error"}}"#,
        )
        .unwrap();
        let err = into_result("starknet_call", body).unwrap_err();
        assert!(matches!(err, ProviderError::Rpc(msg) if msg.contains("code 40")));

        let body: RpcResponse<Vec<Felt>> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":2,"result":["0x1","0x0"]}"#).unwrap();
        assert_eq!(into_result("starknet_call", body).unwrap(), vec!["0x1", "0x0"]);
    }

    #[test]
    fn test_receipt_result_parses() {
        let body: RpcResponse<Receipt> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"result":{"type":"INVOKE","transaction_hash":"0xabc","finality_status":"ACCEPTED_ON_L2","execution_status":"SUCCEEDED","block_number":12,"events":[]}}"#,
        )
        .unwrap();
        let receipt = into_result("starknet_getTransactionReceipt", body).unwrap();
        assert!(receipt.is_accepted());
        assert_eq!(receipt.block_number, Some(12));
    }

    mod server {
        use std::sync::Arc;

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;
        use tokio::sync::Mutex;

        /// A request seen by the scripted server.
        #[derive(Debug, Clone)]
        pub struct Seen {
            pub path: String,
            pub body: serde_json::Value,
        }

        fn header_end(buf: &[u8]) -> Option<usize> {
            buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
        }

        /// Answers each connection with the next `(status, body)` pair.
        pub async fn serve(responses: Vec<(&'static str, String)>) -> (String, Arc<Mutex<Vec<Seen>>>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let log = seen.clone();

            tokio::spawn(async move {
                for (status, body) in responses {
                    let (mut socket, _) = listener.accept().await.unwrap();
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let end = loop {
                        let n = socket.read(&mut chunk).await.unwrap();
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(end) = header_end(&buf) {
                            break end;
                        }
                        assert!(n > 0, "connection closed before headers");
                    };

                    let head = String::from_utf8_lossy(&buf[..end]).to_string();
                    let length = head
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    while buf.len() < end + length {
                        let n = socket.read(&mut chunk).await.unwrap();
                        assert!(n > 0, "connection closed before body");
                        buf.extend_from_slice(&chunk[..n]);
                    }

                    let path = head
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or_default()
                        .to_string();
                    let body_json = serde_json::from_slice(&buf[end..end + length])
                        .unwrap_or(serde_json::Value::Null);
                    log.lock().await.push(Seen { path, body: body_json });

                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    socket.shutdown().await.ok();
                }
            });

            (format!("http://{}", addr), seen)
        }
    }

    const ACCOUNT: &str = "0x0713b4d1f1a2c5e6d7a8b9c0d1e2f3a4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d9e0";

    fn approve_call() -> Call {
        Call {
            contract_address: Address::parse("token", "0x49d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7").unwrap(),
            entrypoint: "approve".into(),
            calldata: vec![ACCOUNT.into(), "1000000000000000000".into(), "0".into()],
        }
    }

    #[tokio::test]
    async fn test_enable_posts_options_and_returns_state() {
        let body = format!(r#"{{"data":{{"is_connected":true,"selected_address":"{ACCOUNT}"}}}}"#);
        let (base, seen) = server::serve(vec![("200 OK", body)]).await;
        let provider = HttpWalletProvider::new(&base, "http://127.0.0.1:9", Some(5_000));

        let state = provider.enable(&ConnectOptions::default()).await.unwrap();
        assert!(state.is_connected);
        assert_eq!(state.selected_address.as_deref(), Some(ACCOUNT));

        let seen = seen.lock().await;
        assert_eq!(seen[0].path, "/api/v1/enable");
        assert_eq!(seen[0].body, json!({"modalMode": "alwaysAsk", "modalTheme": "light"}));
    }

    #[tokio::test]
    async fn test_bridge_code_wins_over_http_status() {
        let (base, _) = server::serve(vec![(
            "400 Bad Request",
            r#"{"code":"USER_REJECTED","message":"user closed the modal"}"#.to_string(),
        )])
        .await;
        let provider = HttpWalletProvider::new(&base, "http://127.0.0.1:9", Some(5_000));

        let err = provider.enable(&ConnectOptions::default()).await.unwrap_err();
        assert_eq!(err, ProviderError::UserRejected);
    }

    #[tokio::test]
    async fn test_bridge_error_status_without_code() {
        let (base, _) =
            server::serve(vec![("502 Bad Gateway", r#"{"data":null}"#.to_string())]).await;
        let provider = HttpWalletProvider::new(&base, "http://127.0.0.1:9", Some(5_000));

        let err = provider.execute(&[approve_call()]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rpc(msg) if msg.contains("502")));
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let (base, seen) = server::serve(vec![(
            "200 OK",
            r#"{"data":{"transaction_hash":"0x5e1f"}}"#.to_string(),
        )])
        .await;
        let provider = HttpWalletProvider::new(&base, "http://127.0.0.1:9", Some(5_000));

        let hash = provider.execute(&[approve_call()]).await.unwrap();
        assert_eq!(hash, "0x5e1f");

        let seen = seen.lock().await;
        assert_eq!(seen[0].path, "/api/v1/execute");
        assert_eq!(
            seen[0].body,
            json!({"calls": [{
                "contract_address": "0x49d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7",
                "entrypoint": "approve",
                "calldata": [ACCOUNT, "1000000000000000000", "0"],
            }]})
        );
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let provider = HttpWalletProvider::new(&base, "http://127.0.0.1:9", Some(5_000));

        let err = provider.enable(&ConnectOptions::default()).await.unwrap_err();
        assert_eq!(err, ProviderError::Unavailable);
    }

    #[tokio::test]
    async fn test_unknown_receipt_is_transaction_not_found() {
        let (rpc, seen) = server::serve(vec![
            (
                "200 OK",
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":29,"message":"Transaction hash not found"}}"#.to_string(),
            ),
            (
                "200 OK",
                r#"{"jsonrpc":"2.0","id":2,"result":{"transaction_hash":"0xabc","finality_status":"ACCEPTED_ON_L2","execution_status":"SUCCEEDED","block_number":7}}"#.to_string(),
            ),
        ])
        .await;
        let provider = HttpWalletProvider::new("http://127.0.0.1:9", &rpc, Some(5_000));

        let err = provider.get_transaction_receipt("0xabc").await.unwrap_err();
        assert_eq!(err, ProviderError::TransactionNotFound("0xabc".into()));

        let receipt = provider.get_transaction_receipt("0xabc").await.unwrap();
        assert!(receipt.is_accepted());
        assert_eq!(receipt.block_number, Some(7));

        let seen = seen.lock().await;
        assert_eq!(seen[0].body["method"], "starknet_getTransactionReceipt");
        assert_eq!(seen[0].body["params"], json!({"transaction_hash": "0xabc"}));
        assert_ne!(seen[0].body["id"], seen[1].body["id"]);
    }

    #[tokio::test]
    async fn test_other_rpc_errors_stay_rpc_errors() {
        let (rpc, _) = server::serve(vec![(
            "200 OK",
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":24,"message":"Block not found"}}"#.to_string(),
        )])
        .await;
        let provider = HttpWalletProvider::new("http://127.0.0.1:9", &rpc, Some(5_000));

        let err = provider.get_transaction_receipt("0xabc").await.unwrap_err();
        assert!(matches!(err, ProviderError::Rpc(msg) if msg.contains("code 24")));
    }
}
