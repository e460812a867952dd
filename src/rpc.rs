use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::DiffExprError;

#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(
        url: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, DiffExprError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-de/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DiffExprError::ServiceHttp(err.to_string()))?,
        );
        if let Some(token) = token {
            if !token.trim().is_empty() {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(token.trim())
                        .map_err(|err| DiffExprError::ServiceHttp(err.to_string()))?,
                );
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| DiffExprError::ServiceHttp(err.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn call<P, R>(&self, method: &str, params: &P) -> Result<R, DiffExprError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)
            .map_err(|err| DiffExprError::MalformedResponse(format!("{method}: {err}")))?;
        let value = self.call_value(method, &Value::Array(vec![params]))?;
        serde_json::from_value(value).map_err(|err| {
            DiffExprError::MalformedResponse(format!("{method}: {err}"))
        })
    }

    fn call_value(&self, method: &str, params: &Value) -> Result<Value, DiffExprError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "method": method,
            "params": params,
            "version": "1.1",
            "id": format!("{}-{id}", std::process::id()),
        });
        debug!(method, url = %self.url, "rpc call");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(|err| DiffExprError::ServiceHttp(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| DiffExprError::ServiceHttp(err.to_string()))?;

        let payload: Option<Value> = serde_json::from_str(&text).ok();
        if let Some(message) = payload.as_ref().and_then(rpc_error_message) {
            return Err(DiffExprError::ServiceCall {
                method: method.to_string(),
                message,
            });
        }
        if !status.is_success() {
            return Err(DiffExprError::ServiceStatus {
                status: status.as_u16(),
                message: text,
            });
        }

        let payload = payload.ok_or_else(|| {
            DiffExprError::MalformedResponse(format!("{method}: response is not JSON"))
        })?;
        extract_result(method, payload)
    }
}

fn rpc_error_message(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    if error.is_null() {
        return None;
    }
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    Some(message)
}

pub(crate) fn extract_result(method: &str, payload: Value) -> Result<Value, DiffExprError> {
    match payload.get("result") {
        Some(Value::Array(items)) => Ok(items.first().cloned().unwrap_or(Value::Null)),
        Some(Value::Null) | None => Err(DiffExprError::MalformedResponse(format!(
            "{method}: missing result"
        ))),
        Some(other) => Ok(other.clone()),
    }
}
