use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    error::{ClientError, ClientResult},
    protocol::{Params, RpcPayload},
};
use tracing::{debug, error, warn};
use url::Url;

/// Invokes a named remote procedure with a flat parameter set.
///
/// Implementations collapse transport and application failures into
/// `Err`; a returned payload always had `ok: true`.
#[async_trait]
pub trait RemoteProcedureClient: Send + Sync {
    async fn call(&self, method: &str, params: Params) -> ClientResult<RpcPayload>;
}

/// Form-encoded POST to `<base_url>/<method>`, authenticated with a token
/// parameter.
pub struct HttpRemoteProcedureClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl HttpRemoteProcedureClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> anyhow::Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid api base url: {base_url}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(anyhow!("api base url must start with http:// or https://"));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            token: token.into(),
        })
    }

    fn endpoint(&self, method: &str) -> ClientResult<Url> {
        self.base_url
            .join(method)
            .map_err(|err| ClientError::transport(method, err))
    }
}

#[async_trait]
impl RemoteProcedureClient for HttpRemoteProcedureClient {
    async fn call(&self, method: &str, mut params: Params) -> ClientResult<RpcPayload> {
        let url = self.endpoint(method)?;
        params.insert("token", self.token.as_str());
        debug!(method, "rpc: calling remote method");

        let response = self
            .http
            .post(url)
            .form(&params.into_form())
            .send()
            .await
            .map_err(|err| {
                error!(method, error = %err, "rpc: request failed");
                ClientError::transport(method, err)
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(method, %status, "rpc: unexpected http status");
            return Err(ClientError::transport(method, format!("http status {status}")));
        }

        let body = response.text().await.map_err(|err| {
            error!(method, error = %err, "rpc: failed to read response body");
            ClientError::transport(method, err)
        })?;
        decode_envelope(method, &body)
    }
}

/// Checks the `{ ok, error, warning }` envelope of a response body.
pub(crate) fn decode_envelope(method: &str, body: &str) -> ClientResult<RpcPayload> {
    let payload: RpcPayload = serde_json::from_str(body).map_err(|err| {
        error!(method, error = %err, "rpc: response is not a json object");
        ClientError::decode(method, err)
    })?;

    if let Some(warning) = payload.get("warning").and_then(Value::as_str) {
        warn!(method, warning, "rpc: remote warning");
    }

    if payload.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(payload);
    }

    let error = payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string();
    error!(method, %error, "rpc: call rejected");
    Err(ClientError::Api {
        method: method.to_string(),
        error,
    })
}

pub(crate) fn decode_payload<T: DeserializeOwned>(
    method: &str,
    payload: RpcPayload,
) -> ClientResult<T> {
    serde_json::from_value(Value::Object(payload)).map_err(|err| {
        error!(method, error = %err, "rpc: unexpected response shape");
        ClientError::decode(method, err)
    })
}
