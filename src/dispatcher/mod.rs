//! HTTP call dispatch: two coexisting strategies selected by whether a tool
//! carries a structured `request` block.
//!
//! The actual network call goes through the `HttpTransport` trait rather
//! than a bare `reqwest::Client`, so the request-assembly and
//! response-shaping logic below can be exercised with a fake transport in
//! tests — a deliberate seam this crate adds that the call-building logic
//! it's modeled on did not need, since that code was only ever unit tested
//! against assertion/extraction primitives, not the request builder itself.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::errors::StepExecutionError;
use crate::protocol::{AuthConfig, AuthType, HttpMethod, LegacyAuthType, ToolConfig, ToolDefinition};
use crate::{path, template};

static PATH_PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid path placeholder regex"));

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A fully assembled HTTP request, ready to hand to a transport.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// The shape of a response a transport hands back: status plus a parsed
/// JSON value (non-JSON bodies are wrapped as `{"text": "..."}`).
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, StepExecutionError>;
}

/// The production transport, backed by one shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, StepExecutionError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            StepExecutionError::Dispatch(format!("request to '{}' failed: {e}", request.url))
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let text = response.text().await.map_err(|e| {
            StepExecutionError::Dispatch(format!("reading response from '{}' failed: {e}", request.url))
        })?;

        let body = if text.is_empty() {
            Value::Null
        } else if content_type.contains("json") {
            serde_json::from_str(&text).map_err(|e| {
                StepExecutionError::Dispatch(format!(
                    "invalid JSON response from '{}': {e}",
                    request.url
                ))
            })?
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| json!({"text": text}))
        };

        tracing::info!(status, "dispatched http request");
        Ok(RawResponse { status, body })
    }
}

/// Dispatches one call, selecting the structured or legacy path by whether
/// `tool.request` is present.
pub async fn dispatch(
    transport: &dyn HttpTransport,
    tool: &ToolDefinition,
    resolved_inputs: HashMap<String, Value>,
    tool_config: &ToolConfig,
    timeout: Duration,
) -> Result<Value, StepExecutionError> {
    if tool.is_structured() {
        dispatch_structured(transport, tool, resolved_inputs, tool_config, timeout).await
    } else {
        dispatch_legacy(transport, tool, resolved_inputs, tool_config, timeout).await
    }
}

async fn dispatch_structured(
    transport: &dyn HttpTransport,
    tool: &ToolDefinition,
    resolved_inputs: HashMap<String, Value>,
    tool_config: &ToolConfig,
    timeout: Duration,
) -> Result<Value, StepExecutionError> {
    let request_spec = tool
        .request
        .as_ref()
        .expect("dispatch_structured is only called when tool.request is present");

    let mut remaining = resolved_inputs.clone();
    let mut path_values = HashMap::new();
    for name in &request_spec.path_params {
        if let Some(v) = remaining.remove(name) {
            path_values.insert(name.clone(), v);
        }
    }
    let mut query_values = HashMap::new();
    for name in &request_spec.query_params {
        if let Some(v) = remaining.remove(name) {
            query_values.insert(name.clone(), v);
        }
    }

    let substituted_path = substitute_path_required(&tool.path, &path_values)?;
    let mut url = format!("{}{}", tool.base_url.trim_end_matches('/'), substituted_path);
    let query_string = encode_query(&query_values);
    if !query_string.is_empty() {
        url.push('?');
        url.push_str(&query_string);
    }

    let mut headers = HashMap::new();
    if let Some(auth) = &tool.auth {
        if let Some((name, value)) = structured_auth_header(auth, tool_config) {
            headers.insert(name, value);
        }
    }
    // Full resolved inputs, not the popped-down remainder: path/query values
    // stay available to header and body templates by name.
    let mut header_names: Vec<&String> = request_spec.headers.keys().collect();
    header_names.sort();
    for name in header_names {
        let rendered = template::render_value(&request_spec.headers[name], &resolved_inputs, false)
            .map_err(StepExecutionError::Template)?;
        let rendered_str = stringify(&rendered);
        if !rendered_str.contains("{{") {
            headers.insert(name.clone(), rendered_str);
        }
    }

    let body = match &request_spec.body {
        Some(template_value) => Some(
            template::render_value(template_value, &resolved_inputs, true)
                .map_err(StepExecutionError::Template)?,
        ),
        None => None,
    };

    let request = PreparedRequest {
        method: tool.method.as_reqwest(),
        url,
        headers,
        body,
        timeout,
    };

    let response = transport.send(request).await?;
    ensure_success(tool, &response)?;
    shape_response(tool, &response.body)
}

async fn dispatch_legacy(
    transport: &dyn HttpTransport,
    tool: &ToolDefinition,
    resolved_inputs: HashMap<String, Value>,
    tool_config: &ToolConfig,
    timeout: Duration,
) -> Result<Value, StepExecutionError> {
    let mut remaining = resolved_inputs;
    let substituted_path = substitute_path_consuming(&tool.path, &mut remaining)?;
    let mut url = format!("{}{}", tool.base_url.trim_end_matches('/'), substituted_path);

    let mut headers = HashMap::new();
    if let Some((name, value)) = legacy_auth_header(tool, tool_config) {
        headers.insert(name, value);
    }

    let is_query_method = matches!(tool.method, HttpMethod::Get | HttpMethod::Delete);
    let body = if is_query_method {
        let query_string = encode_query(&remaining);
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }
        None
    } else {
        Some(Value::Object(remaining.into_iter().collect()))
    };

    let request = PreparedRequest {
        method: tool.method.as_reqwest(),
        url,
        headers,
        body,
        timeout,
    };

    let response = transport.send(request).await?;
    ensure_success(tool, &response)?;
    shape_response(tool, &response.body)
}

fn substitute_path_required(
    path: &str,
    values: &HashMap<String, Value>,
) -> Result<String, StepExecutionError> {
    let mut missing = None;
    let result = PATH_PLACEHOLDER_RE.replace_all(path, |caps: &regex::Captures| {
        let name = &caps[1];
        match values.get(name) {
            Some(v) => urlencoding::encode(&stringify(v)).into_owned(),
            None => {
                missing = Some(name.to_string());
                String::new()
            }
        }
    });
    if let Some(name) = missing {
        return Err(StepExecutionError::Dispatch(format!("missing path value '{name}'")));
    }
    Ok(result.into_owned())
}

fn substitute_path_consuming(
    path: &str,
    values: &mut HashMap<String, Value>,
) -> Result<String, StepExecutionError> {
    let names: Vec<String> = PATH_PLACEHOLDER_RE
        .captures_iter(path)
        .map(|c| c[1].to_string())
        .collect();
    let mut path_values = HashMap::new();
    for name in &names {
        if let Some(v) = values.remove(name) {
            path_values.insert(name.clone(), v);
        }
    }
    substitute_path_required(path, &path_values)
}

fn encode_query(values: &HashMap<String, Value>) -> String {
    let mut names: Vec<&String> = values.keys().collect();
    names.sort();
    let mut parts = Vec::new();
    for name in names {
        match &values[name] {
            Value::Null => continue,
            Value::Array(items) => {
                for item in items {
                    parts.push(format!(
                        "{}={}",
                        urlencoding::encode(name),
                        urlencoding::encode(&stringify(item))
                    ));
                }
            }
            other => parts.push(format!(
                "{}={}",
                urlencoding::encode(name),
                urlencoding::encode(&stringify(other))
            )),
        }
    }
    parts.join("&")
}

fn structured_auth_header(auth: &AuthConfig, config: &ToolConfig) -> Option<(String, String)> {
    match auth.auth_type {
        AuthType::None => None,
        AuthType::Bearer => config
            .token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| ("Authorization".to_string(), format!("Bearer {t}"))),
        AuthType::ApiKey => {
            let header_name = auth.header.clone().unwrap_or_else(|| "X-API-Key".to_string());
            config
                .token
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(|t| (header_name, t.clone()))
        }
        AuthType::Basic => {
            let user = config.username.clone().unwrap_or_default();
            let pass = config.password.clone().unwrap_or_default();
            if user.is_empty() && pass.is_empty() {
                None
            } else {
                use base64::{engine::general_purpose::STANDARD, Engine as _};
                let encoded = STANDARD.encode(format!("{user}:{pass}"));
                Some(("Authorization".to_string(), format!("Basic {encoded}")))
            }
        }
    }
}

fn legacy_auth_header(tool: &ToolDefinition, config: &ToolConfig) -> Option<(String, String)> {
    match tool.auth_type.as_ref()? {
        LegacyAuthType::None => None,
        LegacyAuthType::ApiKey => {
            let header = tool.auth_header.clone().unwrap_or_else(|| "X-API-Key".to_string());
            config
                .token
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(|t| (header, t.clone()))
        }
        LegacyAuthType::Bearer => config
            .token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| ("Authorization".to_string(), format!("Bearer {t}"))),
    }
}

fn ensure_success(tool: &ToolDefinition, response: &RawResponse) -> Result<(), StepExecutionError> {
    if (200..300).contains(&response.status) {
        Ok(())
    } else {
        Err(StepExecutionError::Dispatch(format!(
            "tool '{}' returned status {}",
            tool.id, response.status
        )))
    }
}

fn shape_response(tool: &ToolDefinition, body: &Value) -> Result<Value, StepExecutionError> {
    if let Some(extract) = &tool.response_extract {
        let mut names: Vec<&String> = extract.fields.keys().collect();
        names.sort();

        let mut out = Map::with_capacity(names.len());
        for field_name in names {
            let path_expr = &extract.fields[field_name];
            match path::traverse(body, path_expr) {
                Ok(v) => {
                    out.insert(field_name.clone(), v.clone());
                }
                Err(e) if extract.strict => return Err(StepExecutionError::Extraction(e)),
                Err(_) => {
                    out.insert(field_name.clone(), Value::Null);
                }
            }
        }
        Ok(Value::Object(out))
    } else if let Value::Array(items) = body {
        Ok(json!({"items": items, "count": items.len()}))
    } else {
        Ok(body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestSpec, ResponseExtract};
    use std::sync::Mutex;

    struct FakeTransport {
        response: RawResponse,
        captured: Mutex<Option<PreparedRequest>>,
    }

    impl FakeTransport {
        fn returning(status: u16, body: Value) -> Self {
            Self { response: RawResponse { status, body }, captured: Mutex::new(None) }
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn send(&self, request: PreparedRequest) -> Result<RawResponse, StepExecutionError> {
            *self.captured.lock().unwrap() = Some(request);
            Ok(self.response.clone())
        }
    }

    fn structured_tool(body_template: Value) -> ToolDefinition {
        ToolDefinition {
            id: "create_order".to_string(),
            name: "Create order".to_string(),
            base_url: "https://api.test".to_string(),
            method: HttpMethod::Post,
            path: "/orders".to_string(),
            auth_type: None,
            auth_header: None,
            parameters: vec![],
            auth: None,
            request: Some(RequestSpec { path_params: vec![], query_params: vec![], headers: HashMap::new(), body: Some(body_template) }),
            response_extract: None,
        }
    }

    #[tokio::test]
    async fn structured_post_preserves_body_types() {
        let tool = structured_tool(json!({
            "customer": {"email": "{{email}}"},
            "items": "{{lines}}",
        }));
        let mut inputs = HashMap::new();
        inputs.insert("email".to_string(), json!("a@b"));
        inputs.insert("lines".to_string(), json!([{"sku": 1}, {"sku": 2}]));

        let transport = FakeTransport::returning(201, json!({"id": "o1"}));
        let config = ToolConfig::default();
        let result = dispatch(&transport, &tool, inputs, &config, Duration::from_secs(30)).await.unwrap();
        assert_eq!(result, json!({"id": "o1"}));

        let captured = transport.captured.lock().unwrap().take().unwrap();
        let body = captured.body.unwrap();
        assert_eq!(body["items"], json!([{"sku": 1}, {"sku": 2}]));
        assert_eq!(body["customer"]["email"], json!("a@b"));
    }

    #[tokio::test]
    async fn strict_extraction_miss_is_an_error() {
        let mut tool = structured_tool(json!({}));
        tool.response_extract = Some(ResponseExtract {
            fields: HashMap::from([("order_id".to_string(), "data.order.id".to_string())]),
            strict: true,
        });

        let transport = FakeTransport::returning(200, json!({"data": {"order": {}}}));
        let config = ToolConfig::default();
        let err = dispatch(&transport, &tool, HashMap::new(), &config, Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, StepExecutionError::Extraction(_)));
    }

    #[tokio::test]
    async fn legacy_get_wraps_list_response() {
        let tool = ToolDefinition {
            id: "list_users".to_string(),
            name: "List users".to_string(),
            base_url: "https://api.test".to_string(),
            method: HttpMethod::Get,
            path: "/users".to_string(),
            auth_type: None,
            auth_header: None,
            parameters: vec![],
            auth: None,
            request: None,
            response_extract: None,
        };

        let transport = FakeTransport::returning(200, json!([1, 2, 3]));
        let config = ToolConfig::default();
        let result = dispatch(&transport, &tool, HashMap::new(), &config, Duration::from_secs(30)).await.unwrap();
        assert_eq!(result, json!({"items": [1, 2, 3], "count": 3}));
    }

    #[tokio::test]
    async fn legacy_empty_auth_token_emits_no_header() {
        let tool = ToolDefinition {
            id: "list_users".to_string(),
            name: "List users".to_string(),
            base_url: "https://api.test".to_string(),
            method: HttpMethod::Get,
            path: "/users".to_string(),
            auth_type: Some(LegacyAuthType::Bearer),
            auth_header: None,
            parameters: vec![],
            auth: None,
            request: None,
            response_extract: None,
        };

        let transport = FakeTransport::returning(200, json!({}));
        let config = ToolConfig::default();
        dispatch(&transport, &tool, HashMap::new(), &config, Duration::from_secs(30)).await.unwrap();

        let captured = transport.captured.lock().unwrap().take().unwrap();
        assert!(!captured.headers.contains_key("Authorization"));
    }

    #[tokio::test]
    async fn missing_path_value_is_fatal() {
        let tool = structured_tool(json!({}));
        let mut tool = tool;
        tool.path = "/orders/{order_id}".to_string();
        tool.request.as_mut().unwrap().path_params = vec!["order_id".to_string()];

        let transport = FakeTransport::returning(200, json!({}));
        let config = ToolConfig::default();
        let err = dispatch(&transport, &tool, HashMap::new(), &config, Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, StepExecutionError::Dispatch(_)));
    }

    #[tokio::test]
    async fn non_2xx_status_is_an_error() {
        let tool = structured_tool(json!({}));
        let transport = FakeTransport::returning(500, json!({"error": "boom"}));
        let config = ToolConfig::default();
        let err = dispatch(&transport, &tool, HashMap::new(), &config, Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, StepExecutionError::Dispatch(_)));
    }
}
