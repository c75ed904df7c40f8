//! Common utilities for the NetworkAPI client
//!
//! Provides the authenticated HTTP wrapper and the request/response helpers
//! shared by every resource.

pub mod xml;

use crate::error::NetworkApiError;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// HTTP client wrapper with basic authentication
pub struct HttpClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, username: String, password: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
        }
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, self.build_url(path));
        if !self.username.is_empty() {
            builder = builder.basic_auth(&self.username, Some(&self.password));
        }
        builder
    }

    /// Map a response to its body, turning non-success statuses into errors
    async fn check(method: &Method, path: &str, response: Response) -> Result<String, NetworkApiError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == 404 {
            return Err(NetworkApiError::NotFound(format!("{} {} - {}", method, path, body)));
        }

        if !status.is_success() {
            return Err(NetworkApiError::Api(format!(
                "{} {} failed: {} - {}",
                method, path, status, body
            )));
        }

        debug!("{} {} -> {}", method, path, status);
        Ok(body)
    }

    /// Make a GET request and decode the JSON body
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, NetworkApiError> {
        debug!("GET {}", self.build_url(path));

        let response = self
            .request(Method::GET, path)
            .header("Accept", "application/json")
            .send()
            .await?;

        let body = Self::check(&Method::GET, path, response).await?;
        decode_json(&body)
    }

    /// Send a JSON body with the given method and decode the JSON answer
    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<serde_json::Value, NetworkApiError> {
        let payload = serde_json::to_string(body)?;
        debug!("{} {} with body: {}", method, self.build_url(path), payload);

        let response = self
            .request(method.clone(), path)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await?;

        let text = Self::check(&method, path, response).await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        decode_json(&text)
    }

    /// Make a POST request with a JSON body
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<serde_json::Value, NetworkApiError> {
        self.send_json(Method::POST, path, body).await
    }

    /// Make a PUT request with a JSON body
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<serde_json::Value, NetworkApiError> {
        self.send_json(Method::PUT, path, body).await
    }

    /// Make a POST request without a body (activation endpoints)
    pub async fn post_empty(&self, path: &str) -> Result<(), NetworkApiError> {
        debug!("POST {}", self.build_url(path));

        let response = self
            .request(Method::POST, path)
            .header("Accept", "application/json")
            .send()
            .await?;

        Self::check(&Method::POST, path, response).await?;
        Ok(())
    }

    /// Make a POST request with an XML body and return the raw XML answer
    pub async fn post_xml(&self, path: &str, body: String) -> Result<String, NetworkApiError> {
        debug!("POST {} with body: {}", self.build_url(path), body);

        let response = self
            .request(Method::POST, path)
            .header("Accept", "application/xml")
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .await?;

        Self::check(&Method::POST, path, response).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), NetworkApiError> {
        debug!("DELETE {}", self.build_url(path));

        let response = self.request(Method::DELETE, path).send().await?;
        Self::check(&Method::DELETE, path, response).await?;
        Ok(())
    }
}

fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, NetworkApiError> {
    serde_json::from_str(body).map_err(|e| {
        NetworkApiError::Api(format!(
            "error decoding response body: {} - Response (first 500 chars): {}",
            e,
            body.chars().take(500).collect::<String>()
        ))
    })
}

/// Build a v3 `?search=` query matching every field of `filter`
///
/// NetworkAPI v3 list endpoints take a JSON document in the `search` query
/// parameter; `extends_search` entries are AND-ed field filters.
pub fn search_query(endpoint: &str, filter: serde_json::Value) -> String {
    let search = serde_json::json!({ "extends_search": [filter] });
    format!("{}?search={}", endpoint, urlencoding::encode(&search.to_string()))
}

/// Extract and decode the list stored under `field` in a v3 envelope
/// such as `{"vips": [...]}`.
pub fn extract_field<T: DeserializeOwned>(mut envelope: serde_json::Value, field: &str) -> Result<Vec<T>, NetworkApiError> {
    let Some(entry) = envelope.get_mut(field).map(serde_json::Value::take) else {
        return Err(NetworkApiError::Api(format!(
            "field {:?} not found in result {}",
            field, envelope
        )));
    };
    Ok(serde_json::from_value(entry)?)
}

/// Wrap a single object in the v3 request envelope
pub fn envelope<T: Serialize>(field: &str, obj: &T) -> Result<serde_json::Value, NetworkApiError> {
    let mut map = serde_json::Map::new();
    map.insert(field.to_string(), serde_json::Value::Array(vec![serde_json::to_value(obj)?]));
    Ok(serde_json::Value::Object(map))
}

/// Decode the `[{"id": N}]` body returned by create endpoints, requiring
/// exactly one id.
pub fn single_created_id(kind: &str, body: serde_json::Value) -> Result<u64, NetworkApiError> {
    #[derive(serde::Deserialize)]
    struct Created {
        id: u64,
    }

    let created: Vec<Created> = serde_json::from_value(body.clone())?;
    match created.as_slice() {
        [one] => Ok(one.id),
        [] => Err(NetworkApiError::Api(format!("no {} created: {}", kind, body))),
        _ => Err(NetworkApiError::Api(format!("multiple {} created: {}", kind, body))),
    }
}
