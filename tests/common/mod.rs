//! Shared fixtures: an in-process pet API that records every request

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// One request as the server saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub line: String,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Requests seen so far
#[derive(Debug, Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<Recorded>>>);

impl RequestLog {
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|r| r.line.clone()).collect()
    }

    pub fn last(&self) -> Option<Recorded> {
        self.0.lock().unwrap().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

async fn record(
    State(log): State<RequestLog>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    log.0.lock().unwrap().push(Recorded {
        line: format!("{method} {uri}"),
        headers,
        body: payload.clone(),
    });

    let (status, reply) = match (method.as_str(), uri.path()) {
        ("GET", "/pets") => (StatusCode::OK, json!([{ "id": 1, "name": "Rex" }])),
        ("POST", "/pets") => (StatusCode::CREATED, payload),
        ("DELETE", path) if path.starts_with("/pets/") => (
            StatusCode::OK,
            json!({ "deleted": path.trim_start_matches("/pets/") }),
        ),
        ("GET", "/forecast") => (StatusCode::OK, json!({ "forecast": "sunny" })),
        _ => (StatusCode::NOT_FOUND, json!({ "message": "not found" })),
    };
    (status, Json(reply))
}

/// Start the mock API on an ephemeral port; returns its base URL
pub async fn spawn_api() -> (String, RequestLog) {
    let log = RequestLog::default();
    let app = Router::new().fallback(record).with_state(log.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), log)
}

/// Petstore document; `servers` is overridden by the tests
pub fn petstore() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": { "title": "Petstore", "version": "1.0.0" },
        "servers": [{ "url": "http://127.0.0.1:9" }],
        "security": [{ "api_key": [] }],
        "paths": {
            "/pets": {
                "get": {
                    "operationId": "listPets",
                    "summary": "List all pets",
                    "parameters": [
                        { "name": "limit", "in": "query", "schema": { "type": "integer" } }
                    ]
                },
                "post": {
                    "operationId": "createPet",
                    "summary": "Create a pet",
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": { "schema": { "$ref": "#/components/schemas/Pet" } }
                        }
                    }
                }
            },
            "/pets/{petId}": {
                "delete": {
                    "operationId": "deletePet",
                    "summary": "Delete a pet",
                    "parameters": [
                        { "name": "petId", "in": "path", "required": true, "schema": { "type": "integer" } }
                    ]
                }
            },
            "/missing": {
                "get": { "operationId": "getMissing" }
            }
        },
        "components": {
            "schemas": {
                "Pet": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": { "type": "string" },
                        "tag": { "type": "string" }
                    }
                }
            },
            "securitySchemes": {
                "api_key": { "type": "apiKey", "name": "X-API-Key", "in": "header" }
            }
        }
    })
}

/// Weather document with one `get` operation
pub fn weather() -> Value {
    json!({
        "info": { "title": "Weather" },
        "servers": [{ "url": "http://127.0.0.1:9" }],
        "paths": {
            "/forecast": {
                "get": {
                    "operationId": "get",
                    "parameters": [
                        { "name": "city", "in": "query", "required": true, "schema": { "type": "string" } }
                    ]
                }
            }
        }
    })
}
