// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for statewalk-core integration tests.
//!
//! Provides an in-memory orders API answering through [`MockTransport`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use statewalk_core::Catalog;
use statewalk_core::transport::{MockTransport, Response};
use statewalk_dsl::HttpMethod;

/// Schema of the orders API.
pub fn orders_schema() -> Value {
    let order = json!({
        "type": "object",
        "properties": {
            "id": {"type": "integer"},
            "product": {"type": "string"}
        }
    });
    let order_id = json!({
        "name": "orderId", "in": "path", "required": true, "schema": {"type": "integer"}
    });
    json!({
        "paths": {
            "/orders": {"post": {
                "operationId": "createOrder",
                "requestBody": {"content": {"application/json": {"schema": {
                    "type": "object",
                    "required": ["product"],
                    "properties": {"product": {"type": "string"}}
                }}}},
                "responses": {"201": {"content": {"application/json": {"schema": order}}}}
            }},
            "/orders/{orderId}": {
                "parameters": [order_id],
                "get": {
                    "operationId": "getOrder",
                    "responses": {
                        "200": {"content": {"application/json": {"schema": order}}},
                        "404": {}
                    }
                },
                "delete": {
                    "operationId": "deleteOrder",
                    "responses": {"204": {}, "404": {}}
                }
            }
        }
    })
}

pub fn orders_catalog() -> Catalog {
    Catalog::build(&orders_schema()).unwrap()
}

/// In-memory orders service.
///
/// With `forgetful_delete` set, DELETE answers 204 but keeps the order.
#[derive(Clone, Default)]
pub struct OrdersApi {
    orders: Arc<Mutex<HashMap<i64, Value>>>,
    next_id: Arc<AtomicI64>,
    forgetful_delete: bool,
}

impl OrdersApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forgetful() -> Self {
        Self {
            forgetful_delete: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn transport(&self) -> MockTransport {
        let api = self.clone();
        MockTransport::new(move |request| {
            let path = request.render_path();
            let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
            let response = match (request.method, segments.as_slice()) {
                (HttpMethod::Post, ["orders"]) => {
                    let id = api.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                    let product = request
                        .body
                        .as_ref()
                        .and_then(|b| b.get("product"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    let order = json!({"id": id, "product": product});
                    api.orders.lock().unwrap().insert(id, order.clone());
                    Response::new(201)
                        .with_header("Location", format!("/orders/{}", id))
                        .with_json(order)
                }
                (HttpMethod::Get, ["orders", id]) => {
                    match id.parse::<i64>().ok().and_then(|id| api.orders.lock().unwrap().get(&id).cloned()) {
                        Some(order) => Response::new(200).with_json(order),
                        None => Response::new(404),
                    }
                }
                (HttpMethod::Delete, ["orders", id]) => {
                    let id = id.parse::<i64>().ok();
                    let mut orders = api.orders.lock().unwrap();
                    let found = match id {
                        Some(id) if api.forgetful_delete => orders.contains_key(&id),
                        Some(id) => orders.remove(&id).is_some(),
                        None => false,
                    };
                    Response::new(if found { 204 } else { 404 })
                }
                _ => Response::new(405),
            };
            Ok(response)
        })
    }
}
