// SPDX-License-Identifier: MIT
//! Stub upstream providers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::extract::RawQuery;
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use forecast_otel::forecast::{Daily, DailyUnits, ForecastResult};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// One-day Berlin payload served by the stub upstream.
pub fn one_day_forecast() -> ForecastResult {
    ForecastResult {
        latitude: 52.52,
        longitude: 13.419998,
        generationtime_ms: 0.0269,
        utc_offset_seconds: 3600,
        timezone: "Europe/Berlin".into(),
        timezone_abbreviation: "CET".into(),
        elevation: 38.0,
        daily_units: DailyUnits {
            time: "iso8601".into(),
            temperature_2m_max: "°C".into(),
            temperature_2m_min: "°C".into(),
            daylight_duration: "s".into(),
        },
        daily: Daily {
            time: vec!["2024-01-01".into()],
            temperature_2m_max: vec![5.0],
            temperature_2m_min: vec![-1.0],
            daylight_duration: vec![28_248.12],
        },
    }
}

/// Upstream answering every `/v1/forecast` call with a fixed status and body.
pub struct StubUpstream {
    pub base_url: String,
    queries: Arc<Mutex<Vec<String>>>,
}

impl StubUpstream {
    /// Raw query strings received so far.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

pub async fn spawn_upstream(status: StatusCode, body: impl Into<String>) -> StubUpstream {
    let body: String = body.into();
    let queries = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&queries);

    let app = Router::new().route(
        "/v1/forecast",
        get(move |RawQuery(query): RawQuery| async move {
            recorded.lock().push(query.unwrap_or_default());
            (status, [(header::CONTENT_TYPE, "application/json")], body)
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    StubUpstream {
        base_url: format!("http://{addr}"),
        queries,
    }
}

/// Upstream that reads the request and never answers.
pub struct HangingUpstream {
    pub base_url: String,
    /// Fires once the full request head has arrived.
    pub received: oneshot::Receiver<()>,
    /// Fires once the client closed the connection.
    pub disconnected: oneshot::Receiver<()>,
}

pub async fn spawn_hanging_upstream() -> HangingUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received_tx, received) = oneshot::channel();
    let (disconnected_tx, disconnected) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let mut head = Vec::new();
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        let _ = received_tx.send(());

        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = disconnected_tx.send(());
    });

    HangingUpstream {
        base_url: format!("http://{addr}"),
        received,
        disconnected,
    }
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Helper to make a GET request and collect the response.
pub async fn get_body(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = tower::ServiceExt::oneshot(app, get_request(uri))
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, body.to_vec())
}
