//! Access log middleware
//!
//! Records one entry per note request once the response is ready. The entry
//! goes to the write buffer queue; the response never waits on the database.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Request},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use futures::future::BoxFuture;
use std::{net::SocketAddr, task::{Context, Poll}, time::Instant};
use tower::{Layer, Service};

use crate::db::{AccessLogEntry, WriteSender};
use crate::user_agent;

/// Only note reads are recorded
const LOGGED_PREFIX: &str = "/api/notes";

/// Paths never recorded (admin, docs, probes)
const EXCLUDED_PREFIXES: &[&str] = &["/api/admin/", "/docs", "/openapi.json", "/health", "/favicon.ico"];

const VISITOR_HEADER: &str = "x-visitor-id";
const VISITOR_COOKIE: &str = "visitor_id";

fn is_loggable(path: &str) -> bool {
    path.starts_with(LOGGED_PREFIX) && !EXCLUDED_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Get the real client IP address, checking proxy headers first
/// Priority: X-Real-IP > X-Forwarded-For (first IP) > ConnectInfo
fn get_real_ip(headers: &HeaderMap, fallback_ip: &str) -> String {
    // Try X-Real-IP first (set by Caddy/nginx)
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    // Try X-Forwarded-For (may contain chain of IPs, first is original client)
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(ips) = forwarded.to_str() {
            if let Some(first_ip) = ips.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    // Fallback to direct connection IP
    fallback_ip.to_string()
}

/// Visitor id from the X-Visitor-Id header, else the visitor_id cookie
fn get_visitor_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(VISITOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            CookieJar::from_headers(headers)
                .get(VISITOR_COOKIE)
                .map(|c| c.value().to_string())
        })
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Layer for access logging
#[derive(Clone)]
pub struct RequestLoggingLayer {
    write_tx: WriteSender,
}

impl RequestLoggingLayer {
    pub fn new(write_tx: WriteSender) -> Self {
        Self { write_tx }
    }
}

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingMiddleware {
            inner,
            write_tx: self.write_tx.clone(),
        }
    }
}

/// Middleware service for access logging
#[derive(Clone)]
pub struct RequestLoggingMiddleware<S> {
    inner: S,
    write_tx: WriteSender,
}

impl<S> Service<Request<Body>> for RequestLoggingMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let write_tx = self.write_tx.clone();
        let mut inner = self.inner.clone();

        let path = request.uri().path().to_string();
        if !is_loggable(&path) {
            return Box::pin(inner.call(request));
        }

        Box::pin(async move {
            let started = Instant::now();

            // Extract request info before passing to handler
            let method = request.method().to_string();
            let headers = request.headers().clone();

            // Get client IP - check proxy headers first, then fallback to socket
            let fallback_ip = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let ip = get_real_ip(&headers, &fallback_ip);

            let response = inner.call(request).await?;

            let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;
            let status = response.status().as_u16();
            let ua = header_string(&headers, header::USER_AGENT);
            let ua_info = user_agent::parse(&ua);

            let entry = AccessLogEntry::new(ip, method, path, status)
                .with_visitor_id(get_visitor_id(&headers))
                .with_user_agent(ua, &ua_info)
                .with_referer(header_string(&headers, header::REFERER))
                .with_response_time(response_time_ms);

            tracing::debug!("{} {} -> {} from {}", entry.method, entry.path, status, entry.ip);

            // Queue for the write buffer (non-blocking)
            write_tx.record(entry);

            Ok(response)
        })
    }
}
