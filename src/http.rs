//! HTTP API for planning sheets
//!
//! ## Sheets
//! - `GET /api/sheet?level&year&period` - Resolve (or create) a sheet with its
//!   categories, parent plan, breadcrumbs and drill-down targets
//! - `POST /api/cell` - Update one cell
//! - `GET /api/current?level` - Coordinate containing today
//!
//! ## Account
//! - `POST /api/guest/sync` - Merge guest data into the signed-in user
//! - `GET /api/profile`, `PUT /api/profile` - Birth year (signed-in only)
//! - `GET /api/doc-links`, `POST /api/doc-links` - Owner document links
//!
//! ## Example Usage
//!
//! ```bash
//! # Open this week's sheet as a guest (cookie is issued on first call)
//! curl -c jar -b jar "http://localhost:8095/api/sheet?level=week"
//!
//! # Write a cell
//! curl -b jar -X POST -H "Content-Type: application/json" \
//!      -d '{"sheetId":"...","categoryId":"career","columnKey":"plan","content":"Draft talk"}' \
//!      http://localhost:8095/api/cell
//! ```

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{Local, NaiveDate};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderValue, SET_COOKIE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::db::{CreateDocLinkInput, UpdateProfileInput};
use crate::error::SheetError;
use crate::identity::{GuestToken, IdentityResolver, RequestIdentity};
use crate::period::Level;
use crate::services::{
    created, error_response, method_not_allowed, not_found, ok, SheetQuery, Services,
    UpdateCellInput,
};

type HttpResult = Result<Response<Full<Bytes>>, SheetError>;

#[derive(Debug, Default, Deserialize)]
struct CurrentQuery {
    #[serde(default)]
    level: Option<String>,
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    identity: Arc<IdentityResolver>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, identity: Arc<IdentityResolver>, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            identity,
            bind_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), SheetError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    pub async fn handle_request<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, hyper::Error>
    where
        B: Body,
        B::Error: Display,
    {
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or("").to_string();
        let method = req.method().clone();
        let identity = self.identity.resolve(req.headers());
        let guest_cookie_sent = self.identity.cookie().is_present(req.headers());

        debug!(method = %method, path = %path, "Incoming request");

        let result = match (method, path.as_str()) {
            (Method::GET, "/health") => self.handle_health(),

            (Method::GET, "/api/sheet") => self.handle_get_sheet(identity, &query),
            (Method::POST, "/api/cell") => self.handle_update_cell(identity, req).await,
            (Method::GET, "/api/current") => self.handle_current(identity, &query),

            (Method::POST, "/api/guest/sync") => self.handle_guest_sync(identity, guest_cookie_sent),

            (Method::GET, "/api/profile") => self
                .services
                .sheets
                .get_profile(&identity)
                .map(|profile| ok(&profile)),
            (Method::PUT, "/api/profile") => self.handle_update_profile(identity, req).await,

            (Method::GET, "/api/doc-links") => self
                .services
                .sheets
                .list_doc_links(&identity)
                .map(|links| ok(&links)),
            (Method::POST, "/api/doc-links") => self.handle_create_doc_link(identity, req).await,

            (_, "/api/sheet" | "/api/cell" | "/api/current" | "/api/guest/sync" | "/api/profile"
                | "/api/doc-links") => Ok(method_not_allowed()),

            _ => Ok(not_found("Not found")),
        };

        Ok(result.unwrap_or_else(error_response))
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    /// Health check endpoint
    fn handle_health(&self) -> HttpResult {
        let stats = self.services.sheets.stats()?;
        Ok(ok(&serde_json::json!({
            "status": "ok",
            "sheets": stats.sheet_count,
            "cells": stats.cell_count,
            "owners": stats.owner_count,
            "doc_links": stats.doc_link_count,
        })))
    }

    /// GET /api/sheet - issues a guest token to callers with no identity
    fn handle_get_sheet(&self, mut identity: RequestIdentity, query: &str) -> HttpResult {
        let query: SheetQuery = parse_query(query)?;

        let issued = match identity.owner_id() {
            Some(_) => None,
            None => {
                let token = GuestToken::generate();
                identity.guest = Some(token);
                info!(guest = %token.owner_id(), "Issued guest token");
                Some(token)
            }
        };

        let view = self.services.sheets.open_sheet(&identity, &query, self.today())?;
        let response = ok(&view);

        match issued {
            Some(token) => with_cookie(response, &self.identity.cookie().issue(&token)),
            None => Ok(response),
        }
    }

    async fn handle_update_cell<B>(&self, identity: RequestIdentity, req: Request<B>) -> HttpResult
    where
        B: Body,
        B::Error: Display,
    {
        let input: UpdateCellInput = read_json(req).await?;
        let cell = self.services.sheets.update_cell(&identity, &input)?;
        Ok(ok(&cell))
    }

    fn handle_current(&self, identity: RequestIdentity, query: &str) -> HttpResult {
        let query: CurrentQuery = parse_query(query)?;
        let level = match query.level.as_deref() {
            Some(raw) => raw.parse::<Level>()?,
            None => Level::Week,
        };
        let current = self.services.sheets.current(&identity, level, self.today())?;
        Ok(ok(&current))
    }

    /// POST /api/guest/sync - the guest cookie is only cleared once the merge
    /// completed. An unreadable cookie is cleared too.
    fn handle_guest_sync(&self, identity: RequestIdentity, guest_cookie_sent: bool) -> HttpResult {
        let outcome = self.services.sheets.sync_guest(&identity)?;
        let response = ok(&outcome);

        if guest_cookie_sent {
            with_cookie(response, &self.identity.cookie().clear())
        } else {
            Ok(response)
        }
    }

    async fn handle_update_profile<B>(&self, identity: RequestIdentity, req: Request<B>) -> HttpResult
    where
        B: Body,
        B::Error: Display,
    {
        // Reject anonymous callers before reading the body
        identity.require_user()?;
        let input: UpdateProfileInput = read_json(req).await?;
        let profile = self.services.sheets.update_profile(&identity, &input)?;
        Ok(ok(&profile))
    }

    async fn handle_create_doc_link<B>(&self, identity: RequestIdentity, req: Request<B>) -> HttpResult
    where
        B: Body,
        B::Error: Display,
    {
        let input: CreateDocLinkInput = read_json(req).await?;
        let link = self.services.sheets.create_doc_link(&identity, &input)?;
        Ok(created(&link))
    }
}

fn parse_query<T: DeserializeOwned>(query: &str) -> Result<T, SheetError> {
    serde_urlencoded::from_str(query)
        .map_err(|e| SheetError::InvalidInput(format!("Invalid query string: {}", e)))
}

async fn read_json<T, B>(req: Request<B>) -> Result<T, SheetError>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Display,
{
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| SheetError::InvalidInput(format!("Failed to read body: {}", e)))?;
    Ok(serde_json::from_slice(&body.to_bytes())?)
}

fn with_cookie(mut response: Response<Full<Bytes>>, cookie: &str) -> HttpResult {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| SheetError::Internal(format!("Invalid cookie header: {}", e)))?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(response)
}
