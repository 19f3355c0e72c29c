//! HTTP routes for the `semverd` server.
//!
//! Every route answers in plain text unless the request carries
//! `?output=json` or `?output=xml`.

pub mod versions;

use std::fmt::Display;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::service::ServiceError;
use crate::state::AppState;
use crate::xml::Xml;

/// Response encoding selected by the `output` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Json,
    Xml,
    #[default]
    Text,
}

impl OutputFormat {
    /// Anything other than `json` or `xml` falls back to text.
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            Some(v) if v.eq_ignore_ascii_case("xml") => Self::Xml,
            _ => Self::Text,
        }
    }

    /// Render a handler result in this format.
    pub fn respond<T>(self, result: Result<T, ServiceError>) -> Response
    where
        T: Serialize + Display,
    {
        match (self, result) {
            (Self::Json, Ok(value)) => axum::Json(value).into_response(),
            (Self::Xml, Ok(value)) => Xml(value).into_response(),
            (Self::Text, Ok(value)) => value.to_string().into_response(),
            (Self::Json, Err(e)) => AppError::from(e).into_response(),
            (Self::Xml, Err(e)) => AppError::from(e).into_xml_response(),
            (Self::Text, Err(e)) => AppError::from(e).into_text_response(),
        }
    }
}

/// Build the full application router with middleware.
pub fn build_router(state: Arc<AppState>, create_concurrency: usize) -> Router {
    versions::router(create_concurrency)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_query() {
        assert_eq!(OutputFormat::from_query(Some("JSON")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_query(Some(" xml ")), OutputFormat::Xml);
        assert_eq!(OutputFormat::from_query(Some("yaml")), OutputFormat::Text);
        assert_eq!(OutputFormat::from_query(None), OutputFormat::Text);
    }
}
