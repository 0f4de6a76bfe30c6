use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::errors::ApiError;
use super::jsonapi::{Links, MEDIA_TYPE, ToResource, marshal_many};
use crate::core::config::PaginationConfig;
use crate::core::store::StoreError;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub size: Option<String>,
    pub page: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub size: usize,
    pub page: usize,
    pub offset: usize,
}

impl PageRequest {
    /// Blank parameters fall back to defaults; anything unparsable or out of
    /// range is rejected.
    pub fn parse(query: &PageQuery, config: &PaginationConfig) -> Result<Self, ApiError> {
        let size = parse_param("size", query.size.as_deref(), config.default_size)?;
        let page = parse_param("page", query.page.as_deref(), 1)?;

        if size < 1 || size > config.max_size {
            return Err(ApiError::unprocessable(format!(
                "size must be between 1 and {}",
                config.max_size
            )));
        }
        if page < 1 {
            return Err(ApiError::unprocessable("page must be at least 1"));
        }

        // The store takes offsets as SQLite integers and links need offset + size.
        let offset = (page - 1)
            .checked_mul(size)
            .filter(|offset| {
                offset
                    .checked_add(size)
                    .is_some_and(|end| i64::try_from(end).is_ok())
            })
            .ok_or_else(|| ApiError::unprocessable("page is out of range"))?;
        Ok(Self { size, page, offset })
    }
}

fn parse_param(name: &str, raw: Option<&str>, default: usize) -> Result<usize, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| ApiError::unprocessable(format!("invalid {} parameter '{}'", name, value))),
    }
}

fn page_link(path: &str, page: usize, size: usize, sort: Option<&str>) -> String {
    match sort {
        Some(sort) if !sort.is_empty() => format!(
            "{path}?page={page}&size={size}&sort={}",
            urlencoding::encode(sort)
        ),
        _ => format!("{path}?page={page}&size={size}"),
    }
}

/// Renders one page of resources, or surfaces the store failure as a 500.
pub fn paginated_response<R: ToResource>(
    path: &str,
    request: PageRequest,
    sort: Option<&str>,
    result: Result<(Vec<R>, usize), StoreError>,
) -> Result<Response, ApiError> {
    let (items, count) = result.map_err(ApiError::internal)?;

    let links = Links {
        next: (request.offset + request.size < count)
            .then(|| page_link(path, request.page + 1, request.size, sort)),
        prev: (request.page > 1).then(|| page_link(path, request.page - 1, request.size, sort)),
    };
    let meta = serde_json::json!({
        "count": count,
        "size": request.size,
        "page": request.page,
    });

    let doc = marshal_many(&items, links, meta).map_err(ApiError::internal)?;
    let body = serde_json::to_vec(&doc).map_err(ApiError::internal)?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, MEDIA_TYPE)], body).into_response())
}
