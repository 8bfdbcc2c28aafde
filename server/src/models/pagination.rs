use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;
use crate::utils::validation::{FieldError, ValidationCode};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// A slice of rows plus the total number of rows matching the filter.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub count: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            rows: self.rows.into_iter().map(f).collect(),
            count: self.count,
        }
    }
}

/// Columns a listing may be ordered by. Only whitelisted names reach SQL.
pub trait SortField: Copy + Default + Send + Sync {
    fn parse(name: &str) -> Option<Self>;
    fn column(self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest<S> {
    pub offset: i64,
    pub limit: i64,
    pub order_by: S,
    pub desc: bool,
}

impl<S: SortField> Default for PageRequest<S> {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
            order_by: S::default(),
            desc: true,
        }
    }
}

impl<S> PageRequest<S> {
    /// Applies the direction to an ascending comparison.
    pub fn directed(&self, ordering: Ordering) -> Ordering {
        if self.desc {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Raw pagination query parameters.
///
/// `page` is a zero-based page index: the row offset is `page * limit`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub order_by: Option<String>,
    #[serde(rename = "isDESC")]
    pub is_desc: Option<String>,
}

impl PageParams {
    pub fn resolve<S: SortField>(&self) -> Result<PageRequest<S>, AppError> {
        let mut errors = Vec::new();

        let limit = match self.limit.as_deref() {
            None => DEFAULT_LIMIT,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(value) if value > 0 => value.min(MAX_LIMIT),
                _ => {
                    errors.push(FieldError::new("limit", ValidationCode::InvalidPagination));
                    DEFAULT_LIMIT
                }
            },
        };

        let page = match self.page.as_deref() {
            None => 0,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(value) if value >= 0 => value,
                _ => {
                    errors.push(FieldError::new("page", ValidationCode::InvalidPagination));
                    0
                }
            },
        };

        let order_by = match self.order_by.as_deref() {
            None => S::default(),
            Some(raw) => S::parse(raw.trim()).unwrap_or_else(|| {
                errors.push(FieldError::new("orderBy", ValidationCode::InvalidSortField));
                S::default()
            }),
        };

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        Ok(PageRequest {
            offset: page.saturating_mul(limit),
            limit,
            order_by,
            desc: self.is_desc.as_deref().map(str::trim) != Some("false"),
        })
    }
}
