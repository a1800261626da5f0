use crate::error::InvalidInput;
use serde::{Deserialize, Serialize};

pub const MAX_PAGE_LENGTH: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page_number: i64,
    pub page_length: i64,
}

impl PageRequest {
    /// Rejects non-positive values; lengths above [`MAX_PAGE_LENGTH`] are clamped.
    pub fn new(page_number: i64, page_length: i64) -> Result<Self, InvalidInput> {
        if page_number < 1 {
            return Err(InvalidInput::new(
                "page_number",
                format!("must be >= 1 (got {page_number})"),
            ));
        }
        if page_length < 1 {
            return Err(InvalidInput::new(
                "page_length",
                format!("must be >= 1 (got {page_length})"),
            ));
        }
        Ok(Self {
            page_number,
            page_length: page_length.min(MAX_PAGE_LENGTH),
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page_number - 1).saturating_mul(self.page_length)
    }

    pub fn limit(&self) -> i64 {
        self.page_length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page_number: i64,
    pub page_length: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageMeta {
    pub fn new(req: PageRequest, total_count: i64) -> Self {
        let total_count = total_count.max(0);
        let total_pages = (total_count + req.page_length - 1) / req.page_length;
        Self {
            page_number: req.page_number,
            page_length: req.page_length,
            total_count,
            total_pages,
            has_next: req.page_number < total_pages,
            has_previous: req.page_number > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListRequest {
    pub page_number: i64,
    pub page_length: i64,
}

impl ListRequest {
    pub fn validate(&self) -> Result<PageRequest, InvalidInput> {
        PageRequest::new(self.page_number, self.page_length)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    pub page_number: i64,
    pub page_length: i64,
    #[serde(default)]
    pub search_term: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub rating_from: Option<String>,
    #[serde(default)]
    pub rating_to: Option<String>,
    #[serde(default)]
    pub target_from_min: Option<f64>,
    #[serde(default)]
    pub target_from_max: Option<f64>,
    #[serde(default)]
    pub target_to_min: Option<f64>,
    #[serde(default)]
    pub target_to_max: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    fn new(field: &'static str, min: Option<f64>, max: Option<f64>) -> Result<Self, InvalidInput> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(InvalidInput::new(
                    field,
                    format!("min {lo} is greater than max {hi}"),
                ));
            }
        }
        Ok(Self { min, max })
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Conjunction of optional predicates over stored rating events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingFilter {
    pub search_term: Option<String>,
    pub action: Option<String>,
    pub rating_from: Option<String>,
    pub rating_to: Option<String>,
    pub target_from: NumericRange,
    pub target_to: NumericRange,
}

impl RatingFilter {
    pub fn is_empty(&self) -> bool {
        self.search_term.is_none()
            && self.action.is_none()
            && self.rating_from.is_none()
            && self.rating_to.is_none()
            && self.target_from.is_unbounded()
            && self.target_to.is_unbounded()
    }
}

fn non_blank(s: &Option<String>) -> Option<String> {
    s.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl SearchRequest {
    pub fn validate(&self) -> Result<(PageRequest, RatingFilter), InvalidInput> {
        let page = PageRequest::new(self.page_number, self.page_length)?;
        let filter = RatingFilter {
            search_term: non_blank(&self.search_term),
            action: non_blank(&self.action),
            rating_from: non_blank(&self.rating_from),
            rating_to: non_blank(&self.rating_to),
            target_from: NumericRange::new(
                "target_from range",
                self.target_from_min,
                self.target_from_max,
            )?,
            target_to: NumericRange::new(
                "target_to range",
                self.target_to_min,
                self.target_to_max,
            )?,
        };
        Ok((page, filter))
    }
}

/// Escapes `%`, `_` and `\` so user text is matched literally by `ILIKE`.
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
