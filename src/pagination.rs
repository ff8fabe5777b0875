//! Page-number pagination. Every list request derives its own immutable
//! [`Pagination`] from the query string; nothing is stored between requests.

use actix_web::HttpRequest;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw `page` / `limit` query parameters, kept as strings so a malformed
/// `limit` can be ignored instead of rejecting the request.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

fn invalid_page() -> ApiError {
    ApiError::NotFound("Неправильная страница".to_string())
}

impl Pagination {
    pub fn from_params(params: &PageParams) -> Result<Self, ApiError> {
        let page_size = params
            .limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|size| *size > 0)
            .map_or(DEFAULT_PAGE_SIZE, |size| size.min(MAX_PAGE_SIZE));

        let page = match params.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|page| *page > 0)
                .ok_or_else(invalid_page)?,
        };

        Ok(Self { page, page_size })
    }

    pub fn last_page(&self, count: i64) -> i64 {
        ((count + self.page_size - 1) / self.page_size).max(1)
    }

    /// Rejects pages past the end once the total is known.
    pub fn check(&self, count: i64) -> Result<(), ApiError> {
        if self.page > self.last_page(count) {
            return Err(invalid_page());
        }
        Ok(())
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn into_page<T>(self, req: &HttpRequest, count: i64, results: Vec<T>) -> Page<T> {
        let next = (self.page < self.last_page(count)).then(|| page_link(req, Some(self.page + 1)));
        let previous = (self.page > 1).then(|| {
            let target = self.page - 1;
            page_link(req, (target > 1).then_some(target))
        });
        Page {
            count,
            next,
            previous,
            results,
        }
    }
}

/// The current URL with `page` replaced; `None` drops the parameter.
fn page_link(req: &HttpRequest, page: Option<i64>) -> String {
    let info = req.connection_info();
    let mut pairs: Vec<String> = req
        .query_string()
        .split('&')
        .filter(|pair| !pair.is_empty() && !pair.starts_with("page="))
        .map(str::to_string)
        .collect();
    if let Some(page) = page {
        pairs.push(format!("page={page}"));
    }

    let mut link = format!("{}://{}{}", info.scheme(), info.host(), req.path());
    if !pairs.is_empty() {
        link.push('?');
        link.push_str(&pairs.join("&"));
    }
    link
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn params(page: Option<&str>, limit: Option<&str>) -> PageParams {
        PageParams {
            page: page.map(str::to_string),
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn defaults_and_limit_clamping() {
        let p = Pagination::from_params(&PageParams::default()).unwrap();
        assert_eq!(p, Pagination { page: 1, page_size: DEFAULT_PAGE_SIZE });

        let p = Pagination::from_params(&params(None, Some("500"))).unwrap();
        assert_eq!(p.page_size, MAX_PAGE_SIZE);

        for junk in ["abc", "0", "-3"] {
            let p = Pagination::from_params(&params(None, Some(junk))).unwrap();
            assert_eq!(p.page_size, DEFAULT_PAGE_SIZE);
        }
    }

    #[test]
    fn invalid_or_out_of_range_page_is_not_found() {
        assert!(Pagination::from_params(&params(Some("zero"), None)).is_err());
        assert!(Pagination::from_params(&params(Some("0"), None)).is_err());

        let p = Pagination::from_params(&params(Some("3"), Some("5"))).unwrap();
        assert!(p.check(10).is_err());
        assert!(p.check(11).is_ok());
        assert_eq!(p.offset(), 10);

        // the first page always exists, even for an empty listing
        let first = Pagination::from_params(&PageParams::default()).unwrap();
        assert!(first.check(0).is_ok());
    }

    #[test]
    fn links_preserve_other_parameters() {
        let req = TestRequest::get()
            .uri("/api/recipes/?author=3&page=2&limit=2")
            .insert_header(("host", "foodgram.test"))
            .to_http_request();
        let p = Pagination::from_params(&params(Some("2"), Some("2"))).unwrap();
        let page = p.into_page(&req, 5, vec![1, 2]);

        assert_eq!(
            page.next.as_deref(),
            Some("http://foodgram.test/api/recipes/?author=3&limit=2&page=3")
        );
        assert_eq!(
            page.previous.as_deref(),
            Some("http://foodgram.test/api/recipes/?author=3&limit=2")
        );
    }

    #[test]
    fn single_page_has_no_links() {
        let req = TestRequest::get().uri("/api/users/").to_http_request();
        let p = Pagination::from_params(&PageParams::default()).unwrap();
        let page = p.into_page(&req, 3, vec!["a", "b", "c"]);
        assert!(page.next.is_none());
        assert!(page.previous.is_none());
        assert_eq!(page.count, 3);
    }
}
