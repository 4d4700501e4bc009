//! Query construction and pagination for the Custom Search API.

/// The API refuses pages beyond this result index.
const MAX_START_INDEX: u32 = 91;

/// One page request: 1-based `start` index and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub start: u32,
    pub num: u32,
}

/// Join keywords into a single query string and append the suffix.
///
/// Blank keywords are skipped. Returns `None` when nothing is left to search.
pub fn build_query(keywords: &[String], suffix: &str) -> Option<String> {
    let joined = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if joined.is_empty() {
        return None;
    }
    Some(format!("{joined}{suffix}"))
}

/// Split `limit` results into page requests of `per_request` each.
pub fn plan_pages(limit: u32, per_request: u32) -> Vec<PageRequest> {
    let per_request = per_request.clamp(1, 10);
    let pages = limit.div_ceil(per_request);

    (0..pages)
        .map(|i| PageRequest {
            start: 1 + i * per_request,
            num: per_request,
        })
        .take_while(|p| p.start <= MAX_START_INDEX)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_joins_keywords_with_suffix() {
        let kws = vec!["AI".to_string(), " 신제품 ".to_string(), "".to_string()];
        assert_eq!(
            build_query(&kws, " news -filetype:pdf").as_deref(),
            Some("AI 신제품 news -filetype:pdf")
        );
    }

    #[test]
    fn query_empty_keywords() {
        assert!(build_query(&[], " news").is_none());
        assert!(build_query(&["  ".to_string()], " news").is_none());
    }

    #[test]
    fn fifty_results_make_five_pages() {
        let pages = plan_pages(50, 10);
        assert_eq!(pages.len(), 5);
        assert_eq!(pages[0], PageRequest { start: 1, num: 10 });
        assert_eq!(pages[4], PageRequest { start: 41, num: 10 });
    }

    #[test]
    fn partial_page_rounds_up() {
        let pages = plan_pages(15, 10);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].start, 11);
    }

    #[test]
    fn pages_stop_at_api_limit() {
        let pages = plan_pages(500, 10);
        assert_eq!(pages.len(), 10);
        assert_eq!(pages.last().unwrap().start, 91);
    }

    #[test]
    fn zero_limit_plans_nothing() {
        assert!(plan_pages(0, 10).is_empty());
    }
}
