//! Iterator layer: wraps a [`Pager`] in a failable push
//! iterator, plus a single-page variant for ARM list responses with
//! client-chosen page sizes.
use crate::container::Pager;
use crate::error::StoreError;
use serde_json::Value;
use std::collections::VecDeque;

/// A lazy, failable iterator over query results. Callers drive it with
/// [`ResultIterator::next`] until it returns `None`, then check
/// [`ResultIterator::get_error`] to tell "exhausted" apart from
/// "a page fetch failed".
pub struct ResultIterator {
    pager: Box<dyn Pager>,
    buffer: VecDeque<Value>,
    error: Option<StoreError>,
    done: bool,
}

impl ResultIterator {
    pub fn new(pager: Box<dyn Pager>) -> Self {
        ResultIterator {
            pager,
            buffer: VecDeque::new(),
            error: None,
            done: false,
        }
    }

    /// Advances to the next item, fetching further pages as needed.
    /// Returns `None` both on normal exhaustion and after capturing an
    /// error; call [`ResultIterator::get_error`] to distinguish them.
    pub async fn next(&mut self) -> Option<Value> {
        if self.done {
            return None;
        }
        if let Some(item) = self.buffer.pop_front() {
            return Some(item);
        }
        match self.pager.next_page().await {
            Ok(page) if page.is_empty() => {
                self.done = true;
                None
            }
            Ok(page) => {
                self.buffer = page.into();
                let item = self.buffer.pop_front();
                if item.is_none() {
                    self.done = true;
                }
                item
            }
            Err(err) => {
                self.error = Some(err);
                self.done = true;
                None
            }
        }
    }

    /// The error captured by the last page fetch, if iteration stopped
    /// because of one rather than because the pager was exhausted.
    pub fn get_error(&self) -> Option<&StoreError> {
        self.error.as_ref()
    }

    pub fn into_error(self) -> Option<StoreError> {
        self.error
    }
}

/// One page of results plus the token to resume from, for list responses
/// that hand pagination control to the caller.
#[derive(Debug, Clone)]
pub struct SinglePageResult {
    pub items: Vec<Value>,
    pub continuation_token: Option<String>,
}

/// Fetches exactly one page from `pager` without buffering further.
pub async fn fetch_single_page(
    pager: &mut dyn Pager,
) -> Result<SinglePageResult, StoreError> {
    let items = pager.next_page().await?;
    Ok(SinglePageResult {
        items,
        continuation_token: pager.continuation_token(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct VecPager {
        pages: VecDeque<Vec<Value>>,
        fail_after: Option<usize>,
        served: usize,
    }

    #[async_trait]
    impl Pager for VecPager {
        async fn next_page(&mut self) -> crate::error::StoreResult<Vec<Value>> {
            if let Some(fail_after) = self.fail_after {
                if self.served >= fail_after {
                    return Err(StoreError::transport("simulated failure", None));
                }
            }
            self.served += 1;
            Ok(self.pages.pop_front().unwrap_or_default())
        }

        fn continuation_token(&self) -> Option<String> {
            if self.pages.is_empty() {
                None
            } else {
                Some(format!("page-{}", self.served))
            }
        }
    }

    #[tokio::test]
    async fn iterates_all_items_across_pages() {
        let pager = VecPager {
            pages: VecDeque::from(vec![
                vec![json!({"n": 1}), json!({"n": 2})],
                vec![json!({"n": 3})],
            ]),
            fail_after: None,
            served: 0,
        };
        let mut iter = ResultIterator::new(Box::new(pager));
        let mut seen = vec![];
        while let Some(item) = iter.next().await {
            seen.push(item);
        }
        assert_eq!(seen.len(), 3);
        assert!(iter.get_error().is_none());
    }

    #[tokio::test]
    async fn captures_error_after_loop() {
        let pager = VecPager {
            pages: VecDeque::from(vec![vec![json!({"n": 1})]]),
            fail_after: Some(1),
            served: 0,
        };
        let mut iter = ResultIterator::new(Box::new(pager));
        let mut seen = vec![];
        while let Some(item) = iter.next().await {
            seen.push(item);
        }
        assert_eq!(seen.len(), 1);
        assert!(iter.get_error().is_some());
    }

    #[tokio::test]
    async fn single_page_variant_exposes_continuation_token() {
        let mut pager = VecPager {
            pages: VecDeque::from(vec![vec![json!({"n": 1})], vec![json!({"n": 2})]]),
            fail_after: None,
            served: 0,
        };
        let page = fetch_single_page(&mut pager).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.continuation_token.is_some());
    }
}
