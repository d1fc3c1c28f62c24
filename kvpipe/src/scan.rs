//! # Cursor Scan Iterator
//!
//! Turns a cursor-paginated fetch into a lazy iterator. Nothing is fetched
//! until the first `next`; each page is one dispatched command with its own
//! session, so a long scan never pins a connection between pages.
//!
//! The cursor starts at the store sentinel `"0"` and the loop ends when the
//! store hands the sentinel (or an empty cursor) back. A failed page is
//! yielded as an error and ends the iteration; it is never skipped.

use std::vec;

use kvpipe_client::{ClientResult, Command, RespValue, ScanParams};

use crate::commands::{decode_scored_members, ScoredMember};
use crate::error::HelperResult;
use crate::helper::KvHelper;
use crate::session::SessionPool;

/// Cursor value that both starts and ends a scan.
pub const SCAN_SENTINEL: &str = "0";

/// One page returned by a cursor fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage<T> {
    pub cursor: String,
    pub elements: Vec<T>,
}

fn is_terminal(cursor: &str) -> bool {
    cursor.is_empty() || cursor == SCAN_SENTINEL
}

/// Lazy iterator over the elements of every page of a cursor scan.
pub struct CursorIter<T, F> {
    fetch: F,
    // `None` once the sentinel came back or a fetch failed.
    cursor: Option<String>,
    buffer: vec::IntoIter<T>,
}

impl<T, F> CursorIter<T, F>
where
    F: FnMut(&str) -> HelperResult<ScanPage<T>>,
{
    pub fn new(fetch: F) -> Self {
        CursorIter {
            fetch,
            cursor: Some(SCAN_SENTINEL.to_string()),
            buffer: Vec::new().into_iter(),
        }
    }
}

impl<T, F> Iterator for CursorIter<T, F>
where
    F: FnMut(&str) -> HelperResult<ScanPage<T>>,
{
    type Item = HelperResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.next() {
                return Some(Ok(item));
            }
            let cursor = self.cursor.take()?;
            match (self.fetch)(&cursor) {
                Ok(page) => {
                    if !is_terminal(&page.cursor) {
                        self.cursor = Some(page.cursor);
                    }
                    self.buffer = page.elements.into_iter();
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl<P: SessionPool> KvHelper<P> {
    /// Keys of the whole keyspace. Not available on a sharded topology.
    pub fn scan(&self, params: &ScanParams) -> impl Iterator<Item = HelperResult<String>> + '_ {
        let params = params.clone();
        CursorIter::new(move |cursor: &str| {
            let command = params.apply(Command::keyless("SCAN").arg(cursor));
            self.fetch_page(&command, RespValue::into_strings)
        })
    }

    pub fn hscan(&self, key: &str) -> impl Iterator<Item = HelperResult<(String, String)>> + '_ {
        self.hscan_with(key, &ScanParams::default())
    }

    /// Field/value pairs of a hash.
    pub fn hscan_with(
        &self,
        key: &str,
        params: &ScanParams,
    ) -> impl Iterator<Item = HelperResult<(String, String)>> + '_ {
        let key = key.to_string();
        let params = params.clone();
        CursorIter::new(move |cursor: &str| {
            let command = params.apply(Command::keyed("HSCAN", &key).arg(cursor));
            self.fetch_page(&command, RespValue::into_string_pairs)
        })
    }

    pub fn sscan(&self, key: &str) -> impl Iterator<Item = HelperResult<String>> + '_ {
        self.sscan_with(key, &ScanParams::default())
    }

    /// Members of a set.
    pub fn sscan_with(&self, key: &str, params: &ScanParams) -> impl Iterator<Item = HelperResult<String>> + '_ {
        let key = key.to_string();
        let params = params.clone();
        CursorIter::new(move |cursor: &str| {
            let command = params.apply(Command::keyed("SSCAN", &key).arg(cursor));
            self.fetch_page(&command, RespValue::into_strings)
        })
    }

    pub fn zscan(&self, key: &str) -> impl Iterator<Item = HelperResult<ScoredMember>> + '_ {
        self.zscan_with(key, &ScanParams::default())
    }

    /// Members of a sorted set with their scores.
    pub fn zscan_with(
        &self,
        key: &str,
        params: &ScanParams,
    ) -> impl Iterator<Item = HelperResult<ScoredMember>> + '_ {
        let key = key.to_string();
        let params = params.clone();
        CursorIter::new(move |cursor: &str| {
            let command = params.apply(Command::keyed("ZSCAN", &key).arg(cursor));
            self.fetch_page(&command, decode_scored_members)
        })
    }

    fn fetch_page<T>(
        &self,
        command: &Command,
        decode: fn(RespValue) -> ClientResult<Vec<T>>,
    ) -> HelperResult<ScanPage<T>> {
        self.dispatch(command.name(), command, |reply| {
            let (cursor, elements) = reply.into_scan_page()?;
            Ok(ScanPage {
                cursor,
                elements: decode(elements)?,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HelperError;

    #[test]
    fn sentinel_on_first_page_yields_nothing() {
        let mut calls = 0;
        let iter = CursorIter::new(|cursor: &str| {
            calls += 1;
            assert_eq!(cursor, "0");
            Ok(ScanPage::<u32> {
                cursor: "0".to_string(),
                elements: Vec::new(),
            })
        });
        assert_eq!(iter.count(), 0);
        assert_eq!(calls, 1);
    }

    #[test]
    fn follows_cursor_across_pages_and_empty_pages() {
        let pages = vec![
            ("5", vec![1, 2]),
            ("9", vec![]),
            ("0", vec![3]),
        ];
        let mut seen = Vec::new();
        let mut idx = 0;
        let iter = CursorIter::new(|cursor: &str| {
            seen.push(cursor.to_string());
            let (next, elements) = pages[idx].clone();
            idx += 1;
            Ok(ScanPage {
                cursor: next.to_string(),
                elements,
            })
        });
        let items: Vec<i32> = iter.map(Result::unwrap).collect();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(seen, vec!["0", "5", "9"]);
    }

    #[test]
    fn failed_page_is_yielded_then_iteration_ends() {
        let mut iter = CursorIter::new(|cursor: &str| {
            if cursor == "0" {
                Ok(ScanPage {
                    cursor: "7".to_string(),
                    elements: vec![10],
                })
            } else {
                Err(HelperError::Decode("boom".to_string()))
            }
        });
        assert_eq!(iter.next().unwrap().unwrap(), 10);
        assert!(matches!(iter.next(), Some(Err(HelperError::Decode(_)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn empty_cursor_is_terminal() {
        let iter = CursorIter::new(|_: &str| {
            Ok(ScanPage {
                cursor: String::new(),
                elements: vec!["only"],
            })
        });
        assert_eq!(iter.map(Result::unwrap).collect::<Vec<_>>(), vec!["only"]);
    }
}
