//! Paginated category fetches

use super::{FETCH_MAX_FAILURES, FETCH_RETRY_BACKOFF, SLOW_FETCH, write};
use crate::api;
use crate::store::{Property, PropertyPage};
use tokio::time::{Instant, sleep};

impl super::AlfenDevice {
    /// Fetch every page of one category.
    ///
    /// A failed page is retried after a short backoff and the category is
    /// given up after three consecutive failures; a malformed page ends the
    /// category at once. Properties fetched before a failure are kept.
    pub async fn fetch_category(&self, category: &str) -> Vec<Property> {
        let started = Instant::now();
        let mut properties = Vec::new();
        let mut offset = 0u64;
        let mut failures = 0u32;

        loop {
            let Some(body) = self.get_text(&api::category_query(category, offset)).await else {
                failures += 1;
                if failures >= FETCH_MAX_FAILURES {
                    self.logger.warn(&format!(
                        "Giving up on category {} after {} failed requests",
                        category, failures
                    ));
                    break;
                }
                self.logger.debug(&format!(
                    "Retrying category {} at offset {} ({}/{})",
                    category, offset, failures, FETCH_MAX_FAILURES
                ));
                sleep(FETCH_RETRY_BACKOFF).await;
                continue;
            };
            failures = 0;

            let page = match PropertyPage::parse(&body) {
                Ok(page) => page,
                Err(e) => {
                    self.logger.warn(&format!(
                        "Invalid response for category {} at offset {}: {}",
                        category, offset, e
                    ));
                    break;
                }
            };

            let count = page.properties.len() as u64;
            properties.extend(page.properties.into_iter().map(|mut prop| {
                if prop.category.is_none() {
                    prop.category = Some(category.to_string());
                }
                prop
            }));

            if count == 0 || page.total <= offset + count {
                break;
            }
            offset += count;
        }

        let elapsed = started.elapsed();
        let message = format!(
            "Category {} fetched in {:.2}s ({} properties)",
            category,
            elapsed.as_secs_f64(),
            properties.len()
        );
        if properties.is_empty() {
            self.logger
                .warn(&format!("No properties returned for category {}", category));
        } else if elapsed > SLOW_FETCH {
            self.logger.info(&message);
        } else {
            self.logger.debug(&message);
        }
        properties
    }

    /// Fetch several categories into the store, pausing between them.
    ///
    /// Returns the number of properties merged.
    pub async fn fetch_categories(&self, categories: &[String]) -> usize {
        let delay = self.options().category_fetch_delay();
        let mut merged = 0;
        for (i, category) in categories.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                sleep(delay).await;
            }
            let props = self.fetch_category(category).await;
            merged += props.len();
            write(&self.properties).merge(props);
        }
        merged
    }

    /// Categories loaded once at bootstrap: everything not streamed and not
    /// rotated, with `generic` always first
    pub(crate) fn static_categories(&self) -> Vec<String> {
        let options = self.options();
        let mut categories: Vec<String> = api::CATEGORIES
            .iter()
            .filter(|c| !api::is_stream_category(c) && !options.is_enabled(c))
            .map(|c| c.to_string())
            .collect();
        if !categories.iter().any(|c| c == api::CAT_GENERIC) {
            categories.insert(0, api::CAT_GENERIC.to_string());
        }
        categories
    }
}
