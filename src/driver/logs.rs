//! Device log pass

use super::{LOG_PAGES, lock};
use crate::api;
use crate::logparse::{LogBuffer, apply_log_lines};

impl super::AlfenDevice {
    /// Pull the newest log pages into `buffer` and refresh the tag facts.
    ///
    /// Returns the number of tag updates applied.
    pub(crate) async fn fetch_logs(&self, buffer: &mut LogBuffer) -> usize {
        let mut added = 0;
        for offset in 0..LOG_PAGES {
            let Some(text) = self.get_text(&api::log_query(offset)).await else {
                self.logger
                    .debug(&format!("Log page {} unavailable, stopping", offset));
                break;
            };
            added += buffer.extend_from_text(&text);
        }

        let applied = apply_log_lines(buffer, &mut lock(&self.tags));
        self.logger.debug(&format!(
            "Log pass: {} new lines, {} buffered, {} tag updates",
            added,
            buffer.len(),
            applied
        ));
        applied
    }
}
