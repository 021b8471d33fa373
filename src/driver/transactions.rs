//! Transaction stream pass

use super::lock;
use crate::api;
use crate::transactions::{ScanControl, StopReason, TransactionScanner};

impl super::AlfenDevice {
    /// Walk the transaction stream from the last known record id
    pub(crate) async fn fetch_transactions(&self, scanner: &mut TransactionScanner) -> StopReason {
        let mut pass = scanner.begin_pass();
        let start = pass.offset;
        let reason = loop {
            let text = self.get_text(&api::transactions_query(pass.offset)).await;
            let control = {
                let mut tags = lock(&self.tags);
                scanner.process_page(&mut pass, text.as_deref(), &mut tags)
            };
            match control {
                ScanControl::Continue(_) => continue,
                ScanControl::Stop(reason) => break reason,
            }
        };

        self.logger.debug(&format!(
            "Transaction pass from {} ended at {} after {} pages: {:?}",
            start,
            scanner.transaction_offset(),
            pass.pages,
            reason
        ));
        reason
    }
}
