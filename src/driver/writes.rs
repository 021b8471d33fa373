//! Pending writes, typed setters and commands

use super::{lock, write};
use crate::api;
use crate::driver::types::RefreshRequest;
use crate::store::{Property, value_to_wire};
use serde_json::{Value, json};
use std::collections::BTreeSet;

impl super::AlfenDevice {
    /// Queue a write and ask the poller for a cycle.
    ///
    /// No business validation here; a second write for the same id before the
    /// queue drains replaces the first.
    pub async fn set_value(&self, id: &str, value: Value) {
        self.pending.lock().await.upsert(id, value);
        let _ = self
            .refresh_tx
            .send(RefreshRequest::ValueQueued(id.to_string()));
    }

    /// POST one property write; true when the device accepted it
    pub(crate) async fn update_value(&self, id: &str, value: &Value) -> bool {
        let body = json!({ id: { "id": id, "value": value_to_wire(value) } });
        self.execute(&crate::transport::HttpRequest::post(api::PROP, Some(body)))
            .await
            .is_some()
    }

    /// Send every queued write. Returns whether any succeeded.
    ///
    /// The device drops the authenticated connection after accepting a
    /// write, so the session is marked logged out after each success.
    pub async fn drain_pending_writes(&self) -> bool {
        let queued = self.pending.lock().await.snapshot();
        if queued.is_empty() {
            return false;
        }
        self.logger
            .debug(&format!("Processing {} pending value updates", queued.len()));

        let mut sent = Vec::new();
        let mut categories = BTreeSet::new();
        for (id, value) in queued {
            if self.update_value(&id, &value).await {
                lock(&self.session).mark_unauthenticated();
                if let Some(category) = write(&self.properties).set_value(&id, value.clone()) {
                    categories.insert(category);
                }
                self.logger.debug(&format!("Set {} value {}", id, value));
                sent.push((id, value));
            } else {
                self.logger.warn(&format!(
                    "Failed to update {} to {} - will retry on next update cycle",
                    id, value
                ));
            }
        }

        if sent.is_empty() {
            return false;
        }

        {
            let mut pending = self.pending.lock().await;
            for (id, value) in &sent {
                if !pending.remove_if_unchanged(id, value) {
                    self.logger.debug(&format!(
                        "Value for {} changed during processing - will process new value next cycle",
                        id
                    ));
                }
            }
        }

        self.confirm_writes(&categories).await;
        true
    }

    /// Re-fetch the categories touched by writes, plus states
    async fn confirm_writes(&self, categories: &BTreeSet<String>) {
        let options = self.options();
        let mut targets: Vec<String> = categories.iter().cloned().collect();
        if !targets.iter().any(|c| c == api::CAT_STATES) {
            targets.push(api::CAT_STATES.to_string());
        }
        targets.retain(|c| options.is_enabled(c));
        if targets.is_empty() {
            return;
        }
        self.logger.debug(&format!(
            "Fetching {} categories after value update: {:?}",
            targets.len(),
            targets
        ));
        self.fetch_categories(&targets).await;
    }

    /// Charging current limit in amps (1..=32)
    pub async fn set_current_limit(&self, amps: i64) -> bool {
        if !(1..=32).contains(&amps) {
            self.logger
                .warn(&format!("Rejected current limit {}A (allowed 1-32)", amps));
            return false;
        }
        self.set_value(api::ID_CURRENT_LIMIT, json!(amps)).await;
        true
    }

    /// RFID authorization on (2) or off (0)
    pub async fn set_rfid_auth_mode(&self, enabled: bool) -> bool {
        let value = if enabled { 2 } else { 0 };
        self.set_value(api::ID_AUTH_MODE, json!(value)).await;
        true
    }

    /// Phase selection, one of L1, L2, L3
    pub async fn set_current_phase(&self, phase: &str) -> bool {
        if !matches!(phase, "L1" | "L2" | "L3") {
            self.logger
                .warn(&format!("Rejected phase '{}' (allowed L1, L2, L3)", phase));
            return false;
        }
        self.set_value(api::ID_PHASE, json!(phase)).await;
        true
    }

    pub async fn set_phase_switching(&self, enabled: bool) -> bool {
        let value = if enabled { 1 } else { 0 };
        self.set_value(api::ID_PHASE_SWITCHING, json!(value)).await;
        true
    }

    /// Share of solar power in percent (0..=100)
    pub async fn set_green_share(&self, percent: i64) -> bool {
        if !(0..=100).contains(&percent) {
            self.logger
                .warn(&format!("Rejected green share {}% (allowed 0-100)", percent));
            return false;
        }
        self.set_value(api::ID_GREEN_SHARE, json!(percent)).await;
        true
    }

    /// Comfort charging power in watts (1400..=5000)
    pub async fn set_comfort_power(&self, watts: i64) -> bool {
        if !(1400..=5000).contains(&watts) {
            self.logger.warn(&format!(
                "Rejected comfort power {}W (allowed 1400-5000)",
                watts
            ));
            return false;
        }
        self.set_value(api::ID_COMFORT_POWER, json!(watts)).await;
        true
    }

    /// Read one property straight from the device.
    ///
    /// Only ids already in the store are refreshed there; the fetched value is
    /// returned either way.
    pub async fn get_value(&self, id: &str) -> Option<Value> {
        if !api::is_valid_param(id) {
            let shown: String = id.chars().take(50).collect();
            self.logger
                .warn(&format!("Invalid API parameter format: {}", shown));
            return None;
        }

        let response = self.get_json(&api::ids_query(&[id])).await?;
        let props: Vec<Property> = response
            .get("properties")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Property::from_json).collect())
            .unwrap_or_default();

        let value = props.iter().find(|p| p.id == id).map(|p| p.value.clone());
        write(&self.properties).refresh_existing(props);
        value
    }

    /// POST `/api/cmd` with an arbitrary command object
    pub async fn send_command(&self, command: Value) -> Option<Value> {
        let response = self.post(api::CMD, Some(command)).await;
        self.logger
            .debug(&format!("Run command response {:?}", response));
        response
    }

    pub async fn reboot(&self) -> bool {
        let response = self
            .send_command(json!({ "command": api::COMMAND_REBOOT }))
            .await;
        response.is_some()
    }

    pub async fn clear_transactions(&self) -> bool {
        let response = self
            .send_command(json!({ "command": api::COMMAND_CLEAR_TRANSACTIONS }))
            .await;
        response.is_some()
    }
}
