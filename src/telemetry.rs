//! Step telemetry, collected during a step run and logged on exit.

use std::time::Instant;

use serde::Serialize;

use crate::error::ErrorCategory;

/// Commit the binary was built from, when the build provided one.
pub const GIT_COMMIT: &str = match option_env!("PIPER_GIT_COMMIT") {
    Some(c) => c,
    None => "<n/a>",
};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepTelemetryData {
    pub step_name: String,
    pub correlation_id: String,
    /// `"1"` until the step finishes successfully.
    pub error_code: String,
    pub error_category: String,
    pub duration_ms: String,
    pub piper_commit_hash: String,
    pub event_time: String,
}

impl StepTelemetryData {
    pub fn new(step_name: &str, correlation_id: &str) -> Self {
        Self {
            step_name: step_name.to_string(),
            correlation_id: correlation_id.to_string(),
            error_code: "1".to_string(),
            error_category: ErrorCategory::Undefined.to_string(),
            duration_ms: String::new(),
            piper_commit_hash: GIT_COMMIT.to_string(),
            event_time: String::new(),
        }
    }

    pub fn mark_success(&mut self) {
        self.error_code = "0".to_string();
    }

    /// Stamp duration, category and event time just before reporting.
    pub fn finish(&mut self, started: Instant, category: ErrorCategory) {
        self.duration_ms = started.elapsed().as_millis().to_string();
        self.error_category = category.to_string();
        self.event_time = chrono::Utc::now().to_rfc3339();
    }
}

#[derive(Debug, Clone)]
pub struct Telemetry {
    disabled: bool,
}

impl Telemetry {
    pub fn new(disabled: bool) -> Self {
        Self { disabled }
    }

    pub fn log_step_telemetry_data(&self, data: &StepTelemetryData) {
        if self.disabled {
            tracing::debug!("telemetry reporting deactivated");
            return;
        }
        match serde_json::to_string(data) {
            Ok(payload) => tracing::info!(
                step = %data.step_name,
                error_code = %data.error_code,
                telemetry = %payload,
                "step telemetry data"
            ),
            Err(e) => tracing::warn!(error = %e, "cannot encode step telemetry data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_data_starts_as_failure() {
        let data = StepTelemetryData::new("pythonBuild", "cid");
        assert_eq!(data.error_code, "1");
        assert_eq!(data.error_category, "undefined");
    }

    #[test]
    fn finish_stamps_fields() {
        let mut data = StepTelemetryData::new("pythonBuild", "cid");
        data.mark_success();
        data.finish(Instant::now(), ErrorCategory::Undefined);
        assert_eq!(data.error_code, "0");
        assert!(!data.duration_ms.is_empty());
        assert!(!data.event_time.is_empty());
    }

    #[test]
    fn serializes_camel_case() {
        let data = StepTelemetryData::new("pythonBuild", "cid");
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["stepName"], "pythonBuild");
        assert_eq!(json["errorCode"], "1");
        assert!(json.get("piperCommitHash").is_some());
    }
}
