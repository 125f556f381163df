//! Post-run processing utilities.
//!
//! Turns a finished engine report into the record printed by `--json`.

use crate::engine::EngineReport;
use crate::model::BatchOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationReport {
    pub operation: String,
    pub succeeded: bool,
    pub message: String,
    pub finished_utc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchOutcome>,
}

/// Stamp a completed run for machine-readable output.
pub fn process_run_completion(operation: &str, report: &EngineReport) -> OperationReport {
    OperationReport {
        operation: operation.to_string(),
        succeeded: report.outcome.succeeded,
        message: report.outcome.message.clone(),
        finished_utc: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into()),
        batch: report.batch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunOutcome;

    #[test]
    fn batch_tally_is_serialized() {
        let report = EngineReport {
            outcome: RunOutcome::success("Batch processing finished. Succeeded: 1 / Failed: 1"),
            batch: Some(BatchOutcome {
                total: 2,
                succeeded: 1,
                failed: 1,
            }),
        };
        let processed = process_run_completion("batch", &report);
        let json = serde_json::to_value(&processed).unwrap();
        assert_eq!(json["operation"], "batch");
        assert_eq!(json["succeeded"], true);
        assert_eq!(json["batch"]["failed"], 1);
        assert!(time::OffsetDateTime::parse(
            &processed.finished_utc,
            &time::format_description::well_known::Rfc3339
        )
        .is_ok());
    }

    #[test]
    fn single_operation_omits_batch() {
        let report = EngineReport::from(RunOutcome::failure("Conversion failed: boom"));
        let json = serde_json::to_value(process_run_completion("convert", &report)).unwrap();
        assert!(json.get("batch").is_none());
        assert_eq!(json["succeeded"], false);
    }
}
