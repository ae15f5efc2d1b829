//! Gateway response envelope parsing.
//!
//! The gateway wraps every provider action in one of three shapes:
//!
//! - success: `{"status": 200, "output": {"id": ...}}` (mutations) or
//!   `{"output": {"records": [...]}}` (fetches);
//! - structured failure:
//!   `{"data": {"response": {"status": ..., "data": [{"errorCode": ...}]}}}`;
//! - duplicate match: the failure shape where the first data element carries
//!   `duplicateResult.matchResults[0].matchRecords[0].record.Id`, meaning
//!   the provider resolved identity server-side instead of failing cleanly.
//!
//! Callers must branch on shape, not just HTTP status. All extraction here
//! is total: a missing level yields `None` or `UnexpectedShape`, never a
//! panic.

use serde_json::Value;

use crate::error::{ProviderError, ProviderResult};
use crate::types::ExternalRecord;

/// Parse the response to a create/update mutation, returning the
/// provider-assigned record id on success.
pub fn parse_mutation(status: u16, body: &Value) -> ProviderResult<String> {
    if status == 200 {
        return body
            .get("output")
            .and_then(|o| o.get("id"))
            .and_then(value_as_id)
            .ok_or_else(|| ProviderError::unexpected_shape("success response missing output.id"));
    }
    Err(parse_failure(status, body))
}

/// Parse the response to an action that returns no id (update, delete).
pub fn parse_ack(status: u16, body: &Value) -> ProviderResult<()> {
    if status == 200 {
        return Ok(());
    }
    Err(parse_failure(status, body))
}

/// Parse the full record set from a fetch action.
pub fn parse_records(body: &Value) -> ProviderResult<Vec<ExternalRecord>> {
    let records = body
        .get("output")
        .and_then(|o| o.get("records"))
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::unexpected_shape("fetch response missing output.records"))?;

    records
        .iter()
        .map(|r| serde_json::from_value(r.clone()).map_err(ProviderError::from))
        .collect()
}

/// Classify a non-200 response body.
///
/// Duplicate-match payloads take precedence over the plain error code: when
/// the provider found an existing record, the error code alone
/// (`DUPLICATES_DETECTED`) would hide the id it already resolved for us.
pub fn parse_failure(status: u16, body: &Value) -> ProviderError {
    if let Some(matched_id) = extract_duplicate_match(body) {
        return ProviderError::DuplicateDetected { matched_id };
    }

    let response = body.get("data").and_then(|d| d.get("response"));
    let provider_status = response
        .and_then(|r| r.get("status"))
        .and_then(Value::as_u64)
        .map_or(status, |s| s as u16);
    let error_code = response
        .and_then(|r| r.get("data"))
        .and_then(Value::as_array)
        .and_then(|d| d.first())
        .and_then(|e| e.get("errorCode"))
        .and_then(Value::as_str);

    match error_code {
        Some(code) => ProviderError::Validation {
            status: provider_status,
            error_code: code.to_string(),
        },
        None => ProviderError::unexpected_shape(format!(
            "failure response (status {status}) without errorCode"
        )),
    }
}

/// Extract the matched record id from a duplicate-match payload, if present.
///
/// The id sits at
/// `data.response.data[0].duplicateResult.matchResults[0].matchRecords[0].record.Id`.
#[must_use]
pub fn extract_duplicate_match(body: &Value) -> Option<String> {
    body.get("data")?
        .get("response")?
        .get("data")?
        .as_array()?
        .first()?
        .get("duplicateResult")?
        .get("matchResults")?
        .as_array()?
        .first()?
        .get("matchRecords")?
        .as_array()?
        .first()?
        .get("record")?
        .get("Id")
        .and_then(value_as_id)
}

/// Ids arrive as strings from Salesforce and as numbers from HubSpot.
fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_mutation_success() {
        let body = json!({"status": 200, "output": {"id": "003xx0000012345"}});
        assert_eq!(parse_mutation(200, &body).unwrap(), "003xx0000012345");
    }

    #[test]
    fn test_parse_mutation_numeric_id() {
        let body = json!({"status": 200, "output": {"id": 9981234}});
        assert_eq!(parse_mutation(200, &body).unwrap(), "9981234");
    }

    #[test]
    fn test_parse_mutation_missing_id() {
        let body = json!({"status": 200, "output": {}});
        let err = parse_mutation(200, &body).unwrap_err();
        assert!(matches!(err, ProviderError::UnexpectedShape { .. }));
    }

    #[test]
    fn test_parse_failure_error_code() {
        let body = json!({
            "data": {"response": {"status": 400, "data": [{"errorCode": "REQUIRED_FIELD_MISSING"}]}}
        });
        let err = parse_mutation(400, &body).unwrap_err();
        match err {
            ProviderError::Validation { status, error_code } => {
                assert_eq!(status, 400);
                assert_eq!(error_code, "REQUIRED_FIELD_MISSING");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_match_extraction() {
        let body = json!({
            "data": {"response": {"data": [{
                "duplicateResult": {"matchResults": [{
                    "matchRecords": [{"record": {"Id": "001Y"}}]
                }]}
            }]}}
        });
        assert_eq!(extract_duplicate_match(&body).as_deref(), Some("001Y"));

        let err = parse_mutation(400, &body).unwrap_err();
        assert_eq!(err.duplicate_match(), Some("001Y"));
    }

    #[test]
    fn test_duplicate_match_absent_levels() {
        assert_eq!(extract_duplicate_match(&json!({})), None);
        assert_eq!(
            extract_duplicate_match(&json!({"data": {"response": {"data": []}}})),
            None
        );
        assert_eq!(
            extract_duplicate_match(
                &json!({"data": {"response": {"data": [{"duplicateResult": {"matchResults": []}}]}}})
            ),
            None
        );
    }

    #[test]
    fn test_parse_records() {
        let body = json!({"output": {"records": [
            {
                "id": "00Qxx1",
                "fields": {"firstName": "Ada"},
                "createdTime": "2024-01-01T00:00:00Z",
                "updatedTime": "2024-01-02T00:00:00Z"
            }
        ]}});
        let records = parse_records(&body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "00Qxx1");
        assert_eq!(records[0].field_str("firstName"), Some("Ada"));
    }

    #[test]
    fn test_parse_records_missing_output() {
        let err = parse_records(&json!({"status": 500})).unwrap_err();
        assert!(matches!(err, ProviderError::UnexpectedShape { .. }));
    }

    #[test]
    fn test_parse_ack() {
        assert!(parse_ack(200, &json!({"status": 200})).is_ok());
        let body = json!({
            "data": {"response": {"status": 404, "data": [{"errorCode": "ENTITY_IS_DELETED"}]}}
        });
        assert!(parse_ack(404, &body).is_err());
    }
}
