//! Interpreting Cloud Connector payloads.

use serde_json::Value;

use zvm_core::Measurements;

use crate::error::{FetchError, FetchResult};
use crate::SourceRequest;

/// Collect every numeric field of a host-info payload.
///
/// Non-numeric fields (hostnames, versions, IPL time) are skipped. A payload
/// that is not a JSON object is an invalid response.
pub fn numeric_fields(source_name: &str, payload: &Value) -> FetchResult<Measurements> {
    let object = payload
        .as_object()
        .ok_or_else(|| invalid(source_name, SourceRequest::HostInfo, "expected a JSON object"))?;

    Ok(object
        .iter()
        .filter_map(|(key, value)| value.as_f64().map(|v| (key.clone(), v)))
        .collect())
}

/// Number of guests in a guest-list payload.
pub fn guest_count(source_name: &str, payload: &Value) -> FetchResult<usize> {
    payload
        .as_array()
        .map(Vec::len)
        .ok_or_else(|| invalid(source_name, SourceRequest::GuestList, "expected a JSON array"))
}

fn invalid(source_name: &str, request: SourceRequest, reason: &str) -> FetchError {
    FetchError::InvalidResponse {
        source_name: source_name.to_string(),
        api: request.api(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_fields_skip_strings() {
        let payload = json!({
            "disk_total": 3623,
            "disk_used": 1024.5,
            "hypervisor_hostname": "zvm1",
            "ipl_time": "IPL at 11/14/17 10:47:44 EST",
            "vcpus": 6,
        });
        let fields = numeric_fields("zvm1", &payload).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["disk_total"], 3623.0);
        assert_eq!(fields["disk_used"], 1024.5);
        assert!(!fields.contains_key("hypervisor_hostname"));
    }

    #[test]
    fn numeric_fields_rejects_non_object() {
        let err = numeric_fields("zvm1", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, FetchError::InvalidResponse { api: "host_get_info", .. }));
    }

    #[test]
    fn guest_count_counts_entries() {
        assert_eq!(guest_count("zvm1", &json!(["G1", "G2", "G3"])).unwrap(), 3);
        assert_eq!(guest_count("zvm1", &json!([])).unwrap(), 0);
    }

    #[test]
    fn guest_count_rejects_object() {
        assert!(guest_count("zvm1", &json!({"guests": []})).is_err());
    }
}
