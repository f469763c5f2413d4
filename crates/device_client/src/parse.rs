use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use common::domain::{LogType, MalformedRecord, RawTransaction, UNKNOWN_DEVICE_ID};
use serde_json::{Map, Value};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// One decoded response page
#[derive(Debug)]
pub(crate) struct Page {
    pub records: Vec<Value>,
    pub next: Option<String>,
    pub count: Option<u64>,
}

/// Accepts a bare array or the paginated `{count, next, data}` envelope
pub(crate) fn parse_page(body: Value) -> Result<Page, String> {
    match body {
        Value::Array(records) => Ok(Page {
            count: Some(records.len() as u64),
            records,
            next: None,
        }),
        Value::Object(mut map) => {
            let records = match map.remove("data") {
                Some(Value::Array(records)) => records,
                Some(_) => return Err("`data` is not an array".to_string()),
                None => return Err(describe_missing_data(&map)),
            };
            let next = map
                .get("next")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let count = map.get("count").and_then(Value::as_u64);
            Ok(Page {
                records,
                next,
                count,
            })
        }
        _ => Err("expected a JSON array or object".to_string()),
    }
}

fn describe_missing_data(map: &Map<String, Value>) -> String {
    match map.get("msg").and_then(Value::as_str) {
        Some(msg) if !msg.is_empty() => format!("response has no `data` array: {}", msg),
        _ => "response has no `data` array".to_string(),
    }
}

/// Parse one device record. Missing or unparseable required fields make the
/// record malformed; a missing device id becomes `UNKNOWN_DEVICE_ID`.
pub(crate) fn parse_record(
    record: &Value,
    offset: FixedOffset,
) -> Result<RawTransaction, MalformedRecord> {
    let device_transaction_id = field_string(record, &["id", "transaction_id"]);
    let malformed = |reason: String| MalformedRecord {
        device_transaction_id: device_transaction_id.clone(),
        reason,
    };

    if !record.is_object() {
        return Err(malformed("record is not an object".to_string()));
    }

    let employee_code = field_string(record, &["employee_code", "emp_code"])
        .ok_or_else(|| malformed("missing employee_code".to_string()))?;

    let raw_time = field_string(record, &["punch_time"])
        .ok_or_else(|| malformed("missing punch_time".to_string()))?;
    let punch_time = parse_punch_time(&raw_time, offset)
        .ok_or_else(|| malformed(format!("unparseable punch_time: {}", raw_time)))?;

    let raw_log_type = first_present(record, &["log_type", "punch_state"])
        .ok_or_else(|| malformed("missing log_type".to_string()))?;
    let log_type = parse_log_type(raw_log_type)
        .ok_or_else(|| malformed(format!("unrecognized log_type: {}", raw_log_type)))?;

    let device_id = field_string(record, &["device_id", "terminal_sn", "terminal_alias"])
        .unwrap_or_else(|| UNKNOWN_DEVICE_ID.to_string());

    Ok(RawTransaction {
        device_transaction_id: device_transaction_id.clone(),
        employee_code,
        punch_time,
        log_type,
        device_id,
    })
}

fn first_present<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| !value.is_null())
}

/// First non-blank string or number under any of `keys`. Numbers are stringified.
fn field_string(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match record.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// RFC3339 instants are used as-is; naive timestamps are device local time
pub(crate) fn parse_punch_time(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
}

/// BioTime punch_state codes: 0 check in, 1 check out, 2 break out,
/// 3 break in, 4 overtime in, 5 overtime out
fn log_type_from_code(code: i64) -> Option<LogType> {
    match code {
        0 | 3 | 4 => Some(LogType::In),
        1 | 2 | 5 => Some(LogType::Out),
        _ => None,
    }
}

fn parse_log_type(value: &Value) -> Option<LogType> {
    match value {
        Value::Number(n) => n.as_i64().and_then(log_type_from_code),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(code) = s.parse::<i64>() {
                return log_type_from_code(code);
            }
            match s.to_ascii_lowercase().as_str() {
                "in" | "check in" | "check-in" | "checkin" => Some(LogType::In),
                "out" | "check out" | "check-out" | "checkout" => Some(LogType::Out),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Device query parameter format, in device local time
pub(crate) fn format_device_time(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    instant
        .with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_biotime_record_with_aliases() {
        let record = json!({
            "id": 1042,
            "emp_code": "E01",
            "punch_time": "2025-03-10 09:00:00",
            "punch_state": "0",
            "terminal_sn": "CQZ7232260001",
            "terminal_alias": "Front door"
        });

        let txn = parse_record(&record, utc()).unwrap();
        assert_eq!(txn.device_transaction_id.as_deref(), Some("1042"));
        assert_eq!(txn.employee_code, "E01");
        assert_eq!(txn.punch_time, Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap());
        assert_eq!(txn.log_type, LogType::In);
        assert_eq!(txn.device_id, "CQZ7232260001");
    }

    #[test]
    fn test_naive_time_uses_device_offset() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let parsed = parse_punch_time("2025-03-10 09:00:00", offset).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap());

        let explicit = parse_punch_time("2025-03-10T09:00:00Z", offset).unwrap();
        assert_eq!(explicit, Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_punch_state_codes_and_labels() {
        assert_eq!(parse_log_type(&json!(1)), Some(LogType::Out));
        assert_eq!(parse_log_type(&json!(3)), Some(LogType::In));
        assert_eq!(parse_log_type(&json!("5")), Some(LogType::Out));
        assert_eq!(parse_log_type(&json!("Check Out")), Some(LogType::Out));
        assert_eq!(parse_log_type(&json!("IN")), Some(LogType::In));
        assert_eq!(parse_log_type(&json!(9)), None);
        assert_eq!(parse_log_type(&json!(true)), None);
    }

    #[test]
    fn test_missing_device_id_uses_sentinel() {
        let record = json!({
            "employee_code": "E01",
            "punch_time": "2025-03-10T09:00:00Z",
            "log_type": "OUT"
        });
        let txn = parse_record(&record, utc()).unwrap();
        assert_eq!(txn.device_id, UNKNOWN_DEVICE_ID);
        assert_eq!(txn.device_transaction_id, None);
    }

    #[test]
    fn test_malformed_records_keep_their_id() {
        let no_code = json!({"id": "T9", "punch_time": "2025-03-10 09:00:00", "punch_state": 0});
        let err = parse_record(&no_code, utc()).unwrap_err();
        assert_eq!(err.device_transaction_id.as_deref(), Some("T9"));
        assert_eq!(err.reason, "missing employee_code");

        let bad_time = json!({"emp_code": "E01", "punch_time": "yesterday", "punch_state": 0});
        assert!(parse_record(&bad_time, utc())
            .unwrap_err()
            .reason
            .starts_with("unparseable punch_time"));

        let no_state = json!({"emp_code": "E01", "punch_time": "2025-03-10 09:00:00", "punch_state": null});
        assert_eq!(parse_record(&no_state, utc()).unwrap_err().reason, "missing log_type");
    }

    #[test]
    fn test_page_envelope_and_bare_array() {
        let page = parse_page(json!({
            "count": 3,
            "next": "http://device/iclock/api/transactions/?page=2",
            "previous": null,
            "data": [{"id": 1}, {"id": 2}]
        }))
        .unwrap();
        assert_eq!(page.count, Some(3));
        assert_eq!(page.records.len(), 2);
        assert!(page.next.is_some());

        let bare = parse_page(json!([{"id": 1}])).unwrap();
        assert_eq!(bare.count, Some(1));
        assert!(bare.next.is_none());

        let err = parse_page(json!({"code": 1, "msg": "token expired"})).unwrap_err();
        assert!(err.contains("token expired"));
    }

    #[test]
    fn test_device_time_format() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let instant = Utc.with_ymd_and_hms(2025, 3, 10, 21, 0, 0).unwrap();
        assert_eq!(format_device_time(instant, offset), "2025-03-11 00:00:00");
    }
}
