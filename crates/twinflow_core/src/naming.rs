//! Correlation-key naming conventions.
//!
//! Work items are objects named `<prefix>_<key>.<ext>` (the extension is
//! optional); jobs serving them are named `<job_prefix>-<key>`. Both keys are
//! unsigned integers. Anything else is a [`NamingError`], never a silent skip.

use crate::contract::{CorrelationKey, TrackedJob};
use crate::error::NamingError;

/// Final path segment of an object key.
pub fn basename(object_key: &str) -> &str {
    object_key.rsplit('/').next().unwrap_or(object_key)
}

pub fn parse_item_key(object_key: &str) -> Result<CorrelationKey, NamingError> {
    let name = basename(object_key);
    let Some((_, suffix)) = name.rsplit_once('_') else {
        return Err(NamingError::MalformedItemName {
            name: object_key.to_string(),
        });
    };
    let raw = suffix.split('.').next().unwrap_or(suffix);
    parse_key(object_key, raw)
}

pub fn job_name(job_prefix: &str, key: CorrelationKey) -> String {
    format!("{job_prefix}-{key}")
}

pub fn has_job_prefix(job_name: &str, job_prefix: &str) -> bool {
    job_name
        .strip_prefix(job_prefix)
        .is_some_and(|rest| rest.starts_with('-'))
}

pub fn parse_job_key(job_name: &str, job_prefix: &str) -> Result<CorrelationKey, NamingError> {
    let raw = job_name
        .strip_prefix(job_prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .ok_or_else(|| NamingError::MalformedJobName {
            name: job_name.to_string(),
            prefix: job_prefix.to_string(),
        })?;
    parse_key(job_name, raw)
}

/// Key of a tracked job. The submission tag wins over the display name; the
/// name is only parsed for jobs submitted without one.
pub fn tracked_job_key(job: &TrackedJob, job_prefix: &str) -> Result<CorrelationKey, NamingError> {
    match job.correlation_tag() {
        Some(tag) => parse_key(&job.handle.job_name, tag),
        None => parse_job_key(&job.handle.job_name, job_prefix),
    }
}

fn parse_key(name: &str, raw: &str) -> Result<CorrelationKey, NamingError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(NamingError::NonNumericKey {
            name: name.to_string(),
            raw: raw.to_string(),
        });
    }
    raw.parse::<u64>()
        .map(CorrelationKey)
        .map_err(|_| NamingError::NonNumericKey {
            name: name.to_string(),
            raw: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::contract::{JobHandle, CORRELATION_KEY_TAG};

    use super::*;

    #[test]
    fn extracts_item_key_from_nested_object_key() {
        let key = parse_item_key("DG-NG-sensor-data/train_data_12.csv").expect("key should parse");
        assert_eq!(key, CorrelationKey(12));
    }

    #[test]
    fn item_extension_is_optional() {
        assert_eq!(parse_item_key("sensor_7"), Ok(CorrelationKey(7)));
    }

    #[test]
    fn rejects_item_without_separator() {
        let error = parse_item_key("DG-NG-sensor-data/readme.txt").expect_err("should fail");
        assert_eq!(
            error,
            NamingError::MalformedItemName {
                name: "DG-NG-sensor-data/readme.txt".to_string()
            }
        );
    }

    #[test]
    fn rejects_non_numeric_item_key() {
        let error = parse_item_key("data/sensor_abc.csv").expect_err("should fail");
        assert!(matches!(error, NamingError::NonNumericKey { raw, .. } if raw == "abc"));
    }

    #[test]
    fn separator_in_folder_does_not_count() {
        assert!(parse_item_key("sensor_data/readme.csv").is_err());
    }

    #[test]
    fn job_name_round_trips_through_parser() {
        let name = job_name("twinflow-batch-virtual-sensor", CorrelationKey(42));
        assert_eq!(name, "twinflow-batch-virtual-sensor-42");
        assert_eq!(
            parse_job_key(&name, "twinflow-batch-virtual-sensor"),
            Ok(CorrelationKey(42))
        );
    }

    #[test]
    fn prefix_match_requires_dash_boundary() {
        assert!(has_job_prefix("virtual-sensor-3", "virtual-sensor"));
        assert!(!has_job_prefix("virtual-sensors-3", "virtual-sensor"));
        assert!(!has_job_prefix("calibration-3", "virtual-sensor"));
    }

    #[test]
    fn tag_takes_precedence_over_name() {
        let job = TrackedJob {
            handle: JobHandle::new("renamed-by-operator", "j9"),
            tags: BTreeMap::from([(CORRELATION_KEY_TAG.to_string(), "9".to_string())]),
        };
        assert_eq!(tracked_job_key(&job, "virtual-sensor"), Ok(CorrelationKey(9)));
    }

    #[test]
    fn untagged_job_falls_back_to_name() {
        let job = TrackedJob::untagged(JobHandle::new("virtual-sensor-x", "j1"));
        assert!(matches!(
            tracked_job_key(&job, "virtual-sensor"),
            Err(NamingError::NonNumericKey { .. })
        ));
    }
}
