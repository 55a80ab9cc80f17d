//! Job set differ: compares running jobs against expected work items.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::contract::{contract_fingerprint, CorrelationKey, JobHandle, TrackedJob};
use crate::error::NamingError;
use crate::inventory::WorkItem;
use crate::naming::{has_job_prefix, tracked_job_key};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    /// Running jobs whose key is no longer expected.
    pub kill: Vec<JobHandle>,
    /// Expected items with no running job.
    pub submit: Vec<WorkItem>,
    /// Running jobs that already satisfy an expected item.
    pub unchanged: Vec<JobHandle>,
    pub snapshot_fingerprint: String,
}

impl ReconcilePlan {
    pub fn is_converged(&self) -> bool {
        self.kill.is_empty() && self.submit.is_empty()
    }
}

#[derive(Serialize)]
struct SnapshotFingerprintPayload<'a> {
    tracked: Vec<(CorrelationKey, &'a str)>,
    expected: Vec<CorrelationKey>,
}

/// Plans the kill and submit lists for one reconciliation pass.
///
/// Only jobs named `<job_prefix>-...` take part; other workloads sharing the
/// queue are left alone. Every participating job must yield a correlation key,
/// otherwise the whole pass fails and nothing is planned.
pub fn plan_reconciliation(
    tracked: &[TrackedJob],
    expected: &[WorkItem],
    job_prefix: &str,
) -> Result<ReconcilePlan, NamingError> {
    let keyed = tracked
        .iter()
        .filter(|job| has_job_prefix(&job.handle.job_name, job_prefix))
        .map(|job| Ok((tracked_job_key(job, job_prefix)?, job.handle.clone())))
        .collect::<Result<Vec<_>, NamingError>>()?;

    Ok(diff(keyed, expected))
}

/// Pure set difference over already-keyed jobs.
pub fn diff(tracked: Vec<(CorrelationKey, JobHandle)>, expected: &[WorkItem]) -> ReconcilePlan {
    let mut expected_by_key: BTreeMap<CorrelationKey, &WorkItem> = BTreeMap::new();
    for item in expected {
        expected_by_key.entry(item.key).or_insert(item);
    }

    let mut tracked = tracked;
    tracked.sort_by(|(key_a, handle_a), (key_b, handle_b)| {
        key_a.cmp(key_b).then_with(|| handle_a.job_id.cmp(&handle_b.job_id))
    });

    let snapshot_fingerprint = contract_fingerprint(SnapshotFingerprintPayload {
        tracked: tracked
            .iter()
            .map(|(key, handle)| (*key, handle.job_id.as_str()))
            .collect(),
        expected: expected_by_key.keys().copied().collect(),
    });

    let running_keys: BTreeSet<CorrelationKey> = tracked.iter().map(|(key, _)| *key).collect();

    let mut kill = Vec::new();
    let mut unchanged = Vec::new();
    for (key, handle) in tracked {
        if expected_by_key.contains_key(&key) {
            unchanged.push(handle);
        } else {
            kill.push(handle);
        }
    }

    let submit = expected_by_key
        .into_iter()
        .filter(|(key, _)| !running_keys.contains(key))
        .map(|(_, item)| item.clone())
        .collect();

    ReconcilePlan {
        kill,
        submit,
        unchanged,
        snapshot_fingerprint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "virtual-sensor";

    fn item(key: u64) -> WorkItem {
        WorkItem {
            key: CorrelationKey(key),
            object_key: format!("DG-NG-sensor-data/train_{key}.csv"),
        }
    }

    fn job(name: &str, id: &str) -> TrackedJob {
        TrackedJob::untagged(JobHandle::new(name, id))
    }

    fn submit_keys(plan: &ReconcilePlan) -> Vec<u64> {
        plan.submit.iter().map(|item| item.key.0).collect()
    }

    #[test]
    fn kills_orphans_and_submits_missing_items() {
        let tracked = vec![job("virtual-sensor-1", "j1"), job("virtual-sensor-3", "j3")];
        let plan = plan_reconciliation(&tracked, &[item(1), item(2)], PREFIX)
            .expect("plan should succeed");

        assert_eq!(plan.kill, vec![JobHandle::new("virtual-sensor-3", "j3")]);
        assert_eq!(submit_keys(&plan), vec![2]);
        assert_eq!(plan.unchanged, vec![JobHandle::new("virtual-sensor-1", "j1")]);
    }

    #[test]
    fn empty_tracked_set_submits_everything() {
        let plan = plan_reconciliation(&[], &[item(4), item(2)], PREFIX).expect("plan");

        assert!(plan.kill.is_empty());
        assert_eq!(submit_keys(&plan), vec![2, 4]);
    }

    #[test]
    fn empty_expected_set_kills_everything() {
        let tracked = vec![job("virtual-sensor-1", "j1"), job("virtual-sensor-2", "j2")];
        let plan = plan_reconciliation(&tracked, &[], PREFIX).expect("plan");

        assert_eq!(plan.kill.len(), 2);
        assert!(plan.submit.is_empty());
    }

    #[test]
    fn applying_a_plan_converges_on_the_next_pass() {
        let mut tracked = vec![job("virtual-sensor-1", "j1"), job("virtual-sensor-3", "j3")];
        let expected = vec![item(1), item(2)];

        let first = plan_reconciliation(&tracked, &expected, PREFIX).expect("plan");
        tracked.retain(|job| !first.kill.contains(&job.handle));
        for submitted in &first.submit {
            tracked.push(job(&format!("virtual-sensor-{}", submitted.key), "new"));
        }

        let second = plan_reconciliation(&tracked, &expected, PREFIX).expect("plan");
        assert!(second.is_converged());

        let third = plan_reconciliation(&tracked, &expected, PREFIX).expect("plan");
        assert_eq!(second, third);
    }

    #[test]
    fn ignores_jobs_from_other_workloads() {
        let tracked = vec![job("calibration-7", "c7"), job("virtual-sensor-1", "j1")];
        let plan = plan_reconciliation(&tracked, &[item(1)], PREFIX).expect("plan");

        assert!(plan.is_converged());
        assert_eq!(plan.unchanged.len(), 1);
    }

    #[test]
    fn malformed_job_name_aborts_the_pass() {
        let tracked = vec![job("virtual-sensor-1", "j1"), job("virtual-sensor-latest", "jx")];
        let error = plan_reconciliation(&tracked, &[item(1)], PREFIX).expect_err("should fail");

        assert!(matches!(error, NamingError::NonNumericKey { raw, .. } if raw == "latest"));
    }

    #[test]
    fn duplicate_expected_keys_are_submitted_once() {
        let plan = diff(Vec::new(), &[item(5), item(5)]);
        assert_eq!(submit_keys(&plan), vec![5]);
    }

    #[test]
    fn kill_and_submit_are_disjoint_from_satisfied_keys() {
        let tracked: Vec<(CorrelationKey, JobHandle)> = [1u64, 2, 3, 5, 8]
            .iter()
            .map(|key| {
                (
                    CorrelationKey(*key),
                    JobHandle::new(format!("virtual-sensor-{key}"), format!("j{key}")),
                )
            })
            .collect();
        let expected: Vec<WorkItem> = [2u64, 3, 4, 8, 13].iter().map(|key| item(*key)).collect();

        let plan = diff(tracked, &expected);

        let killed: Vec<&str> = plan.kill.iter().map(|handle| handle.job_id.as_str()).collect();
        assert_eq!(killed, vec!["j1", "j5"]);
        assert_eq!(submit_keys(&plan), vec![4, 13]);
        assert_eq!(plan.unchanged.len(), 3);
    }

    #[test]
    fn fingerprint_ignores_input_order() {
        let a = diff(
            vec![
                (CorrelationKey(1), JobHandle::new("virtual-sensor-1", "j1")),
                (CorrelationKey(2), JobHandle::new("virtual-sensor-2", "j2")),
            ],
            &[item(2), item(1)],
        );
        let b = diff(
            vec![
                (CorrelationKey(2), JobHandle::new("virtual-sensor-2", "j2")),
                (CorrelationKey(1), JobHandle::new("virtual-sensor-1", "j1")),
            ],
            &[item(1), item(2)],
        );

        assert_eq!(a.snapshot_fingerprint, b.snapshot_fingerprint);
    }
}
