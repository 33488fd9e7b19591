#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use async_trait::async_trait;
use common::{students, synced, MemoryTarget};
use rostersync_core::errors::{ExErrorKind, Result, TargetError};
use rostersync_core::failsafe::{FailsafeGuard, FailsafeOverride, FailsafeVerdict};
use rostersync_core::model::{
    AbortReason, ApplyAction, CanonicalRecord, ContentHash, FailureReason, RecordOutcome,
    SkipReason, TargetRecord, TrackedField, UpdateEntry,
};
use rostersync_core::{
    compute_change_set, prepare_preview, ApplyCoordinator, ApplyOptions, CancelToken, ChangeSet,
    RecordHasher, TargetAdapter,
};

async fn diff(source: &[CanonicalRecord], target: &MemoryTarget) -> ChangeSet {
    let manifest = target.load_manifest().await.unwrap();
    let cs = compute_change_set(target.name(), source, &manifest, target);
    prepare_preview(cs, target).await.unwrap()
}

#[tokio::test]
async fn test_groups_run_in_order() {
    let mut source = students("S", 10);
    let target = MemoryTarget::seeded("directory", &source);
    source[0].first_name = "Changed".to_string();
    source.remove(9);
    source.push(CanonicalRecord::student("N1", "New", "Kid", "5a"));

    let cs = diff(&source, &target).await;
    ApplyCoordinator::new(ApplyOptions { max_parallel: 3 })
        .apply(&cs, &FailsafeVerdict::Pass, None, &target, &CancelToken::new())
        .await;

    assert_eq!(
        target.calls().await,
        vec!["create:N1", "update:S0", "suspend:S9"]
    );
}

#[tokio::test]
async fn test_record_failure_does_not_stop_siblings() {
    let target = MemoryTarget::new("directory");
    target
        .fail(
            "N1",
            TargetError::Rejected {
                reason: "quota exceeded".to_string(),
            },
        )
        .await;
    let source = students("N", 4);

    let cs = diff(&source, &target).await;
    let report = ApplyCoordinator::new(ApplyOptions { max_parallel: 2 })
        .apply(&cs, &FailsafeVerdict::Pass, None, &target, &CancelToken::new())
        .await;

    let counts = report.counts();
    assert_eq!(counts.applied, 3);
    assert_eq!(counts.failed, 1);
    assert!(report.aborted.is_none());
    assert!(matches!(
        report.outcome_for("N1", ApplyAction::Create),
        Some(RecordOutcome::Failed(FailureReason::Target {
            error: TargetError::Rejected { .. }
        }))
    ));
    // entries keep input order
    let keys: Vec<_> = report.entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["N0", "N1", "N2", "N3"]);
}

#[tokio::test]
async fn test_unavailable_target_skips_remaining() {
    let target = MemoryTarget::new("directory");
    target
        .fail(
            "N1",
            TargetError::Unavailable {
                reason: "connection refused".to_string(),
            },
        )
        .await;
    let source = students("N", 5);

    let cs = diff(&source, &target).await;
    let report = ApplyCoordinator::new(ApplyOptions { max_parallel: 1 })
        .apply(&cs, &FailsafeVerdict::Pass, None, &target, &CancelToken::new())
        .await;

    assert!(matches!(
        report.aborted,
        Some(AbortReason::AdapterUnavailable { .. })
    ));
    assert_eq!(
        report.outcome_for("N0", ApplyAction::Create),
        Some(&RecordOutcome::Applied)
    );
    for key in ["N2", "N3", "N4"] {
        assert_eq!(
            report.outcome_for(key, ApplyAction::Create),
            Some(&RecordOutcome::Skipped(SkipReason::TargetUnavailable))
        );
    }
    assert_eq!(target.calls().await.len(), 2);
}

#[tokio::test]
async fn test_cancel_before_apply_skips_everything() {
    let target = MemoryTarget::new("directory");
    let source = students("N", 3);
    let cs = diff(&source, &target).await;

    let cancel = CancelToken::new();
    cancel.cancel();
    let report = ApplyCoordinator::default()
        .apply(&cs, &FailsafeVerdict::Pass, None, &target, &cancel)
        .await;

    assert_eq!(report.aborted, Some(AbortReason::Cancelled));
    assert_eq!(report.counts().skipped, 3);
    assert!(target.calls().await.is_empty());
}

#[tokio::test]
async fn test_override_lifts_exactly_the_reviewed_verdict() {
    let all = students("S", 10);
    let target = MemoryTarget::seeded("directory", &all);
    let cs = diff(&all[5..], &target).await;
    let verdict = FailsafeGuard::default().evaluate(&cs, cs.population());
    let phrase = verdict.confirmation_phrase().unwrap();
    assert_eq!(phrase, "override directory 5");

    let ack = FailsafeOverride::acknowledge(&verdict, &phrase).unwrap();
    let report = ApplyCoordinator::default()
        .apply(&cs, &verdict, Some(&ack), &target, &CancelToken::new())
        .await;

    assert_eq!(report.counts().applied, 5);
    assert_eq!(
        target.entries().await.iter().filter(|e| !e.active).count(),
        5
    );
}

#[tokio::test]
async fn test_stale_override_is_ignored() {
    let all = students("S", 10);
    let target = MemoryTarget::seeded("directory", &all);

    let earlier = diff(&all[5..], &target).await;
    let earlier_verdict = FailsafeGuard::default().evaluate(&earlier, earlier.population());
    let ack = FailsafeOverride::acknowledge(&earlier_verdict, "override directory 5").unwrap();

    let now = diff(&all[7..], &target).await;
    let verdict = FailsafeGuard::default().evaluate(&now, now.population());
    let report = ApplyCoordinator::default()
        .apply(&now, &verdict, Some(&ack), &target, &CancelToken::new())
        .await;

    assert_eq!(report.aborted, Some(AbortReason::Blocked));
    assert!(target.calls().await.is_empty());
}

#[tokio::test]
async fn test_conflicted_records_are_skipped() {
    let target = MemoryTarget::new("directory");
    target
        .push_entry(TargetRecord::new(ContentHash::new("h")).with_contact_address("x@school.org"))
        .await;
    for n in 0..10 {
        target
            .push_entry(
                TargetRecord::new(ContentHash::new("h"))
                    .with_external_id(format!("K{}", n))
                    .with_field(TrackedField::FirstName, "Keep"),
            )
            .await;
    }
    let mut source: Vec<CanonicalRecord> = (0..10)
        .map(|n| CanonicalRecord::student(format!("K{}", n), "Keep", "Me", "5a"))
        .collect();
    source.push(CanonicalRecord::student("A1", "Anna", "X", "5a").with_contact_address("x@school.org"));
    source.push(CanonicalRecord::student("A2", "Arne", "X", "5a").with_contact_address("X@school.org"));

    let cs = diff(&source, &target).await;
    assert_eq!(cs.conflicts.len(), 1);
    let verdict = FailsafeGuard::default().evaluate(&cs, cs.population());

    let report = ApplyCoordinator::default()
        .apply(&cs, &verdict, None, &target, &CancelToken::new())
        .await;

    for key in ["A1", "A2"] {
        assert_eq!(
            report.outcome_for(key, ApplyAction::Create),
            Some(&RecordOutcome::Skipped(SkipReason::MatchConflict))
        );
    }
    assert_eq!(
        report.outcome_for("x@school.org", ApplyAction::Suspend),
        Some(&RecordOutcome::Skipped(SkipReason::MatchConflict))
    );
    assert!(!target
        .calls()
        .await
        .iter()
        .any(|c| c.starts_with("create:A") || c.starts_with("suspend:x@")));
}

#[tokio::test]
async fn test_generated_addresses_only_for_applied_creates() {
    let target = MemoryTarget::new("directory");
    target
        .fail(
            "B1",
            TargetError::Rejected {
                reason: "invalid group".to_string(),
            },
        )
        .await;
    let source = vec![
        CanonicalRecord::student("A1", "Anna", "Berg", "5a"),
        CanonicalRecord::student("B1", "Ben", "Berg", "5a"),
        CanonicalRecord::student("C1", "Carla", "Berg", "5a").with_contact_address("carla@school.org"),
    ];

    let cs = diff(&source, &target).await;
    assert_eq!(cs.generated_addresses.len(), 2);
    let report = ApplyCoordinator::default()
        .apply(&cs, &FailsafeVerdict::Pass, None, &target, &CancelToken::new())
        .await;

    let generated: Vec<_> = report
        .generated_addresses
        .iter()
        .map(|a| (a.external_id.as_str(), a.contact_address.as_str()))
        .collect();
    assert_eq!(generated, vec![("A1", "aberg@school.org")]);
}

/// Target whose enrichment breaks the contract by dropping records
struct DroppingTarget(MemoryTarget);

impl RecordHasher for DroppingTarget {
    fn tracked_fields(&self) -> &[TrackedField] {
        self.0.tracked_fields()
    }

    fn content_hash(&self, record: &CanonicalRecord) -> ContentHash {
        self.0.content_hash(record)
    }
}

#[async_trait]
impl TargetAdapter for DroppingTarget {
    fn name(&self) -> &str {
        "dropping"
    }

    async fn load_manifest(&self) -> Result<Vec<TargetRecord>> {
        self.0.load_manifest().await
    }

    async fn create(&self, record: &CanonicalRecord) -> std::result::Result<(), TargetError> {
        self.0.create(record).await
    }

    async fn update(&self, entry: &UpdateEntry) -> std::result::Result<(), TargetError> {
        self.0.update(entry).await
    }

    async fn suspend(&self, record: &TargetRecord) -> std::result::Result<(), TargetError> {
        self.0.suspend(record).await
    }

    async fn enrich_preview(&self, mut records: Vec<CanonicalRecord>) -> Result<Vec<CanonicalRecord>> {
        records.pop();
        Ok(records)
    }
}

#[tokio::test]
async fn test_enrichment_must_keep_records() {
    let target = DroppingTarget(MemoryTarget::new("dropping"));
    let source = students("N", 2);
    let cs = compute_change_set("dropping", &source, &[], &target);

    let err = prepare_preview(cs, &target).await.unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::AdapterContract);
    assert_eq!(err.target(), Some("dropping"));
}

#[tokio::test]
async fn test_anomaly_update_pushes_full_record() {
    let anna = CanonicalRecord::student("A1", "Anna", "Schmidt", "5a");
    let target = MemoryTarget::new("directory");
    let mut stale = synced(target.digest(), &anna);
    stale.content_hash = ContentHash::new("stale");
    target.push_entry(stale).await;

    let cs = diff(std::slice::from_ref(&anna), &target).await;
    assert_eq!(cs.anomalies.len(), 1);

    let report = ApplyCoordinator::default()
        .apply(&cs, &FailsafeVerdict::Pass, None, &target, &CancelToken::new())
        .await;

    assert!(report.is_clean());
    assert_eq!(report.anomalies.len(), 1);
    let entries = target.entries().await;
    assert_eq!(entries[0].content_hash, target.content_hash(&anna));
}
