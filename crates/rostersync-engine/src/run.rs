//! Run orchestration
//!
//! One [`SyncEngine`] run is load, plan, apply. Planning and applying fan
//! out over targets; a failing target never stops the others. Results
//! always come back in target configuration order.

use crate::registry::AdapterRegistry;
use crate::settings::Settings;
use rostersync_core::apply::ApplyOptions;
use rostersync_core::errors::{ExError, ExErrorKind, Result};
use rostersync_core::failsafe::{FailsafeGuard, FailsafeOverride, FailsafeVerdict};
use rostersync_core::model::{validate_canonical, AbortReason, AddressAssignment, CanonicalRecord};
use rostersync_core::{
    compute_change_set, log_op_end, log_op_error, log_op_start, prepare_preview, ApplyCoordinator,
    CancelToken, ChangeSet, RunReport, SourceAdapter, TargetAdapter,
};
use rostersync_core_types::RunContext;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Failsafe and apply tuning for one engine
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub guard: FailsafeGuard,
    pub apply: ApplyOptions,
}

/// What planning produced for one target
#[derive(Debug, Clone)]
pub enum TargetPlan {
    Ready {
        target: String,
        change_set: ChangeSet,
        verdict: FailsafeVerdict,
    },
    /// The manifest or the preview enrichment could not be obtained
    Unavailable { target: String, error: ExError },
}

impl TargetPlan {
    pub fn target(&self) -> &str {
        match self {
            TargetPlan::Ready { target, .. } | TargetPlan::Unavailable { target, .. } => target,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, TargetPlan::Ready { verdict, .. } if verdict.is_blocked())
    }
}

pub struct SyncEngine {
    context: RunContext,
    source: Arc<dyn SourceAdapter>,
    targets: Vec<Arc<dyn TargetAdapter>>,
    options: EngineOptions,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        targets: Vec<Arc<dyn TargetAdapter>>,
        options: EngineOptions,
    ) -> Self {
        Self {
            context: RunContext::new(),
            source,
            targets,
            options,
        }
    }

    /// Build the configured source and enabled targets.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` or `UnknownAdapter` from settings validation or the
    /// registry.
    pub fn from_settings(registry: &AdapterRegistry, settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let options = EngineOptions {
            guard: settings.failsafe_guard()?,
            apply: settings.apply_options(),
        };
        Ok(Self::new(
            registry.build_source(settings)?,
            registry.build_targets(settings)?,
            options,
        ))
    }

    /// Tie this run to an id handed in by the caller
    pub fn with_run_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    fn trace_id(&self) -> &str {
        self.context
            .trace_id
            .as_ref()
            .map_or("", |t| t.as_str())
    }

    pub fn target_names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name().to_string()).collect()
    }

    /// Check every target without reading or writing entries.
    pub async fn test_connections(&self) -> Vec<(String, Result<()>)> {
        let mut results = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            results.push((target.name().to_string(), target.test_connection().await));
        }
        results
    }

    /// Load and validate the canonical records.
    ///
    /// # Errors
    ///
    /// `SourceUnavailable` or `SourceMalformed`; no target is touched.
    pub async fn load(&self) -> Result<Vec<CanonicalRecord>> {
        let start = Instant::now();
        log_op_start!(
            "load",
            run_id = %self.context.run_id,
            trace_id = self.trace_id(),
            source = self.source.name()
        );

        let loaded = match self.source.load_canonical().await {
            Ok(records) => validate_canonical(&records).map(|()| records),
            Err(e) => Err(e),
        };
        match loaded {
            Ok(records) => {
                log_op_end!(
                    "load",
                    duration_ms = start.elapsed().as_millis() as u64,
                    record_count = records.len()
                );
                Ok(records)
            }
            Err(e) => {
                log_op_error!(
                    "load",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Err(e)
            }
        }
    }

    /// Diff every target against `records`, previewing generated data and
    /// evaluating the failsafe. Targets are planned concurrently.
    pub async fn plan(&self, records: &[CanonicalRecord]) -> Vec<TargetPlan> {
        let start = Instant::now();
        log_op_start!(
            "plan",
            run_id = %self.context.run_id,
            trace_id = self.trace_id(),
            target_count = self.targets.len()
        );

        let records: Arc<[CanonicalRecord]> = Arc::from(records);
        let mut tasks = JoinSet::new();
        for (index, target) in self.targets.iter().enumerate() {
            let target = Arc::clone(target);
            let records = Arc::clone(&records);
            let guard = self.options.guard;
            tasks.spawn(async move { (index, plan_target(target, &records, guard).await) });
        }

        let mut plans: BTreeMap<usize, TargetPlan> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, plan)) => {
                    plans.insert(index, plan);
                }
                Err(e) => tracing::error!(error = %e, "plan task failed to complete"),
            }
        }
        // a panicked task still yields a plan for its target
        let plans: Vec<TargetPlan> = self
            .targets
            .iter()
            .enumerate()
            .map(|(index, target)| {
                plans.remove(&index).unwrap_or_else(|| TargetPlan::Unavailable {
                    target: target.name().to_string(),
                    error: ExError::new(ExErrorKind::Internal)
                        .with_op("plan")
                        .with_target(target.name().to_string())
                        .with_message("planning task aborted"),
                })
            })
            .collect();

        log_op_end!(
            "plan",
            duration_ms = start.elapsed().as_millis() as u64,
            blocked_count = plans.iter().filter(|p| p.is_blocked()).count()
        );
        plans
    }

    /// Apply planned change sets, each target in its own task.
    ///
    /// `overrides` lift blocked verdicts they were acknowledged for. Plans
    /// that could not be produced become reports aborted as unavailable.
    pub async fn apply(
        &self,
        plans: Vec<TargetPlan>,
        overrides: &[FailsafeOverride],
        cancel: &CancelToken,
    ) -> Vec<RunReport> {
        let start = Instant::now();
        log_op_start!(
            "apply_all",
            run_id = %self.context.run_id,
            trace_id = self.trace_id(),
            target_count = plans.len()
        );

        let coordinator = ApplyCoordinator::new(self.options.apply);
        let mut slots: Vec<Option<RunReport>> = Vec::with_capacity(plans.len());
        let mut names: Vec<String> = Vec::with_capacity(plans.len());
        let mut tasks = JoinSet::new();

        for (index, plan) in plans.into_iter().enumerate() {
            names.push(plan.target().to_string());
            match plan {
                TargetPlan::Unavailable { target, error } => {
                    slots.push(Some(self.unavailable_report(&target, error.to_string())));
                }
                TargetPlan::Ready {
                    target,
                    change_set,
                    verdict,
                } => {
                    slots.push(None);
                    let Some(adapter) = self.targets.iter().find(|t| t.name() == target) else {
                        slots[index] = Some(self.unavailable_report(
                            &target,
                            "target not configured in this engine".to_string(),
                        ));
                        continue;
                    };
                    let adapter = Arc::clone(adapter);
                    let ack = overrides.iter().find(|o| o.covers(&verdict)).cloned();
                    let cancel = cancel.clone();
                    let coordinator = coordinator.clone();
                    tasks.spawn(async move {
                        let report = coordinator
                            .apply(&change_set, &verdict, ack.as_ref(), adapter.as_ref(), &cancel)
                            .await;
                        (index, report)
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, mut report)) => {
                    report.run_id = self.context.run_id.clone();
                    slots[index] = Some(report);
                }
                Err(e) => tracing::error!(error = %e, "apply task failed to complete"),
            }
        }

        let reports: Vec<RunReport> = slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| self.unavailable_report(&name, "apply task aborted".to_string()))
            })
            .collect();

        log_op_end!(
            "apply_all",
            duration_ms = start.elapsed().as_millis() as u64,
            clean_count = reports.iter().filter(|r| r.is_clean()).count()
        );
        reports
    }

    /// Write addresses generated during apply back to the source.
    ///
    /// Returns the number of records the source updated; zero when the
    /// source cannot store addresses.
    ///
    /// # Errors
    ///
    /// Whatever the source reports while writing.
    pub async fn write_back(&self, reports: &[RunReport]) -> Result<usize> {
        let mut by_id: BTreeMap<&str, &AddressAssignment> = BTreeMap::new();
        for assignment in reports.iter().flat_map(|r| &r.generated_addresses) {
            by_id.entry(assignment.external_id.as_str()).or_insert(assignment);
        }
        if by_id.is_empty() {
            return Ok(0);
        }
        if !self.source.supports_write_back() {
            tracing::warn!(
                source = self.source.name(),
                count = by_id.len(),
                "source cannot store generated addresses"
            );
            return Ok(0);
        }
        let assignments: Vec<AddressAssignment> = by_id.into_values().cloned().collect();
        self.source.write_back(&assignments).await
    }

    fn unavailable_report(&self, target: &str, reason: String) -> RunReport {
        let mut report =
            RunReport::new(self.context.run_id.clone(), target, FailsafeVerdict::Pass);
        report.aborted = Some(AbortReason::AdapterUnavailable { reason });
        report
    }
}

async fn plan_target(
    target: Arc<dyn TargetAdapter>,
    records: &[CanonicalRecord],
    guard: FailsafeGuard,
) -> TargetPlan {
    let name = target.name().to_string();
    let unavailable = |error: ExError| {
        tracing::warn!(target_name = %name, error = %error, "target skipped for this run");
        TargetPlan::Unavailable {
            target: name.clone(),
            error,
        }
    };

    let manifest = match target.load_manifest().await {
        Ok(manifest) => manifest,
        Err(e) => return unavailable(e.with_target(name.clone())),
    };
    let change_set = compute_change_set(&name, records, &manifest, target.as_ref());
    let change_set = match prepare_preview(change_set, target.as_ref()).await {
        Ok(change_set) => change_set,
        Err(e) => return unavailable(e),
    };
    let verdict = guard.evaluate(&change_set, change_set.population());

    TargetPlan::Ready {
        target: name,
        change_set,
        verdict,
    }
}
