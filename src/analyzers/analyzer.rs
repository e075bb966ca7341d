use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, warn};

use crate::analyzers::classifier::{ClassificationBatch, Classifier};
use crate::analyzers::evaluator::evaluate_rule;
use crate::analyzers::reference::attach_reference_stats;
use crate::calendar::days_before;
use crate::config::MonitorConfig;
use crate::ledger::{ReportError, ReportStore};
use crate::reports::EvaluationReport;
use crate::rules::Rule;
use crate::source::{TripQuery, TripSource};

/// What one scheduled run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<EvaluationReport>,
    /// Rules not evaluated: not saved, or already evaluated for the day.
    pub skipped: usize,
    pub trips_loaded: usize,
    pub trips_excluded: usize,
}

/// Loads trips, fills in missing reference statistics and classifies them.
#[tracing::instrument(skip_all, fields(from = ?query.from, to = ?query.to))]
pub async fn load_classified(
    source: &dyn TripSource,
    config: &MonitorConfig,
    query: &TripQuery,
) -> Result<(usize, ClassificationBatch)> {
    let mut trips = source.fetch_trips(query).await?;
    let filled = attach_reference_stats(&mut trips, config);

    let classifier = Classifier::from_config(config);
    let batch = classifier.classify_all(&trips);

    info!(
        trips = trips.len(),
        reference_filled = filled,
        classified = batch.classified.len(),
        invalid = batch.invalid,
        insufficient_samples = batch.insufficient_samples,
        "Trips classified"
    );

    Ok((trips.len(), batch))
}

/// Trip query covering every rule's window plus the reference lookback.
fn query_for(rules: &[&Rule], config: &MonitorConfig, as_of: NaiveDate) -> TripQuery {
    let lookback = rules
        .iter()
        .map(|r| r.params.scope.lookback_days)
        .max()
        .unwrap_or(0);
    let from = days_before(
        days_before(as_of, lookback),
        config.reference_window_days,
    );

    let models = if rules.iter().any(|r| r.params.scope.all_models()) {
        Vec::new()
    } else {
        rules
            .iter()
            .flat_map(|r| r.params.scope.models.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    };

    TripQuery {
        from: Some(from),
        to: Some(as_of),
        models,
    }
}

/// Evaluates every evaluable rule as of `as_of` and records the reports.
///
/// Trips are loaded and classified once; rules are evaluated concurrently,
/// at most `config.max_concurrent_rules` at a time. Rules already recorded
/// for `as_of` are skipped with a warning.
#[tracing::instrument(skip_all, fields(%as_of, rules = rules.len()))]
pub async fn run_rules(
    source: &dyn TripSource,
    rules: &[Rule],
    store: &mut dyn ReportStore,
    config: &MonitorConfig,
    as_of: NaiveDate,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    let mut pending: Vec<(u64, &Rule)> = Vec::new();
    for rule in rules {
        if let Err(e) = rule.ensure_evaluable() {
            warn!(error = %e, "Skipping rule");
            summary.skipped += 1;
            continue;
        }
        let Some(id) = rule.id else {
            warn!(rule = %rule.name(), "Skipping rule without id");
            summary.skipped += 1;
            continue;
        };
        if store.contains(id, as_of) {
            warn!(rule = %rule.name(), rule_id = id, "Rule already evaluated today, skipping");
            summary.skipped += 1;
            continue;
        }
        pending.push((id, rule));
    }

    if pending.is_empty() {
        info!(skipped = summary.skipped, "No rules to evaluate");
        return Ok(summary);
    }

    let selected: Vec<&Rule> = pending.iter().map(|(_, r)| *r).collect();
    let query = query_for(&selected, config, as_of);
    let (loaded, batch) = load_classified(source, config, &query).await?;
    summary.trips_loaded = loaded;
    summary.trips_excluded = batch.excluded();

    let classified = Arc::new(batch.classified);
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_rules.max(1)));
    let mut tasks = Vec::with_capacity(pending.len());

    for (id, rule) in &pending {
        let sem = semaphore.clone();
        let trips = classified.clone();
        let params = rule.params.clone();
        let span = tracing::info_span!("evaluate_rule", rule_id = *id, rule = %params.name);

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await?;
                let result =
                    tokio::task::spawn_blocking(move || evaluate_rule(&params, &trips, as_of))
                        .await?;
                Ok::<_, anyhow::Error>(result)
            }
            .instrument(span),
        );
        tasks.push((*id, task));
    }

    for (id, task) in tasks {
        let result = task
            .await
            .with_context(|| format!("evaluation task for rule {id}"))??;
        let report = EvaluationReport::new(id, &result, config.diesel_price);

        match store.record(&report) {
            Ok(()) => {
                info!(
                    rule_id = id,
                    rule = %result.rule_name,
                    vehicles = result.vehicles.len(),
                    qualifying = report.vehicles.len(),
                    excess_cost = report.record.excess_cost,
                    "Rule evaluated"
                );
                summary.reports.push(report);
            }
            Err(ReportError::AlreadyEvaluated { rule_id, day }) => {
                warn!(rule_id, %day, "Rule already evaluated today, skipping");
                summary.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    debug!(
        evaluated = summary.reports.len(),
        skipped = summary.skipped,
        "Run complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryReportStore;
    use crate::rules::{RuleParams, RuleState, RuleThresholds};
    use crate::source::MemoryTripSource;
    use crate::trip::Trip;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn saved(id: u64, params: RuleParams) -> Rule {
        let mut rule = Rule::draft(params);
        rule.id = Some(id);
        rule.state = RuleState::Saved;
        rule
    }

    fn source() -> MemoryTripSource {
        let trip = |asset: &str, kml: f64| {
            Trip::new(asset, day(12), kml * 10.0, 10.0)
                .with_model("Induscar")
                .with_reference(5.0, 1.0, 30)
        };
        MemoryTripSource::new(vec![
            trip("A", 2.5),
            trip("A", 3.6),
            trip("B", 5.5),
            // glitch, excluded
            trip("B", 0.2),
        ])
    }

    #[tokio::test]
    async fn test_runs_every_saved_rule() {
        let rules = vec![
            saved(
                1,
                RuleParams::new("below")
                    .with_thresholds(RuleThresholds::default().with_below_median(0.5)),
            ),
            saved(2, RuleParams::new("everyone")),
            Rule::draft(RuleParams::new("draft")),
        ];
        let mut store = MemoryReportStore::new();
        let config = MonitorConfig::default();

        let summary = run_rules(&source(), &rules, &mut store, &config, day(14))
            .await
            .unwrap();

        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.trips_loaded, 4);
        assert_eq!(summary.trips_excluded, 1);

        let below = store.get(1, day(14)).unwrap();
        assert_eq!(below.vehicles.len(), 1);
        assert_eq!(below.vehicles[0].asset_id, "A");
        assert_eq!(store.get(2, day(14)).unwrap().vehicles.len(), 2);
    }

    #[tokio::test]
    async fn test_same_day_rerun_is_skipped() {
        let rules = vec![saved(1, RuleParams::new("r"))];
        let mut store = MemoryReportStore::new();
        let config = MonitorConfig::default();

        run_rules(&source(), &rules, &mut store, &config, day(14))
            .await
            .unwrap();
        let again = run_rules(&source(), &rules, &mut store, &config, day(14))
            .await
            .unwrap();
        assert!(again.reports.is_empty());
        assert_eq!(again.skipped, 1);

        let next_day = run_rules(&source(), &rules, &mut store, &config, day(15))
            .await
            .unwrap();
        assert_eq!(next_day.reports.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_query_spans_longest_window() {
        let a = saved(1, RuleParams::new("a").with_lookback_days(7).with_models(&["O500"]));
        let b = saved(2, RuleParams::new("b").with_lookback_days(30).with_models(&["Induscar"]));
        let config = MonitorConfig {
            reference_window_days: 10,
            ..MonitorConfig::default()
        };

        let q = query_for(&[&a, &b], &config, day(31));
        assert_eq!(q.from, Some(NaiveDate::from_ymd_opt(2025, 2, 19).unwrap()));
        assert_eq!(q.to, Some(day(31)));
        assert_eq!(q.models, vec!["Induscar".to_string(), "O500".to_string()]);

        let all = saved(3, RuleParams::new("c"));
        assert!(query_for(&[&a, &all], &config, day(31)).models.is_empty());

        let huge = saved(4, RuleParams::new("d").with_lookback_days(u32::MAX));
        assert_eq!(query_for(&[&huge], &config, day(31)).from, Some(NaiveDate::MIN));
    }
}
