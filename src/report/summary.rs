//! Console and markdown summaries
//!
//! Each report is a `Display` type; the `*_summary` helpers render it to a
//! string.

use std::fmt;

use crate::training::ablation::AblationReport;
use crate::training::metrics::ClassificationMetrics;
use crate::training::picks::{HitRate, PicksReport, PolicyResult};
use crate::training::runner::RunOutput;

const RULE: &str = "───────────────────────────────────────────────────────────────";

fn auc(metrics: &ClassificationMetrics) -> String {
    metrics
        .roc_auc
        .map(|a| format!("{:.3}", a))
        .unwrap_or_else(|| "n/a".to_string())
}

fn rate(hr: Option<HitRate>) -> String {
    hr.map(|h| format!("{:.3}", h.rate))
        .unwrap_or_else(|| "n/a".to_string())
}

fn interval(hr: Option<HitRate>) -> String {
    hr.map(|h| format!("[{:.3}, {:.3}]", h.ci_lower, h.ci_upper))
        .unwrap_or_else(|| "n/a".to_string())
}

fn policy_line(f: &mut fmt::Formatter<'_>, key: &str, r: &PolicyResult) -> fmt::Result {
    writeln!(
        f,
        "  {:<10} {:>6}  {:>8}  {:<16} {:>5} {:>8}  {:>5} {:>8}",
        key,
        r.num_picks,
        rate(r.hit_rate),
        interval(r.hit_rate),
        r.over_picks,
        rate(r.over_hit_rate),
        r.under_picks,
        rate(r.under_hit_rate)
    )
}

/// Backtest summary printed after a run
pub struct BacktestSummary<'a>(pub &'a RunOutput);

impl fmt::Display for BacktestSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let output = self.0;
        let report = &output.backtest;

        writeln!(f, "Backtest Summary")?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "  Records:        {}", output.n_records)?;
        writeln!(
            f,
            "  Matrix rows:    {} ({} features, label mean {:.3})",
            output.matrix_rows,
            report.feature_names.len(),
            output.positive_rate
        )?;
        writeln!(
            f,
            "  Date coverage:  {:.1}% ({:?})",
            output.date_coverage * 100.0,
            output.temporal
        )?;
        writeln!(
            f,
            "  Folds:          {} (min train {}{})",
            report.n_folds,
            report.effective_min_train,
            if report.fallback_schedule { ", reduced" } else { "" }
        )?;
        writeln!(f, "  Predictions:    {}", report.predictions.len())?;
        writeln!(f, "  Selected model: {} (by log loss)", report.selection.variant)?;
        writeln!(f)?;

        writeln!(f, "  {:<14} {:>9} {:>9} {:>8}", "Model", "Accuracy", "LogLoss", "AUC")?;
        for v in &report.variants {
            let marker = if v.variant == report.selection.variant { "*" } else { " " };
            writeln!(
                f,
                "{} {:<14} {:>9.3} {:>9.4} {:>8}",
                marker,
                v.variant.name(),
                v.metrics.accuracy,
                v.metrics.log_loss,
                auc(&v.metrics)
            )?;
        }
        for (name, m) in [
            ("baseline 0.5", &report.baselines.constant),
            ("line only", &report.baselines.line_only),
        ] {
            writeln!(
                f,
                "  {:<14} {:>9.3} {:>9.4} {:>8}",
                name,
                m.accuracy,
                m.log_loss,
                auc(m)
            )?;
        }

        if !report.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "  Warnings:")?;
            for w in &report.warnings {
                writeln!(f, "    fold {}: {:?}: {}", w.fold, w.kind, w.message)?;
            }
        }

        if let Some(calibration) = report.selected().map(|v| &v.calibration) {
            writeln!(f)?;
            writeln!(f, "  Calibration ({})", report.selection.variant)?;
            writeln!(
                f,
                "  {:>4} {:>12} {:>6} {:>9} {:>9} {:>8}",
                "bin", "range", "n", "pred", "true", "diff"
            )?;
            for b in calibration {
                writeln!(
                    f,
                    "  {:>4} {:>5.2}-{:<6.2} {:>6} {:>9.3} {:>9.3} {:>+8.3}",
                    b.bin, b.bin_low, b.bin_high, b.count, b.mean_pred, b.mean_true, b.diff
                )?;
            }
        }

        if let Some(best) = output.ablation.as_ref().and_then(|a| a.recommended.as_ref()) {
            writeln!(f)?;
            writeln!(
                f,
                "  Recommended by ablation: {} / {} (log loss {:.4})",
                best.feature_set, best.variant, best.log_loss
            )?;
        }

        let (positive, negative) = output.model.top_coefficients(5);
        if !positive.is_empty() || !negative.is_empty() {
            writeln!(f)?;
            writeln!(f, "  Top coefficients")?;
            for c in positive.iter().chain(&negative) {
                writeln!(f, "    {:<36} {:>+8.4}", c.feature, c.coefficient)?;
            }
        }
        Ok(())
    }
}

/// Pick-policy tables
pub struct PicksSummary<'a>(pub &'a PicksReport);

impl fmt::Display for PicksSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let picks = self.0;
        writeln!(f, "Picks Analysis")?;
        writeln!(f, "{}", RULE)?;

        let mut top: Vec<_> = picks.decile_analysis.iter().collect();
        top.sort_by(|a, b| b.decile.cmp(&a.decile));
        if !top.is_empty() {
            writeln!(f, "  Highest deciles:")?;
            for d in top.iter().take(2) {
                writeln!(
                    f,
                    "    decile {:>2}: pred {:.3}, hit rate {:.3}, diff {:+.3}, n={}",
                    d.decile, d.mean_pred, d.mean_true, d.calibration_diff, d.count
                )?;
            }
        }

        let header = format!(
            "  {:<10} {:>6}  {:>8}  {:<16} {:>5} {:>8}  {:>5} {:>8}",
            "", "picks", "hit", "95% CI", "over", "hit", "under", "hit"
        );

        writeln!(f)?;
        writeln!(f, "  Threshold policy (Over if p >= t, Under if p <= 1 - t)")?;
        writeln!(f, "{}", header)?;
        for t in &picks.threshold_policy {
            policy_line(f, &format!("t={:.2}", t.threshold), &t.result)?;
        }

        writeln!(f)?;
        writeln!(f, "  Top-K per fold by |p - 0.5|")?;
        writeln!(f, "{}", header)?;
        for k in &picks.topk_policy {
            policy_line(f, &format!("k={}", k.k), &k.result)?;
        }

        let ev = &picks.hypothetical_ev;
        writeln!(f)?;
        writeln!(f, "  {}", ev.note)?;
        writeln!(f, "    EV-positive picks: {}", ev.num_ev_positive_picks)?;
        if let Some(avg) = ev.avg_ev {
            writeln!(f, "    Average EV:        {:+.4}", avg)?;
        }
        if let Some(hr) = ev.hit_rate {
            writeln!(f, "    Hit rate:          {:.3}", hr)?;
        }
        Ok(())
    }
}

/// Markdown report of an ablation run
pub struct AblationMarkdown<'a>(pub &'a AblationReport);

impl fmt::Display for AblationMarkdown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ablation = self.0;
        writeln!(f, "# Ablation Summary\n")?;

        match &ablation.recommended {
            Some(best) => {
                writeln!(f, "## Recommended Configuration\n")?;
                writeln!(f, "**Feature Set:** {}  ", best.feature_set)?;
                writeln!(f, "**Variant:** {}  ", best.variant)?;
                writeln!(f, "**Features:** {}  ", best.n_features)?;
                writeln!(f, "**Log Loss:** {:.3}  ", best.log_loss)?;
                writeln!(
                    f,
                    "**ROC-AUC:** {}\n",
                    best.roc_auc
                        .map(|a| format!("{:.3}", a))
                        .unwrap_or_else(|| "n/a".to_string())
                )?;
                writeln!(
                    f,
                    "This ranking is separate from the canonical backtest model, which always uses the full feature set.\n"
                )?;
            }
            None => writeln!(f, "No eligible configuration completed.\n")?,
        }

        writeln!(f, "## Results\n")?;
        writeln!(
            f,
            "| Feature Set | Variant | Features | Accuracy | Log Loss | ROC-AUC | Eligible |"
        )?;
        writeln!(f, "|---|---|---|---|---|---|---|")?;
        for r in &ablation.rows {
            writeln!(
                f,
                "| {} | {} | {} | {:.3} | {:.3} | {} | {} |",
                r.feature_set,
                r.variant,
                r.n_features,
                r.accuracy,
                r.log_loss,
                r.roc_auc
                    .map(|a| format!("{:.3}", a))
                    .unwrap_or_else(|| "n/a".to_string()),
                if r.eligible { "yes" } else { "no (unstable)" }
            )?;
        }

        if !ablation.skipped.is_empty() {
            writeln!(f, "\n## Skipped\n")?;
            for s in &ablation.skipped {
                writeln!(f, "- {}: {}", s.feature_set, s.reason)?;
            }
        }
        Ok(())
    }
}

pub fn backtest_summary(output: &RunOutput) -> String {
    BacktestSummary(output).to_string()
}

pub fn picks_summary(picks: &PicksReport) -> String {
    PicksSummary(picks).to_string()
}

pub fn ablation_markdown(ablation: &AblationReport) -> String {
    AblationMarkdown(ablation).to_string()
}
