//! Post-run validation report.
//!
//! Each check inspects the finished stage outputs and grades them PASS,
//! WARN or FAIL. A FAIL means an invariant of the pipeline was broken; a
//! WARN flags data the analyst should look at.

use std::collections::BTreeSet;

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use trauma_desert_area_models::{
    AreaUnit, BivariateClass, ClassifiedAreaUnit, Demographics, Tercile,
};
use trauma_desert_spatial::AssignmentReport;

/// Minimum assignment rate for a PASS.
pub const MIN_ASSIGNMENT_RATE: f64 = 0.99;

/// Largest spread between tercile shares, in percentage points, for a PASS.
pub const MAX_TERCILE_SPREAD_POINTS: f64 = 15.0;

/// Expected share of units in the highest-priority class.
pub const HIGHEST_PRIORITY_SHARE: std::ops::RangeInclusive<f64> = 0.025..=0.125;

/// Grade of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display, AsRefStr)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum CheckStatus {
    /// The check holds.
    Pass,
    /// Suspicious but not wrong.
    Warn,
    /// An invariant is broken.
    Fail,
}

/// One graded check, flattened for tabular output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationCheck {
    /// Short check name.
    pub check: &'static str,
    /// Grade.
    pub status: CheckStatus,
    /// What was observed.
    pub detail: String,
}

/// All checks of one run, in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// The checks.
    pub checks: Vec<ValidationCheck>,
}

impl ValidationReport {
    /// Whether any check failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    /// Number of checks with `status`.
    #[must_use]
    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    /// Looks up a check by name.
    #[must_use]
    pub fn check(&self, name: &str) -> Option<&ValidationCheck> {
        self.checks.iter().find(|c| c.check == name)
    }

    fn push(&mut self, check: &'static str, status: CheckStatus, detail: String) {
        match status {
            CheckStatus::Pass => log::info!("[{status}] {check}: {detail}"),
            CheckStatus::Warn => log::warn!("[{status}] {check}: {detail}"),
            CheckStatus::Fail => log::error!("[{status}] {check}: {detail}"),
        }
        self.checks.push(ValidationCheck {
            check,
            status,
            detail,
        });
    }
}

#[allow(clippy::cast_precision_loss)]
fn share(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn check_assignment(report: &mut ValidationReport, assignment: &AssignmentReport) {
    let eligible = assignment.assigned + assignment.unassigned;
    let rate = assignment.assignment_rate();
    let detail = format!(
        "{}/{} in-envelope incidents assigned ({:.2}%); {} invalid, {} outside envelope",
        assignment.assigned,
        eligible,
        rate * 100.0,
        assignment.invalid,
        assignment.outside_envelope
    );
    let status = if eligible == 0 {
        CheckStatus::Warn
    } else if rate >= MIN_ASSIGNMENT_RATE {
        CheckStatus::Pass
    } else {
        CheckStatus::Warn
    };
    report.push("incident assignment", status, detail);
}

fn check_count_preservation(
    report: &mut ValidationReport,
    assignment: &AssignmentReport,
    classified: &[ClassifiedAreaUnit],
) {
    let counted: u64 = classified.iter().map(|u| u.incident_count).sum();
    let status = if counted == assignment.assigned {
        CheckStatus::Pass
    } else {
        CheckStatus::Fail
    };
    report.push(
        "incident count preservation",
        status,
        format!("{counted} incidents across units, {} assigned", assignment.assigned),
    );
}

fn check_demographics(report: &mut ValidationReport, area_units: &[AreaUnit]) {
    let missing = area_units
        .iter()
        .filter(|u| u.demographics == Demographics::default())
        .count();
    let status = if missing == 0 {
        CheckStatus::Pass
    } else {
        CheckStatus::Warn
    };
    report.push(
        "demographics join",
        status,
        format!("{missing} of {} units have no demographics", area_units.len()),
    );
}

fn check_completeness(
    report: &mut ValidationReport,
    area_units: &[AreaUnit],
    classified: &[ClassifiedAreaUnit],
) {
    let expected: BTreeSet<&str> = area_units.iter().map(|u| u.id.as_str()).collect();
    let actual: BTreeSet<&str> = classified.iter().map(|u| u.id.as_str()).collect();
    let status = if expected == actual && classified.len() == area_units.len() {
        CheckStatus::Pass
    } else {
        CheckStatus::Fail
    };
    report.push(
        "classification completeness",
        status,
        format!("{} of {} units classified", actual.len(), expected.len()),
    );
}

fn check_class_coverage(report: &mut ValidationReport, classified: &[ClassifiedAreaUnit]) {
    let present: BTreeSet<BivariateClass> = classified.iter().map(|u| u.bivariate_class).collect();
    let missing: Vec<String> = BivariateClass::all()
        .into_iter()
        .filter(|class| !present.contains(class))
        .map(|class| class.value().to_string())
        .collect();
    let (status, detail) = if missing.is_empty() {
        (CheckStatus::Pass, "all 9 classes present".to_string())
    } else {
        (
            CheckStatus::Warn,
            format!("classes without units: {}", missing.join(", ")),
        )
    };
    report.push("class coverage", status, detail);
}

fn check_tercile_balance(
    report: &mut ValidationReport,
    name: &'static str,
    classified: &[ClassifiedAreaUnit],
    tercile: fn(&ClassifiedAreaUnit) -> Tercile,
) {
    let shares: Vec<f64> = Tercile::all()
        .iter()
        .map(|t| {
            let count = classified.iter().filter(|u| tercile(u) == *t).count();
            share(count, classified.len()) * 100.0
        })
        .collect();
    let max = shares.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = shares.iter().copied().fold(f64::INFINITY, f64::min);
    let spread = max - min;
    let status = if spread <= MAX_TERCILE_SPREAD_POINTS {
        CheckStatus::Pass
    } else {
        CheckStatus::Warn
    };
    report.push(
        name,
        status,
        format!(
            "shares {:.1}% / {:.1}% / {:.1}%, spread {spread:.1} points",
            shares[0], shares[1], shares[2]
        ),
    );
}

fn check_highest_priority(report: &mut ValidationReport, classified: &[ClassifiedAreaUnit]) {
    let count = classified
        .iter()
        .filter(|u| u.bivariate_class.is_highest_priority())
        .count();
    let fraction = share(count, classified.len());
    let status = if HIGHEST_PRIORITY_SHARE.contains(&fraction) {
        CheckStatus::Pass
    } else {
        CheckStatus::Warn
    };
    report.push(
        "highest-priority count",
        status,
        format!("{count} units ({:.1}%) in class 9", fraction * 100.0),
    );
}

/// Grades the outputs of a finished run.
#[must_use]
pub fn validate_run(
    area_units: &[AreaUnit],
    assignment: &AssignmentReport,
    classified: &[ClassifiedAreaUnit],
) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_assignment(&mut report, assignment);
    check_count_preservation(&mut report, assignment, classified);
    check_demographics(&mut report, area_units);
    check_completeness(&mut report, area_units, classified);
    check_class_coverage(&mut report, classified);
    check_tercile_balance(&mut report, "density tercile balance", classified, |u| {
        u.density_tercile
    });
    check_tercile_balance(&mut report, "time tercile balance", classified, |u| {
        u.time_tercile
    });
    check_highest_priority(&mut report, classified);

    log::info!(
        "Validation: {} passed, {} warnings, {} failures",
        report.count(CheckStatus::Pass),
        report.count(CheckStatus::Warn),
        report.count(CheckStatus::Fail)
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_renders_uppercase() {
        assert_eq!(CheckStatus::Warn.to_string(), "WARN");
        assert!(CheckStatus::Fail > CheckStatus::Pass);
    }

    #[test]
    fn assignment_thresholds() {
        let mut report = ValidationReport::default();
        check_assignment(
            &mut report,
            &AssignmentReport {
                total: 1000,
                assigned: 995,
                unassigned: 5,
                ..AssignmentReport::default()
            },
        );
        check_assignment(
            &mut report,
            &AssignmentReport {
                total: 100,
                assigned: 90,
                unassigned: 10,
                ..AssignmentReport::default()
            },
        );
        check_assignment(&mut report, &AssignmentReport::default());

        let statuses: Vec<CheckStatus> = report.checks.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            [CheckStatus::Pass, CheckStatus::Warn, CheckStatus::Warn]
        );
        assert!(!report.has_failures());
    }

    #[test]
    fn count_mismatch_fails() {
        let mut report = ValidationReport::default();
        check_count_preservation(
            &mut report,
            &AssignmentReport {
                assigned: 3,
                ..AssignmentReport::default()
            },
            &[],
        );
        assert!(report.has_failures());
        assert_eq!(
            report.check("incident count preservation").map(|c| c.status),
            Some(CheckStatus::Fail)
        );
    }

    #[test]
    fn empty_run_flags_coverage_and_priority() {
        let report = validate_run(&[], &AssignmentReport::default(), &[]);
        assert_eq!(report.checks.len(), 8);
        assert!(!report.has_failures());
        assert_eq!(
            report.check("class coverage").map(|c| c.status),
            Some(CheckStatus::Warn)
        );
        assert_eq!(
            report.check("highest-priority count").map(|c| c.status),
            Some(CheckStatus::Warn)
        );
    }
}
