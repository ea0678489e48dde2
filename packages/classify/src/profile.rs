//! Summaries over classified area units.

use serde::Serialize;
use trauma_desert_area_models::{BivariateClass, ClassifiedAreaUnit, PriorityGroup};

use crate::rank::competition_ranks;

/// Aggregate characteristics of one bivariate class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassProfile {
    /// The class.
    pub bivariate_class: BivariateClass,
    /// Its label.
    pub label: &'static str,
    /// Its priority group.
    pub priority_group: PriorityGroup,
    /// Area units in the class.
    pub unit_count: usize,
    /// Summed population of units reporting one.
    pub population: u64,
    /// Summed incidents.
    pub incident_count: u64,
    /// Mean fraction Black over units reporting it.
    pub mean_pct_black: Option<f64>,
    /// Mean fraction in poverty over units reporting it.
    pub mean_pct_poverty: Option<f64>,
    /// Mean density.
    pub mean_density: Option<f64>,
    /// Mean minutes to the nearest facility, sentinel included.
    pub mean_minutes: Option<f64>,
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// One profile per class 1 through 9, including empty classes.
#[must_use]
pub fn class_profiles(classified: &[ClassifiedAreaUnit]) -> Vec<ClassProfile> {
    BivariateClass::all()
        .into_iter()
        .map(|class| {
            let members: Vec<&ClassifiedAreaUnit> = classified
                .iter()
                .filter(|unit| unit.bivariate_class == class)
                .collect();

            ClassProfile {
                bivariate_class: class,
                label: class.label(),
                priority_group: class.priority(),
                unit_count: members.len(),
                population: members
                    .iter()
                    .filter_map(|unit| unit.population)
                    .map(u64::from)
                    .sum(),
                incident_count: members.iter().map(|unit| unit.incident_count).sum(),
                mean_pct_black: mean(members.iter().filter_map(|unit| unit.pct_black)),
                mean_pct_poverty: mean(members.iter().filter_map(|unit| unit.pct_poverty)),
                mean_density: mean(members.iter().map(|unit| unit.density_metric)),
                mean_minutes: mean(members.iter().map(|unit| unit.time_metric.minutes_f64())),
            }
        })
        .collect()
}

/// Position of a highest-priority unit in the intervention ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorityRanking {
    /// Competition rank; equal scores share the smallest rank.
    pub rank: usize,
    /// Area unit id.
    pub id: String,
    /// Area unit name.
    pub name: String,
    /// Density min-max normalized within the class.
    pub density_norm: f64,
    /// Minutes min-max normalized within the class.
    pub time_norm: f64,
    /// `0.5 * density_norm + 0.5 * time_norm`.
    pub score: f64,
}

fn min_max(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    let range = if range > 0.0 { range } else { 1.0 };
    values.iter().map(|v| (v - min) / range).collect()
}

/// Ranks the class 9 units by equal-weight normalized density and time,
/// highest score first. Ties share a rank and are ordered by id.
#[must_use]
pub fn rank_highest_priority(classified: &[ClassifiedAreaUnit]) -> Vec<PriorityRanking> {
    let members: Vec<&ClassifiedAreaUnit> = classified
        .iter()
        .filter(|unit| unit.bivariate_class.is_highest_priority())
        .collect();
    if members.is_empty() {
        log::warn!("No highest-priority area units to rank");
        return Vec::new();
    }

    let density: Vec<f64> = members.iter().map(|unit| unit.density_metric).collect();
    let minutes: Vec<f64> = members
        .iter()
        .map(|unit| unit.time_metric.minutes_f64())
        .collect();

    let mut ranked: Vec<PriorityRanking> = members
        .iter()
        .zip(min_max(&density).into_iter().zip(min_max(&minutes)))
        .map(|(unit, (density_norm, time_norm))| PriorityRanking {
            rank: 0,
            id: unit.id.clone(),
            name: unit.name.clone(),
            density_norm,
            time_norm,
            score: 0.5f64.mul_add(density_norm, 0.5 * time_norm),
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));

    let scores: Vec<f64> = ranked.iter().map(|entry| entry.score).collect();
    for (entry, rank) in ranked.iter_mut().zip(competition_ranks(&scores)) {
        entry.rank = rank;
    }

    log::info!("Ranked {} highest-priority area units", ranked.len());

    ranked
}

#[cfg(test)]
mod tests {
    use trauma_desert_area_models::{Reachability, Tercile};

    use super::*;
    use crate::classify;
    use crate::tests::{metrics, unit};

    fn grid() -> Vec<ClassifiedAreaUnit> {
        let mut units = Vec::new();
        let mut all_metrics = Vec::new();
        let cells = [
            ("a", 1.0, 5),
            ("b", 1.0, 10),
            ("c", 1.0, 15),
            ("d", 5.0, 5),
            ("e", 5.0, 10),
            ("f", 5.0, 15),
            ("g", 9.0, 20),
            ("h", 9.0, 30),
            ("i", 9.0, 31),
        ];
        for (id, density, minutes) in cells {
            let mut u = unit(id);
            u.demographics.population = Some(1_000);
            u.demographics.pct_black = Some(0.5);
            units.push(u);
            all_metrics.push(metrics(id, density, Reachability::from(minutes)));
        }
        classify(&units, &all_metrics).unwrap()
    }

    #[test]
    fn profiles_cover_every_class() {
        let classified = grid();
        let profiles = class_profiles(&classified);
        assert_eq!(profiles.len(), 9);
        assert_eq!(profiles.iter().map(|p| p.unit_count).sum::<usize>(), 9);

        let nine = &profiles[8];
        assert_eq!(nine.bivariate_class, BivariateClass::HIGHEST);
        assert_eq!(nine.unit_count, 3);
        assert_eq!(nine.population, 3_000);
        assert_eq!(nine.mean_minutes, Some(27.0));
        assert_eq!(profiles[1].unit_count, 1);
        assert_eq!(nine.mean_pct_poverty, None);
        assert_eq!(nine.mean_pct_black, Some(0.5));
    }

    #[test]
    fn ranks_highest_priority_by_combined_score() {
        let mut classified = grid();
        for unit in &mut classified {
            unit.bivariate_class = BivariateClass::HIGHEST;
            unit.density_tercile = Tercile::High;
            unit.time_tercile = Tercile::High;
        }
        let ranked = rank_highest_priority(&classified);
        assert_eq!(ranked.len(), 9);
        assert_eq!(ranked[0].id, "i");
        assert_eq!(ranked[0].rank, 1);
        assert!((ranked[0].score - 1.0).abs() < 1e-12);
        assert_eq!(ranked[8].id, "a");
        assert!(ranked[8].score.abs() < 1e-12);
    }

    #[test]
    fn equal_scores_share_a_rank() {
        let mut classified = grid();
        for unit in &mut classified {
            unit.bivariate_class = BivariateClass::HIGHEST;
            unit.density_metric = 1.0;
            unit.time_metric = Reachability::Within(10);
        }
        let ranked = rank_highest_priority(&classified);
        assert!(ranked.iter().all(|r| r.rank == 1));
        assert_eq!(ranked[0].id, "a");
        assert!(rank_highest_priority(&[]).is_empty());
    }
}
