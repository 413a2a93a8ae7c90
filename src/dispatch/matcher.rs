//! Pure matching logic: manual candidate ranking and greedy suggestions.
//!
//! The greedy pass commits each decision locally: the highest-severity alert
//! takes the nearest free unit, then the next alert picks from what is left.
//! It never re-balances earlier picks, even when a swap would shorten total
//! travel. Severity ordering dominates distance.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ambulance::Ambulance;
use crate::models::location::GeoPoint;
use crate::models::sos_alert::SosAlert;
use crate::severity::{classify_alert, SeverityTier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAmbulance {
    pub ambulance_id: String,
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub alert_id: Uuid,
    pub ambulance_id: String,
    pub severity: SeverityTier,
    pub distance_m: f64,
}

/// Real-time store path the coordinator publishes the board to.
pub const DISPATCH_BOARD_PATH: &str = "dispatch_board";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchBoard {
    #[default]
    Idle,
    /// One incident: the operator picks from the ranked list.
    Single {
        alert_id: Uuid,
        severity: SeverityTier,
        candidates: Vec<RankedAmbulance>,
    },
    /// Several incidents: greedy suggestions, plus alerts left without one.
    Multi {
        suggestions: Vec<Suggestion>,
        unassigned: Vec<Uuid>,
    },
}

impl DispatchBoard {
    pub fn mode(&self) -> &'static str {
        match self {
            DispatchBoard::Idle => "idle",
            DispatchBoard::Single { .. } => "single",
            DispatchBoard::Multi { .. } => "multi",
        }
    }
}

/// Available units sorted by ascending great-circle distance to `incident`.
pub fn rank_by_distance(incident: &GeoPoint, fleet: &[Ambulance]) -> Vec<RankedAmbulance> {
    let mut ranked: Vec<RankedAmbulance> = fleet
        .iter()
        .filter(|a| a.is_available())
        .map(|a| RankedAmbulance {
            ambulance_id: a.id.clone(),
            distance_m: a.distance_to(incident),
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    ranked
}

/// Alerts in processing order: severity descending, arrival order on ties.
pub fn prioritize(alerts: &[SosAlert]) -> Vec<(SeverityTier, &SosAlert)> {
    let mut ordered: Vec<(SeverityTier, &SosAlert)> =
        alerts.iter().map(|a| (classify_alert(a), a)).collect();
    // sort_by is stable, so equal tiers keep their input order.
    ordered.sort_by(|a, b| b.0.cmp(&a.0));
    ordered
}

pub fn suggest(alerts: &[SosAlert], fleet: &[Ambulance]) -> Vec<Suggestion> {
    let mut pool: Vec<&Ambulance> = fleet.iter().filter(|a| a.is_available()).collect();
    let mut suggestions = Vec::new();

    for (severity, alert) in prioritize(alerts) {
        if pool.is_empty() {
            break;
        }
        let closest = pool
            .iter()
            .enumerate()
            .map(|(i, a)| (i, a.distance_to(&alert.location)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((i, distance_m)) = closest {
            let ambulance = pool.remove(i);
            suggestions.push(Suggestion {
                alert_id: alert.id,
                ambulance_id: ambulance.id.clone(),
                severity,
                distance_m,
            });
        }
    }
    suggestions
}

pub fn plan(alerts: &[SosAlert], fleet: &[Ambulance]) -> DispatchBoard {
    match alerts {
        [] => DispatchBoard::Idle,
        [alert] => DispatchBoard::Single {
            alert_id: alert.id,
            severity: classify_alert(alert),
            candidates: rank_by_distance(&alert.location, fleet),
        },
        _ => {
            let suggestions = suggest(alerts, fleet);
            let unassigned = alerts
                .iter()
                .map(|a| a.id)
                .filter(|id| !suggestions.iter().any(|s| s.alert_id == *id))
                .collect();
            DispatchBoard::Multi {
                suggestions,
                unassigned,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::models::ambulance::AmbulanceStatus;
    use crate::testing::{self, alert, ambulance};

    const SITE_A: GeoPoint = GeoPoint::new(12.9716, 77.5946);
    const SITE_B: GeoPoint = GeoPoint::new(12.9279, 77.6271);
    const SITE_C: GeoPoint = GeoPoint::new(13.0371, 77.5925);

    #[test]
    fn ranking_is_ascending_and_skips_busy_units() {
        let mut busy = ambulance("AMB-0", SITE_A);
        busy.status = AmbulanceStatus::EnRoute;
        let fleet = vec![
            ambulance("AMB-far", SITE_C),
            busy,
            ambulance("AMB-near", GeoPoint::new(12.9720, 77.5950)),
            ambulance("AMB-mid", SITE_B),
        ];

        let ranked = rank_by_distance(&SITE_A, &fleet);
        let ids: Vec<&str> = ranked.iter().map(|r| r.ambulance_id.as_str()).collect();
        assert_eq!(ids, vec!["AMB-near", "AMB-mid", "AMB-far"]);
        assert!(ranked.windows(2).all(|w| w[0].distance_m <= w[1].distance_m));
    }

    #[test]
    fn high_severity_gets_first_pick_even_when_it_arrived_later() {
        let low = alert(1, SITE_A, testing::low());
        let high = alert(2, SITE_B, testing::high());
        // The only unit sits right next to the low-severity incident.
        let fleet = vec![ambulance("AMB-1", SITE_A)];

        let suggestions = suggest(&[low.clone(), high.clone()], &fleet);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].alert_id, high.id);
        assert_eq!(suggestions[0].severity, SeverityTier::High);
    }

    #[test]
    fn equal_severity_keeps_arrival_order() {
        let first = alert(1, SITE_A, None);
        let second = alert(2, SITE_B, None);
        let fleet = vec![ambulance("AMB-1", SITE_C)];

        let suggestions = suggest(&[first.clone(), second], &fleet);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].alert_id, first.id);
    }

    #[test]
    fn each_alert_takes_the_closest_remaining_unit() {
        let a = alert(1, SITE_A, testing::high());
        let b = alert(2, SITE_B, testing::low());
        let fleet = vec![ambulance("AMB-B", SITE_B), ambulance("AMB-A", SITE_A)];

        let suggestions = suggest(&[b.clone(), a.clone()], &fleet);
        assert_eq!(suggestions.len(), 2);
        assert_eq!((suggestions[0].alert_id, suggestions[0].ambulance_id.as_str()), (a.id, "AMB-A"));
        assert_eq!((suggestions[1].alert_id, suggestions[1].ambulance_id.as_str()), (b.id, "AMB-B"));
    }

    #[test]
    fn greedy_does_not_rebalance() {
        // Both units sit near A. A arrived first and takes the nearest one,
        // B is left with whatever remains.
        let a = alert(1, SITE_A, testing::high());
        let b = alert(2, SITE_B, testing::high());
        let fleet = vec![
            ambulance("AMB-1", GeoPoint::new(12.9700, 77.5940)),
            ambulance("AMB-2", GeoPoint::new(12.9650, 77.6000)),
        ];
        let suggestions = suggest(&[a.clone(), b.clone()], &fleet);
        assert_eq!(suggestions[0].ambulance_id, "AMB-1");
        assert_eq!(suggestions[1].ambulance_id, "AMB-2");
    }

    #[test]
    fn no_unit_is_assigned_twice_and_order_is_non_increasing() {
        let alerts: Vec<SosAlert> = (0..6)
            .map(|i| {
                let telemetry = match i % 3 {
                    0 => testing::low(),
                    1 => testing::high(),
                    _ => None,
                };
                alert(i, GeoPoint::new(12.90 + i as f64 * 0.01, 77.60), telemetry)
            })
            .collect();
        let fleet: Vec<Ambulance> = (0..4)
            .map(|i| ambulance(&format!("AMB-{}", i), GeoPoint::new(12.95, 77.55 + i as f64 * 0.02)))
            .collect();

        let suggestions = suggest(&alerts, &fleet);
        assert_eq!(suggestions.len(), 4);

        let units: HashSet<&str> = suggestions.iter().map(|s| s.ambulance_id.as_str()).collect();
        assert_eq!(units.len(), suggestions.len());
        assert!(suggestions.windows(2).all(|w| w[0].severity >= w[1].severity));
    }

    #[test]
    fn empty_pool_yields_no_suggestions() {
        let alerts = vec![alert(1, SITE_A, None), alert(2, SITE_B, None)];
        assert!(suggest(&alerts, &[]).is_empty());
        match plan(&alerts, &[]) {
            DispatchBoard::Multi {
                suggestions,
                unassigned,
            } => {
                assert!(suggestions.is_empty());
                assert_eq!(unassigned.len(), 2);
            }
            other => panic!("expected multi board, got {:?}", other),
        }
    }

    #[test]
    fn plan_picks_mode_by_incident_count() {
        let fleet = vec![ambulance("AMB-1", SITE_C), ambulance("AMB-2", SITE_A)];
        assert_eq!(plan(&[], &fleet), DispatchBoard::Idle);

        let only = alert(1, SITE_A, testing::low());
        match plan(std::slice::from_ref(&only), &fleet) {
            DispatchBoard::Single {
                alert_id,
                severity,
                candidates,
            } => {
                assert_eq!(alert_id, only.id);
                assert_eq!(severity, SeverityTier::Low);
                assert_eq!(candidates[0].ambulance_id, "AMB-2");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected single board, got {:?}", other),
        }

        let three = vec![alert(1, SITE_A, None), alert(2, SITE_B, None), alert(3, SITE_C, None)];
        match plan(&three, &fleet) {
            DispatchBoard::Multi {
                suggestions,
                unassigned,
            } => {
                assert_eq!(suggestions.len(), 2);
                assert_eq!(unassigned, vec![three[2].id]);
            }
            other => panic!("expected multi board, got {:?}", other),
        }
    }
}
