use std::collections::BTreeMap;

use chrono::NaiveDate;
use cropbatch_errors::{CropbatchError, CropbatchResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entities::{
    ApplicationMethod, EventKind, FertilizerPartition, ManagementEvent, Workstep, WorkstepAction,
};

/// The ordered workstep sequence of one simulation run.
///
/// Invariants, kept by construction: worksteps are monotonically
/// non-decreasing by date, there is exactly one Sowing and one Harvest
/// workstep, and Sowing precedes Harvest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    steps: Vec<Workstep>,
}

impl Schedule {
    pub fn new(sowing_date: NaiveDate, crop: &str, harvest_date: NaiveDate) -> CropbatchResult<Self> {
        if harvest_date <= sowing_date {
            return Err(CropbatchError::schedule_insertion(
                "",
                format!("harvest date {harvest_date} is not after sowing date {sowing_date}"),
            ));
        }
        Ok(Self {
            steps: vec![
                Workstep::sowing(sowing_date, crop),
                Workstep::harvest(harvest_date),
            ],
        })
    }

    pub fn steps(&self) -> &[Workstep] {
        &self.steps
    }
    pub fn len(&self) -> usize {
        self.steps.len()
    }
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn sowing_date(&self) -> NaiveDate {
        // One Sowing step exists by construction.
        self.steps
            .iter()
            .find(|s| s.is_sowing())
            .map(|s| s.date)
            .unwrap_or_default()
    }
    pub fn harvest_date(&self) -> NaiveDate {
        self.steps
            .iter()
            .find(|s| s.is_harvest())
            .map(|s| s.date)
            .unwrap_or_default()
    }

    fn position_of_sowing(&self) -> usize {
        self.steps.iter().position(|s| s.is_sowing()).unwrap_or(0)
    }
    fn position_of_harvest(&self) -> usize {
        self.steps
            .iter()
            .position(|s| s.is_harvest())
            .unwrap_or(self.steps.len())
    }

    /// Insert a workstep at the position chosen by date comparison only.
    ///
    /// Three-way bracket: strictly before sowing goes in front of the Sowing
    /// step (after earlier pre-sowing insertions), strictly after harvest is
    /// appended, anything inside [sowing, harvest] goes immediately before
    /// Harvest. Callers feed events in ascending date order, which keeps
    /// every bracket internally sorted.
    pub fn insert_bracketed(&mut self, step: Workstep) {
        let position = if step.date < self.sowing_date() {
            self.position_of_sowing()
        } else if step.date > self.harvest_date() {
            self.steps.len()
        } else {
            self.position_of_harvest()
        };
        self.steps.insert(position, step);
        debug_assert!(self.is_sorted_by_date());
    }

    pub fn is_sorted_by_date(&self) -> bool {
        self.steps.windows(2).all(|pair| pair[0].date <= pair[1].date)
    }
}

/// Merges normalized fertilization/irrigation events into a schedule
/// anchored at the sowing and harvest dates.
#[derive(Debug, Clone)]
pub struct ScheduleAssembler {
    /// Soil discretization layer thickness in meters; converts irrigation
    /// application depth (cm) into a discrete layer index.
    layer_thickness_m: f64,
}

impl ScheduleAssembler {
    pub fn new(layer_thickness_m: f64) -> Self {
        Self { layer_thickness_m }
    }

    pub fn assemble(
        &self,
        treatment_id: &str,
        crop: &str,
        sowing_date: NaiveDate,
        harvest_date: NaiveDate,
        events: &[ManagementEvent],
    ) -> CropbatchResult<Schedule> {
        let mut schedule = Schedule::new(sowing_date, crop, harvest_date).map_err(|e| match e {
            CropbatchError::ScheduleInsertion { reason, .. } => {
                CropbatchError::schedule_insertion(treatment_id, reason)
            }
            other => other,
        })?;

        let mut events_by_date: BTreeMap<NaiveDate, Vec<&ManagementEvent>> = BTreeMap::new();
        for event in events {
            events_by_date.entry(event.date).or_default().push(event);
        }

        for (date, same_date_events) in events_by_date {
            // kg N/ha announced by an "applied in irrigation water"
            // fertilization, consumed by the next irrigation on this date.
            let mut pending_nitrate: Option<f64> = None;

            for event in same_date_events {
                match &event.kind {
                    EventKind::Fertilization {
                        amount,
                        method,
                        product_code,
                        ..
                    } => {
                        if *method == ApplicationMethod::InIrrigationWater {
                            pending_nitrate = Some(*amount);
                            continue;
                        }
                        schedule.insert_bracketed(Workstep {
                            date,
                            action: WorkstepAction::MineralFertilization {
                                amount: *amount,
                                partition: FertilizerPartition::carbamid_product(product_code),
                            },
                        });
                    }
                    EventKind::Irrigation {
                        volume_mm,
                        depth_cm,
                        ..
                    } => {
                        let nitrate_concentration = match pending_nitrate.take() {
                            Some(kg_n_per_ha) => {
                                Some(self.nitrate_concentration(treatment_id, kg_n_per_ha, *volume_mm)?)
                            }
                            None => None,
                        };
                        schedule.insert_bracketed(Workstep {
                            date,
                            action: WorkstepAction::Irrigation {
                                amount: *volume_mm,
                                at_layer: self.depth_to_layer_index(*depth_cm),
                                nitrate_concentration,
                            },
                        });
                    }
                }
            }

            if pending_nitrate.is_some() {
                warn!(
                    treatment_id,
                    %date,
                    "nitrate-in-irrigation-water marker without a same-date irrigation event, dropped"
                );
            }
        }

        Ok(schedule)
    }

    /// cm below surface -> discrete layer index, truncating.
    pub fn depth_to_layer_index(&self, depth_cm: f64) -> usize {
        let layer_thickness_cm = self.layer_thickness_m * 100.0;
        (depth_cm / layer_thickness_cm) as usize
    }

    /// kg N/ha dissolved in an irrigation volume (mm) -> mg/l.
    fn nitrate_concentration(
        &self,
        treatment_id: &str,
        kg_n_per_ha: f64,
        volume_mm: f64,
    ) -> CropbatchResult<f64> {
        if volume_mm == 0.0 || !volume_mm.is_finite() {
            return Err(CropbatchError::schedule_insertion(
                treatment_id,
                format!(
                    "cannot derive nitrate concentration: {kg_n_per_ha} kg N/ha paired with irrigation volume {volume_mm}"
                ),
            ));
        }
        Ok(kg_n_per_ha * 100.0 / volume_mm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn fertilization(day: &str, amount: f64) -> ManagementEvent {
        ManagementEvent {
            date: date(day),
            kind: EventKind::Fertilization {
                amount,
                method: ApplicationMethod::Broadcast,
                depth_cm: 0.0,
                product_code: "FE005".to_string(),
                no3_amount: 0.0,
                nh4_amount: 0.0,
            },
        }
    }

    fn water_marker(day: &str, amount: f64) -> ManagementEvent {
        ManagementEvent {
            date: date(day),
            kind: EventKind::Fertilization {
                amount,
                method: ApplicationMethod::InIrrigationWater,
                depth_cm: 0.0,
                product_code: "FE005".to_string(),
                no3_amount: 0.0,
                nh4_amount: 0.0,
            },
        }
    }

    fn irrigation(day: &str, volume: f64, depth_cm: f64) -> ManagementEvent {
        ManagementEvent {
            date: date(day),
            kind: EventKind::Irrigation {
                volume_mm: volume,
                depth_cm,
                nitrogen_pct: 0.0,
                operation_code: "IR001".to_string(),
            },
        }
    }

    fn assembler() -> ScheduleAssembler {
        ScheduleAssembler::new(0.1)
    }

    #[test]
    fn anchors_only_schedule_is_sowing_then_harvest() {
        let schedule = assembler()
            .assemble("T1", "wheat", date("1992-12-15"), date("1993-05-25"), &[])
            .unwrap();
        assert_eq!(schedule.len(), 2);
        assert!(schedule.steps()[0].is_sowing());
        assert!(schedule.steps()[1].is_harvest());
    }

    #[test]
    fn harvest_not_after_sowing_is_rejected() {
        let result = assembler().assemble(
            "T1",
            "wheat",
            date("1993-05-25"),
            date("1992-12-15"),
            &[],
        );
        assert!(matches!(
            result,
            Err(CropbatchError::ScheduleInsertion { .. })
        ));
    }

    #[test]
    fn schedule_stays_sorted_across_brackets() {
        let events = vec![
            fertilization("1993-06-10", 40.0), // after harvest
            irrigation("1993-02-01", 20.0, 0.0),
            fertilization("1992-11-02", 30.0), // before sowing
            fertilization("1992-10-20", 10.0), // before sowing, earlier
            irrigation("1993-04-01", 25.0, 10.0),
        ];
        let schedule = assembler()
            .assemble("T1", "wheat", date("1992-12-15"), date("1993-05-25"), &events)
            .unwrap();

        assert!(schedule.is_sorted_by_date());
        // Pre-sowing events first, in ascending order.
        assert_eq!(schedule.steps()[0].date, date("1992-10-20"));
        assert_eq!(schedule.steps()[1].date, date("1992-11-02"));
        assert!(schedule.steps()[2].is_sowing());
        // Post-harvest event last.
        assert_eq!(schedule.steps().last().unwrap().date, date("1993-06-10"));
        // Harvest is second to last.
        assert!(schedule.steps()[schedule.len() - 2].is_harvest());
    }

    #[test]
    fn in_season_events_go_before_harvest() {
        let events = vec![irrigation("1993-03-10", 25.0, 0.0)];
        let schedule = assembler()
            .assemble("T1", "wheat", date("1992-12-15"), date("1993-05-25"), &events)
            .unwrap();
        assert_eq!(schedule.len(), 3);
        assert!(schedule.steps()[0].is_sowing());
        assert_eq!(schedule.steps()[1].date, date("1993-03-10"));
        assert!(schedule.steps()[2].is_harvest());
    }

    #[test]
    fn irrigation_depth_maps_to_layer_index() {
        let events = vec![irrigation("1993-03-10", 25.0, 30.0)];
        let schedule = assembler()
            .assemble("T1", "wheat", date("1992-12-15"), date("1993-05-25"), &events)
            .unwrap();
        match &schedule.steps()[1].action {
            WorkstepAction::Irrigation { at_layer, .. } => assert_eq!(*at_layer, 3),
            other => panic!("expected irrigation, got {other:?}"),
        }
    }

    #[test]
    fn water_marker_becomes_nitrate_concentration() {
        let events = vec![
            water_marker("1993-03-10", 120.0),
            irrigation("1993-03-10", 15.0, 0.0),
        ];
        let schedule = assembler()
            .assemble("T1", "wheat", date("1992-12-15"), date("1993-05-25"), &events)
            .unwrap();
        // The marker itself produced no workstep.
        assert_eq!(schedule.len(), 3);
        match &schedule.steps()[1].action {
            WorkstepAction::Irrigation {
                nitrate_concentration,
                ..
            } => assert_eq!(*nitrate_concentration, Some(120.0 * 100.0 / 15.0)),
            other => panic!("expected irrigation, got {other:?}"),
        }
    }

    #[test]
    fn zero_volume_with_pending_marker_fails() {
        let events = vec![
            water_marker("1993-03-10", 120.0),
            irrigation("1993-03-10", 0.0, 0.0),
        ];
        let result = assembler().assemble(
            "T1",
            "wheat",
            date("1992-12-15"),
            date("1993-05-25"),
            &events,
        );
        assert!(matches!(
            result,
            Err(CropbatchError::ScheduleInsertion { .. })
        ));
    }

    #[test]
    fn marker_without_irrigation_is_dropped() {
        let events = vec![water_marker("1993-03-10", 120.0)];
        let schedule = assembler()
            .assemble("T1", "wheat", date("1992-12-15"), date("1993-05-25"), &events)
            .unwrap();
        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn duplicate_date_and_kind_events_are_both_kept() {
        let events = vec![
            fertilization("1993-03-10", 40.0),
            fertilization("1993-03-10", 40.0),
        ];
        let schedule = assembler()
            .assemble("T1", "wheat", date("1992-12-15"), date("1993-05-25"), &events)
            .unwrap();
        assert_eq!(schedule.len(), 4);
    }
}
