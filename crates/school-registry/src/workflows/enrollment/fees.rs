use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::curriculum::CurriculumResolver;
use super::domain::{ProgramCode, StudentType, YearLevel};
use super::money::Money;

/// Rates and fixed charges for one student type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    pub per_unit: Money,
    pub lab_fee: Money,
    pub miscellaneous_fee: Money,
    pub enrollment_fee: Money,
    pub irregularity_fee: Option<Money>,
}

/// Complete tuition schedule, including fallback unit loads per year level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub regular: RateCard,
    pub irregular: RateCard,
    pub default_units: [u32; 5],
}

impl FeeSchedule {
    pub fn rate_card(&self, student_type: StudentType) -> &RateCard {
        match student_type {
            StudentType::Regular => &self.regular,
            StudentType::Irregular => &self.irregular,
        }
    }

    pub fn default_units_for(&self, year_level: YearLevel) -> u32 {
        self.default_units[usize::from(year_level.number() - 1)]
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            regular: RateCard {
                per_unit: Money::from_major(400),
                lab_fee: Money::from_major(400),
                miscellaneous_fee: Money::from_major(400),
                enrollment_fee: Money::from_major(300),
                irregularity_fee: None,
            },
            irregular: RateCard {
                per_unit: Money::from_major(450),
                lab_fee: Money::from_major(500),
                miscellaneous_fee: Money::from_major(500),
                enrollment_fee: Money::from_major(350),
                irregularity_fee: Some(Money::from_major(300)),
            },
            default_units: [21, 21, 18, 18, 15],
        }
    }
}

/// Where the unit count used for tuition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitsSource {
    Override,
    Curriculum,
    YearLevelDefault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeLine {
    pub label: &'static str,
    pub amount: Money,
    pub note: String,
}

/// Itemized quote returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub program: ProgramCode,
    pub year_level: YearLevel,
    pub term: String,
    pub student_type: StudentType,
    pub total_units: u32,
    pub units_source: UnitsSource,
    pub per_unit_rate: Money,
    pub tuition: Money,
    pub fixed_fees: Vec<FeeLine>,
    pub total: Money,
}

impl FeeBreakdown {
    pub fn fixed_total(&self) -> Money {
        self.fixed_fees.iter().map(|line| line.amount).sum()
    }
}

pub struct FeeCalculator {
    schedule: FeeSchedule,
    curriculum: Arc<CurriculumResolver>,
}

impl FeeCalculator {
    pub fn new(schedule: FeeSchedule, curriculum: Arc<CurriculumResolver>) -> Self {
        Self {
            schedule,
            curriculum,
        }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    /// Quote tuition and fixed fees.
    ///
    /// Units come from `units_override` when given, then the resolved curriculum,
    /// then the per-year default table; the order is never short-circuited.
    pub fn calculate_fees(
        &self,
        program: &ProgramCode,
        year_level: YearLevel,
        term: &str,
        student_type: StudentType,
        units_override: Option<u32>,
    ) -> FeeBreakdown {
        let (total_units, units_source) = match units_override.filter(|units| *units > 0) {
            Some(units) => (units, UnitsSource::Override),
            None => self.units_from_curriculum(program, year_level, term),
        };

        let card = self.schedule.rate_card(student_type);
        let tuition = card.per_unit * total_units;
        let fixed_fees = fixed_fee_lines(card, student_type);
        let total = tuition + fixed_fees.iter().map(|line| line.amount).sum::<Money>();

        debug!(
            program = %program,
            year_level = %year_level,
            student_type = student_type.label(),
            total_units,
            %total,
            "fee quote computed"
        );

        FeeBreakdown {
            program: program.clone(),
            year_level,
            term: term.trim().to_string(),
            student_type,
            total_units,
            units_source,
            per_unit_rate: card.per_unit,
            tuition,
            fixed_fees,
            total,
        }
    }

    fn units_from_curriculum(
        &self,
        program: &ProgramCode,
        year_level: YearLevel,
        term: &str,
    ) -> (u32, UnitsSource) {
        match self.curriculum.resolve_curriculum(program, year_level, term) {
            Ok(resolution) if resolution.total_units > 0 => {
                (resolution.total_units, UnitsSource::Curriculum)
            }
            Ok(_) => (
                self.schedule.default_units_for(year_level),
                UnitsSource::YearLevelDefault,
            ),
            Err(err) => {
                warn!(error = %err, program = %program, "curriculum lookup failed; using default units");
                (
                    self.schedule.default_units_for(year_level),
                    UnitsSource::YearLevelDefault,
                )
            }
        }
    }
}

fn fixed_fee_lines(card: &RateCard, student_type: StudentType) -> Vec<FeeLine> {
    let mut lines = vec![
        FeeLine {
            label: "laboratory",
            amount: card.lab_fee,
            note: format!("Laboratory fee ({} students)", student_type.label()),
        },
        FeeLine {
            label: "miscellaneous",
            amount: card.miscellaneous_fee,
            note: "Library, registration, and student services".to_string(),
        },
        FeeLine {
            label: "enrollment",
            amount: card.enrollment_fee,
            note: "Enrollment processing".to_string(),
        },
    ];

    if let Some(amount) = card.irregularity_fee {
        lines.push(FeeLine {
            label: "irregularity",
            amount,
            note: "Irregular load evaluation and scheduling".to_string(),
        });
    }
    lines
}
