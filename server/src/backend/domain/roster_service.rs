//! Student roster with resolved tuition amounts and census KPIs for the
//! staff dashboard.

use chrono::NaiveDate;
use shared::{
    Concept, GradeCensus, Level, LevelCensus, PriceRecord, RosterResponse, RosterRow,
    RosterSummary, Student,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::{BillingError, Result};
use super::pricing_service::{current_amount, PARAM_BASE_PRESCHOOL, PARAM_BASE_PRIMARY};
use super::util::{norm, round2};
use crate::backend::storage::{ParamStore, PriceStore, StudentStore};

const PRESCHOOL_GRADES: std::ops::RangeInclusive<u32> = 1..=3;
const PRIMARY_GRADES: std::ops::RangeInclusive<u32> = 1..=6;

#[derive(Clone)]
pub struct RosterService {
    students: Arc<dyn StudentStore>,
    prices: Arc<dyn PriceStore>,
    params: Arc<dyn ParamStore>,
}

impl RosterService {
    pub fn new(
        students: Arc<dyn StudentStore>,
        prices: Arc<dyn PriceStore>,
        params: Arc<dyn ParamStore>,
    ) -> Self {
        Self {
            students,
            prices,
            params,
        }
    }

    pub async fn get_student(&self, student_id: &str) -> Result<Student> {
        self.students
            .get_student(student_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("student {student_id}")))
    }

    /// Full roster ordered by level, grade and name, with the tuition each
    /// student currently pays and the census breakdown.
    pub async fn list_students(&self, today: NaiveDate) -> Result<RosterResponse> {
        let students = self.students.list_students().await?;

        let mut tuition_prices: HashMap<String, Vec<PriceRecord>> = HashMap::new();
        for record in self.prices.list_all_prices().await? {
            if record.concept == Concept::Tuition {
                tuition_prices
                    .entry(record.student_id.clone())
                    .or_default()
                    .push(record);
            }
        }

        let keys = vec![
            PARAM_BASE_PRESCHOOL.to_string(),
            PARAM_BASE_PRIMARY.to_string(),
        ];
        let params = self.params.get_params(&keys).await?;
        let parse = |key: &str| {
            params
                .get(key)
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        let base_preschool = parse(PARAM_BASE_PRESCHOOL);
        let base_primary = parse(PARAM_BASE_PRIMARY);

        let rows: Vec<RosterRow> = students
            .iter()
            .map(|student| {
                let records = tuition_prices
                    .get(&student.id)
                    .map(|v| v.as_slice())
                    .unwrap_or(&[]);
                let current_tuition = match current_amount(records, today) {
                    Some(amount) => round2(amount),
                    None => match student.level {
                        Level::Preschool => base_preschool,
                        Level::Primary => base_primary,
                        Level::Other => 0.0,
                    },
                };
                RosterRow {
                    student_id: student.id.clone(),
                    code: student.code.clone(),
                    full_name: student.full_name.clone(),
                    sex: student.sex.clone(),
                    level: student.level,
                    grade: student.grade,
                    status: student.status.clone(),
                    official: student.official,
                    current_tuition,
                }
            })
            .collect();

        let summary = build_summary(&rows, base_preschool, base_primary);
        let (preschool, primary) = build_census(&rows);

        Ok(RosterResponse {
            students: rows,
            summary,
            preschool,
            primary,
        })
    }
}

fn is_girl(sex: &str) -> bool {
    norm(sex) == "M"
}

fn build_summary(rows: &[RosterRow], base_preschool: f64, base_primary: f64) -> RosterSummary {
    let girls = rows.iter().filter(|r| is_girl(&r.sex)).count() as u32;
    let boys = rows.len() as u32 - girls;
    let girls_official = rows
        .iter()
        .filter(|r| r.official && is_girl(&r.sex))
        .count() as u32;
    let boys_official = rows
        .iter()
        .filter(|r| r.official && !is_girl(&r.sex))
        .count() as u32;

    let mut current_income_total = 0.0;
    for row in rows {
        current_income_total = round2(current_income_total + row.current_tuition);
    }
    let income_average = if rows.is_empty() {
        0.0
    } else {
        round2(current_income_total / rows.len() as f64)
    };

    let preschoolers = rows.iter().filter(|r| r.level == Level::Preschool).count() as f64;
    let primaries = rows.iter().filter(|r| r.level == Level::Primary).count() as f64;
    let base_income_expected = round2(preschoolers * base_preschool + primaries * base_primary);

    RosterSummary {
        boys,
        girls,
        boys_official,
        girls_official,
        current_income_total,
        income_average,
        base_income_expected,
        base_income_delta: round2(current_income_total - base_income_expected),
        base_preschool,
        base_primary,
    }
}

fn build_census(rows: &[RosterRow]) -> (LevelCensus, LevelCensus) {
    let mut preschool = empty_census(PRESCHOOL_GRADES);
    let mut primary = empty_census(PRIMARY_GRADES);

    for row in rows {
        let census = match row.level {
            Level::Preschool => &mut preschool,
            // Unlevelled students are counted with primary, matching the
            // dashboard's two-table layout.
            _ => &mut primary,
        };
        let girl = is_girl(&row.sex);
        let grade = census.grades.entry(row.grade.max(0) as u32).or_default();

        if girl {
            grade.girls += 1;
            census.total.girls += 1;
        } else {
            grade.boys += 1;
            census.total.boys += 1;
        }
        grade.total += 1;

        if row.official {
            if girl {
                grade.girls_official += 1;
                census.total_official.girls += 1;
            } else {
                grade.boys_official += 1;
                census.total_official.boys += 1;
            }
            grade.total_official += 1;
        }
    }

    (preschool, primary)
}

/// Census with every grade of the level present, even when empty.
fn empty_census(grades: std::ops::RangeInclusive<u32>) -> LevelCensus {
    let mut census = LevelCensus::default();
    for grade in grades {
        census.grades.insert(grade, GradeCensus::default());
    }
    census
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::storage::sqlite::{
        DbConnection, ParamRepository, PriceRepository, StudentRepository,
    };

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn fixture() -> (RosterService, Arc<dyn StudentStore>, Arc<dyn PriceStore>) {
        let db = DbConnection::init_test().await.unwrap();
        let students: Arc<dyn StudentStore> = Arc::new(StudentRepository::new(db.clone()));
        let prices: Arc<dyn PriceStore> = Arc::new(PriceRepository::new(db.clone()));
        let params: Arc<dyn ParamStore> = Arc::new(ParamRepository::new(db.clone()));
        params.set_param(PARAM_BASE_PRESCHOOL, "850").await.unwrap();
        params.set_param(PARAM_BASE_PRIMARY, "950").await.unwrap();
        (
            RosterService::new(students.clone(), prices.clone(), params),
            students,
            prices,
        )
    }

    async fn seed_student(
        students: &Arc<dyn StudentStore>,
        id: &str,
        name: &str,
        sex: &str,
        level: Level,
        grade: i32,
        official: bool,
    ) {
        students
            .insert_student(&Student {
                id: id.to_string(),
                code: None,
                full_name: name.to_string(),
                sex: sex.to_string(),
                level,
                grade,
                status: "Activo".to_string(),
                official,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn roster_resolves_prices_and_falls_back_to_level_base() {
        let (service, students, prices) = fixture().await;
        seed_student(&students, "s1", "Ana", "M", Level::Preschool, 2, true).await;
        seed_student(&students, "s2", "Bruno", "H", Level::Primary, 4, false).await;
        prices
            .insert_price(&PriceRecord {
                id: 0,
                student_id: "s1".to_string(),
                concept: Concept::Tuition,
                effective_from: d(2024, 8, 1),
                base_amount: 1100.0,
                notes: None,
            })
            .await
            .unwrap();

        let response = service.list_students(d(2024, 9, 1)).await.unwrap();

        assert_eq!(response.students.len(), 2);
        let ana = response
            .students
            .iter()
            .find(|r| r.student_id == "s1")
            .unwrap();
        assert_eq!(ana.current_tuition, 1100.0);
        let bruno = response
            .students
            .iter()
            .find(|r| r.student_id == "s2")
            .unwrap();
        assert_eq!(bruno.current_tuition, 950.0);

        assert_eq!(response.summary.boys, 1);
        assert_eq!(response.summary.girls, 1);
        assert_eq!(response.summary.girls_official, 1);
        assert_eq!(response.summary.current_income_total, 2050.0);
        assert_eq!(response.summary.income_average, 1025.0);
        // One preschooler at 850 plus one primary at 950.
        assert_eq!(response.summary.base_income_expected, 1800.0);
        assert_eq!(response.summary.base_income_delta, 250.0);
    }

    #[tokio::test]
    async fn census_prefills_every_grade_of_each_level() {
        let (service, students, _prices) = fixture().await;
        seed_student(&students, "s1", "Ana", "M", Level::Preschool, 2, true).await;

        let response = service.list_students(d(2024, 9, 1)).await.unwrap();

        let grades: Vec<u32> = response.preschool.grades.keys().copied().collect();
        assert_eq!(grades, vec![1, 2, 3]);
        let grades: Vec<u32> = response.primary.grades.keys().copied().collect();
        assert_eq!(grades, vec![1, 2, 3, 4, 5, 6]);

        let second = &response.preschool.grades[&2];
        assert_eq!(second.girls, 1);
        assert_eq!(second.total, 1);
        assert_eq!(second.girls_official, 1);
        assert_eq!(response.preschool.total.girls, 1);
    }

    #[tokio::test]
    async fn get_student_reports_not_found() {
        let (service, _students, _prices) = fixture().await;
        let err = service.get_student("missing").await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound(_)));
    }
}
