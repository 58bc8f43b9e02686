use crate::models::question::Category;

/// Quota and grading weight for one category.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category: Category,
    /// Questions drawn from the bank when assembling a session.
    pub quota: i32,
    /// Official maximum score for the category, not derived from the
    /// actual option scores.
    pub max_score: i32,
    /// Minimum percentage to pass the category.
    pub pass_threshold: f64,
}

/// Immutable grading configuration injected into the exam engine at
/// construction. `categories` also fixes the assignment order: quotas are
/// drawn and numbered category by category, in this order.
#[derive(Debug, Clone)]
pub struct ExamRules {
    pub categories: Vec<CategoryRule>,
    pub duration_minutes: i32,
    pub overall_max_score: i32,
    pub overall_pass_threshold: f64,
}

impl ExamRules {
    pub fn total_questions(&self) -> i32 {
        self.categories.iter().map(|r| r.quota).sum()
    }
}

impl Default for ExamRules {
    /// Official PPPK exam layout: 145 questions, 690 max points, only
    /// grades A and B (>= 90%) pass.
    fn default() -> Self {
        Self {
            categories: vec![
                CategoryRule {
                    category: Category::Teknis,
                    quota: 90,
                    max_score: 450,
                    pass_threshold: 90.0,
                },
                CategoryRule {
                    category: Category::Manajerial,
                    quota: 25,
                    max_score: 100,
                    pass_threshold: 90.0,
                },
                CategoryRule {
                    category: Category::SosialKultural,
                    quota: 20,
                    max_score: 100,
                    pass_threshold: 90.0,
                },
                CategoryRule {
                    category: Category::Wawancara,
                    quota: 10,
                    max_score: 40,
                    pass_threshold: 90.0,
                },
            ],
            duration_minutes: 130,
            overall_max_score: 690,
            overall_pass_threshold: 90.0,
        }
    }
}

/// Letter grade for a percentage. Shared between per-category results and
/// the overall summary.
pub fn grade_for(percentage: f64) -> &'static str {
    if percentage >= 100.0 {
        "A"
    } else if percentage >= 90.0 {
        "B"
    } else if percentage >= 80.0 {
        "C"
    } else if percentage >= 70.0 {
        "D"
    } else {
        "E"
    }
}
