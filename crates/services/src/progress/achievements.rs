//! Achievement catalog and unlock rules.
//!
//! Three achievements follow from the learner record alone. Each lesson may
//! also name a "perfect" achievement in its reward, granted by the lesson
//! sequencer when the assessment is passed without a single mistake.

use chronicle_core::model::{AchievementId, LearnerRecord, LessonCatalog, LessonId};

pub const FIRST_LESSON: &str = "first-lesson";
pub const JOURNAL_COLLECTOR: &str = "journal-collector";
pub const COMPLETIONIST: &str = "completionist";

/// How an achievement is earned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// At least one lesson completed.
    FirstLesson,
    /// Every journal page in the catalog collected.
    JournalCollector,
    /// Every lesson completed and every page collected.
    Completionist,
    /// Granted by the lesson sequencer for a flawless assessment.
    PerfectLesson(LessonId),
}

impl Rule {
    /// Whether the record alone satisfies the rule. Perfect-lesson rules are
    /// never satisfied here.
    #[must_use]
    pub fn is_met(&self, record: &LearnerRecord, catalog: &LessonCatalog) -> bool {
        match self {
            Rule::FirstLesson => !record.completed_lessons().is_empty(),
            Rule::JournalCollector => all_pages_collected(record, catalog),
            Rule::Completionist => {
                !catalog.is_empty()
                    && catalog.iter().all(|l| record.is_lesson_completed(&l.id))
                    && all_pages_collected(record, catalog)
            }
            Rule::PerfectLesson(_) => false,
        }
    }
}

fn all_pages_collected(record: &LearnerRecord, catalog: &LessonCatalog) -> bool {
    !catalog.is_empty()
        && catalog
            .journal_pages()
            .all(|(page, _)| record.collected_pages().contains(page))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Achievement {
    pub id: AchievementId,
    pub title: String,
    pub description: String,
    pub rule: Rule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementStatus {
    pub achievement: Achievement,
    pub unlocked: bool,
}

/// Every achievement the catalog offers: the built-in ones, then one per
/// lesson that names a perfect achievement.
#[must_use]
pub fn definitions(catalog: &LessonCatalog) -> Vec<Achievement> {
    let mut all = vec![
        Achievement {
            id: AchievementId::new(FIRST_LESSON),
            title: "Ancient Scholar".into(),
            description: "Complete your first lesson".into(),
            rule: Rule::FirstLesson,
        },
        Achievement {
            id: AchievementId::new(JOURNAL_COLLECTOR),
            title: "Journal Collector".into(),
            description: format!("Find all {} journal pages", catalog.len()),
            rule: Rule::JournalCollector,
        },
        Achievement {
            id: AchievementId::new(COMPLETIONIST),
            title: "Time Traveler".into(),
            description: "Complete all lessons and find all journal pages".into(),
            rule: Rule::Completionist,
        },
    ];

    for lesson in catalog.iter() {
        if let Some(id) = &lesson.reward.perfect_achievement {
            all.push(Achievement {
                id: id.clone(),
                title: format!("{} Master", lesson.title),
                description: format!("Complete {} without mistakes", lesson.title),
                rule: Rule::PerfectLesson(lesson.id.clone()),
            });
        }
    }
    all
}

/// Ids of the record-derived achievements the learner currently qualifies for.
#[must_use]
pub fn earned(record: &LearnerRecord, catalog: &LessonCatalog) -> Vec<AchievementId> {
    definitions(catalog)
        .into_iter()
        .filter(|a| a.rule.is_met(record, catalog))
        .map(|a| a.id)
        .collect()
}

#[must_use]
pub fn statuses(record: &LearnerRecord, catalog: &LessonCatalog) -> Vec<AchievementStatus> {
    definitions(catalog)
        .into_iter()
        .map(|achievement| AchievementStatus {
            unlocked: record.achievements().contains(&achievement.id),
            achievement,
        })
        .collect()
}

/// Share of offered achievements the learner holds, in `[0, 1]`.
#[must_use]
pub fn completion_share(record: &LearnerRecord, catalog: &LessonCatalog) -> f64 {
    let all = statuses(record, catalog);
    if all.is_empty() {
        return 0.0;
    }
    all.iter().filter(|s| s.unlocked).count() as f64 / all.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::catalog;
    use chronicle_core::model::{Mutation, PageId};
    use chronicle_core::time::fixed_now;

    fn complete(record: &mut LearnerRecord, lesson: &str) {
        let now = fixed_now();
        record.apply(Mutation::CompleteLesson(LessonId::new(lesson)), now);
        record.apply(Mutation::CollectPage(PageId::new(format!("page-{lesson}"))), now);
    }

    #[test]
    fn perfect_achievements_come_from_rewards() {
        let ids: Vec<String> = definitions(&catalog())
            .into_iter()
            .map(|a| a.id.as_str().to_owned())
            .collect();
        assert_eq!(
            ids,
            [
                FIRST_LESSON,
                JOURNAL_COLLECTOR,
                COMPLETIONIST,
                "perfect-hieroglyphics"
            ]
        );
    }

    #[test]
    fn rules_follow_the_record() {
        let catalog = catalog();
        let mut record = LearnerRecord::new(fixed_now());
        assert!(earned(&record, &catalog).is_empty());

        complete(&mut record, "hieroglyphics");
        assert_eq!(earned(&record, &catalog), [AchievementId::new(FIRST_LESSON)]);

        complete(&mut record, "marketplace");
        complete(&mut record, "pyramid");
        assert_eq!(earned(&record, &catalog).len(), 3);
    }

    #[test]
    fn empty_catalog_never_grants_collection_achievements() {
        let catalog = LessonCatalog::default();
        let record = LearnerRecord::new(fixed_now());
        assert!(!Rule::JournalCollector.is_met(&record, &catalog));
        assert!(!Rule::Completionist.is_met(&record, &catalog));
        assert_eq!(completion_share(&record, &catalog), 0.0);
    }

    #[test]
    fn completion_share_counts_unlocked() {
        let catalog = catalog();
        let mut record = LearnerRecord::new(fixed_now());
        record.apply(
            Mutation::EarnAchievement(AchievementId::new(FIRST_LESSON)),
            fixed_now(),
        );
        assert_eq!(completion_share(&record, &catalog), 0.25);
    }
}
