use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::thread_rng;
use sqlx::PgPool;
use std::collections::HashSet;
use std::path::Path;

use crate::config::QuizPolicy;
use crate::error::{Error, Result};
use crate::models::exam::Tier;
use crate::models::question::{Question, QuestionRow, TraitGroup};

/// Catalog of active questions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// Up to `limit` randomly chosen active questions of `group`.
    async fn questions_for_group(&self, group: TraitGroup, limit: usize) -> Result<Vec<Question>>;
}

/// Draws the full question set for a tier: the per-group count for each of
/// the six groups.
pub async fn draw(bank: &dyn QuestionBank, tier: Tier, policy: &QuizPolicy) -> Result<Vec<Question>> {
    let needed = policy.questions_per_group(tier);
    let mut drawn = Vec::with_capacity(needed * TraitGroup::ALL.len());

    for group in TraitGroup::ALL {
        let mut seen = HashSet::new();
        let mut picked: Vec<Question> = bank
            .questions_for_group(group, needed)
            .await?
            .into_iter()
            .filter(|q| q.trait_group == group && seen.insert(q.id))
            .collect();
        if picked.len() < needed {
            tracing::error!(
                group = %group,
                needed,
                available = picked.len(),
                "question bank cannot fill an exam"
            );
            return Err(Error::InsufficientQuestions {
                group,
                needed,
                available: picked.len(),
            });
        }
        picked.truncate(needed);
        drawn.extend(picked);
    }

    if policy.shuffle_questions {
        drawn.shuffle(&mut thread_rng());
    }
    Ok(drawn)
}

#[derive(Clone)]
pub struct PgQuestionBank {
    pool: PgPool,
}

impl PgQuestionBank {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionBank for PgQuestionBank {
    async fn questions_for_group(&self, group: TraitGroup, limit: usize) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, question_text, trait_group
            FROM questions
            WHERE is_active = TRUE AND trait_group = $1
            ORDER BY RANDOM()
            LIMIT $2
            "#,
        )
        .bind(group.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Question::try_from(row).map_err(|e| Error::Internal(format!("corrupt question: {}", e)))
            })
            .collect()
    }
}

/// In-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticQuestionBank {
    questions: Vec<Question>,
}

impl StaticQuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// Loads a JSON array of `{"id", "text", "trait_group"}` objects.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let questions: Vec<Question> = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.as_ref().display(),
            count = questions.len(),
            "loaded question bank"
        );
        Ok(Self::new(questions))
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[async_trait]
impl QuestionBank for StaticQuestionBank {
    async fn questions_for_group(&self, group: TraitGroup, limit: usize) -> Result<Vec<Question>> {
        let in_group: Vec<&Question> = self
            .questions
            .iter()
            .filter(|q| q.trait_group == group)
            .collect();
        Ok(in_group
            .choose_multiple(&mut thread_rng(), limit)
            .map(|q| (*q).clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn catalog(per_group: usize) -> Vec<Question> {
        let mut out = Vec::new();
        let mut id = 0;
        for group in TraitGroup::ALL {
            for n in 0..per_group {
                id += 1;
                out.push(Question {
                    id,
                    text: format!("{} statement {}", group.label(), n),
                    trait_group: group,
                });
            }
        }
        out
    }

    #[tokio::test]
    async fn draw_returns_per_group_count_for_each_tier() {
        let bank = StaticQuestionBank::new(catalog(25));
        let policy = QuizPolicy::default();
        for (tier, total, per_group) in [(Tier::Free, 30, 5), (Tier::Paid, 120, 20)] {
            let drawn = draw(&bank, tier, &policy).await.unwrap();
            assert_eq!(drawn.len(), total);
            let mut counts: HashMap<TraitGroup, usize> = HashMap::new();
            for q in &drawn {
                *counts.entry(q.trait_group).or_default() += 1;
            }
            assert!(TraitGroup::ALL.iter().all(|g| counts[g] == per_group));
            let ids: HashSet<i64> = drawn.iter().map(|q| q.id).collect();
            assert_eq!(ids.len(), total);
        }
    }

    #[tokio::test]
    async fn short_group_is_reported() {
        let mut questions = catalog(5);
        questions.retain(|q| !(q.trait_group == TraitGroup::S && q.id % 5 == 0));
        let bank = StaticQuestionBank::new(questions);
        let err = draw(&bank, Tier::Free, &QuizPolicy::default()).await.unwrap_err();
        match err {
            Error::InsufficientQuestions {
                group,
                needed,
                available,
            } => {
                assert_eq!(group, TraitGroup::S);
                assert_eq!(needed, 5);
                assert_eq!(available, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn draw_ignores_duplicates_and_foreign_groups_from_bank() {
        let mut bank = MockQuestionBank::new();
        bank.expect_questions_for_group()
            .times(1..)
            .returning(|group, limit| {
                let mut qs: Vec<Question> = (0..limit as i64)
                    .map(|n| Question {
                        id: group.index() as i64 * 100 + n,
                        text: format!("q{}", n),
                        trait_group: group,
                    })
                    .collect();
                if group == TraitGroup::A {
                    qs[1].id = qs[0].id;
                    qs.push(Question {
                        id: 999,
                        text: "stray".into(),
                        trait_group: TraitGroup::C,
                    });
                }
                Ok(qs)
            });

        let err = draw(&bank, Tier::Free, &QuizPolicy::default()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientQuestions {
                group: TraitGroup::A,
                available: 4,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unshuffled_draw_keeps_group_order() {
        let bank = StaticQuestionBank::new(catalog(5));
        let policy = QuizPolicy {
            shuffle_questions: false,
            ..QuizPolicy::default()
        };
        let drawn = draw(&bank, Tier::Free, &policy).await.unwrap();
        assert_eq!(drawn[0].trait_group, TraitGroup::R);
        assert_eq!(drawn[29].trait_group, TraitGroup::C);
    }
}
