use crate::types::{AnswerState, Question, QuestionId};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

pub const FULL_POINTS: u32 = 10;
pub const PARTIAL_POINTS: u32 = 5;
pub const DAILY_QUEST_TARGET: u32 = 5;

/// Per-question progress. Created on the first submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSession {
    pub question_id: QuestionId,
    pub state: AnswerState,
    pub attempts: u8,
    pub points: u32,
}

impl AnswerSession {
    fn new(question_id: QuestionId) -> Self {
        Self {
            question_id,
            state: AnswerState::Unattempted,
            attempts: 0,
            points: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Accepted,
    /// The question was already resolved; nothing changed.
    AlreadyResolved,
    /// No question with that id is active.
    UnknownQuestion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub status: SubmissionStatus,
    pub state: AnswerState,
    pub correct: bool,
    pub points_awarded: u32,
    /// Hint after a first miss, reasoning once resolved.
    pub feedback: String,
    /// Revealed when the question resolves without a correct answer.
    pub correct_answer: Option<String>,
    pub new_achievements: Vec<Achievement>,
}

impl SubmissionOutcome {
    pub fn unknown_question() -> Self {
        Self {
            status: SubmissionStatus::UnknownQuestion,
            state: AnswerState::Unattempted,
            correct: false,
            points_awarded: 0,
            feedback: "That question is not available.".to_string(),
            correct_answer: None,
            new_achievements: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Achievement {
    FirstQuestion,
    StarLearner,
    KnowledgeSeeker,
    NewsExpert,
}

impl Achievement {
    pub const ALL: [Achievement; 4] = [
        Achievement::FirstQuestion,
        Achievement::StarLearner,
        Achievement::KnowledgeSeeker,
        Achievement::NewsExpert,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Achievement::FirstQuestion => "First Question",
            Achievement::StarLearner => "Star Learner",
            Achievement::KnowledgeSeeker => "Knowledge Seeker",
            Achievement::NewsExpert => "News Expert",
        }
    }

    fn earned(&self, score: u32, answered: u32) -> bool {
        match self {
            Achievement::FirstQuestion => answered >= 1,
            Achievement::StarLearner => score >= 50,
            Achievement::KnowledgeSeeker => answered >= 5,
            Achievement::NewsExpert => score >= 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyQuest {
    pub day: NaiveDate,
    pub progress: u32,
    pub target: u32,
}

impl DailyQuest {
    pub fn completed(&self) -> bool {
        self.progress >= self.target
    }
}

/// One learner's in-memory progress: per-question answer state plus score,
/// achievements and the daily quest. Never persisted.
#[derive(Debug, Clone)]
pub struct LearningSession {
    answers: HashMap<QuestionId, AnswerSession>,
    total_score: u32,
    questions_answered: u32,
    achievements: Vec<Achievement>,
    quest: DailyQuest,
}

impl Default for LearningSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LearningSession {
    pub fn new() -> Self {
        Self {
            answers: HashMap::new(),
            total_score: 0,
            questions_answered: 0,
            achievements: Vec::new(),
            quest: DailyQuest {
                day: Utc::now().date_naive(),
                progress: 0,
                target: DAILY_QUEST_TARGET,
            },
        }
    }

    pub fn submit(&mut self, question: &Question, answer: &str) -> SubmissionOutcome {
        let entry = self
            .answers
            .entry(question.id)
            .or_insert_with(|| AnswerSession::new(question.id));

        if entry.state == AnswerState::Resolved {
            debug!("Ignoring submission for resolved question {}", question.id);
            return SubmissionOutcome {
                status: SubmissionStatus::AlreadyResolved,
                state: AnswerState::Resolved,
                correct: false,
                points_awarded: 0,
                feedback: question.reasoning.clone(),
                correct_answer: None,
                new_achievements: Vec::new(),
            };
        }

        let correct = answers_match(question, answer);
        entry.attempts = entry.attempts.saturating_add(1);

        let (state, points, feedback, reveal) = match (entry.state, correct) {
            (AnswerState::Unattempted, true) => (AnswerState::Resolved, FULL_POINTS, question.reasoning.clone(), false),
            (AnswerState::Unattempted, false) => (AnswerState::HintShown, 0, question.hint.clone(), false),
            (_, true) => (AnswerState::Resolved, PARTIAL_POINTS, question.reasoning.clone(), false),
            // Second miss still earns effort points and shows the worked answer.
            (_, false) => (
                AnswerState::Resolved,
                PARTIAL_POINTS,
                format!("{} {}", question.explanation, question.reasoning),
                true,
            ),
        };
        entry.state = state;
        entry.points += points;

        let mut new_achievements = Vec::new();
        if state == AnswerState::Resolved {
            self.total_score += points;
            self.questions_answered += 1;
            self.advance_quest();
            new_achievements = self.award_achievements();
        }

        SubmissionOutcome {
            status: SubmissionStatus::Accepted,
            state,
            correct,
            points_awarded: points,
            feedback,
            correct_answer: reveal.then(|| question.answer.clone()),
            new_achievements,
        }
    }

    fn advance_quest(&mut self) {
        let today = Utc::now().date_naive();
        if self.quest.day != today {
            self.quest.day = today;
            self.quest.progress = 0;
        }
        self.quest.progress += 1;
    }

    fn award_achievements(&mut self) -> Vec<Achievement> {
        let fresh: Vec<Achievement> = Achievement::ALL
            .into_iter()
            .filter(|a| !self.achievements.contains(a) && a.earned(self.total_score, self.questions_answered))
            .collect();
        self.achievements.extend(fresh.iter().copied());
        fresh
    }

    pub fn answer_session(&self, id: QuestionId) -> Option<&AnswerSession> {
        self.answers.get(&id)
    }

    pub fn state_of(&self, id: QuestionId) -> AnswerState {
        self.answers.get(&id).map_or(AnswerState::Unattempted, |s| s.state)
    }

    pub fn total_score(&self) -> u32 {
        self.total_score
    }

    pub fn questions_answered(&self) -> u32 {
        self.questions_answered
    }

    pub fn achievements(&self) -> &[Achievement] {
        &self.achievements
    }

    pub fn daily_quest(&self) -> DailyQuest {
        self.quest
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_lowercase()
}

/// Leading number of an answer, ignoring thousands separators, `%` and trailing units.
fn parse_number(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace(',', "");
    let numeric: String = cleaned
        .chars()
        .enumerate()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-'))
        .map(|(_, c)| c)
        .collect();
    numeric.parse().ok()
}

/// Case-insensitive text match; numeric answers also match within the question's tolerance.
pub fn answers_match(question: &Question, given: &str) -> bool {
    if normalize(given) == normalize(&question.answer) {
        return true;
    }
    match (question.tolerance, parse_number(given), parse_number(&question.answer)) {
        (Some(tolerance), Some(given), Some(expected)) => (given - expected).abs() <= tolerance + 1e-9,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgeTier, ArticleId, Subject};
    use uuid::Uuid;

    fn question(answer: &str, tolerance: Option<f64>) -> Question {
        let article_id = ArticleId(Uuid::from_u128(answer.len() as u128));
        Question {
            id: QuestionId::derive(article_id, Subject::Math, AgeTier::Ages9To11),
            article_id,
            subject: Subject::Math,
            tier: AgeTier::Ages9To11,
            prompt: "What is 15% of 200?".to_string(),
            options: vec!["25".to_string(), answer.to_string()],
            answer: answer.to_string(),
            tolerance,
            hint: "15% = 0.15".to_string(),
            explanation: "200 × 0.15 = 30".to_string(),
            reasoning: "Multiply by the decimal form.".to_string(),
        }
    }

    #[test]
    fn correct_first_try_earns_full_points() {
        let mut session = LearningSession::new();
        let q = question("30", Some(0.01));
        let outcome = session.submit(&q, "30");

        assert_eq!(outcome.status, SubmissionStatus::Accepted);
        assert_eq!(outcome.state, AnswerState::Resolved);
        assert_eq!(outcome.points_awarded, 10);
        assert_eq!(outcome.feedback, q.reasoning);
        assert_eq!(session.total_score(), 10);
    }

    #[test]
    fn miss_then_hit_earns_partial_points() {
        let mut session = LearningSession::new();
        let q = question("30", Some(0.01));

        let first = session.submit(&q, "25");
        assert_eq!(first.state, AnswerState::HintShown);
        assert_eq!(first.points_awarded, 0);
        assert_eq!(first.feedback, q.hint);
        assert_eq!(session.answer_session(q.id).map(|s| s.attempts), Some(1));
        assert_eq!(session.state_of(q.id), AnswerState::HintShown);

        let second = session.submit(&q, "30");
        assert_eq!(second.state, AnswerState::Resolved);
        assert_eq!(second.points_awarded, 5);
        assert_eq!(second.correct_answer, None);
    }

    #[test]
    fn two_misses_resolve_with_effort_points_and_answer() {
        let mut session = LearningSession::new();
        let q = question("30", Some(0.01));
        session.submit(&q, "25");
        let outcome = session.submit(&q, "40");

        assert_eq!(outcome.state, AnswerState::Resolved);
        assert_eq!(outcome.points_awarded, 5);
        assert_eq!(outcome.correct_answer.as_deref(), Some("30"));
        assert!(outcome.feedback.contains(&q.reasoning));
        assert_eq!(session.answer_session(q.id).map(|s| (s.attempts, s.points)), Some((2, 5)));
    }

    #[test]
    fn resolved_questions_reject_submissions() {
        let mut session = LearningSession::new();
        let q = question("30", Some(0.01));
        session.submit(&q, "30");

        for attempt in ["30", "nope"] {
            let outcome = session.submit(&q, attempt);
            assert_eq!(outcome.status, SubmissionStatus::AlreadyResolved);
            assert_eq!(outcome.points_awarded, 0);
        }
        assert_eq!(session.total_score(), 10);
        assert_eq!(session.questions_answered(), 1);
    }

    #[test]
    fn numeric_answers_tolerate_formatting() {
        let q = question("2,025", Some(0.0));
        assert!(answers_match(&q, "2025"));
        assert!(answers_match(&q, " 2,025 "));
        assert!(!answers_match(&q, "2024"));

        let pct = question("32.4", Some(0.05));
        assert!(answers_match(&pct, "32.42%"));
        assert!(!answers_match(&pct, "33"));
    }

    #[test]
    fn text_answers_ignore_case_and_spacing() {
        let q = question("Ask a question", None);
        assert!(answers_match(&q, "  ask a  QUESTION. "));
        assert!(!answers_match(&q, "Do an experiment"));
    }

    #[test]
    fn achievements_and_daily_quest_track_progress() {
        let mut session = LearningSession::new();
        let mut earned = Vec::new();
        for n in 0..5u128 {
            let mut q = question("30", Some(0.01));
            q.id = QuestionId(Uuid::from_u128(n + 100));
            earned.extend(session.submit(&q, "30").new_achievements);
        }

        assert_eq!(session.total_score(), 50);
        assert_eq!(
            earned,
            vec![Achievement::FirstQuestion, Achievement::StarLearner, Achievement::KnowledgeSeeker]
        );
        assert!(session.daily_quest().completed());
        assert_eq!(session.achievements().len(), 3);
    }
}
