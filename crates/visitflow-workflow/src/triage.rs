//! 分诊引擎
//!
//! 以固定决策表驱动有限次数的症状问答，并将回答汇总为结构化摘要。
//! 下一题只取决于最近一次回答（单层查表），不会参考更早的回答。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use visitflow_core::{Question, Result, SymptomEntry, TriageSummary, VisitFlowError};

/// 单次分诊最多回答数，达到后立即生成摘要
pub const MAX_TRIAGE_ANSWERS: usize = 5;

const INITIAL_QUESTION: &str = "What is your main symptom today?";
const GENERIC_QUESTION: &str = "Are you experiencing any other symptoms?";
const UNKNOWN: &str = "Unknown";
const DEFAULT_SEVERITY: &str = "Moderate";
const DEFAULT_ACTION: &str = "Medical evaluation needed";

/// 决策表中的已知主要症状
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PrimarySymptom {
    Fever,
    Headache,
    ChestPain,
    StomachPain,
    DifficultyBreathing,
}

impl PrimarySymptom {
    pub const ALL: [PrimarySymptom; 5] = [
        PrimarySymptom::Fever,
        PrimarySymptom::Headache,
        PrimarySymptom::ChestPain,
        PrimarySymptom::StomachPain,
        PrimarySymptom::DifficultyBreathing,
    ];

    /// 患者看到的选项文本
    pub fn label(&self) -> &'static str {
        match self {
            PrimarySymptom::Fever => "Fever",
            PrimarySymptom::Headache => "Headache",
            PrimarySymptom::ChestPain => "Chest Pain",
            PrimarySymptom::StomachPain => "Stomach Pain",
            PrimarySymptom::DifficultyBreathing => "Difficulty Breathing",
        }
    }

    /// 按回答文本精确匹配
    pub fn from_answer(answer: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|symptom| symptom.label() == answer)
    }

    /// 该症状对应的追问
    pub fn follow_up(&self) -> Question {
        match self {
            PrimarySymptom::Fever => Question::new(
                "How long have you had the fever?",
                &["Less than 24 hours", "1-3 days", "More than 3 days"],
            ),
            PrimarySymptom::Headache => Question::new(
                "How would you describe the pain?",
                &["Throbbing", "Constant", "Sharp", "Dull"],
            ),
            PrimarySymptom::ChestPain => Question::new(
                "Is the pain worse with movement or breathing?",
                &["Yes", "No", "Unsure"],
            ),
            PrimarySymptom::StomachPain => Question::new(
                "Where is the pain located?",
                &["Upper abdomen", "Lower abdomen", "All over"],
            ),
            PrimarySymptom::DifficultyBreathing => Question::new(
                "When did this start?",
                &["Today", "Past few days", "Over a week"],
            ),
        }
    }
}

/// 提交回答后的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriageStep {
    /// 继续提问
    Next { question: Question },
    /// 分诊结束
    Complete { summary: TriageSummary },
}

impl TriageStep {
    pub fn is_complete(&self) -> bool {
        matches!(self, TriageStep::Complete { .. })
    }
}

/// 分诊引擎（无状态）
#[derive(Debug, Clone, Copy, Default)]
pub struct TriageEngine;

impl TriageEngine {
    pub fn new() -> Self {
        Self
    }

    /// 新会话的第一题：主要症状选择
    pub fn start_session(&self) -> Question {
        let mut options: Vec<&str> = PrimarySymptom::ALL.iter().map(|s| s.label()).collect();
        options.push("Other");
        Question::new(INITIAL_QUESTION, &options)
    }

    /// 患者当前正在回答的问题
    pub fn current_question(&self, history: &[SymptomEntry]) -> Question {
        match history.last() {
            None => self.start_session(),
            Some(last) => Self::lookup(&last.answer),
        }
    }

    /// 根据已有回答生成下一题；达到上限时返回 `None`
    pub fn next_question(&self, history: &[SymptomEntry]) -> Option<Question> {
        if Self::is_complete(history) {
            return None;
        }
        Some(self.current_question(history))
    }

    /// 记录回答并给出下一步
    pub fn submit(
        &self,
        history: &mut Vec<SymptomEntry>,
        answer: &str,
        now: DateTime<Utc>,
    ) -> Result<TriageStep> {
        if Self::is_complete(history) {
            return Err(VisitFlowError::InvalidState(format!(
                "Triage already has {} answers",
                history.len()
            )));
        }

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(VisitFlowError::Validation("Answer is required".to_string()));
        }

        let question = self.current_question(history);
        history.push(SymptomEntry {
            question: question.text,
            answer: answer.to_string(),
            timestamp: now,
        });

        match self.next_question(history) {
            Some(question) => Ok(TriageStep::Next { question }),
            None => Ok(TriageStep::Complete {
                summary: self.summarize(history),
            }),
        }
    }

    /// 汇总分诊回答，缺失项记为 "Unknown"
    pub fn summarize(&self, history: &[SymptomEntry]) -> TriageSummary {
        let answer_at = |index: usize| {
            history
                .get(index)
                .map(|entry| entry.answer.clone())
                .unwrap_or_else(|| UNKNOWN.to_string())
        };

        let full_symptom_history = history
            .iter()
            .map(|entry| format!("{}: {}", entry.question, entry.answer))
            .collect::<Vec<_>>()
            .join("; ");

        TriageSummary {
            primary_symptom: answer_at(0),
            duration: answer_at(1),
            severity: DEFAULT_SEVERITY.to_string(),
            recommended_action: DEFAULT_ACTION.to_string(),
            full_symptom_history,
        }
    }

    pub fn is_complete(history: &[SymptomEntry]) -> bool {
        history.len() >= MAX_TRIAGE_ANSWERS
    }

    fn lookup(answer: &str) -> Question {
        match PrimarySymptom::from_answer(answer) {
            Some(symptom) => symptom.follow_up(),
            None => Question::new(GENERIC_QUESTION, &["Yes", "No"]),
        }
    }
}
