//! Prompt templates. Composition is pure: the same inputs always render the
//! same bytes, and nothing here touches the network.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::ContextBlob;
use crate::session::ConversationHistory;

/// Exact sentence grounded kinds must answer with when the context does not
/// contain the answer.
pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information in the provided context to answer that.";

/// Output sections of an IPO analysis, in order.
pub const IPO_SECTIONS: [&str; 7] = [
    "Business Overview",
    "Financial Health",
    "Industry Outlook",
    "Objectives of the Offer",
    "Key Risks",
    "Valuation",
    "Neutral Summary",
];

/// Output sections of a retirement plan, in order.
pub const RETIREMENT_SECTIONS: [&str; 6] = [
    "Financial Snapshot",
    "Retirement Goal",
    "Investment Strategy",
    "Projected Outcome",
    "Next Steps",
    "Disclaimer",
];

/// Output sections of a document summary, in order.
pub const SUMMARY_SECTIONS: [&str; 4] = [
    "Overall Financial Performance",
    "Strategic Initiatives",
    "Identified Risks",
    "Outlook & Recommendations",
];

const NO_CONTEXT: &str = "(no context available)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Question answered only from retrieved document excerpts.
    DocumentQa,
    /// Finance chat grounded on company facts and news.
    GeneralChat,
    IpoAnalysis,
    RetirementPlan,
    /// Structured summary of a processed document.
    DocumentSummary,
    /// Sentiment and one-line summary of a news article, as JSON.
    NewsSentiment,
}

impl PromptKind {
    /// Whether answers must come from the supplied context alone.
    pub fn is_grounded(self) -> bool {
        matches!(self, PromptKind::DocumentQa | PromptKind::GeneralChat)
    }

    /// Fixed output sections, if the kind has a schema.
    pub fn sections(self) -> &'static [&'static str] {
        match self {
            PromptKind::IpoAnalysis => &IPO_SECTIONS,
            PromptKind::RetirementPlan => &RETIREMENT_SECTIONS,
            PromptKind::DocumentSummary => &SUMMARY_SECTIONS,
            _ => &[],
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PromptKind::DocumentQa => "document_qa",
            PromptKind::GeneralChat => "general_chat",
            PromptKind::IpoAnalysis => "ipo_analysis",
            PromptKind::RetirementPlan => "retirement_plan",
            PromptKind::DocumentSummary => "document_summary",
            PromptKind::NewsSentiment => "news_sentiment",
        };
        f.write_str(name)
    }
}

/// A rendered prompt: the system framing and the final user message.
/// Prior turns travel separately, as the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub kind: PromptKind,
    pub system: String,
    pub user: String,
}

/// Render the prompt for `kind` from `context` and `question`.
///
/// `history` only affects framing: a non-empty history marks the question as
/// a follow-up so the model resolves references against earlier turns.
pub fn compose(
    kind: PromptKind,
    context: &ContextBlob,
    question: &str,
    history: &ConversationHistory,
) -> Prompt {
    let mut user = String::new();
    user.push_str("CONTEXT:\n---\n");
    if context.is_empty() {
        user.push_str(NO_CONTEXT);
    } else {
        user.push_str(context.text.trim_end());
    }
    user.push_str("\n---\n");
    if context.truncated {
        user.push_str("Note: the context was shortened to fit; some material was left out.\n");
    }
    user.push('\n');
    if !history.is_empty() && kind.is_grounded() {
        user.push_str(
            "This is a follow-up in an ongoing conversation; use earlier turns to resolve \
             references.\n",
        );
    }
    user.push_str(question_label(kind));
    user.push_str(": ");
    user.push_str(question.trim());
    user.push_str("\n\n");
    user.push_str(answer_label(kind));
    user.push(':');

    Prompt {
        kind,
        system: system_instruction(kind),
        user,
    }
}

fn question_label(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::DocumentQa | PromptKind::GeneralChat => "QUESTION",
        PromptKind::IpoAnalysis => "IPO",
        PromptKind::RetirementPlan => "INVESTOR PROFILE",
        PromptKind::DocumentSummary => "FOCUS",
        PromptKind::NewsSentiment => "ARTICLE",
    }
}

fn answer_label(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::DocumentQa => "DETAILED ANSWER",
        PromptKind::GeneralChat => "ANSWER",
        PromptKind::IpoAnalysis => "IPO ANALYSIS",
        PromptKind::RetirementPlan => "RETIREMENT PLAN",
        PromptKind::DocumentSummary => "COMPREHENSIVE SUMMARY",
        PromptKind::NewsSentiment => "JSON",
    }
}

fn system_instruction(kind: PromptKind) -> String {
    match kind {
        PromptKind::DocumentQa => format!(
            "You are a financial analyst assistant. Answer the question as thoroughly as possible \
             using only the document excerpts in the context. Do not use outside knowledge and do \
             not invent figures. If the context does not contain the answer, reply with exactly: \
             \"{INSUFFICIENT_INFORMATION}\""
        ),
        PromptKind::GeneralChat => format!(
            "You are FinChat, a specialized financial assistant. Give clear, concise and accurate \
             financial insights based only on the context provided: company facts, document \
             excerpts and news. Do not use outside knowledge or make up information. Fields marked \
             'unavailable' are unknown; say so rather than guessing. Format answers in Markdown. \
             If the context does not contain the answer, reply with exactly: \
             \"{INSUFFICIENT_INFORMATION}\""
        ),
        PromptKind::IpoAnalysis => with_sections(
            "You are an equity research analyst reviewing an initial public offering. Use the \
             context as your primary source and flag any statement that is not supported by it. \
             Stay neutral: do not recommend buying or selling.",
            &IPO_SECTIONS,
        ),
        PromptKind::RetirementPlan => with_sections(
            "You are a retirement planning assistant. Build a plan from the investor profile and \
             the context. State every assumption (returns, inflation, retirement age) explicitly \
             and keep projections conservative.",
            &RETIREMENT_SECTIONS,
        ),
        PromptKind::DocumentSummary => with_sections(
            "You are a financial analyst. Summarize the financial document excerpts in the context \
             into a comprehensive, well-organized summary. Use only the excerpts.",
            &SUMMARY_SECTIONS,
        ),
        PromptKind::NewsSentiment => "You classify financial news. Decide the sentiment of the \
             article toward the company: strictly one of \"positive\", \"negative\" or \
             \"neutral\". Then write a one-sentence summary. Respond with a single JSON object \
             and nothing else, with exactly two keys: \"sentiment\" and \"summary\"."
            .to_string(),
    }
}

fn with_sections(framing: &str, sections: &[&str]) -> String {
    let mut s = String::from(framing);
    s.push_str(
        "\n\nStructure the answer with these Markdown headings, in this order, and no others:\n",
    );
    for (i, section) in sections.iter().enumerate() {
        s.push_str(&format!("{}. ## {section}\n", i + 1));
    }
    s
}
