//! Per-contact conversation state and bounded turn history.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::intent::{Intent, POOR_DUTCH_PATTERN, PROFESSION_PATTERN};

/// Language preference until the contact signals otherwise.
pub const DEFAULT_LANGUAGE: &str = "Nederlands";
/// Preference recorded when the contact asks for simpler Dutch.
pub const SIMPLE_LANGUAGE: &str = "Eenvoudig Nederlands";

/// Turns after which a conversation counts as engaged.
const ENGAGED_AFTER: u32 = 3;
/// Turns after which a conversation counts as deep.
const DEEP_AFTER: u32 = 6;

static PROFESSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(PROFESSION_PATTERN).unwrap());
static POOR_DUTCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(POOR_DUTCH_PATTERN).unwrap());

/// Conversation depth, derived from the message count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    New,
    Engaged,
    Deep,
    /// Absorbing: no further automatic replies.
    Ended,
}

impl Stage {
    pub fn from_message_count(count: u32) -> Self {
        if count >= DEEP_AFTER {
            Self::Deep
        } else if count >= ENGAGED_AFTER {
            Self::Engaged
        } else {
            Self::New
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "initial",
            Self::Engaged => "engaged",
            Self::Deep => "deep_conversation",
            Self::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

/// Extra facts recorded alongside a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    /// Reply is the fallback after a generator failure.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    /// Turn that ended the conversation.
    #[serde(default, rename = "final", skip_serializing_if = "std::ops::Not::not")]
    pub final_turn: bool,
}

/// One inbound message and the reply sent for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub timestamp: DateTime<Utc>,
    pub inbound: String,
    pub outbound: String,
    #[serde(default)]
    pub metadata: TurnMetadata,
}

impl ConversationTurn {
    pub fn new(inbound: impl Into<String>, outbound: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            inbound: inbound.into(),
            outbound: outbound.into(),
            metadata: TurnMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: TurnMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Facts extracted from what the contact wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
}

/// Everything remembered about one contact's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    /// Inbound turns accepted so far. Never decreases.
    pub message_count: u32,
    /// Once true, stays true.
    pub ended: bool,
    pub introduced: bool,
    pub attributes: ContactAttributes,
    pub language_preference: String,
    pub topics: BTreeSet<String>,
    pub first_contact: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
    /// Oldest first, capped by the responder's history limit.
    pub turns: VecDeque<ConversationTurn>,
}

impl Default for ConversationState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            message_count: 0,
            ended: false,
            introduced: false,
            attributes: ContactAttributes::default(),
            language_preference: DEFAULT_LANGUAGE.to_string(),
            topics: BTreeSet::new(),
            first_contact: now,
            last_interaction: now,
            turns: VecDeque::new(),
        }
    }
}

impl ConversationState {
    pub fn stage(&self) -> Stage {
        if self.ended {
            Stage::Ended
        } else {
            Stage::from_message_count(self.message_count)
        }
    }

    /// Mark the conversation ended. Irreversible.
    pub fn end(&mut self) {
        self.ended = true;
    }

    /// Append a turn, evicting the oldest beyond `cap`.
    pub fn push_turn(&mut self, turn: ConversationTurn, cap: usize) {
        self.last_interaction = turn.timestamp;
        self.turns.push_back(turn);
        while self.turns.len() > cap {
            self.turns.pop_front();
        }
    }

    /// Update profession, language preference and topics from inbound text.
    pub fn absorb_inbound(&mut self, text: &str, intent: Intent) {
        let lower = text.to_lowercase();

        if let Some(found) = PROFESSION_RE.find(&lower) {
            self.attributes.profession = Some(found.as_str().to_string());
        }
        if POOR_DUTCH_RE.is_match(&lower) {
            self.language_preference = SIMPLE_LANGUAGE.to_string();
        }
        if let Some(topic) = topic_for(intent) {
            self.topics.insert(topic.to_string());
        }
    }
}

/// Topic label recorded when a message has a given intent.
pub fn topic_for(intent: Intent) -> Option<&'static str> {
    match intent {
        Intent::Costs => Some("kosten"),
        Intent::HowItWorks => Some("werking"),
        Intent::Trust => Some("betrouwbaarheid"),
        Intent::Interest => Some("interesse"),
        _ => None,
    }
}
