//! Intent classification for inbound messages.
//!
//! An ordered table of trigger rules is evaluated against the lower-cased,
//! trimmed message text. The first rule that matches wins; nothing matching
//! yields [`Intent::General`]. Rule order is part of the contract: a message
//! that says both "hallo" and "wat kost het" is a greeting, not a cost
//! question.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Named classification of what an inbound message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Aggressive,
    StopConversation,
    Greeting,
    Interest,
    Rejection,
    Trust,
    Costs,
    HowItWorks,
    CallRequest,
    PoorDutch,
    ShortAcknowledgment,
    IdentityQuestion,
    NumberSource,
    Profession,
    General,
}

impl Intent {
    /// Intents that permanently end a conversation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Aggressive | Self::StopConversation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggressive => "aggressive",
            Self::StopConversation => "stop_conversation",
            Self::Greeting => "greeting",
            Self::Interest => "interest",
            Self::Rejection => "rejection",
            Self::Trust => "trust",
            Self::Costs => "costs",
            Self::HowItWorks => "how_it_works",
            Self::CallRequest => "call_request",
            Self::PoorDutch => "poor_dutch",
            Self::ShortAcknowledgment => "short_acknowledgment",
            Self::IdentityQuestion => "identity_question",
            Self::NumberSource => "number_source",
            Self::Profession => "profession",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let intent = match normalized.as_str() {
            "aggressive" => Self::Aggressive,
            "stop_conversation" | "stopconversation" | "stop" => Self::StopConversation,
            "greeting" => Self::Greeting,
            "interest" => Self::Interest,
            "rejection" => Self::Rejection,
            "trust" => Self::Trust,
            "costs" => Self::Costs,
            "how_it_works" | "howitworks" => Self::HowItWorks,
            "call_request" | "callrequest" => Self::CallRequest,
            "poor_dutch" | "poordutch" => Self::PoorDutch,
            "short_acknowledgment" | "shortacknowledgment" => Self::ShortAcknowledgment,
            "identity_question" | "identityquestion" => Self::IdentityQuestion,
            "number_source" | "numbersource" => Self::NumberSource,
            "profession" => Self::Profession,
            "general" => Self::General,
            other => return Err(format!("unknown intent '{other}'")),
        };
        Ok(intent)
    }
}

/// A single trigger: the intent it signals and the pattern that detects it.
#[derive(Debug, Clone)]
pub struct TriggerRule {
    pub intent: Intent,
    pub regex: Regex,
}

impl TriggerRule {
    fn new(intent: Intent, pattern: &str) -> Self {
        Self {
            intent,
            regex: Regex::new(pattern).unwrap(),
        }
    }
}

/// Profession keywords, shared with attribute extraction.
pub const PROFESSION_PATTERN: &str =
    r"(?i)(schilder|timmerman|loodgieter|dakdekker|aannemer|elektricien|installateur|stukadoor|klusjesman)";

/// Phrases that signal the contact would rather use simple Dutch.
pub const POOR_DUTCH_PATTERN: &str = r"(?i)(ik spreek|niet goed nederlands|slecht nederlands)";

/// Trigger rules in priority order.
static TRIGGER_RULES: LazyLock<Vec<TriggerRule>> = LazyLock::new(|| {
    vec![
        TriggerRule::new(
            Intent::Aggressive,
            r"(?i)(rot op|fuck|tering|kanker|kut|shit|verdomme|lul|eikel|mongool)",
        ),
        TriggerRule::new(
            Intent::StopConversation,
            r"(?i)(stop|niet meer bellen|laat me met rust|bel me niet|niet meer contact|meld me af|afmelden|unsubscribe|contact verboden|niet storen|wil niet praten|kappen|blokkeer|hou op|genoeg|klaar)",
        ),
        TriggerRule::new(
            Intent::Greeting,
            r"(?i)(hallo|hoi|hey|goedemorgen|goedemiddag|goedenavond|hi|dag)",
        ),
        TriggerRule::new(
            Intent::Interest,
            r"(?i)(interesse|aanmelden|opgeven|inschrijven|registreren|hoe werkt|meer info|klinkt goed|ik wil|vertel meer|kan ik|ontvangen|klussen|opdrachten)",
        ),
        TriggerRule::new(
            Intent::Rejection,
            r"(?i)(geen interesse|niet interessant|nee bedankt|nee dank|liever niet|nee|niet nodig|ik pas)",
        ),
        TriggerRule::new(
            Intent::Trust,
            r"(?i)(betrouwbaar|echt|oplichting|scam|werkt dit|is dit echt|nep|fraude)",
        ),
        TriggerRule::new(
            Intent::Costs,
            r"(?i)(wat kost|kost het|prijs|prijzen|betalen|tarief|kosten|hoeveel|duur|euro|geld|betaling)",
        ),
        TriggerRule::new(
            Intent::HowItWorks,
            r"(?i)(hoe werkt|uitleg|systeem|werkwijze|platform werking|hoe gaat|doe je|aanmeldproces)",
        ),
        TriggerRule::new(
            Intent::CallRequest,
            r"(?i)(bellen|telefonisch|gesprek|even praten|contact|telefoon)",
        ),
        TriggerRule::new(Intent::PoorDutch, POOR_DUTCH_PATTERN),
        TriggerRule::new(
            Intent::ShortAcknowledgment,
            r"(?i)^(ok|okay|oke|prima|goed|top|bedankt|dank je|thanks|ja|nee)$",
        ),
        TriggerRule::new(
            Intent::IdentityQuestion,
            r"(?i)(wie is dit|wie ben je|wie ben jij|met wie spreek ik|wie ben)",
        ),
        TriggerRule::new(
            Intent::NumberSource,
            r"(?i)(hoe kom je aan|waar heb je|mijn nummer|nummer vandaan|gegevens|contact|hebt gevonden)",
        ),
        TriggerRule::new(Intent::Profession, PROFESSION_PATTERN),
    ]
});

/// The active trigger table, highest priority first.
pub fn trigger_rules() -> &'static [TriggerRule] {
    &TRIGGER_RULES
}

/// Classify a message. Unmatched text is [`Intent::General`].
pub fn classify(text: &str) -> Intent {
    let normalized = text.trim().to_lowercase();

    let intent = trigger_rules()
        .iter()
        .find(|rule| rule.regex.is_match(&normalized))
        .map(|rule| rule.intent)
        .unwrap_or(Intent::General);

    debug!(intent = %intent, "Classified inbound message");
    intent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_question() {
        assert_eq!(classify("Wat kost het per maand?"), Intent::Costs);
        assert_eq!(classify("  HOEVEEL moet ik betalen  "), Intent::Costs);
    }

    #[test]
    fn test_greeting_beats_costs() {
        assert_eq!(classify("hallo, wat kost het?"), Intent::Greeting);
    }

    #[test]
    fn test_aggressive_beats_stop() {
        assert_eq!(classify("rot op en stop met appen"), Intent::Aggressive);
    }

    #[test]
    fn test_stop_requests() {
        assert_eq!(classify("stop"), Intent::StopConversation);
        assert_eq!(classify("Laat me met rust"), Intent::StopConversation);
        assert_eq!(classify("afmelden graag"), Intent::StopConversation);
    }

    #[test]
    fn test_unanchored_matches_inside_words() {
        // "dag" inside "maandag" makes this a greeting.
        assert_eq!(classify("maandag lukt niet"), Intent::Greeting);
        // "hi" inside "machine" does too.
        assert_eq!(classify("welke machine gebruik je"), Intent::Greeting);
    }

    #[test]
    fn test_interest_beats_how_it_works() {
        assert_eq!(classify("hoe werkt het precies?"), Intent::Interest);
    }

    #[test]
    fn test_rejection() {
        assert_eq!(classify("liever niet"), Intent::Rejection);
        // Short "nee" hits the rejection rule before the acknowledgment rule.
        assert_eq!(classify("nee"), Intent::Rejection);
    }

    #[test]
    fn test_short_acknowledgment_is_anchored() {
        assert_eq!(classify("prima"), Intent::ShortAcknowledgment);
        assert_eq!(classify("ok"), Intent::ShortAcknowledgment);
        assert_eq!(classify("prima, maar"), Intent::General);
    }

    #[test]
    fn test_identity_and_number_source() {
        assert_eq!(classify("met wie spreek ik?"), Intent::IdentityQuestion);
        assert_eq!(classify("waar heb je mijn nummer vandaan?"), Intent::NumberSource);
    }

    #[test]
    fn test_profession_and_general() {
        assert_eq!(classify("ik ben loodgieter"), Intent::Profession);
        assert_eq!(classify("zzp'er sinds 2010"), Intent::General);
        assert_eq!(classify(""), Intent::General);
    }

    #[test]
    fn test_table_order() {
        let order: Vec<Intent> = trigger_rules().iter().map(|r| r.intent).collect();
        assert_eq!(order.first(), Some(&Intent::Aggressive));
        assert_eq!(order.last(), Some(&Intent::Profession));
        assert_eq!(order.len(), 14);
    }

    #[test]
    fn test_terminal_intents() {
        assert!(Intent::Aggressive.is_terminal());
        assert!(Intent::StopConversation.is_terminal());
        assert!(!Intent::Rejection.is_terminal());
    }

    #[test]
    fn test_parse_intent_names() {
        assert_eq!("howItWorks".parse::<Intent>(), Ok(Intent::HowItWorks));
        assert_eq!("call_request".parse::<Intent>(), Ok(Intent::CallRequest));
        assert_eq!("Number-Source".parse::<Intent>(), Ok(Intent::NumberSource));
        assert!("weather".parse::<Intent>().is_err());
    }
}
