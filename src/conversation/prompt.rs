//! Persona prompt and transcript assembly for generated replies.

use std::fmt::Write;

use super::state::{ConversationState, ConversationTurn};
use crate::config::ResponderConfig;
use crate::llm::ChatMessage;
use crate::templates::BusinessFacts;

/// Exchanges quoted verbatim in the conversation summary.
const RECENT_TURNS: usize = 4;

const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Short Dutch overview of a conversation, embedded in the system prompt.
pub fn conversation_summary(state: Option<&ConversationState>, persona_name: &str) -> String {
    let Some(state) = state.filter(|s| !s.turns.is_empty()) else {
        return "Geen eerdere conversaties.".to_string();
    };

    let profession = match &state.attributes.profession {
        Some(p) => format!("Vakgebied: {p}"),
        None => "Vakgebied nog onbekend".to_string(),
    };
    let topics = if state.topics.is_empty() {
        "Nog geen specifieke onderwerpen besproken".to_string()
    } else {
        let list: Vec<&str> = state.topics.iter().map(String::as_str).collect();
        format!("Besproken onderwerpen: {}", list.join(", "))
    };

    let skip = state.turns.len().saturating_sub(RECENT_TURNS);
    let recent: Vec<String> = state
        .turns
        .iter()
        .skip(skip)
        .map(|turn| format!("Klant: {}\n{persona_name}: {}", turn.inbound, turn.outbound))
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "--- Conversatie Overzicht ---");
    let _ = writeln!(out, "Eerste contact: {}", state.first_contact.format(TIMESTAMP_FORMAT));
    let _ = writeln!(
        out,
        "Laatste interactie: {}",
        state.last_interaction.format(TIMESTAMP_FORMAT)
    );
    let _ = writeln!(out, "Fase: {}", state.stage());
    let _ = writeln!(out, "{profession}");
    let _ = writeln!(out, "{topics}");
    let _ = writeln!(out, "Taalvoorkeur: {}", state.language_preference);
    let _ = writeln!(out, "Totaal berichten: {}", state.turns.len());
    let _ = writeln!(out);
    let _ = writeln!(out, "--- Recente berichten ---");
    out.push_str(&recent.join("\n\n"));
    out
}

/// The persona instructions, business facts and conversation summary.
pub fn build_system_prompt(config: &ResponderConfig, facts: &BusinessFacts, summary: &str) -> String {
    let name = &config.persona_name;
    let company = &facts.company_name;

    format!(
        "Je bent {name}, een vriendelijke, nuchtere medewerker bij {company}. Je praat luchtig en in simpele taal. \
Je stuurt WhatsApp-berichten naar vakmensen zoals schilders, timmermannen, dakdekkers, stukadoors, enzovoort.

BELANGRIJKE INSTRUCTIES:
1. Je bent NOOIT een AI of digitale assistent, je bent gewoon {name} die bij {company} werkt
2. Spreek ALTIJD in simpel Nederlands
3. Gebruik GEEN moeilijke woorden
4. Gebruik GEEN verkooppraatjes
5. Houd berichten kort en duidelijk
6. Gebruik alleen complete links, geen knoppen
7. Als iemand vraagt wie dit is, zeg je alleen dat je {name} bent van {company}

CONVERSATIE HISTORIE:
{summary}

OVER ONS PLATFORM:
- Wij ontvangen dagelijks {per_day} van klanten die een vakman zoeken
- Vakmensen ontvangen {per_week}
- Elke klusaanvraag gaat naar {per_request}
- Als je wordt gevraagd hoe je aan hun nummer komt, zeg je dat je het via KvK of via internet hebt gevonden

HOE HET WERKT:
1. Aanmelden: via {signup}
2. Kosten: {fee}
3. Je ontvangt contactgegevens van klanten die een klus hebben
4. Je maakt je eigen offerte en stuurt deze naar de klant
5. Als de klus doorgaat, betaal je {commission}

WANNEER BELLEN AANBIEDEN:
Als de vakman twijfelt of zelf om een belafspraak vraagt, zeg dan: \"Ik kan ook even met je bellen als je dat makkelijker vindt, laat maar weten.\"

TOON: {tone}

BELANGRIJK: Stel jezelf maar één keer voor (aan het begin), tenzij er specifiek naar gevraagd wordt. Geen proefperiode aanbieden, dit bestaat niet.",
        per_day = facts.requests_per_day,
        per_week = facts.requests_per_week,
        per_request = facts.professionals_per_request,
        signup = facts.signup_link,
        fee = facts.monthly_fee,
        commission = facts.commission,
        tone = config.persona_tone,
    )
}

/// System prompt, prior turns as user/assistant pairs, then the new message.
pub fn build_transcript<'a>(
    system_prompt: &str,
    turns: impl IntoIterator<Item = &'a ConversationTurn>,
    new_message: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];
    for turn in turns {
        messages.push(ChatMessage::user(&turn.inbound));
        messages.push(ChatMessage::assistant(&turn.outbound));
    }
    messages.push(ChatMessage::user(new_message));
    messages
}
