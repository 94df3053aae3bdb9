//! Message templates: outreach by category, canned replies by intent,
//! opening lines, and the business facts used in prompts.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::conversation::Intent;

/// Reply used whenever the generative responder fails.
pub const FALLBACK_REPLY: &str =
    "Sorry, ik kan je bericht nu even niet goed verwerken. Kun je het nog een keer proberen?";

/// Marker in the interest reply before which a profession sentence is inserted.
const INTEREST_INSERT_MARKER: &str = "Wij krijgen dagelijks";

/// Facts about the business, quoted in the persona prompt and some replies.
#[derive(Debug, Clone)]
pub struct BusinessFacts {
    pub company_name: String,
    pub signup_link: String,
    pub monthly_fee: String,
    pub commission: String,
    pub requests_per_day: String,
    pub requests_per_week: String,
    pub professionals_per_request: String,
    /// Profession (lower-case) → sentence about available work.
    pub profession_messages: HashMap<String, String>,
}

impl Default for BusinessFacts {
    fn default() -> Self {
        let profession_messages = [
            ("schilder", "Wij hebben dagelijks nieuwe schilderklussen beschikbaar. Binnen- en buitenschilderwerk."),
            ("timmerman", "Wij krijgen veel klussen voor timmermannen. Van vloeren tot dakconstructies."),
            ("dakdekker", "Er komen regelmatig opdrachten binnen voor dakdekkers. Zowel reparaties als complete daken."),
            ("stukadoor", "We hebben regelmatig klanten die een stukadoor zoeken voor wanden en plafonds."),
            ("loodgieter", "Er zijn vaak loodgietersklussen zoals badkamers, lekkages en cv-installaties."),
            ("elektricien", "We hebben vaak klanten die een elektricien zoeken voor installaties en storingen."),
            ("aannemer", "Er komen dagelijks aanvragen binnen voor complete renovaties en verbouwingen."),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            company_name: "Een Vakman Nodig B.V.".to_string(),
            signup_link: "https://eenvakmannodig.nl/aanmelden".to_string(),
            monthly_fee: "€100 per maand".to_string(),
            commission: "2% commissie per geslaagde klus".to_string(),
            requests_per_day: "200-300 aanvragen dagelijks".to_string(),
            requests_per_week: "gemiddeld 10 aanvragen per week".to_string(),
            professionals_per_request: "maximaal 3 vakmensen per klusaanvraag".to_string(),
            profession_messages,
        }
    }
}

/// All text the system sends without asking the generative responder.
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    /// Category key (lower-case, trimmed) → first outbound message.
    outreach: HashMap<String, String>,
    default_outreach: String,
    canned: HashMap<Intent, Vec<String>>,
    opening: Vec<String>,
}

impl MessageTemplates {
    pub fn new(
        outreach: HashMap<String, String>,
        default_outreach: impl Into<String>,
        canned: HashMap<Intent, Vec<String>>,
        opening: Vec<String>,
    ) -> Self {
        let outreach = outreach
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
        Self {
            outreach,
            default_outreach: default_outreach.into(),
            canned,
            opening,
        }
    }

    /// Outreach text for a category: exact (case-insensitive) match, else default.
    pub fn outreach_for(&self, category: &str) -> &str {
        let key = category.trim().to_lowercase();
        self.outreach
            .get(&key)
            .map(String::as_str)
            .unwrap_or(&self.default_outreach)
    }

    /// Whether a category has its own outreach template.
    pub fn has_outreach(&self, category: &str) -> bool {
        self.outreach.contains_key(&category.trim().to_lowercase())
    }

    pub fn opening_messages(&self) -> &[String] {
        &self.opening
    }

    /// A uniformly chosen opening message.
    pub fn random_opening<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.opening.choose(rng).map(String::as_str)
    }

    /// Canned replies for an intent, empty when none are configured.
    pub fn canned_replies(&self, intent: Intent) -> &[String] {
        self.canned.get(&intent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A random canned reply for an intent.
    ///
    /// For [`Intent::Interest`] a profession sentence from `facts` is inserted
    /// when the contact's profession is known.
    pub fn canned_reply<R: Rng + ?Sized>(
        &self,
        intent: Intent,
        profession: Option<&str>,
        facts: &BusinessFacts,
        rng: &mut R,
    ) -> Option<String> {
        let base = self.canned_replies(intent).choose(rng)?;

        if intent != Intent::Interest {
            return Some(base.clone());
        }

        let profession_message = profession
            .map(str::to_lowercase)
            .and_then(|p| facts.profession_messages.get(&p));

        match profession_message {
            Some(sentence) if base.contains(INTEREST_INSERT_MARKER) => Some(base.replacen(
                INTEREST_INSERT_MARKER,
                &format!("{sentence}\n\n{INTEREST_INSERT_MARKER}"),
                1,
            )),
            _ => Some(base.clone()),
        }
    }
}

fn owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

impl Default for MessageTemplates {
    fn default() -> Self {
        let outreach = [
            ("dakdekker", "Hoi! We zoeken nog 5 dakdekkers voor Een Vakman Nodig. Je werkt zelfstandig, betaalt €100 p/m en 2% commissie bij geslaagde klussen. Geen testfase, maar direct aanvragen. Doe je mee? eenvakmannodig.nl"),
            ("schilder", "Ben jij schilder en wil je meer opdrachten? Bij Een Vakman Nodig betaal je €100 per maand + 2% commissie per geslaagde klus. Geen limiet op aanvragen. Sluit je aan via eenvakmannodig.nl"),
            ("stucadoor", "We zoeken nog stukadoors voor ons platform Een Vakman Nodig. Je betaalt €100 p/m + 2% commissie. Daarvoor krijg je onbeperkt aanvragen. Je werkt zelfstandig en direct met klanten. Interesse? eenvakmannodig.nl"),
            ("klusjesman", "Werk je als klusjesman? Bij Een Vakman Nodig betaal je €100 p/m en 2% commissie. Je krijgt onbeperkt aanvragen en betaalt alleen bij succes. Geen opstart, direct aan de slag: eenvakmannodig.nl"),
            ("timmerman", "Hoi! Ben je timmerman en zoek je meer opdrachten? Bij Een Vakman Nodig betaal je €100 p/m en 2% commissie bij geslaagde klussen. Onbeperkt aanvragen voor diverse timmerwerken. Interesse? eenvakmannodig.nl"),
            ("elektricien", "Werk je als elektricien en wil je meer klussen? Bij Een Vakman Nodig betaal je €100 p/m en 2% commissie (min. €50) bij succes. Ontvang dagelijks nieuwe aanvragen in jouw regio. Meer info: eenvakmannodig.nl"),
            ("loodgieter", "Hoi! Als loodgieter kun je je aansluiten bij Een Vakman Nodig. Je betaalt €100 p/m en 2% commissie bij succes. Dagelijks nieuwe opdrachten voor loodgieterswerk. Interesse? Kijk op eenvakmannodig.nl"),
            ("tegelzetter", "Ben je tegelzetter? Een Vakman Nodig zoekt vakmensen zoals jij! Voor €100 p/m en 2% commissie krijg je direct toegang tot klanten die een tegelzetter zoeken. Geen tussenpersonen. Aanmelden: eenvakmannodig.nl"),
            ("aannemer", "Hoi! Als aannemer kun je via Een Vakman Nodig nieuwe projecten vinden. €100 p/m en 2% commissie bij succes. Wij brengen je direct in contact met klanten die een aannemer zoeken. Info: eenvakmannodig.nl"),
            ("cv-monteur", "Werk je als cv-monteur? Bij Een Vakman Nodig vind je nieuwe klanten voor €100 p/m en 2% commissie bij geslaagde klussen. Onbeperkte aanvragen, direct contact met klanten. Info: eenvakmannodig.nl"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let default_outreach = "Hoi! Als vakman kun je je nu aansluiten bij Een Vakman Nodig. Je betaalt €100 p/m en 2% commissie bij geslaagde klussen. Onbeperkt aanvragen, geen testfase. Meer info: eenvakmannodig.nl";

        let mut canned = HashMap::new();
        canned.insert(
            Intent::StopConversation,
            owned(&[
                "Geen probleem. Ik zal je niet meer berichten sturen. Als je ooit nog vragen hebt, weet je me te vinden!",
                "Begrepen, ik stop met berichten sturen. Fijne dag verder!",
                "Oké, dan laat ik je met rust. Bedankt voor je tijd.",
            ]),
        );
        canned.insert(
            Intent::Aggressive,
            owned(&[
                "Ik begrijp dat je niet geïnteresseerd bent. Ik zal je niet meer storen. Fijne dag verder!",
                "Het spijt me als ik je heb gestoord. Ik zal je niet meer berichten.",
            ]),
        );
        canned.insert(
            Intent::Interest,
            owned(&[
                "Goed om te horen dat je interesse hebt! Wij krijgen dagelijks 200-300 aanvragen van klanten die een vakman zoeken. Zo werkt het:\n\n• Je betaalt €100 p/m\n• Je krijgt contactgegevens van klanten met een klus\n• Je maakt zelf een offerte\n• Bij een geslaagde klus betaal je 2% commissie (min. €50)\n• Je krijgt ongeveer 10 klussen per week aangeboden\n\nWil je je aanmelden? Dat kan via: https://eenvakmannodig.nl/aanmelden",
            ]),
        );
        canned.insert(
            Intent::Costs,
            owned(&[
                "Over de kosten:\n\n• Je betaalt €100 per maand\n• Als je een klus krijgt, betaal je 2% commissie (minimaal €50)\n• Geen verborgen kosten\n• Geen kosten per lead, alleen bij succes\n\nJe verdient dit snel terug met de opdrachten die je krijgt!",
            ]),
        );
        canned.insert(
            Intent::HowItWorks,
            owned(&[
                "Zo werkt het bij Een Vakman Nodig:\n\n1. Klanten melden een klus aan bij ons\n2. Wij sturen deze naar maximaal 3 vakmensen zoals jij\n3. Je krijgt de contactgegevens van de klant\n4. Je belt de klant en maakt een afspraak\n5. Je maakt je eigen offerte\n6. Bij een geslaagde klus betaal je 2% commissie\n\nAanmelden kan via: https://eenvakmannodig.nl/aanmelden",
            ]),
        );
        canned.insert(
            Intent::CallRequest,
            owned(&[
                "Ik kan ook even met je bellen als je dat makkelijker vindt, laat maar weten welk telefoonnummer en wanneer het uitkomt.",
                "Natuurlijk kan ik je ook bellen om het persoonlijk toe te lichten. Wat is een goed moment en op welk nummer kan ik je bereiken?",
                "Als je liever telefonisch contact hebt, kan ik je bellen. Laat me weten wanneer het schikt en op welk nummer.",
            ]),
        );
        canned.insert(
            Intent::Rejection,
            owned(&[
                "Geen probleem! Bedankt voor je tijd. Als je in de toekomst meer klussen zoekt, weet je me te vinden.",
                "Oké, geen probleem. Mocht je later nog interesse hebben, kun je altijd contact opnemen.",
                "Begrijpelijk! Bedankt voor je reactie. De deur staat altijd open mocht je in de toekomst toch interesse hebben.",
            ]),
        );
        canned.insert(
            Intent::IdentityQuestion,
            owned(&[
                "Ik ben Sofia van EenVakmanNodig. Ik help vakmensen zoals jij aan meer klussen in jouw regio.",
                "Sofia hier, ik werk bij Een Vakman Nodig. We brengen vakmensen in contact met klanten die op zoek zijn naar hun diensten.",
                "Ik ben Sofia en werk voor Een Vakman Nodig, een platform dat vakmensen zoals jij helpt aan nieuwe klussen in jouw regio.",
            ]),
        );
        canned.insert(
            Intent::NumberSource,
            owned(&[
                "Ik heb je nummer via de KvK of via internet gevonden. We zoeken actief naar goede vakmensen zoals jij voor klussen die binnenkomen bij ons platform.",
                "Je nummer heb ik gevonden via openbare bronnen zoals de KvK. We zoeken naar vakmensen die we kunnen matchen met onze klusaanvragen.",
                "Ik heb je contactgegevens via openbare bronnen zoals de KvK of je website gevonden. We zijn altijd op zoek naar vakkundige professionals voor ons platform.",
            ]),
        );
        canned.insert(
            Intent::Trust,
            owned(&[
                "Een Vakman Nodig is een betrouwbaar platform met KvK-registratie (94683808). We werken transparant met duidelijke kosten en hebben al honderden vakmensen geholpen aan nieuwe klussen zonder verborgen kosten.",
                "Een Vakman Nodig is een officieel geregistreerd bedrijf bij de KvK. We werken met een transparant prijsmodel zonder verborgen kosten. Je bepaalt zelf welke aanvragen je accepteert en bent nooit verplicht een klus aan te nemen.",
            ]),
        );
        canned.insert(
            Intent::PoorDutch,
            owned(&[
                "Geen probleem! Ik zal eenvoudige taal gebruiken. Ons platform helpt vakmensen nieuwe klanten te vinden. Kosten: €100 per maand + kleine commissie bij succes. Interesse?",
                "Ik snap het. Ik zal het simpel houden. Een Vakman Nodig helpt vakmensen zoals jij aan nieuwe klanten. Kosten: €100 per maand en 2% bij succes. Interesse?",
            ]),
        );

        let opening = owned(&[
            "Hoi! Ik ben Sofia van EenVakmanNodig. Bent u schilder of werkt u in een ander vak in de bouw?",
            "Hallo! Sofia hier van EenVakmanNodig. Werkt u zelfstandig in de bouw of als vakman?",
            "Hey daar! Sofia hier. Ik werk bij EenVakmanNodig. Bent u vakman zoals timmerman of schilder?",
            "Hoi! Sofia van EenVakmanNodig. In welk vak werkt u? Ik zoek vakmensen zoals dakdekkers en stukadoors.",
        ]);

        Self::new(outreach, default_outreach, canned, opening)
    }
}
