//! Persona presets
//!
//! A persona selects the system prompt prepended to every chat request.
//! Unknown persona identifiers fall back to [`Persona::General`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;
use crate::Error;

/// Conversational style of the assistant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    General,
    Storyteller,
    Comedian,
    Bible,
}

impl Persona {
    /// Every available persona, in display order
    pub const ALL: [Self; 4] = [
        Self::General,
        Self::Storyteller,
        Self::Comedian,
        Self::Bible,
    ];

    /// Stable identifier used on the wire and in settings
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Storyteller => "storyteller",
            Self::Comedian => "comedian",
            Self::Bible => "bible",
        }
    }

    /// System prompt injected ahead of the conversation
    #[must_use]
    pub const fn system_prompt(self) -> &'static str {
        match self {
            Self::General => "Du bist ein hilfreicher und freundlicher Assistent.",
            Self::Storyteller => {
                "Du bist ein unterhaltsamer Geschichtenerzähler. Erzähle kurze, spannende Geschichten."
            }
            Self::Comedian => {
                "Du bist ein freundlicher Comedian. Erzähle Witze und bringe die Leute zum Lachen."
            }
            Self::Bible => {
                "Du bist ein Bibel-Experte. Erzähle biblische Geschichten auf zugängliche Weise."
            }
        }
    }

    /// System message carrying this persona's prompt
    #[must_use]
    pub fn system_message(self) -> ChatMessage {
        ChatMessage::system(self.system_prompt())
    }

    /// Look up a persona by identifier
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }

    /// Resolve a caller-supplied identifier, falling back to the general persona
    #[must_use]
    pub fn resolve(id: Option<&str>) -> Self {
        match id {
            Some(id) => Self::from_id(id).unwrap_or_else(|| {
                tracing::debug!(persona = %id, "unknown persona, using general");
                Self::General
            }),
            None => Self::General,
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Persona {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| Error::Validation(format!("unknown persona: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn known_ids_round_trip() {
        for persona in Persona::ALL {
            assert_eq!(Persona::from_id(persona.id()), Some(persona));
            assert_eq!(persona.to_string().parse::<Persona>().unwrap(), persona);
        }
    }

    #[test]
    fn unknown_or_absent_ids_fall_back_to_general() {
        for id in ["", "pirate", "Storyteller", "GENERAL", "bible "] {
            assert_eq!(Persona::resolve(Some(id)), Persona::General, "id {id:?}");
        }
        assert_eq!(Persona::resolve(None), Persona::General);
    }

    #[test]
    fn each_persona_has_its_own_prompt() {
        assert!(Persona::Storyteller.system_prompt().contains("Geschichtenerzähler"));
        assert!(Persona::Comedian.system_prompt().contains("Comedian"));
        assert!(Persona::Bible.system_prompt().contains("Bibel"));
        assert!(Persona::General.system_prompt().contains("Assistent"));

        let message = Persona::Comedian.system_message();
        assert_eq!(message.role, Role::System);
        assert_eq!(message.content, Persona::Comedian.system_prompt());
    }

    #[test]
    fn serializes_as_lowercase_id() {
        let json = serde_json::to_string(&Persona::Storyteller).unwrap();
        assert_eq!(json, "\"storyteller\"");
        let parsed: Persona = serde_json::from_str("\"bible\"").unwrap();
        assert_eq!(parsed, Persona::Bible);
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!("pirate".parse::<Persona>().is_err());
    }

    #[test]
    fn parse_and_resolve_agree_on_padded_ids() {
        for id in [" bible", "tutor ", " storyteller "] {
            assert!(id.parse::<Persona>().is_err(), "id {id:?}");
            assert_eq!(Persona::resolve(Some(id)), Persona::General);
        }
    }
}
