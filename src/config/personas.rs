//! Persona registry
//!
//! Every persona pairs display metadata with the system prompt that conditions
//! the model. Six personas are built in; more can be added (or built-ins
//! overridden) by dropping TOML files into a personas directory at startup.
//!
//! # Example Persona File
//!
//! ```toml
//! [persona]
//! id = "nahida"
//! name = "Nahida"
//! personality = "Dendro Archon, Curious and Wise"
//!
//! [system_prompt]
//! content = """
//! You are Nahida, the Dendro Archon...
//! """
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// A character profile available for chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Persona {
    /// Unique key used by clients (e.g. "raiden-shogun")
    pub id: String,

    /// Display name
    pub name: String,

    /// Short tagline shown next to the name
    pub personality: String,

    /// System prompt sent as the first transcript entry
    #[serde(skip_serializing)]
    pub system_prompt: String,
}

/// On-disk persona definition
#[derive(Debug, Clone, Deserialize)]
pub struct PersonaFile {
    pub persona: PersonaInfo,
    pub system_prompt: SystemPrompt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonaInfo {
    /// Defaults to the file stem when omitted
    #[serde(default)]
    pub id: Option<String>,

    pub name: String,

    #[serde(default)]
    pub personality: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemPrompt {
    pub content: String,
}

impl PersonaFile {
    /// Load a persona definition from a file path
    pub async fn load_from_file(path: &Path) -> Result<Persona, PersonaError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PersonaError::IoError(e.to_string()))?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        Self::parse(&content, &stem)
    }

    /// Parse a persona definition, using `fallback_id` when the file has no id
    pub fn parse(content: &str, fallback_id: &str) -> Result<Persona, PersonaError> {
        let file: PersonaFile =
            toml::from_str(content).map_err(|e| PersonaError::ParseError(e.to_string()))?;

        let id = file
            .persona
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| fallback_id.to_string());

        if id.is_empty() {
            return Err(PersonaError::Invalid("persona id is empty".to_string()));
        }

        let system_prompt = file.system_prompt.content.trim().to_string();
        if system_prompt.is_empty() {
            return Err(PersonaError::Invalid(format!(
                "persona '{}' has an empty system prompt",
                id
            )));
        }

        Ok(Persona {
            id,
            name: file.persona.name,
            personality: file.persona.personality,
            system_prompt,
        })
    }
}

/// Immutable-after-startup lookup of personas by id, in registration order
#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
}

impl PersonaRegistry {
    /// Registry holding only the built-in personas
    pub fn builtin() -> Self {
        Self::from_personas(builtin::personas())
    }

    pub fn from_personas(personas: Vec<Persona>) -> Self {
        let mut registry = Self::default();
        for persona in personas {
            registry.insert(persona);
        }
        registry
    }

    /// Add a persona, replacing any existing one with the same id in place
    pub fn insert(&mut self, persona: Persona) {
        match self.personas.iter_mut().find(|p| p.id == persona.id) {
            Some(existing) => *existing = persona,
            None => self.personas.push(persona),
        }
    }

    /// Load every `*.toml` file in `dir`, returning how many were registered
    pub async fn load_dir(&mut self, dir: &Path) -> Result<usize, PersonaError> {
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| PersonaError::IoError(e.to_string()))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersonaError::IoError(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "toml") {
                paths.push(path);
            }
        }
        // Directory iteration order is platform dependent
        paths.sort();

        for path in &paths {
            let persona = PersonaFile::load_from_file(path).await?;
            tracing::debug!(id = %persona.id, path = %path.display(), "Loaded persona");
            self.insert(persona);
        }

        Ok(paths.len())
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Look up a persona, falling back to the first registered one
    pub fn get_or_default(&self, id: &str) -> Option<&Persona> {
        self.get(id).or_else(|| self.personas.first())
    }

    pub fn ids(&self) -> Vec<&str> {
        self.personas.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

/// Errors from persona loading
#[derive(Debug, thiserror::Error)]
pub enum PersonaError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid persona: {0}")]
    Invalid(String),
}

/// Built-in personas that don't require files
pub mod builtin {
    use super::Persona;

    pub const RAIDEN_SHOGUN: &str = r#"You are Raiden Shogun, the Electro Archon and ruler of Inazuma. You speak with authority and wisdom, often referencing eternity, order, and your pursuit of an unchanging nation. You are formal, composed, and sometimes philosophical. You care deeply about your people but can be stern when discussing matters of governance. You occasionally reference your past as Ei and your relationship with her ideals of eternity. Keep responses conversational and engaging."#;

    pub const HOSHIMI_MIYABI: &str = r#"You are Hoshimi Miyabi, a skilled Void Hunter from Section 6. You are calm, collected, and speak with a measured tone. You have a mysterious aura and tend to be somewhat reserved but caring towards those you trust. You're professional in your duties but show a softer side to friends. You often reference your work with Hollows and the importance of protecting New Eridu. Keep responses conversational and engaging."#;

    pub const SAKI_AYASE: &str = r#"You are Saki Ayase, a dedicated and cheerful maid. You are polite, caring, and always eager to help. You speak with respect and often use formal language, addressing others politely. You take pride in your work and are always looking for ways to make others comfortable and happy. You're optimistic and kind-hearted, with a gentle personality. Keep responses conversational and engaging."#;

    pub const COLUMBINA: &str = r#"You are Columbina, the 3rd of the Fatui Harbingers, known as "Damselette." You are mysterious, ethereal, and often speak in a dreamy, almost otherworldly manner. You have a childlike innocence mixed with an underlying sense of danger. You're unpredictable and often say things that seem innocent but carry deeper meanings. You enjoy music and have an angelic appearance that contrasts with your Harbinger status. You speak softly and sometimes hum or reference melodies. Keep responses conversational and engaging."#;

    pub const SAGIRI: &str = r#"You are Sagiri, a member of the Yamada Asaemon clan and skilled executioner from Hell's Paradise. You are stoic, determined, and have a strong sense of justice. You speak with conviction and rarely show emotion, but you care deeply about doing what's right. You're skilled in swordsmanship and have a no-nonsense attitude. You value honor and duty above all else, and you're not afraid to make difficult decisions. You speak directly and with purpose. Keep responses conversational and engaging."#;

    pub const ARLECCHINO: &str = r#"You are Arlecchino, the 4th of the Fatui Harbingers, known as "The Knave." You are calculating, elegant, and speak with sophisticated authority. You run the House of the Hearth orphanage and care for children, showing a softer side beneath your cold exterior. You're intelligent, strategic, and always thinking several steps ahead. You have a refined manner of speaking and can be both nurturing and intimidating. You address others with respect but maintain your authority. Keep responses conversational and engaging."#;

    fn persona(id: &str, name: &str, personality: &str, system_prompt: &str) -> Persona {
        Persona {
            id: id.to_string(),
            name: name.to_string(),
            personality: personality.to_string(),
            system_prompt: system_prompt.to_string(),
        }
    }

    /// The built-in personas, first one is the default
    pub fn personas() -> Vec<Persona> {
        vec![
            persona(
                "raiden-shogun",
                "Raiden Shogun",
                "Electro Archon, Eternal and Unwavering",
                RAIDEN_SHOGUN,
            ),
            persona(
                "hoshimi-miyabi",
                "Hoshimi Miyabi",
                "Void Hunter, Calm and Mysterious",
                HOSHIMI_MIYABI,
            ),
            persona("saki-ayase", "Saki Ayase", "Cheerful and Devoted Maid", SAKI_AYASE),
            persona(
                "columbina",
                "Columbina",
                "Damselette, Mysterious and Ethereal",
                COLUMBINA,
            ),
            persona(
                "sagiri",
                "Sagiri",
                "Yamada Asaemon, Stoic and Determined",
                SAGIRI,
            ),
            persona(
                "arlecchino",
                "Arlecchino",
                "The Knave, Calculating and Elegant",
                ARLECCHINO,
            ),
        ]
    }
}
