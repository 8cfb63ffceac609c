//! Static word-category and avatar catalogs.
//!
//! Catalogs are immutable inputs supplied by the embedding application; the
//! state machine only ever reads them. A built-in Spanish set is provided so
//! the crate is playable out of the box.

use serde::{Deserialize, Serialize};

/// Identifier of a word category inside the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub String);

impl CategoryId {
    /// Build a category id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference into the avatar catalog carried by each player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvatarId(pub u32);

/// Clue strings attached to a word, by difficulty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordClues {
    /// Clue handed out in the default clue mode.
    pub easy: String,
    /// Harder alternative kept for embedders that want it.
    pub hard: String,
}

/// A single entry in a category's word list.
///
/// Plain entries carry just the secret word; rich entries additionally carry
/// a decoy for confusion mode and clues for clue mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WordEntry {
    /// Bare secret word with no decoy or clues.
    Plain(String),
    /// Structured word record.
    Rich {
        /// The secret word itself.
        word: String,
        /// Similar-but-different decoy word shown to impostors in confusion mode.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        similar: Option<String>,
        /// Clues about the secret word, given to impostors in clue mode.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clues: Option<WordClues>,
    },
}

impl WordEntry {
    /// The secret word carried by this entry.
    pub fn word(&self) -> &str {
        match self {
            WordEntry::Plain(word) => word,
            WordEntry::Rich { word, .. } => word,
        }
    }

    /// Decoy word for confusion mode, when the entry has one.
    pub fn similar(&self) -> Option<&str> {
        match self {
            WordEntry::Plain(_) => None,
            WordEntry::Rich { similar, .. } => similar.as_deref(),
        }
    }

    /// Clue for clue mode, when the entry has one.
    pub fn clue(&self) -> Option<&str> {
        match self {
            WordEntry::Plain(_) => None,
            WordEntry::Rich { clues, .. } => clues.as_ref().map(|c| c.easy.as_str()),
        }
    }
}

/// A themed word list selectable in the room settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Stable identifier referenced by `Room::selected_categories`.
    pub id: CategoryId,
    /// Human readable display name.
    pub name: String,
    /// Words the secret word is drawn from.
    pub words: Vec<WordEntry>,
}

/// Avatar entry consumed read-only by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    /// Stable identifier referenced by `Player::avatar`.
    pub id: AvatarId,
    /// Human readable display name.
    pub name: String,
    /// Image reference resolved by the embedding UI.
    pub image: String,
}

/// Read-only catalog bundle handed to the engine at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// All selectable word categories.
    pub categories: Vec<Category>,
    /// All selectable avatars.
    pub avatars: Vec<Avatar>,
}

impl Catalog {
    /// Ids of every category in catalog order.
    pub fn category_ids(&self) -> Vec<CategoryId> {
        self.categories.iter().map(|c| c.id.clone()).collect()
    }

    /// Look up a category by id.
    pub fn category(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|c| &c.id == id)
    }

    /// The built-in Spanish catalog.
    pub fn builtin() -> Self {
        Self {
            categories: builtin_categories(),
            avatars: builtin_avatars(),
        }
    }
}

fn plain_category(id: &str, name: &str, words: &[&str]) -> Category {
    Category {
        id: CategoryId::new(id),
        name: name.to_owned(),
        words: words
            .iter()
            .map(|word| WordEntry::Plain((*word).to_owned()))
            .collect(),
    }
}

fn builtin_categories() -> Vec<Category> {
    vec![
        plain_category(
            "animales",
            "Animales",
            &[
                "perro", "gato", "elefante", "león", "tigre", "jirafa", "cebra", "mono", "oso",
                "lobo",
            ],
        ),
        plain_category(
            "comida",
            "Comida",
            &[
                "pizza",
                "hamburguesa",
                "tacos",
                "sushi",
                "pasta",
                "helado",
                "ensalada",
                "sopa",
                "sandwich",
                "burrito",
            ],
        ),
        plain_category(
            "deportes",
            "Deportes",
            &[
                "fútbol",
                "basketball",
                "tenis",
                "voleibol",
                "natación",
                "atletismo",
                "boxeo",
                "ciclismo",
                "golf",
                "hockey",
            ],
        ),
        plain_category(
            "profesiones",
            "Profesiones",
            &[
                "doctor",
                "ingeniero",
                "profesor",
                "chef",
                "policía",
                "bombero",
                "abogado",
                "arquitecto",
                "programador",
                "artista",
            ],
        ),
        plain_category(
            "paises",
            "Países",
            &[
                "México",
                "España",
                "Argentina",
                "Brasil",
                "Francia",
                "Italia",
                "Japón",
                "Alemania",
                "China",
                "India",
            ],
        ),
        plain_category(
            "objetos",
            "Objetos",
            &[
                "silla",
                "mesa",
                "lámpara",
                "libro",
                "reloj",
                "teléfono",
                "computadora",
                "bolígrafo",
                "llave",
                "botella",
            ],
        ),
    ]
}

fn builtin_avatars() -> Vec<Avatar> {
    (1..=18)
        .map(|n| Avatar {
            id: AvatarId(n),
            name: format!("Avatar {n}"),
            image: format!("avatars/avatar{n}.png"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_six_categories_of_ten_words() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.categories.len(), 6);
        for category in &catalog.categories {
            assert_eq!(category.words.len(), 10, "category {}", category.id);
        }
        assert_eq!(catalog.avatars.len(), 18);
    }

    #[test]
    fn word_entries_deserialize_plain_and_rich() {
        let json = r#"[
            "perro",
            {"word": "gato", "similar": "lince", "clues": {"easy": "maúlla", "hard": "bigotes"}}
        ]"#;
        let words: Vec<WordEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(words[0].word(), "perro");
        assert_eq!(words[0].similar(), None);
        assert_eq!(words[1].word(), "gato");
        assert_eq!(words[1].similar(), Some("lince"));
        assert_eq!(words[1].clue(), Some("maúlla"));
    }
}
