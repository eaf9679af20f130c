//! Static catalog of avatars.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Avatar {
    pub id: &'static str,
    pub emoji: &'static str,
    pub label: &'static str,
}

static AVATARS: &[Avatar] = &[
    Avatar { id: "bear", emoji: "\u{1F43B}", label: "Bear" },
    Avatar { id: "cat", emoji: "\u{1F431}", label: "Cat" },
    Avatar { id: "dog", emoji: "\u{1F436}", label: "Dog" },
    Avatar { id: "fox", emoji: "\u{1F98A}", label: "Fox" },
    Avatar { id: "koala", emoji: "\u{1F428}", label: "Koala" },
    Avatar { id: "lion", emoji: "\u{1F981}", label: "Lion" },
    Avatar { id: "monkey", emoji: "\u{1F435}", label: "Monkey" },
    Avatar { id: "owl", emoji: "\u{1F989}", label: "Owl" },
    Avatar { id: "panda", emoji: "\u{1F43C}", label: "Panda" },
    Avatar { id: "penguin", emoji: "\u{1F427}", label: "Penguin" },
    Avatar { id: "rabbit", emoji: "\u{1F430}", label: "Rabbit" },
    Avatar { id: "tiger", emoji: "\u{1F42F}", label: "Tiger" },
    Avatar { id: "unicorn", emoji: "\u{1F984}", label: "Unicorn" },
    Avatar { id: "whale", emoji: "\u{1F433}", label: "Whale" },
    Avatar { id: "wolf", emoji: "\u{1F43A}", label: "Wolf" },
    Avatar { id: "octopus", emoji: "\u{1F419}", label: "Octopus" },
];

pub fn all() -> &'static [Avatar] {
    AVATARS
}

pub fn get(id: &str) -> Option<&'static Avatar> {
    AVATARS.iter().find(|a| a.id == id)
}

pub fn valid(id: &str) -> bool {
    get(id).is_some()
}
