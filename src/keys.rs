use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct KeySymbol(String);

impl KeySymbol {
    pub fn from_event(key: KeyEvent) -> Option<Self> {
        key_event_signature(key).map(Self)
    }

    pub fn parse(spec: &str) -> Option<Self> {
        normalize_hotkey_spec(spec).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KeySymbol {
    fn from(spec: &str) -> Self {
        Self::parse(spec).unwrap_or_else(|| Self(spec.trim().to_ascii_lowercase()))
    }
}

impl Display for KeySymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAction<A> {
    pub description: String,
    pub action: A,
    pub visible: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch<T> {
    Absorbed(T),
    Fallthrough(KeyEvent),
}

/// Trigger to action table for one dispatch layer. Binding an existing
/// trigger replaces it, so variants layer their bindings over a base set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyActions<A> {
    bindings: BTreeMap<KeySymbol, KeyAction<A>>,
}

impl<A> Default for KeyActions<A> {
    fn default() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }
}

impl<A: Clone> KeyActions<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(
        &mut self,
        key: impl Into<KeySymbol>,
        description: impl Into<String>,
        action: A,
        visible: bool,
    ) -> Option<KeyAction<A>> {
        self.bindings.insert(
            key.into(),
            KeyAction {
                description: description.into(),
                action,
                visible,
            },
        )
    }

    pub fn unbind(&mut self, key: impl Into<KeySymbol>) -> Option<KeyAction<A>> {
        self.bindings.remove(&key.into())
    }

    pub fn resolve(&self, key: &KeySymbol) -> Option<&KeyAction<A>> {
        self.bindings.get(key)
    }

    pub fn hints(&self) -> Vec<(&KeySymbol, &str)> {
        self.bindings
            .iter()
            .filter(|(_, action)| action.visible)
            .map(|(key, action)| (key, action.description.as_str()))
            .collect()
    }

    pub fn action_for(&self, key: KeyEvent) -> Option<A> {
        let symbol = KeySymbol::from_event(key)?;
        self.resolve(&symbol).map(|bound| bound.action.clone())
    }
}

pub fn key_event_signature(key: KeyEvent) -> Option<String> {
    let mut shift = key.modifiers.contains(KeyModifiers::SHIFT);
    let key_name = match key.code {
        KeyCode::Char(' ') => "space".to_string(),
        KeyCode::Char('+') => {
            shift = false;
            "plus".to_string()
        }
        KeyCode::Char(c) if c.is_ascii_uppercase() => {
            shift = true;
            c.to_ascii_lowercase().to_string()
        }
        KeyCode::Char(c) if c.is_alphabetic() => c.to_lowercase().to_string(),
        KeyCode::Char(c) => {
            // the shifted symbol already encodes the modifier
            shift = false;
            c.to_string()
        }
        KeyCode::Enter => "enter".to_string(),
        KeyCode::Tab => "tab".to_string(),
        KeyCode::BackTab => "backtab".to_string(),
        KeyCode::Backspace => "backspace".to_string(),
        KeyCode::Delete => "delete".to_string(),
        KeyCode::Insert => "insert".to_string(),
        KeyCode::Esc => "esc".to_string(),
        KeyCode::Left => "left".to_string(),
        KeyCode::Right => "right".to_string(),
        KeyCode::Up => "up".to_string(),
        KeyCode::Down => "down".to_string(),
        KeyCode::Home => "home".to_string(),
        KeyCode::End => "end".to_string(),
        KeyCode::PageUp => "pageup".to_string(),
        KeyCode::PageDown => "pagedown".to_string(),
        KeyCode::F(n) => format!("f{n}"),
        _ => return None,
    };

    let mut parts = Vec::new();
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        parts.push("ctrl".to_string());
    }
    if key.modifiers.contains(KeyModifiers::ALT) {
        parts.push("alt".to_string());
    }
    if shift {
        parts.push("shift".to_string());
    }
    parts.push(key_name);
    Some(parts.join("+"))
}

pub fn normalize_hotkey_spec(spec: &str) -> Option<String> {
    let mut ctrl = false;
    let mut alt = false;
    let mut shift = false;
    let mut key: Option<String> = None;

    for token in spec
        .split(['+', '-'])
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
    {
        match token.as_str() {
            "ctrl" | "control" => ctrl = true,
            "alt" => alt = true,
            "shift" => shift = true,
            _ => {
                key = normalize_hotkey_key_token(&token);
            }
        }
    }

    let key = key?;
    let mut parts = Vec::new();
    if ctrl {
        parts.push("ctrl".to_string());
    }
    if alt {
        parts.push("alt".to_string());
    }
    if shift {
        parts.push("shift".to_string());
    }
    parts.push(key);
    Some(parts.join("+"))
}

fn normalize_hotkey_key_token(token: &str) -> Option<String> {
    match token {
        "esc" | "escape" => Some("esc".to_string()),
        "return" => Some("enter".to_string()),
        "pgup" => Some("pageup".to_string()),
        "pgdn" => Some("pagedown".to_string()),
        "del" => Some("delete".to_string()),
        "ins" => Some("insert".to_string()),
        "space" | "plus" | "tab" | "backtab" | "enter" | "backspace" | "delete" | "insert"
        | "left" | "right" | "up" | "down" | "home" | "end" | "pageup" | "pagedown" => {
            Some(token.to_string())
        }
        _ if token.chars().count() == 1 => Some(token.to_string()),
        _ if token.starts_with('f') => {
            let number = token.trim_start_matches('f').parse::<u8>().ok()?;
            if (1..=24).contains(&number) {
                Some(format!("f{number}"))
            } else {
                None
            }
        }
        _ => None,
    }
}
