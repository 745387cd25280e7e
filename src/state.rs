// 🧭 Application State - session flags, loading flag, deal panel, theme
//
// One explicit object handed to whatever needs it, instead of global stores.
// Every field changes only through the methods below.

use crate::board::Card;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// AUTH
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub name: String,
    /// Whether the user is signed in
    pub status: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    user: User,
}

impl AuthState {
    pub fn is_auth(&self) -> bool {
        self.user.status
    }

    pub fn user_email(&self) -> &str {
        &self.user.email
    }

    pub fn user_name(&self) -> &str {
        &self.user.name
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn set(&mut self, user: User) {
        self.user = user;
    }

    pub fn update_auth_status(&mut self, status: bool) {
        self.user.status = status;
    }

    pub fn clear(&mut self) {
        self.user = User::default();
    }
}

// ============================================================================
// LOADING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingState {
    is_loading: bool,
}

impl Default for LoadingState {
    /// Starts loading until the first board arrives.
    fn default() -> Self {
        Self { is_loading: true }
    }
}

impl LoadingState {
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn set(&mut self, value: bool) {
        self.is_loading = value;
    }
}

// ============================================================================
// DEAL SLIDE (detail side-panel)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DealSlideState {
    card: Option<Card>,
    is_open: bool,
}

impl DealSlideState {
    pub fn card(&self) -> Option<&Card> {
        self.card.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Show a card; opens the panel.
    pub fn set(&mut self, card: Card) {
        self.card = Some(card);
        self.is_open = true;
    }

    pub fn toggle(&mut self) {
        self.is_open = !self.is_open;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// THEME
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme: {}", other)),
        }
    }
}

/// Current theme plus whether the user chose it explicitly.
///
/// An explicit choice wins over the system preference, which is read once
/// at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeState {
    theme: Theme,
    explicit: bool,
}

impl ThemeState {
    /// Saved preference first, then system preference, then light.
    pub fn init(saved: Option<Theme>, system_prefers_dark: bool) -> Self {
        match saved {
            Some(theme) => Self {
                theme,
                explicit: true,
            },
            None => Self {
                theme: if system_prefers_dark {
                    Theme::Dark
                } else {
                    Theme::Light
                },
                explicit: false,
            },
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// User choice. The caller persists the returned value.
    pub fn set(&mut self, theme: Theme) -> Theme {
        self.theme = theme;
        self.explicit = true;
        theme
    }

    pub fn toggle(&mut self) -> Theme {
        self.set(self.theme.toggled())
    }
}

// ============================================================================
// APP STATE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub auth: AuthState,
    pub loading: LoadingState,
    pub deal_slide: DealSlideState,
    pub theme: ThemeState,
}

impl AppState {
    pub fn new(theme: ThemeState) -> Self {
        Self {
            theme,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> Card {
        Card {
            id: "d1".to_string(),
            created_at: "2024-01-01".to_string(),
            name: "Website".to_string(),
            price: 100.0,
            company_name: "Acme".to_string(),
            status: "Incoming".to_string(),
        }
    }

    #[test]
    fn test_auth_lifecycle() {
        let mut auth = AuthState::default();
        assert!(!auth.is_auth());

        auth.set(User {
            email: "ann@example.test".to_string(),
            name: "Ann".to_string(),
            status: true,
        });
        assert!(auth.is_auth());
        assert_eq!(auth.user_email(), "ann@example.test");
        assert_eq!(auth.user_name(), "Ann");

        auth.update_auth_status(false);
        assert!(!auth.is_auth());
        assert_eq!(auth.user_name(), "Ann");

        auth.clear();
        assert_eq!(auth.user(), &User::default());
    }

    #[test]
    fn test_loading_defaults_to_true() {
        let mut loading = LoadingState::default();
        assert!(loading.is_loading());
        loading.set(false);
        assert!(!loading.is_loading());
    }

    #[test]
    fn test_deal_slide() {
        let mut slide = DealSlideState::default();
        assert!(!slide.is_open());
        assert!(slide.card().is_none());

        slide.set(card());
        assert!(slide.is_open());
        assert_eq!(slide.card().unwrap().id, "d1");

        slide.toggle();
        assert!(!slide.is_open());
        assert!(slide.card().is_some());

        slide.clear();
        assert_eq!(slide, DealSlideState::default());
    }

    #[test]
    fn test_slide_card_is_a_copy() {
        let original = card();
        let mut slide = DealSlideState::default();
        slide.set(original.clone());
        slide.clear();
        assert_eq!(original, card());
    }

    #[test]
    fn test_theme_init_precedence() {
        assert_eq!(ThemeState::init(Some(Theme::Light), true).theme(), Theme::Light);
        assert_eq!(ThemeState::init(None, true).theme(), Theme::Dark);
        assert_eq!(ThemeState::init(None, false).theme(), Theme::Light);
        assert!(ThemeState::init(Some(Theme::Dark), false).is_explicit());
    }

    #[test]
    fn test_toggle_makes_theme_explicit() {
        let mut theme = ThemeState::init(None, true);
        assert!(!theme.is_explicit());

        assert_eq!(theme.toggle(), Theme::Light);
        assert!(theme.is_explicit());
        assert_eq!(theme.theme(), Theme::Light);
    }

    #[test]
    fn test_theme_parse() {
        assert_eq!("Dark".parse::<Theme>(), Ok(Theme::Dark));
        assert_eq!(" light ".parse::<Theme>(), Ok(Theme::Light));
        assert!("sepia".parse::<Theme>().is_err());
        assert_eq!(Theme::Dark.to_string(), "dark");
    }

    #[test]
    fn test_app_state_new() {
        let state = AppState::new(ThemeState::init(Some(Theme::Dark), false));
        assert_eq!(state.theme.theme(), Theme::Dark);
        assert!(state.loading.is_loading());
        assert!(!state.auth.is_auth());
    }
}
