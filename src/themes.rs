use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,
    pub label: &'static str,
    pub user_bubble: &'static str,
    pub bot_bubble: &'static str,
    pub user_text: &'static str,
    pub bot_text: &'static str,
    pub background: &'static str,
}

pub const THEMES: [Theme; 4] = [
    Theme {
        name: "kakao",
        label: "KakaoTalk",
        user_bubble: "#FEE500",
        bot_bubble: "#FFFFFF",
        user_text: "#000000",
        bot_text: "#000000",
        background: "#F5F5F5",
    },
    Theme {
        name: "instagram",
        label: "Instagram",
        user_bubble: "#0095F6",
        bot_bubble: "#EFEFEF",
        user_text: "#FFFFFF",
        bot_text: "#000000",
        background: "#FAFAFA",
    },
    Theme {
        name: "line",
        label: "LINE",
        user_bubble: "#00B900",
        bot_bubble: "#FFFFFF",
        user_text: "#FFFFFF",
        bot_text: "#000000",
        background: "#F5F5F5",
    },
    Theme {
        name: "copilot",
        label: "Copilot",
        user_bubble: "#0078D4",
        bot_bubble: "#F3F2F1",
        user_text: "#FFFFFF",
        bot_text: "#000000",
        background: "#FFFFFF",
    },
];

pub const DEFAULT_THEME: &str = "kakao";

pub fn find_theme(name: &str) -> Option<&'static Theme> {
    THEMES.iter().find(|theme| theme.name.eq_ignore_ascii_case(name))
}

/// Stylesheet for the chat bubbles of a theme, `None` for unknown names.
pub fn theme_css(name: &str) -> Option<String> {
    let theme = find_theme(name)?;
    Some(format!(
        r#"body {{ background: {background}; }}
.chat-container {{ background: {background}; }}
.message.user .bubble {{ background: {user_bubble}; color: {user_text}; border-radius: 18px 18px 4px 18px; margin-left: auto; }}
.message.bot .bubble {{ background: {bot_bubble}; color: {bot_text}; border-radius: 18px 18px 18px 4px; box-shadow: 0 1px 2px rgba(0, 0, 0, 0.1); }}
"#,
        background = theme.background,
        user_bubble = theme.user_bubble,
        user_text = theme.user_text,
        bot_bubble = theme.bot_bubble,
        bot_text = theme.bot_text,
    ))
}
