use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::BorderType;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum ThemeName {
    Classic,
    Term,
}

impl ThemeName {
    pub(super) fn next(self) -> Self {
        match self {
            ThemeName::Classic => ThemeName::Term,
            ThemeName::Term => ThemeName::Classic,
        }
    }

    pub(super) fn label(self) -> &'static str {
        match self {
            ThemeName::Classic => "classic",
            ThemeName::Term => "term",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ColorMode {
    TrueColor,
    Ansi256,
    Ansi16,
    None,
}

#[derive(Clone, Copy, Debug)]
struct Rgb(u8, u8, u8);

#[derive(Clone, Copy, Debug)]
struct Palette {
    bg: Rgb,
    panel_bg: Rgb,
    border: Rgb,
    text: Rgb,
    muted: Rgb,
    accent: Rgb,
    answered: Rgb,
    selected_bg: Rgb,
    gauge: Rgb,
}

impl Palette {
    fn classic() -> Self {
        Self {
            bg: Rgb(0x12, 0x0E, 0x14),
            panel_bg: Rgb(0x1A, 0x15, 0x1E),
            border: Rgb(0x3A, 0x2F, 0x42),
            text: Rgb(0xDD, 0xD3, 0xDF),
            muted: Rgb(0x8E, 0x82, 0x96),
            accent: Rgb(0xD9, 0x8F, 0xA6),
            answered: Rgb(0x8F, 0xC1, 0xA0),
            selected_bg: Rgb(0x2B, 0x22, 0x31),
            gauge: Rgb(0xD9, 0x8F, 0xA6),
        }
    }

    fn term() -> Self {
        Self {
            bg: Rgb(0x00, 0x00, 0x00),
            panel_bg: Rgb(0x00, 0x00, 0x00),
            border: Rgb(0x80, 0x80, 0x80),
            text: Rgb(0xE0, 0xE0, 0xE0),
            muted: Rgb(0x9A, 0x9A, 0x9A),
            accent: Rgb(0xC8, 0x96, 0xB4),
            answered: Rgb(0x8C, 0xBE, 0x9C),
            selected_bg: Rgb(0x00, 0x00, 0x00),
            gauge: Rgb(0xC8, 0x96, 0xB4),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Token {
    Bg,
    PanelBg,
    Border,
    Text,
    Muted,
    Accent,
    Answered,
    SelectedBg,
    Gauge,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct ThemeContext {
    name: ThemeName,
    palette: Palette,
    color_mode: ColorMode,
}

impl ThemeContext {
    pub(super) fn new(name: ThemeName) -> Self {
        let palette = match name {
            ThemeName::Classic => Palette::classic(),
            ThemeName::Term => Palette::term(),
        };
        let color_mode = if std::env::var_os("NO_COLOR").is_some() {
            ColorMode::None
        } else {
            detect_auto_mode()
        };
        Self {
            name,
            palette,
            color_mode,
        }
    }

    pub(super) fn name(&self) -> ThemeName {
        self.name
    }

    pub(super) fn border_type(&self) -> BorderType {
        match self.name {
            ThemeName::Classic => BorderType::Rounded,
            ThemeName::Term => BorderType::Plain,
        }
    }

    pub(super) fn app_bg_color(&self) -> Color {
        if self.backgrounds_disabled() {
            Color::Reset
        } else {
            self.color(Token::Bg)
        }
    }

    pub(super) fn style_panel(&self) -> Style {
        if self.backgrounds_disabled() {
            Style::default()
        } else {
            Style::default().bg(self.color(Token::PanelBg))
        }
    }

    pub(super) fn style_text(&self) -> Style {
        Style::default().fg(self.color(Token::Text))
    }

    pub(super) fn style_muted(&self) -> Style {
        if self.color_mode == ColorMode::None {
            Style::default().add_modifier(Modifier::DIM)
        } else {
            Style::default().fg(self.color(Token::Muted))
        }
    }

    pub(super) fn style_border(&self) -> Style {
        Style::default().fg(self.color(Token::Border))
    }

    pub(super) fn style_title(&self) -> Style {
        self.style_accent()
    }

    pub(super) fn style_accent(&self) -> Style {
        self.style_text()
            .fg(self.color(Token::Accent))
            .add_modifier(Modifier::BOLD)
    }

    pub(super) fn style_selected(&self) -> Style {
        if self.backgrounds_disabled() {
            self.style_text().add_modifier(Modifier::REVERSED)
        } else {
            self.style_text()
                .bg(self.color(Token::SelectedBg))
                .add_modifier(Modifier::BOLD)
        }
    }

    pub(super) fn style_answered(&self) -> Style {
        if self.color_mode == ColorMode::None {
            self.style_text().add_modifier(Modifier::UNDERLINED)
        } else {
            self.style_text().fg(self.color(Token::Answered))
        }
    }

    pub(super) fn style_gauge(&self) -> Style {
        self.style_text().fg(self.color(Token::Gauge))
    }

    fn color(&self, token: Token) -> Color {
        match self.color_mode {
            ColorMode::TrueColor => {
                let Rgb(r, g, b) = self.token_rgb(token);
                Color::Rgb(r, g, b)
            }
            ColorMode::Ansi256 => color_ansi256(token),
            ColorMode::Ansi16 => color_ansi16(token),
            ColorMode::None => Color::Reset,
        }
    }

    fn backgrounds_disabled(&self) -> bool {
        self.name == ThemeName::Term || matches!(self.color_mode, ColorMode::Ansi16 | ColorMode::None)
    }

    fn token_rgb(&self, token: Token) -> Rgb {
        let p = &self.palette;
        match token {
            Token::Bg => p.bg,
            Token::PanelBg => p.panel_bg,
            Token::Border => p.border,
            Token::Text => p.text,
            Token::Muted => p.muted,
            Token::Accent => p.accent,
            Token::Answered => p.answered,
            Token::SelectedBg => p.selected_bg,
            Token::Gauge => p.gauge,
        }
    }
}

fn color_ansi256(token: Token) -> Color {
    match token {
        Token::Bg => Color::Indexed(233),
        Token::PanelBg => Color::Indexed(234),
        Token::Border => Color::Indexed(239),
        Token::Text => Color::Indexed(252),
        Token::Muted => Color::Indexed(245),
        Token::Accent | Token::Gauge => Color::Indexed(175),
        Token::Answered => Color::Indexed(108),
        Token::SelectedBg => Color::Indexed(236),
    }
}

fn color_ansi16(token: Token) -> Color {
    match token {
        Token::Bg | Token::PanelBg => Color::Reset,
        Token::Border | Token::Muted | Token::SelectedBg => Color::DarkGray,
        Token::Text => Color::White,
        Token::Accent | Token::Gauge => Color::Magenta,
        Token::Answered => Color::Green,
    }
}

fn detect_auto_mode() -> ColorMode {
    let env_lower = |key: &str| {
        std::env::var(key)
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default()
    };

    let colorterm = env_lower("COLORTERM");
    if colorterm.contains("truecolor") || colorterm.contains("24bit") {
        return ColorMode::TrueColor;
    }
    if std::env::var_os("WT_SESSION").is_some() {
        return ColorMode::TrueColor;
    }
    if env_lower("TERM").contains("256color") {
        ColorMode::Ansi256
    } else {
        ColorMode::Ansi16
    }
}
