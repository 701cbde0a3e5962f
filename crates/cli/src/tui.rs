use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::style::ResetColor;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use perspectiva_catalog::Catalog;
use perspectiva_quiz::{QuizSession, Transition};
use perspectiva_scoring::AnswerSet;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{self, Stdout, Write as _};
use std::time::Duration;

mod theme;
use theme::{ThemeContext, ThemeName};

type QuizTerminal = Terminal<CrosstermBackend<Stdout>>;

const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(250);
const MIN_WIDTH: u16 = 44;
const MIN_HEIGHT: u16 = 14;

#[derive(Debug, thiserror::Error)]
pub(super) enum TuiError {
    #[error("terminal init failed: {0}")]
    Init(String),
    #[error("terminal error: {0}")]
    Runtime(String),
}

struct TerminalGuard {
    terminal: QuizTerminal,
    restored: bool,
}

impl TerminalGuard {
    fn enter() -> Result<Self, TuiError> {
        enable_raw_mode()
            .map_err(|err| TuiError::Init(format!("failed to enable raw mode: {err}")))?;

        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, EnterAlternateScreen, Hide) {
            let _ = execute!(stdout, Show, LeaveAlternateScreen);
            let _ = disable_raw_mode();
            return Err(TuiError::Init(format!(
                "failed to enter alternate screen: {err}"
            )));
        }

        match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(terminal) => Ok(Self {
                terminal,
                restored: false,
            }),
            Err(err) => {
                let mut stdout = io::stdout();
                let _ = execute!(stdout, Show, LeaveAlternateScreen);
                let _ = disable_raw_mode();
                Err(TuiError::Init(format!("failed to initialize terminal: {err}")))
            }
        }
    }

    fn restore(&mut self) -> Result<(), TuiError> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;

        let mut failures = Vec::new();
        if let Err(err) = self.terminal.backend_mut().flush() {
            failures.push(format!("failed to flush terminal: {err}"));
        }
        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, Show, ResetColor, LeaveAlternateScreen) {
            failures.push(format!("failed to leave alternate screen: {err}"));
        }
        if let Err(err) = disable_raw_mode() {
            failures.push(format!("failed to disable raw mode: {err}"));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TuiError::Runtime(failures.join("; ")))
        }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct KeyAction {
    redraw: bool,
    quit: bool,
    finish: bool,
}

impl KeyAction {
    fn none() -> Self {
        Self::default()
    }

    fn redraw() -> Self {
        Self {
            redraw: true,
            ..Self::default()
        }
    }

    fn quit() -> Self {
        Self {
            quit: true,
            ..Self::default()
        }
    }

    fn finish() -> Self {
        Self {
            finish: true,
            ..Self::default()
        }
    }
}

struct App<'c> {
    catalog: &'c Catalog,
    session: QuizSession,
    cursor: usize,
    show_help: bool,
    theme: ThemeContext,
}

impl<'c> App<'c> {
    fn new(catalog: &'c Catalog) -> Self {
        let mut app = Self {
            catalog,
            session: QuizSession::for_catalog(catalog),
            cursor: 0,
            show_help: false,
            theme: ThemeContext::new(ThemeName::Classic),
        };
        app.sync_cursor();
        app
    }

    fn option_count(&self) -> usize {
        self.session
            .current(self.catalog)
            .map(|(_, question)| question.options.len())
            .unwrap_or(0)
    }

    /// Points the cursor at the stored answer of the current question, if any.
    fn sync_cursor(&mut self) {
        let stored = self.session.current(self.catalog).and_then(|(_, question)| {
            self.session
                .answers()
                .get(&question.id)
                .and_then(|index| usize::try_from(index).ok())
        });
        let count = self.option_count();
        self.cursor = stored.filter(|index| *index < count).unwrap_or(0);
    }

    fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn move_down(&mut self) {
        if self.cursor + 1 < self.option_count() {
            self.cursor += 1;
        }
    }

    /// Records the highlighted option and advances.
    fn choose(&mut self) -> Transition {
        let Some((_, question)) = self.session.current(self.catalog) else {
            return self.session.next();
        };
        if self.cursor >= question.options.len() {
            return Transition::Stayed;
        }
        let Ok(index) = i64::try_from(self.cursor) else {
            return Transition::Stayed;
        };
        self.session.answer(question.id.clone(), index);
        let transition = self.session.next();
        self.sync_cursor();
        transition
    }

    fn back(&mut self) -> Transition {
        let transition = self.session.previous();
        self.sync_cursor();
        transition
    }

    fn reset(&mut self) {
        self.session.reset();
        self.sync_cursor();
    }

    fn cycle_theme(&mut self) {
        self.theme = ThemeContext::new(self.theme.name().next());
    }
}

pub(super) fn run(catalog: &Catalog) -> Result<Option<AnswerSet>, TuiError> {
    let mut guard = TerminalGuard::enter()?;
    let mut app = App::new(catalog);

    let app_result = run_app(&mut guard.terminal, &mut app);
    let restore_result = guard.restore();

    match (app_result, restore_result) {
        (Err(err), _) | (Ok(_), Err(err)) => Err(err),
        (Ok(true), Ok(())) => {
            tracing::info!(answered = app.session.answers().len(), "quiz completed");
            Ok(Some(app.session.into_answers()))
        }
        (Ok(false), Ok(())) => Ok(None),
    }
}

/// Returns `true` when the user finished the quiz, `false` when they quit.
fn run_app(terminal: &mut QuizTerminal, app: &mut App<'_>) -> Result<bool, TuiError> {
    let mut dirty = true;

    loop {
        if dirty {
            terminal
                .draw(|frame| render(frame, app))
                .map_err(|err| TuiError::Runtime(format!("failed to draw quiz: {err}")))?;
            dirty = false;
        }

        if !event::poll(EVENT_POLL_TIMEOUT)
            .map_err(|err| TuiError::Runtime(format!("failed to poll events: {err}")))?
        {
            continue;
        }

        match event::read()
            .map_err(|err| TuiError::Runtime(format!("failed to read event: {err}")))?
        {
            Event::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
                {
                    return Ok(false);
                }
                if app.show_help {
                    app.show_help = false;
                    dirty = true;
                    continue;
                }

                let action = handle_key(app, key.code);
                if action.quit {
                    return Ok(false);
                }
                if action.finish {
                    return Ok(true);
                }
                dirty |= action.redraw;
            }
            Event::Resize(_, _) => {
                terminal.clear().map_err(|err| {
                    TuiError::Runtime(format!("failed to clear terminal on resize: {err}"))
                })?;
                dirty = true;
            }
            _ => {}
        }
    }
}

fn handle_key(app: &mut App<'_>, code: KeyCode) -> KeyAction {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => KeyAction::quit(),
        KeyCode::Char('?') => {
            app.show_help = true;
            KeyAction::redraw()
        }
        KeyCode::Char('t') => {
            app.cycle_theme();
            KeyAction::redraw()
        }
        KeyCode::Char('r') => {
            app.reset();
            KeyAction::redraw()
        }
        KeyCode::Left | KeyCode::Char('h') | KeyCode::Backspace | KeyCode::Char('b') => {
            app.back();
            KeyAction::redraw()
        }
        _ if app.session.is_completed() => match code {
            KeyCode::Enter | KeyCode::Char('s') => KeyAction::finish(),
            _ => KeyAction::none(),
        },
        KeyCode::Up | KeyCode::Char('k') => {
            app.move_up();
            KeyAction::redraw()
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.move_down();
            KeyAction::redraw()
        }
        KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Right | KeyCode::Char('l') => {
            app.choose();
            KeyAction::redraw()
        }
        KeyCode::Char(digit @ '1'..='9') => {
            let index = digit as usize - '1' as usize;
            if index >= app.option_count() {
                return KeyAction::none();
            }
            app.cursor = index;
            app.choose();
            KeyAction::redraw()
        }
        _ => KeyAction::none(),
    }
}

fn panel<'a>(title: &'a str, theme: &ThemeContext) -> Block<'a> {
    Block::default()
        .title(title)
        .title_style(theme.style_title())
        .borders(Borders::ALL)
        .border_style(theme.style_border())
        .border_type(theme.border_type())
        .style(theme.style_panel())
}

fn render(frame: &mut ratatui::Frame<'_>, app: &App<'_>) {
    let area = frame.area();
    let theme = &app.theme;
    frame.render_widget(
        Block::default().style(Style::default().bg(theme.app_bg_color())),
        area,
    );

    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let message = format!("Terminal too small {}x{}", area.width, area.height);
        let widget = Paragraph::new(message)
            .alignment(Alignment::Center)
            .style(theme.style_text())
            .block(panel("Perspectiva", theme));
        frame.render_widget(widget, area);
        return;
    }

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(frame, vertical[0], app);
    if app.session.is_completed() {
        render_completed(frame, vertical[1], app);
    } else {
        render_question(frame, vertical[1], app);
    }
    render_footer(frame, vertical[2], app);

    if app.show_help {
        render_help(frame, app);
    }
}

fn render_header(frame: &mut ratatui::Frame<'_>, area: Rect, app: &App<'_>) {
    let percent = app.session.progress_percent();
    let title = format!(
        "Perspectiva | {} rev {} | {}/{} answered",
        app.catalog.catalog_id,
        app.catalog.revision,
        app.session.answers().len().min(app.session.total_questions()),
        app.session.total_questions()
    );
    let gauge = Gauge::default()
        .block(panel("Progress", &app.theme))
        .gauge_style(app.theme.style_gauge())
        .percent(u16::from(percent))
        .label(Span::styled(
            format!("{title}  {percent}%"),
            app.theme.style_text(),
        ));
    frame.render_widget(gauge, area);
}

fn render_question(frame: &mut ratatui::Frame<'_>, area: Rect, app: &App<'_>) {
    let theme = &app.theme;
    let Some((scenario, question)) = app.session.current(app.catalog) else {
        let empty = Paragraph::new("This catalog has no questions.")
            .style(theme.style_muted())
            .block(panel("Quiz", theme));
        frame.render_widget(empty, area);
        return;
    };

    let stored = app.session.answers().get(&question.id);
    let mut lines = Vec::new();
    if !scenario.description.is_empty() {
        lines.push(Line::from(Span::styled(
            scenario.description.as_str(),
            theme.style_muted(),
        )));
        lines.push(Line::default());
    }
    lines.push(Line::from(Span::styled(
        question.text.as_str(),
        theme.style_accent(),
    )));
    lines.push(Line::default());

    for (index, option) in question.options.iter().enumerate() {
        let is_cursor = index == app.cursor;
        let is_stored = stored == Some(index as i64);
        let marker = if is_cursor { "\u{00BB}" } else { " " };
        let check = if is_stored { "\u{2713}" } else { " " };
        let style = if is_cursor {
            theme.style_selected()
        } else if is_stored {
            theme.style_answered()
        } else {
            theme.style_text()
        };
        lines.push(Line::from(Span::styled(
            format!("{marker} {}. {} {check}", index + 1, option.text),
            style,
        )));
    }

    let title = format!(
        "[{}] {} | question {}/{}",
        scenario.id,
        scenario.title,
        app.session.position().question + 1,
        scenario.questions.len()
    );
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(panel(&title, theme));
    frame.render_widget(widget, area);
}

fn render_completed(frame: &mut ratatui::Frame<'_>, area: Rect, app: &App<'_>) {
    let theme = &app.theme;
    let answered = app.session.answers().len();
    let total = app.session.total_questions();
    let lines = vec![
        Line::from(Span::styled("All scenarios done.", theme.style_accent())),
        Line::default(),
        Line::from(Span::styled(
            format!("{answered} of {total} questions answered."),
            theme.style_text(),
        )),
        Line::default(),
        Line::from(Span::styled(
            "Enter saves your answers, b goes back, q quits without saving.",
            theme.style_muted(),
        )),
    ];
    let widget = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(panel("Finished", theme));
    frame.render_widget(widget, area);
}

fn render_footer(frame: &mut ratatui::Frame<'_>, area: Rect, app: &App<'_>) {
    let hints = if app.session.is_completed() {
        "enter save | b back | r restart | q quit"
    } else if app.session.can_go_back() {
        "\u{2191}\u{2193} move | enter choose | 1-9 pick | b back | ? help | q quit"
    } else {
        "\u{2191}\u{2193} move | enter choose | 1-9 pick | ? help | q quit"
    };
    let line = Line::from(vec![
        Span::styled(hints, app.theme.style_muted()),
        Span::styled(
            format!("  theme:{}", app.theme.name().label()),
            app.theme.style_muted(),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_help(frame: &mut ratatui::Frame<'_>, app: &App<'_>) {
    let area = centered_rect(60, 60, frame.area());
    let theme = &app.theme;
    let lines: Vec<Line<'_>> = [
        ("up/down, j/k", "move between options"),
        ("enter, space", "choose and continue"),
        ("1-9", "choose an option directly"),
        ("left, b", "previous question"),
        ("r", "restart from the first question"),
        ("t", "switch theme"),
        ("q, esc", "quit without saving"),
    ]
    .into_iter()
    .map(|(keys, what)| {
        Line::from(vec![
            Span::styled(format!("{keys:<14}"), theme.style_accent()),
            Span::styled(what, theme.style_text()),
        ])
    })
    .collect();
    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines).block(panel("Keys", theme)), area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_through_classic_catalog_then_finish() {
        let catalog = Catalog::classic();
        let mut app = App::new(&catalog);
        let total = app.session.total_questions();
        for _ in 0..total {
            assert_eq!(handle_key(&mut app, KeyCode::Enter), KeyAction::redraw());
        }
        assert!(app.session.is_completed());
        assert_eq!(app.session.answers().len(), total);
        assert_eq!(handle_key(&mut app, KeyCode::Enter), KeyAction::finish());
    }

    #[test]
    fn digit_records_that_option() {
        let catalog = Catalog::classic();
        let mut app = App::new(&catalog);
        handle_key(&mut app, KeyCode::Char('2'));
        assert_eq!(app.session.answers().get("q1_1"), Some(1));
        assert_eq!(app.session.position().question, 1);
    }

    #[test]
    fn enter_records_highlighted_option() {
        let catalog = Catalog::classic();
        let mut app = App::new(&catalog);
        handle_key(&mut app, KeyCode::Down);
        handle_key(&mut app, KeyCode::Down);
        handle_key(&mut app, KeyCode::Down);
        handle_key(&mut app, KeyCode::Enter);
        assert_eq!(app.session.answers().get("q1_1"), Some(3));
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn digit_past_option_count_is_ignored() {
        let catalog = Catalog::classic();
        let mut app = App::new(&catalog);
        assert_eq!(handle_key(&mut app, KeyCode::Char('9')), KeyAction::none());
        assert!(app.session.answers().is_empty());
    }

    #[test]
    fn going_back_restores_cursor_to_stored_answer() {
        let catalog = Catalog::classic();
        let mut app = App::new(&catalog);
        handle_key(&mut app, KeyCode::Down);
        handle_key(&mut app, KeyCode::Enter);
        assert_eq!(app.cursor, 0);
        handle_key(&mut app, KeyCode::Char('b'));
        assert_eq!(app.cursor, 1);
    }

    #[test]
    fn cursor_stays_within_options() {
        let catalog = Catalog::classic();
        let mut app = App::new(&catalog);
        handle_key(&mut app, KeyCode::Up);
        assert_eq!(app.cursor, 0);
        for _ in 0..20 {
            handle_key(&mut app, KeyCode::Down);
        }
        assert_eq!(app.cursor, app.option_count() - 1);
    }

    #[test]
    fn quit_keys() {
        let catalog = Catalog::classic();
        let mut app = App::new(&catalog);
        assert_eq!(handle_key(&mut app, KeyCode::Char('q')), KeyAction::quit());
        assert_eq!(handle_key(&mut app, KeyCode::Esc), KeyAction::quit());
    }
}
