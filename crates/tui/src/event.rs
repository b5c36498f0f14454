use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::App;
use crate::ui;

const INPUT_POLL: Duration = Duration::from_millis(100);
const WHEEL_LINES: usize = 3;

/// Draw, then wait up to `INPUT_POLL` for input. Returns once the user quits.
pub fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> anyhow::Result<()> {
    while !app.should_quit {
        app.drain_logs();
        app.drain_events();
        terminal.draw(|f| ui::draw(f, app))?;

        if !event::poll(INPUT_POLL)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => on_key(app, key),
            Event::Mouse(mouse) => on_mouse(app, mouse),
            _ => {}
        }
    }
    Ok(())
}

pub fn on_key(app: &mut App, key: KeyEvent) {
    if key.kind != KeyEventKind::Press {
        return;
    }
    match key.code {
        // Raw mode delivers Ctrl-C as a key instead of a signal
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => app.quit(),
        KeyCode::Char('q' | 'Q') | KeyCode::Esc => app.quit(),
        KeyCode::Char('p' | 'P' | ' ') => app.toggle_pause(),
        KeyCode::Char('l' | 'L') => app.toggle_log(),
        KeyCode::Up | KeyCode::Char('k' | 'K') => app.scroll_log_up(1),
        KeyCode::Down | KeyCode::Char('j' | 'J') => app.scroll_log_down(1),
        KeyCode::End => app.log_scroll = 0,
        _ => {}
    }
}

fn on_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_log_up(WHEEL_LINES),
        MouseEventKind::ScrollDown => app.scroll_log_down(WHEEL_LINES),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodl_core::config::LoopConfig;
    use autodl_core::controller::ControlHandle;
    use autodl_core::types::LoopState;
    use crossterm::event::KeyEventState;
    use std::sync::mpsc;

    fn app() -> App {
        let (_log_tx, log_rx) = mpsc::channel();
        let (_event_tx, event_rx) = mpsc::channel();
        let mut app = App::new(LoopConfig::default(), Vec::new(), log_rx, event_rx, ControlHandle::new());
        app.state = LoopState::Running;
        app
    }

    fn key(code: KeyCode, kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_space_toggles_pause() {
        let mut app = app();
        on_key(&mut app, key(KeyCode::Char(' '), KeyEventKind::Press));
        assert!(app.control.pause_requested());
        on_key(&mut app, key(KeyCode::Char('p'), KeyEventKind::Press));
        assert!(!app.control.pause_requested());
    }

    #[test]
    fn test_key_release_is_ignored() {
        let mut app = app();
        on_key(&mut app, key(KeyCode::Char('q'), KeyEventKind::Release));
        assert!(!app.should_quit);
    }

    #[test]
    fn test_quit_requests_stop() {
        let mut app = app();
        on_key(&mut app, key(KeyCode::Esc, KeyEventKind::Press));
        assert!(app.should_quit);
        assert!(app.control.stop_requested());
    }

    #[test]
    fn test_ctrl_c_quits() {
        let mut app = app();
        on_key(&mut app, key(KeyCode::Char('c'), KeyEventKind::Press));
        assert!(!app.should_quit);
        let mut ctrl_c = key(KeyCode::Char('c'), KeyEventKind::Press);
        ctrl_c.modifiers = KeyModifiers::CONTROL;
        on_key(&mut app, ctrl_c);
        assert!(app.should_quit);
        assert!(app.control.stop_requested());
    }

    #[test]
    fn test_log_scroll_keys() {
        let mut app = app();
        on_key(&mut app, key(KeyCode::Char('k'), KeyEventKind::Press));
        on_key(&mut app, key(KeyCode::Up, KeyEventKind::Press));
        assert_eq!(app.log_scroll, 2);
        on_key(&mut app, key(KeyCode::End, KeyEventKind::Press));
        assert_eq!(app.log_scroll, 0);
        on_key(&mut app, key(KeyCode::Char('l'), KeyEventKind::Press));
        assert!(!app.log_visible);
    }
}
