use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style, Modifier},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use autodl_core::config::PostClick;
use autodl_core::logger::{Level, LogLine, COLOR_BLUE, COLOR_GRAY};
use autodl_core::types::LoopState;
use crate::App;

fn banner(state: LoopState) -> (&'static str, Color) {
    match state {
        LoopState::Idle => ("STARTING...", Color::Yellow),
        LoopState::Running => ("RUNNING (P to pause, Q to quit)", Color::Green),
        LoopState::Paused => ("PAUSED (P to resume, Q to quit)", Color::Yellow),
        LoopState::Stopped => ("STOPPED (Q to quit)", Color::Red),
        LoopState::FatalIdle => ("NO TEMPLATES (Q to quit)", Color::Red),
    }
}

fn key(k: &str) -> Span<'_> {
    Span::styled(k, Style::default().fg(Color::Yellow))
}

fn setting<'a>(name: &'a str, value: String) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!(" {:<12}", name), Style::default().fg(Color::DarkGray)),
        Span::raw(value),
    ])
}

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    let (banner_label, banner_bg) = banner(app.state);
    let cfg = &app.config;

    let mut lines: Vec<Line> = vec![
        Line::from(vec![
            Span::raw(" "),
            key("p"),
            Span::raw("/"),
            key("space"),
            Span::raw(" pause, "),
            key("l"),
            Span::raw(" logs, "),
            key("q"),
            Span::raw(" quit"),
        ]),
        Line::from(""),
        setting("strategy", cfg.strategy.to_string()),
        setting(
            "confidence",
            format!("{:.2}{}", cfg.confidence, if cfg.grayscale { " (grayscale)" } else { " (color)" }),
        ),
        setting("sleep", format!("{:.1}s to {:.1}s", cfg.min_sleep, cfg.max_sleep)),
        setting("jitter", format!("±{}px", cfg.tol_pixels)),
        setting(
            "scroll",
            if cfg.retries_before_scroll == 0 {
                "never on misses".to_string()
            } else {
                format!("{} after {} misses", cfg.scroll_amount, cfg.retries_before_scroll)
            },
        ),
        setting(
            "overlay fix",
            if cfg.transparent_ads_fix {
                format!("after {} repeats", cfg.overlay_streak)
            } else {
                "off".to_string()
            },
        ),
        setting(
            "after click",
            match cfg.post_click {
                PostClick::Restore => "restore pointer".to_string(),
                PostClick::Park(p) => format!("park at {}", p),
            },
        ),
        Line::from(""),
        Line::from(Span::styled(
            format!(" Templates ({})", cfg.templates_path.display()),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )),
    ];

    for name in &app.templates {
        let hit = app.last_match.as_deref() == Some(name.as_str());
        let (marker, style) = if hit {
            ("> ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
        } else {
            ("  ", Style::default().fg(Color::Cyan))
        };
        let mut spans = vec![Span::raw(marker), Span::styled(name.clone(), style)];
        if hit {
            if let Some(p) = app.last_target {
                spans.push(Span::styled(format!("  {}", p), Style::default().fg(Color::DarkGray)));
            }
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!(" ticks {}  clicks {}  scrolls {}", app.ticks, app.clicks, app.scrolls),
        Style::default().fg(Color::DarkGray),
    )));

    // Split left panel into banner (1 line) + status (fills space)
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[0]);

    // Full-width centered banner
    let banner_width = left_chunks[0].width as usize;
    let pad_total = banner_width.saturating_sub(banner_label.len());
    let pad_left = pad_total / 2;
    let pad_right = pad_total - pad_left;
    let centered_banner = format!("{}{}{}", " ".repeat(pad_left), banner_label, " ".repeat(pad_right));
    let banner = Paragraph::new(Line::from(Span::styled(
        centered_banner,
        Style::default().fg(Color::Black).bg(banner_bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, left_chunks[0]);

    let status = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(status, left_chunks[1]);

    // -- Right panel: logs --
    if app.log_visible && chunks.len() > 1 {
        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let total = app.log_messages.len();
        let max_scroll = total.saturating_sub(visible_height);
        let scroll = app.log_scroll.min(max_scroll);
        let start = total.saturating_sub(visible_height + scroll);
        let end = total.saturating_sub(scroll);
        let log_lines: Vec<Line> = app.log_messages[start..end].iter().map(log_line).collect();

        let log_panel = Paragraph::new(log_lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Logs ")
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(log_panel, chunks[1]);
    }
}

/// Colored rendering of one log record.
fn log_line(line: &LogLine) -> Line<'_> {
    let prefix_color = match line.color {
        COLOR_GRAY => Color::DarkGray,
        COLOR_BLUE => Color::LightBlue,
        _ => Color::White,
    };
    let msg_color = if line.level == Level::Debug { Color::DarkGray } else { prefix_color };

    let mut spans = vec![
        Span::styled(line.timestamp.as_str(), Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];

    // Level tag: only show for warn/error
    match line.level {
        Level::Error => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        Level::Warn => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        Level::Debug | Level::Info => {}
    }

    if !line.prefix.is_empty() {
        spans.push(Span::styled(
            line.prefix.as_str(),
            Style::default().fg(prefix_color).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw(" "));
    }

    spans.push(Span::styled(line.message.as_str(), Style::default().fg(msg_color)));
    Line::from(spans)
}
