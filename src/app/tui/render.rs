use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Gauge, Paragraph, Wrap};

use super::super::module::{completion_label, completion_percentage, format_clock, truncate};
use super::super::player::{Dimension, MediaEngine, PlayerPhase, RenderHints};
use super::{FetchKind, ModulePage};

pub(super) fn draw_tui(
    frame: &mut Frame,
    page: Option<&ModulePage>,
    status: &str,
    pending_fetch: Option<FetchKind>,
) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    frame.render_widget(header(page, pending_fetch), chunks[0]);

    match page {
        Some(page) => draw_module_body(frame, page, chunks[1]),
        None => {
            let loading = Paragraph::new("Loading...")
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::Rgb(185, 195, 210)))
                .block(panel_block("Module"));
            frame.render_widget(loading, chunks[1]);
        }
    }

    let controls = Paragraph::new(controls_line(page))
        .alignment(Alignment::Center)
        .block(panel_block("Controls"));
    frame.render_widget(controls, chunks[2]);

    let status_widget = Paragraph::new(status.to_string())
        .style(status_style(status))
        .block(panel_block("Status"));
    frame.render_widget(status_widget, chunks[3]);
}

fn header(page: Option<&ModulePage>, pending_fetch: Option<FetchKind>) -> Paragraph<'static> {
    let mut spans = vec![Span::styled(
        "LESSONPLAY",
        Style::default()
            .fg(Color::Rgb(110, 170, 255))
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(page) = page {
        let module = &page.snapshot.module;
        spans.push(Span::raw("   "));
        spans.push(Span::styled(
            format!("module {}", module.serial_number),
            Style::default().fg(Color::Rgb(185, 195, 210)),
        ));
        spans.push(Span::raw("   "));
        spans.push(Span::styled(
            truncate(&module.name, 40),
            Style::default().fg(Color::Rgb(230, 230, 230)),
        ));
    }
    if pending_fetch.is_some() {
        spans.push(Span::raw("   "));
        spans.push(Span::styled("loading", Style::default().fg(Color::Yellow)));
    }
    Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(panel_block("Course"))
}

fn draw_module_body(frame: &mut Frame, page: &ModulePage, area: Rect) {
    let (video_width, video_height) = video_constraints(page.player.hints());
    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), video_width])
        .split(area);
    let side_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([video_height, Constraint::Length(3), Constraint::Length(3)])
        .split(body_chunks[1]);

    let module = &page.snapshot.module;
    let text = Paragraph::new(vec![
        Line::from(Span::styled(
            module.heading.clone(),
            Style::default()
                .fg(Color::Rgb(230, 230, 230))
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(module.content.clone()),
    ])
    .style(Style::default().fg(Color::Rgb(205, 210, 220)))
    .wrap(Wrap { trim: true })
    .block(panel_block("Module"));
    frame.render_widget(text, body_chunks[0]);

    let player = &page.player;
    let video = &page.snapshot.progress.video;
    let video_text = if player.has_playable_source() {
        let state = player.state();
        let engine = player.engine();
        let time_text = format!(
            "{} / {}",
            engine.current_time().map(format_clock).unwrap_or_else(|| "--:--".to_string()),
            engine.duration().map(format_clock).unwrap_or_else(|| "--:--".to_string()),
        );
        let volume_text = if state.muted {
            format!("{:.0}% (muted)", state.volume * 100.0)
        } else {
            format!("{:.0}%", state.volume * 100.0)
        };
        let mut text = format!(
            "{}\n{}\n\nState    {}\nTime     {}\nVolume   {}",
            truncate(&video.title, 40),
            truncate(player.current_locator().unwrap_or_default(), 40),
            player.phase(),
            time_text,
            volume_text,
        );
        if let Some(seconds) = player.resumed_from() {
            text.push_str(&format!("\nResumed  from {}", format_clock(seconds)));
        }
        text
    } else {
        "No valid video sources available.".to_string()
    };
    let video_panel = Paragraph::new(video_text)
        .style(Style::default().fg(Color::Rgb(230, 230, 230)))
        .block(panel_block("Video"));
    frame.render_widget(video_panel, side_chunks[0]);

    let played = player.state().played_fraction;
    let playback = Gauge::default()
        .block(panel_block("Playback"))
        .gauge_style(
            Style::default()
                .fg(Color::Rgb(130, 190, 255))
                .bg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .label(format!("{:.0}%", played * 100.0))
        .ratio(played.clamp(0.0, 1.0));
    frame.render_widget(playback, side_chunks[1]);

    let progress = &page.snapshot.progress;
    let percent = completion_percentage(progress);
    let course = Gauge::default()
        .block(panel_block("Module Progress"))
        .gauge_style(
            Style::default()
                .fg(Color::Rgb(0, 191, 255))
                .bg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .label(format!("{percent}% {}", completion_label(progress)))
        .percent(percent);
    frame.render_widget(course, side_chunks[2]);
}

fn video_constraints(hints: RenderHints) -> (Constraint, Constraint) {
    let width = match hints.width {
        Dimension::Cells(cells) => Constraint::Length(cells),
        Dimension::Fill | Dimension::Auto => Constraint::Percentage(45),
    };
    let height = match hints.height {
        Dimension::Cells(cells) => Constraint::Length(cells),
        Dimension::Fill | Dimension::Auto => Constraint::Min(9),
    };
    (width, height)
}

fn panel_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(125, 135, 150)))
        .title(title)
}

fn pill(active: bool) -> Style {
    if active {
        Style::default()
            .bg(Color::Rgb(110, 170, 255))
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
            .bg(Color::Rgb(72, 82, 96))
            .fg(Color::Rgb(230, 235, 242))
    }
}

fn controls_line(page: Option<&ModulePage>) -> Line<'static> {
    let (playing, muted, finished) = page
        .map(|page| {
            let state = page.player.state();
            (
                state.is_playing,
                state.muted,
                page.player.phase() == PlayerPhase::Stopped,
            )
        })
        .unwrap_or((false, false, false));
    let play_label = if playing { " PAUSE " } else { " PLAY " };

    Line::from(vec![
        Span::styled(play_label, pill(playing)),
        Span::raw(" "),
        Span::styled(" MUTE ", pill(muted)),
        Span::raw(" "),
        Span::styled(" NEXT MODULE ", pill(finished)),
        Span::styled(
            "   space play  ←/→ 10s  +/- volume  m mute  n next  r reload  q quit",
            Style::default().fg(Color::Rgb(185, 195, 210)),
        ),
    ])
}

fn status_style(status: &str) -> Style {
    if status.starts_with("ERROR:") {
        Style::default()
            .fg(Color::Rgb(255, 145, 120))
            .add_modifier(Modifier::BOLD)
    } else if status.starts_with("INFO:") {
        Style::default().fg(Color::Rgb(205, 165, 255))
    } else {
        Style::default().fg(Color::Rgb(230, 235, 242))
    }
}
