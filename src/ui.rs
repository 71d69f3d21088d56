use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use serde_json::Value;

use crate::app::{App, DetailPage, DialogField, FlashLevel, InputMode, LogPane, Page};
use crate::model::ResourceKind;
use crate::session::SessionState;
use crate::view::{Lifecycle, ResourceView};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const PL_D: Color = Color::Rgb(82, 24, 124);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    if app.dialog().is_some() {
        render_port_forward_dialog(frame, app);
    }
    if app.show_help() {
        render_help_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let left_line = build_left_header_line(app);
    let right_line = build_right_header_line(app);
    let right_width = spans_width(&right_line.spans) as u16;
    if area.width < 42 || right_width == 0 || right_width >= area.width {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right_line).style(Style::default().bg(BG)),
        chunks[1],
    );
}

fn build_left_header_line(app: &App) -> Line<'static> {
    let mut spans = Vec::new();
    push_powerline_segment(
        &mut spans,
        format!(" ⎈ {} ", compact_text(app.context(), 24)),
        Color::White,
        PL_A,
        PL_B,
    );
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(&display_cluster_endpoint(app.cluster()), 32)),
        Color::White,
        PL_B,
        PL_C,
    );
    push_powerline_segment(
        &mut spans,
        format!(" ns:{} ", app.namespace().unwrap_or("all")),
        Color::White,
        PL_C,
        BG,
    );
    Line::from(spans)
}

fn build_right_header_line(app: &App) -> Line<'static> {
    let crumbs = app.breadcrumbs();
    let mut spans = Vec::new();
    let mut next_bg = BG;
    let last = crumbs.len().saturating_sub(1);
    for (index, crumb) in crumbs.into_iter().enumerate() {
        let active = index == last;
        let bg = if active {
            Color::Rgb(59, 130, 246)
        } else {
            PL_D
        };
        let fg = if active { Color::Black } else { Color::White };
        push_powerline_segment_rtl(
            &mut spans,
            format!(" {} ", compact_text(&crumb, 28)),
            fg,
            bg,
            next_bg,
        );
        next_bg = bg;
    }
    if !spans.is_empty() {
        spans.push(Span::styled(" ", Style::default().bg(next_bg)));
    }
    Line::from(spans)
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    match app.current_page() {
        Page::Resource(view) => render_table(frame, area, app, view),
        Page::Detail(page) => render_detail(frame, area, page),
        Page::Logs(pane) => render_logs(frame, area, pane),
    }
}

fn render_table(frame: &mut Frame, area: Rect, app: &App, view: &ResourceView) {
    let table_data = view.table();
    if let Some(error) = table_data.error.as_deref() {
        let panel = Paragraph::new(Text::from(error.to_string()))
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .title(format!("{} Error", view.title()))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(ERROR))
                    .style(Style::default().bg(PANEL)),
            )
            .style(Style::default().fg(ERROR));
        frame.render_widget(panel, area);
        return;
    }

    let include_pf_column = view.kind() == ResourceKind::Pods;
    let sort = view.sort();
    let mut headers = table_data
        .headers
        .iter()
        .enumerate()
        .map(|(index, header)| match sort {
            Some((column, ascending)) if column == index => {
                format!("{header}{}", if ascending { "↑" } else { "↓" })
            }
            _ => header.clone(),
        })
        .collect::<Vec<_>>();
    if include_pf_column {
        headers.push("PF".to_string());
    }

    let header_row = Row::new(headers.iter().map(|header| {
        Cell::from(header.clone()).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let status_column = view.kind().status_column();
    let rows = table_data.rows.iter().map(|row| {
        let mut cells = row
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let color = if Some(index) == status_column {
                    status_color(column)
                } else {
                    Color::White
                };
                Cell::from(column.clone()).style(Style::default().fg(color))
            })
            .collect::<Vec<_>>();
        if include_pf_column {
            let forwarded = view
                .row_path(row)
                .is_some_and(|path| app.sessions().targets(&path));
            cells.push(
                Cell::from(if forwarded { "⇄" } else { "" }).style(Style::default().fg(ACCENT)),
            );
        }
        Row::new(cells)
    });

    let refreshed = table_data
        .last_refreshed
        .map(|at| format!("  {}", at.format("%H:%M:%S")))
        .unwrap_or_default();
    let paused = if view.lifecycle() == Lifecycle::Stopped {
        "  paused"
    } else {
        ""
    };
    let title = format!(
        "{} [{}]{refreshed}{paused}",
        view.title(),
        table_data.rows.len()
    );
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));

    let table = Table::new(rows, column_constraints(headers.len()))
        .header(header_row)
        .block(block)
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("󰜴 ");

    let mut state = TableState::default();
    state.select(view.selection().map(|selection| selection.index));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_detail(frame: &mut Frame, area: Rect, page: &DetailPage) {
    let block = Block::default()
        .title(page.title.clone())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));
    let max_scroll = (page.text.lines().count() as u16).saturating_sub(1);
    let paragraph = Paragraph::new(highlight_structured_text(&page.text))
        .block(block)
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false })
        .scroll((page.scroll.min(max_scroll), 0));

    frame.render_widget(paragraph, area);
}

fn render_logs(frame: &mut Frame, area: Rect, pane: &LogPane) {
    let height = text_viewport_height(area);
    let bottom = pane.lines.len().saturating_sub(height);
    let offset = if pane.follow {
        bottom
    } else {
        (pane.scroll as usize).min(bottom)
    };

    let lines = pane
        .lines
        .iter()
        .skip(offset)
        .take(height)
        .map(|line| Line::from(line.clone()))
        .collect::<Vec<_>>();
    let state = match (pane.ended, pane.follow) {
        (true, _) => " ended",
        (false, true) => " following",
        (false, false) => " paused",
    };
    let block = Block::default()
        .title(format!("{}{state}", pane.title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if pane.ended { MUTED } else { ACCENT }))
        .style(Style::default().bg(PANEL));

    frame.render_widget(
        Paragraph::new(lines)
            .block(block)
            .style(Style::default().fg(Color::White)),
        area,
    );
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    if app.mode() == InputMode::Command {
        let mut spans = Vec::new();
        push_powerline_segment(&mut spans, " 󰘳 cmd ", Color::Black, ACCENT, PL_B);
        push_powerline_segment(
            &mut spans,
            format!(" :{} ", app.input()),
            Color::White,
            PL_B,
            BG,
        );
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let mut spans = Vec::new();
    let (status_text, status_fg, status_bg) = match app.flash() {
        Some(flash) => {
            let bg = match flash.level {
                FlashLevel::Info => PL_B,
                FlashLevel::Warn => WARN,
                FlashLevel::Error => ERROR,
            };
            let fg = if flash.level == FlashLevel::Info {
                Color::White
            } else {
                Color::Black
            };
            (flash.message.clone(), fg, bg)
        }
        None => (String::from("ready"), Color::White, PL_B),
    };
    let mode_label = if app.is_suspended() {
        " 󰏤 sus "
    } else {
        " 󰘳 nrm "
    };
    push_powerline_segment(&mut spans, mode_label, Color::White, PL_A, status_bg);
    let status_width_hint = area.width.saturating_sub(24).min(120) as usize;
    push_powerline_segment(
        &mut spans,
        format!(
            " {} ",
            compact_text(
                status_text.lines().next().unwrap_or(""),
                status_width_hint.max(24)
            )
        ),
        status_fg,
        status_bg,
        BG,
    );

    let mut right_spans = hint_spans(&app.active_hints());
    if !app.sessions().is_empty() {
        push_powerline_segment_rtl(
            &mut right_spans,
            format!(" ⇄ {} ", app.sessions().len()),
            Color::Black,
            ACCENT,
            BG,
        );
    }
    let min_left = 28u16;
    let max_right = area.width.saturating_sub(min_left);
    let right_width = (spans_width(&right_spans) as u16).min(max_right);
    if right_width == 0 {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(Line::from(right_spans))
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn hint_spans(hints: &[(String, String)]) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for (key, description) in hints {
        spans.push(Span::styled(
            format!("<{key}>"),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(
            format!(" {description}  "),
            Style::default().fg(MUTED),
        ));
    }
    spans
}

fn render_port_forward_dialog(frame: &mut Frame, app: &App) {
    let Some(dialog) = app.dialog() else {
        return;
    };
    let area = centered_rect(50, 30, frame.area());
    frame.render_widget(Clear, area);

    let field_line = |label: &str, value: &str, active: bool| {
        let style = if active {
            Style::default()
                .fg(Color::Black)
                .bg(ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        Line::from(vec![
            Span::styled(format!("{label:>12} "), Style::default().fg(MUTED)),
            Span::styled(format!(" {value} "), style),
        ])
    };

    let mut lines = vec![
        Line::from(format!("{}  container:{}", dialog.path, dialog.container)),
        Line::from(""),
        field_line(
            "local port",
            &dialog.local,
            dialog.field == DialogField::Local,
        ),
        field_line(
            "remote port",
            &dialog.remote,
            dialog.field == DialogField::Remote,
        ),
        Line::from(""),
    ];
    let establishing = dialog
        .pending
        .as_ref()
        .is_some_and(|fqn| app.sessions().state(fqn) == SessionState::Requested);
    if establishing {
        lines.push(Line::styled(
            "establishing…",
            Style::default().fg(WARN),
        ));
    } else {
        lines.push(Line::styled(
            "enter start  tab switch field  esc cancel",
            Style::default().fg(MUTED),
        ));
    }

    let modal = Paragraph::new(lines)
        .block(
            Block::default()
                .title("Port-forward")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(60, 70, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!(
            "kdeck help  context:{}  view:{}",
            app.context(),
            app.current_page().title()
        )),
        Line::from(""),
        Line::styled("This view", Style::default().fg(ACCENT)),
    ];
    lines.extend(help_lines(&app.active_hints()));
    lines.push(Line::from(""));
    lines.push(Line::styled("Everywhere", Style::default().fg(ACCENT)));
    lines.extend(help_lines(&app.global_hints()));
    lines.push(Line::from(""));
    lines.push(Line::styled(
        "Commands: ns po co svc deploy cm secrets pf [namespace|ns/pod]  q",
        Style::default().fg(MUTED),
    ));

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(modal, area);
}

fn help_lines(hints: &[(String, String)]) -> Vec<Line<'static>> {
    hints
        .iter()
        .map(|(key, description)| {
            Line::from(vec![
                Span::styled(format!("{key:>12}  "), Style::default().fg(WARN)),
                Span::raw(description.clone()),
            ])
        })
        .collect()
}

fn status_color(status: &str) -> Color {
    match status {
        "Running" | "Active" | "Completed" | "true" => ACCENT,
        "Pending" | "ContainerCreating" | "PodInitializing" | "Terminating" | "Idle" => WARN,
        "Failed" | "Error" | "CrashLoopBackOff" | "ImagePullBackOff" | "ErrImagePull"
        | "OOMKilled" | "Unknown" => ERROR,
        _ => Color::White,
    }
}

fn highlight_structured_text(input: &str) -> Text<'static> {
    let trimmed = input.trim_start();
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(trimmed).is_ok()
    {
        return highlight_json_text(trimmed);
    }
    highlight_yaml_text(input)
}

fn highlight_json_text(input: &str) -> Text<'static> {
    let lines = input
        .lines()
        .map(|line| match split_json_key_value(line) {
            Some((indent, key, value)) => Line::from(vec![
                Span::raw(indent.to_string()),
                Span::styled(key.to_string(), Style::default().fg(Color::Rgb(103, 232, 249))),
                Span::styled(":", Style::default().fg(MUTED)),
                Span::styled(
                    value.to_string(),
                    Style::default().fg(yaml_value_color(value.trim().trim_end_matches(','))),
                ),
            ]),
            None => Line::styled(line.to_string(), Style::default().fg(MUTED)),
        })
        .collect::<Vec<Line<'static>>>();
    Text::from(lines)
}

fn split_json_key_value(line: &str) -> Option<(&str, &str, &str)> {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];
    if !trimmed.starts_with('"') {
        return None;
    }
    let (key, value) = trimmed.split_once("\":")?;
    Some((indent, &trimmed[..key.len() + 1], value))
}

fn highlight_yaml_text(input: &str) -> Text<'static> {
    let lines = input
        .lines()
        .map(highlight_yaml_line)
        .collect::<Vec<Line<'static>>>();
    Text::from(lines)
}

fn highlight_yaml_line(line: &str) -> Line<'static> {
    let indent_len = line
        .as_bytes()
        .iter()
        .take_while(|byte| **byte == b' ' || **byte == b'\t')
        .count();
    let indent = &line[..indent_len];
    let trimmed = &line[indent_len..];

    let mut spans = vec![Span::raw(indent.to_string())];
    if trimmed.is_empty() {
        return Line::from(spans);
    }

    if let Some(comment) = trimmed.strip_prefix('#') {
        spans.push(Span::styled(
            format!("#{comment}"),
            Style::default().fg(MUTED),
        ));
        return Line::from(spans);
    }

    if let Some(rest) = trimmed.strip_prefix("- ") {
        spans.push(Span::styled("- ", Style::default().fg(ACCENT)));
        spans.extend(highlight_yaml_content(rest));
        return Line::from(spans);
    }

    spans.extend(highlight_yaml_content(trimmed));
    Line::from(spans)
}

fn highlight_yaml_content(content: &str) -> Vec<Span<'static>> {
    if let Some((key, value)) = split_yaml_key_value(content) {
        let mut spans = vec![
            Span::styled(
                key.to_string(),
                Style::default().fg(Color::Rgb(103, 232, 249)),
            ),
            Span::styled(":", Style::default().fg(MUTED)),
        ];

        if value.trim().is_empty() {
            return spans;
        }

        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            value.trim_start().to_string(),
            Style::default().fg(yaml_value_color(value.trim())),
        ));
        spans
    } else {
        vec![Span::styled(
            content.to_string(),
            Style::default().fg(Color::White),
        )]
    }
}

fn split_yaml_key_value(content: &str) -> Option<(&str, &str)> {
    let (key, value) = content.split_once(':')?;
    let key = key.trim_end();
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    Some((key, value))
}

fn yaml_value_color(value: &str) -> Color {
    if value.starts_with('"') || value.starts_with('\'') {
        Color::Rgb(125, 211, 252)
    } else if matches!(value, "true" | "false" | "null" | "~") {
        WARN
    } else if value.parse::<f64>().is_ok() {
        Color::Rgb(251, 146, 60)
    } else if value.starts_with('{') || value.starts_with('[') {
        MUTED
    } else {
        Color::Rgb(147, 197, 253)
    }
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn push_powerline_segment_rtl(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn text_viewport_height(area: Rect) -> usize {
    area.height.saturating_sub(2).max(1) as usize
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn display_cluster_endpoint(cluster: &str) -> String {
    let cluster = cluster.trim().trim_end_matches('/');
    cluster
        .strip_prefix("https://")
        .or_else(|| cluster.strip_prefix("http://"))
        .unwrap_or(cluster)
        .to_string()
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
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
        .split(popup_layout[1])[1]
}

fn column_constraints(columns: usize) -> Vec<Constraint> {
    if columns == 0 {
        return vec![Constraint::Percentage(100)];
    }

    let width = (100 / columns as u16).max(1);
    (0..columns)
        .map(|_| Constraint::Percentage(width))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{compact_text, display_cluster_endpoint, render, split_json_key_value};
    use crate::app::App;
    use crate::config::Settings;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    #[test]
    fn cluster_endpoint_drops_scheme_and_trailing_slash() {
        assert_eq!(
            display_cluster_endpoint("https://10.0.0.1:6443/"),
            "10.0.0.1:6443"
        );
        assert_eq!(display_cluster_endpoint("http://kind"), "kind");
    }

    #[test]
    fn compact_text_marks_truncation() {
        assert_eq!(compact_text("kube-system", 6), "kube-…");
        assert_eq!(compact_text("ns", 6), "ns");
    }

    #[test]
    fn json_keys_are_split_from_values() {
        assert_eq!(
            split_json_key_value("  \"password\": \"hunter2\","),
            Some(("  ", "\"password\"", " \"hunter2\","))
        );
        assert_eq!(split_json_key_value("{"), None);
    }

    #[test]
    fn renders_root_view_with_breadcrumbs() {
        let app = App::new(
            "https://127.0.0.1:6443".to_string(),
            "kind-dev".to_string(),
            Some("ns1".to_string()),
            Settings::default(),
        );
        let mut terminal = Terminal::new(TestBackend::new(120, 20)).expect("terminal");
        terminal.draw(|frame| render(frame, &app)).expect("draw");

        let buffer = terminal.backend().buffer().clone();
        let screen = buffer
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>();
        assert!(screen.contains("kind-dev"));
        assert!(screen.contains("po(ns1)"));
    }
}
