//! TUI描画関連の関数。

use ratatui::{
    Frame,
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph, Row, Table, Wrap},
};

use crate::{
    delay::format_countdown,
    events::Screen,
    input,
    jobs::{JobStatus, UploadJob},
    layout,
    shortcuts::Shortcuts,
};

use super::{App, cookie_file_problem};

/// 画面全体のレイアウトを描画する。
pub fn draw(f: &mut Frame, app: &App) {
    // メインレイアウト（Body + HELP + STATUS）を作る。
    let main_layout = layout::create_main_layout(f.area());
    let body_layout = layout::create_body_layout(main_layout.body);

    // ジョブ一覧からテーブル行を組み立てる。
    let rows = app.queue.iter().map(|j| {
        Row::new(vec![
            j.position.to_string(),
            j.file_name(),
            status_str(j.status).to_string(),
            j.description.clone(),
        ])
        .style(status_style(j.status))
    });

    // ジョブテーブルのウィジェットを構築する。
    let title = if app.queue.is_locked() {
        "VIDEOS (locked)"
    } else {
        "VIDEOS"
    };
    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Percentage(35),
            Constraint::Length(10),
            Constraint::Min(10),
        ],
    )
    .block(Block::default().borders(Borders::ALL).title(title))
    .header(Row::new(vec!["#", "file", "status", "description"]).bold())
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(255, 140, 0)) // オレンジ色の背景
            .fg(Color::Black) // 黒文字
            .add_modifier(Modifier::BOLD),
    );

    // 選択中の行をハイライトする。
    let mut table_state = ratatui::widgets::TableState::default();
    if !app.queue.is_empty() {
        table_state.select(Some(app.ui.selected));
    }
    f.render_stateful_widget(table, body_layout.jobs_table, &mut table_state);

    // 右パネル：設定画面では編集中の値、それ以外は選択情報とログ。
    let info_text = if app.ui.screen == Screen::Settings {
        build_settings_info_text(app)
    } else {
        build_main_info_text(app, app.queue.get_index(app.ui.selected))
    };
    let info_panel = Paragraph::new(info_text)
        .block(Block::default().borders(Borders::ALL).title("INFO"))
        .wrap(Wrap { trim: true });
    f.render_widget(info_panel, body_layout.info_panel);

    // HELPバー（画面ごとのショートカット）を描画する。
    let help_text = get_help_text(&app.ui.screen, &app.shortcuts);
    let help_bar = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title("HELP"))
        .wrap(Wrap { trim: true });
    f.render_widget(help_bar, main_layout.help_bar);

    // STATUSバー（画面名・件数・カウントダウン・エラー）を描画する。
    let status_bar = build_status_bar(app);
    f.render_widget(status_bar, main_layout.status_bar);

    if app.ui.screen == Screen::ConfirmClear {
        draw_confirm_clear(f, app);
    }

    // 入力ボックスが開いていれば重ねて描画する。
    if let Some(input_state) = &app.input_box {
        input::render_input_box(f, input_state);
    }
}

/// メイン画面用の情報テキストを構築する。
fn build_main_info_text(app: &App, selected: Option<&UploadJob>) -> String {
    let mut lines = vec![];
    match selected {
        Some(j) => {
            lines.push(format!("File: {}", j.path));
            lines.push(format!("Description: {}", j.effective_description()));
            if let Some(err) = &j.last_error {
                lines.push(format!("Error: {err}"));
            }
        }
        None => lines.push("No video selected".into()),
    }
    lines.push(String::new());

    // 現在の実行設定。
    let delay = app.cfg.delay_policy();
    let cookies = &app.cfg.session.cookies_file;
    lines.push(match cookie_file_problem(cookies) {
        Some(problem) => format!("Cookies: {} ({problem})", cookies.display()),
        None => format!("Cookies: {}", cookies.display()),
    });
    lines.push(if delay.enabled() {
        format!(
            "Delay: {}-{} min",
            delay.min_minutes(),
            delay.max_minutes()
        )
    } else {
        "Delay: off".into()
    });
    if let Some(s) = &app.ui.last_summary {
        lines.push(format!("Last run: {}", s.headline()));
    }
    lines.push(String::new());

    // 直近のログのみ表示する。
    lines.push("Log:".into());
    lines.extend(app.ui.log.iter().rev().take(12).rev().cloned());
    lines.join("\n")
}

/// 設定画面用の情報テキストを構築する。
fn build_settings_info_text(app: &App) -> String {
    let d = &app.draft;
    let sc = &app.shortcuts.settings;
    [
        "Settings (not saved yet)".to_string(),
        String::new(),
        format!("[{}] Cookie file: {}", format_keys(&sc.cookies_file), d.cookies_file),
        format!(
            "[{}] Delay between uploads: {}",
            format_keys(&sc.toggle_delay),
            if d.delay_enabled { "on" } else { "off" }
        ),
        format!("[{}] Min minutes: {}", format_keys(&sc.min_delay), d.min_minutes),
        format!("[{}] Max minutes: {}", format_keys(&sc.max_delay), d.max_minutes),
        format!("[{}] Endpoint: {}", format_keys(&sc.endpoint), d.endpoint),
    ]
    .join("\n")
}

/// ステータスバーを構築する。
fn build_status_bar(app: &App) -> Paragraph<'static> {
    let screen_name = match app.ui.screen {
        Screen::Main => "Main",
        Screen::Settings => "Settings",
        Screen::ConfirmClear => "Clear",
    };

    // ジョブ件数と完了数を集計する。
    let job_info = format!(
        "Videos: {} total, {} uploaded, {} failed",
        app.queue.len(),
        app.queue.count(JobStatus::Succeeded),
        app.queue.count(JobStatus::Failed),
    );

    // 待機中は残り時間を先頭に出す。
    let status = match app.ui.countdown {
        Some(secs) => format!("Next upload in {} | {}", format_countdown(secs), app.ui.status),
        None => app.ui.status.clone(),
    };

    // エラーの有無でステータス文字列を切り替える。
    let status_text = if let Some(err) = &app.ui.error {
        format!("[{}] {} | ERROR: {}", screen_name, job_info, err)
    } else {
        format!("[{}] {} | {}", screen_name, job_info, status)
    };

    let mut status_bar = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("STATUS"))
        .wrap(Wrap { trim: true });

    // エラー時は赤色で強調表示する。
    if app.ui.error.is_some() {
        status_bar = status_bar.style(Style::default().fg(Color::Red));
    }

    status_bar
}

/// 全削除の確認ダイアログを描画する。
fn draw_confirm_clear(f: &mut Frame, app: &App) {
    let area = layout::centered_popup(f.area(), 50, 5);
    f.render_widget(Clear, area);
    let text = format!(
        "Remove all {} video(s) from the queue?\n\n{}: yes | {}: no",
        app.queue.len(),
        format_keys(&app.shortcuts.confirm.yes),
        format_keys(&app.shortcuts.confirm.no)
    );
    let dialog = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Confirm"))
        .style(Style::default().bg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(dialog, area);
}

/// 現在画面に応じたヘルプ文字列を返す。
fn get_help_text(screen: &Screen, shortcuts: &Shortcuts) -> String {
    match screen {
        Screen::Main => {
            let m = &shortcuts.main;
            format!(
                "{}: add | {}: remove | {}: description | {}: bulk | {}: start | {}: cancel run | {}: clear | {}: settings | {}: quit | {}/{}: navigate",
                format_keys(&m.add),
                format_keys(&m.remove),
                format_keys(&m.edit),
                format_keys(&m.bulk),
                format_keys(&m.start),
                format_keys(&m.cancel_run),
                format_keys(&m.clear),
                format_keys(&m.settings),
                format_keys(&m.quit),
                format_keys(&m.up),
                format_keys(&m.down)
            )
        }
        Screen::Settings => format!(
            "{}: cookies | {}: delay on/off | {}: min | {}: max | {}: endpoint | {}: save | {}: cancel",
            format_keys(&shortcuts.settings.cookies_file),
            format_keys(&shortcuts.settings.toggle_delay),
            format_keys(&shortcuts.settings.min_delay),
            format_keys(&shortcuts.settings.max_delay),
            format_keys(&shortcuts.settings.endpoint),
            format_keys(&shortcuts.settings.save),
            format_keys(&shortcuts.settings.cancel)
        ),
        Screen::ConfirmClear => format!(
            "{}: clear the queue | {}: keep it",
            format_keys(&shortcuts.confirm.yes),
            format_keys(&shortcuts.confirm.no)
        ),
    }
}

/// ショートカットキーの配列を表示用文字列に変換する。
fn format_keys(keys: &[String]) -> String {
    keys.join("/")
}

/// ジョブ状態を一覧表示用の短いラベルへ変換する。
fn status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "Pending",
        JobStatus::Preparing => "Preparing",
        JobStatus::Uploading => "Uploading",
        JobStatus::Succeeded => "Done",
        JobStatus::Failed => "Failed",
    }
}

/// 状態ごとの行の色。
fn status_style(s: JobStatus) -> Style {
    match s {
        JobStatus::Succeeded => Style::default().fg(Color::Green),
        JobStatus::Failed => Style::default().fg(Color::Red),
        JobStatus::Preparing | JobStatus::Uploading => Style::default().fg(Color::Yellow),
        JobStatus::Pending => Style::default(),
    }
}
