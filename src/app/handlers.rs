//! キー入力ハンドラー関数。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;

use crate::{
    delay::DelayPolicy,
    discovery,
    error::PreconditionError,
    events::Screen,
    input::{InputBoxState, InputCallbackId},
    shortcuts,
    template::BulkDescriptionTemplate,
    worker::WorkerCmd,
};

use super::{App, SettingsDraft, report_queue_error};

/// キー入力を1件処理し、終了すべきならtrueを返す。
pub async fn handle_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 入力ボックスが開いていれば最優先で処理する。
    if app.input_box.is_some() {
        return handle_input_box_key(app, k).await;
    }

    // 画面ごとのハンドラへ委譲する。
    match app.ui.screen {
        Screen::Main => handle_main_key(app, k).await,
        Screen::Settings => handle_settings_key(app, k).await,
        Screen::ConfirmClear => handle_confirm_clear_key(app, k),
    }
}

/// Ctrl+Cかどうかを判定する。
pub fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

/// メイン画面のキー処理。
async fn handle_main_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // メイン画面のショートカットを参照する。
    let sc = &app.shortcuts.main;

    if shortcuts::matches_shortcut(&k, &sc.quit) {
        return Ok(true);
    } else if shortcuts::matches_shortcut(&k, &sc.settings) {
        // 設定画面へ遷移し、編集バッファを更新する。
        app.draft = SettingsDraft::from_config(&app.cfg);
        app.ui.screen = Screen::Settings;
        app.ui.status = "Settings".into();
    } else if shortcuts::matches_shortcut(&k, &sc.down) {
        // 次の行へ移動する。
        if app.ui.selected + 1 < app.queue.len() {
            app.ui.selected += 1;
        }
    } else if shortcuts::matches_shortcut(&k, &sc.up) {
        // 前の行へ移動する。
        app.ui.selected = app.ui.selected.saturating_sub(1);
    } else if shortcuts::matches_shortcut(&k, &sc.add) {
        // ファイルまたはフォルダのパスを尋ねる。
        app.input_box = Some(InputBoxState::new(
            "Video file or folder path:",
            "",
            InputCallbackId::AddPath,
        ));
    } else if shortcuts::matches_shortcut(&k, &sc.remove) {
        remove_selected(app);
    } else if shortcuts::matches_shortcut(&k, &sc.edit) {
        // 選択ジョブの説明文を編集する。
        if app.queue.is_locked() {
            app.ui.status = "Descriptions are locked during a run".into();
        } else if let Some(j) = app.queue.get_index(app.ui.selected) {
            app.input_box = Some(InputBoxState::new(
                format!("Description for {}:", j.file_name()),
                j.description.clone(),
                InputCallbackId::EditDescription(j.id),
            ));
        }
    } else if shortcuts::matches_shortcut(&k, &sc.bulk) {
        // 一括説明文は固定テキスト→開始番号の順に尋ねる。
        if app.queue.is_locked() {
            app.ui.status = "Descriptions are locked during a run".into();
        } else if app.queue.is_empty() {
            app.ui.status = "Add videos first".into();
        } else {
            app.input_box = Some(InputBoxState::new(
                "Bulk description text:",
                app.cfg.bulk.fixed_text.clone(),
                InputCallbackId::BulkText,
            ));
        }
    } else if shortcuts::matches_shortcut(&k, &sc.start) {
        start_run(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.cancel_run) {
        if app.queue.is_locked() {
            app.worker_tx.send(WorkerCmd::CancelRun).await?;
            app.ui.status = "Cancelling...".into();
        } else {
            app.ui.status = "No upload is running".into();
        }
    } else if shortcuts::matches_shortcut(&k, &sc.clear) {
        // 実行中や空のときは確認画面を出さない。
        if app.queue.is_locked() {
            app.ui.status = "The queue is locked during a run".into();
        } else if app.queue.is_empty() {
            app.ui.status = "The queue is already empty".into();
        } else {
            app.ui.screen = Screen::ConfirmClear;
        }
    }

    Ok(false)
}

/// 選択中のジョブをキューから外す。
fn remove_selected(app: &mut App) {
    let Some(id) = app.queue.get_index(app.ui.selected).map(|j| j.id) else {
        return;
    };
    match app.queue.remove(id) {
        Ok(Some(j)) => {
            app.push_log(format!("Removed: {}", j.file_name()));
            app.clamp_selection();
        }
        Ok(None) => {}
        Err(e) => report_queue_error(app, e),
    }
}

/// キューを固定してWorkerへ実行を依頼する。
async fn start_run(app: &mut App) -> Result<()> {
    if app.queue.is_locked() {
        app.ui.error = Some(PreconditionError::RunAlreadyActive.to_string());
        return Ok(());
    }
    if app.queue.is_empty() {
        app.ui.error = Some(PreconditionError::EmptyQueue.to_string());
        return Ok(());
    }
    // 前回の結果はRunStartedを受けるまで残す。
    app.queue.lock();
    app.ui.error = None;
    app.ui.last_summary = None;
    tracing::info!("run requested: {} job(s)", app.queue.len());
    app.worker_tx
        .send(WorkerCmd::StartRun {
            jobs: app.queue.snapshot(),
            delay: app.cfg.delay_policy(),
        })
        .await?;
    app.ui.status = "Starting upload...".into();
    Ok(())
}

/// 設定画面のキー処理。
async fn handle_settings_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 設定画面のショートカットを参照する。
    let sc = &app.shortcuts.settings;

    if shortcuts::matches_shortcut(&k, &sc.cancel) {
        // 変更を破棄してメイン画面へ戻る。
        app.draft = SettingsDraft::from_config(&app.cfg);
        app.ui.screen = Screen::Main;
    } else if shortcuts::matches_shortcut(&k, &sc.save) {
        save_settings(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.toggle_delay) {
        // 待機の有効/無効を切り替える。
        app.draft.delay_enabled = !app.draft.delay_enabled;
    } else if shortcuts::matches_shortcut(&k, &sc.cookies_file) {
        // クッキーファイルの入力ボックスを開く。
        app.input_box = Some(InputBoxState::new(
            "Cookie file path:",
            app.draft.cookies_file.clone(),
            InputCallbackId::SettingsCookiesFile,
        ));
    } else if shortcuts::matches_shortcut(&k, &sc.min_delay) {
        // 最小待機時間（分）の入力ボックスを開く。
        app.input_box = Some(InputBoxState::new(
            "Minimum delay (minutes):",
            app.draft.min_minutes.clone(),
            InputCallbackId::SettingsMinDelay,
        ));
    } else if shortcuts::matches_shortcut(&k, &sc.max_delay) {
        // 最大待機時間（分）の入力ボックスを開く。
        app.input_box = Some(InputBoxState::new(
            "Maximum delay (minutes):",
            app.draft.max_minutes.clone(),
            InputCallbackId::SettingsMaxDelay,
        ));
    } else if shortcuts::matches_shortcut(&k, &sc.endpoint) {
        // アップロード先URLの入力ボックスを開く。
        app.input_box = Some(InputBoxState::new(
            "Upload endpoint URL:",
            app.draft.endpoint.clone(),
            InputCallbackId::SettingsEndpoint,
        ));
    }

    Ok(false)
}

/// 編集バッファを検証して設定へ反映し、保存する。
async fn save_settings(app: &mut App) -> Result<()> {
    // 分の値は整数のみ受け付け、範囲は丸める。
    let (Ok(min), Ok(max)) = (
        app.draft.min_minutes.trim().parse::<i64>(),
        app.draft.max_minutes.trim().parse::<i64>(),
    ) else {
        app.ui.error = Some("Delay minutes must be whole numbers".into());
        return Ok(());
    };
    let policy = DelayPolicy::new(app.draft.delay_enabled, min, max);

    app.cfg.session.cookies_file = PathBuf::from(app.draft.cookies_file.trim());
    app.cfg.set_delay_policy(policy);
    app.cfg.publisher.endpoint = app.draft.endpoint.trim().to_string();
    // 設定ファイルを保存する。
    app.cfg.save(&app.cfg_path)?;

    // Workerにも設定更新を通知する。
    app.worker_tx
        .send(WorkerCmd::SaveSettings(app.cfg.clone()))
        .await?;
    // 丸めた値を表示へ戻す。
    app.draft = SettingsDraft::from_config(&app.cfg);
    app.ui.error = None;
    app.ui.screen = Screen::Main;
    app.ui.status = "Saved settings".into();
    Ok(())
}

/// 全削除確認画面のキー処理。
fn handle_confirm_clear_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.confirm;

    if shortcuts::matches_shortcut(&k, &sc.yes) {
        match app.queue.clear() {
            Ok(n) => {
                app.push_log(format!("Cleared {n} video(s)"));
                app.ui.selected = 0;
                app.ui.status = "Queue cleared".into();
            }
            Err(e) => report_queue_error(app, e),
        }
        app.ui.screen = Screen::Main;
    } else if shortcuts::matches_shortcut(&k, &sc.no) {
        app.ui.screen = Screen::Main;
    }
    Ok(false)
}

/// 入力ボックスのキー処理。
async fn handle_input_box_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 入力ボックスが無ければ何もしない。
    let Some(input_state) = &mut app.input_box else {
        return Ok(false);
    };

    // 入力ボックス用ショートカットを参照する。
    let sc = &app.shortcuts.input_box;

    // 入力ボックス中でもCtrl+Cで終了できるようにする。
    if is_ctrl_c(&k) {
        return Ok(true);
    }

    if shortcuts::matches_shortcut(&k, &sc.confirm) {
        // 入力ボックスを閉じる前に値とコールバック種別を保存する。
        let value = input_state.value.clone();
        let callback_id = input_state.callback_id.clone();
        app.input_box = None;

        // コールバック種別に応じて値を反映する。
        apply_input_callback(app, callback_id, value).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.cancel) {
        // 入力を破棄して入力ボックスを閉じる。
        app.input_box = None;
        app.pending_bulk_text = None;
    } else if shortcuts::matches_shortcut(&k, &sc.backspace) {
        input_state.backspace();
    } else if shortcuts::matches_shortcut(&k, &sc.delete) {
        input_state.delete();
    } else if shortcuts::matches_shortcut(&k, &sc.left) {
        input_state.move_left();
    } else if shortcuts::matches_shortcut(&k, &sc.right) {
        input_state.move_right();
    } else if shortcuts::matches_shortcut(&k, &sc.home) {
        input_state.move_home();
    } else if shortcuts::matches_shortcut(&k, &sc.end) {
        input_state.move_end();
    } else if shortcuts::matches_shortcut(&k, &sc.clear_line) {
        input_state.clear_line();
    } else if let KeyCode::Char(c) = k.code
        && !k.modifiers.contains(KeyModifiers::CONTROL)
    {
        // コントロールキーでない場合のみ挿入する。
        input_state.insert_char(c);
    }

    Ok(false)
}

/// 入力ボックスのコールバックを適用する。
async fn apply_input_callback(
    app: &mut App,
    callback_id: InputCallbackId,
    value: String,
) -> Result<()> {
    match callback_id {
        InputCallbackId::AddPath => add_path(app, value.trim()).await?,
        InputCallbackId::EditDescription(id) => match app.queue.set_description(id, value) {
            Ok(true) => app.ui.status = "Description updated".into(),
            Ok(false) => app.ui.status = "The video is no longer queued".into(),
            Err(e) => report_queue_error(app, e),
        },
        InputCallbackId::BulkText => {
            // 固定テキストを保持して開始番号を尋ねる。
            app.pending_bulk_text = Some(value);
            app.input_box = Some(InputBoxState::new(
                "Start part number:",
                app.cfg.bulk.start_index.to_string(),
                InputCallbackId::BulkStart,
            ));
        }
        InputCallbackId::BulkStart => {
            let text = app.pending_bulk_text.take().unwrap_or_default();
            apply_bulk(app, &text, &value)?;
        }
        InputCallbackId::SettingsCookiesFile => app.draft.cookies_file = value,
        InputCallbackId::SettingsMinDelay => app.draft.min_minutes = value,
        InputCallbackId::SettingsMaxDelay => app.draft.max_minutes = value,
        InputCallbackId::SettingsEndpoint => app.draft.endpoint = value,
    }
    Ok(())
}

/// ファイルは直接追加し、フォルダはWorkerに走査を依頼する。
async fn add_path(app: &mut App, raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Ok(());
    }
    let path = PathBuf::from(raw);
    if path.is_dir() {
        app.worker_tx.send(WorkerCmd::ScanFolder(path)).await?;
        app.ui.status = "Scanning folder...".into();
    } else if !path.is_file() {
        app.ui.error = Some(format!("Path not found: {raw}"));
    } else if !discovery::is_video(&path) {
        app.ui.error = Some(format!("Not a supported video file: {raw}"));
    } else {
        match app.queue.add(&path) {
            Ok(id) => {
                let name = app.queue.get(id).map(|j| j.file_name()).unwrap_or_default();
                app.push_log(format!("Added: {name}"));
                app.ui.error = None;
                app.ui.status = format!("{} video(s) queued", app.queue.len());
            }
            Err(e) => report_queue_error(app, e),
        }
    }
    Ok(())
}

/// 一括説明文を検証・適用し、次回の初期値として保存する。
fn apply_bulk(app: &mut App, text: &str, start: &str) -> Result<()> {
    let template = match BulkDescriptionTemplate::parse(text, start) {
        Ok(t) => t,
        Err(e) => {
            report_queue_error(app, e);
            return Ok(());
        }
    };
    match app.queue.apply_bulk_template(&template) {
        Ok(n) => {
            app.push_log(format!(
                "Descriptions set for {n} video(s): {}",
                template.render(0)
            ));
            app.ui.error = None;
            app.cfg.bulk.fixed_text = template.fixed_text().to_string();
            app.cfg.bulk.start_index = template.start_index();
            app.cfg.save(&app.cfg_path)?;
        }
        Err(e) => report_queue_error(app, e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, jobs::JobStatus, shortcuts::Shortcuts};
    use tokio::sync::mpsc;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::empty())
    }

    fn code(c: KeyCode) -> KeyEvent {
        KeyEvent::new(c, KeyModifiers::empty())
    }

    fn app_in(dir: &std::path::Path) -> (App, mpsc::Receiver<WorkerCmd>) {
        let (tx_cmd, rx_cmd) = mpsc::channel(8);
        let (_tx_ev, rx_ev) = mpsc::channel(8);
        let app = App::new(
            dir.join("config.toml"),
            Config::default(),
            Shortcuts::default(),
            tx_cmd,
            rx_ev,
        );
        (app, rx_cmd)
    }

    async fn type_text(app: &mut App, s: &str) {
        for c in s.chars() {
            handle_key(app, key(c)).await.expect("key");
        }
    }

    #[tokio::test]
    async fn test_bulk_template_flow() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut app, _rx) = app_in(dir.path());
        for n in ["a.mp4", "b.mp4", "c.mp4"] {
            app.queue.add(format!("/v/{n}")).expect("add");
        }

        handle_key(&mut app, key('b')).await.expect("bulk");
        type_text(&mut app, "Cukur 1. Bolum").await;
        handle_key(&mut app, code(KeyCode::Enter)).await.expect("text");
        // 開始番号は既定値1が入っている。
        handle_key(&mut app, code(KeyCode::Enter)).await.expect("start");

        let d: Vec<_> = app.queue.iter().map(|j| j.description.clone()).collect();
        assert_eq!(
            d,
            vec![
                "Cukur 1. Bolum Part 1",
                "Cukur 1. Bolum Part 2",
                "Cukur 1. Bolum Part 3"
            ]
        );
        assert_eq!(app.cfg.bulk.fixed_text, "Cukur 1. Bolum");
        assert!(dir.path().join("config.toml").exists());
    }

    #[tokio::test]
    async fn test_invalid_bulk_start_changes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut app, _rx) = app_in(dir.path());
        let id = app.queue.add("/v/a.mp4").expect("add");
        app.queue.set_description(id, "keep").expect("edit");

        handle_key(&mut app, key('b')).await.expect("bulk");
        type_text(&mut app, "Show").await;
        handle_key(&mut app, code(KeyCode::Enter)).await.expect("text");
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL))
            .await
            .expect("clear");
        handle_key(&mut app, key('0')).await.expect("zero");
        handle_key(&mut app, code(KeyCode::Enter)).await.expect("start");

        assert_eq!(app.queue.get(id).expect("job").description, "keep");
        assert!(app.ui.error.is_some());
    }

    #[tokio::test]
    async fn test_start_locks_and_sends_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut app, mut rx) = app_in(dir.path());
        app.queue.add("/v/a.mp4").expect("add");

        handle_key(&mut app, key('s')).await.expect("start");
        assert!(app.queue.is_locked());
        match rx.recv().await.expect("cmd") {
            WorkerCmd::StartRun { jobs, delay } => {
                assert_eq!(jobs.len(), 1);
                assert_eq!(jobs[0].status, JobStatus::Pending);
                assert_eq!(delay, app.cfg.delay_policy());
            }
            other => panic!("unexpected command: {other:?}"),
        }

        // 実行中の削除・全削除は拒否される。
        handle_key(&mut app, key('d')).await.expect("remove");
        handle_key(&mut app, key('c')).await.expect("clear");
        assert_eq!(app.queue.len(), 1);
        assert_eq!(app.ui.screen, Screen::Main);
    }

    #[tokio::test]
    async fn test_start_on_empty_queue_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut app, mut rx) = app_in(dir.path());
        handle_key(&mut app, key('s')).await.expect("start");
        assert!(!app.queue.is_locked());
        assert!(app.ui.error.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_start_keeps_previous_results() {
        use crate::{app::handle_worker_event, worker::WorkerEvent};

        let dir = tempfile::tempdir().expect("tempdir");
        let (mut app, mut rx) = app_in(dir.path());
        app.cfg.session.cookies_file = PathBuf::new();
        let id = app.queue.add("/v/a.mp4").expect("add");
        app.queue.apply_status(id, JobStatus::Failed, Some("rate limited".into()));

        handle_key(&mut app, key('s')).await.expect("start");
        assert!(matches!(rx.recv().await, Some(WorkerCmd::StartRun { .. })));
        handle_worker_event(
            &mut app,
            WorkerEvent::RunRejected(PreconditionError::MissingCredential),
        );

        let j = app.queue.get(id).expect("job");
        assert_eq!(j.status, JobStatus::Failed);
        assert_eq!(j.last_error.as_deref(), Some("rate limited"));
        assert!(!app.queue.is_locked());
    }

    #[tokio::test]
    async fn test_clear_requires_confirmation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut app, _rx) = app_in(dir.path());
        app.queue.add("/v/a.mp4").expect("add");
        app.queue.add("/v/b.mp4").expect("add");

        handle_key(&mut app, key('c')).await.expect("clear");
        assert_eq!(app.ui.screen, Screen::ConfirmClear);
        handle_key(&mut app, key('n')).await.expect("no");
        assert_eq!(app.queue.len(), 2);

        handle_key(&mut app, key('c')).await.expect("clear");
        handle_key(&mut app, key('y')).await.expect("yes");
        assert!(app.queue.is_empty());
        assert_eq!(app.ui.screen, Screen::Main);
    }

    #[tokio::test]
    async fn test_add_file_and_duplicate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"x").expect("write");
        let (mut app, _rx) = app_in(dir.path());

        for _ in 0..2 {
            handle_key(&mut app, key('a')).await.expect("add");
            type_text(&mut app, &video.display().to_string()).await;
            handle_key(&mut app, code(KeyCode::Enter)).await.expect("confirm");
        }
        assert_eq!(app.queue.len(), 1);
        assert!(app.ui.status.starts_with("already queued"));
    }

    #[tokio::test]
    async fn test_add_folder_requests_scan() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut app, mut rx) = app_in(dir.path());

        handle_key(&mut app, key('a')).await.expect("add");
        type_text(&mut app, &dir.path().display().to_string()).await;
        handle_key(&mut app, code(KeyCode::Enter)).await.expect("confirm");

        match rx.recv().await.expect("cmd") {
            WorkerCmd::ScanFolder(p) => assert_eq!(p, dir.path()),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_settings_save_clamps_delay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut app, mut rx) = app_in(dir.path());

        handle_key(&mut app, key('t')).await.expect("settings");
        handle_key(&mut app, key('d')).await.expect("toggle");
        handle_key(&mut app, key('n')).await.expect("min");
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL))
            .await
            .expect("clear");
        type_text(&mut app, "5").await;
        handle_key(&mut app, code(KeyCode::Enter)).await.expect("confirm");
        handle_key(&mut app, code(KeyCode::Enter)).await.expect("save");

        assert_eq!(app.ui.screen, Screen::Main);
        let p = app.cfg.delay_policy();
        assert!(p.enabled());
        // 最大値は最小値まで引き上げられる。
        assert_eq!((p.min_minutes(), p.max_minutes()), (5, 5));
        assert!(matches!(rx.recv().await, Some(WorkerCmd::SaveSettings(_))));
    }
}
