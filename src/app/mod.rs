//! TUIのイベントループ、入力処理、状態管理。

mod handlers;
mod render;

use anyhow::Result;
use crossterm::event::{self, Event};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::sync::mpsc;

use crate::{
    config::Config,
    delay::format_countdown,
    error::QueueError,
    events::UiState,
    input::InputBoxState,
    jobs::{JobQueue, JobStatus},
    orchestrator::RunEvent,
    shortcuts::Shortcuts,
    ui::Tui,
    worker::{self, WorkerCmd, WorkerEvent},
};

use handlers::{handle_key, is_ctrl_c};
use render::draw;

/// 右パネルに保持するログの上限。
const LOG_CAPACITY: usize = 200;

/// 設定画面の編集バッファ。保存するまで設定へは反映しない。
#[derive(Clone, Debug, Default)]
pub struct SettingsDraft {
    pub cookies_file: String,
    pub delay_enabled: bool,
    pub min_minutes: String,
    pub max_minutes: String,
    pub endpoint: String,
}

impl SettingsDraft {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            cookies_file: cfg.session.cookies_file.display().to_string(),
            delay_enabled: cfg.delay.enabled,
            min_minutes: cfg.delay.min_minutes.to_string(),
            max_minutes: cfg.delay.max_minutes.to_string(),
            endpoint: cfg.publisher.endpoint.clone(),
        }
    }
}

/// 入力処理と描画で共有するアプリ状態。
pub struct App {
    /// 永続化された設定ファイルのパス。
    pub cfg_path: PathBuf,
    /// メモリ上の現在設定。
    pub cfg: Config,
    /// 選択位置やステータスなどUI固有の状態。
    pub ui: UiState,
    /// アップロード待ちの動画（1ファイル1ジョブ）。
    pub queue: JobQueue,
    /// Workerへのコマンド送信チャネル。
    pub worker_tx: mpsc::Sender<WorkerCmd>,
    /// Workerからのイベント受信チャネル。
    pub worker_rx: mpsc::Receiver<WorkerEvent>,
    /// 設定画面の編集バッファ。
    pub draft: SettingsDraft,
    /// 一括説明文の入力途中で保持する固定テキスト。
    pub pending_bulk_text: Option<String>,
    /// 入力ボックスの状態（入力中はSome）。
    pub input_box: Option<InputBoxState>,
    /// ショートカットキー設定。
    pub shortcuts: Shortcuts,
}

impl App {
    pub fn new(
        cfg_path: PathBuf,
        cfg: Config,
        shortcuts: Shortcuts,
        worker_tx: mpsc::Sender<WorkerCmd>,
        worker_rx: mpsc::Receiver<WorkerEvent>,
    ) -> Self {
        Self {
            cfg_path,
            draft: SettingsDraft::from_config(&cfg),
            cfg,
            ui: UiState::new(),
            queue: JobQueue::new(),
            worker_tx,
            worker_rx,
            pending_bulk_text: None,
            input_box: None,
            shortcuts,
        }
    }

    /// 時刻付きでログパネルへ追記する。
    pub fn push_log(&mut self, msg: impl AsRef<str>) {
        let line = format!("{} {}", chrono::Local::now().format("%H:%M:%S"), msg.as_ref());
        self.ui.log.push(line);
        // 古いログから捨てる。
        if self.ui.log.len() > LOG_CAPACITY {
            let overflow = self.ui.log.len() - LOG_CAPACITY;
            self.ui.log.drain(..overflow);
        }
    }

    /// 選択行をキューの範囲内に収める。
    pub fn clamp_selection(&mut self) {
        self.ui.selected = self.ui.selected.min(self.queue.len().saturating_sub(1));
    }
}

/// ユーザーが終了するまでメインTUIループを回す。
pub async fn run_app(terminal: &mut Tui) -> Result<()> {
    // 設定ファイルを読み込む（初回はデフォルトを生成）。
    let cfg_path = PathBuf::from("config.toml");
    let mut cfg = Config::load_or_default(&cfg_path)?;
    // 環境変数の取り込み先フォルダを反映する。
    cfg.apply_env();

    // ショートカット設定を読み込む（無ければデフォルト）。
    let shortcuts_path = PathBuf::from("shortcut.toml");
    let shortcuts = Shortcuts::load_or_default(&shortcuts_path)?;

    // Worker通信用のコマンド/イベントチャネルを作る。
    let (tx_cmd, rx_cmd) = mpsc::channel::<WorkerCmd>(64);
    let (tx_ev, rx_ev) = mpsc::channel::<WorkerEvent>(256);

    // 初期設定スナップショットでWorkerを起動する。
    tokio::spawn(worker::run(rx_cmd, tx_ev, cfg.clone()));

    // アプリ状態を初期化する。
    let mut app = App::new(cfg_path, cfg, shortcuts, tx_cmd, rx_ev);

    // クッキーファイルの有無を知らせる。
    report_cookie_file(&mut app);
    // 起動時の自動取り込みを依頼する。
    request_auto_enqueue(&mut app).await?;

    loop {
        // 現在の状態を描画する。
        terminal.draw(|f| draw(f, &app))?;

        // 入力処理の前にWorkerイベントを消化する。
        while let Ok(ev) = app.worker_rx.try_recv() {
            handle_worker_event(&mut app, ev);
        }

        // UIの応答性確保のため短いタイムアウトで入力をポーリングする。
        if event::poll(Duration::from_millis(50))?
            && let Event::Key(k) = event::read()?
        {
            // どのフェーズでもCtrl+Cで終了できるようにする。
            if is_ctrl_c(&k) {
                break;
            }
            if handle_key(&mut app, k).await? {
                break;
            }
        }
    }

    // 実行中なら次の区切りで止めるよう伝えておく。
    if app.queue.is_locked() {
        let _ = app.worker_tx.try_send(WorkerCmd::CancelRun);
    }
    Ok(())
}

/// クッキーファイルが使えない理由。使えるならNone。
pub(crate) fn cookie_file_problem(path: &Path) -> Option<&'static str> {
    if path.as_os_str().is_empty() {
        Some("not set")
    } else if !path.is_file() {
        Some("not found")
    } else {
        None
    }
}

/// 起動時にクッキーファイルの状態をログへ出す。
fn report_cookie_file(app: &mut App) {
    let path = app.cfg.session.cookies_file.clone();
    match cookie_file_problem(&path) {
        None => {
            tracing::info!("cookie file found: {}", path.display());
            app.push_log(format!("Cookies found: {}", path.display()));
        }
        Some(problem) => {
            tracing::warn!("cookie file {problem}: {}", path.display());
            app.push_log(format!("Cookies {problem}: {}", path.display()));
        }
    }
}

/// 環境変数で指定されたフォルダがあれば走査を依頼する。
async fn request_auto_enqueue(app: &mut App) -> Result<()> {
    let Some(dir) = app.cfg.source_dir.clone() else {
        return Ok(());
    };
    if dir.is_dir() {
        tracing::info!("auto enqueue from {}", dir.display());
        app.push_log(format!("Scanning {}", dir.display()));
        app.worker_tx.send(WorkerCmd::ScanFolder(dir)).await?;
    } else {
        // 不正な値は無視して通常起動する。
        tracing::warn!("source dir is not a directory: {}", dir.display());
        app.push_log(format!("Ignored source folder (not found): {}", dir.display()));
    }
    Ok(())
}

/// WorkerイベントをUI状態へ反映する。
pub(crate) fn handle_worker_event(app: &mut App, ev: WorkerEvent) {
    match ev {
        WorkerEvent::MediaDiscovered { dir, files } => {
            if files.is_empty() {
                app.ui.status = format!("No videos in {}", dir.display());
                return;
            }
            // 重複はスキップしてログに残す。
            match app.queue.extend_from(&files) {
                Ok(report) => {
                    for path in &report.skipped {
                        tracing::info!("duplicate skipped: {path}");
                        app.push_log(format!("Skipped duplicate: {}", path.file_name()));
                    }
                    app.push_log(format!(
                        "Added {} video(s) from {}",
                        report.added.len(),
                        dir.display()
                    ));
                    app.ui.status = format!(
                        "Added {}, skipped {}",
                        report.added.len(),
                        report.skipped.len()
                    );
                }
                Err(e) => app.ui.status = format!("Error: {e}"),
            }
        }
        WorkerEvent::Run(run_ev) => handle_run_event(app, run_ev),
        WorkerEvent::RunRejected(e) => {
            // 拒否された開始要求のロックを戻す。
            app.queue.unlock();
            app.ui.error = Some(e.to_string());
            app.push_log(format!("Not started: {e}"));
        }
        WorkerEvent::Log(s) => {
            // ログを追加する。
            app.push_log(s);
        }
        WorkerEvent::Error(s) => {
            // ステータスにエラーを表示する。
            app.ui.status = format!("Error: {s}");
        }
    }
}

/// 実行イベントをキューと表示へ反映する。
fn handle_run_event(app: &mut App, ev: RunEvent) {
    match ev {
        RunEvent::RunStarted { total } => {
            // 実行が確定したので前回の結果を消す。
            app.queue.reset_results();
            app.ui.error = None;
            app.ui.countdown = None;
            app.ui.status = format!("Uploading 0/{total}");
            app.push_log(format!("Run started: {total} video(s)"));
        }
        RunEvent::JobStatusChanged {
            job_id,
            status,
            error,
        } => {
            app.queue.apply_status(job_id, status, error.clone());
            app.ui.countdown = None;
            let Some(job) = app.queue.get(job_id) else {
                return;
            };
            let name = job.file_name();
            match status {
                JobStatus::Uploading => app.ui.status = format!("Uploading {name}"),
                JobStatus::Succeeded => app.push_log(format!("Uploaded: {name}")),
                JobStatus::Failed => app.push_log(format!(
                    "Failed: {name}: {}",
                    error.as_deref().unwrap_or("unknown error")
                )),
                JobStatus::Pending | JobStatus::Preparing => {}
            }
        }
        RunEvent::DelayStarted { seconds } => {
            app.ui.countdown = Some(seconds);
            app.push_log(format!("Waiting {} before the next upload", format_countdown(seconds)));
        }
        RunEvent::Countdown { remaining } => {
            app.ui.countdown = Some(remaining);
        }
        RunEvent::RunAborted { cause } => {
            app.ui.error = Some(cause.clone());
            app.push_log(format!("Run aborted: {cause}"));
        }
        RunEvent::RunFinished(summary) => {
            // 実行が終わったのでキューの編集を再開できる。
            app.queue.unlock();
            app.ui.countdown = None;
            app.ui.status = summary.headline();
            for (path, msg) in &summary.failures {
                app.push_log(format!("  {}: {msg}", path.file_name()));
            }
            app.push_log(format!("Run finished: {}", summary.headline()));
            app.ui.last_summary = Some(summary);
        }
    }
}

/// キュー操作の結果をステータスへ反映する。重複は情報として扱う。
pub(crate) fn report_queue_error(app: &mut App, e: QueueError) {
    if e.is_informational() {
        app.ui.status = e.to_string();
    } else {
        app.ui.error = Some(e.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::PreconditionError, summary::RunSummary};

    fn app() -> (App, mpsc::Receiver<WorkerCmd>) {
        let (tx_cmd, rx_cmd) = mpsc::channel(8);
        let (_tx_ev, rx_ev) = mpsc::channel(8);
        let app = App::new(
            PathBuf::from("config.toml"),
            Config::default(),
            Shortcuts::default(),
            tx_cmd,
            rx_ev,
        );
        (app, rx_cmd)
    }

    #[test]
    fn test_discovered_media_logs_skipped_duplicates() {
        let (mut app, _rx) = app();
        app.queue.add("/v/a.mp4").expect("add");
        handle_worker_event(
            &mut app,
            WorkerEvent::MediaDiscovered {
                dir: "/v".into(),
                files: vec!["/v/a.mp4".into(), "/v/b.mp4".into()],
            },
        );
        assert_eq!(app.queue.len(), 2);
        assert!(app.ui.log.iter().any(|l| l.ends_with("Skipped duplicate: a.mp4")));
        assert_eq!(app.ui.status, "Added 1, skipped 1");
    }

    #[test]
    fn test_status_events_update_rows() {
        let (mut app, _rx) = app();
        let id = app.queue.add("/v/a.mp4").expect("add");
        app.queue.lock();
        handle_worker_event(
            &mut app,
            WorkerEvent::Run(RunEvent::JobStatusChanged {
                job_id: id,
                status: JobStatus::Failed,
                error: Some("rate limited".into()),
            }),
        );
        let j = app.queue.get(id).expect("job");
        assert_eq!(j.status, JobStatus::Failed);
        assert_eq!(j.last_error.as_deref(), Some("rate limited"));
        assert!(app.ui.log.iter().any(|l| l.ends_with("Failed: a.mp4: rate limited")));
    }

    #[test]
    fn test_countdown_and_finish_unlock() {
        let (mut app, _rx) = app();
        app.queue.add("/v/a.mp4").expect("add");
        app.queue.lock();

        handle_worker_event(&mut app, WorkerEvent::Run(RunEvent::DelayStarted { seconds: 90 }));
        handle_worker_event(&mut app, WorkerEvent::Run(RunEvent::Countdown { remaining: 42 }));
        assert_eq!(app.ui.countdown, Some(42));

        let summary = RunSummary {
            succeeded_count: 1,
            ..RunSummary::default()
        };
        handle_worker_event(&mut app, WorkerEvent::Run(RunEvent::RunFinished(summary)));
        assert!(!app.queue.is_locked());
        assert_eq!(app.ui.countdown, None);
        assert_eq!(app.ui.status, "1 succeeded, 0 failed");
    }

    #[test]
    fn test_every_rejection_unlocks() {
        let (mut app, _rx) = app();
        app.queue.add("/v/a.mp4").expect("add");

        for e in [
            PreconditionError::RunAlreadyActive,
            PreconditionError::MissingCredential,
            PreconditionError::EmptyQueue,
        ] {
            app.queue.lock();
            handle_worker_event(&mut app, WorkerEvent::RunRejected(e));
            assert!(!app.queue.is_locked());
            assert!(app.ui.error.is_some());
        }
    }

    #[test]
    fn test_run_started_clears_previous_results() {
        let (mut app, _rx) = app();
        let id = app.queue.add("/v/a.mp4").expect("add");
        app.queue.apply_status(id, JobStatus::Failed, Some("rate limited".into()));
        app.queue.lock();
        handle_worker_event(&mut app, WorkerEvent::Run(RunEvent::RunStarted { total: 1 }));
        let j = app.queue.get(id).expect("job");
        assert_eq!(j.status, JobStatus::Pending);
        assert!(j.last_error.is_none());
    }

    #[test]
    fn test_startup_reports_cookie_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cookies = dir.path().join("cookies.txt");

        let (mut app, _rx) = app();
        app.cfg.session.cookies_file = cookies.clone();
        report_cookie_file(&mut app);
        assert!(app.ui.log.last().expect("log").contains("Cookies not found"));

        std::fs::write(&cookies, "x").expect("write");
        report_cookie_file(&mut app);
        assert!(app.ui.log.last().expect("log").contains("Cookies found"));

        app.cfg.session.cookies_file = PathBuf::new();
        report_cookie_file(&mut app);
        assert!(app.ui.log.last().expect("log").contains("Cookies not set"));
    }

    #[test]
    fn test_log_is_bounded() {
        let (mut app, _rx) = app();
        for i in 0..(LOG_CAPACITY + 10) {
            app.push_log(format!("line {i}"));
        }
        assert_eq!(app.ui.log.len(), LOG_CAPACITY);
        assert!(app.ui.log[0].ends_with("line 10"));
    }
}
