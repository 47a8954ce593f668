//! 画面遷移用のUI状態と画面種別。

use crate::summary::RunSummary;

/// TUIで現在表示中の画面。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    /// メインのジョブ一覧画面。
    Main,
    /// 設定編集画面。
    Settings,
    /// キュー全削除の確認画面。
    ConfirmClear,
}

/// 描画側と共有するUI状態。
#[derive(Clone, Debug)]
pub struct UiState {
    /// 現在の画面。
    pub screen: Screen,
    /// ジョブ一覧の選択行。
    pub selected: usize,
    /// 右側パネルに表示するログ（時刻付き）。
    pub log: Vec<String>,
    /// 画面下部のステータス文言。
    pub status: String,
    /// エラーメッセージ（強調表示用）。
    pub error: Option<String>,
    /// 次のアップロードまでの残り秒数（待機中のみ）。
    pub countdown: Option<u64>,
    /// 直近の実行結果。
    pub last_summary: Option<RunSummary>,
}

impl UiState {
    pub fn new() -> Self {
        Self {
            screen: Screen::Main,
            selected: 0,
            log: vec![],
            status: "Ready".into(),
            error: None,
            countdown: None,
            last_summary: None,
        }
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}
