//! ファイルロギングの初期化。

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;

/// カレントディレクトリの `log_file` へ書き込むロガーを設定する。
///
/// 返したガードが生きている間だけ非同期書き込みが続く。
pub fn init_file_logging(log_file: &str) -> Result<WorkerGuard> {
    // 標準出力（TUI画面やCLIの結果表示）を汚さないよう、ファイルへ直接書き込む。
    let file_appender = tracing_appender::rolling::never(".", log_file);
    // 非同期書き込み用のラッパーとガードを用意する。
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // フォーマッタと出力先を設定して初期化する。
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))?;
    // ログの保存先を通知しておく。
    tracing::info!("logging to {}", log_file);
    Ok(guard)
}
