//! アップロードジョブとキューのモデル。

use std::path::Path;
use uuid::Uuid;

use crate::{error::QueueError, path_key::PathKey, template::BulkDescriptionTemplate};

/// ジョブの安定ID。
pub type JobId = Uuid;

/// 実行の進行に応じたジョブ状態。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    /// 実行待ち。
    Pending,
    /// 説明文の確定など投稿前の準備中。
    Preparing,
    /// Publisherへの投稿中。
    Uploading,
    /// 正常完了。
    Succeeded,
    /// 失敗（理由は `last_error`）。
    Failed,
}

impl JobStatus {
    /// 今回の実行で終端状態かどうか。
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// 動画1件とその処理状態。
#[derive(Clone, Debug)]
pub struct UploadJob {
    /// 状態更新や削除に使う安定ID。
    pub id: JobId,
    /// 正規化済みの絶対パス（重複判定キー）。
    pub path: PathKey,
    /// 投稿時の説明文。
    pub description: String,
    /// 現在の処理状態。
    pub status: JobStatus,
    /// 失敗時のエラーメッセージ。
    pub last_error: Option<String>,
    /// 追加順の通し番号（表示用、1始まり）。
    pub position: usize,
}

impl UploadJob {
    /// 待機状態でジョブを作成する。
    pub fn new(path: PathKey, position: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            description: String::new(),
            status: JobStatus::Pending,
            last_error: None,
            position,
        }
    }

    /// 表示用のファイル名。
    pub fn file_name(&self) -> String {
        self.path.file_name()
    }

    /// 空なら説明文の代わりにファイル名を使う。
    pub fn effective_description(&self) -> String {
        let d = self.description.trim();
        if d.is_empty() {
            self.file_name()
        } else {
            d.to_string()
        }
    }
}

/// 一括追加の結果。
#[derive(Debug, Default)]
pub struct AddReport {
    /// 追加されたジョブ。
    pub added: Vec<JobId>,
    /// 既に登録済みで飛ばしたパス。
    pub skipped: Vec<PathKey>,
}

/// 追加順を保ち、パス重複を許さないジョブ列。
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Vec<UploadJob>,
    next_position: usize,
    locked: bool,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// パスを正規化して末尾に追加する。
    pub fn add(&mut self, path: impl AsRef<Path>) -> Result<JobId, QueueError> {
        self.ensure_unlocked()?;
        let key = PathKey::new(path);
        // 同じパスがあればキューに触れずに報告する。
        if self.jobs.iter().any(|j| j.path == key) {
            tracing::debug!("duplicate ignored: {key}");
            return Err(QueueError::DuplicateIgnored { path: key });
        }
        self.next_position += 1;
        let job = UploadJob::new(key, self.next_position);
        let id = job.id;
        self.jobs.push(job);
        Ok(id)
    }

    /// 複数パスを追加し、重複は報告に積む。
    pub fn extend_from<I, P>(&mut self, paths: I) -> Result<AddReport, QueueError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.ensure_unlocked()?;
        let mut report = AddReport::default();
        for p in paths {
            match self.add(p) {
                Ok(id) => report.added.push(id),
                Err(QueueError::DuplicateIgnored { path }) => report.skipped.push(path),
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// IDで削除する。存在しなければ `Ok(None)`。
    pub fn remove(&mut self, id: JobId) -> Result<Option<UploadJob>, QueueError> {
        self.ensure_unlocked()?;
        let idx = self.jobs.iter().position(|j| j.id == id);
        Ok(idx.map(|i| self.jobs.remove(i)))
    }

    /// 全件削除し、削除件数を返す。
    pub fn clear(&mut self) -> Result<usize, QueueError> {
        self.ensure_unlocked()?;
        let n = self.jobs.len();
        self.jobs.clear();
        Ok(n)
    }

    /// オペレーターによる説明文の編集。
    pub fn set_description(&mut self, id: JobId, text: impl Into<String>) -> Result<bool, QueueError> {
        self.ensure_unlocked()?;
        match self.jobs.iter_mut().find(|j| j.id == id) {
            Some(j) => {
                j.description = text.into();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 現在の並び順でテンプレートを全ジョブへ適用する。
    pub fn apply_bulk_template(
        &mut self,
        template: &BulkDescriptionTemplate,
    ) -> Result<usize, QueueError> {
        self.ensure_unlocked()?;
        if self.jobs.is_empty() {
            return Err(QueueError::EmptyQueue);
        }
        for (i, job) in self.jobs.iter_mut().enumerate() {
            job.description = template.render(i);
        }
        Ok(self.jobs.len())
    }

    /// 実行中はキューを固定する。前回の結果は残す。
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// 実行が始まったら前回の結果を消す。
    pub fn reset_results(&mut self) {
        for j in &mut self.jobs {
            j.status = JobStatus::Pending;
            j.last_error = None;
        }
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Workerから届いた状態変化を反映する（ロック中も可）。
    pub fn apply_status(&mut self, id: JobId, status: JobStatus, error: Option<String>) -> bool {
        let Some(j) = self.jobs.iter_mut().find(|j| j.id == id) else {
            return false;
        };
        j.status = status;
        // エラーは失敗時のみ保持する。
        j.last_error = if status == JobStatus::Failed { error } else { None };
        true
    }

    /// Workerへ渡す実行用スナップショット。
    pub fn snapshot(&self) -> Vec<UploadJob> {
        self.jobs.clone()
    }

    pub fn get(&self, id: JobId) -> Option<&UploadJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn get_index(&self, index: usize) -> Option<&UploadJob> {
        self.jobs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadJob> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// 指定状態のジョブ数。
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    fn ensure_unlocked(&self) -> Result<(), QueueError> {
        if self.locked {
            Err(QueueError::QueueLocked)
        } else {
            Ok(())
        }
    }
}
