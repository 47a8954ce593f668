//! Bulk description template: "<text> Part <n>" numbered in queue order.

use crate::error::QueueError;

/// Fixed text plus a positive starting part number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkDescriptionTemplate {
    fixed_text: String,
    start_index: u32,
}

impl BulkDescriptionTemplate {
    /// Build from already-typed values.
    pub fn new(fixed_text: impl Into<String>, start_index: i64) -> Result<Self, QueueError> {
        let fixed_text = fixed_text.into().trim().to_string();
        if fixed_text.is_empty() {
            return Err(QueueError::invalid_template("fixed text is empty"));
        }
        if start_index < 1 {
            return Err(QueueError::invalid_template(format!(
                "start number must be positive (got {start_index})"
            )));
        }
        let start_index = u32::try_from(start_index)
            .map_err(|_| QueueError::invalid_template("start number is too large"))?;
        Ok(Self {
            fixed_text,
            start_index,
        })
    }

    /// Build from raw operator input.
    pub fn parse(fixed_text: &str, start_index: &str) -> Result<Self, QueueError> {
        let start = start_index.trim();
        if start.is_empty() {
            return Err(QueueError::invalid_template("start number is empty"));
        }
        let n: i64 = start.parse().map_err(|_| {
            QueueError::invalid_template(format!("start number is not a number: {start}"))
        })?;
        Self::new(fixed_text, n)
    }

    pub fn fixed_text(&self) -> &str {
        &self.fixed_text
    }

    pub fn start_index(&self) -> u32 {
        self.start_index
    }

    /// Description for the job at 0-based `position`.
    pub fn render(&self, position: usize) -> String {
        let part = u64::from(self.start_index) + position as u64;
        format!("{} Part {}", self.fixed_text, part)
    }
}
