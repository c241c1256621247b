//! Terminal output: live status lines and the end-of-batch summary.

use crate::queue::{Controller, Progress, StatusChange, StatusKind, WorkUnit};
use crate::utils::{format_duration, format_file_size};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub name: String,
    pub status: StatusKind,
    pub original_size: u64,
    pub converted_size: Option<u64>,
    pub error: Option<String>,
}

impl From<&WorkUnit> for ItemReport {
    fn from(unit: &WorkUnit) -> Self {
        Self {
            name: unit.name.clone(),
            status: unit.kind(),
            original_size: unit.original_size,
            converted_size: unit.converted_size(),
            error: unit.error_message().map(str::to_string),
        }
    }
}

/// Everything worth reporting about a finished batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub progress: Progress,
    pub failed: usize,
    pub original_bytes: u64,
    pub converted_bytes: u64,
    pub saved_bytes: u64,
    pub elapsed_secs: Option<f64>,
    pub items: Vec<ItemReport>,
}

impl BatchSummary {
    pub fn from_controller(controller: &Controller) -> Self {
        let items: Vec<ItemReport> = controller.registry().iter().map(ItemReport::from).collect();
        let done: Vec<&ItemReport> = items
            .iter()
            .filter(|i| i.status == StatusKind::Done)
            .collect();
        let original_bytes = done.iter().map(|i| i.original_size).sum();
        let converted_bytes = done.iter().filter_map(|i| i.converted_size).sum();
        let saved_bytes = controller
            .registry()
            .iter()
            .filter_map(|u| u.size_reduction().map(|(saved, _)| saved))
            .sum();

        Self {
            progress: controller.progress(),
            failed: controller.registry().count_by_status(StatusKind::Error),
            original_bytes,
            converted_bytes,
            saved_bytes,
            elapsed_secs: controller.elapsed().map(|d| d.as_secs_f64()),
            items,
        }
    }

    /// Saved space relative to the converted files' originals
    pub fn saved_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        self.saved_bytes as f64 / self.original_bytes as f64 * 100.0
    }
}

/// One line per status change
pub fn status_line(change: &StatusChange) -> String {
    let badge = change.status.badge();
    format!("  {} {} {}", badge.symbol, change.name, badge.label)
}

pub fn item_line(item: &ItemReport) -> String {
    let badge = item.status.badge();
    match item.status {
        StatusKind::Done => format!(
            "  {} {} {} -> {}",
            badge.symbol,
            item.name,
            format_file_size(item.original_size),
            format_file_size(item.converted_size.unwrap_or(0))
        ),
        StatusKind::Error => format!(
            "  {} {} {}: {}",
            badge.symbol,
            item.name,
            badge.label,
            item.error.as_deref().unwrap_or("unknown error")
        ),
        StatusKind::Pending | StatusKind::Converting => {
            format!("  {} {} {}", badge.symbol, item.name, badge.label)
        }
    }
}

pub fn print_summary(summary: &BatchSummary) {
    println!();
    for item in &summary.items {
        println!("{}", item_line(item));
    }
    println!();
    println!(
        "Converted {}/{} files ({:.0}%), {} failed",
        summary.progress.done,
        summary.progress.total,
        summary.progress.percent_done(),
        summary.failed
    );
    if summary.progress.done > 0 {
        println!(
            "Size: {} -> {} (saved {}, {:.1}%)",
            format_file_size(summary.original_bytes),
            format_file_size(summary.converted_bytes),
            format_file_size(summary.saved_bytes),
            summary.saved_percent()
        );
    }
    if let Some(secs) = summary.elapsed_secs {
        println!(
            "Elapsed: {}",
            format_duration(std::time::Duration::from_secs_f64(secs))
        );
    }
}
